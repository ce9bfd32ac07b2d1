use crate::core::Driver;
use crate::errors::Result;
use crate::locators;
use crate::model::LifecycleState;

/// Classify the current page by probing each state's defining locator in a
/// fixed priority order. A page in transition can satisfy more than one
/// weak signal at once, so the later-stage signal wins: logged-in before
/// loading before QR before the auth landing page.
///
/// Side-effect free; presence counts only, no element handles, no waits.
pub async fn detect_state<D: Driver>(driver: &D) -> Result<LifecycleState> {
    let checks: [(LifecycleState, &[&str]); 4] = [
        (LifecycleState::LoggedIn, locators::LOGGED_IN),
        (LifecycleState::Loading, locators::LOADING),
        (LifecycleState::QrAuth, locators::QR_CODE),
        (LifecycleState::AuthRequired, locators::AUTH),
    ];

    for (state, selectors) in checks {
        if driver.count(selectors).await? > 0 {
            return Ok(state);
        }
    }
    Ok(LifecycleState::Unknown)
}
