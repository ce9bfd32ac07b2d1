//! Page-state detector priority tests.

use whatsbot::client::state::detect_state;
use whatsbot::locators;
use whatsbot::model::LifecycleState;
use whatsbot::testing::MockDriver;

#[tokio::test]
async fn logged_in_wins_over_a_simultaneous_loading_signal() {
    let driver = MockDriver::new();
    driver.present(locators::LOADING[0]);
    driver.present(locators::LOGGED_IN[0]);

    assert_eq!(detect_state(&driver).await.unwrap(), LifecycleState::LoggedIn);
}

#[tokio::test]
async fn loading_wins_over_auth_stage_signals() {
    let driver = MockDriver::new();
    driver.present(locators::AUTH[0]);
    driver.present(locators::QR_CODE[0]);
    driver.present(locators::LOADING[0]);

    assert_eq!(detect_state(&driver).await.unwrap(), LifecycleState::Loading);
}

#[tokio::test]
async fn qr_wins_over_the_auth_landing_page() {
    let driver = MockDriver::new();
    driver.present(locators::AUTH[0]);
    driver.present(locators::QR_CODE[0]);

    assert_eq!(detect_state(&driver).await.unwrap(), LifecycleState::QrAuth);
}

#[test]
fn no_matching_signal_is_unknown() {
    let driver = MockDriver::new();
    tokio_test::block_on(async {
        assert_eq!(detect_state(&driver).await.unwrap(), LifecycleState::Unknown);
    });
}

#[tokio::test]
async fn the_auth_landing_page_alone_is_auth_required() {
    let driver = MockDriver::new();
    driver.present(locators::AUTH[0]);
    assert_eq!(
        detect_state(&driver).await.unwrap(),
        LifecycleState::AuthRequired
    );
}

#[tokio::test]
async fn driver_failures_surface_as_errors() {
    let driver = MockDriver::new();
    driver.set_failing(true);
    assert!(detect_state(&driver).await.is_err());
}
