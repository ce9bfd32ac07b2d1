//! SearchResult field extraction: best-effort, absence kept explicit.

use whatsbot::locators;
use whatsbot::model::{SearchResult, UnreadCount};
use whatsbot::testing::MockDriver;

#[tokio::test]
async fn full_row_yields_every_field() {
    let driver = MockDriver::new();
    let item = driver.add_element(&[], "");

    let title = driver.add_element(&[("title", "Family")], "Family");
    let context = driver.add_element(&[("title", "Mom")], "Mom");
    driver.bind_within(item, locators::SPAN_TITLE[0], &[title, context]);

    let badge = driver.add_element(&[("aria-label", "1,234 unread messages")], "1,234");
    driver.bind_within(item, locators::UNREAD_BADGE[0], &[badge]);

    let header = driver.add_element(&[], "Family\n10:12 am");
    let preview = driver.add_element(&[], "Voice message");
    driver.bind_within(
        item,
        locators::SEARCH_ITEM_COMPONENTS[0],
        &[header, preview],
    );
    let icon = driver.add_element(&[("data-icon", "ptt")], "");
    driver.bind_within(preview, locators::PREVIEW_TYPE_ICON[0], &[icon]);

    let result = SearchResult::from_element(&driver, &item).await;
    assert_eq!(result.name, "Family");
    assert_eq!(result.group.as_deref(), Some("Mom"));
    assert_eq!(result.unread_count, Some(UnreadCount::Exact(1234)));
    assert_eq!(result.last_activity.as_deref(), Some("10:12 am"));
    assert_eq!(result.last_message.as_deref(), Some("Voice message"));
    assert_eq!(result.last_message_type.as_deref(), Some("ptt"));
}

#[tokio::test]
async fn sparse_row_leaves_optionals_absent() {
    let driver = MockDriver::new();
    let item = driver.add_element(&[], "");
    let header = driver.add_element(&[], "Mom");
    driver.bind_within(item, locators::SEARCH_ITEM_COMPONENTS[0], &[header]);

    let result = SearchResult::from_element(&driver, &item).await;
    assert_eq!(result.name, "Mom");
    assert_eq!(result.group, None);
    assert_eq!(result.last_message, None);
    assert_eq!(result.last_message_type, None);
    assert_eq!(result.unread_count, None);
    assert_eq!(result.last_activity, None);
}

#[tokio::test]
async fn non_numeric_badge_is_unknown_not_zero() {
    let driver = MockDriver::new();
    let item = driver.add_element(&[], "");
    let badge = driver.add_element(&[("aria-label", "unread messages")], "●");
    driver.bind_within(item, locators::UNREAD_BADGE[0], &[badge]);

    let result = SearchResult::from_element(&driver, &item).await;
    assert_eq!(result.unread_count, Some(UnreadCount::Unknown));
}

#[tokio::test]
async fn an_empty_subtree_still_yields_a_result() {
    let driver = MockDriver::new();
    let item = driver.add_element(&[], "");

    let result = SearchResult::from_element(&driver, &item).await;
    assert_eq!(result, SearchResult::default());
}
