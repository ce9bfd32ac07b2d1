//! Download persistence tests: suggested-name preference, extracted-name
//! fallback and per-file failure isolation.

use tempfile::tempdir;
use whatsbot::locators;
use whatsbot::testing::{MockDriver, MockElement};
use whatsbot::{Client, Config};

/// A chat with one file-message row; returns the download icon.
fn chat_with_file_row(driver: &MockDriver, title: &str) -> MockElement {
    let chat = driver.present(locators::CHAT_DIV[0]);
    let row = driver.add_element(&[], "");
    driver.bind_within(chat, locators::CHAT_ROW[0], &[row]);

    let container = driver.add_child(row, &[("class", "message-in")], "");
    driver.bind_within(row, locators::MESSAGE_CONTAINER[0], &[container]);

    let wrapper = driver.add_child(row, &[("title", title)], "");
    let icon = driver.add_child(wrapper, &[("data-icon", "audio-download")], "");
    driver.bind_within(row, locators::DOWNLOAD_ICON[0], &[icon]);
    icon
}

#[tokio::test]
async fn downloads_prefer_the_driver_suggested_name() {
    let driver = MockDriver::new();
    let icon = chat_with_file_row(&driver, "Download \"report.pdf\"");
    driver.set_download(icon, Some("report (1).pdf"), b"pdf bytes");

    let dest = tempdir().unwrap();
    let client = Client::new(driver, Config::default());
    let paths = client.download_all_files(dest.path()).await.unwrap();

    assert_eq!(paths, vec![dest.path().join("report (1).pdf")]);
    assert_eq!(std::fs::read(&paths[0]).unwrap(), b"pdf bytes");
}

#[tokio::test]
async fn downloads_fall_back_to_the_extracted_filename() {
    let driver = MockDriver::new();
    let icon = chat_with_file_row(&driver, "Download \"report.pdf\"");
    driver.set_download(icon, None, b"pdf bytes");

    let dest = tempdir().unwrap();
    let client = Client::new(driver, Config::default());
    let paths = client.download_all_files(dest.path()).await.unwrap();

    assert_eq!(paths, vec![dest.path().join("report.pdf")]);
}

#[tokio::test]
async fn a_failed_download_is_skipped_not_fatal() {
    let driver = MockDriver::new();
    // download affordance present but no download ever arrives
    chat_with_file_row(&driver, "Download \"report.pdf\"");

    let dest = tempdir().unwrap();
    let client = Client::new(driver, Config::default());
    let paths = client.download_all_files(dest.path()).await.unwrap();
    assert!(paths.is_empty());
}
