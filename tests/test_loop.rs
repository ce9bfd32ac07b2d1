//! Automation-loop tests: transition events fire exactly once, `on_tick`
//! fires every cycle, session loss is published, stop is handler-safe and
//! driver failures kill the loop through `on_error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use whatsbot::locators;
use whatsbot::model::LifecycleState;
use whatsbot::testing::MockDriver;
use whatsbot::{Client, Config, Event, EventKind};

fn loop_config() -> Config {
    let mut config = Config::default();
    config.session.poll_interval_ms = 10;
    config.session.unread_check_every_ticks = 1;
    config
}

type EventLog = Arc<Mutex<Vec<String>>>;

#[tokio::test]
async fn transitions_fire_once_and_ticks_fire_every_cycle() {
    let driver = MockDriver::new();
    let canvas = driver.present(locators::QR_CODE[0]);
    driver.set_image(canvas, b"qr-bytes");

    let client = Arc::new(Client::new(driver, loop_config()));
    let events: EventLog = Default::default();

    let sink = events.clone();
    client.on(EventKind::Qr, move |event| {
        let sink = sink.clone();
        async move {
            if let Event::Qr(bytes) = event {
                assert_eq!(bytes, b"qr-bytes");
            }
            sink.lock().unwrap().push("qr".to_string());
            Ok(())
        }
    });

    // flip the page to logged-in after the first QR cycle
    let flip_driver = client.driver();
    let flipped = Arc::new(AtomicBool::new(false));
    let sink = events.clone();
    client.on(EventKind::Tick, move |event| {
        let flip_driver = flip_driver.clone();
        let flipped = flipped.clone();
        let sink = sink.clone();
        async move {
            if let Event::Tick(state) = event {
                sink.lock().unwrap().push(format!("tick:{state}"));
                if state == LifecycleState::QrAuth && !flipped.swap(true, Ordering::SeqCst) {
                    flip_driver.unbind(locators::QR_CODE[0]);
                    flip_driver.present(locators::LOGGED_IN[0]);
                }
            }
            Ok(())
        }
    });

    let stopper = client.clone();
    let sink = events.clone();
    client.on(EventKind::LoggedIn, move |_| {
        let stopper = stopper.clone();
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push("logged_in".to_string());
            // stopping from inside a handler must be safe
            stopper.stop();
            Ok(())
        }
    });

    let runner = client.clone();
    let task = tokio::spawn(async move { runner.start().await });

    assert!(client.wait_until_logged_in(Duration::from_secs(5)).await);
    task.await.unwrap().unwrap();
    assert_eq!(client.state(), LifecycleState::LoggedIn);

    let events = events.lock().unwrap();
    assert_eq!(events.iter().filter(|e| *e == "qr").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "logged_in").count(), 1);
    assert!(events.iter().filter(|e| e.starts_with("tick:")).count() >= 2);
    // the transition event precedes the same cycle's tick
    assert_eq!(events.first().map(String::as_str), Some("qr"));
}

#[tokio::test]
async fn session_loss_publishes_logged_out_before_reauth() {
    let driver = MockDriver::new();
    driver.present(locators::LOGGED_IN[0]);

    let client = Arc::new(Client::new(driver, loop_config()));
    let events: EventLog = Default::default();

    let flip_driver = client.driver();
    let flipped = Arc::new(AtomicBool::new(false));
    let sink = events.clone();
    client.on(EventKind::LoggedIn, move |_| {
        let flip_driver = flip_driver.clone();
        let flipped = flipped.clone();
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push("logged_in".to_string());
            if !flipped.swap(true, Ordering::SeqCst) {
                // the session evaporates: QR screen replaces the app
                flip_driver.unbind(locators::LOGGED_IN[0]);
                let canvas = flip_driver.present(locators::QR_CODE[0]);
                flip_driver.set_image(canvas, b"qr");
            }
            Ok(())
        }
    });

    let sink = events.clone();
    client.on(EventKind::LoggedOut, move |_| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push("logged_out".to_string());
            Ok(())
        }
    });

    let stopper = client.clone();
    let sink = events.clone();
    client.on(EventKind::Qr, move |_| {
        let stopper = stopper.clone();
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push("qr".to_string());
            stopper.stop();
            Ok(())
        }
    });

    let runner = client.clone();
    let task = tokio::spawn(async move { runner.start().await });
    task.await.unwrap().unwrap();

    let events = events.lock().unwrap();
    let sequence: Vec<&str> = events
        .iter()
        .map(String::as_str)
        .filter(|e| !e.starts_with("tick:"))
        .collect();
    assert_eq!(sequence, vec!["logged_in", "logged_out", "qr"]);
}

#[tokio::test]
async fn unread_chats_are_reported_while_logged_in() {
    let driver = MockDriver::new();
    driver.present(locators::LOGGED_IN[0]);

    let list = driver.present(locators::CHAT_LIST[0]);
    let row = driver.add_element(&[], "");
    let title = driver.add_element(&[("title", "Mom")], "Mom");
    let badge = driver.add_element(&[("aria-label", "3 unread messages")], "3");
    driver.bind_within(list, locators::SEARCH_ITEM[0], &[row]);
    driver.bind_within(row, locators::SPAN_TITLE[0], &[title]);
    driver.bind_within(row, locators::UNREAD_BADGE[0], &[badge]);

    let client = Arc::new(Client::new(driver, loop_config()));
    let seen: Arc<Mutex<Vec<whatsbot::SearchResult>>> = Default::default();

    let stopper = client.clone();
    let sink = seen.clone();
    client.on(EventKind::UnreadChat, move |event| {
        let stopper = stopper.clone();
        let sink = sink.clone();
        async move {
            if let Event::UnreadChat(chats) = event {
                sink.lock().unwrap().extend(chats);
            }
            stopper.stop();
            Ok(())
        }
    });

    let runner = client.clone();
    tokio::spawn(async move { runner.start().await })
        .await
        .unwrap()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name, "Mom");
    assert_eq!(
        seen[0].unread_count,
        Some(whatsbot::UnreadCount::Exact(3))
    );
}

#[tokio::test]
async fn driver_failure_stops_the_loop_through_on_error() {
    let driver = MockDriver::new();
    driver.present(locators::LOGGED_IN[0]);

    let client = Arc::new(Client::new(driver, loop_config()));
    let errors: EventLog = Default::default();

    let fail_driver = client.driver();
    client.on(EventKind::Tick, move |_| {
        let fail_driver = fail_driver.clone();
        async move {
            // the browser dies under the loop
            fail_driver.set_failing(true);
            Ok(())
        }
    });

    let sink = errors.clone();
    client.on(EventKind::Error, move |event| {
        let sink = sink.clone();
        async move {
            if let Event::Error(description) = event {
                sink.lock().unwrap().push(description);
            }
            Ok(())
        }
    });

    let runner = client.clone();
    let result = tokio::spawn(async move { runner.start().await })
        .await
        .unwrap();
    assert!(result.is_err());

    let errors = errors.lock().unwrap();
    assert!(errors.iter().any(|e| e.contains("state detection failed")));
}

#[tokio::test]
async fn start_is_exclusive_while_running() {
    let driver = MockDriver::new();
    driver.present(locators::LOGGED_IN[0]);

    let client = Arc::new(Client::new(driver, loop_config()));
    let runner = client.clone();
    let task = tokio::spawn(async move { runner.start().await });

    assert!(client.wait_until_logged_in(Duration::from_secs(5)).await);
    assert!(client.start().await.is_err());

    client.stop();
    task.await.unwrap().unwrap();
}
