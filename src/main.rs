use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use whatsbot::{Client, Config, Event, EventKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let matches = Command::new("whatsbot")
        .about("WhatsApp Web automation demo bot")
        .arg(
            Arg::new("profile")
                .long("profile")
                .value_name("DIR")
                .help("Browser profile directory holding the authenticated session"),
        )
        .arg(
            Arg::new("headful")
                .long("headful")
                .action(ArgAction::SetTrue)
                .help("Show the browser window"),
        )
        .arg(
            Arg::new("send-to")
                .long("send-to")
                .value_name("TARGET")
                .help("Chat title or phone number to message once logged in"),
        )
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .default_value("Hello from whatsbot!")
                .help("Message text for --send-to"),
        )
        .get_matches();

    let mut config = Config::default();
    config.browser.headless = !matches.get_flag("headful");
    config.browser.profile_dir = matches.get_one::<String>("profile").map(PathBuf::from);

    let send_to = matches.get_one::<String>("send-to").cloned();
    let message = matches
        .get_one::<String>("message")
        .cloned()
        .unwrap_or_default();

    info!("launching browser session");
    let client = Arc::new(Client::launch(config).await?);

    client.on(EventKind::Start, |_| async {
        info!("client started");
        Ok(())
    });

    client.on(EventKind::Auth, |_| async {
        info!("authentication required");
        Ok(())
    });

    client.on(EventKind::Qr, |event| async move {
        if let Event::Qr(bytes) = event {
            std::fs::write("qr.png", &bytes)?;
            info!("QR code written to qr.png, scan it with your phone");
        }
        Ok(())
    });

    client.on_filtered(
        EventKind::Loading,
        |_| async {
            info!("chats still loading...");
            Ok(())
        },
        |event| matches!(event, Event::Loading(true)),
    );

    let on_login = client.clone();
    client.on(EventKind::LoggedIn, move |_| {
        let client = on_login.clone();
        let target = send_to.clone();
        let message = message.clone();
        async move {
            info!("logged in");
            let Some(target) = target else { return Ok(()) };

            if client.send_message(&target, &message, true).await? {
                info!(chat = %target, "demo message sent");
            } else {
                error!(chat = %target, "could not send demo message");
            }
            client.stop();
            Ok(())
        }
    });

    client.on(EventKind::UnreadChat, |event| async move {
        if let Event::UnreadChat(chats) = event {
            for chat in chats {
                info!(name = %chat.name, unread = ?chat.unread_count, "unread chat");
            }
        }
        Ok(())
    });

    client.on(EventKind::LoggedOut, |_| async {
        error!("session was logged out");
        Ok(())
    });

    client.on(EventKind::Error, |event| async move {
        if let Event::Error(description) = event {
            error!("{description}");
        }
        Ok(())
    });

    client.start().await?;
    Ok(())
}
