use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub browser: BrowserConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Profile directory holding the authenticated session. `None` starts
    /// a throwaway profile that will need a fresh QR scan.
    pub profile_dir: Option<PathBuf>,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
    /// How long the browser may sit without CDP activity before the
    /// transport gives up on it.
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    /// Poll interval of the automation loop.
    pub poll_interval_ms: u64,
    /// Default timeout for actions that wait on a UI condition.
    pub action_timeout_ms: u64,
    pub download_timeout_ms: u64,
    /// Probe the chat list for unread chats every N poll cycles while
    /// logged in; 0 disables the probe.
    pub unread_check_every_ticks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            profile_dir: None,
            viewport: Viewport::default(),
            user_agent: None,
            args: vec![],
            idle_timeout_ms: 60000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://web.whatsapp.com".to_string(),
            poll_interval_ms: 500,
            action_timeout_ms: 10000,
            download_timeout_ms: 30000,
            unread_check_every_ticks: 4,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
