pub mod config;
pub mod driver;

pub use config::{BrowserConfig, Config, SessionConfig, Viewport};
pub use driver::{Download, Driver};
