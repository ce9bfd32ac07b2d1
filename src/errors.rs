use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

// headless_chrome surfaces anyhow errors from most of its API
impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        ClientError::Driver(err.to_string())
    }
}
