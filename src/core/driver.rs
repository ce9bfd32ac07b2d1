use crate::errors::{ClientError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Abstraction over the underlying browser-automation driver.
///
/// Everything the client knows about the page goes through this trait, so
/// the automation logic can run against a real browser or the in-memory
/// driver in [`crate::testing`].
///
/// Selector expressions starting with `//` or `.//` are XPath, everything
/// else is CSS. Wherever a method takes a selector *list*, candidates are
/// tried in order and the first one that resolves to at least one element
/// wins; later entries are fallbacks for older UI revisions.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Handle to a live element on the page. Valid until the next navigation.
    type Element: Clone + Send + Sync + 'static;

    /// Navigate the session's page to a URL.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Resolve a selector list against the whole document.
    async fn query(&self, selectors: &[&str]) -> Result<Vec<Self::Element>>;

    /// Resolve a selector list against a subtree.
    async fn query_within(
        &self,
        scope: &Self::Element,
        selectors: &[&str],
    ) -> Result<Vec<Self::Element>>;

    /// Count matches without materializing element handles. Presence probes
    /// run every poll cycle, so this must stay cheap.
    async fn count(&self, selectors: &[&str]) -> Result<usize>;

    /// Read an attribute; `None` when the attribute is absent.
    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    /// Read the rendered text of an element.
    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    async fn hover(&self, element: &Self::Element) -> Result<()>;

    /// Type text into a focused element through real input events.
    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<()>;

    /// Press a named key, e.g. `"Enter"` or `"Shift+Enter"`.
    async fn press_key(&self, element: &Self::Element, key: &str) -> Result<()>;

    /// Populate a `<input type="file">` element.
    async fn set_input_files(&self, element: &Self::Element, path: &Path) -> Result<()>;

    /// Wait until a selector list resolves, up to `timeout`. `Ok(None)`
    /// means the condition never showed up; errors are driver failures.
    async fn wait_for(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<Option<Self::Element>>;

    /// Parent element, `None` at the document root.
    async fn parent(&self, element: &Self::Element) -> Result<Option<Self::Element>>;

    /// Capture an element as encoded image bytes (QR canvas, screenshots).
    async fn capture_image(&self, element: &Self::Element) -> Result<Vec<u8>>;

    /// Click a download trigger and wait for the resulting download.
    async fn await_download(
        &self,
        trigger: &Self::Element,
        timeout: Duration,
    ) -> Result<Download>;

    /// Drop page-side references held for `elements`. Drivers whose handles
    /// are self-managing can keep the default no-op.
    async fn release(&self, _elements: &[Self::Element]) -> Result<()> {
        Ok(())
    }
}

/// A completed browser download, not yet moved to its final location.
#[derive(Debug, Clone)]
pub struct Download {
    /// Filename suggested by the browser, when it provided one.
    pub suggested_name: Option<String>,
    /// Where the driver parked the downloaded bytes.
    pub path: PathBuf,
}

impl Download {
    /// Move the download into `dest_dir`, preferring the driver-suggested
    /// name and falling back to `fallback_name`.
    pub fn persist_to(&self, dest_dir: &Path, fallback_name: &str) -> Result<PathBuf> {
        let name = self
            .suggested_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback_name);
        if name.is_empty() {
            return Err(ClientError::Download(
                "no filename available for download".to_string(),
            ));
        }

        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(name);
        // rename fails across filesystems; fall back to copy + remove
        if std::fs::rename(&self.path, &dest).is_err() {
            std::fs::copy(&self.path, &dest)?;
            std::fs::remove_file(&self.path).ok();
        }
        Ok(dest)
    }
}
