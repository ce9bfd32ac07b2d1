//! In-memory driver for exercising the client without a browser.
//!
//! Fixtures are a small node arena plus a binding table mapping
//! `(scope, selector)` pairs to nodes. The mock does not implement a
//! selector engine; tests bind the exact expressions from
//! [`crate::locators`], which also pins down which locator an operation is
//! expected to use.

use crate::core::{Download, Driver};
use crate::errors::{ClientError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// parallel tests park mock downloads side by side in the temp dir
static DOWNLOAD_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Handle into the mock node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockElement(usize);

#[derive(Debug, Default)]
struct Node {
    attrs: HashMap<String, String>,
    text: String,
    parent: Option<usize>,
}

#[derive(Default)]
struct MockState {
    nodes: Vec<Node>,
    bindings: HashMap<(Option<usize>, String), Vec<usize>>,
    navigations: Vec<String>,
    clicks: Vec<usize>,
    hovers: Vec<usize>,
    typed: Vec<(usize, String)>,
    keys: Vec<(usize, String)>,
    files: Vec<(usize, PathBuf)>,
    downloads: HashMap<usize, (Option<String>, Vec<u8>)>,
    images: HashMap<usize, Vec<u8>>,
    released: Vec<usize>,
    failing: bool,
}

/// A scriptable [`Driver`] whose page is assembled by the test.
#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node to the arena.
    pub fn add_element(&self, attrs: &[(&str, &str)], text: &str) -> MockElement {
        self.insert(None, attrs, text)
    }

    /// Add a node whose [`Driver::parent`] is `parent`.
    pub fn add_child(
        &self,
        parent: MockElement,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> MockElement {
        self.insert(Some(parent.0), attrs, text)
    }

    fn insert(&self, parent: Option<usize>, attrs: &[(&str, &str)], text: &str) -> MockElement {
        let mut state = self.lock();
        let id = state.nodes.len();
        state.nodes.push(Node {
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: text.to_string(),
            parent,
        });
        MockElement(id)
    }

    /// Bind a document-scoped selector to a set of nodes.
    pub fn bind(&self, selector: &str, elements: &[MockElement]) {
        self.lock().bindings.insert(
            (None, selector.to_string()),
            elements.iter().map(|e| e.0).collect(),
        );
    }

    /// Bind a selector resolved within `scope` to a set of nodes.
    pub fn bind_within(&self, scope: MockElement, selector: &str, elements: &[MockElement]) {
        self.lock().bindings.insert(
            (Some(scope.0), selector.to_string()),
            elements.iter().map(|e| e.0).collect(),
        );
    }

    /// Remove a document-scoped binding again (state transitions).
    pub fn unbind(&self, selector: &str) {
        self.lock().bindings.remove(&(None, selector.to_string()));
    }

    /// Shorthand: create an anonymous node and bind it to `selector`.
    pub fn present(&self, selector: &str) -> MockElement {
        let element = self.add_element(&[], "");
        self.bind(selector, &[element]);
        element
    }

    /// Arm a node as a download trigger.
    pub fn set_download(&self, trigger: MockElement, suggested_name: Option<&str>, bytes: &[u8]) {
        self.lock().downloads.insert(
            trigger.0,
            (suggested_name.map(str::to_string), bytes.to_vec()),
        );
    }

    /// Arm a node with capturable image bytes.
    pub fn set_image(&self, element: MockElement, bytes: &[u8]) {
        self.lock().images.insert(element.0, bytes.to_vec());
    }

    /// Make every driver call fail, as a crashed browser would.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn was_clicked(&self, element: MockElement) -> bool {
        self.lock().clicks.contains(&element.0)
    }

    pub fn typed_into(&self, element: MockElement) -> Vec<String> {
        self.lock()
            .typed
            .iter()
            .filter(|(id, _)| *id == element.0)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn keys_pressed(&self, element: MockElement) -> Vec<String> {
        self.lock()
            .keys
            .iter()
            .filter(|(id, _)| *id == element.0)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn files_set(&self, element: MockElement) -> Vec<PathBuf> {
        self.lock()
            .files
            .iter()
            .filter(|(id, _)| *id == element.0)
            .map(|(_, path)| path.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    fn check(&self) -> Result<()> {
        if self.lock().failing {
            Err(ClientError::Driver("mock driver failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn resolve(&self, scope: Option<usize>, selectors: &[&str]) -> Vec<MockElement> {
        let state = self.lock();
        for selector in selectors {
            if let Some(ids) = state.bindings.get(&(scope, selector.to_string())) {
                if !ids.is_empty() {
                    return ids.iter().copied().map(MockElement).collect();
                }
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Element = MockElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.check()?;
        self.lock().navigations.push(url.to_string());
        Ok(())
    }

    async fn query(&self, selectors: &[&str]) -> Result<Vec<MockElement>> {
        self.check()?;
        Ok(self.resolve(None, selectors))
    }

    async fn query_within(
        &self,
        scope: &MockElement,
        selectors: &[&str],
    ) -> Result<Vec<MockElement>> {
        self.check()?;
        Ok(self.resolve(Some(scope.0), selectors))
    }

    async fn count(&self, selectors: &[&str]) -> Result<usize> {
        self.check()?;
        Ok(self.resolve(None, selectors).len())
    }

    async fn attribute(&self, element: &MockElement, name: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self
            .lock()
            .nodes
            .get(element.0)
            .and_then(|node| node.attrs.get(name))
            .cloned())
    }

    async fn text(&self, element: &MockElement) -> Result<String> {
        self.check()?;
        Ok(self
            .lock()
            .nodes
            .get(element.0)
            .map(|node| node.text.clone())
            .unwrap_or_default())
    }

    async fn click(&self, element: &MockElement) -> Result<()> {
        self.check()?;
        self.lock().clicks.push(element.0);
        Ok(())
    }

    async fn hover(&self, element: &MockElement) -> Result<()> {
        self.check()?;
        self.lock().hovers.push(element.0);
        Ok(())
    }

    async fn type_text(&self, element: &MockElement, text: &str) -> Result<()> {
        self.check()?;
        let mut state = self.lock();
        state.typed.push((element.0, text.to_string()));
        if let Some(node) = state.nodes.get_mut(element.0) {
            node.text.push_str(text);
        }
        Ok(())
    }

    async fn press_key(&self, element: &MockElement, key: &str) -> Result<()> {
        self.check()?;
        let mut state = self.lock();
        state.keys.push((element.0, key.to_string()));
        if key == "Shift+Enter" {
            if let Some(node) = state.nodes.get_mut(element.0) {
                node.text.push('\n');
            }
        }
        Ok(())
    }

    async fn set_input_files(&self, element: &MockElement, path: &Path) -> Result<()> {
        self.check()?;
        self.lock().files.push((element.0, path.to_path_buf()));
        Ok(())
    }

    async fn wait_for(
        &self,
        selectors: &[&str],
        _timeout: Duration,
    ) -> Result<Option<MockElement>> {
        self.check()?;
        Ok(self.resolve(None, selectors).into_iter().next())
    }

    async fn parent(&self, element: &MockElement) -> Result<Option<MockElement>> {
        self.check()?;
        Ok(self
            .lock()
            .nodes
            .get(element.0)
            .and_then(|node| node.parent)
            .map(MockElement))
    }

    async fn capture_image(&self, element: &MockElement) -> Result<Vec<u8>> {
        self.check()?;
        self.lock()
            .images
            .get(&element.0)
            .cloned()
            .ok_or_else(|| ClientError::Driver("no image armed for element".to_string()))
    }

    async fn await_download(
        &self,
        trigger: &MockElement,
        _timeout: Duration,
    ) -> Result<Download> {
        self.check()?;
        let (suggested_name, bytes) = {
            let mut state = self.lock();
            state.clicks.push(trigger.0);
            state
                .downloads
                .get(&trigger.0)
                .cloned()
                .ok_or_else(|| ClientError::Timeout("download completion".to_string()))?
        };

        let path = std::env::temp_dir().join(format!(
            "whatsbot-mock-{}-{}.part",
            std::process::id(),
            DOWNLOAD_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::write(&path, &bytes)?;
        Ok(Download {
            suggested_name,
            path,
        })
    }

    async fn release(&self, elements: &[MockElement]) -> Result<()> {
        self.check()?;
        self.lock().released.extend(elements.iter().map(|e| e.0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_chains_resolve_in_order() {
        let driver = MockDriver::new();
        let element = driver.add_element(&[("title", "Search")], "");
        // only the second candidate is bound
        driver.bind("//button[@title='Search']", &[element]);

        let found = driver
            .query(&["//button[@aria-label='Search']", "//button[@title='Search']"])
            .await
            .unwrap();
        assert_eq!(found, vec![element]);
    }

    #[tokio::test]
    async fn typed_text_is_reflected() {
        let driver = MockDriver::new();
        let input = driver.add_element(&[], "");
        driver.type_text(&input, "hello").await.unwrap();
        driver.press_key(&input, "Shift+Enter").await.unwrap();
        driver.type_text(&input, "world").await.unwrap();

        assert_eq!(driver.text(&input).await.unwrap(), "hello\nworld");
        assert_eq!(driver.typed_into(input), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn failing_mode_surfaces_driver_errors() {
        let driver = MockDriver::new();
        driver.set_failing(true);
        assert!(driver.query(&["div"]).await.is_err());
    }
}
