use crate::core::{BrowserConfig, Download, Driver};
use crate::errors::{ClientError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Page::{
    CaptureScreenshotFormatOption, SetDownloadBehavior, SetDownloadBehaviorBehaviorOption,
    Viewport as ScreenshotViewport,
};
use headless_chrome::protocol::cdp::DOM::SetFileInputFiles;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// How often presence waits re-probe the page.
const PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// JS runtime shared by every script: a page-side element registry plus a
/// selector resolver. Selectors starting with `//` or `.//` go through
/// XPath, everything else through `querySelectorAll`; selector lists
/// resolve to the first candidate with at least one match.
const JS_PRELUDE: &str = r#"
    const H = (window.__wbHandles = window.__wbHandles || new Map());
    window.__wbNextId = window.__wbNextId || 1;
    const keep = (node) => { const id = window.__wbNextId++; H.set(id, node); return id; };
    const get = (id) => H.get(id) || null;
    const ok = (value) => JSON.stringify({ ok: true, value: value === undefined ? null : value });
    const fail = (error) => JSON.stringify({ ok: false, error: String(error) });
    const resolve = (selector, root) => {
        if (selector.startsWith('//') || selector.startsWith('.//')) {
            const out = [];
            const it = document.evaluate(selector, root || document, null,
                XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
            for (let i = 0; i < it.snapshotLength; i++) out.push(it.snapshotItem(i));
            return out;
        }
        return Array.from((root || document).querySelectorAll(selector));
    };
    const resolveFirst = (selectors, root) => {
        for (const selector of selectors) {
            let nodes = [];
            try { nodes = resolve(selector, root); } catch (e) { nodes = []; }
            if (nodes.length > 0) return nodes;
        }
        return [];
    };
"#;

/// Handle into the page-side element registry. Valid until the next
/// navigation replaces the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChromeElement(u64);

/// [`Driver`] implementation over a headless (or headful) Chrome session.
///
/// All DOM access goes through evaluated scripts against one tab; typing
/// and key presses go through real CDP input events so the target app's
/// editor sees trusted keystrokes.
pub struct ChromeDriver {
    // keeps the browser process alive for the driver's lifetime
    _browser: Browser,
    tab: Arc<Tab>,
    download_dir: PathBuf,
}

impl ChromeDriver {
    /// Launch a Chrome instance and prepare a tab for automation. With
    /// `profile_dir` set, the authenticated session persists across runs.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={ua}"));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .user_data_dir(config.profile_dir.clone())
            .idle_browser_timeout(Duration::from_millis(config.idle_timeout_ms))
            .args(args)
            .build()
            .map_err(|err| ClientError::LaunchFailed(err.to_string()))?;

        let browser = Browser::new(launch_options)
            .map_err(|err| ClientError::LaunchFailed(err.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|err| ClientError::LaunchFailed(err.to_string()))?;

        let download_dir =
            std::env::temp_dir().join(format!("whatsbot-downloads-{}", std::process::id()));
        std::fs::create_dir_all(&download_dir)?;

        let driver = Self {
            _browser: browser,
            tab,
            download_dir,
        };
        driver.allow_downloads()?;
        Ok(driver)
    }

    fn allow_downloads(&self) -> Result<()> {
        self.tab
            .call_method(SetDownloadBehavior {
                behavior: SetDownloadBehaviorBehaviorOption::Allow,
                download_path: Some(self.download_dir.to_string_lossy().to_string()),
            })
            .map_err(|err| ClientError::Driver(err.to_string()))?;
        Ok(())
    }

    /// Run a script body against the page. The body must finish with
    /// `return ok(...)` or `return fail(...)`.
    fn run(&self, body: &str) -> Result<Value> {
        let script = format!("(function() {{\n{JS_PRELUDE}\n{body}\n}})()");
        let object = self
            .tab
            .evaluate(&script, false)
            .map_err(|err| ClientError::Driver(err.to_string()))?;

        let Some(Value::String(raw)) = object.value else {
            return Err(ClientError::Driver(
                "script returned no payload".to_string(),
            ));
        };
        let parsed: Value = serde_json::from_str(&raw)?;
        if parsed.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(parsed.get("value").cloned().unwrap_or(Value::Null))
        } else {
            let message = parsed
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("script failed");
            Err(ClientError::Driver(message.to_string()))
        }
    }

    fn focus(&self, element: &ChromeElement) -> Result<()> {
        self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             if (node.focus) node.focus();\n\
             return ok(null);",
            id = element.0
        ))?;
        Ok(())
    }
}

fn js_list(selectors: &[&str]) -> Result<String> {
    Ok(serde_json::to_string(selectors)?)
}

fn js_str(text: &str) -> Result<String> {
    Ok(serde_json::to_string(text)?)
}

fn element_ids(value: Value) -> Vec<ChromeElement> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .map(ChromeElement)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Driver for ChromeDriver {
    type Element = ChromeElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|err| ClientError::NavigationFailed(err.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|err| ClientError::NavigationFailed(err.to_string()))?;
        Ok(())
    }

    async fn query(&self, selectors: &[&str]) -> Result<Vec<ChromeElement>> {
        let value = self.run(&format!(
            "return ok(resolveFirst({}, null).map(keep));",
            js_list(selectors)?
        ))?;
        Ok(element_ids(value))
    }

    async fn query_within(
        &self,
        scope: &ChromeElement,
        selectors: &[&str],
    ) -> Result<Vec<ChromeElement>> {
        let value = self.run(&format!(
            "const root = get({id});\n\
             if (!root) return fail('stale element handle');\n\
             return ok(resolveFirst({selectors}, root).map(keep));",
            id = scope.0,
            selectors = js_list(selectors)?
        ))?;
        Ok(element_ids(value))
    }

    async fn count(&self, selectors: &[&str]) -> Result<usize> {
        let value = self.run(&format!(
            "return ok(resolveFirst({}, null).length);",
            js_list(selectors)?
        ))?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn attribute(&self, element: &ChromeElement, name: &str) -> Result<Option<String>> {
        let value = self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             return ok(node.getAttribute({name}));",
            id = element.0,
            name = js_str(name)?
        ))?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn text(&self, element: &ChromeElement) -> Result<String> {
        let value = self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             const text = node.innerText !== undefined ? node.innerText : node.textContent;\n\
             return ok(text || '');",
            id = element.0
        ))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, element: &ChromeElement) -> Result<()> {
        self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             try {{\n\
                 node.scrollIntoView({{ block: 'center' }});\n\
                 if (node.focus) node.focus();\n\
                 if (typeof node.click === 'function') {{\n\
                     node.click();\n\
                 }} else {{\n\
                     const rect = node.getBoundingClientRect();\n\
                     const cx = rect.left + rect.width / 2;\n\
                     const cy = rect.top + rect.height / 2;\n\
                     for (const type of ['mousedown', 'mouseup', 'click']) {{\n\
                         node.dispatchEvent(new MouseEvent(type, {{\n\
                             bubbles: true, cancelable: true, clientX: cx, clientY: cy\n\
                         }}));\n\
                     }}\n\
                 }}\n\
                 return ok(null);\n\
             }} catch (e) {{ return fail(e.message); }}",
            id = element.0
        ))?;
        Ok(())
    }

    async fn hover(&self, element: &ChromeElement) -> Result<()> {
        self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             const rect = node.getBoundingClientRect();\n\
             const cx = rect.left + rect.width / 2;\n\
             const cy = rect.top + rect.height / 2;\n\
             for (const type of ['mouseover', 'mouseenter', 'mousemove']) {{\n\
                 node.dispatchEvent(new MouseEvent(type, {{\n\
                     bubbles: true, cancelable: true, clientX: cx, clientY: cy\n\
                 }}));\n\
             }}\n\
             return ok(null);",
            id = element.0
        ))?;
        Ok(())
    }

    async fn type_text(&self, element: &ChromeElement, text: &str) -> Result<()> {
        self.focus(element)?;
        self.tab
            .type_str(text)
            .map_err(|err| ClientError::Driver(err.to_string()))?;
        Ok(())
    }

    async fn press_key(&self, element: &ChromeElement, key: &str) -> Result<()> {
        self.focus(element)?;
        let mut parts = key.rsplitn(2, '+');
        let key_name = parts.next().unwrap_or(key);
        match parts.next() {
            Some("Shift") => self
                .tab
                .press_key_with_modifiers(key_name, Some(&[ModifierKey::Shift])),
            Some("Ctrl") => self
                .tab
                .press_key_with_modifiers(key_name, Some(&[ModifierKey::Ctrl])),
            Some("Alt") => self
                .tab
                .press_key_with_modifiers(key_name, Some(&[ModifierKey::Alt])),
            Some(other) => {
                return Err(ClientError::Driver(format!(
                    "unsupported key modifier: {other}"
                )))
            }
            None => self.tab.press_key(key_name),
        }
        .map_err(|err| ClientError::Driver(err.to_string()))?;
        Ok(())
    }

    async fn set_input_files(&self, element: &ChromeElement, path: &Path) -> Result<()> {
        let expression = format!(
            "window.__wbHandles instanceof Map ? window.__wbHandles.get({}) : null",
            element.0
        );
        let object = self
            .tab
            .evaluate(&expression, false)
            .map_err(|err| ClientError::Driver(err.to_string()))?;
        let Some(object_id) = object.object_id else {
            return Err(ClientError::Driver("stale element handle".to_string()));
        };

        self.tab
            .call_method(SetFileInputFiles {
                files: vec![path.to_string_lossy().to_string()],
                node_id: None,
                backend_node_id: None,
                object_id: Some(object_id),
            })
            .map_err(|err| ClientError::Driver(err.to_string()))?;
        Ok(())
    }

    async fn wait_for(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<Option<ChromeElement>> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.query(selectors).await?;
            if let Some(first) = found.first().copied() {
                if found.len() > 1 {
                    self.release(&found[1..]).await.ok();
                }
                return Ok(Some(first));
            }
            if Instant::now() >= deadline {
                debug!(?selectors, "wait_for timed out");
                return Ok(None);
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn parent(&self, element: &ChromeElement) -> Result<Option<ChromeElement>> {
        let value = self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             return ok(node.parentElement ? keep(node.parentElement) : null);",
            id = element.0
        ))?;
        Ok(value.as_u64().map(ChromeElement))
    }

    async fn capture_image(&self, element: &ChromeElement) -> Result<Vec<u8>> {
        let value = self.run(&format!(
            "const node = get({id});\n\
             if (!node) return fail('stale element handle');\n\
             if (node.tagName === 'CANVAS') {{\n\
                 try {{ return ok(node.toDataURL('image/png')); }}\n\
                 catch (e) {{ return fail(e.message); }}\n\
             }}\n\
             const rect = node.getBoundingClientRect();\n\
             return ok({{ x: rect.x, y: rect.y, width: rect.width, height: rect.height }});",
            id = element.0
        ))?;

        // canvases export their own pixels; anything else is clipped out of
        // a page screenshot
        if let Some(data_url) = value.as_str() {
            let encoded = data_url
                .split_once("base64,")
                .map(|(_, tail)| tail)
                .unwrap_or(data_url);
            return BASE64
                .decode(encoded)
                .map_err(|err| ClientError::Driver(format!("canvas decode failed: {err}")));
        }

        let clip = ScreenshotViewport {
            x: value.get("x").and_then(Value::as_f64).unwrap_or(0.0),
            y: value.get("y").and_then(Value::as_f64).unwrap_or(0.0),
            width: value.get("width").and_then(Value::as_f64).unwrap_or(0.0),
            height: value.get("height").and_then(Value::as_f64).unwrap_or(0.0),
            scale: 1.0,
        };
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(|err| ClientError::Driver(err.to_string()))
    }

    async fn await_download(
        &self,
        trigger: &ChromeElement,
        timeout: Duration,
    ) -> Result<Download> {
        let before: HashSet<PathBuf> = std::fs::read_dir(&self.download_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();

        self.click(trigger).await?;

        let deadline = Instant::now() + timeout;
        loop {
            for entry in std::fs::read_dir(&self.download_dir)? {
                let path = entry?.path();
                if before.contains(&path) {
                    continue;
                }
                let name = path
                    .file_name()
                    .and_then(OsStr::to_str)
                    .unwrap_or_default()
                    .to_string();
                if name.ends_with(".crdownload") || name.ends_with(".tmp") {
                    continue;
                }
                if file_is_stable(&path).await? {
                    return Ok(Download {
                        suggested_name: Some(name),
                        path,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout("download completion".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn release(&self, elements: &[ChromeElement]) -> Result<()> {
        if elements.is_empty() {
            return Ok(());
        }
        let ids: Vec<u64> = elements.iter().map(|e| e.0).collect();
        self.run(&format!(
            "for (const id of {ids:?}) H.delete(id);\nreturn ok(null);"
        ))?;
        Ok(())
    }
}

/// A download is complete once its size stops moving.
async fn file_is_stable(path: &Path) -> Result<bool> {
    let first = std::fs::metadata(path)?.len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = std::fs::metadata(path)?.len();
    Ok(first == second && second > 0)
}
