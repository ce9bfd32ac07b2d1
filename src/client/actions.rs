use super::Client;
use crate::core::Driver;
use crate::errors::{ClientError, Result};
use crate::locators;
use crate::model::{ChatMessage, FileMessage, Message, SearchResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

const COMPOSER_POLL: Duration = Duration::from_millis(50);

impl<D: Driver> Client<D> {
    fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.config.session.action_timeout_ms)
    }

    /// Open a chat by its visible title among the currently rendered chats.
    ///
    /// When the chat is not in the rendered list and `force_via_url` is
    /// set, fall back to navigating the deep link built from `target` —
    /// the only path that works for contacts not in the list. `Ok(false)`
    /// means not found or not opened in time; `Err` is a driver failure.
    pub async fn open(
        &self,
        target: &str,
        timeout: Option<Duration>,
        force_via_url: bool,
    ) -> Result<bool> {
        let timeout = timeout.unwrap_or_else(|| self.action_timeout());

        if let Some(title) = self.find_chat_title(target).await? {
            self.driver.click(&title).await?;
            let opened = self
                .driver
                .wait_for(locators::CHAT_INPUT_BOX, timeout)
                .await?
                .is_some();
            self.driver.release(&[title]).await.ok();
            return Ok(opened);
        }

        if !force_via_url {
            debug!(chat = target, "chat not in the visible list");
            return Ok(false);
        }

        let url = deep_link(&self.config.session.base_url, target)?;
        info!(chat = target, %url, "opening chat via deep link");
        self.driver.navigate(url.as_str()).await?;
        Ok(self
            .driver
            .wait_for(locators::CHAT_INPUT_BOX, timeout)
            .await?
            .is_some())
    }

    /// Resolve the target chat, type `text` into the composer and send it.
    /// Explicit newlines are typed as separate segments joined with
    /// Shift+Enter, matching the composer's multi-line input semantics.
    pub async fn send_message(
        &self,
        target: &str,
        text: &str,
        open_via_url: bool,
    ) -> Result<bool> {
        if !self.open(target, None, open_via_url).await? {
            return Ok(false);
        }

        let timeout = self.action_timeout();
        let Some(input) = self
            .driver
            .wait_for(locators::CHAT_INPUT_BOX, timeout)
            .await?
        else {
            return Ok(false);
        };
        self.driver.click(&input).await?;

        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                self.driver.press_key(&input, "Shift+Enter").await?;
            }
            if !line.is_empty() {
                self.driver.type_text(&input, line).await?;
            }
        }

        // the composer renders typed input through its own debounce; send
        // only after it reflects the text
        if let Some(marker) = text.split('\n').rev().map(str::trim).find(|l| !l.is_empty()) {
            if !self.wait_for_composer(&input, marker, timeout).await? {
                warn!(chat = target, "composer never reflected the typed text");
                return Ok(false);
            }
        }

        self.trigger_send(&input).await?;
        self.driver.release(&[input]).await.ok();
        info!(chat = target, "message sent");
        Ok(true)
    }

    /// Resolve the target chat, attach `path` and confirm the send once the
    /// attachment preview has rendered.
    pub async fn send_file(&self, target: &str, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Err(ClientError::NotFound(format!(
                "file {} does not exist",
                path.display()
            )));
        }
        if !self.open(target, None, false).await? {
            return Ok(false);
        }

        let timeout = self.action_timeout();
        let Some(attach) = self
            .driver
            .wait_for(locators::ATTACH_BUTTON, timeout)
            .await?
        else {
            return Ok(false);
        };
        self.driver.click(&attach).await?;
        self.driver.release(&[attach]).await.ok();

        let Some(file_input) = self.driver.wait_for(locators::FILE_INPUT, timeout).await?
        else {
            return Ok(false);
        };
        self.driver.set_input_files(&file_input, path).await?;

        let Some(send) = self.driver.wait_for(locators::SEND_BUTTON, timeout).await? else {
            return Ok(false);
        };
        self.driver.click(&send).await?;
        self.driver.release(&[file_input, send]).await.ok();

        info!(chat = target, file = %path.display(), "file sent");
        Ok(true)
    }

    /// Open the search overlay, type `query` and enumerate the results.
    /// With `close`, the overlay is dismissed again afterwards.
    pub async fn search_conversations(
        &self,
        query: &str,
        close: bool,
    ) -> Result<Vec<SearchResult>> {
        let timeout = self.action_timeout();

        if let Some(button) = self
            .driver
            .query(locators::SEARCH_BUTTON)
            .await?
            .into_iter()
            .next()
        {
            self.driver.click(&button).await?;
            self.driver.release(&[button]).await.ok();
        }

        let Some(text_box) = self
            .driver
            .wait_for(locators::SEARCH_TEXT_BOX, timeout)
            .await?
        else {
            return Err(ClientError::NotFound("search text box".to_string()));
        };
        self.driver.click(&text_box).await?;
        self.driver.type_text(&text_box, query).await?;

        let Some(results) = self
            .driver
            .wait_for(locators::SEARCH_RESULT, timeout)
            .await?
        else {
            if close {
                self.close_search().await?;
            }
            return Ok(Vec::new());
        };

        let items = self.driver.query_within(&results, locators::SEARCH_ITEM).await?;
        let mut parsed = Vec::with_capacity(items.len());
        for item in &items {
            parsed.push(SearchResult::from_element(self.driver.as_ref(), item).await);
        }
        self.driver.release(&items).await.ok();
        self.driver.release(&[results, text_box]).await.ok();

        if close {
            self.close_search().await?;
        }
        info!(query, results = parsed.len(), "search finished");
        Ok(parsed)
    }

    /// Collect every currently rendered message of the open conversation.
    /// Rows that fail extraction are skipped, never returned half-filled.
    pub async fn collect_messages(&self) -> Result<Vec<ChatMessage<D::Element>>> {
        let Some(chat) = self
            .driver
            .query(locators::CHAT_DIV)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(Vec::new());
        };

        let rows = self.driver.query_within(&chat, locators::CHAT_ROW).await?;
        let mut messages = Vec::new();
        for row in &rows {
            if let Some(file) = FileMessage::from_element(self.driver.as_ref(), row).await {
                messages.push(ChatMessage::File(file));
            } else if let Some(message) = Message::from_element(self.driver.as_ref(), row).await
            {
                messages.push(ChatMessage::Text(message));
            }
        }

        self.driver.release(&[chat]).await.ok();
        Ok(messages)
    }

    /// Download every file message of the open conversation into
    /// `dest_dir`. Per-file failures are logged and skipped.
    pub async fn download_all_files(&self, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let timeout = Duration::from_millis(self.config.session.download_timeout_ms);
        let mut paths = Vec::new();
        for message in self.collect_messages().await? {
            if let ChatMessage::File(file) = message {
                match file.download(self.driver.as_ref(), dest_dir, timeout).await {
                    Ok(path) => {
                        info!(file = %path.display(), "downloaded");
                        paths.push(path);
                    }
                    Err(err) => warn!(filename = %file.filename, "download failed: {err}"),
                }
            }
        }
        Ok(paths)
    }

    async fn find_chat_title(&self, target: &str) -> Result<Option<D::Element>> {
        let Some(list) = self
            .driver
            .query(locators::CHAT_LIST)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let titles = self.driver.query_within(&list, locators::SPAN_TITLE).await?;
        let mut found = None;
        for title in &titles {
            if let Some(value) = self.driver.attribute(title, "title").await? {
                if value == target {
                    found = Some(title.clone());
                    break;
                }
            }
        }

        if found.is_none() {
            self.driver.release(&titles).await.ok();
        }
        self.driver.release(&[list]).await.ok();
        Ok(found)
    }

    async fn wait_for_composer(
        &self,
        input: &D::Element,
        marker: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.driver.text(input).await?.contains(marker) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(COMPOSER_POLL).await;
        }
    }

    async fn trigger_send(&self, input: &D::Element) -> Result<()> {
        if let Some(button) = self
            .driver
            .query(locators::SEND_BUTTON)
            .await?
            .into_iter()
            .next()
        {
            self.driver.click(&button).await?;
            self.driver.release(&[button]).await.ok();
        } else {
            self.driver.press_key(input, "Enter").await?;
        }
        Ok(())
    }

    async fn close_search(&self) -> Result<()> {
        if let Some(cancel) = self
            .driver
            .query(locators::CANCEL_SEARCH)
            .await?
            .into_iter()
            .next()
        {
            self.driver.click(&cancel).await?;
            self.driver.release(&[cancel]).await.ok();
        }
        Ok(())
    }
}

/// Deep link for opening a chat by its target identifier, e.g.
/// `https://web.whatsapp.com/send?phone=5491122334455`.
fn deep_link(base: &str, target: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|err| ClientError::Configuration(format!("invalid base url: {err}")))?;
    url.set_path("/send");
    url.query_pairs_mut().append_pair("phone", target);
    Ok(url)
}
