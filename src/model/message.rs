use crate::core::Driver;
use crate::errors::{ClientError, Result};
use crate::locators;
use chrono::{DateTime, Local, NaiveTime};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// How far up from the download icon the title walk is allowed to go.
const MAX_TITLE_WALK: usize = 24;

/// A message extracted from one chat row.
///
/// The direction flag and `msg_id` are derived from the source element at
/// extraction time and never recomputed. The element back-reference exists
/// only for interactive follow-up actions; it carries no identity.
#[derive(Debug, Clone)]
pub struct Message<E> {
    /// Sender label, empty when the row carried none.
    pub sender: String,
    /// Message time on today's date; wall-clock "now" when the row had no
    /// parseable clock label.
    pub timestamp: DateTime<Local>,
    /// Body text, empty for media-only rows.
    pub text: String,
    pub outgoing: bool,
    /// Opaque message identifier, may be empty.
    pub msg_id: String,
    element: E,
}

impl<E> Message<E> {
    /// Source element of this message, for follow-up interactions.
    pub fn element(&self) -> &E {
        &self.element
    }
}

impl<E: Clone + Send + Sync + 'static> Message<E> {
    /// Extract a message from the row element, or `None` when the subtree
    /// does not look like a message. Failures never yield a partial record.
    pub async fn from_element<D>(driver: &D, row: &E) -> Option<Message<E>>
    where
        D: Driver<Element = E>,
    {
        match Self::extract(driver, row).await {
            Ok(message) => Some(message),
            Err(err) => {
                debug!("message extraction failed: {err}");
                None
            }
        }
    }

    async fn extract<D>(driver: &D, row: &E) -> Result<Message<E>>
    where
        D: Driver<Element = E>,
    {
        // rows without a message container (date separators, system
        // notices) are not messages
        let Some(container) = driver
            .query_within(row, locators::MESSAGE_CONTAINER)
            .await?
            .into_iter()
            .next()
        else {
            return Err(ClientError::Extraction(
                "row carries no message container".to_string(),
            ));
        };

        let mut outgoing = false;
        let mut msg_id = String::new();
        if let Some(class) = driver.attribute(&container, "class").await? {
            outgoing = class.split_whitespace().any(|c| c == "message-out");
        }
        if let Some(id) = driver.attribute(&container, "data-id").await? {
            msg_id = id;
        }

        let mut sender = String::new();
        if let Some(span) = driver
            .query_within(row, locators::MESSAGE_SENDER)
            .await?
            .into_iter()
            .next()
        {
            if let Some(raw) = driver.attribute(&span, "aria-label").await? {
                sender = raw.trim_end_matches(':').trim().to_string();
            }
        }

        let mut timestamp = Local::now();
        if let Some(span) = driver
            .query_within(row, locators::MESSAGE_TIME)
            .await?
            .first()
        {
            let label = driver.text(span).await?;
            if let Some(time) = parse_clock_label(&label) {
                timestamp = timestamp.with_time(time).single().unwrap_or(timestamp);
            }
        }

        let mut text = String::new();
        if let Some(body) = driver
            .query_within(row, locators::MESSAGE_BODY)
            .await?
            .first()
        {
            text = strip_repeated_header(&driver.text(body).await?, &sender);
        }

        Ok(Message {
            sender,
            timestamp,
            text,
            outgoing,
            msg_id,
            element: row.clone(),
        })
    }
}

/// A message carrying a downloadable file.
#[derive(Debug, Clone)]
pub struct FileMessage<E> {
    pub message: Message<E>,
    /// Real filename from the download affordance title. Non-empty by
    /// construction: extraction fails instead of producing an empty name.
    pub filename: String,
    download_trigger: E,
}

impl<E: Clone + Send + Sync + 'static> FileMessage<E> {
    /// Extract a file message from the row element. `None` when the row has
    /// no download affordance or no quoted filename in any ancestor title.
    pub async fn from_element<D>(driver: &D, row: &E) -> Option<FileMessage<E>>
    where
        D: Driver<Element = E>,
    {
        match Self::extract(driver, row).await {
            Ok(message) => message,
            Err(err) => {
                debug!("file message extraction failed: {err}");
                None
            }
        }
    }

    async fn extract<D>(driver: &D, row: &E) -> Result<Option<FileMessage<E>>>
    where
        D: Driver<Element = E>,
    {
        let Some(icon) = driver
            .query_within(row, locators::DOWNLOAD_ICON)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let Some(filename) = quoted_download_name(driver, &icon).await? else {
            return Ok(None);
        };

        let Some(message) = Message::from_element(driver, row).await else {
            return Ok(None);
        };

        Ok(Some(FileMessage {
            message,
            filename,
            download_trigger: icon,
        }))
    }

    /// Click the download affordance, wait for the browser download and
    /// persist it under `dest_dir`, preferring the driver-suggested name.
    pub async fn download<D>(
        &self,
        driver: &D,
        dest_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf>
    where
        D: Driver<Element = E>,
    {
        let download = driver.await_download(&self.download_trigger, timeout).await?;
        download.persist_to(dest_dir, &self.filename)
    }
}

/// Tagged union over the message variants. Extraction always produces one
/// concrete variant per row, never a half-populated base.
#[derive(Debug, Clone)]
pub enum ChatMessage<E> {
    Text(Message<E>),
    File(FileMessage<E>),
}

impl<E> ChatMessage<E> {
    /// Shared base fields of either variant.
    pub fn message(&self) -> &Message<E> {
        match self {
            ChatMessage::Text(message) => message,
            ChatMessage::File(file) => &file.message,
        }
    }

    pub fn as_file(&self) -> Option<&FileMessage<E>> {
        match self {
            ChatMessage::File(file) => Some(file),
            ChatMessage::Text(_) => None,
        }
    }
}

/// Walk ancestors from the download icon until one carries a title starting
/// with `Download`, then take the text between its first pair of quotes.
async fn quoted_download_name<D: Driver>(
    driver: &D,
    icon: &D::Element,
) -> Result<Option<String>> {
    let mut current = icon.clone();
    for _ in 0..MAX_TITLE_WALK {
        if let Some(title) = driver.attribute(&current, "title").await? {
            if title.starts_with("Download") {
                return Ok(extract_quoted(&title));
            }
        }
        match driver.parent(&current).await? {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(None)
}

fn extract_quoted(title: &str) -> Option<String> {
    let mut parts = title.split('"');
    parts.next()?;
    let name = parts.next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Parse a `H:MM` clock label with an optional am/pm marker. Punctuation
/// variants ("p.m.", narrow no-break spaces) are normalized before matching.
fn parse_clock_label(raw: &str) -> Option<NaiveTime> {
    static CLOCK: OnceLock<Regex> = OnceLock::new();
    let clock = CLOCK.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})(?: ?(am|pm))?$").unwrap());

    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    let caps = clock.captures(cleaned.trim())?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    match caps.get(3).map(|m| m.as_str()) {
        Some("am") => {
            if hour == 12 {
                hour = 0;
            }
        }
        Some("pm") => {
            if hour != 12 {
                hour += 12;
            }
        }
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// WhatsApp repeats the sender as the first line of some copyable-text
/// bodies; drop it when it duplicates the sender label or carries a colon.
fn strip_repeated_header(raw: &str, sender: &str) -> String {
    let trimmed = raw.trim();
    let mut lines = trimmed.splitn(2, '\n');
    let first = lines.next().unwrap_or("");
    match lines.next() {
        Some(rest)
            if (!sender.is_empty() && first.trim().starts_with(sender))
                || first.contains(':') =>
        {
            rest.trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}
