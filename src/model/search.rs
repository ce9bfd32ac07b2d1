use crate::core::Driver;
use crate::locators;
use serde::{Deserialize, Serialize};

/// Unread indicator on a chat entry. A badge whose text cannot be parsed as
/// a number stays `Unknown` instead of being coerced to zero or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnreadCount {
    Exact(u32),
    Unknown,
}

/// Best-effort view of one entry in the conversation search results or the
/// chat list. Absent optional fields are omitted, never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub group: Option<String>,
    pub last_message: Option<String>,
    pub last_message_type: Option<String>,
    pub unread_count: Option<UnreadCount>,
    pub last_activity: Option<String>,
}

impl SearchResult {
    /// Extract a result from a list item. Never fails: whatever the subtree
    /// does not yield is simply left out.
    pub async fn from_element<D: Driver>(driver: &D, item: &D::Element) -> SearchResult {
        let mut result = SearchResult::default();

        // Title spans: first is the entry name; a second one is the group
        // context a message hit belongs to.
        if let Ok(spans) = driver.query_within(item, locators::SPAN_TITLE).await {
            let mut titles = Vec::new();
            for span in &spans {
                if let Ok(Some(title)) = driver.attribute(span, "title").await {
                    let title = title.trim().to_string();
                    if !title.is_empty() {
                        titles.push(title);
                    }
                }
            }
            let mut titles = titles.into_iter();
            if let Some(name) = titles.next() {
                result.name = name;
            }
            result.group = titles.next();
        }

        if let Ok(badges) = driver.query_within(item, locators::UNREAD_BADGE).await {
            if let Some(badge) = badges.first() {
                let label = driver.text(badge).await.unwrap_or_default();
                result.unread_count = Some(parse_count(&label));
            }
        }

        // Row components under the second grid cell: a header line (name
        // plus activity label) followed by the preview line.
        if let Ok(components) = driver
            .query_within(item, locators::SEARCH_ITEM_COMPONENTS)
            .await
        {
            if let Some(header) = components.first() {
                if let Ok(text) = driver.text(header).await {
                    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
                    if let Some(first) = lines.next() {
                        if result.name.is_empty() {
                            result.name = first.to_string();
                        }
                    }
                    if let Some(last) = lines.last() {
                        if last != result.name {
                            result.last_activity = Some(last.to_string());
                        }
                    }
                }
            }

            if components.len() >= 2 {
                let preview = &components[components.len() - 1];
                if let Ok(text) = driver.text(preview).await {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        result.last_message = Some(text);
                    }
                }
                if let Ok(icons) = driver
                    .query_within(preview, locators::PREVIEW_TYPE_ICON)
                    .await
                {
                    if let Some(icon) = icons.first() {
                        if let Ok(Some(kind)) = driver.attribute(icon, "data-icon").await {
                            if !kind.is_empty() {
                                result.last_message_type = Some(kind);
                            }
                        }
                    }
                }
            }
        }

        result
    }
}

/// Parse a badge label defensively: locale digit grouping is stripped, and
/// anything without digits stays `Unknown`.
fn parse_count(raw: &str) -> UnreadCount {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return UnreadCount::Unknown;
    }
    match digits.parse::<u32>() {
        Ok(count) => UnreadCount::Exact(count),
        Err(_) => UnreadCount::Unknown,
    }
}
