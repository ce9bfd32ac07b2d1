//! Selector tables for the WhatsApp Web UI.
//!
//! Every UI concept maps to an ordered list of candidate selectors. Callers
//! try the candidates in order and use the first one that resolves to at
//! least one element, so a renamed attribute only needs a new entry at the
//! front while the older expressions keep working as fallbacks.
//!
//! Entries starting with `//` or `.//` are XPath, everything else is CSS.

// Lifecycle state signals, most specific last-stage signal first in the
// detector's priority order (see `client::state`).
pub const LOGGED_IN: &[&str] = &["//span[@data-icon='wa-wordmark-refreshed']"];

pub const LOADING: &[&str] = &[
    "//div[//span[@data-icon='lock-refreshed'] and contains(text(), 'End-to-end encrypted')]",
];

pub const LOADING_CHATS: &[&str] = &["//div[text()='Loading your chats']"];

pub const QR_CODE: &[&str] =
    &["//canvas[@aria-label='Scan this QR code to link a device!']"];

pub const AUTH: &[&str] = &["//div[contains(text(), 'Steps to log in')]"];

// Search affordances. The search button has been renamed across several UI
// revisions, hence the long chain.
pub const SEARCH_BUTTON: &[&str] = &[
    "//button[@aria-label='Search']",
    "//button[@title='Search']",
    "//button[@aria-label='Search or start new chat']",
    "//div[@role='button' and @title='Search input textbox']",
    "//span[@data-icon='search']/parent::button",
    "//span[@data-testid='search']/parent::button",
];

pub const SEARCH_TEXT_BOX: &[&str] = &[
    "//div[@contenteditable='true']",
    "//div[contains(@class, 'lexical-rich-text-input')]//div[@contenteditable='true']",
    "//div[@role='textbox'][@contenteditable='true']",
    "//div[contains(@class, '_13NKt')]",
];

pub const SEARCH_RESULT: &[&str] = &["//div[@aria-label='Search results.']"];

pub const SEARCH_ITEM: &[&str] = &[".//div[@role='listitem']"];

pub const SEARCH_ITEM_COMPONENTS: &[&str] =
    &[".//div[@role='gridcell' and @aria-colindex='2']/parent::div/div"];

pub const CANCEL_SEARCH: &[&str] = &["//button[@aria-label='Cancel search']"];

// Media/status icon inside a last-message preview, used to tag its type.
pub const PREVIEW_TYPE_ICON: &[&str] = &[".//span[@data-icon]"];

// Chat list and unread indicators.
pub const CHAT_LIST: &[&str] = &["//div[@aria-label='Chat list']"];

pub const UNREAD_BADGE: &[&str] = &[".//span[contains(@aria-label, 'unread message')]"];

pub const SPAN_TITLE: &[&str] = &[".//span[@title]"];

// Open conversation pane.
pub const CHAT_DIV: &[&str] = &["//div[@role='application']"];

pub const CHAT_ROW: &[&str] = &[".//div[@role='row']"];

pub const CHAT_INPUT_BOX: &[&str] = &[
    "//div[@aria-placeholder='Type a message']",
    "//div[@title='Type a message'][@role='textbox']",
];

// Message internals, resolved relative to a chat row.
pub const MESSAGE_CONTAINER: &[&str] = &[
    ".//div[contains(@class, 'message-in') or contains(@class, 'message-out')]",
];

pub const MESSAGE_SENDER: &[&str] = &[
    ".//span[@aria-label and substring(@aria-label, string-length(@aria-label))=':']",
];

pub const MESSAGE_TIME: &[&str] = &[".//span[contains(@class, 'x16dsc37')]"];

pub const MESSAGE_BODY: &[&str] = &[".//div[contains(@class, 'copyable-text')]/div"];

pub const DOWNLOAD_ICON: &[&str] = &["span[data-icon='audio-download']"];

// Attachment sending.
pub const ATTACH_BUTTON: &[&str] = &["span[data-icon='plus-rounded']"];

pub const SEND_BUTTON: &[&str] = &["span[data-icon='wds-ic-send-filled']"];

pub const FILE_INPUT: &[&str] = &["input[type='file']"];

#[cfg(test)]
mod tests {
    use super::*;

    // Every concept that gates a state transition or an action must keep a
    // non-empty fallback chain.
    #[test]
    fn load_bearing_tables_are_non_empty() {
        let tables: &[&[&str]] = &[
            LOGGED_IN,
            LOADING,
            LOADING_CHATS,
            QR_CODE,
            AUTH,
            SEARCH_BUTTON,
            SEARCH_TEXT_BOX,
            SEARCH_RESULT,
            SEARCH_ITEM,
            CHAT_LIST,
            CHAT_DIV,
            CHAT_ROW,
            CHAT_INPUT_BOX,
            ATTACH_BUTTON,
            SEND_BUTTON,
            FILE_INPUT,
        ];
        for table in tables {
            assert!(!table.is_empty());
            assert!(table.iter().all(|s| !s.is_empty()));
        }
    }
}
