//! Notifications published by a store handle.

use crate::document::Document;

/// Capacity of the per-handle event channel. Slow subscribers lag and skip
/// the oldest events.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Outcome of a store operation, as seen by subscribers.
///
/// `error` holds the rendered error message when the operation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A save completed. On failure `document` is the caller's original.
    Saved {
        document: Document,
        error: Option<String>,
    },
    /// A single-document read completed.
    Fetched {
        id: String,
        document: Option<Document>,
        error: Option<String>,
    },
    /// A single-document remove completed.
    Removed { id: String, error: Option<String> },
    /// A clear completed.
    Cleared { error: Option<String> },
}

impl StoreEvent {
    /// The error message, if the operation failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            StoreEvent::Saved { error, .. }
            | StoreEvent::Fetched { error, .. }
            | StoreEvent::Removed { error, .. }
            | StoreEvent::Cleared { error } => error.as_deref(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }
}
