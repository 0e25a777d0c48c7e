//! # Docket Core
//!
//! A minimal per-document file store.
//!
//! Each document is one file in a flat directory, named `<id><extension>`
//! and holding the document encoded by the store's format. There is no index
//! or manifest: the directory listing is the collection.
//!
//! ## Features
//!
//! - Save, get and remove single documents by identifier
//! - Concurrent bulk `clear`, `scan` and `all`, tolerant of documents
//!   disappearing while the operation runs
//! - Bulk reads as a buffered list or as a stream of events
//! - Pluggable formats (JSON, passphrase-encrypted wrapper)
//! - Pluggable identifier generation
//!
//! ## Example
//!
//! ```no_run
//! use docket_core::{Document, Store};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Open (and create if needed) a document directory
//! let store = Store::open("./my-docs").await?;
//!
//! // Save a document; an identifier is generated when absent
//! let doc = Document::from_value(json!({ "title": "hello", "done": false }))?;
//! let saved = store.save(&doc).await?;
//! let id = saved.id().unwrap_or_default().to_string();
//!
//! // Read it back
//! let fetched = store.get(&id).await?;
//! assert_eq!(fetched.get("title"), Some(&json!("hello")));
//!
//! // Find unfinished documents
//! let open = store.scan(|doc| doc.get("done") == Some(&json!(false))).await?;
//! println!("{} open documents", open.len());
//! # Ok(())
//! # }
//! ```

mod document;
mod error;
mod events;
pub mod format;
pub mod idgen;
mod store;
mod stream;

pub use document::{Document, ID_FIELD, validate_id};
pub use error::{Error, Result};
pub use events::StoreEvent;
pub use format::{Cipher, Encrypted, Format, Json};
pub use idgen::{IdGenerator, IdStrategy};
pub use store::{Store, StoreOptions};
pub use stream::{DocumentStream, ScanEvent};
