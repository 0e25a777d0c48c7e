//! On-disk document formats.
//!
//! A format names the file extension used by a store and converts documents
//! to and from bytes. Formats compose: [`Encrypted`] wraps any other format.

mod encrypted;

pub use encrypted::{Cipher, Encrypted};

use crate::document::Document;
use crate::error::Result;
use std::fmt;

/// Serialization capability of a store.
pub trait Format: Send + Sync + fmt::Debug {
    /// File extension including the leading dot, e.g. `.json`.
    fn extension(&self) -> &str;

    fn serialize(&self, document: &Document) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Document>;
}

/// Plain JSON documents with the `.json` extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json;

impl Format for Json {
    fn extension(&self) -> &str {
        ".json"
    }

    fn serialize(&self, document: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(document)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Document> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        Document::from_value(value)
    }
}
