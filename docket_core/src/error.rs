//! Error types for docket_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using docket_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// No document file exists for the identifier.
    #[error("Document not found: {id}")]
    NotFound { id: String },

    /// Store path exists but is not a directory.
    #[error("{path} is not a valid document directory")]
    NotADirectory { path: PathBuf },

    /// Identifier cannot be used as a file name.
    #[error("Invalid document id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// Value is not a JSON object.
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// Format could not encode or decode a document.
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Encrypting a document failed.
    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },

    /// Decrypting a document failed (wrong passphrase or tampered file).
    #[error("Decryption failed: {reason}")]
    Decryption { reason: String },

    /// Unknown cipher name.
    #[error("Unsupported cipher: {name}")]
    UnsupportedCipher { name: String },

    /// Unknown identifier generation strategy.
    #[error("Unknown id strategy: {name}")]
    UnknownIdStrategy { name: String },
}

impl Error {
    /// Create a NotFound error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound { id: id.into() }
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Error::NotADirectory { path: path.into() }
    }

    /// Create an InvalidId error.
    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidDocument error.
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Error::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Error::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an Encryption error.
    pub fn encryption(reason: impl Into<String>) -> Self {
        Error::Encryption {
            reason: reason.into(),
        }
    }

    /// Create a Decryption error.
    pub fn decryption(reason: impl Into<String>) -> Self {
        Error::Decryption {
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedCipher error.
    pub fn unsupported_cipher(name: impl Into<String>) -> Self {
        Error::UnsupportedCipher { name: name.into() }
    }

    /// Create an UnknownIdStrategy error.
    pub fn unknown_id_strategy(name: impl Into<String>) -> Self {
        Error::UnknownIdStrategy { name: name.into() }
    }

    /// Map an I/O error on a document path, turning a missing file into `NotFound`.
    pub(crate) fn from_document_io(id: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(id)
        } else {
            Error::Io { source: err }
        }
    }

    /// Whether this error means the document does not exist.
    ///
    /// Bulk operations use this to skip documents removed between the
    /// directory listing and the per-file access.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = Error::from_document_io("abc", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Document not found: abc");
    }

    #[test]
    fn test_other_io_is_not_not_found() {
        let err = Error::from_document_io("abc", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_not_found());
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_not_a_directory_message() {
        let err = Error::not_a_directory("/tmp/file.txt");
        assert_eq!(
            err.to_string(),
            "/tmp/file.txt is not a valid document directory"
        );
    }
}
