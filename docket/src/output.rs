//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use docket_core::Document;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write one document as a single text line, as it arrives.
    ///
    /// Streaming commands call this per document instead of [`Self::write`],
    /// which needs the complete result to build its DTO. Text mode only.
    pub fn write_line(&self, document: &Document) -> Result<()> {
        writeln!(&self.stdout, "{}", document_line(document))?;
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error message directly.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Render a document as compact single-line JSON.
pub fn document_line(document: &Document) -> String {
    serde_json::to_string(document).unwrap_or_else(|_| String::from("{}"))
}

/// Render documents one per line.
pub fn document_lines(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|document| format!("{}\n", document_line(document)))
        .collect()
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub dir: String,
    pub extension: String,
}

/// Output for `save` command.
#[derive(Debug, Serialize)]
pub struct SaveOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: String,
    pub path: String,
}

/// Output for `get` command.
#[derive(Debug, Serialize)]
pub struct GetOutput {
    pub success: bool,
    pub result_code: u8,
    pub document: Document,
}

/// Output for `rm` command.
#[derive(Debug, Serialize)]
pub struct RemoveOutput {
    pub success: bool,
    pub result_code: u8,
    pub id: String,
}

/// Output for `clear` command.
#[derive(Debug, Serialize)]
pub struct ClearOutput {
    pub success: bool,
    pub result_code: u8,
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub success: bool,
    pub result_code: u8,
    pub ids: Vec<String>,
}

/// Output for `scan` and `all` commands.
#[derive(Debug, Serialize)]
pub struct DocumentsOutput {
    pub success: bool,
    pub result_code: u8,
    pub count: usize,
    pub documents: Vec<Document>,
}
