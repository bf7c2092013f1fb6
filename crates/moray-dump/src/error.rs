//! Error types for the extraction library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dump extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Invalid command-line input
    #[error("Argument error: {0}")]
    Argument(String),

    /// Configuration error (invalid YAML, out-of-range values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration table names the same bucket twice
    #[error("duplicate bucket: {0}")]
    DuplicateBucket(String),

    /// The dump is malformed or ended early
    #[error("Malformed dump: {0}")]
    Structural(String),

    /// A row could not be interpreted
    #[error("Invalid row in table {table}: {message}")]
    InvalidRow { table: String, message: String },

    /// The `_vnode` column disagrees with the document's `vnode` property
    #[error("_vnode value \"{column}\" did not match value.vnode value \"{property}\"")]
    Consistency { column: String, property: String },

    /// The output directory is already present
    #[error("Output directory already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// IO error (read, decompress, open, write, close)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ExtractError {
    /// Create an InvalidRow error
    pub fn invalid_row(table: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractError::InvalidRow {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Structural error
    pub fn structural(message: impl Into<String>) -> Self {
        ExtractError::Structural(message.into())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_message_names_both_values() {
        let err = ExtractError::Consistency {
            column: "3".into(),
            property: "4".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"3\""));
        assert!(msg.contains("\"4\""));
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ExtractError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: no such file"));
    }
}
