//! Error types for slmforge.
//!
//! Library crates use [`ForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Plugin family a registry lookup or construction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Connector,
    TaskBuilder,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connector => f.write_str("connector"),
            Self::TaskBuilder => f.write_str("task builder"),
        }
    }
}

/// Top-level error type for all slmforge operations.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Missing or malformed configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// A configuration entry names a plugin that was never registered.
    #[error("unknown {kind} type: {name}")]
    UnknownPlugin { kind: PluginKind, name: String },

    /// A registered plugin factory rejected its parameters.
    #[error("failed to construct {kind} '{name}': {message}")]
    PluginConstruction {
        kind: PluginKind,
        name: String,
        message: String,
    },

    /// A connector was handed a resource id it cannot interpret.
    #[error("unknown resource kind: {resource_id}")]
    UnknownResourceKind { resource_id: String },

    /// Reading a resource from its source failed.
    #[error("extraction failed for {resource_id}: {message}")]
    Extraction {
        resource_id: String,
        message: String,
    },

    /// Network/HTTP error in a remote connector.
    #[error("network error: {0}")]
    Network(String),

    /// Database driver error.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A task builder failed while producing examples.
    #[error("task builder error: {0}")]
    TaskBuilder(String),

    /// Delivering examples to the training collaborator failed.
    #[error("handoff error: {0}")]
    Handoff(String),

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The run was cancelled before completion.
    #[error("run cancelled after {chunks_extracted} chunks were extracted")]
    Cancelled { chunks_extracted: usize },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an extraction failure for `resource_id`.
    pub fn extraction(resource_id: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::Extraction {
            resource_id: resource_id.into(),
            message: msg.to_string(),
        }
    }

    /// Create an unknown-resource-kind error for `resource_id`.
    pub fn unknown_resource(resource_id: impl Into<String>) -> Self {
        Self::UnknownResourceKind {
            resource_id: resource_id.into(),
        }
    }

    /// Create a construction error for a plugin factory.
    pub fn construction(kind: PluginKind, name: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::PluginConstruction {
            kind,
            name: name.into(),
            message: msg.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ForgeError::config("missing [task_builder] section");
        assert_eq!(err.to_string(), "config error: missing [task_builder] section");

        let err = ForgeError::UnknownPlugin {
            kind: PluginKind::Connector,
            name: "ftp".into(),
        };
        assert_eq!(err.to_string(), "unknown connector type: ftp");

        let err = ForgeError::unknown_resource("bogus:users");
        assert!(err.to_string().contains("bogus:users"));
    }
}
