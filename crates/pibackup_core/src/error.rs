//! Error types for the orchestration core

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Dispatch-level failures. Action failures are not errors here: they are
/// logged where the action is invoked and reported as an [`crate::Outcome`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("No action registered for key '{0}'")]
    UnknownAction(String),

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Event source lifecycle failures.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Event source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Event source '{source_name}' failed to watch: {reason}")]
    Watch { source_name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Event source '{source_name}' did not stop within {timeout:?}")]
    JoinTimeout {
        source_name: String,
        timeout: Duration,
    },

    #[error("Event source '{source_name}' thread panicked")]
    Panicked { source_name: String },
}

impl SourceError {
    pub fn unavailable(source_name: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn watch(source_name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Watch {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}
