//! Error types for the LineUp core plumbing.

use std::fmt;

/// The error type for core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An event name did not match any known [`EventKind`](crate::EventKind).
    UnknownEvent(String),
    /// An event name was empty after stripping its namespace.
    EmptyEventName,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEvent(name) => write!(f, "Unknown event name: {name}"),
            Self::EmptyEventName => write!(f, "Event name must not be empty"),
        }
    }
}

impl std::error::Error for CoreError {}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
