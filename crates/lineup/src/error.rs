//! Error types for the ranking engine.
//!
//! Structural rejections (an invalid child for a composite, an unknown
//! criterion id in a dump) are not errors: they surface as `None`/`false`
//! and are logged. Only the textual entry points can fail.

use thiserror::Error;

/// Errors raised by textual entry points (JSON/TOML input, script code).
#[derive(Debug, Error)]
pub enum Error {
    /// JSON could not be parsed or did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A mapping script failed to compile.
    #[error("script error in `{code}`: {message}")]
    Script {
        /// The offending code.
        code: String,
        /// What went wrong.
        message: String,
    },

    /// A column type tag is not registered.
    #[error("unknown column type: {0}")]
    UnknownColumnType(String),

    /// An event name could not be parsed.
    #[error(transparent)]
    UnknownEvent(#[from] lineup_core::CoreError),
}

impl Error {
    /// Create a script compilation error.
    pub fn script(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
