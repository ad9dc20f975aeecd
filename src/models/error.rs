//! Error types for hexcover.
//!
//! Taxonomy:
//! - Input: malformed configuration, plan or seed data. Aborts before scheduling.
//! - Infrastructure: filesystem, network setup, coverage authority.
//! - Internal: invariant violations (bugs).
//!
//! Per-attempt failures of the scoring service are NOT errors here; they are
//! `AttemptResult` values contained inside the fill loop.

use thiserror::Error;

/// Top-level error type for hexcover.
#[derive(Debug, Error)]
pub enum HexcoverError {
    // ═══════════════════════════════════════════════════════════════════
    // INPUT: malformed seed/configuration data, fatal before any work
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid cell: {0}")]
    InvalidCell(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // INFRASTRUCTURE: collaborators and the local filesystem
    // ═══════════════════════════════════════════════════════════════════

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Coverage source '{source_name}' unavailable: {reason}")]
    CoverageUnavailable { source_name: String, reason: String },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // INTERNAL: invariant broken
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HexcoverError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error stems from bad input and must abort before scheduling.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidInput(_) | Self::InvalidCell(_) | Self::ParseError(_)
        )
    }
}

/// Result type alias for hexcover.
pub type Result<T> = std::result::Result<T, HexcoverError>;
