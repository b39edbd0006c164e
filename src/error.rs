//! Typed error hierarchy, one enum per layer.
//!
//! Mirrors the "sum of result kinds at each layer boundary" redesign
//! called for in place of the original's exception-driven flow: callers
//! match on a closed set of variants instead of catching a base class.

use thiserror::Error;

/// Kinds of permanent (non-retryable) backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentKind {
    Auth,
    NotFound,
    MalformedRange,
    Other,
}

impl std::fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermanentKind::Auth => "auth",
            PermanentKind::NotFound => "not_found",
            PermanentKind::MalformedRange => "malformed_range",
            PermanentKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the Gateway to every layer above it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend call failed after retry budget exhausted")]
    TransientExhausted,

    #[error("permanent backend error ({kind}): {message}")]
    Permanent {
        kind: PermanentKind,
        message: String,
    },
}

impl GatewayError {
    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        GatewayError::Permanent {
            kind,
            message: message.into(),
        }
    }

    /// True if this is the kind of failure the orchestrator should treat
    /// like a missed loop iteration rather than a fatal condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::TransientExhausted)
    }
}

/// Errors from the leader election layer.
#[derive(Debug, Error)]
pub enum ElectionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("lost the read-back race for lease '{0}'")]
    LostRace(String),
}

/// Errors from the pipeline orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Election(#[from] ElectionError),
}

/// Errors loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("environment variable {0} was empty")]
    EmptyVar(&'static str),
}
