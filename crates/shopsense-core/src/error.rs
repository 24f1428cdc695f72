//! Typed error kinds shared by the engine and its callers.
//!
//! Every surfaced error carries a stable kind tag ([`Error::kind`]) so
//! transports can discriminate without string matching. Local recovery
//! (embedding fallback, degraded trending) happens before an error ever
//! reaches a caller; what does surface is one of these kinds.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Empty/over-length query, out-of-range limit, unknown enum value.
    /// No side effects have occurred.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The repository or the embedding backend cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// An upsert violated a uniqueness invariant (e.g. duplicate sku).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The task was cancelled before completion. No search log is written.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A deadline elapsed. Batch jobs keep partial progress.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Bug or invariant violation (e.g. a non-normalized vector in the
    /// index). The offending record is logged and skipped.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable tag for client-side discrimination.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Unavailable(_) => "unavailable",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Cancelled(_) => "cancelled",
            Error::Timeout(_) => "timeout",
            Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(Error::InvalidInput("q".into()).kind(), "invalid_input");
        assert_eq!(Error::Unavailable("db".into()).kind(), "unavailable");
        assert_eq!(Error::NotFound("p".into()).kind(), "not_found");
        assert_eq!(Error::Conflict("sku".into()).kind(), "conflict");
        assert_eq!(Error::Cancelled("search".into()).kind(), "cancelled");
        assert_eq!(Error::Timeout("embed".into()).kind(), "timeout");
        assert_eq!(Error::Internal("bug".into()).kind(), "internal");
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::NotFound("product 42".into());
        assert_eq!(err.to_string(), "not found: product 42");
    }
}
