//! Error types for disarm-and-reconstruct operations.

use thiserror::Error;

/// Result type alias using `DisarmError`.
pub type Result<T> = std::result::Result<T, DisarmError>;

/// Errors that can occur while identifying, opening, filtering, or
/// rebuilding content.
///
/// Every variant is absorbed at the traversal driver boundary: an error
/// resolves the affected subtree to a blocked verdict and never aborts
/// the overall traversal.
#[derive(Error, Debug)]
pub enum DisarmError {
    /// I/O operation failed while reading source bytes or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container structure is corrupted or violates its format.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// Container or member reports password protection.
    #[error("encrypted content: {0}")]
    Encrypted(String),

    /// Declared or estimated size exceeds a policy limit.
    #[error("size limit exceeded: {what} ({actual} > {limit})")]
    TooLarge {
        /// Which quantity exceeded its limit.
        what: &'static str,
        /// Observed or header-declared value.
        actual: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Format is not supported by any container variant or filter.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Identification confidence too low to pick a single format.
    #[error("ambiguous type: {0}")]
    AmbiguousType(String),

    /// Post-clean reconstruction could not preserve format validity.
    #[error("rebuild failed: {0}")]
    RebuildFailed(String),
}

impl DisarmError {
    /// Returns `true` if this error indicates hostile or policy-violating
    /// input rather than an environmental failure.
    #[must_use]
    pub const fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::MalformedContainer(_) | Self::Encrypted(_) | Self::TooLarge { .. }
        )
    }

    /// Short stable label for reporting and event emission.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::MalformedContainer(_) => "malformed_container",
            Self::Encrypted(_) => "encrypted",
            Self::TooLarge { .. } => "too_large",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::AmbiguousType(_) => "ambiguous_type",
            Self::RebuildFailed(_) => "rebuild_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = DisarmError::MalformedContainer("truncated central directory".into());
        assert!(err.to_string().contains("malformed container"));

        let err = DisarmError::TooLarge {
            what: "declared uncompressed size",
            actual: 2_000,
            limit: 1_000,
        };
        assert!(err.to_string().contains("2000 > 1000"));
    }

    #[test]
    fn test_security_relevance() {
        assert!(DisarmError::Encrypted("zip member".into()).is_security_relevant());
        assert!(
            DisarmError::TooLarge {
                what: "total",
                actual: 2,
                limit: 1
            }
            .is_security_relevant()
        );
        assert!(!DisarmError::UnsupportedFormat("tar".into()).is_security_relevant());
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(
            DisarmError::RebuildFailed(String::new()).label(),
            "rebuild_failed"
        );
        assert_eq!(DisarmError::AmbiguousType(String::new()).label(), "ambiguous_type");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DisarmError = io_err.into();
        assert!(matches!(err, DisarmError::Io(_)));
    }
}
