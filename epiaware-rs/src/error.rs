//! Error types for the renewal modelling core.

use thiserror::Error;

/// Failure conditions surfaced by every fallible operation in the crate.
///
/// All conditions are detected synchronously from the inputs; none of them is
/// retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A probability mass function has negative or non-finite entries, is
    /// empty, or does not sum to one within tolerance.
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    /// A scalar parameter violates its sign or range constraint.
    #[error("domain error: {0}")]
    Domain(String),

    /// The growth rate solver has no real solution or its iteration degenerated.
    #[error("numeric instability: {0}")]
    NumericInstability(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Domain(format!("{name} must be finite and > 0, got {value}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::Domain("mu must be finite and > 0, got 0".to_string());
        assert_eq!(err.to_string(), "domain error: mu must be finite and > 0, got 0");
    }

    #[test]
    fn test_ensure_positive() {
        assert_eq!(ensure_positive("alpha", 0.5), Ok(0.5));
        assert!(matches!(ensure_positive("alpha", 0.0), Err(Error::Domain(_))));
        assert!(matches!(ensure_positive("alpha", f64::NAN), Err(Error::Domain(_))));
        assert!(matches!(ensure_positive("alpha", f64::INFINITY), Err(Error::Domain(_))));
    }
}
