//! # Radiance Error Types
//!
//! The closed set of status codes every library call can report.

use thiserror::Error;

/// Errors that can occur anywhere in the runtime.
///
/// `Ok(_)` plays the role of the `OK` status; every other status is one of
/// these variants. Nothing in the library unwinds for these conditions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadianceError {
    /// A frame result was read before one was pushed.
    #[error("null pointer: no current result in frame")]
    NullPointer,

    /// Frame or scratch stack capacity exceeded.
    #[error("memory out of bounds: scratch capacity exceeded")]
    MemoryOutOfBounds,

    /// A type-tagged record was used against the wrong family.
    #[error("incompatible data types: {0}")]
    IncompatibleDataTypes(String),

    /// A row identity tag outside the three valid modes.
    #[error("unknown indexed-by value: {0}")]
    UnknownIndexedByValue(u32),

    /// A registry entry or registration already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A registry entry, row, or handle does not exist.
    #[error("does not exist: {0}")]
    DoesNotExist(String),

    /// A lifecycle transition was attempted from a disallowed state.
    #[error("bad run state")]
    BadRunState,

    /// A trigger tag outside `LOOP`/`EVENT`.
    #[error("unknown trigger policy: {0}")]
    UnknownTriggerPolicy(u8),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RadianceError {
    /// Stable numeric status code. `0` is reserved for `OK`.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::NullPointer => 1,
            Self::MemoryOutOfBounds => 2,
            Self::IncompatibleDataTypes(_) => 3,
            Self::UnknownIndexedByValue(_) => 4,
            Self::AlreadyExists(_) => 5,
            Self::DoesNotExist(_) => 6,
            Self::BadRunState => 7,
            Self::UnknownTriggerPolicy(_) => 8,
            Self::InvalidConfig(_) => 9,
        }
    }

    pub(crate) fn missing(what: impl std::fmt::Display) -> Self {
        Self::DoesNotExist(what.to_string())
    }
}

/// Result type for runtime operations.
pub type RadianceResult<T> = Result<T, RadianceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            RadianceError::NullPointer,
            RadianceError::MemoryOutOfBounds,
            RadianceError::IncompatibleDataTypes(String::new()),
            RadianceError::UnknownIndexedByValue(9),
            RadianceError::AlreadyExists(String::new()),
            RadianceError::DoesNotExist(String::new()),
            RadianceError::BadRunState,
            RadianceError::UnknownTriggerPolicy(3),
            RadianceError::InvalidConfig(String::new()),
        ];
        let mut codes: Vec<i32> = all.iter().map(RadianceError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_display() {
        let err = RadianceError::DoesNotExist("main/particles".into());
        assert_eq!(err.to_string(), "does not exist: main/particles");
    }
}
