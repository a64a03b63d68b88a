//! Errors surfaced by the collections.
//!
//! Only misuse is reported here. Lost compare-and-swap races, stale tables and
//! racing segment growth are retried internally and never reach the caller,
//! and broken internal invariants panic instead of returning an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// Strict lookup of a key that is not in the map.
    #[error("the given key was not present in the map")]
    KeyNotFound,

    /// Strict insertion of a key that is already in the map.
    #[error("an item with the same key has already been added")]
    DuplicateKey,

    #[error("concurrency level must be at least 1")]
    InvalidConcurrencyLevel,

    #[error("index {index} is out of range for a buffer of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("range starting at {start} with {count} elements does not fit in a buffer of length {len}")]
    InvalidRange { start: usize, count: usize, len: usize },

    #[error("destination has room for {available} elements but {required} are needed")]
    InsufficientSpace { required: usize, available: usize },
}

/// Validates a `start`/`count` window over a buffer of length `len`.
pub(crate) fn check_range(start: usize, count: usize, len: usize) -> Result<()> {
    if start > len {
        return Err(CollectionError::IndexOutOfRange { index: start, len });
    }
    if count > len - start {
        return Err(CollectionError::InvalidRange { start, count, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_range, CollectionError};

    #[test]
    fn test_check_range() {
        assert_eq!(check_range(0, 0, 0), Ok(()));
        assert_eq!(check_range(2, 3, 5), Ok(()));
        assert_eq!(check_range(5, 0, 5), Ok(()));
        assert_eq!(
            check_range(6, 0, 5),
            Err(CollectionError::IndexOutOfRange { index: 6, len: 5 })
        );
        assert_eq!(
            check_range(3, 3, 5),
            Err(CollectionError::InvalidRange { start: 3, count: 3, len: 5 })
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            CollectionError::KeyNotFound.to_string(),
            "the given key was not present in the map"
        );
        assert_eq!(
            CollectionError::InsufficientSpace { required: 4, available: 1 }.to_string(),
            "destination has room for 1 elements but 4 are needed"
        );
    }
}
