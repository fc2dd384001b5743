#![forbid(unsafe_code)]

//! Recoverable errors raised by collaborator mutations.
//!
//! Dispatch and derived sets never fail; misuse of their contracts is caught
//! by debug assertions instead. Only positional edits of an
//! [`ArrayVariable`](crate::array::ArrayVariable) can be rejected.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TetherError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TetherError {
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl TetherError {
    #[must_use]
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_message() {
        let err = TetherError::out_of_bounds(5, 3);
        assert_eq!(err.to_string(), "index 5 out of bounds for array of length 3");
    }
}
