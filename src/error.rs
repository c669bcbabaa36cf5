//! Accelerator error types.
//!
//! None of these are fatal: the hybrid stepper records them and finishes the
//! step on the CPU engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccelError {
    /// No usable backend on this host (or it was compiled out).
    #[error("accelerator unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend exists but this dispatch failed.
    #[error("accelerator dispatch failed: {0}")]
    DispatchFailure(String),

    /// The neighbor-hint buffer was too small for this step's changed cells.
    /// Classifications stay valid; only the hint list is dropped.
    #[error("neighbor hint buffer overflow: {required} coordinates needed, capacity {capacity}")]
    BufferOverflow { required: usize, capacity: usize },
}

pub type AccelResult<T> = Result<T, AccelError>;

impl AccelError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::DispatchFailure(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::AccelError;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            AccelError::unavailable("no adapter").to_string(),
            "accelerator unavailable: no adapter"
        );
        assert_eq!(
            AccelError::dispatch("device lost").to_string(),
            "accelerator dispatch failed: device lost"
        );
        let overflow = AccelError::BufferOverflow {
            required: 90,
            capacity: 16,
        };
        assert!(overflow.to_string().contains("90 coordinates needed"));
    }
}
