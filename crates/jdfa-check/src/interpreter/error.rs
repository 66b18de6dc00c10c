//! Errors raised by malformed instruction lists.
//!
//! These indicate a bug in whatever lowered the method, not a property of
//! the analyzed code, and abort the run. Every variant carries the
//! instruction pointer at which the problem was detected.

use serde::{Deserialize, Serialize};

use crate::state::StateError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AnalysisError {
    #[error("operand stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },

    #[error("stack depth mismatch at instruction {ip}: {left} vs {right}")]
    StackShapeMismatch {
        ip: usize,
        left: usize,
        right: usize,
    },

    #[error("exception handlers differ between paths reaching instruction {ip}")]
    TransferMismatch { ip: usize },

    #[error("protected region exited without an active handler at instruction {ip}")]
    TransferUnderflow { ip: usize },

    #[error("jump target {target} out of range at instruction {ip}")]
    JumpOutOfRange { ip: usize, target: usize },

    #[error("assignment target at instruction {ip} is not a variable")]
    NonVariableAssignTarget { ip: usize },
}

impl AnalysisError {
    /// Attaches the instruction pointer to a state error.
    pub fn from_state(ip: usize, error: StateError) -> Self {
        match error {
            StateError::StackUnderflow => AnalysisError::StackUnderflow { ip },
            StateError::StackShapeMismatch { left, right } => {
                AnalysisError::StackShapeMismatch { ip, left, right }
            }
            StateError::TransferMismatch => AnalysisError::TransferMismatch { ip },
            StateError::TransferUnderflow => AnalysisError::TransferUnderflow { ip },
        }
    }

    /// Instruction at which the error was detected.
    pub fn ip(&self) -> usize {
        match self {
            AnalysisError::StackUnderflow { ip }
            | AnalysisError::StackShapeMismatch { ip, .. }
            | AnalysisError::TransferMismatch { ip }
            | AnalysisError::TransferUnderflow { ip }
            | AnalysisError::JumpOutOfRange { ip, .. }
            | AnalysisError::NonVariableAssignTarget { ip } => *ip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_gain_the_instruction_pointer() {
        let err = AnalysisError::from_state(
            7,
            StateError::StackShapeMismatch { left: 2, right: 1 },
        );
        assert_eq!(
            err,
            AnalysisError::StackShapeMismatch {
                ip: 7,
                left: 2,
                right: 1
            }
        );
        assert_eq!(err.ip(), 7);
        assert_eq!(
            err.to_string(),
            "stack depth mismatch at instruction 7: 2 vs 1"
        );
    }
}
