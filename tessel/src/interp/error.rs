//! Runtime errors for the interpreter

use std::fmt;

use crate::ir::ValueId;

/// Runtime error while executing kernel IR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Instruction refers to a value that was never computed
    UndefinedValue,
    /// Kernel argument without a bound value
    UnboundArgument,
    /// Bound value or operand has the wrong type
    TypeError,
    /// Integer division or remainder by zero
    DivisionByZero,
    /// Access outside every allocation
    OutOfBounds,
    /// Kind or instruction the interpreter does not execute
    Unsupported,
}

impl RuntimeError {
    pub fn undefined_value(id: ValueId) -> Self {
        RuntimeError {
            kind: ErrorKind::UndefinedValue,
            message: format!("undefined value: {id}"),
        }
    }

    pub fn unbound_argument(name: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::UnboundArgument,
            message: format!("no value bound for argument `{name}`"),
        }
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::TypeError,
            message: format!("type error: expected {expected}, got {got}"),
        }
    }

    pub fn division_by_zero() -> Self {
        RuntimeError {
            kind: ErrorKind::DivisionByZero,
            message: "division by zero".to_string(),
        }
    }

    pub fn out_of_bounds(addr: u64, len: usize) -> Self {
        RuntimeError {
            kind: ErrorKind::OutOfBounds,
            message: format!("access of {len} byte(s) at {addr:#x} is outside every allocation"),
        }
    }

    pub fn unsupported(what: &str) -> Self {
        RuntimeError {
            kind: ErrorKind::Unsupported,
            message: format!("unsupported: {what}"),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;
