//! Reference interpreter for kernel IR
//!
//! Runs one program instance of a lowered kernel over a flat byte-addressed
//! memory. Used to check lowering results end to end.

pub mod error;
pub mod eval;
pub mod memory;
pub mod value;

pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::Interpreter;
pub use memory::Memory;
pub use value::RuntimeValue;
