//! Tessel
//!
//! Semantic analysis and IR lowering for a tile kernel language: the scalar
//! and block type model, implicit conversion rules, and the lowering of every
//! operator, memory access, atomic and reduction into a typed instruction
//! list. A reference interpreter executes the result.

pub mod config;
pub mod error;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod script;
pub mod span;
pub mod types;
pub mod util;

pub use error::{CompileError, Result};
pub use span::Span;
