//! Operator lowering
//!
//! A [`Lowerer`] turns one source-level operator application into IR. Every
//! entry point takes already-typed [`Value`]s, decides the result type and
//! the exact instructions under the implicit-conversion rules in
//! [`crate::types::promote`], appends them to the borrowed [`IrBuilder`] and
//! returns the result value. Ill-typed combinations come back as a
//! [`CompileError`] naming the operator.
//!
//! Submodules group the entry points by family:
//! - [`broadcast`]: splat and broadcast to a common shape
//! - [`cast`]: the cast decision tree and bitcast
//! - [`arith`]: arithmetic, bitwise, comparison and pointer arithmetic
//! - [`memory`]: loads and stores
//! - [`atomic`]: read-modify-write and compare-and-swap
//! - [`reduce`]: axis reductions
//! - [`builtins`]: program model, block creation, shape ops, dot, math, hints

pub mod arith;
pub mod atomic;
pub mod broadcast;
pub mod builtins;
pub mod cast;
pub mod memory;
pub mod reduce;

pub use arith::Comparison;
pub use memory::LoadFlags;
pub use reduce::ReduceKind;

use crate::config::LoweringOptions;
use crate::error::{CompileError, Result};
use crate::ir::{Constant, InstKind, IrBuilder, Value};
use crate::types::{BlockType, ScalarKind, computation_type};

/// Pointer and promotion rules a binary operator applies to its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OperandCheck {
    pub allow_lhs_ptr: bool,
    pub allow_rhs_ptr: bool,
    /// Resolve the computation type and cast both operands into it
    pub arithmetic: bool,
    pub div_or_mod: bool,
}

impl OperandCheck {
    pub const ARITHMETIC: Self = Self {
        allow_lhs_ptr: false,
        allow_rhs_ptr: false,
        arithmetic: true,
        div_or_mod: false,
    };
    pub const DIV_OR_MOD: Self = Self {
        div_or_mod: true,
        ..Self::ARITHMETIC
    };
    /// Broadcast and pointer checks only
    pub const NO_PROMOTION: Self = Self {
        arithmetic: false,
        ..Self::ARITHMETIC
    };
    pub const ADD: Self = Self {
        allow_lhs_ptr: true,
        allow_rhs_ptr: true,
        ..Self::ARITHMETIC
    };
    pub const SUB: Self = Self {
        allow_lhs_ptr: true,
        ..Self::ARITHMETIC
    };
}

/// Lowering session over one builder
pub struct Lowerer<'a> {
    builder: &'a mut IrBuilder,
    options: LoweringOptions,
}

impl<'a> Lowerer<'a> {
    pub fn new(builder: &'a mut IrBuilder, options: LoweringOptions) -> Self {
        Self { builder, options }
    }

    pub fn builder(&self) -> &IrBuilder {
        &*self.builder
    }

    pub fn options(&self) -> &LoweringOptions {
        &self.options
    }

    pub(crate) fn emit(&mut self, kind: InstKind, ty: BlockType) -> Value {
        self.builder.emit(kind, ty)
    }

    pub(crate) fn emit_void(&mut self, kind: InstKind) {
        self.builder.emit_void(kind);
    }

    pub(crate) fn builder_mut(&mut self) -> &mut IrBuilder {
        &mut *self.builder
    }

    /// Scalar constant of `kind`
    pub fn constant(&mut self, value: Constant, kind: ScalarKind) -> Value {
        self.builder.constant(value, BlockType::scalar(kind))
    }

    /// Constant of `ty`'s element kind, splatted when `ty` is a block
    pub(crate) fn splat_constant(&mut self, value: Constant, ty: &BlockType) -> Value {
        let scalar = self.constant(value, ty.element.clone());
        if ty.is_block() {
            self.emit(InstKind::Splat { src: scalar.id }, ty.clone())
        } else {
            scalar
        }
    }

    /// Broadcast both operands, enforce pointer legality, and optionally
    /// promote both into the computation type.
    pub(crate) fn binary_op_type_checking(
        &mut self,
        op: &'static str,
        lhs: Value,
        rhs: Value,
        check: OperandCheck,
    ) -> Result<(Value, Value)> {
        let (lhs, rhs) = self.broadcast_value(lhs, rhs).map_err(|e| e.with_op(op))?;
        check_ptr_type(op, lhs.element(), rhs.element(), check.allow_lhs_ptr)?;
        check_ptr_type(op, rhs.element(), lhs.element(), check.allow_rhs_ptr)
            .map_err(|_| CompileError::incompatible(op, lhs.element(), rhs.element()))?;

        if !check.arithmetic || lhs.element().is_ptr() || rhs.element().is_ptr() {
            return Ok((lhs, rhs));
        }
        let kind = computation_type(lhs.element(), rhs.element(), check.div_or_mod)
            .map_err(|e| e.with_op(op))?;
        log::trace!(
            "{op}: computation type of {} and {} is {kind}",
            lhs.element(),
            rhs.element()
        );
        let lhs = self.cast(lhs, &kind).map_err(|e| e.with_op(op))?;
        let rhs = self.cast(rhs, &kind).map_err(|e| e.with_op(op))?;
        Ok((lhs, rhs))
    }
}

/// Reject pointer operands an operator does not accept.
///
/// When `a` is a pointer it must be allowed on that side, and `b` may be
/// neither another pointer nor a float.
pub(crate) fn check_ptr_type(
    op: &'static str,
    a: &ScalarKind,
    b: &ScalarKind,
    allow_ptr_a: bool,
) -> Result<()> {
    if a.is_ptr() && (!allow_ptr_a || b.is_ptr() || b.is_floating()) {
        return Err(CompileError::incompatible(op, a, b));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ptr_type() {
        let p = ScalarKind::ptr(ScalarKind::F32);
        assert!(check_ptr_type("add", &p, &ScalarKind::I32, true).is_ok());
        assert!(check_ptr_type("mul", &p, &ScalarKind::I32, false).is_err());
        assert!(check_ptr_type("add", &p, &ScalarKind::F32, true).is_err());
        assert!(check_ptr_type("add", &p, &p, true).is_err());
        assert!(check_ptr_type("add", &ScalarKind::I32, &p, false).is_ok());
    }

    #[test]
    fn test_binary_check_names_operands_in_call_order() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::scalar(ScalarKind::I32));
        let p = b.argument("p", BlockType::scalar(ScalarKind::ptr(ScalarKind::F32)));
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        let err = lw
            .binary_op_type_checking("mul", x, p, OperandCheck::ARITHMETIC)
            .unwrap_err();
        assert_eq!(err.to_string(), "mul: invalid operands of type int32 and *fp32");
    }

    #[test]
    fn test_binary_check_promotes() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::new(ScalarKind::I8, vec![4]));
        let y = b.argument("y", BlockType::scalar(ScalarKind::F32));
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        let (x, y) = lw
            .binary_op_type_checking("add", x, y, OperandCheck::ARITHMETIC)
            .unwrap();
        assert_eq!(x.ty, BlockType::new(ScalarKind::F32, vec![4]));
        assert_eq!(y.ty, x.ty);
    }

    #[test]
    fn test_promotion_error_is_relabeled() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::scalar(ScalarKind::BF16));
        let y = b.argument("y", BlockType::scalar(ScalarKind::I32));
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        let err = lw
            .binary_op_type_checking("mul", x, y, OperandCheck::ARITHMETIC)
            .unwrap_err();
        assert_eq!(err.op(), "mul");
        assert!(matches!(err, CompileError::Type { .. }));
    }
}
