//! Builtin functions
//!
//! Program-model queries, block creation, shape manipulation, `where`,
//! `dot`, elementwise math and compiler hints.

use super::{Lowerer, OperandCheck};
use crate::error::{CompileError, Result};
use crate::ir::{Constant, InstKind, MathFn, Metadata, Value};
use crate::types::{BlockType, ScalarKind, computation_type, numel};

fn check_axis(op: &'static str, axis: u32) -> Result<()> {
    if axis > 2 {
        return Err(CompileError::value_error(
            op,
            format!("program axis must be 0, 1 or 2 but got {axis}"),
        ));
    }
    Ok(())
}

fn check_shape(op: &'static str, shape: &[usize]) -> Result<()> {
    if let Some(axis) = shape.iter().position(|&d| d == 0) {
        return Err(CompileError::shape_error(
            op,
            format!("dimensions must be at least 1, got {shape:?}"),
            Some(axis),
        ));
    }
    Ok(())
}

impl Lowerer<'_> {
    // ========================================================================
    // Program model
    // ========================================================================

    pub fn program_id(&mut self, axis: u32) -> Result<Value> {
        check_axis("program_id", axis)?;
        Ok(self.emit(InstKind::ProgramId { axis }, BlockType::scalar(ScalarKind::I32)))
    }

    pub fn num_programs(&mut self, axis: u32) -> Result<Value> {
        check_axis("num_programs", axis)?;
        Ok(self.emit(InstKind::NumPrograms { axis }, BlockType::scalar(ScalarKind::I32)))
    }

    // ========================================================================
    // Block creation
    // ========================================================================

    /// `int32[end - start]` holding `start, start + 1, ..., end - 1`
    pub fn arange(&mut self, start: i32, end: i32) -> Result<Value> {
        if end <= start {
            return Err(CompileError::value_error(
                "arange",
                format!("arange's end argument ({end}) must be greater than the start argument ({start})"),
            ));
        }
        let len = (i64::from(end) - i64::from(start)) as usize;
        Ok(self.emit(
            InstKind::MakeRange { start, end },
            BlockType::new(ScalarKind::I32, vec![len]),
        ))
    }

    pub fn zeros(&mut self, shape: &[usize], kind: ScalarKind) -> Result<Value> {
        self.full(shape, kind, Constant::Zero)
    }

    pub fn full(&mut self, shape: &[usize], kind: ScalarKind, value: Constant) -> Result<Value> {
        check_shape("full", shape)?;
        Ok(self.splat_constant(value, &BlockType::new(kind, shape.to_vec())))
    }

    // ========================================================================
    // Shape manipulation
    // ========================================================================

    pub fn reshape(&mut self, input: Value, shape: &[usize]) -> Result<Value> {
        check_shape("reshape", shape)?;
        if input.ty.numel() != numel(shape) {
            return Err(CompileError::value_error(
                "reshape",
                format!(
                    "cannot reshape {} to {shape:?}: number of elements differs ({} vs {})",
                    input.ty,
                    input.ty.numel(),
                    numel(shape)
                ),
            ));
        }
        if input.shape() == shape {
            return Ok(input);
        }
        let ty = input.ty.with_shape(shape.to_vec());
        Ok(self.emit(InstKind::Reshape { src: input.id }, ty))
    }

    /// Concatenate two blocks along axis 0
    pub fn cat(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        if lhs.element() != rhs.element() {
            return Err(CompileError::type_error(
                "cat",
                format!("cannot concatenate {} and {}", lhs.element(), rhs.element()),
            ));
        }
        if !lhs.ty.is_block() || lhs.ty.rank() != rhs.ty.rank() {
            return Err(CompileError::shape_error(
                "cat",
                format!("operands must be blocks of equal rank, got {} and {}", lhs.ty, rhs.ty),
                None,
            ));
        }
        if let Some(axis) = (1..lhs.ty.rank()).find(|&a| lhs.shape()[a] != rhs.shape()[a]) {
            return Err(CompileError::shape_error(
                "cat",
                format!(
                    "incompatible dimensions at index {axis}: {} and {}",
                    lhs.shape()[axis],
                    rhs.shape()[axis]
                ),
                Some(axis),
            ));
        }
        let mut shape = lhs.shape().to_vec();
        shape[0] += rhs.shape()[0];
        Ok(self.emit(
            InstKind::Cat {
                lhs: lhs.id,
                rhs: rhs.id,
            },
            lhs.ty.with_shape(shape),
        ))
    }

    // ========================================================================
    // Select
    // ========================================================================

    /// Elementwise `cond ? x : y`
    pub fn where_(&mut self, cond: Value, x: Value, y: Value) -> Result<Value> {
        const OP: &str = "where";
        log::debug!("where {} {} {}", cond.ty, x.ty, y.ty);
        let mut cond = self.cast(cond, &ScalarKind::Bool).map_err(|e| e.with_op(OP))?;
        let (mut x, mut y) = (x, y);
        if cond.ty.is_block() {
            (cond, x) = self.broadcast_value(cond, x).map_err(|e| e.with_op(OP))?;
            (x, y) = self.broadcast_value(x, y).map_err(|e| e.with_op(OP))?;
            (cond, x) = self.broadcast_value(cond, x).map_err(|e| e.with_op(OP))?;
        }

        let (x, y) = if x.element().is_ptr() || y.element().is_ptr() {
            let (x, y) = self.broadcast_value(x, y).map_err(|e| e.with_op(OP))?;
            if x.element() != y.element() {
                return Err(CompileError::incompatible(OP, x.element(), y.element()));
            }
            (x, y)
        } else {
            let (x, y) = self.binary_op_type_checking(OP, x, y, OperandCheck::NO_PROMOTION)?;
            let kind = computation_type(x.element(), y.element(), false).map_err(|e| e.with_op(OP))?;
            let x = self.cast(x, &kind).map_err(|e| e.with_op(OP))?;
            let y = self.cast(y, &kind).map_err(|e| e.with_op(OP))?;
            (x, y)
        };

        if !cond.ty.is_block() {
            (cond, _) = self.broadcast_value(cond, x.clone()).map_err(|e| e.with_op(OP))?;
        }
        let ty = x.ty.clone();
        Ok(self.emit(
            InstKind::Select {
                cond: cond.id,
                on_true: x.id,
                on_false: y.id,
            },
            ty,
        ))
    }

    // ========================================================================
    // Linear algebra
    // ========================================================================

    /// Matrix product of `[M, K]` and `[K, N]` blocks, accumulated in
    /// int32 for integer inputs and fp32 otherwise. `allow_tf32` falls back
    /// to the configured default.
    pub fn dot(&mut self, lhs: Value, rhs: Value, allow_tf32: Option<bool>) -> Result<Value> {
        log::debug!("dot {} {}", lhs.ty, rhs.ty);
        if lhs.ty.rank() != 2 || rhs.ty.rank() != 2 {
            return Err(CompileError::shape_error(
                "dot",
                format!("both operands must be rank-2 blocks, got {} and {}", lhs.ty, rhs.ty),
                None,
            ));
        }
        if lhs.shape()[1] != rhs.shape()[0] {
            return Err(CompileError::shape_error(
                "dot",
                format!(
                    "inner dimensions must match, got {} and {}",
                    lhs.shape()[1],
                    rhs.shape()[0]
                ),
                Some(1),
            ));
        }
        if lhs.element() != rhs.element() || lhs.element().is_ptr() {
            return Err(CompileError::type_error(
                "dot",
                format!("operands must have the same numeric type, got {} and {}", lhs.element(), rhs.element()),
            ));
        }
        let acc_kind = if lhs.element().is_int() {
            ScalarKind::I32
        } else {
            ScalarKind::F32
        };
        let shape = vec![lhs.shape()[0], rhs.shape()[1]];
        let acc = self.zeros(&shape, acc_kind.clone())?;
        let allow_tf32 = allow_tf32.unwrap_or(self.options().allow_tf32);
        Ok(self.emit(
            InstKind::Dot {
                lhs: lhs.id,
                rhs: rhs.id,
                acc: acc.id,
                allow_tf32,
            },
            BlockType::new(acc_kind, shape),
        ))
    }

    // ========================================================================
    // Math
    // ========================================================================

    pub fn math(&mut self, func: MathFn, input: Value) -> Result<Value> {
        let op = match func {
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Cos => "cos",
            MathFn::Sin => "sin",
            MathFn::Sqrt => "sqrt",
        };
        if !input.element().is_floating() {
            return Err(CompileError::type_error(
                op,
                format!("{op} requires a floating-point operand, got {}", input.ty),
            ));
        }
        let ty = input.ty.clone();
        Ok(self.emit(InstKind::Math { func, src: input.id }, ty))
    }

    pub fn exp(&mut self, input: Value) -> Result<Value> {
        self.math(MathFn::Exp, input)
    }

    pub fn log(&mut self, input: Value) -> Result<Value> {
        self.math(MathFn::Log, input)
    }

    pub fn cos(&mut self, input: Value) -> Result<Value> {
        self.math(MathFn::Cos, input)
    }

    pub fn sin(&mut self, input: Value) -> Result<Value> {
        self.math(MathFn::Sin, input)
    }

    pub fn sqrt(&mut self, input: Value) -> Result<Value> {
        self.math(MathFn::Sqrt, input)
    }

    // ========================================================================
    // Hints
    // ========================================================================

    fn hint(&mut self, op: &'static str, input: Value, md: Metadata, n: u32) -> Result<Value> {
        if n == 0 {
            return Err(CompileError::value_error(op, format!("{op} requires n >= 1, got {n}")));
        }
        self.builder_mut()
            .set_metadata(input.id, md)
            .map_err(|e| e.with_op(op))?;
        Ok(input)
    }

    /// Assert every element of `input` is a multiple of `n`
    pub fn multiple_of(&mut self, input: Value, n: u32) -> Result<Value> {
        self.hint("multiple_of", input, Metadata::MultipleOf(n), n)
    }

    /// Assert `input` holds runs of at least `n` consecutive values
    pub fn max_contiguous(&mut self, input: Value, n: u32) -> Result<Value> {
        self.hint("max_contiguous", input, Metadata::MaxContiguous(n), n)
    }

    pub fn debug_barrier(&mut self) {
        self.emit_void(InstKind::Barrier);
    }
}
