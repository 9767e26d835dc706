//! Axis reductions

use super::Lowerer;
use crate::error::{CompileError, Result};
use crate::ir::{InstKind, ReduceOp, Value};
use crate::types::{IntWidth, ScalarKind};

/// Reduction combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceKind {
    Min,
    Max,
    Sum,
    XorSum,
}

impl ReduceKind {
    pub fn name(self) -> &'static str {
        match self {
            ReduceKind::Min => "min",
            ReduceKind::Max => "max",
            ReduceKind::Sum => "sum",
            ReduceKind::XorSum => "xor_sum",
        }
    }
}

impl Lowerer<'_> {
    /// Reduce `input` along `axis`, dropping that axis from the shape.
    ///
    /// Integers narrower than 32 bits are widened to 32 bits first, keeping
    /// their signedness.
    pub fn reduce(&mut self, input: Value, axis: usize, kind: ReduceKind) -> Result<Value> {
        let op = kind.name();
        log::debug!("reduce {op} {} axis={axis}", input.ty);
        if !input.ty.is_block() {
            return Err(CompileError::shape_error(
                op,
                format!("reduction input must be a block, got {}", input.ty),
                None,
            ));
        }
        if axis >= input.ty.rank() {
            return Err(CompileError::shape_error(
                op,
                format!("axis {axis} out of range for {}", input.ty),
                Some(axis),
            ));
        }

        let elem = input.element().clone();
        if elem.is_ptr() {
            return Err(CompileError::type_error(
                op,
                format!("cannot reduce pointers ({elem})"),
            ));
        }
        if kind == ReduceKind::XorSum && !elem.is_int() {
            return Err(CompileError::type_error(
                op,
                format!("xor_sum only supported for integers, got {elem}"),
            ));
        }

        let input = match elem.int_bitwidth() {
            Some(bits) if bits < 32 => {
                let widened = ScalarKind::int(IntWidth::W32, !elem.is_int_unsigned());
                self.cast(input, &widened).map_err(|e| e.with_op(op))?
            }
            _ => input,
        };
        let elem = input.element().clone();
        let unsigned_aware = self.options().signed_aware_reductions && elem.is_int_unsigned();

        let reduce_op = match (kind, elem.is_floating()) {
            (ReduceKind::Sum, true) => ReduceOp::FAdd,
            (ReduceKind::Sum, false) => ReduceOp::Add,
            (ReduceKind::Min, true) => ReduceOp::FMin,
            (ReduceKind::Max, true) => ReduceOp::FMax,
            (ReduceKind::Min, false) if unsigned_aware => ReduceOp::UMin,
            (ReduceKind::Max, false) if unsigned_aware => ReduceOp::UMax,
            (ReduceKind::Min, false) => ReduceOp::Min,
            (ReduceKind::Max, false) => ReduceOp::Max,
            (ReduceKind::XorSum, _) => ReduceOp::Xor,
        };

        let mut shape = input.shape().to_vec();
        shape.remove(axis);
        let ty = input.ty.with_shape(shape);
        Ok(self.emit(
            InstKind::Reduce {
                op: reduce_op,
                input: input.id,
                axis,
            },
            ty,
        ))
    }

    pub fn reduce_min(&mut self, input: Value, axis: usize) -> Result<Value> {
        self.reduce(input, axis, ReduceKind::Min)
    }

    pub fn reduce_max(&mut self, input: Value, axis: usize) -> Result<Value> {
        self.reduce(input, axis, ReduceKind::Max)
    }

    pub fn sum(&mut self, input: Value, axis: usize) -> Result<Value> {
        self.reduce(input, axis, ReduceKind::Sum)
    }

    pub fn xor_sum(&mut self, input: Value, axis: usize) -> Result<Value> {
        self.reduce(input, axis, ReduceKind::XorSum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoweringOptions;
    use crate::ir::IrBuilder;
    use crate::types::BlockType;

    fn reduce_one(ty: &str, axis: usize, kind: ReduceKind, opts: LoweringOptions) -> Result<(Value, ReduceOp)> {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", ty.parse().unwrap());
        let r = Lowerer::new(&mut b, opts).reduce(x, axis, kind)?;
        let op = match b.instructions().last().unwrap().kind {
            InstKind::Reduce { op, .. } => op,
            ref other => panic!("expected reduce, got {other:?}"),
        };
        Ok((r, op))
    }

    #[test]
    fn test_result_drops_axis() {
        let (r, op) = reduce_one("fp32[4,8]", 1, ReduceKind::Sum, LoweringOptions::default()).unwrap();
        assert_eq!(r.ty, BlockType::new(ScalarKind::F32, vec![4]));
        assert_eq!(op, ReduceOp::FAdd);
        let (r, _) = reduce_one("fp32[4]", 0, ReduceKind::Max, LoweringOptions::default()).unwrap();
        assert!(!r.ty.is_block());
    }

    #[test]
    fn test_narrow_ints_widen_keeping_signedness() {
        let (r, op) = reduce_one("int8[16]", 0, ReduceKind::Sum, LoweringOptions::default()).unwrap();
        assert_eq!(r.element(), &ScalarKind::I32);
        assert_eq!(op, ReduceOp::Add);
        let (r, _) = reduce_one("uint16[16]", 0, ReduceKind::Min, LoweringOptions::default()).unwrap();
        assert_eq!(r.element(), &ScalarKind::U32);
        let (r, _) = reduce_one("int1[16]", 0, ReduceKind::Sum, LoweringOptions::default()).unwrap();
        assert_eq!(r.element(), &ScalarKind::I32);
        let (r, _) = reduce_one("int64[16]", 0, ReduceKind::Sum, LoweringOptions::default()).unwrap();
        assert_eq!(r.element(), &ScalarKind::I64);
    }

    #[test]
    fn test_unsigned_min_max_follow_option() {
        let (_, op) = reduce_one("uint32[16]", 0, ReduceKind::Min, LoweringOptions::default()).unwrap();
        assert_eq!(op, ReduceOp::Min);
        let aware = LoweringOptions {
            signed_aware_reductions: true,
            ..LoweringOptions::default()
        };
        let (_, op) = reduce_one("uint32[16]", 0, ReduceKind::Max, aware).unwrap();
        assert_eq!(op, ReduceOp::UMax);
        let (_, op) = reduce_one("int32[16]", 0, ReduceKind::Max, aware).unwrap();
        assert_eq!(op, ReduceOp::Max);
    }

    #[test]
    fn test_invalid_reductions() {
        let opts = LoweringOptions::default();
        let err = reduce_one("fp32[16]", 0, ReduceKind::XorSum, opts).unwrap_err();
        assert!(matches!(err, CompileError::Type { .. }));
        let err = reduce_one("fp32[16]", 1, ReduceKind::Sum, opts).unwrap_err();
        assert!(matches!(err, CompileError::Shape { axis: Some(1), .. }));
        let err = reduce_one("fp32", 0, ReduceKind::Sum, opts).unwrap_err();
        assert!(matches!(err, CompileError::Shape { .. }));
        let (_, op) = reduce_one("uint8[4,4]", 0, ReduceKind::XorSum, opts).unwrap();
        assert_eq!(op, ReduceOp::Xor);
    }
}
