//! Cast and bitcast lowering
//!
//! [`Lowerer::cast`] walks a fixed decision tree; the first rule that
//! matches the (source, destination) pair decides the instruction:
//!
//! | source → destination            | lowering                              |
//! |---------------------------------|---------------------------------------|
//! | same kind                       | nothing, input returned               |
//! | bf16 ↔ anything but fp32        | two steps through fp32                |
//! | float → narrower float          | `fp-trunc`                            |
//! | float → wider float             | `fp-ext`                              |
//! | int/bool → multi-bit int        | `int-cast`, sign-extending signed ints|
//! | float → bool / int              | `fp-to-ui` / `fp-to-si`               |
//! | bool, unsigned / signed → float | `ui-to-fp` / `si-to-fp`               |
//! | pointer → int64 / bool          | `ptr-to-int` / null check             |
//! | int → pointer                   | `int-to-ptr`                          |
//! | pointer → pointer               | `bitcast`                             |
//! | int → bool                      | widen to int64, compare `!= 0`        |
//!
//! Anything else (float ↔ pointer) is a type error.

use super::Lowerer;
use crate::error::{CompileError, Result};
use crate::ir::{CastOp, Constant, ICmpPred, InstKind, Value};
use crate::types::{BlockType, ScalarKind};

impl Lowerer<'_> {
    /// Convert `input` to `dst`, preserving numeric meaning
    pub fn cast(&mut self, input: Value, dst: &ScalarKind) -> Result<Value> {
        let src = input.element().clone();
        if &src == dst {
            return Ok(input);
        }
        log::trace!("cast {} : {} -> {dst}", input.id, input.ty);

        if (src.is_bf16() && !dst.is_fp32()) || (dst.is_bf16() && !src.is_fp32()) {
            let widened = self.cast(input, &ScalarKind::F32)?;
            return self.cast(widened, dst);
        }

        let dst_ty = input.ty.with_element(dst.clone());

        if let (Some(src_mantissa), Some(dst_mantissa)) =
            (src.fp_mantissa_width(), dst.fp_mantissa_width())
        {
            let op = if src_mantissa > dst_mantissa {
                CastOp::FpTrunc
            } else {
                CastOp::FpExt
            };
            return Ok(self.cast_inst(op, input, dst_ty));
        }

        if src.is_int() && matches!(dst, ScalarKind::Int { .. }) {
            let sign_extend = matches!(src, ScalarKind::Int { signed: true, .. });
            return Ok(self.cast_inst(CastOp::IntCast { sign_extend }, input, dst_ty));
        }

        if src.is_floating() && dst.is_int() {
            let op = if dst.is_bool() {
                CastOp::FpToUi
            } else {
                CastOp::FpToSi
            };
            return Ok(self.cast_inst(op, input, dst_ty));
        }

        if src.is_int() && dst.is_floating() {
            let op = if src.is_bool() || src.is_int_unsigned() {
                CastOp::UiToFp
            } else {
                CastOp::SiToFp
            };
            return Ok(self.cast_inst(op, input, dst_ty));
        }

        if src.is_ptr() && dst.is_int() {
            return match dst.int_bitwidth() {
                Some(64) => Ok(self.cast_inst(CastOp::PtrToInt, input, dst_ty)),
                Some(1) => {
                    let addr = self.cast_inst(
                        CastOp::PtrToInt,
                        input,
                        dst_ty.with_element(ScalarKind::I64),
                    );
                    Ok(self.nonzero(addr))
                }
                _ => Err(CompileError::type_error(
                    "cast",
                    format!("cannot cast {src} to {dst}: pointers only convert to int64 or int1"),
                )),
            };
        }

        if src.is_int() && dst.is_ptr() {
            return Ok(self.cast_inst(CastOp::IntToPtr, input, dst_ty));
        }

        if src.is_ptr() && dst.is_ptr() {
            return Ok(self.cast_inst(CastOp::Bitcast, input, dst_ty));
        }

        if src.is_int() && dst.is_bool() {
            let wide = self.cast(input, &ScalarKind::I64)?;
            return Ok(self.nonzero(wide));
        }

        Err(CompileError::type_error(
            "cast",
            format!("cannot cast {src} to {dst}"),
        ))
    }

    /// Reinterpret the bits of `input` as `dst`
    pub fn bitcast(&mut self, input: Value, dst: &ScalarKind) -> Result<Value> {
        let src = input.element().clone();
        if &src == dst {
            return Ok(input);
        }
        if src.is_ptr() || dst.is_ptr() {
            return self.cast(input, dst).map_err(|e| e.with_op("bitcast"));
        }
        let (src_bits, dst_bits) = (src.primitive_bitwidth(), dst.primitive_bitwidth());
        if src_bits != dst_bits {
            return Err(CompileError::value_error(
                "bitcast",
                format!("cannot bitcast data-type of size {src_bits} to data-type of size {dst_bits}"),
            ));
        }
        let ty = input.ty.with_element(dst.clone());
        Ok(self.cast_inst(CastOp::Bitcast, input, ty))
    }

    fn cast_inst(&mut self, op: CastOp, input: Value, ty: BlockType) -> Value {
        self.emit(InstKind::Cast { op, src: input.id }, ty)
    }

    /// `input != 0` with a zero of the input's kind and shape
    pub(crate) fn nonzero(&mut self, input: Value) -> Value {
        let zero = self.splat_constant(Constant::Zero, &input.ty);
        self.emit(
            InstKind::ICmp {
                pred: ICmpPred::Ne,
                lhs: input.id,
                rhs: zero.id,
            },
            input.ty.with_element(ScalarKind::Bool),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoweringOptions;
    use crate::ir::IrBuilder;

    fn cast_ops(src: &str, dst: ScalarKind) -> Result<Vec<InstKind>> {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", src.parse().unwrap());
        let start = b.len();
        let out = Lowerer::new(&mut b, LoweringOptions::default()).cast(x, &dst)?;
        assert_eq!(out.element(), &dst);
        Ok(b.instructions()[start..].iter().map(|i| i.kind.clone()).collect())
    }

    fn cast_op(op: &InstKind) -> Option<CastOp> {
        match op {
            InstKind::Cast { op, .. } => Some(*op),
            _ => None,
        }
    }

    #[test]
    fn test_identity_emits_nothing() {
        assert!(cast_ops("fp32[4]", ScalarKind::F32).unwrap().is_empty());
    }

    #[test]
    fn test_float_rank_rules() {
        assert_eq!(cast_op(&cast_ops("fp64", ScalarKind::F32).unwrap()[0]), Some(CastOp::FpTrunc));
        assert_eq!(cast_op(&cast_ops("fp16", ScalarKind::F32).unwrap()[0]), Some(CastOp::FpExt));
        assert_eq!(cast_op(&cast_ops("bf16", ScalarKind::F32).unwrap()[0]), Some(CastOp::FpExt));
    }

    #[test]
    fn test_bf16_goes_through_fp32() {
        let ops = cast_ops("bf16", ScalarKind::F16).unwrap();
        let casts: Vec<_> = ops.iter().filter_map(cast_op).collect();
        assert_eq!(casts, vec![CastOp::FpExt, CastOp::FpTrunc]);

        let ops = cast_ops("int32", ScalarKind::BF16).unwrap();
        let casts: Vec<_> = ops.iter().filter_map(cast_op).collect();
        assert_eq!(casts, vec![CastOp::SiToFp, CastOp::FpTrunc]);
    }

    #[test]
    fn test_int_cast_extension() {
        let sext = cast_ops("int8", ScalarKind::I32).unwrap();
        assert_eq!(cast_op(&sext[0]), Some(CastOp::IntCast { sign_extend: true }));
        let zext = cast_ops("uint8", ScalarKind::I32).unwrap();
        assert_eq!(cast_op(&zext[0]), Some(CastOp::IntCast { sign_extend: false }));
        let from_bool = cast_ops("int1", ScalarKind::I32).unwrap();
        assert_eq!(cast_op(&from_bool[0]), Some(CastOp::IntCast { sign_extend: false }));
    }

    #[test]
    fn test_float_int_conversions() {
        assert_eq!(cast_op(&cast_ops("fp32", ScalarKind::Bool).unwrap()[0]), Some(CastOp::FpToUi));
        assert_eq!(cast_op(&cast_ops("fp32", ScalarKind::U32).unwrap()[0]), Some(CastOp::FpToSi));
        assert_eq!(cast_op(&cast_ops("uint16", ScalarKind::F32).unwrap()[0]), Some(CastOp::UiToFp));
        assert_eq!(cast_op(&cast_ops("int1", ScalarKind::F32).unwrap()[0]), Some(CastOp::UiToFp));
        assert_eq!(cast_op(&cast_ops("int16", ScalarKind::F64).unwrap()[0]), Some(CastOp::SiToFp));
    }

    #[test]
    fn test_pointer_conversions() {
        assert_eq!(cast_op(&cast_ops("*fp32", ScalarKind::I64).unwrap()[0]), Some(CastOp::PtrToInt));
        assert_eq!(
            cast_op(&cast_ops("int64", ScalarKind::ptr(ScalarKind::F32)).unwrap()[0]),
            Some(CastOp::IntToPtr)
        );
        assert_eq!(
            cast_op(&cast_ops("*fp32", ScalarKind::ptr(ScalarKind::I8)).unwrap()[0]),
            Some(CastOp::Bitcast)
        );
        let err = cast_ops("*fp32", ScalarKind::I32).unwrap_err();
        assert!(matches!(err, CompileError::Type { .. }));
    }

    #[test]
    fn test_pointer_to_bool_is_null_check() {
        let ops = cast_ops("*fp32[8]", ScalarKind::Bool).unwrap();
        assert_eq!(cast_op(&ops[0]), Some(CastOp::PtrToInt));
        assert!(matches!(ops.last(), Some(InstKind::ICmp { pred: ICmpPred::Ne, .. })));
    }

    #[test]
    fn test_int_to_bool_compares_against_splatted_zero() {
        let ops = cast_ops("int32[4]", ScalarKind::Bool).unwrap();
        assert_eq!(cast_op(&ops[0]), Some(CastOp::IntCast { sign_extend: true }));
        assert!(matches!(ops[1], InstKind::Const { value: Constant::Zero }));
        assert!(matches!(ops[2], InstKind::Splat { .. }));
        assert!(matches!(ops[3], InstKind::ICmp { pred: ICmpPred::Ne, .. }));
    }

    #[test]
    fn test_float_to_pointer_is_type_error() {
        let err = cast_ops("fp32", ScalarKind::ptr(ScalarKind::F32)).unwrap_err();
        assert_eq!(err.to_string(), "cast: type error: cannot cast fp32 to *fp32");
        assert!(cast_ops("*fp32", ScalarKind::F64).is_err());
    }

    #[test]
    fn test_bitcast_width_mismatch() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::scalar(ScalarKind::F32));
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        let err = lw.bitcast(x.clone(), &ScalarKind::I64).unwrap_err();
        assert!(matches!(err, CompileError::Value { .. }));
        assert!(err.message().contains("32") && err.message().contains("64"));
        let y = lw.bitcast(x, &ScalarKind::I32).unwrap();
        assert_eq!(y.element(), &ScalarKind::I32);
    }
}
