//! Arithmetic, bitwise and comparison lowering

use super::{Lowerer, OperandCheck};
use crate::error::{CompileError, Result};
use crate::ir::{BinaryOp, Constant, FCmpPred, ICmpPred, InstKind, Value};
use crate::types::{ScalarKind, integer_promote};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    fn op_name(self) -> &'static str {
        match self {
            Comparison::Gt => "greater_than",
            Comparison::Ge => "greater_equal",
            Comparison::Lt => "less_than",
            Comparison::Le => "less_equal",
            Comparison::Eq => "equal",
            Comparison::Ne => "not_equal",
        }
    }

    fn fcmp(self) -> FCmpPred {
        match self {
            Comparison::Gt => FCmpPred::Ogt,
            Comparison::Ge => FCmpPred::Oge,
            Comparison::Lt => FCmpPred::Olt,
            Comparison::Le => FCmpPred::Ole,
            Comparison::Eq => FCmpPred::Oeq,
            Comparison::Ne => FCmpPred::Une,
        }
    }

    fn icmp(self, signed: bool) -> ICmpPred {
        match (self, signed) {
            (Comparison::Gt, true) => ICmpPred::Sgt,
            (Comparison::Gt, false) => ICmpPred::Ugt,
            (Comparison::Ge, true) => ICmpPred::Sge,
            (Comparison::Ge, false) => ICmpPred::Uge,
            (Comparison::Lt, true) => ICmpPred::Slt,
            (Comparison::Lt, false) => ICmpPred::Ult,
            (Comparison::Le, true) => ICmpPred::Sle,
            (Comparison::Le, false) => ICmpPred::Ule,
            (Comparison::Eq, _) => ICmpPred::Eq,
            (Comparison::Ne, _) => ICmpPred::Ne,
        }
    }
}

impl Lowerer<'_> {
    fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let ty = lhs.ty.clone();
        self.emit(
            InstKind::Binary {
                op,
                lhs: lhs.id,
                rhs: rhs.id,
            },
            ty,
        )
    }

    fn unexpected(op: &'static str, kind: &ScalarKind) -> CompileError {
        CompileError::internal(op, format!("unexpected operand kind {kind}"))
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// `lhs + rhs`; a pointer on either side becomes pointer arithmetic
    pub fn add(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("add {} + {}", lhs.ty, rhs.ty);
        let (mut lhs, mut rhs) = self.binary_op_type_checking("add", lhs, rhs, OperandCheck::ADD)?;
        if rhs.element().is_ptr() {
            std::mem::swap(&mut lhs, &mut rhs);
        }
        let kind = lhs.element().clone();
        if kind.is_ptr() {
            Ok(self.add_ptr(lhs, rhs))
        } else if kind.is_floating() {
            Ok(self.binary(BinaryOp::FAdd, lhs, rhs))
        } else if kind.is_int() {
            Ok(self.binary(BinaryOp::Add, lhs, rhs))
        } else {
            Err(Self::unexpected("add", &kind))
        }
    }

    /// `lhs - rhs`; only `pointer - offset` is pointer arithmetic
    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("sub {} - {}", lhs.ty, rhs.ty);
        let (lhs, rhs) = self.binary_op_type_checking("sub", lhs, rhs, OperandCheck::SUB)?;
        let kind = lhs.element().clone();
        if kind.is_ptr() {
            let offset = self.minus(rhs).map_err(|e| e.with_op("sub"))?;
            Ok(self.add_ptr(lhs, offset))
        } else if kind.is_floating() {
            Ok(self.binary(BinaryOp::FSub, lhs, rhs))
        } else if kind.is_int() {
            Ok(self.binary(BinaryOp::Sub, lhs, rhs))
        } else {
            Err(Self::unexpected("sub", &kind))
        }
    }

    fn add_ptr(&mut self, ptr: Value, offset: Value) -> Value {
        let ty = ptr.ty.clone();
        self.emit(
            InstKind::AddPtr {
                ptr: ptr.id,
                offset: offset.id,
            },
            ty,
        )
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("mul {} * {}", lhs.ty, rhs.ty);
        let (lhs, rhs) = self.binary_op_type_checking("mul", lhs, rhs, OperandCheck::ARITHMETIC)?;
        let kind = lhs.element().clone();
        if kind.is_floating() {
            Ok(self.binary(BinaryOp::FMul, lhs, rhs))
        } else if kind.is_int() {
            Ok(self.binary(BinaryOp::Mul, lhs, rhs))
        } else {
            Err(Self::unexpected("mul", &kind))
        }
    }

    /// `lhs / rhs`, always a floating-point divide.
    ///
    /// Integers divide in fp32, an int/float pair in the float's kind, two
    /// floats in the more precise kind. A 16-bit result computes in fp32.
    pub fn truediv(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("truediv {} / {}", lhs.ty, rhs.ty);
        let (lhs, rhs) =
            self.binary_op_type_checking("truediv", lhs, rhs, OperandCheck::NO_PROMOTION)?;
        let (a, b) = (lhs.element().clone(), rhs.element().clone());
        let mut kind = match (a.fp_mantissa_width(), b.fp_mantissa_width()) {
            _ if a.is_int() && b.is_int() => ScalarKind::F32,
            (None, Some(_)) if a.is_int() => b.clone(),
            (Some(_), None) if b.is_int() => a.clone(),
            (Some(ma), Some(mb)) => {
                if ma >= mb {
                    a.clone()
                } else {
                    b.clone()
                }
            }
            _ => {
                return Err(CompileError::internal(
                    "truediv",
                    format!("unexpected operand kinds {a} and {b}"),
                ));
            }
        };
        if kind.is_fp16() || kind.is_bf16() {
            kind = ScalarKind::F32;
        }
        let lhs = self.cast(lhs, &kind).map_err(|e| e.with_op("truediv"))?;
        let rhs = self.cast(rhs, &kind).map_err(|e| e.with_op("truediv"))?;
        let ieee_rounding = self.options().ieee_rounding;
        Ok(self.fdiv_inst(lhs, rhs, ieee_rounding))
    }

    /// Explicit floating-point divide with caller-chosen rounding
    pub fn fdiv(&mut self, lhs: Value, rhs: Value, ieee_rounding: bool) -> Result<Value> {
        log::debug!("fdiv {} / {} (ieee_rounding = {ieee_rounding})", lhs.ty, rhs.ty);
        if !lhs.element().is_floating() || !rhs.element().is_floating() {
            return Err(CompileError::type_error(
                "fdiv",
                format!(
                    "both operands of fdiv must have floating scalar type, got {} and {}",
                    lhs.element(),
                    rhs.element()
                ),
            ));
        }
        let (lhs, rhs) =
            self.binary_op_type_checking("fdiv", lhs, rhs, OperandCheck::NO_PROMOTION)?;
        let lhs_rank = lhs.element().fp_mantissa_width();
        let rhs_rank = rhs.element().fp_mantissa_width();
        let kind = if lhs_rank >= rhs_rank {
            lhs.element().clone()
        } else {
            rhs.element().clone()
        };
        let lhs = self.cast(lhs, &kind).map_err(|e| e.with_op("fdiv"))?;
        let rhs = self.cast(rhs, &kind).map_err(|e| e.with_op("fdiv"))?;
        Ok(self.fdiv_inst(lhs, rhs, ieee_rounding))
    }

    fn fdiv_inst(&mut self, lhs: Value, rhs: Value, ieee_rounding: bool) -> Value {
        let ty = lhs.ty.clone();
        self.emit(
            InstKind::FDiv {
                lhs: lhs.id,
                rhs: rhs.id,
                ieee_rounding,
            },
            ty,
        )
    }

    /// `lhs // rhs` on integers
    pub fn floordiv(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("floordiv {} // {}", lhs.ty, rhs.ty);
        let (lhs, rhs) =
            self.binary_op_type_checking("floordiv", lhs, rhs, OperandCheck::NO_PROMOTION)?;
        if !lhs.element().is_int() || !rhs.element().is_int() {
            return Err(CompileError::type_error(
                "floordiv",
                format!(
                    "floor division requires integer operands, got {} and {}",
                    lhs.element(),
                    rhs.element()
                ),
            ));
        }
        let (lhs, rhs) =
            self.binary_op_type_checking("floordiv", lhs, rhs, OperandCheck::DIV_OR_MOD)?;
        let op = if lhs.element().is_int_signed() {
            BinaryOp::SDiv
        } else {
            BinaryOp::UDiv
        };
        Ok(self.binary(op, lhs, rhs))
    }

    /// `lhs % rhs`
    pub fn rem(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("mod {} % {}", lhs.ty, rhs.ty);
        let (a, b) = (lhs.element(), rhs.element());
        if a.is_int() && b.is_int() && a.int_signedness() != b.int_signedness() {
            return Err(CompileError::type_error(
                "mod",
                format!(
                    "cannot mod {a} by {b} because they have different signedness; \
                     cast them to the same signedness"
                ),
            ));
        }
        let (lhs, rhs) = self.binary_op_type_checking("mod", lhs, rhs, OperandCheck::DIV_OR_MOD)?;
        let kind = lhs.element().clone();
        if kind.is_floating() {
            Ok(self.binary(BinaryOp::FRem, lhs, rhs))
        } else if kind.is_int_signed() {
            Ok(self.binary(BinaryOp::SRem, lhs, rhs))
        } else if kind.is_int_unsigned() {
            Ok(self.binary(BinaryOp::URem, lhs, rhs))
        } else {
            Err(Self::unexpected("mod", &kind))
        }
    }

    /// High half of the unsigned product of two integers
    pub fn umulhi(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("umulhi {} {}", lhs.ty, rhs.ty);
        let (lhs, rhs) =
            self.binary_op_type_checking("umulhi", lhs, rhs, OperandCheck::ARITHMETIC)?;
        if !lhs.element().is_int() {
            return Err(CompileError::type_error(
                "umulhi",
                format!("umulhi requires integer operands, got {}", lhs.element()),
            ));
        }
        Ok(self.binary(BinaryOp::UMulHi, lhs, rhs))
    }

    // ========================================================================
    // Bitwise
    // ========================================================================

    fn bitwise(&mut self, op: &'static str, inst: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        log::debug!("{op} {} {}", lhs.ty, rhs.ty);
        let (lhs, rhs) = self.binary_op_type_checking(op, lhs, rhs, OperandCheck::NO_PROMOTION)?;
        let (a, b) = (lhs.element().clone(), rhs.element().clone());
        if !a.is_int() || !b.is_int() {
            return Err(CompileError::type_error(
                op,
                format!("bitwise operators require integer operands, got {a} and {b}"),
            ));
        }
        let kind = integer_promote(&a, &b).map_err(|e| e.with_op(op))?;
        let lhs = self.cast(lhs, &kind)?;
        let rhs = self.cast(rhs, &kind)?;
        Ok(self.binary(inst, lhs, rhs))
    }

    pub fn and(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.bitwise("and", BinaryOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.bitwise("or", BinaryOp::Or, lhs, rhs)
    }

    pub fn xor(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.bitwise("xor", BinaryOp::Xor, lhs, rhs)
    }

    pub fn shl(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.bitwise("shl", BinaryOp::Shl, lhs, rhs)
    }

    pub fn lshr(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.bitwise("lshr", BinaryOp::LShr, lhs, rhs)
    }

    // ========================================================================
    // Comparisons
    // ========================================================================

    /// Compare two operands; the result is Bool with the broadcast shape
    pub fn compare(&mut self, cmp: Comparison, lhs: Value, rhs: Value) -> Result<Value> {
        let op = cmp.op_name();
        log::debug!("{op} {} {}", lhs.ty, rhs.ty);
        let (lhs, rhs) = self.binary_op_type_checking(op, lhs, rhs, OperandCheck::ARITHMETIC)?;
        let kind = lhs.element().clone();
        let ty = lhs.ty.with_element(ScalarKind::Bool);
        let inst = if kind.is_floating() {
            InstKind::FCmp {
                pred: cmp.fcmp(),
                lhs: lhs.id,
                rhs: rhs.id,
            }
        } else if kind.is_int() {
            InstKind::ICmp {
                pred: cmp.icmp(kind.is_int_signed()),
                lhs: lhs.id,
                rhs: rhs.id,
            }
        } else {
            return Err(Self::unexpected(op, &kind));
        };
        Ok(self.emit(inst, ty))
    }

    pub fn greater_than(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Gt, lhs, rhs)
    }

    pub fn greater_equal(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Ge, lhs, rhs)
    }

    pub fn less_than(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Lt, lhs, rhs)
    }

    pub fn less_equal(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Le, lhs, rhs)
    }

    pub fn equal(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Eq, lhs, rhs)
    }

    pub fn not_equal(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.compare(Comparison::Ne, lhs, rhs)
    }

    // ========================================================================
    // Unary
    // ========================================================================

    pub fn plus(&mut self, input: Value) -> Result<Value> {
        Ok(input)
    }

    /// `0 - input` in the input's own kind
    pub fn minus(&mut self, input: Value) -> Result<Value> {
        log::debug!("minus {}", input.ty);
        if input.element().is_ptr() {
            return Err(CompileError::type_error(
                "minus",
                format!("wrong type argument to unary minus ({})", input.element()),
            ));
        }
        let zero = self.constant(Constant::Zero, input.element().clone());
        self.sub(zero, input).map_err(|e| e.with_op("minus"))
    }

    /// `input ^ all-ones`
    pub fn invert(&mut self, input: Value) -> Result<Value> {
        log::debug!("invert {}", input.ty);
        if input.element().is_ptr() || input.element().is_floating() {
            return Err(CompileError::type_error(
                "invert",
                format!("wrong type argument to unary invert ({})", input.element()),
            ));
        }
        let ones = self.constant(Constant::AllOnes, input.element().clone());
        self.xor(input, ones).map_err(|e| e.with_op("invert"))
    }
}
