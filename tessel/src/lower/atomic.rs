//! Atomic read-modify-write lowering
//!
//! Float max/min has no native RMW. IEEE floats of the same sign order like
//! their bit patterns read as integers: ascending for non-negative values as
//! signed integers, descending for negative values as unsigned integers. So
//! `max` becomes a signed `max` on lanes where the value is `>= 0` and an
//! unsigned `umin` on lanes where it is `< 0` (and `min` the mirror image),
//! with the two results merged by a select. The two lane sets are disjoint,
//! and a NaN value falls in neither so its lane is left untouched.

use super::Lowerer;
use super::memory::check_mask;
use crate::error::{CompileError, Result};
use crate::ir::{AtomicOp, Constant, InstKind, Value};
use crate::types::{BlockType, IntWidth, ScalarKind};

/// Which extreme an atomic max/min keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Max,
    Min,
}

impl Lowerer<'_> {
    /// Shared operand checks: returns the pointer, the value cast to the
    /// pointee kind, and a Bool mask of the pointer's shape.
    fn atomic_operands(
        &mut self,
        op: &'static str,
        ptr: Value,
        value: Value,
        mask: Option<Value>,
    ) -> Result<(Value, Value, Value)> {
        let Some(pointee) = ptr.element().pointee().cloned() else {
            return Err(CompileError::type_error(
                op,
                format!("pointer argument of {op} is {}", ptr.ty),
            ));
        };
        if pointee.is_bool() {
            return Err(CompileError::type_error(
                op,
                format!("{op} does not support {pointee} pointees"),
            ));
        }
        if let Some(mask) = &mask {
            check_mask(op, mask)?;
        }
        let shape = ptr.shape().to_vec();
        let value = self.broadcast_to_shape(value, &shape).map_err(|e| e.with_op(op))?;
        let value = self.cast(value, &pointee).map_err(|e| e.with_op(op))?;
        let mask = match mask {
            Some(mask) => self.broadcast_to_shape(mask, &shape).map_err(|e| e.with_op(op))?,
            None => self.splat_constant(Constant::Bool(true), &BlockType::new(ScalarKind::Bool, shape)),
        };
        Ok((ptr, value, mask))
    }

    fn atomic_rmw(&mut self, op: AtomicOp, ptr: &Value, value: &Value, mask: &Value) -> Value {
        let ty = value.ty.clone();
        self.emit(
            InstKind::AtomicRmw {
                op,
                ptr: ptr.id,
                value: value.id,
                mask: mask.id,
            },
            ty,
        )
    }

    /// Atomic `*ptr += value`; returns the old contents
    pub fn atomic_add(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        log::debug!("atomic_add {} {}", ptr.ty, value.ty);
        let (ptr, value, mask) = self.atomic_operands("atomic_add", ptr, value, mask)?;
        let op = if value.element().is_floating() {
            AtomicOp::FAdd
        } else {
            AtomicOp::Add
        };
        Ok(self.atomic_rmw(op, &ptr, &value, &mask))
    }

    fn atomic_bitwise(
        &mut self,
        name: &'static str,
        op: AtomicOp,
        ptr: Value,
        value: Value,
        mask: Option<Value>,
    ) -> Result<Value> {
        log::debug!("{name} {} {}", ptr.ty, value.ty);
        let (ptr, value, mask) = self.atomic_operands(name, ptr, value, mask)?;
        if !value.element().is_int() {
            return Err(CompileError::type_error(
                name,
                format!("{name} requires an integer pointee, got {}", value.element()),
            ));
        }
        Ok(self.atomic_rmw(op, &ptr, &value, &mask))
    }

    pub fn atomic_and(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        self.atomic_bitwise("atomic_and", AtomicOp::And, ptr, value, mask)
    }

    pub fn atomic_or(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        self.atomic_bitwise("atomic_or", AtomicOp::Or, ptr, value, mask)
    }

    pub fn atomic_xor(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        self.atomic_bitwise("atomic_xor", AtomicOp::Xor, ptr, value, mask)
    }

    pub fn atomic_xchg(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        log::debug!("atomic_xchg {} {}", ptr.ty, value.ty);
        let (ptr, value, mask) = self.atomic_operands("atomic_xchg", ptr, value, mask)?;
        Ok(self.atomic_rmw(AtomicOp::Xchg, &ptr, &value, &mask))
    }

    /// Store `value` where `*ptr == cmp`; returns the old contents
    pub fn atomic_cas(&mut self, ptr: Value, cmp: Value, value: Value) -> Result<Value> {
        const OP: &str = "atomic_cas";
        log::debug!("{OP} {} {} {}", ptr.ty, cmp.ty, value.ty);
        let (ptr, value, _) = self.atomic_operands(OP, ptr, value, None)?;
        let pointee = value.element().clone();
        if !matches!(pointee.primitive_bitwidth(), 16 | 32 | 64) {
            return Err(CompileError::type_error(
                OP,
                format!("{OP} only supports elements of width 16, 32 or 64, got {pointee}"),
            ));
        }
        let shape = ptr.shape().to_vec();
        let cmp = self.broadcast_to_shape(cmp, &shape).map_err(|e| e.with_op(OP))?;
        let cmp = self.cast(cmp, &pointee).map_err(|e| e.with_op(OP))?;
        let ty = value.ty.clone();
        Ok(self.emit(
            InstKind::AtomicCas {
                ptr: ptr.id,
                cmp: cmp.id,
                value: value.id,
            },
            ty,
        ))
    }

    pub fn atomic_max(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        self.atomic_extreme("atomic_max", Extreme::Max, ptr, value, mask)
    }

    pub fn atomic_min(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<Value> {
        self.atomic_extreme("atomic_min", Extreme::Min, ptr, value, mask)
    }

    fn atomic_extreme(
        &mut self,
        name: &'static str,
        extreme: Extreme,
        ptr: Value,
        value: Value,
        mask: Option<Value>,
    ) -> Result<Value> {
        log::debug!("{name} {} {}", ptr.ty, value.ty);
        let (ptr, value, mask) = self.atomic_operands(name, ptr, value, mask)?;
        let kind = value.element().clone();

        if kind.is_int() {
            let op = match (extreme, kind.is_int_signed()) {
                (Extreme::Max, true) => AtomicOp::Max,
                (Extreme::Max, false) => AtomicOp::UMax,
                (Extreme::Min, true) => AtomicOp::Min,
                (Extreme::Min, false) => AtomicOp::UMin,
            };
            return Ok(self.atomic_rmw(op, &ptr, &value, &mask));
        }

        let width = match kind {
            ScalarKind::F32 => IntWidth::W32,
            ScalarKind::F64 => IntWidth::W64,
            _ => {
                return Err(CompileError::type_error(
                    name,
                    format!("{name} does not support {kind} pointees"),
                ));
            }
        };
        let int_kind = ScalarKind::int(width, true);
        let space = ptr.element().address_space().unwrap_or(crate::types::GLOBAL_ADDRESS_SPACE);

        let i_val = self.bitcast(value.clone(), &int_kind)?;
        let i_ptr = self.bitcast(ptr, &ScalarKind::ptr_in(int_kind, space))?;
        let zero = self.constant(Constant::Float(0.0), kind.clone());
        let pos = self.greater_equal(value.clone(), zero.clone()).map_err(|e| e.with_op(name))?;
        let neg = self.less_than(value, zero).map_err(|e| e.with_op(name))?;
        let pos_mask = self.and(mask.clone(), pos.clone()).map_err(|e| e.with_op(name))?;
        let neg_mask = self.and(mask, neg).map_err(|e| e.with_op(name))?;

        let (pos_op, neg_op) = match extreme {
            Extreme::Max => (AtomicOp::Max, AtomicOp::UMin),
            Extreme::Min => (AtomicOp::Min, AtomicOp::UMax),
        };
        let pos_ret = self.atomic_rmw(pos_op, &i_ptr, &i_val, &pos_mask);
        let neg_ret = self.atomic_rmw(neg_op, &i_ptr, &i_val, &neg_mask);
        let merged = self.emit(
            InstKind::Select {
                cond: pos.id,
                on_true: pos_ret.id,
                on_false: neg_ret.id,
            },
            pos_ret.ty.clone(),
        );
        self.bitcast(merged, &kind)
    }
}
