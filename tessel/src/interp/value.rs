//! Runtime values for the interpreter
//!
//! A value is a block of raw bit patterns, one `u64` lane per element in
//! row-major order. Integer lanes hold the low `width` bits, fp32/fp64 lanes
//! hold IEEE bits, pointer lanes hold byte addresses.

use std::fmt;

use super::error::{InterpResult, RuntimeError};
use crate::types::{BlockType, ScalarKind};

/// Bits in one lane of `kind`
pub fn lane_bits(kind: &ScalarKind) -> u32 {
    kind.int_bitwidth().unwrap_or_else(|| kind.primitive_bitwidth())
}

/// Mask selecting the low `bits` bits
pub fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Sign-extend the low `bits` bits
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

/// Integer lane as i64, honoring the kind's signedness; Bool reads as 0 or 1
pub fn int_value(bits: u64, kind: &ScalarKind) -> i64 {
    let width = lane_bits(kind);
    if kind.is_int_unsigned() || kind.is_bool() || kind.is_ptr() {
        (bits & mask(width)) as i64
    } else {
        sign_extend(bits, width)
    }
}

/// Read a float lane
pub fn to_f64(bits: u64, kind: &ScalarKind) -> InterpResult<f64> {
    match kind {
        ScalarKind::F32 => Ok(f64::from(f32::from_bits(bits as u32))),
        ScalarKind::F64 => Ok(f64::from_bits(bits)),
        ScalarKind::F16 | ScalarKind::BF16 => Err(RuntimeError::unsupported(&format!("{kind} arithmetic"))),
        other => Err(RuntimeError::type_error("floating-point kind", &other.to_string())),
    }
}

/// Round a float into a lane of `kind`
pub fn from_f64(value: f64, kind: &ScalarKind) -> InterpResult<u64> {
    match kind {
        ScalarKind::F32 => Ok(u64::from((value as f32).to_bits())),
        ScalarKind::F64 => Ok(value.to_bits()),
        ScalarKind::F16 | ScalarKind::BF16 => Err(RuntimeError::unsupported(&format!("{kind} arithmetic"))),
        other => Err(RuntimeError::type_error("floating-point kind", &other.to_string())),
    }
}

/// A typed block of lanes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeValue {
    pub ty: BlockType,
    pub lanes: Vec<u64>,
}

impl RuntimeValue {
    pub fn new(ty: BlockType, lanes: Vec<u64>) -> InterpResult<Self> {
        if lanes.len() != ty.numel() {
            return Err(RuntimeError::type_error(
                &format!("{} lane(s) for {ty}", ty.numel()),
                &format!("{} lane(s)", lanes.len()),
            ));
        }
        let width = mask(lane_bits(&ty.element));
        let lanes = lanes.into_iter().map(|l| l & width).collect();
        Ok(Self { ty, lanes })
    }

    /// Every lane set to `bits`
    pub fn splat(ty: BlockType, bits: u64) -> Self {
        let lanes = vec![bits & mask(lane_bits(&ty.element)); ty.numel()];
        Self { ty, lanes }
    }

    fn from_lanes(element: ScalarKind, shape: &[usize], lanes: Vec<u64>) -> InterpResult<Self> {
        Self::new(BlockType::new(element, shape.to_vec()), lanes)
    }

    pub fn from_f32s(shape: &[usize], values: &[f32]) -> InterpResult<Self> {
        let lanes = values.iter().map(|v| u64::from(v.to_bits())).collect();
        Self::from_lanes(ScalarKind::F32, shape, lanes)
    }

    pub fn from_f64s(shape: &[usize], values: &[f64]) -> InterpResult<Self> {
        let lanes = values.iter().map(|v| v.to_bits()).collect();
        Self::from_lanes(ScalarKind::F64, shape, lanes)
    }

    /// Integer lanes of any integer kind, truncated to its width
    pub fn from_ints(element: ScalarKind, shape: &[usize], values: &[i64]) -> InterpResult<Self> {
        if !element.is_int() {
            return Err(RuntimeError::type_error("integer kind", &element.to_string()));
        }
        let lanes = values.iter().map(|&v| v as u64).collect();
        Self::from_lanes(element, shape, lanes)
    }

    pub fn from_bools(shape: &[usize], values: &[bool]) -> InterpResult<Self> {
        let lanes = values.iter().map(|&b| u64::from(b)).collect();
        Self::from_lanes(ScalarKind::Bool, shape, lanes)
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self::splat(BlockType::scalar(ScalarKind::F32), u64::from(value.to_bits()))
    }

    pub fn scalar_int(element: ScalarKind, value: i64) -> Self {
        Self::splat(BlockType::scalar(element), value as u64)
    }

    /// Pointers to `pointee` at the given addresses
    pub fn pointers(pointee: ScalarKind, shape: &[usize], addrs: &[u64]) -> InterpResult<Self> {
        Self::from_lanes(ScalarKind::ptr(pointee), shape, addrs.to_vec())
    }

    pub fn element(&self) -> &ScalarKind {
        &self.ty.element
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn to_f64s(&self) -> InterpResult<Vec<f64>> {
        self.lanes.iter().map(|&l| to_f64(l, self.element())).collect()
    }

    pub fn to_f32s(&self) -> InterpResult<Vec<f32>> {
        if !self.element().is_fp32() {
            return Err(RuntimeError::type_error("fp32", &self.ty.to_string()));
        }
        Ok(self.lanes.iter().map(|&l| f32::from_bits(l as u32)).collect())
    }

    /// Integer lanes, sign- or zero-extended by the element kind
    pub fn to_i64s(&self) -> InterpResult<Vec<i64>> {
        if !self.element().is_int() && !self.element().is_ptr() {
            return Err(RuntimeError::type_error("integer", &self.ty.to_string()));
        }
        Ok(self.lanes.iter().map(|&l| int_value(l, self.element())).collect())
    }

    pub fn to_bools(&self) -> InterpResult<Vec<bool>> {
        if !self.element().is_bool() {
            return Err(RuntimeError::type_error("int1", &self.ty.to_string()));
        }
        Ok(self.lanes.iter().map(|&l| l != 0).collect())
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.element();
        let lanes: Vec<String> = self
            .lanes
            .iter()
            .map(|&l| match kind {
                k if k.is_floating() => to_f64(l, k).map_or_else(|_| format!("{l:#x}"), |v| v.to_string()),
                k if k.is_ptr() => format!("{l:#x}"),
                k => int_value(l, k).to_string(),
            })
            .collect();
        if self.ty.is_block() {
            write!(f, "{} [{}]", self.ty, lanes.join(", "))
        } else {
            write!(f, "{} {}", self.ty, lanes.join(""))
        }
    }
}
