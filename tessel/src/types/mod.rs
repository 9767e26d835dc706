//! Type model
//!
//! Kernel values are blocks of scalars. A scalar value is a block of rank 0,
//! so every operator works on [`BlockType`] and looks at the element kind for
//! its typing rules.

pub mod promote;
pub mod shape;

pub use promote::{computation_type, integer_promote};
pub use shape::{numel, shape_compatible};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default address space for pointers (global memory)
pub const GLOBAL_ADDRESS_SPACE: u32 = 1;

/// Integer bit-widths the kernel language supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(IntWidth::W8),
            16 => Some(IntWidth::W16),
            32 => Some(IntWidth::W32),
            64 => Some(IntWidth::W64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Scalar element kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ScalarKind {
    /// Boolean. Behaves as a signed 1-bit integer in the conversion rules
    /// and occupies one byte in memory.
    Bool,
    Int { width: IntWidth, signed: bool },
    F16,
    BF16,
    F32,
    F64,
    Ptr { pointee: Box<ScalarKind>, address_space: u32 },
}

impl ScalarKind {
    pub const I8: ScalarKind = ScalarKind::Int { width: IntWidth::W8, signed: true };
    pub const I16: ScalarKind = ScalarKind::Int { width: IntWidth::W16, signed: true };
    pub const I32: ScalarKind = ScalarKind::Int { width: IntWidth::W32, signed: true };
    pub const I64: ScalarKind = ScalarKind::Int { width: IntWidth::W64, signed: true };
    pub const U8: ScalarKind = ScalarKind::Int { width: IntWidth::W8, signed: false };
    pub const U16: ScalarKind = ScalarKind::Int { width: IntWidth::W16, signed: false };
    pub const U32: ScalarKind = ScalarKind::Int { width: IntWidth::W32, signed: false };
    pub const U64: ScalarKind = ScalarKind::Int { width: IntWidth::W64, signed: false };

    pub fn int(width: IntWidth, signed: bool) -> Self {
        ScalarKind::Int { width, signed }
    }

    /// Pointer in the global address space
    pub fn ptr(pointee: ScalarKind) -> Self {
        Self::ptr_in(pointee, GLOBAL_ADDRESS_SPACE)
    }

    pub fn ptr_in(pointee: ScalarKind, address_space: u32) -> Self {
        ScalarKind::Ptr {
            pointee: Box::new(pointee),
            address_space,
        }
    }

    /// Bool or a fixed-width integer
    pub fn is_int(&self) -> bool {
        matches!(self, ScalarKind::Bool | ScalarKind::Int { .. })
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, ScalarKind::Bool)
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            ScalarKind::F16 | ScalarKind::BF16 | ScalarKind::F32 | ScalarKind::F64
        )
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, ScalarKind::Ptr { .. })
    }

    pub fn is_fp16(&self) -> bool {
        matches!(self, ScalarKind::F16)
    }

    pub fn is_bf16(&self) -> bool {
        matches!(self, ScalarKind::BF16)
    }

    pub fn is_fp32(&self) -> bool {
        matches!(self, ScalarKind::F32)
    }

    pub fn is_fp64(&self) -> bool {
        matches!(self, ScalarKind::F64)
    }

    /// Bit-width of an integer kind; Bool is 1 bit wide
    pub fn int_bitwidth(&self) -> Option<u32> {
        match self {
            ScalarKind::Bool => Some(1),
            ScalarKind::Int { width, .. } => Some(width.bits()),
            _ => None,
        }
    }

    pub fn int_signedness(&self) -> Option<Signedness> {
        match self {
            ScalarKind::Bool => Some(Signedness::Signed),
            ScalarKind::Int { signed: true, .. } => Some(Signedness::Signed),
            ScalarKind::Int { signed: false, .. } => Some(Signedness::Unsigned),
            _ => None,
        }
    }

    pub fn is_int_signed(&self) -> bool {
        self.int_signedness() == Some(Signedness::Signed)
    }

    pub fn is_int_unsigned(&self) -> bool {
        self.int_signedness() == Some(Signedness::Unsigned)
    }

    /// Mantissa width, used only to rank float precision
    pub fn fp_mantissa_width(&self) -> Option<u32> {
        match self {
            ScalarKind::F16 => Some(10),
            ScalarKind::BF16 => Some(7),
            ScalarKind::F32 => Some(23),
            ScalarKind::F64 => Some(52),
            _ => None,
        }
    }

    /// Raw width of the value representation
    pub fn primitive_bitwidth(&self) -> u32 {
        match self {
            ScalarKind::Bool => 1,
            ScalarKind::Int { width, .. } => width.bits(),
            ScalarKind::F16 | ScalarKind::BF16 => 16,
            ScalarKind::F32 => 32,
            ScalarKind::F64 => 64,
            ScalarKind::Ptr { .. } => 64,
        }
    }

    /// Bytes one element occupies in memory
    pub fn storage_bytes(&self) -> usize {
        match self {
            ScalarKind::Bool => 1,
            other => (other.primitive_bitwidth() / 8) as usize,
        }
    }

    pub fn pointee(&self) -> Option<&ScalarKind> {
        match self {
            ScalarKind::Ptr { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn address_space(&self) -> Option<u32> {
        match self {
            ScalarKind::Ptr { address_space, .. } => Some(*address_space),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Bool => write!(f, "int1"),
            ScalarKind::Int { width, signed: true } => write!(f, "int{}", width.bits()),
            ScalarKind::Int { width, signed: false } => write!(f, "uint{}", width.bits()),
            ScalarKind::F16 => write!(f, "fp16"),
            ScalarKind::BF16 => write!(f, "bf16"),
            ScalarKind::F32 => write!(f, "fp32"),
            ScalarKind::F64 => write!(f, "fp64"),
            ScalarKind::Ptr { pointee, address_space } => {
                // a pointee pointer with its own address space needs grouping
                let grouped = pointee
                    .address_space()
                    .is_some_and(|space| space != GLOBAL_ADDRESS_SPACE);
                if grouped {
                    write!(f, "*({pointee})")?;
                } else {
                    write!(f, "*{pointee}")?;
                }
                if *address_space != GLOBAL_ADDRESS_SPACE {
                    write!(f, "@{address_space}")?;
                }
                Ok(())
            }
        }
    }
}

/// Error parsing the textual form of a type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type `{input}`: {reason}")]
pub struct TypeParseError {
    pub input: String,
    pub reason: String,
}

impl TypeParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl FromStr for ScalarKind {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('*') {
            // an `@N` inside a parenthesized pointee belongs to the pointee
            let (inner, address_space) = match rest.rfind('@') {
                Some(at) if !rest[at..].contains(')') => {
                    let space = rest[at + 1..]
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| TypeParseError::new(s, "address space must be an integer"))?;
                    (&rest[..at], space)
                }
                _ => (rest, GLOBAL_ADDRESS_SPACE),
            };
            let inner = inner.trim();
            let inner = inner
                .strip_prefix('(')
                .and_then(|i| i.strip_suffix(')'))
                .unwrap_or(inner);
            let pointee = inner.parse::<ScalarKind>()?;
            return Ok(ScalarKind::ptr_in(pointee, address_space));
        }

        let kind = match s {
            "int1" | "i1" | "bool" => ScalarKind::Bool,
            "int8" | "i8" => ScalarKind::I8,
            "int16" | "i16" => ScalarKind::I16,
            "int32" | "i32" => ScalarKind::I32,
            "int64" | "i64" => ScalarKind::I64,
            "uint8" | "u8" => ScalarKind::U8,
            "uint16" | "u16" => ScalarKind::U16,
            "uint32" | "u32" => ScalarKind::U32,
            "uint64" | "u64" => ScalarKind::U64,
            "fp16" | "f16" => ScalarKind::F16,
            "bf16" => ScalarKind::BF16,
            "fp32" | "f32" => ScalarKind::F32,
            "fp64" | "f64" => ScalarKind::F64,
            _ => return Err(TypeParseError::new(s, "unknown scalar kind")),
        };
        Ok(kind)
    }
}

impl From<ScalarKind> for String {
    fn from(kind: ScalarKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for ScalarKind {
    type Error = TypeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Element kind plus shape; rank 0 is a plain scalar
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlockType {
    pub element: ScalarKind,
    pub shape: Vec<usize>,
}

impl BlockType {
    pub fn new(element: ScalarKind, shape: Vec<usize>) -> Self {
        Self { element, shape }
    }

    /// Rank-0 type
    pub fn scalar(element: ScalarKind) -> Self {
        Self {
            element,
            shape: Vec::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_block(&self) -> bool {
        !self.shape.is_empty()
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Same shape, different element kind
    pub fn with_element(&self, element: ScalarKind) -> Self {
        Self {
            element,
            shape: self.shape.clone(),
        }
    }

    /// Same element kind, different shape
    pub fn with_shape(&self, shape: Vec<usize>) -> Self {
        Self {
            element: self.element.clone(),
            shape,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element)?;
        if self.is_block() {
            let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
            write!(f, "[{}]", dims.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for BlockType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(body) = s.strip_suffix(']') else {
            return Ok(BlockType::scalar(s.parse()?));
        };
        let (element, dims) = body
            .rsplit_once('[')
            .ok_or_else(|| TypeParseError::new(s, "unbalanced `]`"))?;
        let mut shape = Vec::new();
        for dim in dims.split(',') {
            let size = dim
                .trim()
                .parse::<usize>()
                .map_err(|_| TypeParseError::new(s, format!("bad dimension `{}`", dim.trim())))?;
            if size == 0 {
                return Err(TypeParseError::new(s, "dimensions must be at least 1"));
            }
            shape.push(size);
        }
        Ok(BlockType::new(element.parse()?, shape))
    }
}

impl From<BlockType> for String {
    fn from(ty: BlockType) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for BlockType {
    type Error = TypeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_is_one_bit_signed_integer() {
        let b = ScalarKind::Bool;
        assert!(b.is_int());
        assert!(b.is_bool());
        assert_eq!(b.int_bitwidth(), Some(1));
        assert!(b.is_int_signed());
        assert_eq!(b.primitive_bitwidth(), 1);
        assert_eq!(b.storage_bytes(), 1);
    }

    #[test]
    fn test_mantissa_ranks_bf16_below_fp16() {
        let rank = |k: ScalarKind| k.fp_mantissa_width().unwrap();
        assert!(rank(ScalarKind::BF16) < rank(ScalarKind::F16));
        assert!(rank(ScalarKind::F16) < rank(ScalarKind::F32));
        assert!(rank(ScalarKind::F32) < rank(ScalarKind::F64));
        assert_eq!(ScalarKind::I32.fp_mantissa_width(), None);
    }

    #[test]
    fn test_pointer_accessors() {
        let p = ScalarKind::ptr_in(ScalarKind::F32, 3);
        assert!(p.is_ptr());
        assert!(!p.is_int());
        assert_eq!(p.pointee(), Some(&ScalarKind::F32));
        assert_eq!(p.address_space(), Some(3));
        assert_eq!(p.primitive_bitwidth(), 64);
        assert_eq!(p.storage_bytes(), 8);
    }

    #[test]
    fn test_display_kinds() {
        assert_eq!(ScalarKind::Bool.to_string(), "int1");
        assert_eq!(ScalarKind::U16.to_string(), "uint16");
        assert_eq!(ScalarKind::ptr(ScalarKind::F32).to_string(), "*fp32");
        assert_eq!(ScalarKind::ptr_in(ScalarKind::I8, 3).to_string(), "*int8@3");
        let nested = ScalarKind::ptr(ScalarKind::ptr_in(ScalarKind::F16, 3));
        assert_eq!(nested.to_string(), "*(*fp16@3)");
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!("bool".parse::<ScalarKind>().unwrap(), ScalarKind::Bool);
        assert_eq!("u8".parse::<ScalarKind>().unwrap(), ScalarKind::U8);
        assert_eq!(
            "**fp32".parse::<ScalarKind>().unwrap(),
            ScalarKind::ptr(ScalarKind::ptr(ScalarKind::F32))
        );
        let nested = ScalarKind::ptr(ScalarKind::ptr_in(ScalarKind::F16, 3));
        assert_eq!(nested.to_string().parse::<ScalarKind>().unwrap(), nested);
        assert!("int7".parse::<ScalarKind>().is_err());
    }

    #[test]
    fn test_block_type_text_form() {
        let ty: BlockType = "*int8@3[16,4]".parse().unwrap();
        assert_eq!(ty.element, ScalarKind::ptr_in(ScalarKind::I8, 3));
        assert_eq!(ty.shape, vec![16, 4]);
        assert_eq!(ty.numel(), 64);
        assert_eq!(ty.to_string(), "*int8@3[16,4]");

        let scalar: BlockType = "fp32".parse().unwrap();
        assert!(!scalar.is_block());
        assert_eq!(scalar.numel(), 1);
    }

    #[test]
    fn test_block_type_rejects_zero_dimension() {
        assert!("fp32[0]".parse::<BlockType>().is_err());
        assert!("fp32[4,x]".parse::<BlockType>().is_err());
    }

    #[test]
    fn test_block_equality_is_structural() {
        let a = BlockType::new(ScalarKind::F32, vec![4, 8]);
        assert_eq!(a, BlockType::new(ScalarKind::F32, vec![4, 8]));
        assert_ne!(a, BlockType::new(ScalarKind::F32, vec![8, 4]));
        assert_ne!(a, a.with_element(ScalarKind::F16));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let ty = BlockType::new(ScalarKind::U8, vec![2]);
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, "\"uint8[2]\"");
        let back: BlockType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
