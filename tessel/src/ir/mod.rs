//! Kernel IR
//!
//! The instruction stream the lowering layer appends to. It is a flat,
//! single-block SSA listing: every value-producing instruction gets a fresh
//! [`ValueId`] and a static [`BlockType`]. The backend that consumes it owns
//! everything past this point (layout, scheduling, codegen).
//!
//! Compiler hints (`multiple_of`, `max_contiguous`) are kept in a side-table
//! keyed by value id instead of being attached to the instruction.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{CompileError, Result};
use crate::types::BlockType;

/// Handle of an SSA value, unique within one builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An IR value together with its static type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Value {
    pub id: ValueId,
    pub ty: BlockType,
}

impl Value {
    pub fn element(&self) -> &crate::types::ScalarKind {
        &self.ty.element
    }

    pub fn shape(&self) -> &[usize] {
        &self.ty.shape
    }
}

/// Constant payload; the instruction's type says how to read it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Null value of the type (0, 0.0, false, null pointer)
    Zero,
    /// Every bit set
    AllOnes,
    /// Unspecified contents
    Undef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    /// High half of the unsigned double-width product
    UMulHi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ICmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Float predicates; `o` = ordered (false on NaN), `u` = unordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FCmpPred {
    Oeq,
    Une,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CastOp {
    FpTrunc,
    FpExt,
    /// Width/signedness change; extends with the sign bit when `sign_extend`
    IntCast { sign_extend: bool },
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    PtrToInt,
    IntToPtr,
    /// Same bits, new type
    Bitcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheModifier {
    #[default]
    None,
    /// `.ca`: cache at all levels
    Ca,
    /// `.cg`: cache in L2, bypass L1
    Cg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    Normal,
    EvictLast,
    EvictFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicOp {
    Add,
    FAdd,
    And,
    Or,
    Xor,
    Xchg,
    Max,
    Min,
    UMax,
    UMin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    Add,
    FAdd,
    Min,
    Max,
    UMin,
    UMax,
    FMin,
    FMax,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MathFn {
    Exp,
    Log,
    Cos,
    Sin,
    Sqrt,
}

/// Compiler hints attached to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metadata {
    /// Every element is a multiple of N
    MultipleOf(u32),
    /// Elements form contiguous runs of at least N
    MaxContiguous(u32),
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "inst", rename_all = "snake_case")]
pub enum InstKind {
    /// Kernel argument supplied by the caller
    Argument { name: String },
    Const { value: Constant },
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
    FDiv { lhs: ValueId, rhs: ValueId, ieee_rounding: bool },
    ICmp { pred: ICmpPred, lhs: ValueId, rhs: ValueId },
    FCmp { pred: FCmpPred, lhs: ValueId, rhs: ValueId },
    Cast { op: CastOp, src: ValueId },
    /// `ptr + offset`, scaled by the pointee size
    AddPtr { ptr: ValueId, offset: ValueId },
    Splat { src: ValueId },
    Broadcast { src: ValueId },
    Reshape { src: ValueId },
    /// Concatenation along axis 0
    Cat { lhs: ValueId, rhs: ValueId },
    Select { cond: ValueId, on_true: ValueId, on_false: ValueId },
    Load {
        ptr: ValueId,
        cache: CacheModifier,
        eviction: EvictionPolicy,
        volatile: bool,
    },
    MaskedLoad {
        ptr: ValueId,
        mask: ValueId,
        other: ValueId,
        cache: CacheModifier,
        eviction: EvictionPolicy,
        volatile: bool,
    },
    Store { ptr: ValueId, value: ValueId },
    MaskedStore { ptr: ValueId, value: ValueId, mask: ValueId },
    AtomicRmw { op: AtomicOp, ptr: ValueId, value: ValueId, mask: ValueId },
    AtomicCas { ptr: ValueId, cmp: ValueId, value: ValueId },
    Reduce { op: ReduceOp, input: ValueId, axis: usize },
    Dot { lhs: ValueId, rhs: ValueId, acc: ValueId, allow_tf32: bool },
    Math { func: MathFn, src: ValueId },
    ProgramId { axis: u32 },
    NumPrograms { axis: u32 },
    MakeRange { start: i32, end: i32 },
    Barrier,
}

/// One emitted instruction; `result` is empty for stores and barriers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub result: Option<Value>,
    pub kind: InstKind,
}

/// Append-only instruction stream for one kernel
#[derive(Debug, Clone, Default, Serialize)]
pub struct IrBuilder {
    name: String,
    instructions: Vec<Instruction>,
    /// Types of issued values, indexed by id
    types: Vec<BlockType>,
    metadata: BTreeMap<ValueId, Vec<Metadata>>,
}

impl IrBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a kernel argument
    pub fn argument(&mut self, name: impl Into<String>, ty: BlockType) -> Value {
        self.emit(InstKind::Argument { name: name.into() }, ty)
    }

    /// Append a value-producing instruction
    pub fn emit(&mut self, kind: InstKind, ty: BlockType) -> Value {
        let id = ValueId(self.types.len() as u32);
        self.types.push(ty.clone());
        let value = Value { id, ty };
        self.instructions.push(Instruction {
            result: Some(value.clone()),
            kind,
        });
        value
    }

    /// Append an instruction without a result
    pub fn emit_void(&mut self, kind: InstKind) {
        self.instructions.push(Instruction { result: None, kind });
    }

    pub fn constant(&mut self, value: Constant, ty: BlockType) -> Value {
        self.emit(InstKind::Const { value }, ty)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn contains(&self, id: ValueId) -> bool {
        (id.0 as usize) < self.types.len()
    }

    pub fn value_type(&self, id: ValueId) -> Option<&BlockType> {
        self.types.get(id.0 as usize)
    }

    /// Record a hint for a value issued by this builder
    pub fn set_metadata(&mut self, id: ValueId, md: Metadata) -> Result<()> {
        if !self.contains(id) {
            return Err(CompileError::internal(
                "set_metadata",
                format!("value {id} was not issued by kernel `{}`", self.name),
            ));
        }
        let entries = self.metadata.entry(id).or_default();
        // a newer hint of the same kind replaces the older one
        entries.retain(|m| std::mem::discriminant(m) != std::mem::discriminant(&md));
        entries.push(md);
        Ok(())
    }

    pub fn metadata(&self, id: ValueId) -> &[Metadata] {
        self.metadata.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of instructions matching a predicate
    pub fn count(&self, pred: impl Fn(&InstKind) -> bool) -> usize {
        self.instructions.iter().filter(|i| pred(&i.kind)).count()
    }
}

// ============================================================================
// IR Text Formatting
// ============================================================================

/// Format a kernel to text
pub fn format_ir(builder: &IrBuilder) -> String {
    let mut out = format!("kernel @{} {{\n", builder.name);
    for inst in &builder.instructions {
        out.push_str("  ");
        out.push_str(&format_instruction(inst));
        if let Some(result) = &inst.result {
            for md in builder.metadata(result.id) {
                out.push_str(&format!(" !{}", format_metadata(md)));
            }
        }
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// Format a single instruction
pub fn format_instruction(inst: &Instruction) -> String {
    let body = format_kind(&inst.kind);
    match &inst.result {
        Some(result) => format!("{} = {} : {}", result.id, body, result.ty),
        None => body,
    }
}

fn format_kind(kind: &InstKind) -> String {
    match kind {
        InstKind::Argument { name } => format!("arg {name}"),
        InstKind::Const { value } => format!("const {}", format_constant(value)),
        InstKind::Binary { op, lhs, rhs } => format!("{} {lhs}, {rhs}", binary_mnemonic(*op)),
        InstKind::FDiv { lhs, rhs, ieee_rounding } => {
            if *ieee_rounding {
                format!("fdiv.ieee {lhs}, {rhs}")
            } else {
                format!("fdiv {lhs}, {rhs}")
            }
        }
        InstKind::ICmp { pred, lhs, rhs } => format!("icmp {} {lhs}, {rhs}", icmp_mnemonic(*pred)),
        InstKind::FCmp { pred, lhs, rhs } => format!("fcmp {} {lhs}, {rhs}", fcmp_mnemonic(*pred)),
        InstKind::Cast { op, src } => format!("{} {src}", cast_mnemonic(*op)),
        InstKind::AddPtr { ptr, offset } => format!("addptr {ptr}, {offset}"),
        InstKind::Splat { src } => format!("splat {src}"),
        InstKind::Broadcast { src } => format!("broadcast {src}"),
        InstKind::Reshape { src } => format!("reshape {src}"),
        InstKind::Cat { lhs, rhs } => format!("cat {lhs}, {rhs}"),
        InstKind::Select { cond, on_true, on_false } => {
            format!("select {cond}, {on_true}, {on_false}")
        }
        InstKind::Load { ptr, cache, eviction, volatile } => {
            format!("load {ptr}{}", format_hints(*cache, *eviction, *volatile))
        }
        InstKind::MaskedLoad { ptr, mask, other, cache, eviction, volatile } => format!(
            "masked-load {ptr}, {mask}, {other}{}",
            format_hints(*cache, *eviction, *volatile)
        ),
        InstKind::Store { ptr, value } => format!("store {ptr}, {value}"),
        InstKind::MaskedStore { ptr, value, mask } => format!("masked-store {ptr}, {value}, {mask}"),
        InstKind::AtomicRmw { op, ptr, value, mask } => {
            format!("atomic-rmw {} {ptr}, {value}, {mask}", atomic_mnemonic(*op))
        }
        InstKind::AtomicCas { ptr, cmp, value } => format!("atomic-cas {ptr}, {cmp}, {value}"),
        InstKind::Reduce { op, input, axis } => {
            format!("reduce {} {input}, axis={axis}", reduce_mnemonic(*op))
        }
        InstKind::Dot { lhs, rhs, acc, allow_tf32 } => {
            let tf32 = if *allow_tf32 { " tf32" } else { "" };
            format!("dot {lhs}, {rhs}, {acc}{tf32}")
        }
        InstKind::Math { func, src } => format!("{} {src}", math_mnemonic(*func)),
        InstKind::ProgramId { axis } => format!("program-id {axis}"),
        InstKind::NumPrograms { axis } => format!("num-programs {axis}"),
        InstKind::MakeRange { start, end } => format!("make-range {start}, {end}"),
        InstKind::Barrier => "barrier".to_string(),
    }
}

fn format_constant(value: &Constant) -> String {
    match value {
        Constant::Int(n) => n.to_string(),
        Constant::Float(x) => format!("{x:?}"),
        Constant::Bool(b) => b.to_string(),
        Constant::Zero => "zero".to_string(),
        Constant::AllOnes => "all-ones".to_string(),
        Constant::Undef => "undef".to_string(),
    }
}

fn format_hints(cache: CacheModifier, eviction: EvictionPolicy, volatile: bool) -> String {
    let mut out = String::new();
    match cache {
        CacheModifier::None => {}
        CacheModifier::Ca => out.push_str(" cache=.ca"),
        CacheModifier::Cg => out.push_str(" cache=.cg"),
    }
    match eviction {
        EvictionPolicy::Normal => {}
        EvictionPolicy::EvictLast => out.push_str(" evict=last"),
        EvictionPolicy::EvictFirst => out.push_str(" evict=first"),
    }
    if volatile {
        out.push_str(" volatile");
    }
    out
}

fn format_metadata(md: &Metadata) -> String {
    match md {
        Metadata::MultipleOf(n) => format!("multiple_of({n})"),
        Metadata::MaxContiguous(n) => format!("max_contiguous({n})"),
    }
}

fn binary_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::SDiv => "sdiv",
        BinaryOp::UDiv => "udiv",
        BinaryOp::SRem => "srem",
        BinaryOp::URem => "urem",
        BinaryOp::FAdd => "fadd",
        BinaryOp::FSub => "fsub",
        BinaryOp::FMul => "fmul",
        BinaryOp::FRem => "frem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::LShr => "lshr",
        BinaryOp::UMulHi => "umulhi",
    }
}

fn icmp_mnemonic(pred: ICmpPred) -> &'static str {
    match pred {
        ICmpPred::Eq => "eq",
        ICmpPred::Ne => "ne",
        ICmpPred::Slt => "slt",
        ICmpPred::Sle => "sle",
        ICmpPred::Sgt => "sgt",
        ICmpPred::Sge => "sge",
        ICmpPred::Ult => "ult",
        ICmpPred::Ule => "ule",
        ICmpPred::Ugt => "ugt",
        ICmpPred::Uge => "uge",
    }
}

fn fcmp_mnemonic(pred: FCmpPred) -> &'static str {
    match pred {
        FCmpPred::Oeq => "oeq",
        FCmpPred::Une => "une",
        FCmpPred::Olt => "olt",
        FCmpPred::Ole => "ole",
        FCmpPred::Ogt => "ogt",
        FCmpPred::Oge => "oge",
    }
}

fn cast_mnemonic(op: CastOp) -> &'static str {
    match op {
        CastOp::FpTrunc => "fp-trunc",
        CastOp::FpExt => "fp-ext",
        CastOp::IntCast { sign_extend: true } => "int-cast.sext",
        CastOp::IntCast { sign_extend: false } => "int-cast.zext",
        CastOp::FpToUi => "fp-to-ui",
        CastOp::FpToSi => "fp-to-si",
        CastOp::UiToFp => "ui-to-fp",
        CastOp::SiToFp => "si-to-fp",
        CastOp::PtrToInt => "ptr-to-int",
        CastOp::IntToPtr => "int-to-ptr",
        CastOp::Bitcast => "bitcast",
    }
}

fn atomic_mnemonic(op: AtomicOp) -> &'static str {
    match op {
        AtomicOp::Add => "add",
        AtomicOp::FAdd => "fadd",
        AtomicOp::And => "and",
        AtomicOp::Or => "or",
        AtomicOp::Xor => "xor",
        AtomicOp::Xchg => "xchg",
        AtomicOp::Max => "max",
        AtomicOp::Min => "min",
        AtomicOp::UMax => "umax",
        AtomicOp::UMin => "umin",
    }
}

fn reduce_mnemonic(op: ReduceOp) -> &'static str {
    match op {
        ReduceOp::Add => "add",
        ReduceOp::FAdd => "fadd",
        ReduceOp::Min => "min",
        ReduceOp::Max => "max",
        ReduceOp::UMin => "umin",
        ReduceOp::UMax => "umax",
        ReduceOp::FMin => "fmin",
        ReduceOp::FMax => "fmax",
        ReduceOp::Xor => "xor",
    }
}

fn math_mnemonic(func: MathFn) -> &'static str {
    match func {
        MathFn::Exp => "exp",
        MathFn::Log => "log",
        MathFn::Cos => "cos",
        MathFn::Sin => "sin",
        MathFn::Sqrt => "sqrt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    #[test]
    fn test_ids_are_sequential() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::scalar(ScalarKind::I32));
        let y = b.constant(Constant::Int(1), BlockType::scalar(ScalarKind::I32));
        assert_eq!(x.id, ValueId(0));
        assert_eq!(y.id, ValueId(1));
        assert_eq!(b.value_type(y.id), Some(&BlockType::scalar(ScalarKind::I32)));
        assert!(!b.contains(ValueId(2)));
    }

    #[test]
    fn test_void_instructions_do_not_consume_ids() {
        let mut b = IrBuilder::new("k");
        b.emit_void(InstKind::Barrier);
        let x = b.argument("x", BlockType::scalar(ScalarKind::F32));
        assert_eq!(x.id, ValueId(0));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_metadata_side_table() {
        let mut b = IrBuilder::new("k");
        let x = b.argument("x", BlockType::new(ScalarKind::I32, vec![64]));
        b.set_metadata(x.id, Metadata::MultipleOf(8)).unwrap();
        b.set_metadata(x.id, Metadata::MaxContiguous(64)).unwrap();
        b.set_metadata(x.id, Metadata::MultipleOf(16)).unwrap();
        assert_eq!(
            b.metadata(x.id),
            &[Metadata::MaxContiguous(64), Metadata::MultipleOf(16)]
        );
    }

    #[test]
    fn test_metadata_on_unknown_value_is_internal_error() {
        let mut b = IrBuilder::new("k");
        let err = b.set_metadata(ValueId(7), Metadata::MultipleOf(4)).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_format_ir() {
        let mut b = IrBuilder::new("axpy");
        let x = b.argument("x", BlockType::new(ScalarKind::F32, vec![4]));
        let y = b.argument("y", BlockType::new(ScalarKind::F32, vec![4]));
        b.emit(
            InstKind::Binary { op: BinaryOp::FAdd, lhs: x.id, rhs: y.id },
            x.ty.clone(),
        );
        b.set_metadata(x.id, Metadata::MultipleOf(4)).unwrap();
        let text = format_ir(&b);
        assert_eq!(
            text,
            "kernel @axpy {\n  %0 = arg x : fp32[4] !multiple_of(4)\n  %1 = arg y : fp32[4]\n  %2 = fadd %0, %1 : fp32[4]\n}\n"
        );
    }

    #[test]
    fn test_format_load_hints() {
        let inst = Instruction {
            result: Some(Value {
                id: ValueId(3),
                ty: BlockType::new(ScalarKind::F16, vec![8]),
            }),
            kind: InstKind::Load {
                ptr: ValueId(1),
                cache: CacheModifier::Cg,
                eviction: EvictionPolicy::EvictFirst,
                volatile: true,
            },
        };
        assert_eq!(format_instruction(&inst), "%3 = load %1 cache=.cg evict=first volatile : fp16[8]");
    }
}
