//! Instruction evaluator

use std::collections::HashMap;

use super::error::{InterpResult, RuntimeError};
use super::memory::Memory;
use super::value::{RuntimeValue, from_f64, int_value, lane_bits, mask, sign_extend, to_f64};
use crate::ir::{
    AtomicOp, BinaryOp, CastOp, Constant, FCmpPred, ICmpPred, InstKind, Instruction, IrBuilder,
    MathFn, ReduceOp, ValueId,
};
use crate::types::{BlockType, ScalarKind};

/// Executes kernel IR for one program instance of a launch grid
#[derive(Debug, Default)]
pub struct Interpreter {
    memory: Memory,
    args: HashMap<String, RuntimeValue>,
    values: HashMap<ValueId, RuntimeValue>,
    program_id: [u32; 3],
    num_programs: [u32; 3],
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            memory: Memory::new(),
            num_programs: [1, 1, 1],
            ..Self::default()
        }
    }

    /// Run as program `program_id` of a `num_programs` grid
    pub fn with_grid(mut self, num_programs: [u32; 3], program_id: [u32; 3]) -> Self {
        self.num_programs = num_programs;
        self.program_id = program_id;
        self
    }

    /// Bind the value of a kernel argument
    pub fn bind(&mut self, name: impl Into<String>, value: RuntimeValue) {
        self.args.insert(name.into(), value);
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Value computed for `id` by the last run
    pub fn value(&self, id: ValueId) -> InterpResult<&RuntimeValue> {
        self.values.get(&id).ok_or_else(|| RuntimeError::undefined_value(id))
    }

    /// Execute every instruction in order
    pub fn run(&mut self, builder: &IrBuilder) -> InterpResult<()> {
        log::debug!(
            "interpreting kernel @{} ({} instructions)",
            builder.name(),
            builder.len()
        );
        self.values.clear();
        for inst in builder.instructions() {
            self.step(inst)?;
        }
        Ok(())
    }

    fn step(&mut self, inst: &Instruction) -> InterpResult<()> {
        let ty = inst.result.as_ref().map(|r| r.ty.clone());
        let result = match (&inst.kind, ty) {
            (InstKind::Store { ptr, value }, _) => {
                let (ptr, value) = (self.value(*ptr)?.clone(), self.value(*value)?.clone());
                self.store(&ptr, &value, None)?;
                None
            }
            (InstKind::MaskedStore { ptr, value, mask }, _) => {
                let (ptr, value) = (self.value(*ptr)?.clone(), self.value(*value)?.clone());
                let mask = self.value(*mask)?.clone();
                self.store(&ptr, &value, Some(&mask))?;
                None
            }
            (InstKind::Barrier, _) => None,
            (kind, Some(ty)) => Some(self.eval(kind, ty)?),
            (kind, None) => {
                return Err(RuntimeError::unsupported(&format!(
                    "instruction without result: {kind:?}"
                )));
            }
        };
        if let (Some(result), Some(value)) = (&inst.result, result) {
            log::trace!("{} = {value}", result.id);
            self.values.insert(result.id, value);
        }
        Ok(())
    }

    fn eval(&mut self, kind: &InstKind, ty: BlockType) -> InterpResult<RuntimeValue> {
        match kind {
            InstKind::Argument { name } => {
                let value = self
                    .args
                    .get(name)
                    .ok_or_else(|| RuntimeError::unbound_argument(name))?;
                if value.ty != ty {
                    return Err(RuntimeError::type_error(&ty.to_string(), &value.ty.to_string()));
                }
                Ok(value.clone())
            }
            InstKind::Const { value } => {
                let bits = constant_bits(value, &ty.element)?;
                Ok(RuntimeValue::splat(ty, bits))
            }
            InstKind::Binary { op, lhs, rhs } => {
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let kind = a.element().clone();
                let lanes = zip_lanes(a, b, |x, y| binary(*op, &kind, x, y))?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::FDiv { lhs, rhs, .. } => {
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let kind = a.element().clone();
                let lanes = zip_lanes(a, b, |x, y| {
                    from_f64(to_f64(x, &kind)? / to_f64(y, &kind)?, &kind)
                })?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let kind = a.element().clone();
                let lanes = zip_lanes(a, b, |x, y| Ok(u64::from(icmp(*pred, &kind, x, y))))?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let kind = a.element().clone();
                let lanes = zip_lanes(a, b, |x, y| {
                    let (x, y) = (to_f64(x, &kind)?, to_f64(y, &kind)?);
                    Ok(u64::from(fcmp(*pred, x, y)))
                })?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Cast { op, src } => {
                let input = self.value(*src)?;
                let lanes = input
                    .lanes
                    .iter()
                    .map(|&l| cast(*op, input.element(), &ty.element, l))
                    .collect::<InterpResult<Vec<_>>>()?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::AddPtr { ptr, offset } => {
                let (p, o) = (self.value(*ptr)?, self.value(*offset)?);
                let stride = p
                    .element()
                    .pointee()
                    .map(ScalarKind::storage_bytes)
                    .ok_or_else(|| RuntimeError::type_error("pointer", &p.ty.to_string()))?
                    as i64;
                let offset_kind = o.element().clone();
                let lanes = zip_lanes(p, o, |addr, off| {
                    let delta = int_value(off, &offset_kind).wrapping_mul(stride);
                    Ok(addr.wrapping_add(delta as u64))
                })?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Splat { src } => {
                let input = self.value(*src)?;
                let bits = scalar_lane(input)?;
                Ok(RuntimeValue::splat(ty, bits))
            }
            InstKind::Broadcast { src } => {
                let input = self.value(*src)?;
                let lanes = broadcast_lanes(input, &ty.shape)?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Reshape { src } => RuntimeValue::new(ty, self.value(*src)?.lanes.clone()),
            InstKind::Cat { lhs, rhs } => {
                let mut lanes = self.value(*lhs)?.lanes.clone();
                lanes.extend_from_slice(&self.value(*rhs)?.lanes);
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                let (c, t, f) = (
                    self.value(*cond)?,
                    self.value(*on_true)?,
                    self.value(*on_false)?,
                );
                let lanes = (0..ty.numel())
                    .map(|i| {
                        let pick = lane_at(c, i)? != 0;
                        if pick { lane_at(t, i) } else { lane_at(f, i) }
                    })
                    .collect::<InterpResult<Vec<_>>>()?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Load { ptr, .. } => {
                let ptr = self.value(*ptr)?;
                let width = ty.element.storage_bytes();
                let lanes = ptr
                    .lanes
                    .iter()
                    .map(|&addr| self.memory.read(addr, width))
                    .collect::<InterpResult<Vec<_>>>()?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::MaskedLoad {
                ptr, mask, other, ..
            } => {
                let (p, m, o) = (self.value(*ptr)?, self.value(*mask)?, self.value(*other)?);
                let width = ty.element.storage_bytes();
                let lanes = (0..ty.numel())
                    .map(|i| {
                        if lane_at(m, i)? != 0 {
                            self.memory.read(lane_at(p, i)?, width)
                        } else {
                            lane_at(o, i)
                        }
                    })
                    .collect::<InterpResult<Vec<_>>>()?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::AtomicRmw {
                op,
                ptr,
                value,
                mask,
            } => {
                let (p, v, m) = (
                    self.value(*ptr)?.clone(),
                    self.value(*value)?.clone(),
                    self.value(*mask)?.clone(),
                );
                let kind = ty.element.clone();
                let width = kind.storage_bytes();
                let mut lanes = Vec::with_capacity(ty.numel());
                for i in 0..ty.numel() {
                    if lane_at(&m, i)? == 0 {
                        lanes.push(0);
                        continue;
                    }
                    let addr = lane_at(&p, i)?;
                    let old = self.memory.read(addr, width)?;
                    let new = atomic(*op, &kind, old, lane_at(&v, i)?)?;
                    self.memory.write(addr, width, new)?;
                    lanes.push(old);
                }
                RuntimeValue::new(ty, lanes)
            }
            InstKind::AtomicCas { ptr, cmp, value } => {
                let (p, c, v) = (
                    self.value(*ptr)?.clone(),
                    self.value(*cmp)?.clone(),
                    self.value(*value)?.clone(),
                );
                let width = ty.element.storage_bytes();
                let mut lanes = Vec::with_capacity(ty.numel());
                for i in 0..ty.numel() {
                    let addr = lane_at(&p, i)?;
                    let old = self.memory.read(addr, width)?;
                    if old == lane_at(&c, i)? {
                        self.memory.write(addr, width, lane_at(&v, i)?)?;
                    }
                    lanes.push(old);
                }
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Reduce { op, input, axis } => {
                let input = self.value(*input)?;
                let lanes = reduce_lanes(*op, input, *axis)?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Dot { lhs, rhs, acc, .. } => {
                let (a, b, c) = (self.value(*lhs)?, self.value(*rhs)?, self.value(*acc)?);
                let lanes = dot_lanes(a, b, c)?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Math { func, src } => {
                let input = self.value(*src)?;
                let kind = input.element().clone();
                let lanes = input
                    .lanes
                    .iter()
                    .map(|&l| {
                        let x = to_f64(l, &kind)?;
                        let y = match func {
                            MathFn::Exp => x.exp(),
                            MathFn::Log => x.ln(),
                            MathFn::Cos => x.cos(),
                            MathFn::Sin => x.sin(),
                            MathFn::Sqrt => x.sqrt(),
                        };
                        from_f64(y, &kind)
                    })
                    .collect::<InterpResult<Vec<_>>>()?;
                RuntimeValue::new(ty, lanes)
            }
            InstKind::ProgramId { axis } => {
                let id = self.program_id.get(*axis as usize).copied().unwrap_or(0);
                Ok(RuntimeValue::splat(ty, u64::from(id)))
            }
            InstKind::NumPrograms { axis } => {
                let n = self.num_programs.get(*axis as usize).copied().unwrap_or(1);
                Ok(RuntimeValue::splat(ty, u64::from(n)))
            }
            InstKind::MakeRange { start, end } => {
                let lanes = (*start..*end).map(|i| i as u32 as u64).collect();
                RuntimeValue::new(ty, lanes)
            }
            InstKind::Store { .. } | InstKind::MaskedStore { .. } | InstKind::Barrier => Err(
                RuntimeError::unsupported("store or barrier in value position"),
            ),
        }
    }

    fn store(
        &mut self,
        ptr: &RuntimeValue,
        value: &RuntimeValue,
        mask: Option<&RuntimeValue>,
    ) -> InterpResult<()> {
        let pointee = ptr
            .element()
            .pointee()
            .ok_or_else(|| RuntimeError::type_error("pointer", &ptr.ty.to_string()))?;
        let width = pointee.storage_bytes();
        for i in 0..ptr.len() {
            if let Some(mask) = mask {
                if lane_at(mask, i)? == 0 {
                    continue;
                }
            }
            self.memory.write(lane_at(ptr, i)?, width, lane_at(value, i)?)?;
        }
        Ok(())
    }
}

// ============================================================================
// Lane helpers
// ============================================================================

fn lane_at(value: &RuntimeValue, index: usize) -> InterpResult<u64> {
    match value.lanes.len() {
        1 => Ok(value.lanes[0]),
        _ => value.lanes.get(index).copied().ok_or_else(|| {
            RuntimeError::type_error(
                &format!("at least {} lane(s)", index + 1),
                &value.ty.to_string(),
            )
        }),
    }
}

fn scalar_lane(value: &RuntimeValue) -> InterpResult<u64> {
    match value.lanes.as_slice() {
        [bits] => Ok(*bits),
        _ => Err(RuntimeError::type_error("scalar", &value.ty.to_string())),
    }
}

fn zip_lanes(
    a: &RuntimeValue,
    b: &RuntimeValue,
    mut f: impl FnMut(u64, u64) -> InterpResult<u64>,
) -> InterpResult<Vec<u64>> {
    if a.len() != b.len() {
        return Err(RuntimeError::type_error(&a.ty.to_string(), &b.ty.to_string()));
    }
    a.lanes.iter().zip(&b.lanes).map(|(&x, &y)| f(x, y)).collect()
}

fn constant_bits(value: &Constant, kind: &ScalarKind) -> InterpResult<u64> {
    match value {
        Constant::Int(n) if kind.is_floating() => from_f64(*n as f64, kind),
        Constant::Int(n) => Ok(*n as u64),
        Constant::Bool(b) => Ok(u64::from(*b)),
        Constant::Float(x) if kind.is_floating() => from_f64(*x, kind),
        Constant::Float(x) => Ok(*x as i64 as u64),
        Constant::Zero if kind.is_floating() => from_f64(0.0, kind),
        Constant::Zero | Constant::Undef => Ok(0),
        Constant::AllOnes => Ok(mask(lane_bits(kind))),
    }
}

/// Row-major strides of `shape`
fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

fn broadcast_lanes(input: &RuntimeValue, shape: &[usize]) -> InterpResult<Vec<u64>> {
    let src = &input.ty.shape;
    if src.len() != shape.len() {
        return Err(RuntimeError::type_error(
            &format!("rank {}", shape.len()),
            &input.ty.to_string(),
        ));
    }
    let (src_strides, dst_strides) = (strides(src), strides(shape));
    let total: usize = shape.iter().product();
    (0..total)
        .map(|flat| {
            let index: usize = (0..shape.len())
                .map(|axis| {
                    let coord = (flat / dst_strides[axis]) % shape[axis];
                    if src[axis] == 1 { 0 } else { coord * src_strides[axis] }
                })
                .sum();
            lane_at(input, index)
        })
        .collect()
}

// ============================================================================
// Scalar semantics
// ============================================================================

fn binary(op: BinaryOp, kind: &ScalarKind, x: u64, y: u64) -> InterpResult<u64> {
    let width = lane_bits(kind);
    let m = mask(width);
    let (sx, sy) = (sign_extend(x, width), sign_extend(y, width));
    let (ux, uy) = (x & m, y & m);
    let float = |f: fn(f64, f64) -> f64| -> InterpResult<u64> {
        from_f64(f(to_f64(x, kind)?, to_f64(y, kind)?), kind)
    };
    let bits = match op {
        BinaryOp::Add => ux.wrapping_add(uy),
        BinaryOp::Sub => ux.wrapping_sub(uy),
        BinaryOp::Mul => ux.wrapping_mul(uy),
        BinaryOp::SDiv | BinaryOp::SRem if sy == 0 => return Err(RuntimeError::division_by_zero()),
        BinaryOp::UDiv | BinaryOp::URem if uy == 0 => return Err(RuntimeError::division_by_zero()),
        BinaryOp::SDiv => sx.wrapping_div(sy) as u64,
        BinaryOp::SRem => sx.wrapping_rem(sy) as u64,
        BinaryOp::UDiv => ux / uy,
        BinaryOp::URem => ux % uy,
        BinaryOp::FAdd => return float(|a, b| a + b),
        BinaryOp::FSub => return float(|a, b| a - b),
        BinaryOp::FMul => return float(|a, b| a * b),
        BinaryOp::FRem => return float(|a, b| a % b),
        BinaryOp::And => ux & uy,
        BinaryOp::Or => ux | uy,
        BinaryOp::Xor => ux ^ uy,
        BinaryOp::Shl if uy >= u64::from(width) => 0,
        BinaryOp::LShr if uy >= u64::from(width) => 0,
        BinaryOp::Shl => ux << uy,
        BinaryOp::LShr => ux >> uy,
        BinaryOp::UMulHi => ((u128::from(ux) * u128::from(uy)) >> width) as u64,
    };
    Ok(bits & m)
}

fn icmp(pred: ICmpPred, kind: &ScalarKind, x: u64, y: u64) -> bool {
    let width = lane_bits(kind);
    let (sx, sy) = (sign_extend(x, width), sign_extend(y, width));
    let (ux, uy) = (x & mask(width), y & mask(width));
    match pred {
        ICmpPred::Eq => ux == uy,
        ICmpPred::Ne => ux != uy,
        ICmpPred::Slt => sx < sy,
        ICmpPred::Sle => sx <= sy,
        ICmpPred::Sgt => sx > sy,
        ICmpPred::Sge => sx >= sy,
        ICmpPred::Ult => ux < uy,
        ICmpPred::Ule => ux <= uy,
        ICmpPred::Ugt => ux > uy,
        ICmpPred::Uge => ux >= uy,
    }
}

fn fcmp(pred: FCmpPred, x: f64, y: f64) -> bool {
    match pred {
        FCmpPred::Oeq => x == y,
        FCmpPred::Une => x != y,
        FCmpPred::Olt => x < y,
        FCmpPred::Ole => x <= y,
        FCmpPred::Ogt => x > y,
        FCmpPred::Oge => x >= y,
    }
}

fn cast(op: CastOp, src: &ScalarKind, dst: &ScalarKind, bits: u64) -> InterpResult<u64> {
    let src_width = lane_bits(src);
    let dst_mask = mask(lane_bits(dst));
    let out = match op {
        CastOp::FpTrunc | CastOp::FpExt => return from_f64(to_f64(bits, src)?, dst),
        CastOp::IntCast { sign_extend: true } => sign_extend(bits, src_width) as u64,
        CastOp::IntCast { sign_extend: false } => bits & mask(src_width),
        // saturating `as` then truncation to the destination width
        CastOp::FpToSi => to_f64(bits, src)? as i64 as u64,
        CastOp::FpToUi => to_f64(bits, src)? as u64,
        CastOp::UiToFp => {
            let v = bits & mask(src_width);
            return int_to_float(v as f64, v, false, dst);
        }
        CastOp::SiToFp => {
            let v = sign_extend(bits, src_width);
            return int_to_float(v as f64, v as u64, true, dst);
        }
        CastOp::PtrToInt | CastOp::IntToPtr => bits & mask(src_width),
        CastOp::Bitcast => bits,
    };
    Ok(out & dst_mask)
}

/// Round an integer straight to the destination precision
fn int_to_float(approx: f64, raw: u64, signed: bool, dst: &ScalarKind) -> InterpResult<u64> {
    match dst {
        ScalarKind::F32 if signed => Ok(u64::from((raw as i64 as f32).to_bits())),
        ScalarKind::F32 => Ok(u64::from((raw as f32).to_bits())),
        _ => from_f64(approx, dst),
    }
}

fn atomic(op: AtomicOp, kind: &ScalarKind, old: u64, value: u64) -> InterpResult<u64> {
    let width = lane_bits(kind);
    let (so, sv) = (sign_extend(old, width), sign_extend(value, width));
    let m = mask(width);
    let bits = match op {
        AtomicOp::Add => old.wrapping_add(value),
        AtomicOp::FAdd => return from_f64(to_f64(old, kind)? + to_f64(value, kind)?, kind),
        AtomicOp::And => old & value,
        AtomicOp::Or => old | value,
        AtomicOp::Xor => old ^ value,
        AtomicOp::Xchg => value,
        AtomicOp::Max => so.max(sv) as u64,
        AtomicOp::Min => so.min(sv) as u64,
        AtomicOp::UMax => (old & m).max(value & m),
        AtomicOp::UMin => (old & m).min(value & m),
    };
    Ok(bits & m)
}

fn reduce_lanes(op: ReduceOp, input: &RuntimeValue, axis: usize) -> InterpResult<Vec<u64>> {
    let shape = &input.ty.shape;
    if axis >= shape.len() {
        return Err(RuntimeError::type_error(
            &format!("axis below rank {}", shape.len()),
            &axis.to_string(),
        ));
    }
    let kind = input.element();
    let outer: usize = shape[..axis].iter().product();
    let len = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    let width = lane_bits(kind);
    let m = mask(width);

    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| input.lanes[(o * len + k) * inner + i];
            let mut acc = at(0);
            for k in 1..len {
                let x = at(k);
                acc = match op {
                    ReduceOp::Add => acc.wrapping_add(x) & m,
                    ReduceOp::Xor => acc ^ x,
                    ReduceOp::Min => sign_extend(acc, width).min(sign_extend(x, width)) as u64 & m,
                    ReduceOp::Max => sign_extend(acc, width).max(sign_extend(x, width)) as u64 & m,
                    ReduceOp::UMin => acc.min(x),
                    ReduceOp::UMax => acc.max(x),
                    ReduceOp::FAdd => from_f64(to_f64(acc, kind)? + to_f64(x, kind)?, kind)?,
                    ReduceOp::FMin => from_f64(to_f64(acc, kind)?.min(to_f64(x, kind)?), kind)?,
                    ReduceOp::FMax => from_f64(to_f64(acc, kind)?.max(to_f64(x, kind)?), kind)?,
                };
            }
            out.push(acc);
        }
    }
    Ok(out)
}

fn dot_lanes(a: &RuntimeValue, b: &RuntimeValue, acc: &RuntimeValue) -> InterpResult<Vec<u64>> {
    let (m, k) = match a.ty.shape.as_slice() {
        [m, k] => (*m, *k),
        _ => return Err(RuntimeError::type_error("rank-2 block", &a.ty.to_string())),
    };
    let n = match b.ty.shape.as_slice() {
        [_, n] => *n,
        _ => return Err(RuntimeError::type_error("rank-2 block", &b.ty.to_string())),
    };
    let acc_kind = acc.element();
    let mut out = Vec::with_capacity(m * n);
    for row in 0..m {
        for col in 0..n {
            let init = lane_at(acc, row * n + col)?;
            let lane = if acc_kind.is_floating() {
                let mut sum = to_f64(init, acc_kind)?;
                for i in 0..k {
                    sum += to_f64(a.lanes[row * k + i], a.element())?
                        * to_f64(b.lanes[i * n + col], b.element())?;
                }
                from_f64(sum, acc_kind)?
            } else {
                let mut sum = int_value(init, acc_kind);
                for i in 0..k {
                    let x = int_value(a.lanes[row * k + i], a.element());
                    let y = int_value(b.lanes[i * n + col], b.element());
                    sum = sum.wrapping_add(x.wrapping_mul(y));
                }
                sum as u64 & mask(lane_bits(acc_kind))
            };
            out.push(lane);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;

    #[test]
    fn test_strides() {
        assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_integer_ops_wrap() {
        assert_eq!(binary(BinaryOp::Add, &ScalarKind::I8, 0x7f, 1).unwrap(), 0x80);
        assert_eq!(binary(BinaryOp::Mul, &ScalarKind::U16, 0x100, 0x100).unwrap(), 0);
        assert_eq!(binary(BinaryOp::UMulHi, &ScalarKind::U32, 0x8000_0000, 4).unwrap(), 2);
    }

    #[test]
    fn test_signed_division_truncates_toward_zero() {
        let minus_seven = (-7i64) as u64 & 0xff;
        let q = binary(BinaryOp::SDiv, &ScalarKind::I8, minus_seven, 2).unwrap();
        assert_eq!(sign_extend(q, 8), -3);
        let r = binary(BinaryOp::SRem, &ScalarKind::I8, minus_seven, 2).unwrap();
        assert_eq!(sign_extend(r, 8), -1);
        assert!(binary(BinaryOp::UDiv, &ScalarKind::U8, 1, 0).is_err());
    }

    #[test]
    fn test_int_cast_truncates_low_bits() {
        let big = 0x1_0000_0005u64;
        let sext = CastOp::IntCast { sign_extend: true };
        let zext = CastOp::IntCast { sign_extend: false };
        assert_eq!(cast(sext, &ScalarKind::I64, &ScalarKind::I32, big).unwrap(), 5);
        assert_eq!(cast(sext, &ScalarKind::I8, &ScalarKind::I32, 0xff).unwrap(), 0xffff_ffff);
        assert_eq!(cast(zext, &ScalarKind::Bool, &ScalarKind::I32, 1).unwrap(), 1);
    }

    #[test]
    fn test_float_to_int_truncates() {
        let bits = u64::from((-2.75f32).to_bits());
        let out = cast(CastOp::FpToSi, &ScalarKind::F32, &ScalarKind::I32, bits).unwrap();
        assert_eq!(sign_extend(out, 32), -2);
    }

    #[test]
    fn test_atomic_extremes() {
        assert_eq!(atomic(AtomicOp::Max, &ScalarKind::I32, 0xffff_fffe, 1).unwrap(), 1);
        assert_eq!(atomic(AtomicOp::UMax, &ScalarKind::I32, 0xffff_fffe, 1).unwrap(), 0xffff_fffe);
    }

    #[test]
    fn test_reduce_inner_axis() {
        let v = RuntimeValue::from_ints(ScalarKind::I32, &[2, 3], &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(reduce_lanes(ReduceOp::Add, &v, 1).unwrap(), vec![6, 15]);
        assert_eq!(reduce_lanes(ReduceOp::Max, &v, 0).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_broadcast_lanes() {
        let v = RuntimeValue::from_ints(ScalarKind::I32, &[1, 3], &[1, 2, 3]).unwrap();
        assert_eq!(broadcast_lanes(&v, &[2, 3]).unwrap(), vec![1, 2, 3, 1, 2, 3]);
        let v = RuntimeValue::from_ints(ScalarKind::I32, &[2, 1], &[7, 9]).unwrap();
        assert_eq!(broadcast_lanes(&v, &[2, 2]).unwrap(), vec![7, 7, 9, 9]);
    }

    #[test]
    fn test_unbound_argument() {
        let mut b = IrBuilder::new("k");
        b.argument("x", BlockType::scalar(ScalarKind::I32));
        let err = Interpreter::new().run(&b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnboundArgument);
    }

    #[test]
    fn test_argument_type_checked() {
        let mut b = IrBuilder::new("k");
        b.argument("x", BlockType::new(ScalarKind::F32, vec![2]));
        let mut interp = Interpreter::new();
        interp.bind("x", RuntimeValue::scalar_f32(1.0));
        assert_eq!(interp.run(&b).unwrap_err().kind, ErrorKind::TypeError);
    }

    #[test]
    fn test_program_id_from_grid() {
        let mut b = IrBuilder::new("k");
        let pid = b.emit(InstKind::ProgramId { axis: 1 }, BlockType::scalar(ScalarKind::I32));
        let n = b.emit(InstKind::NumPrograms { axis: 1 }, BlockType::scalar(ScalarKind::I32));
        let mut interp = Interpreter::new().with_grid([4, 8, 1], [3, 5, 0]);
        interp.run(&b).unwrap();
        assert_eq!(interp.value(pid.id).unwrap().to_i64s().unwrap(), vec![5]);
        assert_eq!(interp.value(n.id).unwrap().to_i64s().unwrap(), vec![8]);
    }
}
