//! Integration tests for tessel
//!
//! Tests the full pipeline including:
//! - Operator lowering into IR (text form snapshots)
//! - Conversion rules observed end to end through the interpreter
//! - Atomic float max/min lowering
//! - Scripts and error diagnostics

use tessel::config::{Config, LoweringOptions};
use tessel::error::CompileError;
use tessel::interp::{Interpreter, RuntimeValue};
use tessel::ir::{AtomicOp, CastOp, Constant, InstKind, IrBuilder, Value, format_ir};
use tessel::lower::{LoadFlags, Lowerer};
use tessel::script::Script;
use tessel::types::{BlockType, ScalarKind};

/// Helper to declare kernel arguments from type strings
fn declare(b: &mut IrBuilder, args: &[(&str, &str)]) -> Vec<Value> {
    args.iter()
        .map(|(name, ty)| b.argument(*name, ty.parse().unwrap()))
        .collect()
}

/// Helper to lower `x` to `to` and run it on `input`
fn run_cast(input: RuntimeValue, to: &[ScalarKind]) -> RuntimeValue {
    let mut b = IrBuilder::new("cast");
    let mut v = b.argument("x", input.ty.clone());
    {
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        for kind in to {
            v = lw.cast(v, kind).unwrap();
        }
    }
    let mut interp = Interpreter::new();
    interp.bind("x", input);
    interp.run(&b).unwrap();
    interp.value(v.id).unwrap().clone()
}

fn count_casts(b: &IrBuilder, op: CastOp) -> usize {
    b.count(|k| matches!(k, InstKind::Cast { op: o, .. } if *o == op))
}

// ============================================
// IR Text Tests
// ============================================

fn vector_add(b: &mut IrBuilder) {
    let v = declare(
        b,
        &[("x_ptr", "*fp32"), ("y_ptr", "*fp32"), ("out_ptr", "*fp32"), ("n", "int32")],
    );
    let mut lw = Lowerer::new(b, LoweringOptions::default());
    let pid = lw.program_id(0).unwrap();
    let offs = lw.arange(0, 4).unwrap();
    let block = lw.constant(Constant::Int(4), ScalarKind::I32);
    let start = lw.mul(pid, block).unwrap();
    let offsets = lw.add(start, offs).unwrap();
    let mask = lw.less_than(offsets.clone(), v[3].clone()).unwrap();

    let x_ptrs = lw.add(v[0].clone(), offsets.clone()).unwrap();
    let x = lw.load(x_ptrs, Some(mask.clone()), None, LoadFlags::default()).unwrap();
    let y_ptrs = lw.add(v[1].clone(), offsets.clone()).unwrap();
    let y = lw.load(y_ptrs, Some(mask.clone()), None, LoadFlags::default()).unwrap();
    let sum = lw.add(x, y).unwrap();
    let out_ptrs = lw.add(v[2].clone(), offsets).unwrap();
    lw.store(out_ptrs, sum, Some(mask)).unwrap();
}

#[test]
fn test_vector_add_ir() {
    let mut b = IrBuilder::new("vector_add");
    vector_add(&mut b);
    insta::assert_snapshot!(format_ir(&b), @r"
    kernel @vector_add {
      %0 = arg x_ptr : *fp32
      %1 = arg y_ptr : *fp32
      %2 = arg out_ptr : *fp32
      %3 = arg n : int32
      %4 = program-id 0 : int32
      %5 = make-range 0, 4 : int32[4]
      %6 = const 4 : int32
      %7 = mul %4, %6 : int32
      %8 = splat %7 : int32[4]
      %9 = add %8, %5 : int32[4]
      %10 = splat %3 : int32[4]
      %11 = icmp slt %9, %10 : int1[4]
      %12 = splat %0 : *fp32[4]
      %13 = addptr %12, %9 : *fp32[4]
      %14 = const undef : fp32
      %15 = splat %14 : fp32[4]
      %16 = masked-load %13, %11, %15 : fp32[4]
      %17 = splat %1 : *fp32[4]
      %18 = addptr %17, %9 : *fp32[4]
      %19 = const undef : fp32
      %20 = splat %19 : fp32[4]
      %21 = masked-load %18, %11, %20 : fp32[4]
      %22 = fadd %16, %21 : fp32[4]
      %23 = splat %2 : *fp32[4]
      %24 = addptr %23, %9 : *fp32[4]
      masked-store %24, %22, %11
    }
    ");
}

#[test]
fn test_int_to_bool_cast_ir() {
    let mut b = IrBuilder::new("to_bool");
    let v = declare(&mut b, &[("x", "int64[16]")]);
    Lowerer::new(&mut b, LoweringOptions::default())
        .cast(v[0].clone(), &ScalarKind::Bool)
        .unwrap();
    insta::assert_snapshot!(format_ir(&b), @r"
    kernel @to_bool {
      %0 = arg x : int64[16]
      %1 = const zero : int64
      %2 = splat %1 : int64[16]
      %3 = icmp ne %0, %2 : int1[16]
    }
    ");
}

#[test]
fn test_cast_to_same_kind_emits_nothing() {
    let mut b = IrBuilder::new("k");
    let v = declare(&mut b, &[("x", "fp16[8]")]);
    let out = Lowerer::new(&mut b, LoweringOptions::default())
        .cast(v[0].clone(), &ScalarKind::F16)
        .unwrap();
    assert_eq!(out, v[0]);
    assert_eq!(b.len(), 1);
}

// ============================================
// Execution Tests
// ============================================

#[test]
fn test_vector_add_runs() {
    let mut b = IrBuilder::new("vector_add");
    vector_add(&mut b);

    let mut interp = Interpreter::new().with_grid([1, 1, 1], [0, 0, 0]);
    let x = interp.memory_mut().alloc_f32s(&[1.0, 2.0, 3.0, 4.0]);
    let y = interp.memory_mut().alloc_f32s(&[10.0, 20.0, 30.0, 40.0]);
    let out = interp.memory_mut().alloc_f32s(&[0.0; 4]);
    interp.bind("x_ptr", RuntimeValue::pointers(ScalarKind::F32, &[], &[x]).unwrap());
    interp.bind("y_ptr", RuntimeValue::pointers(ScalarKind::F32, &[], &[y]).unwrap());
    interp.bind("out_ptr", RuntimeValue::pointers(ScalarKind::F32, &[], &[out]).unwrap());
    interp.bind("n", RuntimeValue::scalar_int(ScalarKind::I32, 3));
    interp.run(&b).unwrap();

    // the fourth lane is masked off
    assert_eq!(interp.memory().read_f32s(out, 4).unwrap(), vec![11.0, 22.0, 33.0, 0.0]);
}

#[test]
fn test_integer_cast_round_trip() {
    let input = RuntimeValue::from_ints(ScalarKind::I32, &[3], &[-5, 7, i64::from(i32::MAX)]).unwrap();
    let out = run_cast(input.clone(), &[ScalarKind::I64, ScalarKind::I32]);
    assert_eq!(out, input);
}

#[test]
fn test_float_cast_round_trip() {
    let input = RuntimeValue::from_f32s(&[3], &[1.1, -0.0, 3.4e38]).unwrap();
    let out = run_cast(input.clone(), &[ScalarKind::F64, ScalarKind::F32]);
    assert_eq!(out.lanes, input.lanes);
}

#[test]
fn test_int64_to_int32_truncates() {
    let input = RuntimeValue::from_ints(ScalarKind::I64, &[3], &[0x1_0000_0005, -1, 0x8000_0000]).unwrap();
    let out = run_cast(input, &[ScalarKind::I32]);
    assert_eq!(out.to_i64s().unwrap(), vec![5, -1, i64::from(i32::MIN)]);
}

#[test]
fn test_truediv_int8_by_uint16() {
    let mut b = IrBuilder::new("div");
    let v = declare(&mut b, &[("x", "int8[128]"), ("y", "uint16[128]")]);
    let q = Lowerer::new(&mut b, LoweringOptions::default())
        .truediv(v[0].clone(), v[1].clone())
        .unwrap();
    assert_eq!(q.ty, BlockType::new(ScalarKind::F32, vec![128]));
    assert_eq!(count_casts(&b, CastOp::SiToFp), 1);
    assert_eq!(count_casts(&b, CastOp::UiToFp), 1);
    assert_eq!(b.count(|k| matches!(k, InstKind::FDiv { .. })), 1);

    let xs: Vec<i64> = (0..128).map(|i| i - 64).collect();
    let mut interp = Interpreter::new();
    interp.bind("x", RuntimeValue::from_ints(ScalarKind::I8, &[128], &xs).unwrap());
    interp.bind("y", RuntimeValue::from_ints(ScalarKind::U16, &[128], &[2; 128]).unwrap());
    interp.run(&b).unwrap();
    let out = interp.value(q.id).unwrap().to_f32s().unwrap();
    assert_eq!(out[0], -32.0);
    assert_eq!(out[65], 0.5);
}

#[test]
fn test_dot_accumulates_in_fp32() {
    let mut b = IrBuilder::new("dot");
    let v = declare(&mut b, &[("a", "fp32[2,2]"), ("b", "fp32[2,2]")]);
    let c = Lowerer::new(&mut b, LoweringOptions::default())
        .dot(v[0].clone(), v[1].clone(), None)
        .unwrap();

    let mut interp = Interpreter::new();
    interp.bind("a", RuntimeValue::from_f32s(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap());
    interp.bind("b", RuntimeValue::from_f32s(&[2, 2], &[5.0, 6.0, 7.0, 8.0]).unwrap());
    interp.run(&b).unwrap();
    assert_eq!(interp.value(c.id).unwrap().to_f32s().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn test_bool_store_and_load_go_through_bytes() {
    let mut b = IrBuilder::new("bools");
    let v = declare(&mut b, &[("p", "*int1[4]"), ("flags", "int1[4]")]);
    let loaded = {
        let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
        lw.store(v[0].clone(), v[1].clone(), None).unwrap();
        lw.load(v[0].clone(), None, None, LoadFlags::default()).unwrap()
    };
    assert_eq!(loaded.element(), &ScalarKind::Bool);

    let mut interp = Interpreter::new();
    let base = interp.memory_mut().alloc(4);
    let addrs: Vec<u64> = (0..4).map(|i| base + i).collect();
    interp.bind("p", RuntimeValue::pointers(ScalarKind::Bool, &[4], &addrs).unwrap());
    interp.bind("flags", RuntimeValue::from_bools(&[4], &[true, false, false, true]).unwrap());
    interp.run(&b).unwrap();
    assert_eq!(interp.memory().read_bytes(base, 4).unwrap(), vec![1, 0, 0, 1]);
    assert_eq!(
        interp.value(loaded.id).unwrap().to_bools().unwrap(),
        vec![true, false, false, true]
    );
}

// ============================================
// Atomic Tests
// ============================================

#[test]
fn test_atomic_float_max_negative_takes_umin_path() {
    let mut b = IrBuilder::new("amax");
    let v = declare(&mut b, &[("p", "*fp32"), ("x", "fp32")]);
    let old = Lowerer::new(&mut b, LoweringOptions::default())
        .atomic_max(v[0].clone(), v[1].clone(), None)
        .unwrap();
    assert_eq!(old.element(), &ScalarKind::F32);

    let rmw_mask = |op: AtomicOp| {
        b.instructions()
            .iter()
            .find_map(|i| match i.kind {
                InstKind::AtomicRmw { op: o, mask, .. } if o == op => Some(mask),
                _ => None,
            })
            .unwrap()
    };
    let (pos_mask, neg_mask) = (rmw_mask(AtomicOp::Max), rmw_mask(AtomicOp::UMin));

    let mut interp = Interpreter::new();
    let slot = interp.memory_mut().alloc_f32s(&[-5.0]);
    interp.bind("p", RuntimeValue::pointers(ScalarKind::F32, &[], &[slot]).unwrap());
    interp.bind("x", RuntimeValue::scalar_f32(-3.5));
    interp.run(&b).unwrap();

    assert_eq!(interp.value(pos_mask).unwrap().to_bools().unwrap(), vec![false]);
    assert_eq!(interp.value(neg_mask).unwrap().to_bools().unwrap(), vec![true]);
    assert_eq!(interp.memory().read_f32s(slot, 1).unwrap(), vec![-3.5]);
    assert_eq!(interp.value(old.id).unwrap().to_f32s().unwrap(), vec![-5.0]);
}

#[test]
fn test_atomic_float_min_positive() {
    let mut b = IrBuilder::new("amin");
    let v = declare(&mut b, &[("p", "*fp32"), ("x", "fp32")]);
    Lowerer::new(&mut b, LoweringOptions::default())
        .atomic_min(v[0].clone(), v[1].clone(), None)
        .unwrap();

    let mut interp = Interpreter::new();
    let slot = interp.memory_mut().alloc_f32s(&[2.5]);
    interp.bind("p", RuntimeValue::pointers(ScalarKind::F32, &[], &[slot]).unwrap());
    interp.bind("x", RuntimeValue::scalar_f32(0.75));
    interp.run(&b).unwrap();
    assert_eq!(interp.memory().read_f32s(slot, 1).unwrap(), vec![0.75]);
}

#[test]
fn test_atomic_add_returns_old_values() {
    let mut b = IrBuilder::new("aadd");
    let v = declare(&mut b, &[("p", "*int32[2]"), ("x", "int32")]);
    let old = Lowerer::new(&mut b, LoweringOptions::default())
        .atomic_add(v[0].clone(), v[1].clone(), None)
        .unwrap();

    let mut interp = Interpreter::new();
    let base = interp.memory_mut().alloc_i32s(&[1, 2]);
    interp.bind("p", RuntimeValue::pointers(ScalarKind::I32, &[2], &[base, base + 4]).unwrap());
    interp.bind("x", RuntimeValue::scalar_int(ScalarKind::I32, 10));
    interp.run(&b).unwrap();
    assert_eq!(interp.memory().read_i32s(base, 2).unwrap(), vec![11, 12]);
    assert_eq!(interp.value(old.id).unwrap().to_i64s().unwrap(), vec![1, 2]);
}

// ============================================
// Error Tests
// ============================================

#[test]
fn test_pointer_plus_pointer_is_incompatible() {
    let mut b = IrBuilder::new("k");
    let v = declare(&mut b, &[("a", "*fp32"), ("b", "*int32"), ("i", "int32")]);
    let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
    let p = lw.add(v[0].clone(), v[2].clone()).unwrap();
    assert_eq!(p.element(), &ScalarKind::ptr(ScalarKind::F32));
    let err = lw.add(v[0].clone(), v[1].clone()).unwrap_err();
    assert!(matches!(err, CompileError::IncompatibleType { .. }));
    assert_eq!(err.to_string(), "add: invalid operands of type *fp32 and *int32");
}

#[test]
fn test_remainder_signedness() {
    let mut b = IrBuilder::new("k");
    let v = declare(&mut b, &[("a", "int32"), ("b", "uint32"), ("c", "int16")]);
    let mut lw = Lowerer::new(&mut b, LoweringOptions::default());
    let err = lw.rem(v[0].clone(), v[1].clone()).unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
    assert!(err.to_string().contains("different signedness"), "{err}");
    let r = lw.rem(v[0].clone(), v[2].clone()).unwrap();
    assert_eq!(r.element(), &ScalarKind::I32);
}

#[test]
fn test_fill_without_mask() {
    let mut b = IrBuilder::new("k");
    let v = declare(&mut b, &[("p", "*fp32[4]"), ("other", "fp32")]);
    let err = Lowerer::new(&mut b, LoweringOptions::default())
        .load(v[0].clone(), None, Some(v[1].clone()), LoadFlags::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::Value { .. }));
    assert_eq!(b.len(), 2);
}

#[test]
fn test_bad_cache_modifier_suggests() {
    let mut b = IrBuilder::new("k");
    let v = declare(&mut b, &[("p", "*fp32")]);
    let flags = LoadFlags {
        cache_modifier: Some(".cgg"),
        ..LoadFlags::default()
    };
    let err = Lowerer::new(&mut b, LoweringOptions::default())
        .load(v[0].clone(), None, None, flags)
        .unwrap_err();
    assert!(err.to_string().contains("did you mean `.cg`?"), "{err}");
}

// ============================================
// Script Tests
// ============================================

#[test]
fn test_script_row_sum() {
    let script = Script::from_json(
        r#"{
          "name": "row_sum",
          "args": [{"name": "x", "type": "int8[2,3]"}],
          "steps": [
            {"op": "sum", "args": ["x"], "axis": 1, "out": "s"},
            {"op": "multiple_of", "args": ["s"], "n": 2, "out": "t"}
          ]
        }"#,
    )
    .unwrap();
    let b = script.lower(LoweringOptions::default()).unwrap();
    insta::assert_snapshot!(format_ir(&b), @r"
    kernel @row_sum {
      %0 = arg x : int8[2,3]
      %1 = int-cast.sext %0 : int32[2,3]
      %2 = reduce add %1, axis=1 : int32[2] !multiple_of(2)
    }
    ");

    let mut interp = Interpreter::new();
    interp.bind("x", RuntimeValue::from_ints(ScalarKind::I8, &[2, 3], &[100, 100, 100, -1, -2, -3]).unwrap());
    interp.run(&b).unwrap();
    let last = b.instructions().last().and_then(|i| i.result.clone()).unwrap();
    assert_eq!(interp.value(last.id).unwrap().to_i64s().unwrap(), vec![300, -6]);
}

#[test]
fn test_config_feeds_lowering() {
    let config = Config::from_toml_str("[lowering]\nieee_rounding = true\nallow_tf32 = false\n").unwrap();
    let script = Script::from_json(
        r#"{
          "args": [{"name": "a", "type": "fp32[4]"}, {"name": "m", "type": "fp16[2,2]"}],
          "steps": [
            {"op": "truediv", "args": ["a", "a"]},
            {"op": "dot", "args": ["m", "m"]}
          ]
        }"#,
    )
    .unwrap();
    let b = script.lower(config.lowering).unwrap();
    assert_eq!(b.count(|k| matches!(k, InstKind::FDiv { ieee_rounding: true, .. })), 1);
    assert_eq!(b.count(|k| matches!(k, InstKind::Dot { allow_tf32: false, .. })), 1);
}
