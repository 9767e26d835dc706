//! Lowering scripts
//!
//! A script is a JSON document that declares kernel arguments and then lists
//! lowering calls in order. Each step names an operation, the values it
//! consumes, the name bound to its result, and any attributes:
//!
//! ```json
//! {
//!   "name": "scale",
//!   "args": [{ "name": "x_ptr", "type": "*fp32" }],
//!   "steps": [
//!     { "op": "arange", "start": 0, "end": 128, "out": "offs" },
//!     { "op": "add", "args": ["x_ptr", "offs"], "out": "ptrs" },
//!     { "op": "load", "args": ["ptrs"], "cache_modifier": ".cg", "out": "x" }
//!   ]
//! }
//! ```
//!
//! A step may carry a `span` (`{"start": 10, "end": 14}`) pointing into the
//! optional `source` text; errors from that step are reported against it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::LoweringOptions;
use crate::error::CompileError;
use crate::ir::{Constant, IrBuilder, MathFn, Value};
use crate::lower::{Comparison, LoadFlags, Lowerer, ReduceKind};
use crate::span::Span;
use crate::types::{BlockType, ScalarKind};
use crate::util::{find_similar_name, format_suggestion_hint, suggestion_threshold};

// ============================================================================
// Script format
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default = "default_kernel_name")]
    pub name: String,
    /// Kernel source the step spans point into
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_kernel_name() -> String {
    "kernel".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: BlockType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub op: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub out: Option<String>,
    #[serde(default)]
    pub span: Option<Span>,
    /// Operation-specific attributes (`axis`, `shape`, `kind`, ...)
    #[serde(flatten)]
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

/// Every operation a step may name
pub const OPS: &[&str] = &[
    "add", "sub", "mul", "truediv", "fdiv", "floordiv", "mod", "umulhi", "and", "or", "xor",
    "shl", "lshr", "gt", "ge", "lt", "le", "eq", "ne", "plus", "minus", "invert", "cast",
    "bitcast", "broadcast_to", "load", "store", "atomic_add", "atomic_and", "atomic_or",
    "atomic_xor", "atomic_xchg", "atomic_max", "atomic_min", "atomic_cas", "min", "max", "sum",
    "xor_sum", "program_id", "num_programs", "arange", "zeros", "full", "reshape", "cat",
    "where", "dot", "exp", "log", "cos", "sin", "sqrt", "multiple_of", "max_contiguous",
    "debug_barrier",
];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),

    #[error("step {step}: unknown op `{op}`{hint}")]
    UnknownOp { step: usize, op: String, hint: String },

    #[error("step {step}: unknown value `{name}`{hint}")]
    UnknownValue {
        step: usize,
        name: String,
        hint: String,
    },

    #[error("step {step} ({op}): {message}")]
    BadStep {
        step: usize,
        op: String,
        message: String,
    },

    #[error("step {step}: {source}")]
    Compile {
        step: usize,
        #[source]
        source: CompileError,
    },
}

impl ScriptError {
    /// The lowering error behind this failure, if any
    pub fn compile_error(&self) -> Option<&CompileError> {
        match self {
            ScriptError::Compile { source, .. } => Some(source),
            _ => None,
        }
    }
}

type StepResult<T> = std::result::Result<T, ScriptError>;

impl Script {
    pub fn from_json(text: &str) -> StepResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> StepResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Replay every step into a fresh builder
    pub fn lower(&self, options: LoweringOptions) -> StepResult<IrBuilder> {
        let mut builder = IrBuilder::new(self.name.clone());
        let mut env = HashMap::new();
        for arg in &self.args {
            let value = builder.argument(arg.name.clone(), arg.ty.clone());
            env.insert(arg.name.clone(), value);
        }
        log::debug!(
            "lowering script @{}: {} argument(s), {} step(s)",
            self.name,
            self.args.len(),
            self.steps.len()
        );

        let mut lowerer = Lowerer::new(&mut builder, options);
        for (index, step) in self.steps.iter().enumerate() {
            let ctx = StepContext { index, step, env: &env };
            let result = ctx.apply(&mut lowerer).map_err(|e| match e {
                ScriptError::Compile { step, source } => ScriptError::Compile {
                    step,
                    source: match ctx.step.span {
                        Some(span) => source.with_span(span),
                        None => source,
                    },
                },
                other => other,
            })?;
            if let (Some(name), Some(value)) = (&step.out, result) {
                log::trace!("{name} = {} : {}", value.id, value.ty);
                env.insert(name.clone(), value);
            }
        }
        Ok(builder)
    }
}

// ============================================================================
// Step replay
// ============================================================================

struct StepContext<'s> {
    index: usize,
    step: &'s Step,
    env: &'s HashMap<String, Value>,
}

impl StepContext<'_> {
    fn bad(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::BadStep {
            step: self.index,
            op: self.step.op.clone(),
            message: message.into(),
        }
    }

    fn compile(&self, source: CompileError) -> ScriptError {
        ScriptError::Compile {
            step: self.index,
            source,
        }
    }

    fn value(&self, name: &str) -> StepResult<Value> {
        self.env.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.env.keys().map(String::as_str).collect();
            let suggestion = find_similar_name(name, &known, suggestion_threshold(name));
            ScriptError::UnknownValue {
                step: self.index,
                name: name.to_string(),
                hint: format_suggestion_hint(suggestion),
            }
        })
    }

    /// Resolve between `min` and `max` positional arguments
    fn operands(&self, min: usize, max: usize) -> StepResult<Vec<Value>> {
        let count = self.step.args.len();
        if count < min || count > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(self.bad(format!("expected {expected} argument(s), got {count}")));
        }
        self.step.args.iter().map(|name| self.value(name)).collect()
    }

    fn unary(&self) -> StepResult<Value> {
        let mut args = self.operands(1, 1)?;
        Ok(args.remove(0))
    }

    fn binary(&self) -> StepResult<(Value, Value)> {
        let mut args = self.operands(2, 2)?.into_iter();
        match (args.next(), args.next()) {
            (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
            _ => Err(self.bad("expected 2 arguments")),
        }
    }

    fn attr<T: DeserializeOwned>(&self, key: &str) -> StepResult<Option<T>> {
        self.step
            .attrs
            .get(key)
            .map(|raw| {
                serde_json::from_value(raw.clone())
                    .map_err(|e| self.bad(format!("invalid attribute `{key}`: {e}")))
            })
            .transpose()
    }

    fn required<T: DeserializeOwned>(&self, key: &str) -> StepResult<T> {
        self.attr(key)?
            .ok_or_else(|| self.bad(format!("missing attribute `{key}`")))
    }

    fn constant(&self) -> StepResult<Constant> {
        match self.step.attrs.get("value") {
            Some(serde_json::Value::Bool(b)) => Ok(Constant::Bool(*b)),
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(Constant::Int(i)),
                None => n
                    .as_f64()
                    .map(Constant::Float)
                    .ok_or_else(|| self.bad(format!("constant {n} is out of range"))),
            },
            Some(other) => Err(self.bad(format!("invalid constant {other}"))),
            None => Err(self.bad("missing attribute `value`")),
        }
    }

    fn apply(&self, lw: &mut Lowerer<'_>) -> StepResult<Option<Value>> {
        let op = self.step.op.as_str();
        log::trace!("step {}: {op} {:?}", self.index, self.step.args);
        let lowered: crate::error::Result<Option<Value>> = match op {
            "add" | "sub" | "mul" | "truediv" | "floordiv" | "mod" | "umulhi" | "and" | "or"
            | "xor" | "shl" | "lshr" => {
                let (lhs, rhs) = self.binary()?;
                match op {
                    "add" => lw.add(lhs, rhs),
                    "sub" => lw.sub(lhs, rhs),
                    "mul" => lw.mul(lhs, rhs),
                    "truediv" => lw.truediv(lhs, rhs),
                    "floordiv" => lw.floordiv(lhs, rhs),
                    "mod" => lw.rem(lhs, rhs),
                    "umulhi" => lw.umulhi(lhs, rhs),
                    "and" => lw.and(lhs, rhs),
                    "or" => lw.or(lhs, rhs),
                    "xor" => lw.xor(lhs, rhs),
                    "shl" => lw.shl(lhs, rhs),
                    _ => lw.lshr(lhs, rhs),
                }
                .map(Some)
            }
            "fdiv" => {
                let (lhs, rhs) = self.binary()?;
                let ieee = self
                    .attr("ieee_rounding")?
                    .unwrap_or(lw.options().ieee_rounding);
                lw.fdiv(lhs, rhs, ieee).map(Some)
            }
            "gt" | "ge" | "lt" | "le" | "eq" | "ne" => {
                let (lhs, rhs) = self.binary()?;
                let cmp = match op {
                    "gt" => Comparison::Gt,
                    "ge" => Comparison::Ge,
                    "lt" => Comparison::Lt,
                    "le" => Comparison::Le,
                    "eq" => Comparison::Eq,
                    _ => Comparison::Ne,
                };
                lw.compare(cmp, lhs, rhs).map(Some)
            }
            "plus" => lw.plus(self.unary()?).map(Some),
            "minus" => lw.minus(self.unary()?).map(Some),
            "invert" => lw.invert(self.unary()?).map(Some),
            "cast" | "bitcast" => {
                let input = self.unary()?;
                let to: ScalarKind = self.required("to")?;
                if op == "cast" {
                    lw.cast(input, &to).map(Some)
                } else {
                    lw.bitcast(input, &to).map(Some)
                }
            }
            "broadcast_to" => {
                let input = self.unary()?;
                let shape: Vec<usize> = self.required("shape")?;
                lw.broadcast_to_shape(input, &shape).map(Some)
            }
            "load" => {
                let mut args = self.operands(1, 3)?.into_iter();
                let (ptr, mask, other) = (args.next(), args.next(), args.next());
                let ptr = ptr.ok_or_else(|| self.bad("missing pointer"))?;
                let cache: Option<String> = self.attr("cache_modifier")?;
                let eviction: Option<String> = self.attr("eviction_policy")?;
                let flags = LoadFlags {
                    cache_modifier: cache.as_deref(),
                    eviction_policy: eviction.as_deref(),
                    volatile: self.attr("volatile")?.unwrap_or(false),
                };
                lw.load(ptr, mask, other, flags).map(Some)
            }
            "store" => {
                let mut args = self.operands(2, 3)?.into_iter();
                match (args.next(), args.next()) {
                    (Some(ptr), Some(value)) => lw.store(ptr, value, args.next()).map(|()| None),
                    _ => return Err(self.bad("expected pointer and value")),
                }
            }
            "atomic_add" | "atomic_and" | "atomic_or" | "atomic_xor" | "atomic_xchg"
            | "atomic_max" | "atomic_min" => {
                let mut args = self.operands(2, 3)?.into_iter();
                let (ptr, value, mask) = match (args.next(), args.next()) {
                    (Some(ptr), Some(value)) => (ptr, value, args.next()),
                    _ => return Err(self.bad("expected pointer and value")),
                };
                match op {
                    "atomic_add" => lw.atomic_add(ptr, value, mask),
                    "atomic_and" => lw.atomic_and(ptr, value, mask),
                    "atomic_or" => lw.atomic_or(ptr, value, mask),
                    "atomic_xor" => lw.atomic_xor(ptr, value, mask),
                    "atomic_xchg" => lw.atomic_xchg(ptr, value, mask),
                    "atomic_max" => lw.atomic_max(ptr, value, mask),
                    _ => lw.atomic_min(ptr, value, mask),
                }
                .map(Some)
            }
            "atomic_cas" => {
                let mut args = self.operands(3, 3)?.into_iter();
                match (args.next(), args.next(), args.next()) {
                    (Some(ptr), Some(cmp), Some(value)) => lw.atomic_cas(ptr, cmp, value).map(Some),
                    _ => return Err(self.bad("expected pointer, comparand and value")),
                }
            }
            "min" | "max" | "sum" | "xor_sum" => {
                let input = self.unary()?;
                let axis: usize = self.required("axis")?;
                let kind = match op {
                    "min" => ReduceKind::Min,
                    "max" => ReduceKind::Max,
                    "sum" => ReduceKind::Sum,
                    _ => ReduceKind::XorSum,
                };
                lw.reduce(input, axis, kind).map(Some)
            }
            "program_id" | "num_programs" => {
                self.operands(0, 0)?;
                let axis: u32 = self.required("axis")?;
                if op == "program_id" {
                    lw.program_id(axis).map(Some)
                } else {
                    lw.num_programs(axis).map(Some)
                }
            }
            "arange" => {
                self.operands(0, 0)?;
                lw.arange(self.required("start")?, self.required("end")?).map(Some)
            }
            "zeros" | "full" => {
                self.operands(0, 0)?;
                let shape: Vec<usize> = self.required("shape")?;
                let kind: ScalarKind = self.required("kind")?;
                if op == "zeros" {
                    lw.zeros(&shape, kind).map(Some)
                } else {
                    lw.full(&shape, kind, self.constant()?).map(Some)
                }
            }
            "reshape" => {
                let input = self.unary()?;
                let shape: Vec<usize> = self.required("shape")?;
                lw.reshape(input, &shape).map(Some)
            }
            "cat" => {
                let (lhs, rhs) = self.binary()?;
                lw.cat(lhs, rhs).map(Some)
            }
            "where" => {
                let mut args = self.operands(3, 3)?.into_iter();
                match (args.next(), args.next(), args.next()) {
                    (Some(cond), Some(x), Some(y)) => lw.where_(cond, x, y).map(Some),
                    _ => return Err(self.bad("expected condition and two values")),
                }
            }
            "dot" => {
                let (lhs, rhs) = self.binary()?;
                lw.dot(lhs, rhs, self.attr("allow_tf32")?).map(Some)
            }
            "exp" | "log" | "cos" | "sin" | "sqrt" => {
                let func = match op {
                    "exp" => MathFn::Exp,
                    "log" => MathFn::Log,
                    "cos" => MathFn::Cos,
                    "sin" => MathFn::Sin,
                    _ => MathFn::Sqrt,
                };
                lw.math(func, self.unary()?).map(Some)
            }
            "multiple_of" | "max_contiguous" => {
                let input = self.unary()?;
                let n: u32 = self.required("n")?;
                if op == "multiple_of" {
                    lw.multiple_of(input, n).map(Some)
                } else {
                    lw.max_contiguous(input, n).map(Some)
                }
            }
            "debug_barrier" => {
                self.operands(0, 0)?;
                lw.debug_barrier();
                Ok(None)
            }
            unknown => {
                let suggestion = find_similar_name(unknown, OPS, suggestion_threshold(unknown));
                return Err(ScriptError::UnknownOp {
                    step: self.index,
                    op: unknown.to_string(),
                    hint: format_suggestion_hint(suggestion),
                });
            }
        };
        lowered.map_err(|e| self.compile(e))
    }
}
