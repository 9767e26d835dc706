//! Implicit conversions
//!
//! Integer promotion and the computation type of a binary operation follow
//! C's "usual arithmetic conversions" in a simplified form. Every arithmetic,
//! comparison and bitwise lowering asks [`computation_type`] which kind both
//! operands are converted to.

use super::{ScalarKind, Signedness};
use crate::error::{CompileError, Result};

/// Pick the integer kind two integer operands are promoted to.
///
/// Equal signedness keeps the wider operand. With mixed signedness the
/// unsigned operand wins when it is at least as wide as the signed one,
/// otherwise the signed operand wins.
pub fn integer_promote(a: &ScalarKind, b: &ScalarKind) -> Result<ScalarKind> {
    let (Some(a_rank), Some(b_rank)) = (a.int_bitwidth(), b.int_bitwidth()) else {
        return Err(CompileError::internal(
            "integer_promote",
            format!("integer promotion of non-integer kinds {a} and {b}"),
        ));
    };
    let promoted = match (a.int_signedness(), b.int_signedness()) {
        (sa, sb) if sa == sb => {
            if a_rank > b_rank {
                a
            } else {
                b
            }
        }
        (Some(Signedness::Unsigned), _) => {
            if a_rank >= b_rank {
                a
            } else {
                b
            }
        }
        (_, Some(Signedness::Unsigned)) => {
            if b_rank >= a_rank {
                b
            } else {
                a
            }
        }
        _ => {
            return Err(CompileError::internal(
                "integer_promote",
                format!("no promotion rule for {a} and {b}"),
            ));
        }
    };
    Ok(promoted.clone())
}

/// Resolve the kind both operands of an arithmetic operation are cast into.
///
/// `div_or_mod` marks `/`, `//` and `%`: fp16 has no native divide or
/// remainder so it computes in fp32, and integers of different signedness are
/// rejected.
pub fn computation_type(a: &ScalarKind, b: &ScalarKind, div_or_mod: bool) -> Result<ScalarKind> {
    if a.is_fp64() || b.is_fp64() {
        return Ok(ScalarKind::F64);
    }
    if a.is_fp32() || b.is_fp32() {
        return Ok(ScalarKind::F32);
    }
    if a.is_fp16() || b.is_fp16() {
        return Ok(if div_or_mod {
            ScalarKind::F32
        } else {
            ScalarKind::F16
        });
    }
    if !a.is_int() || !b.is_int() {
        return Err(CompileError::type_error(
            "computation_type",
            format!("no arithmetic computation type for {a} and {b}"),
        ));
    }
    if div_or_mod && a.int_signedness() != b.int_signedness() {
        return Err(CompileError::type_error(
            "computation_type",
            format!(
                "cannot use /, // or % with {a} and {b} because they have different signedness; \
                 cast them to the same signedness"
            ),
        ));
    }
    integer_promote(a, b)
}
