//! Shape rules for broadcasting

use crate::error::{CompileError, Result};

/// Number of elements in a block of this shape (1 for a scalar)
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Resolve the common shape of two equal-rank shapes.
///
/// Per axis a size of 1 stretches to the other side's size; any other
/// mismatch is an error naming the axis and both sizes.
pub fn shape_compatible(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    if lhs.len() != rhs.len() {
        return Err(CompileError::shape_error(
            "broadcast",
            format!(
                "blocks must have the same rank, got {:?} (rank {}) and {:?} (rank {})",
                lhs,
                lhs.len(),
                rhs,
                rhs.len()
            ),
            None,
        ));
    }
    lhs.iter()
        .zip(rhs)
        .enumerate()
        .map(|(axis, (&left, &right))| match (left, right) {
            (1, other) | (other, 1) => Ok(other),
            (left, right) if left == right => Ok(left),
            (left, right) => Err(CompileError::shape_error(
                "broadcast",
                format!("incompatible dimensions at index {axis}: {left} and {right}"),
                Some(axis),
            )),
        })
        .collect()
}
