//! Splat and broadcast

use super::Lowerer;
use crate::error::{CompileError, Result};
use crate::ir::{InstKind, Value};
use crate::types::{BlockType, shape_compatible};

/// Check that a value of shape `src` can be broadcast to `target`
pub(crate) fn check_broadcast_to_shape(src: &[usize], target: &[usize]) -> Result<()> {
    if src.is_empty() {
        return Ok(());
    }
    if src.len() != target.len() {
        return Err(CompileError::shape_error(
            "broadcast",
            format!("cannot broadcast, rank mismatch: {src:?}, {target:?}"),
            None,
        ));
    }
    for (axis, (&have, &want)) in src.iter().zip(target).enumerate() {
        if have != want && have != 1 {
            return Err(CompileError::shape_error(
                "broadcast",
                format!(
                    "cannot broadcast, the expanded size ({want}) must match the existing size \
                     ({have}) at non-singleton dimension {axis}: {src:?}, {target:?}"
                ),
                Some(axis),
            ));
        }
    }
    Ok(())
}

impl Lowerer<'_> {
    /// Bring two operands to a common shape.
    ///
    /// A scalar is splatted to the other operand's shape, keeping its own
    /// element kind. Two blocks must have equal rank; size-1 axes stretch.
    pub fn broadcast_value(&mut self, lhs: Value, rhs: Value) -> Result<(Value, Value)> {
        match (lhs.ty.is_block(), rhs.ty.is_block()) {
            (false, false) => Ok((lhs, rhs)),
            (true, false) => {
                let shape = lhs.shape().to_vec();
                let rhs = self.splat(rhs, shape);
                Ok((lhs, rhs))
            }
            (false, true) => {
                let shape = rhs.shape().to_vec();
                let lhs = self.splat(lhs, shape);
                Ok((lhs, rhs))
            }
            (true, true) => {
                if lhs.shape() == rhs.shape() {
                    return Ok((lhs, rhs));
                }
                let shape = shape_compatible(lhs.shape(), rhs.shape())?;
                let lhs = self.expand(lhs, &shape);
                let rhs = self.expand(rhs, &shape);
                Ok((lhs, rhs))
            }
        }
    }

    /// Splat a scalar or broadcast a block to an explicit shape
    pub fn broadcast_to_shape(&mut self, value: Value, shape: &[usize]) -> Result<Value> {
        if value.shape() == shape {
            return Ok(value);
        }
        check_broadcast_to_shape(value.shape(), shape)?;
        if value.ty.is_block() {
            Ok(self.expand(value, shape))
        } else {
            Ok(self.splat(value, shape.to_vec()))
        }
    }

    fn splat(&mut self, value: Value, shape: Vec<usize>) -> Value {
        let ty = BlockType::new(value.element().clone(), shape);
        log::trace!("splat {} to {ty}", value.id);
        self.emit(InstKind::Splat { src: value.id }, ty)
    }

    /// Broadcast a block whose shape is already known to be compatible
    fn expand(&mut self, value: Value, shape: &[usize]) -> Value {
        if value.shape() == shape {
            return value;
        }
        let ty = value.ty.with_shape(shape.to_vec());
        log::trace!("broadcast {} to {ty}", value.id);
        self.emit(InstKind::Broadcast { src: value.id }, ty)
    }
}
