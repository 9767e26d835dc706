//! Load and store lowering
//!
//! Bool pointees are one byte in memory: loads and stores go through an
//! `*int8` pointer in the same address space and convert at the boundary.

use super::Lowerer;
use super::broadcast::check_broadcast_to_shape;
use crate::error::{CompileError, Result};
use crate::ir::{CacheModifier, Constant, EvictionPolicy, InstKind, Value};
use crate::types::{BlockType, ScalarKind};
use crate::util::{find_similar_name, format_suggestion_hint, suggestion_threshold};

const CACHE_MODIFIERS: &[&str] = &[".ca", ".cg"];
const EVICTION_POLICIES: &[&str] = &["evict_last", "evict_first"];

/// Parse a cache modifier; `None` and `""` mean no modifier
pub fn parse_cache_modifier(text: Option<&str>) -> Result<CacheModifier> {
    match text.unwrap_or("") {
        "" => Ok(CacheModifier::None),
        ".ca" => Ok(CacheModifier::Ca),
        ".cg" => Ok(CacheModifier::Cg),
        other => Err(unsupported("cache modifier", other, CACHE_MODIFIERS)),
    }
}

/// Parse an eviction policy; `None` and `""` mean the default policy
pub fn parse_eviction_policy(text: Option<&str>) -> Result<EvictionPolicy> {
    match text.unwrap_or("") {
        "" => Ok(EvictionPolicy::Normal),
        "evict_last" => Ok(EvictionPolicy::EvictLast),
        "evict_first" => Ok(EvictionPolicy::EvictFirst),
        other => Err(unsupported("eviction policy", other, EVICTION_POLICIES)),
    }
}

fn unsupported(what: &str, value: &str, known: &[&str]) -> CompileError {
    let hint = format_suggestion_hint(find_similar_name(value, known, suggestion_threshold(value)));
    CompileError::value_error("load", format!("{what} `{value}` not supported{hint}"))
}

/// Options of a load besides its operands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadFlags<'s> {
    pub cache_modifier: Option<&'s str>,
    pub eviction_policy: Option<&'s str>,
    pub volatile: bool,
}

fn pointee_of(op: &'static str, ptr: &Value) -> Result<ScalarKind> {
    match ptr.element().pointee() {
        Some(pointee) => Ok(pointee.clone()),
        None => Err(CompileError::type_error(
            op,
            format!("pointer argument of {op} instruction is {}", ptr.ty),
        )),
    }
}

pub(crate) fn check_mask(op: &'static str, mask: &Value) -> Result<()> {
    if !mask.element().is_bool() {
        return Err(CompileError::type_error(
            op,
            format!("mask must have boolean element type, got {}", mask.ty),
        ));
    }
    Ok(())
}

impl Lowerer<'_> {
    /// Bitcast a bool pointer to an int8 pointer in the same address space
    fn physical_ptr(&mut self, ptr: Value) -> Result<Value> {
        let space = ptr.element().address_space().unwrap_or(crate::types::GLOBAL_ADDRESS_SPACE);
        self.cast(ptr, &ScalarKind::ptr_in(ScalarKind::I8, space))
    }

    /// Load through `ptr`.
    ///
    /// With a mask, masked-out lanes take `other`, or an undefined value when
    /// no fill is given. A fill without a mask is an error.
    pub fn load(
        &mut self,
        ptr: Value,
        mask: Option<Value>,
        other: Option<Value>,
        flags: LoadFlags<'_>,
    ) -> Result<Value> {
        log::debug!("load {}", ptr.ty);
        let pointee = pointee_of("load", &ptr)?;
        let cache = parse_cache_modifier(flags.cache_modifier)?;
        let eviction = parse_eviction_policy(flags.eviction_policy)?;
        if other.is_some() && mask.is_none() {
            return Err(CompileError::value_error(
                "load",
                "`other` (fill) cannot be provided without `mask`",
            ));
        }
        let shape = ptr.shape().to_vec();
        if let Some(mask) = &mask {
            check_mask("load", mask)?;
            check_broadcast_to_shape(mask.shape(), &shape).map_err(|e| e.with_op("load"))?;
        }
        if let Some(other) = &other {
            check_broadcast_to_shape(other.shape(), &shape).map_err(|e| e.with_op("load"))?;
        }

        let mask = match mask {
            Some(mask) => Some(self.broadcast_to_shape(mask, &shape)?),
            None => None,
        };
        let mut other = match other {
            Some(other) => {
                let other = self.broadcast_to_shape(other, &shape)?;
                Some(self.cast(other, &pointee).map_err(|e| e.with_op("load"))?)
            }
            None => None,
        };

        let is_bool = pointee.is_bool();
        let (ptr, elem) = if is_bool {
            (self.physical_ptr(ptr)?, ScalarKind::I8)
        } else {
            (ptr, pointee.clone())
        };
        if let Some(fill) = other.take() {
            other = Some(self.cast(fill, &elem)?);
        }
        let ty = BlockType::new(elem, shape);

        let loaded = match mask {
            None => self.emit(
                InstKind::Load {
                    ptr: ptr.id,
                    cache,
                    eviction,
                    volatile: flags.volatile,
                },
                ty,
            ),
            Some(mask) => {
                let other = match other {
                    Some(other) => other,
                    None => self.splat_constant(Constant::Undef, &ty),
                };
                self.emit(
                    InstKind::MaskedLoad {
                        ptr: ptr.id,
                        mask: mask.id,
                        other: other.id,
                        cache,
                        eviction,
                        volatile: flags.volatile,
                    },
                    ty,
                )
            }
        };

        if is_bool {
            self.cast(loaded, &ScalarKind::Bool)
        } else {
            Ok(loaded)
        }
    }

    /// Store `value` through `ptr`, skipping masked-out lanes
    pub fn store(&mut self, ptr: Value, value: Value, mask: Option<Value>) -> Result<()> {
        log::debug!("store {} <- {}", ptr.ty, value.ty);
        let pointee = pointee_of("store", &ptr)?;
        let shape = ptr.shape().to_vec();
        if let Some(mask) = &mask {
            check_mask("store", mask)?;
        }
        let value = self.broadcast_to_shape(value, &shape).map_err(|e| e.with_op("store"))?;
        let mask = match mask {
            Some(mask) => Some(self.broadcast_to_shape(mask, &shape).map_err(|e| e.with_op("store"))?),
            None => None,
        };

        let mut value = self.cast(value, &pointee).map_err(|e| e.with_op("store"))?;
        let ptr = if pointee.is_bool() {
            value = self.cast(value, &ScalarKind::I8)?;
            self.physical_ptr(ptr)?
        } else {
            ptr
        };

        match mask {
            None => self.emit_void(InstKind::Store {
                ptr: ptr.id,
                value: value.id,
            }),
            Some(mask) => self.emit_void(InstKind::MaskedStore {
                ptr: ptr.id,
                value: value.id,
                mask: mask.id,
            }),
        }
        Ok(())
    }
}
