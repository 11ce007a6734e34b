//! Parameters: named, positional, or typed values an activator can ask for.

use crate::activator::AnyArc;
use crate::operation::ResolveRequestContext;
use std::any::TypeId;
use std::sync::Arc;

/// Describes one value an activator would like supplied, without committing
/// to how it is obtained. Built-in activators generated by the derive macro
/// emit one descriptor per annotated field.
#[derive(Clone, Copy, Debug)]
pub struct ParameterDescriptor {
    pub name: Option<&'static str>,
    pub position: Option<usize>,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ParameterDescriptor {
    pub fn named<T: 'static>(name: &'static str) -> Self {
        Self {
            name: Some(name),
            position: None,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn positional<T: 'static>(position: usize) -> Self {
        Self {
            name: None,
            position: Some(position),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// A thunk producing a boxed value; evaluated only if the parameter is
/// actually used by the activator.
pub type LazyValue = Arc<dyn Fn() -> AnyArc + Send + Sync>;

/// Something that can supply a value for a subset of an activator's
/// parameter list.
pub trait Parameter: Send + Sync + 'static {
    /// Returns a lazy value if this parameter can satisfy `descriptor`.
    fn can_supply_value(
        &self,
        descriptor: &ParameterDescriptor,
        ctx: &ResolveRequestContext,
    ) -> Option<LazyValue>;
}

/// Supplies a value for a parameter matched by name.
pub struct NamedParameter {
    name: &'static str,
    value: AnyArc,
}

impl NamedParameter {
    pub fn new<T: Send + Sync + 'static>(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: Arc::new(value),
        }
    }
}

impl Parameter for NamedParameter {
    fn can_supply_value(
        &self,
        descriptor: &ParameterDescriptor,
        _ctx: &ResolveRequestContext,
    ) -> Option<LazyValue> {
        if descriptor.name == Some(self.name) {
            let value = Arc::clone(&self.value);
            Some(Arc::new(move || Arc::clone(&value)))
        } else {
            None
        }
    }
}

/// Supplies a value for a parameter matched by constructor position.
pub struct PositionalParameter {
    position: usize,
    value: AnyArc,
}

impl PositionalParameter {
    pub fn new<T: Send + Sync + 'static>(position: usize, value: T) -> Self {
        Self {
            position,
            value: Arc::new(value),
        }
    }
}

impl Parameter for PositionalParameter {
    fn can_supply_value(
        &self,
        descriptor: &ParameterDescriptor,
        _ctx: &ResolveRequestContext,
    ) -> Option<LazyValue> {
        if descriptor.position == Some(self.position) {
            let value = Arc::clone(&self.value);
            Some(Arc::new(move || Arc::clone(&value)))
        } else {
            None
        }
    }
}

/// Supplies a value for any parameter of a matching type, regardless of name
/// or position.
pub struct TypedParameter {
    type_id: TypeId,
    value: AnyArc,
}

impl TypedParameter {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            value: Arc::new(value),
        }
    }
}

impl Parameter for TypedParameter {
    fn can_supply_value(
        &self,
        descriptor: &ParameterDescriptor,
        _ctx: &ResolveRequestContext,
    ) -> Option<LazyValue> {
        if descriptor.type_id == self.type_id {
            let value = Arc::clone(&self.value);
            Some(Arc::new(move || Arc::clone(&value)))
        } else {
            None
        }
    }
}

/// Resolves the first matching value for `descriptor` out of `parameters`,
/// in order. Later parameters in the list take precedence over earlier ones,
/// mirroring registration override semantics (most specific wins).
pub fn resolve_value(
    parameters: &[Arc<dyn Parameter>],
    descriptor: &ParameterDescriptor,
    ctx: &ResolveRequestContext,
) -> Option<AnyArc> {
    parameters
        .iter()
        .rev()
        .find_map(|p| p.can_supply_value(descriptor, ctx))
        .map(|lazy| lazy())
}
