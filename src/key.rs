//! Service keys: the identity components are registered and requested under.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased, hashable, equality-comparable value used to discriminate
/// between several registrations of the same service type (keyed services).
pub trait AnyKey: Any + Send + Sync + fmt::Debug {
    fn eq_any(&self, other: &dyn AnyKey) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> AnyKey for T
where
    T: Any + Send + Sync + Eq + Hash + fmt::Debug,
{
    fn eq_any(&self, other: &dyn AnyKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|o| self == o)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }
}

/// A cloneable, type-erased key value. Two `KeyValue`s are equal iff their
/// underlying concrete types and values are equal.
#[derive(Clone)]
pub struct KeyValue(Arc<dyn AnyKey>);

impl KeyValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + Eq + Hash + fmt::Debug,
    {
        Self(Arc::new(value))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_any(&*other.0)
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Discriminates between the inner (undecorated) and outer (decorated) view
/// of a service during decorator resolution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DecoratorRole {
    /// The plain, undecorated target a decorator's own activator resolves.
    Target,
}

/// The closed identity a component is registered or requested under.
///
/// `ServiceKey` is the unit of lookup for [`crate::registry::Registry`]: every
/// registration advertises one or more of these, and every resolve request
/// names exactly one.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ServiceKey {
    /// A plain `T`, identified by type alone.
    Typed {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// A `T` qualified by an opaque, equality-comparable key value.
    Keyed {
        type_id: TypeId,
        type_name: &'static str,
        key: KeyValue,
    },
    /// The decorator-visible view of a service, distinguished from its plain
    /// form by a role discriminator so decorated and undecorated lookups
    /// never collide in the registry.
    Decorator {
        type_id: TypeId,
        type_name: &'static str,
        role: DecoratorRole,
    },
}

impl ServiceKey {
    pub fn typed<T: 'static>() -> Self {
        Self::Typed {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub fn keyed<T: 'static>(key: KeyValue) -> Self {
        Self::Keyed {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            key,
        }
    }

    pub fn decorator_target<T: 'static>() -> Self {
        Self::Decorator {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            role: DecoratorRole::Target,
        }
    }

    /// Returns `self`. Kept as the registry's normalization seam: callers
    /// that index by identity go through `bare()` rather than matching
    /// `ServiceKey` directly, so a future wrapper variant wouldn't need to
    /// touch every call site.
    pub fn bare(&self) -> &ServiceKey {
        self
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Typed { type_id, .. }
            | Self::Keyed { type_id, .. }
            | Self::Decorator { type_id, .. } => *type_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Typed { type_name, .. }
            | Self::Keyed { type_name, .. }
            | Self::Decorator { type_name, .. } => type_name,
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed { type_name, .. } => write!(f, "{type_name}"),
            Self::Keyed { type_name, key, .. } => write!(f, "{type_name}[{key:?}]"),
            Self::Decorator { type_name, .. } => write!(f, "decorator<{type_name}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_keys_compare_by_type_only() {
        let a = ServiceKey::typed::<u32>();
        let b = ServiceKey::typed::<u32>();
        assert_eq!(a, b);
        assert_ne!(a, ServiceKey::typed::<u64>());
    }

    #[test]
    fn keyed_services_with_different_key_values_are_distinct() {
        let a = ServiceKey::keyed::<u32>(KeyValue::new("primary"));
        let b = ServiceKey::keyed::<u32>(KeyValue::new("secondary"));
        assert_ne!(a, b);
        assert_eq!(a, ServiceKey::keyed::<u32>(KeyValue::new("primary")));
    }

    #[test]
    fn keyed_and_typed_are_distinct_even_for_same_type() {
        let typed = ServiceKey::typed::<u32>();
        let keyed = ServiceKey::keyed::<u32>(KeyValue::new(1u32));
        assert_ne!(typed, keyed);
    }

    #[test]
    fn decorator_view_is_distinct_from_plain_service() {
        let plain = ServiceKey::typed::<u32>();
        let decorator = ServiceKey::decorator_target::<u32>();
        assert_ne!(plain, decorator);
    }

    #[test]
    fn bare_is_the_identity() {
        let plain = ServiceKey::typed::<u32>();
        assert_eq!(plain.bare(), &plain);
    }
}
