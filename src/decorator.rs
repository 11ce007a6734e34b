//! Decorators: wrap an already-activated instance without the wrapped
//! registration knowing it happened.

use crate::activator::AnyArc;
use crate::error::Result;
use crate::operation::ResolveRequestContext;
use std::fmt;
use std::sync::Arc;

/// A function that wraps an already-produced instance. Runs once per
/// resolve, after the wrapped registration's own pipeline has produced
/// `inner` (whether fresh or from a shared cache) — decoration is never
/// itself cached.
pub trait Decorator: Send + Sync {
    fn wrap(&self, inner: AnyArc, ctx: &ResolveRequestContext) -> Result<AnyArc>;
}

impl<F> Decorator for F
where
    F: Fn(AnyArc, &ResolveRequestContext) -> Result<AnyArc> + Send + Sync,
{
    fn wrap(&self, inner: AnyArc, ctx: &ResolveRequestContext) -> Result<AnyArc> {
        (self)(inner, ctx)
    }
}

/// A decorator registered for every component advertising a given service.
/// Decorators apply in registration order: the most-recently-registered
/// decorator wraps outermost, since each wraps the output of the one before
/// it.
pub struct DecoratorRegistration {
    decorator: Arc<dyn Decorator>,
    description: &'static str,
}

impl DecoratorRegistration {
    pub fn new(description: &'static str, decorator: Arc<dyn Decorator>) -> Self {
        Self {
            decorator,
            description,
        }
    }

    pub fn wrap(&self, inner: AnyArc, ctx: &ResolveRequestContext) -> Result<AnyArc> {
        self.decorator.wrap(inner, ctx)
    }
}

impl fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorRegistration")
            .field("description", &self.description)
            .finish()
    }
}

/// Builds a [`Decorator`] that downcasts `inner` to `T`, applies `f`, and
/// re-boxes the result as `Arc<T>`. The common case for typed decorators.
pub fn typed<T, F>(f: F) -> Arc<dyn Decorator>
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, &ResolveRequestContext) -> T + Send + Sync + 'static,
{
    Arc::new(move |inner: AnyArc, ctx: &ResolveRequestContext| -> Result<AnyArc> {
        let typed = inner.downcast::<T>().map_err(|_| {
            crate::error::DiError::internal("decorator received an instance of the wrong type")
        })?;
        Ok(Arc::new(f(typed, ctx)) as AnyArc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_decorator_wraps_matching_instance() {
        let deco = typed::<String, _>(|inner, _ctx| format!("[{inner}]"));
        let scope = crate::scope::tests_support::test_root_scope();
        let op = crate::operation::ResolveOperation::new(std::sync::Arc::new(
            crate::diagnostics::NoopDiagnostics,
        ));
        let reg = crate::registration::ComponentRegistration::builder(crate::activator::from_fn(
            || String::new(),
        ))
        .build();
        let ctx = ResolveRequestContext::new(
            op,
            scope,
            crate::key::ServiceKey::typed::<String>(),
            Arc::new(reg),
            Vec::new(),
        );
        let inner: AnyArc = Arc::new("hello".to_string());
        let wrapped = deco.wrap(inner, &ctx).unwrap();
        assert_eq!(*wrapped.downcast::<String>().unwrap(), "[hello]");
    }
}
