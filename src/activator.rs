//! The activator: the opaque `(context, parameters) -> instance` step at the
//! bottom of a registration's pipeline.

use crate::error::Result;
use crate::operation::ResolveRequestContext;
use crate::parameter::Parameter;
use std::any::Any;
use std::sync::Arc;

/// A type-erased, reference-counted instance produced by an activator.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Produces one instance of a component. An activator does not see the
/// registry or the scope tree directly — only the request context (for
/// nested `resolve` calls) and the parameters selected upstream of it.
pub trait Activator: Send + Sync {
    fn activate(
        &self,
        ctx: &ResolveRequestContext,
        parameters: &[Arc<dyn Parameter>],
    ) -> Result<AnyArc>;

    /// A short label used in diagnostics and `Debug` output.
    fn description(&self) -> &str {
        "activator"
    }
}

impl<F> Activator for F
where
    F: Fn(&ResolveRequestContext, &[Arc<dyn Parameter>]) -> Result<AnyArc> + Send + Sync,
{
    fn activate(
        &self,
        ctx: &ResolveRequestContext,
        parameters: &[Arc<dyn Parameter>],
    ) -> Result<AnyArc> {
        (self)(ctx, parameters)
    }
}

/// Builds an activator from a plain `Fn() -> T` constructor, ignoring
/// parameters and the request context entirely. The common case for
/// components with no dependencies.
pub fn from_fn<T, F>(f: F) -> Arc<dyn Activator>
where
    T: Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Arc::new(move |_ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| {
        Ok(Arc::new(f()) as AnyArc)
    })
}

/// Builds an activator around an existing instance, for `register_instance`
/// style registrations that skip activation entirely.
pub fn from_instance<T>(value: T) -> Arc<dyn Activator>
where
    T: Send + Sync + 'static,
{
    let instance: AnyArc = Arc::new(value);
    Arc::new(move |_ctx: &ResolveRequestContext, _params: &[Arc<dyn Parameter>]| {
        Ok(Arc::clone(&instance))
    })
}
