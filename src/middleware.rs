//! Middleware: composable steps run at a fixed [`Phase`] of a pipeline.
//!
//! This module defines the `Middleware` trait plus the default middleware
//! that every service and registration pipeline is built with. Callers
//! extend a pipeline by adding more middleware at any of the eight phases;
//! they can never remove or reorder the defaults below.

use crate::error::Result;
use crate::operation::ResolveRequestContext;
use crate::pipeline::{Next, Phase};
use crate::registry::Registry;
use crate::scope::sharing_cache_cell;
use std::sync::Arc;

/// One step of a pipeline. `execute` runs code before calling `next` (on the
/// way in) and/or after it returns (on the way out), like any onion-style
/// middleware.
pub trait Middleware: Send + Sync {
    fn phase(&self) -> Phase;
    fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()>;
}

/// Rewrites `ctx`'s scope to the one that should own this registration's
/// shared instance, per its declared [`crate::registration::Lifetime`].
pub(crate) struct ScopeSelectionMiddleware;

impl Middleware for ScopeSelectionMiddleware {
    fn phase(&self) -> Phase {
        Phase::ScopeSelection
    }

    fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()> {
        let target = ctx.scope().target_scope_for(ctx.registration().lifetime())?;
        ctx.change_scope(target);
        next(ctx)
    }
}

/// Applies every decorator registered for the requested service to the
/// instance produced downstream, most-recently-registered wrapping
/// outermost. Runs on every resolve even when the wrapped instance itself
/// came from cache.
pub(crate) struct DecorationMiddleware {
    pub(crate) registry: Arc<Registry>,
}

impl Middleware for DecorationMiddleware {
    fn phase(&self) -> Phase {
        Phase::Decoration
    }

    fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()> {
        next(ctx)?;
        let decorators = self.registry.decorators_for(ctx.service().bare());
        if decorators.is_empty() {
            return Ok(());
        }
        let mut instance = ctx
            .instance()
            .cloned()
            .ok_or_else(|| crate::error::DiError::internal("nothing to decorate"))?;
        for decorator in decorators {
            instance = decorator.wrap(instance, ctx)?;
        }
        ctx.set_instance(instance);
        Ok(())
    }
}

/// Single-flight sharing lookup: if the registration is shared, reuses (or
/// populates, exactly once per target scope) the cache cell keyed by
/// registration identity; transient registrations pass straight through.
pub(crate) struct SharingPreparationMiddleware;

impl Middleware for SharingPreparationMiddleware {
    fn phase(&self) -> Phase {
        Phase::SharingPreparation
    }

    fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()> {
        let Some(cell) = sharing_cache_cell(ctx.scope(), ctx.registration()) else {
            return next(ctx);
        };
        if let Some(existing) = cell.get() {
            ctx.set_instance(Arc::clone(existing));
            return Ok(());
        }
        let result = cell.get_or_try_init(|| -> Result<_> {
            next(&mut *ctx)?;
            ctx.instance().cloned().ok_or_else(|| {
                crate::error::DiError::internal("activator produced no instance")
            })
        });
        match result {
            Ok(instance) => {
                ctx.set_instance(Arc::clone(instance));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Thin diagnostic hook used for phases with no structural default behavior
/// (`ResolveRequestStart`, `RegistrationPipelineStart`, `ParameterSelection`).
pub(crate) struct DiagnosticMiddleware {
    pub(crate) phase: Phase,
}

impl Middleware for DiagnosticMiddleware {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()> {
        if self.phase == Phase::ResolveRequestStart {
            ctx.diagnostics().resolve_request_starting(ctx.service());
        }
        let result = next(ctx);
        if self.phase == Phase::ResolveRequestStart {
            match &result {
                Ok(()) => ctx.diagnostics().resolve_request_succeeded(ctx.service()),
                Err(e) => ctx
                    .diagnostics()
                    .resolve_request_failed(ctx.service(), &e.to_string()),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::from_fn;
    use crate::key::ServiceKey;
    use crate::pipeline::PipelineBuilder;
    use crate::registration::ComponentRegistration;
    use crate::scope::tests_support::test_root_scope;

    fn noop_next(_ctx: &mut ResolveRequestContext) -> Result<()> {
        Ok(())
    }

    #[test]
    fn scope_selection_leaves_current_scope_for_current_scope_lifetime() {
        let scope = test_root_scope();
        let reg = Arc::new(
            ComponentRegistration::builder(from_fn(|| 1u32))
                .with_service(ServiceKey::typed::<u32>())
                .build(),
        );
        let op = crate::operation::ResolveOperation::new(Arc::new(
            crate::diagnostics::NoopDiagnostics,
        ));
        let mut ctx = ResolveRequestContext::new(
            op,
            Arc::clone(&scope),
            ServiceKey::typed::<u32>(),
            reg,
            Vec::new(),
        );
        let mw = ScopeSelectionMiddleware;
        let next: &(dyn Fn(&mut ResolveRequestContext) -> Result<()> + Send + Sync) = &noop_next;
        mw.execute(&mut ctx, next).unwrap();
        assert_eq!(ctx.scope().id(), scope.id());
    }

    #[test]
    fn pipeline_builder_sorts_by_phase() {
        let mut builder = PipelineBuilder::for_registration_pipeline();
        builder
            .push(Arc::new(DiagnosticMiddleware {
                phase: Phase::ParameterSelection,
            }))
            .unwrap();
        builder
            .push(Arc::new(DiagnosticMiddleware {
                phase: Phase::RegistrationPipelineStart,
            }))
            .unwrap();
        assert!(!builder.is_empty());
    }
}
