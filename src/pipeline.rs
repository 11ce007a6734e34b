//! The ordered middleware pipeline that every resolve request passes through.
//!
//! A resolve request runs two pipelines back to back: the *service* pipeline
//! (phases up to and including [`Phase::ServicePipelineEnd`]), built once per
//! service and shared by every registration that can satisfy it, and the
//! *registration* pipeline (the remaining phases), built once per
//! [`crate::registration::ComponentRegistration`] and private to it. The
//! service pipeline's terminal middleware invokes the chosen registration's
//! pipeline; nothing downstream of that point is aware of which service name
//! was used to look the registration up.

use crate::error::{DiError, Result};
use crate::middleware::Middleware;
use crate::operation::ResolveRequestContext;
use std::fmt;
use std::sync::Arc;

/// The eight ordered phases a resolve request passes through. Declaration
/// order within a phase is preserved; phases themselves are fixed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum Phase {
    /// First phase of the service pipeline: request just entered the registry.
    ResolveRequestStart = 0,
    /// Chooses the scope sharing and activation will use.
    ScopeSelection = 1,
    /// Applies registered decorators to an already-activated instance.
    Decoration = 2,
    /// Looks up or reserves the shared-instance slot for this registration.
    SharingPreparation = 3,
    /// Terminal service-pipeline phase; hands off to the registration pipeline.
    ServicePipelineEnd = 4,
    /// First phase of the registration pipeline.
    RegistrationPipelineStart = 5,
    /// Resolves constructor/method parameters against supplied `Parameter`s.
    ParameterSelection = 6,
    /// Terminal phase: invokes the activator.
    Activation = 7,
}

impl Phase {
    pub const SERVICE_PHASES: [Phase; 5] = [
        Phase::ResolveRequestStart,
        Phase::ScopeSelection,
        Phase::Decoration,
        Phase::SharingPreparation,
        Phase::ServicePipelineEnd,
    ];

    pub const REGISTRATION_PHASES: [Phase; 3] = [
        Phase::RegistrationPipelineStart,
        Phase::ParameterSelection,
        Phase::Activation,
    ];

    pub fn belongs_to_service_pipeline(self) -> bool {
        (self as u8) <= (Phase::ServicePipelineEnd as u8)
    }
}

/// A continuation handed to [`Middleware::execute`]. Calling it runs the rest
/// of the chain; a middleware that never calls it short-circuits the request.
pub type Next<'a> = &'a (dyn Fn(&mut ResolveRequestContext) -> Result<()> + Send + Sync);

type Chain = Arc<dyn Fn(&mut ResolveRequestContext) -> Result<()> + Send + Sync>;

/// One middleware registered at a specific phase, in declaration order.
#[derive(Clone)]
struct Entry {
    phase: Phase,
    middleware: Arc<dyn Middleware>,
}

/// Which half of a resolve request a [`PipelineBuilder`] is accumulating
/// middleware for, and therefore which phases it will accept.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PipelineKind {
    Service,
    Registration,
}

impl PipelineKind {
    fn accepts(self, phase: Phase) -> bool {
        match self {
            PipelineKind::Service => phase.belongs_to_service_pipeline(),
            PipelineKind::Registration => !phase.belongs_to_service_pipeline(),
        }
    }
}

/// Where within a phase a newly inserted middleware lands relative to
/// existing entries already at that phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InsertionMode {
    /// After every existing entry at the same phase.
    EndOfPhase,
    /// Before every existing entry at the same phase.
    StartOfPhase,
}

/// Accumulates middleware for one pipeline (service or registration) before
/// it is built into an executable chain. Entries stay sorted by phase as
/// they're inserted; a middleware whose phase doesn't belong to this
/// pipeline's kind is rejected rather than silently accepted out of range.
#[derive(Clone)]
pub struct PipelineBuilder {
    entries: Vec<Entry>,
    kind: PipelineKind,
}

impl PipelineBuilder {
    pub fn for_service_pipeline() -> Self {
        Self {
            entries: Vec::new(),
            kind: PipelineKind::Service,
        }
    }

    pub fn for_registration_pipeline() -> Self {
        Self {
            entries: Vec::new(),
            kind: PipelineKind::Registration,
        }
    }

    /// Appends `middleware` after any existing entries at the same phase.
    /// Shorthand for `insert(middleware, InsertionMode::EndOfPhase)`.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) -> Result<()> {
        self.insert(middleware, InsertionMode::EndOfPhase)
    }

    /// Inserts `middleware` at its declared phase, ordered within that phase
    /// according to `mode`. Fails with `DiError::PipelinePhaseViolation` if
    /// the phase doesn't belong to this pipeline (service pipelines only
    /// accept phases up to `ServicePipelineEnd`; registration pipelines only
    /// accept phases from `RegistrationPipelineStart` on).
    pub fn insert(&mut self, middleware: Arc<dyn Middleware>, mode: InsertionMode) -> Result<()> {
        let phase = middleware.phase();
        if !self.kind.accepts(phase) {
            return Err(DiError::phase_violation(phase));
        }
        let idx = match mode {
            InsertionMode::EndOfPhase => self.entries.partition_point(|e| e.phase <= phase),
            InsertionMode::StartOfPhase => self.entries.partition_point(|e| e.phase < phase),
        };
        self.entries.insert(idx, Entry { phase, middleware });
        Ok(())
    }

    /// Builds an executable chain. `terminal` runs after the last middleware
    /// if every middleware in the chain calls `next`. Each middleware
    /// invocation is bracketed by `middlewareStart`/`middlewareSuccess`
    /// (or `middlewareFailure`) diagnostic events.
    pub fn build(&self, terminal: Chain) -> BuiltPipeline {
        let mut next = terminal;
        for entry in self.entries.iter().rev() {
            let mw = Arc::clone(&entry.middleware);
            let phase = entry.phase;
            let captured_next = Arc::clone(&next);
            next = Arc::new(move |ctx: &mut ResolveRequestContext| {
                let diagnostics = Arc::clone(ctx.diagnostics());
                diagnostics.middleware_starting(phase);
                let result = mw.execute(ctx, &*captured_next);
                match &result {
                    Ok(()) => diagnostics.middleware_succeeded(phase),
                    Err(e) => diagnostics.middleware_failed(phase, &e.to_string()),
                }
                result
            });
        }
        BuiltPipeline { entry: next }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("len", &self.entries.len())
            .field("kind", &self.kind)
            .finish()
    }
}

/// A finished, invocable middleware chain.
#[derive(Clone)]
pub struct BuiltPipeline {
    entry: Chain,
}

impl BuiltPipeline {
    pub fn invoke(&self, ctx: &mut ResolveRequestContext) -> Result<()> {
        (self.entry)(ctx)
    }

    /// A pipeline that does nothing and reports success. Used as the deepest
    /// terminal in a registration pipeline with no further handoff.
    pub fn noop() -> Self {
        Self {
            entry: Arc::new(|_ctx| Ok(())),
        }
    }
}

impl fmt::Debug for BuiltPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltPipeline").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::from_fn;
    use crate::key::ServiceKey;
    use crate::registration::ComponentRegistration;
    use crate::scope::tests_support::test_root_scope;
    use std::sync::Mutex;

    struct RecordingMiddleware {
        phase: Phase,
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for RecordingMiddleware {
        fn phase(&self) -> Phase {
            self.phase
        }

        fn execute(&self, ctx: &mut ResolveRequestContext, next: Next<'_>) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            next(ctx)
        }
    }

    fn test_ctx() -> ResolveRequestContext {
        let scope = test_root_scope();
        let reg = Arc::new(
            ComponentRegistration::builder(from_fn(|| 1u32))
                .with_service(ServiceKey::typed::<u32>())
                .build(),
        );
        let op = crate::operation::ResolveOperation::new(Arc::new(crate::diagnostics::NoopDiagnostics));
        ResolveRequestContext::new(op, scope, ServiceKey::typed::<u32>(), reg, Vec::new())
    }

    #[test]
    fn push_rejects_a_phase_outside_the_pipelines_kind() {
        let mut builder = PipelineBuilder::for_service_pipeline();
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = builder
            .push(Arc::new(RecordingMiddleware {
                phase: Phase::Activation,
                name: "activation",
                log,
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            DiError::PipelinePhaseViolation {
                phase: Phase::Activation
            }
        ));
    }

    #[test]
    fn start_of_phase_runs_before_end_of_phase_entries_at_the_same_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::for_service_pipeline();
        builder
            .push(Arc::new(RecordingMiddleware {
                phase: Phase::ScopeSelection,
                name: "end",
                log: Arc::clone(&log),
            }))
            .unwrap();
        builder
            .insert(
                Arc::new(RecordingMiddleware {
                    phase: Phase::ScopeSelection,
                    name: "start",
                    log: Arc::clone(&log),
                }),
                InsertionMode::StartOfPhase,
            )
            .unwrap();
        let pipeline = builder.build(Arc::new(|_ctx| Ok(())));
        let mut ctx = test_ctx();
        pipeline.invoke(&mut ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["start", "end"]);
    }
}
