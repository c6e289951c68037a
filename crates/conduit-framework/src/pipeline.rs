//! Phased middleware pipeline.
//!
//! Middleware are kept sorted by ascending priority (ties keep registration
//! order).  Each invocation moves a [`Context`] through the chain:
//!
//! ```text
//! PRE_PROCESS ─► PROCESS ─► POST_PROCESS ─┐
//!      │            │             │       ├─► CLEANUP
//!      └────────────┴─────────────┴► ON_ERROR ┘
//! ```
//!
//! The first failure in any of the three processing phases stops the
//! normal flow.  Every middleware declaring `on_error` is then called with
//! the context as it entered the failing middleware; the error counts as
//! handled if at least one of them succeeds.  `cleanup` always runs last and
//! its failures are only logged.
//!
//! Registration swaps a new sorted snapshot in behind a lock; an invocation
//! clones the snapshot up front, so concurrent registration never affects a
//! run that is already in flight.

use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tower::Service;
use tracing::{Instrument, debug, debug_span, error, warn};

use conduit_core::{
    BoxError, Context, MiddlewareFailure, Phase, PipelineError, PipelineResult, guarded,
};

// ─── Middleware ──────────────────────────────────────────────────────────────

/// A processing stage in the pipeline.
///
/// A middleware declares the phases it takes part in through
/// [`Middleware::phases`]; only those hooks are ever called.
///
/// ```rust,ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Middleware for Audit {
///     fn name(&self) -> &str { "audit" }
///     fn phases(&self) -> &[Phase] { &[Phase::PreProcess, Phase::Cleanup] }
///
///     async fn pre_process(&self, mut ctx: Context) -> Result<Context, BoxError> {
///         ctx.insert_meta("audited", true);
///         Ok(ctx)
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique name within the pipeline.
    fn name(&self) -> &str;

    /// Execution priority; lower runs first.
    fn priority(&self) -> i32 {
        100
    }

    /// Phases this middleware takes part in.
    fn phases(&self) -> &[Phase] {
        &[Phase::Process]
    }

    /// Runs before main processing.
    async fn pre_process(&self, ctx: Context) -> Result<Context, BoxError> {
        Ok(ctx)
    }

    /// Main processing.
    async fn process(&self, ctx: Context) -> Result<Context, BoxError> {
        Ok(ctx)
    }

    /// Runs after every `process` call succeeded.
    async fn post_process(&self, ctx: Context) -> Result<Context, BoxError> {
        Ok(ctx)
    }

    /// Attempts to recover from a processing failure.  Returning `Ok` marks
    /// the failure as handled.
    async fn on_error(
        &self,
        ctx: Context,
        _failure: &MiddlewareFailure,
    ) -> Result<Context, BoxError> {
        Ok(ctx)
    }

    /// Always runs last.
    async fn cleanup(&self, _ctx: &Context) -> Result<(), BoxError> {
        Ok(())
    }
}

// ─── MiddlewarePipeline ──────────────────────────────────────────────────────

#[derive(Clone)]
struct Registered {
    name: String,
    priority: i32,
    phases: Vec<Phase>,
    middleware: Arc<dyn Middleware>,
}

impl Registered {
    fn handles(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

/// The three phases of the normal flow.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Pre,
    Main,
    Post,
}

impl Stage {
    const FLOW: [Stage; 3] = [Stage::Pre, Stage::Main, Stage::Post];

    fn phase(self) -> Phase {
        match self {
            Self::Pre => Phase::PreProcess,
            Self::Main => Phase::Process,
            Self::Post => Phase::PostProcess,
        }
    }

    async fn call(self, middleware: &dyn Middleware, ctx: Context) -> Result<Context, BoxError> {
        match self {
            Self::Pre => middleware.pre_process(ctx).await,
            Self::Main => middleware.process(ctx).await,
            Self::Post => middleware.post_process(ctx).await,
        }
    }
}

/// Ordered middleware chain.
///
/// Shared via `Arc`; all methods take `&self`.
#[derive(Default)]
pub struct MiddlewarePipeline {
    chain: RwLock<Arc<Vec<Registered>>>,
    call_timeout: Option<Duration>,
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline with no per-call deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pipeline that fails any middleware call running
    /// longer than `timeout`.
    pub fn with_call_timeout(timeout: Duration) -> Self {
        Self {
            chain: RwLock::default(),
            call_timeout: Some(timeout),
        }
    }

    /// Inserts `middleware` by priority, after existing entries of equal
    /// priority.
    ///
    /// A middleware already registered under the same name is replaced.
    pub fn register(&self, middleware: Arc<dyn Middleware>) {
        let entry = Registered {
            name: middleware.name().to_string(),
            priority: middleware.priority(),
            phases: middleware.phases().to_vec(),
            middleware,
        };

        let mut guard = self.chain.write();
        let mut chain = Vec::clone(&guard);
        if let Some(pos) = chain.iter().position(|r| r.name == entry.name) {
            warn!(middleware = %entry.name, "Middleware already registered — replacing");
            chain.remove(pos);
        }
        let pos = chain
            .iter()
            .position(|r| r.priority > entry.priority)
            .unwrap_or(chain.len());
        debug!(
            middleware = %entry.name,
            priority = entry.priority,
            position = pos,
            "Middleware registered"
        );
        chain.insert(pos, entry);
        *guard = Arc::new(chain);
    }

    /// Removes the middleware registered under `name`.
    pub fn unregister(&self, name: &str) -> bool {
        let mut guard = self.chain.write();
        let Some(pos) = guard.iter().position(|r| r.name == name) else {
            return false;
        };
        let mut chain = Vec::clone(&guard);
        chain.remove(pos);
        *guard = Arc::new(chain);
        debug!(middleware = %name, "Middleware unregistered");
        true
    }

    /// Registered names in execution order.
    pub fn middleware_names(&self) -> Vec<String> {
        self.chain.read().iter().map(|r| r.name.clone()).collect()
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Builds a context for `operation` and runs it through the chain,
    /// returning the resulting data.
    pub async fn process(
        &self,
        operation: impl Into<String>,
        data: Value,
        metadata: Map<String, Value>,
    ) -> PipelineResult<Value> {
        let ctx = Context::new(operation, data).with_metadata(metadata);
        self.execute(ctx).await.map(|ctx| ctx.data)
    }

    /// Runs `ctx` through every phase.
    ///
    /// Returns the final context on success or when a failure was handled by
    /// an `on_error` middleware, and [`PipelineError::Unhandled`] otherwise.
    pub async fn execute(&self, ctx: Context) -> PipelineResult<Context> {
        let chain = Arc::clone(&self.chain.read());
        let span = debug_span!("pipeline", operation = %ctx.operation, middleware = chain.len());
        self.run(chain, ctx).instrument(span).await
    }

    async fn run(&self, chain: Arc<Vec<Registered>>, mut ctx: Context) -> PipelineResult<Context> {
        let mut failure = None;
        for stage in Stage::FLOW {
            match self.run_stage(&chain, stage, ctx).await {
                Ok(next) => ctx = next,
                Err((at_failure, f)) => {
                    ctx = at_failure;
                    failure = Some(f);
                    break;
                }
            }
        }

        let mut handled = false;
        if let Some(failure) = &failure {
            error!(
                middleware = %failure.middleware,
                phase = %failure.phase,
                error = %failure.source,
                "Middleware failed"
            );
            ctx.phase = Phase::OnError;
            for entry in chain.iter().filter(|r| r.handles(Phase::OnError)) {
                let snapshot = ctx.clone();
                let call = entry.middleware.on_error(ctx, failure);
                match guarded(self.call_timeout, call).await {
                    Ok(recovered) => {
                        ctx = recovered;
                        if !handled {
                            debug!(middleware = %entry.name, "Failure handled");
                        }
                        handled = true;
                    }
                    Err(e) => {
                        error!(middleware = %entry.name, error = %e, "Error handler failed");
                        ctx = snapshot;
                    }
                }
            }
        }

        ctx.phase = Phase::Cleanup;
        for entry in chain.iter().filter(|r| r.handles(Phase::Cleanup)) {
            if let Err(e) = guarded(self.call_timeout, entry.middleware.cleanup(&ctx)).await {
                warn!(middleware = %entry.name, error = %e, "Cleanup failed");
            }
        }

        match failure {
            Some(failure) if !handled => Err(PipelineError::Unhandled(failure)),
            _ => Ok(ctx),
        }
    }

    /// Calls every middleware declaring `stage`, in order.  On failure
    /// returns the context as it entered the failing middleware.
    async fn run_stage(
        &self,
        chain: &[Registered],
        stage: Stage,
        mut ctx: Context,
    ) -> Result<Context, (Context, MiddlewareFailure)> {
        let phase = stage.phase();
        ctx.phase = phase;
        for entry in chain.iter().filter(|r| r.handles(phase)) {
            let snapshot = ctx.clone();
            match guarded(self.call_timeout, stage.call(entry.middleware.as_ref(), ctx)).await {
                Ok(next) => ctx = next,
                Err(source) => {
                    return Err((
                        snapshot,
                        MiddlewareFailure {
                            middleware: entry.name.clone(),
                            phase,
                            source,
                        },
                    ));
                }
            }
        }
        Ok(ctx)
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("middleware", &self.middleware_names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

// ─── tower integration ───────────────────────────────────────────────────────

/// Exposes a shared pipeline as a [`tower::Service`].
#[derive(Clone, Debug)]
pub struct PipelineService {
    pipeline: Arc<MiddlewarePipeline>,
}

impl PipelineService {
    /// Wraps a shared pipeline.
    pub fn new(pipeline: Arc<MiddlewarePipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<Context> for PipelineService {
    type Response = Context;
    type Error = PipelineError;
    type Future = BoxFuture<'static, PipelineResult<Context>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Context) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move { pipeline.execute(ctx).await })
    }
}
