//! AsyncExecutor fires named background tasks that can't take the caller down,
//! and lets the caller wait for all of them on shutdown.
//!
//! # AsyncExecutor
//!
//! 1. `run_async`/`run_blocking` register the task, optionally detach its context,
//!    and schedule it without blocking.
//! 2. A panic in the task is caught and reported as a fault, a returned error is
//!    reported as an error. Neither reaches the caller.
//! 3. `wait` blocks until every registered task has finished.

use super::options::{AsyncOption, Options};
use super::runtime::{RuntimeInstance, RuntimeKind};
use super::sink::{LogFacadeSink, LogSink};
use super::wait_group::WaitGroup;
use crate::prelude::*;

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Runtime;

/// Builds AsyncExecutor with custom configuration values.
///
/// Every method is an option setter, applied in call order.
///
/// # Examples
///
/// ```
/// use async_keeper::prelude::*;
///
/// let executor = AsyncExecutorBuilder::default()
///     .uninterrupted_context(true)
///     .smol_runtime_by_default()
///     .build();
///
/// assert!(executor.is_detaching());
/// executor.wait();
/// ```
#[derive(Default)]
pub struct AsyncExecutorBuilder {
    options: Options,
    custom_runtime: Option<Arc<Runtime>>,
    log_sink: Option<Arc<dyn LogSink>>,
}

/// Fire-and-forget task executor with wait-for-all.
pub struct AsyncExecutor {
    options: Options,
    in_flight: Arc<WaitGroup>,
    runtime_instance: RuntimeInstance,
    log_sink: Arc<dyn LogSink>,
}

impl fmt::Debug for AsyncExecutorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncExecutorBuilder")
            .field("options", &self.options)
            .field("custom_runtime", &self.custom_runtime.is_some())
            .field("custom_log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl fmt::Debug for AsyncExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncExecutor")
            .field("options", &self.options)
            .field("in_flight", &self.in_flight.in_flight())
            .field("runtime_instance", &self.runtime_instance)
            .finish()
    }
}

impl AsyncExecutorBuilder {
    /// Apply one option setter.
    pub fn option(mut self, option: AsyncOption) -> Self {
        self.options.apply(Some(option));
        self
    }

    /// Apply option setters in order.
    pub fn options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = AsyncOption>,
    {
        self.options.apply(options);
        self
    }

    /// Whether every spawned task runs under a detached context.
    pub fn uninterrupted_context(mut self, enabled: bool) -> Self {
        self.options.uninterrupted_context = enabled;
        self
    }

    /// With this API, `AsyncExecutor` spawns onto smol's global executor.
    pub fn smol_runtime_by_default(mut self) -> Self {
        self.options.runtime_kind = RuntimeKind::Smol;
        self.custom_runtime = None;
        self
    }

    /// With this API, `AsyncExecutor` spawns onto the tokio runtime it is built
    /// inside of, or onto one it creates and owns.
    ///
    /// By default the runtime is `Tokio`, this API does not require a user-initiated call.
    pub fn tokio_runtime_by_default(mut self) -> Self {
        self.options.runtime_kind = RuntimeKind::Tokio;
        self.custom_runtime = None;
        self
    }

    /// With this API, `AsyncExecutor` takes over the user customized `TokioRuntime`.
    pub fn tokio_runtime_by_custom(self, rt: Runtime) -> Self {
        self.tokio_runtime_shared_by_custom(Arc::new(rt))
    }

    /// With this API, `AsyncExecutor` shares a `TokioRuntime` with the user.
    pub fn tokio_runtime_shared_by_custom(mut self, rt: Arc<Runtime>) -> Self {
        self.options.runtime_kind = RuntimeKind::Tokio;
        self.custom_runtime = Some(rt);
        self
    }

    /// Route task failures to `log_sink` instead of the `log` facade.
    pub fn log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(log_sink);
        self
    }

    /// Build AsyncExecutor.
    ///
    /// # Panics
    ///
    /// When a tokio runtime has to be created and that fails, see `try_build`.
    pub fn build(self) -> AsyncExecutor {
        self.try_build().expect("async-keeper can't init its tokio runtime.")
    }

    /// Build AsyncExecutor, reporting a tokio runtime that could not be created.
    pub fn try_build(self) -> AnyResult<AsyncExecutor> {
        let runtime_instance = match self.options.runtime_kind {
            RuntimeKind::Smol => RuntimeInstance::init_smol_runtime(),
            RuntimeKind::Tokio => RuntimeInstance::init_tokio_runtime(self.custom_runtime)?,
        };

        debug!("async executor built: {:?}", self.options);

        Ok(AsyncExecutor {
            options: self.options,
            in_flight: WaitGroup::new(),
            runtime_instance,
            log_sink: self
                .log_sink
                .unwrap_or_else(|| Arc::new(LogFacadeSink) as Arc<dyn LogSink>),
        })
    }
}

impl Default for AsyncExecutor {
    fn default() -> Self {
        AsyncExecutorBuilder::default().build()
    }
}

impl AsyncExecutor {
    /// New an AsyncExecutor, applying `options` in order.
    pub fn new<I>(options: I) -> AsyncExecutor
    where
        I: IntoIterator<Item = AsyncOption>,
    {
        AsyncExecutorBuilder::default().options(options).build()
    }

    /// Spawn `routine` as a background task named `name`.
    ///
    /// Returns immediately. The outcome is only ever reported to the log sink.
    pub fn run_async<F, Fut>(&self, ctx: &Context, name: impl Into<String>, routine: F)
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = AnyResult<()>> + Send + 'static,
    {
        let in_flight = self.in_flight.register();
        let ctx = self.task_context(ctx);
        let name = name.into();
        let log_sink = self.log_sink.clone();
        let span = info_span!("run_async", task = %name);

        trace!("[ASYNC][{}] scheduled", name);

        let routine_ctx = ctx.clone();
        let task = async move {
            let _in_flight = in_flight;
            // Calling `routine` runs user code too, so it happens inside the boundary.
            let outcome = catch_panic(async move { routine(routine_ctx).await }).await;
            report(&*log_sink, &name, &ctx, outcome);
        };

        self.runtime_instance.spawn(task.instrument(span));
    }

    /// Spawn a synchronous `routine` onto the runtime's blocking pool.
    ///
    /// Same contract as `run_async`.
    pub fn run_blocking<F>(&self, ctx: &Context, name: impl Into<String>, routine: F)
    where
        F: FnOnce(Context) -> AnyResult<()> + Send + 'static,
    {
        let in_flight = self.in_flight.register();
        let ctx = self.task_context(ctx);
        let name = name.into();
        let log_sink = self.log_sink.clone();
        let span = info_span!("run_blocking", task = %name);

        trace!("[ASYNC][{}] scheduled on the blocking pool", name);

        let task = move || {
            let _in_flight = in_flight;
            let _entered = span.enter();
            let routine_ctx = ctx.clone();
            let outcome = capture_panic(move || routine(routine_ctx));
            report(&*log_sink, &name, &ctx, outcome);
        };

        self.runtime_instance.spawn_blocking(task);
    }

    /// Block the thread until every spawned task has finished.
    ///
    /// Don't call it from inside an async task, use `wait_async` there.
    pub fn wait(&self) {
        self.in_flight.wait();
    }

    /// Async-await every spawned task.
    pub async fn wait_async(&self) {
        self.in_flight.wait_async().await;
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.in_flight()
    }

    /// Whether spawned tasks run under a detached context.
    pub fn is_detaching(&self) -> bool {
        self.options.uninterrupted_context
    }

    /// The frozen configuration.
    pub fn options(&self) -> Options {
        self.options
    }

    fn task_context(&self, ctx: &Context) -> Context {
        if self.options.uninterrupted_context {
            ctx.detach()
        } else {
            ctx.clone()
        }
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        self.runtime_instance.shutdown(self.in_flight.clone());
    }
}

fn report(
    log_sink: &dyn LogSink,
    name: &str,
    ctx: &Context,
    outcome: Result<AnyResult<()>, TaskPanic>,
) {
    match outcome {
        Ok(Ok(())) => trace!("[ASYNC][{}] finished", name),
        Ok(Err(err)) => log_sink.error(name, &err, ctx),
        Err(task_panic) => log_sink.fault(name, &task_panic, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::options::with_uninterrupted_context;
    use crate::executor::sink::tests::{RecordingSink, Severity};

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    fn recording_executor(detach: bool) -> (AsyncExecutor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let executor = AsyncExecutorBuilder::default()
            .uninterrupted_context(detach)
            .log_sink(sink.clone())
            .build();

        (executor, sink)
    }

    async fn explode(_ctx: Context) -> AnyResult<()> {
        panic!("kaboom")
    }

    async fn refuse(_ctx: Context) -> AnyResult<()> {
        Err(anyhow!("disk full"))
    }

    #[test]
    fn test_wait_without_tasks() {
        let (executor, sink) = recording_executor(false);

        executor.wait();
        executor.wait();

        assert_eq!(executor.in_flight(), 0);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_wait_for_all() {
        let (executor, sink) = recording_executor(false);
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..32u64 {
            let finished = finished.clone();
            executor.run_async(&Context::background(), format!("task-{}", i), move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(32 - i)).await;
                finished.fetch_add(1, SeqCst);
                Ok(())
            });
        }

        executor.wait();

        assert_eq!(finished.load(SeqCst), 32);
        assert_eq!(executor.in_flight(), 0);
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_panic_is_contained() {
        let (executor, sink) = recording_executor(false);

        executor.run_async(&Context::background(), "exploding", explode);
        executor.wait();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Fault);
        assert_eq!(entries[0].name, "exploding");
        assert!(entries[0].message.contains("kaboom"));
        assert!(entries[0].message.contains(" -> "));
    }

    #[test]
    fn test_returned_error_is_logged() {
        let (executor, sink) = recording_executor(false);

        executor.run_async(&Context::background(), "refusing", refuse);
        executor.wait();

        assert_eq!(sink.count(Severity::Fault), 0);
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[0].name, "refusing");
        assert_eq!(entries[0].message, "disk full");
    }

    #[test]
    fn test_blocking_routine() {
        let (executor, sink) = recording_executor(false);
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        executor.run_blocking(&Context::background(), "blocking-ok", move |_ctx| {
            std::thread::sleep(Duration::from_millis(10));
            flag.store(true, SeqCst);
            Ok(())
        });
        executor.run_blocking(&Context::background(), "blocking-panic", |_ctx| {
            let empty: Vec<u8> = Vec::new();
            let _second = empty[1];
            Ok(())
        });
        executor.wait();

        assert!(ran.load(SeqCst));
        assert_eq!(sink.count(Severity::Fault), 1);
        assert_eq!(sink.entries()[0].name, "blocking-panic");
    }

    #[test]
    fn test_new_applies_options() {
        let executor = AsyncExecutor::new(vec![with_uninterrupted_context()]);
        assert!(executor.is_detaching());

        let executor = AsyncExecutor::new(Vec::new());
        assert!(!executor.is_detaching());
        assert_eq!(executor.options().runtime_kind(), RuntimeKind::Tokio);
    }

    #[test]
    fn test_detached_task_ignores_cancel() {
        let (executor, sink) = recording_executor(true);
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let observed = Arc::new(AtomicBool::new(true));
        let done = observed.clone();
        executor.run_async(&ctx, "detached", move |ctx| async move {
            done.store(ctx.is_done(), SeqCst);
            Ok(())
        });
        executor.wait();

        assert!(!observed.load(SeqCst));
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_drop_keeps_pending_tasks() {
        // Built outside any runtime, so the executor owns its tokio runtime.
        let (executor, sink) = recording_executor(false);
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = counter.clone();
        executor.run_async(&Context::background(), "slow-job", move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            seen.fetch_add(1, SeqCst);
            Ok(())
        });
        executor.run_async(&Context::background(), "slow-refuse", |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<(), _>(anyhow!("late failure"))
        });
        drop(executor);

        std::thread::sleep(Duration::from_millis(300));

        assert_eq!(counter.load(SeqCst), 1);
        assert_eq!(sink.count(Severity::Error), 1);
        assert_eq!(sink.entries()[0].name, "slow-refuse");
    }

    #[test]
    fn test_custom_runtime() -> AnyResult<()> {
        let runtime = Arc::new(RuntimeInstance::tokio_support()?);
        let executor = AsyncExecutorBuilder::default()
            .tokio_runtime_shared_by_custom(runtime.clone())
            .build();

        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        executor.run_async(&Context::background(), "custom", move |_ctx| async move {
            seen.fetch_add(1, SeqCst);
            Ok(())
        });
        executor.wait();
        drop(executor);

        assert_eq!(counter.load(SeqCst), 1);
        // The user's handle still works after the executor is gone.
        assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
        Ok(())
    }
}
