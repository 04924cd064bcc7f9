use crate::prelude::*;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::executor::wait_group::WaitGroup;

use anyhow::Context as _;
use tokio::runtime::{Builder as TokioBuilder, Handle, Runtime};

/// Async-Runtime Kind
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Async-Runtime `smol` compatible with the async-std
    Smol,

    /// Async-Runtime `tokio`
    Tokio,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        RuntimeKind::Tokio
    }
}

/// The runtime tasks are spawned onto.
pub(crate) struct RuntimeInstance {
    // Owned or user-shared tokio runtime. smol have no instance.
    pub(crate) inner: Option<Arc<Runtime>>,
    // Where tokio tasks are spawned, resolved at build time.
    pub(crate) handle: Option<Handle>,
    pub(crate) kind: RuntimeKind,
}

impl fmt::Debug for RuntimeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInstance")
            .field("kind", &self.kind)
            .field("owns_runtime", &self.inner.is_some())
            .finish()
    }
}

impl RuntimeInstance {
    pub(crate) fn init_smol_runtime() -> RuntimeInstance {
        RuntimeInstance {
            inner: None,
            handle: None,
            kind: RuntimeKind::Smol,
        }
    }

    /// Use `custom` if given, else the runtime we are being built inside of,
    /// else a fresh multi-thread runtime owned by the executor.
    pub(crate) fn init_tokio_runtime(custom: Option<Arc<Runtime>>) -> AnyResult<RuntimeInstance> {
        let (inner, handle) = match custom {
            Some(runtime) => {
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
            None => match Handle::try_current() {
                Ok(handle) => (None, handle),
                Err(_) => {
                    let runtime = Self::tokio_support()?;
                    let handle = runtime.handle().clone();
                    (Some(Arc::new(runtime)), handle)
                }
            },
        };

        Ok(RuntimeInstance {
            inner,
            handle: Some(handle),
            kind: RuntimeKind::Tokio,
        })
    }

    pub(crate) fn tokio_support() -> AnyResult<Runtime> {
        TokioBuilder::new_multi_thread()
            .enable_all()
            .thread_name_fn(|| {
                static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
                let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
                format!("async-keeper-{}", id)
            })
            .on_thread_start(|| {
                trace!("tokio-thread started");
            })
            .build()
            .context("init tokio runtime failed")
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match (self.kind, self.handle.as_ref()) {
            (RuntimeKind::Tokio, Some(handle)) => {
                drop(handle.spawn(task));
            }
            _ => smol::spawn(task).detach(),
        }
    }

    pub(crate) fn spawn_blocking<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match (self.kind, self.handle.as_ref()) {
            (RuntimeKind::Tokio, Some(handle)) => {
                drop(handle.spawn_blocking(task));
            }
            _ => smol::spawn(smol::unblock(task)).detach(),
        }
    }

    /// Release an owned runtime without blocking the caller.
    ///
    /// Tasks still in flight keep running: the runtime is handed to a drain thread
    /// that shuts it down once `in_flight` reaches zero.
    pub(crate) fn shutdown(&mut self, in_flight: Arc<WaitGroup>) {
        let runtime = match self.inner.take().map(Arc::try_unwrap) {
            Some(Ok(runtime)) => runtime,
            // Shared with the user, or never owned.
            _ => return,
        };

        let pending = in_flight.in_flight();
        if pending == 0 {
            runtime.shutdown_background();
            return;
        }

        warn!(
            "executor dropped with {} task(s) in flight, draining them in background",
            pending
        );

        // Shared so a failed spawn still lets us shut down without blocking.
        let slot = Arc::new(Mutex::new(Some(runtime)));
        let drain_slot = slot.clone();
        let spawned = thread::Builder::new()
            .name("async-keeper-drain".into())
            .spawn(move || {
                in_flight.wait();
                if let Some(runtime) = take_runtime(&drain_slot) {
                    runtime.shutdown_background();
                }
                debug!("drained {} task(s) of a dropped executor", pending);
            });

        if let Err(e) = spawned {
            error!(
                "spawn drain thread failed: {}, abandoning {} task(s)",
                e, pending
            );
            if let Some(runtime) = take_runtime(&slot) {
                runtime.shutdown_background();
            }
        }
    }
}

fn take_runtime(slot: &Mutex<Option<Runtime>>) -> Option<Runtime> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}
