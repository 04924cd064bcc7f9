//! Fault containment for task bodies.
//!
//! `capture_panic` (closures) and `catch_panic` (futures) turn a panic into a
//! [`TaskPanic`] carrying the payload, the panic location and a one-line stack
//! trace. The stack is taken from inside a process panic hook while the panicking
//! frames are still on the stack; the hook is installed once and only records for
//! threads currently inside a capture boundary, every other panic goes to the
//! hook that was there before.

use crate::prelude::*;

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context as TaskCx, Poll};

use once_cell::sync::Lazy;

thread_local! {
    // Depth of nested capture boundaries on this thread.
    static CONTAINED: Cell<usize> = Cell::new(0);
    // Filled by the hook, drained by the boundary that catches the unwind.
    static CAPTURED: RefCell<Option<PanicSite>> = RefCell::new(None);
}

static PANIC_HOOK: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let contained = CONTAINED.try_with(Cell::get).unwrap_or(0) > 0;
        if !contained {
            return previous(info);
        }

        let site = PanicSite {
            location: info.location().map(ToString::to_string),
            stack: collapse_stack(&Backtrace::force_capture().to_string()),
        };
        let _ = CAPTURED.try_with(|captured| *captured.borrow_mut() = Some(site));
    }));
});

#[derive(Debug)]
struct PanicSite {
    location: Option<String>,
    stack: String,
}

/// A panic caught inside a task body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "panic: {payload} (at {}), stack: {stack}",
    .location.as_deref().unwrap_or("unknown location")
)]
pub struct TaskPanic {
    payload: String,
    location: Option<String>,
    stack: String,
}

impl TaskPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> TaskPanic {
        let payload = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        // Without our hook in place (someone replaced it), fall back to the stack
        // of the catching frame.
        let site = CAPTURED
            .with(|captured| captured.borrow_mut().take())
            .unwrap_or_else(|| PanicSite {
                location: None,
                stack: collapse_stack(&Backtrace::force_capture().to_string()),
            });

        TaskPanic {
            payload,
            location: site.location,
            stack: site.stack,
        }
    }

    /// The panic message.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// `file:line:column` of the panic, when the hook saw it.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Stack trace, one frame after another joined by ` -> `.
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

/// Collapse a multi-line stack trace into one human-scannable line.
pub fn collapse_stack(trace: &str) -> String {
    trace
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Run `f`, converting a panic into a [`TaskPanic`].
pub fn capture_panic<R>(f: impl FnOnce() -> R) -> Result<R, TaskPanic> {
    Lazy::force(&PANIC_HOOK);

    CONTAINED.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINED.with(|depth| depth.set(depth.get() - 1));

    result.map_err(TaskPanic::from_payload)
}

/// Wrap `future` so a panic in any of its polls resolves to a [`TaskPanic`].
pub fn catch_panic<F: Future>(future: F) -> CatchPanic<F> {
    CatchPanic {
        inner: Box::pin(future),
    }
}

/// Future for [`catch_panic`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, TaskPanic>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskCx<'_>) -> Poll<Self::Output> {
        let inner = self.get_mut().inner.as_mut();

        match capture_panic(|| inner.poll(cx)) {
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(task_panic) => Poll::Ready(Err(task_panic)),
        }
    }
}
