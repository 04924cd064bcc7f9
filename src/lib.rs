//! async-keeper fires background work that must not crash the host process and
//! must be awaitable for graceful shutdown.
//!
//! # AsyncExecutor
//!
//! 1. `run_async` spawns a named task against a [`Context`](context::Context) and
//!    returns immediately.
//! 2. A panic inside the task is caught and logged as a fault, a returned error is
//!    logged as an error. Nothing propagates back to the caller.
//! 3. `wait` blocks until every spawned task has finished.
//! 4. Built with `with_uninterrupted_context`, every task runs under a detached
//!    context: it keeps the request's values (log fields included) but outlives
//!    the request's cancellation.
//!
//! # Examples
//!
//! ```
//! use async_keeper::prelude::*;
//!
//! let executor = AsyncExecutor::new(vec![with_uninterrupted_context()]);
//!
//! let request = context_with_log_data(&Context::background(), vec![("user", "alice")]);
//! let (request, cancel) = request.with_cancel();
//!
//! executor.run_async(&request, "audit", |ctx| async move {
//!     // The request is gone, the audit record still gets written.
//!     assert!(!ctx.is_done());
//!     assert_eq!(log_data(&ctx).get("user").map(String::as_str), Some("alice"));
//!     Ok(())
//! });
//! cancel.cancel();
//!
//! executor.wait();
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod prelude;
