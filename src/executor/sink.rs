//! Where task outcomes go.
//!
//! The executor never hands outcomes back to the caller, it routes them to a
//! `LogSink` instead: returned failures at error severity, caught panics at fault
//! severity. Both carry the task name and the context the task ran with.

use crate::context::log_data::log_data;
use crate::prelude::*;

/// Target used for returned failures.
pub const ERROR_TARGET: &str = "async_keeper::error";
/// Target used for caught panics.
pub const FAULT_TARGET: &str = "async_keeper::fault";

/// Receiver of task failures.
pub trait LogSink: Send + Sync {
    /// The task returned an error.
    fn error(&self, name: &str, err: &anyhow::Error, ctx: &Context);

    /// The task panicked.
    fn fault(&self, name: &str, task_panic: &TaskPanic, ctx: &Context);
}

/// Default sink, writes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacadeSink;

impl LogSink for LogFacadeSink {
    fn error(&self, name: &str, err: &anyhow::Error, ctx: &Context) {
        error!(
            target: ERROR_TARGET,
            "[ASYNC][{}] error: {:#}{}",
            name,
            err,
            render_fields(ctx)
        );
    }

    fn fault(&self, name: &str, task_panic: &TaskPanic, ctx: &Context) {
        error!(
            target: FAULT_TARGET,
            "[ASYNC][{}] panic: {}{}",
            name,
            task_panic,
            render_fields(ctx)
        );
    }
}

// ` {k1=v1, k2=v2}` sorted by key, or nothing when the context carries no fields.
fn render_fields(ctx: &Context) -> String {
    let mut fields: Vec<_> = log_data(ctx).into_iter().collect();
    if fields.is_empty() {
        return String::new();
    }
    fields.sort();

    let pairs: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!(" {{{}}}", pairs.join(", "))
}
