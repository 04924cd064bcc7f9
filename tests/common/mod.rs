#![allow(dead_code)]

use async_keeper::prelude::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fault,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub severity: Severity,
    pub name: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Sink that keeps every entry, with the log fields of the task's context.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Entry>>,
}

impl RecordingSink {
    pub fn new() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::default())
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.severity == severity)
            .collect()
    }

    fn push(&self, severity: Severity, name: &str, message: String, ctx: &Context) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry {
                severity,
                name: name.to_string(),
                message,
                fields: log_data(ctx),
            });
        }
    }
}

impl LogSink for RecordingSink {
    fn error(&self, name: &str, err: &anyhow::Error, ctx: &Context) {
        self.push(Severity::Error, name, format!("{:#}", err), ctx);
    }

    fn fault(&self, name: &str, task_panic: &TaskPanic, ctx: &Context) {
        self.push(Severity::Fault, name, task_panic.to_string(), ctx);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A value placed in the request context.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestId(pub u64);
