//! Construction-time configuration of an [`AsyncExecutor`](super::AsyncExecutor).
//!
//! Options are setters applied in order to one `Options` value, a later setter
//! overrides an earlier one for the same setting. The result is frozen inside the
//! executor.

use super::runtime::RuntimeKind;

/// Frozen executor configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub(crate) uninterrupted_context: bool,
    pub(crate) runtime_kind: RuntimeKind,
}

/// A single configuration setter.
pub type AsyncOption = Box<dyn FnOnce(&mut Options) + Send>;

impl Options {
    /// Apply `options` in order on top of the defaults.
    pub fn from_options<I>(options: I) -> Options
    where
        I: IntoIterator<Item = AsyncOption>,
    {
        let mut resolved = Options::default();
        resolved.apply(options);
        resolved
    }

    pub(crate) fn apply<I>(&mut self, options: I)
    where
        I: IntoIterator<Item = AsyncOption>,
    {
        for option in options {
            option(self);
        }
    }

    /// Whether spawned tasks get a detached context.
    pub fn uninterrupted_context(&self) -> bool {
        self.uninterrupted_context
    }

    /// Which runtime spawned tasks land on.
    pub fn runtime_kind(&self) -> RuntimeKind {
        self.runtime_kind
    }
}

/// Run every spawned task under a detached context: the task keeps the caller's
/// values but ignores its cancellation and deadline.
pub fn with_uninterrupted_context() -> AsyncOption {
    with_context_detachment(true)
}

/// Turn context detachment on or off.
pub fn with_context_detachment(enabled: bool) -> AsyncOption {
    Box::new(move |options: &mut Options| options.uninterrupted_context = enabled)
}

/// Pick the runtime tasks are spawned onto.
pub fn with_runtime(kind: RuntimeKind) -> AsyncOption {
    Box::new(move |options: &mut Options| options.runtime_kind = kind)
}
