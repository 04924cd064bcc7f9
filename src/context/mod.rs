//! Request-scoped context carried into background tasks.
//!
//! # Context
//!
//! A `Context` is an immutable, chainable carrier of:
//!
//! 1. An optional deadline.
//! 2. A cancellation signal, plus the error recorded once it fired.
//! 3. Typed value slots, looked up by type and delegated to the parent on a miss.
//!
//! Deriving a context never mutates its parent, every derivation just links a new
//! node in front of it. Cloning is an `Arc` bump.
//!
//! # Detach
//!
//! `detach` cuts the lifecycle link (deadline, done, err) but keeps the data link,
//! so a background task can outlive the request that spawned it while still
//! seeing the request's values.

use crate::prelude::*;

use std::any::{Any, TypeId};
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::{Duration, Instant};

use event_listener::Event;
use futures::future;
use once_cell::sync::OnceCell;

pub mod log_data;

type ValueSlot = Arc<dyn Any + Send + Sync>;

/// Chainable carrier of cancellation, deadline and request-scoped values.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Node>,
}

enum Node {
    Background,
    Value {
        parent: Context,
        key: TypeId,
        value: ValueSlot,
    },
    Cancel {
        parent: Context,
        state: Arc<CancelState>,
    },
    Detached {
        parent: Context,
    },
}

/// Shared cancellation state of one `with_cancel`/`with_deadline` node.
#[derive(Debug)]
pub(crate) struct CancelState {
    deadline: Option<Instant>,
    // First cancellation wins.
    err: OnceCell<ContextError>,
    // Wakes every `done()` waiter.
    event: Event,
}

/// Handle that cancels the context it was created with.
///
/// Cancellation reaches every context derived from that one, except those behind
/// a detached node.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl Node {
    fn parent(&self) -> Option<&Context> {
        match self {
            Node::Background => None,
            Node::Value { parent, .. }
            | Node::Cancel { parent, .. }
            | Node::Detached { parent } => Some(parent),
        }
    }
}

impl CancelState {
    fn new(deadline: Option<Instant>) -> Self {
        CancelState {
            deadline,
            err: OnceCell::new(),
            event: Event::new(),
        }
    }

    fn cancel(&self, err: ContextError) {
        if self.err.set(err).is_ok() {
            self.event.notify(usize::MAX);
        }
    }

    fn err(&self) -> Option<ContextError> {
        if let Some(err) = self.err.get() {
            return Some(*err);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(ContextError::DeadlineExceeded);
                self.err.get().copied()
            }
            _ => None,
        }
    }
}

impl CancelHandle {
    /// Cancel the context. Calling it again, or after the deadline fired, is a no-op.
    pub fn cancel(&self) {
        self.state.cancel(ContextError::Canceled);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::background()
    }
}

impl Context {
    /// The root context: no deadline, never done, no values.
    pub fn background() -> Context {
        Context::from_node(Node::Background)
    }

    fn from_node(node: Node) -> Context {
        Context {
            inner: Arc::new(node),
        }
    }

    /// Derive a context holding `value` in the slot for its type.
    ///
    /// A later slot of the same type shadows an earlier one.
    pub fn with_value<T>(&self, value: T) -> Context
    where
        T: Any + Send + Sync,
    {
        Context::from_node(Node::Value {
            parent: self.clone(),
            key: TypeId::of::<T>(),
            value: Arc::new(value),
        })
    }

    /// Look up the nearest slot of type `T`, walking up the parent chain.
    ///
    /// Detached nodes are transparent here.
    pub fn value<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let key = TypeId::of::<T>();

        self.chain().find_map(|node| match node {
            Node::Value {
                key: slot_key,
                value,
                ..
            } if *slot_key == key => value.clone().downcast::<T>().ok(),
            _ => None,
        })
    }

    /// Derive a cancellable context.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.with_cancel_state(CancelState::new(None))
    }

    /// Derive a context that is cancelled at `deadline` at the latest.
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        self.with_cancel_state(CancelState::new(Some(deadline)))
    }

    /// Derive a context that is cancelled after `timeout` at the latest.
    ///
    /// A timeout too large to represent as an `Instant` (e.g. `Duration::MAX`)
    /// yields a cancellable context without a deadline.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        let deadline = Instant::now().checked_add(timeout);
        self.with_cancel_state(CancelState::new(deadline))
    }

    fn with_cancel_state(&self, state: CancelState) -> (Context, CancelHandle) {
        let state = Arc::new(state);
        let ctx = Context::from_node(Node::Cancel {
            parent: self.clone(),
            state: state.clone(),
        });

        (ctx, CancelHandle { state })
    }

    /// Derive a context that never expires and is never cancelled, but still
    /// resolves values through `self`.
    ///
    /// The parent is referenced, not copied. Detaching twice is the same as once.
    pub fn detach(&self) -> Context {
        if let Node::Detached { .. } = *self.inner {
            return self.clone();
        }

        Context::from_node(Node::Detached {
            parent: self.clone(),
        })
    }

    /// Returns `true` if this context was built by `detach`.
    pub fn is_detached(&self) -> bool {
        matches!(*self.inner, Node::Detached { .. })
    }

    /// The earliest deadline on the chain, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.cancel_states().filter_map(|state| state.deadline).min()
    }

    /// The reason this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        self.cancel_states().find_map(|state| state.err())
    }

    /// Returns `true` once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// For a context with nothing to cancel it (the background, or a detached one)
    /// this never resolves.
    pub async fn done(&self) {
        loop {
            if self.is_done() {
                return;
            }

            // Listen before re-checking, so a cancel landing in between is not lost.
            let listeners: Vec<_> = self
                .cancel_states()
                .map(|state| Box::pin(state.event.listen()))
                .collect();

            if self.is_done() {
                return;
            }

            if listeners.is_empty() {
                future::pending::<()>().await;
            }

            let cancelled = future::select_all(listeners);
            match self.deadline() {
                Some(deadline) => {
                    future::select(cancelled, Box::pin(AsyncTimer::at(deadline))).await;
                }
                None => {
                    cancelled.await;
                }
            }
        }
    }

    // Every node from `self` up to the root.
    fn chain(&self) -> impl Iterator<Item = &Node> {
        iter::successors(Some(&*self.inner), |node| {
            node.parent().map(|parent| &*parent.inner)
        })
    }

    // Cancellation nodes that still govern `self`: everything above a detached
    // node is cut off.
    fn cancel_states(&self) -> impl Iterator<Item = &CancelState> {
        self.chain()
            .take_while(|node| !matches!(node, Node::Detached { .. }))
            .filter_map(|node| match node {
                Node::Cancel { state, .. } => Some(&**state),
                _ => None,
            })
    }
}

/// Free-function form of [`Context::detach`].
pub fn detach(ctx: &Context) -> Context {
    ctx.detach()
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<&str> = self
            .chain()
            .map(|node| match node {
                Node::Background => "background",
                Node::Value { .. } => "value",
                Node::Cancel { .. } => "cancel",
                Node::Detached { .. } => "detached",
            })
            .collect();

        f.debug_struct("Context")
            .field("chain", &chain)
            .field("deadline", &self.deadline())
            .field("err", &self.err())
            .finish()
    }
}
