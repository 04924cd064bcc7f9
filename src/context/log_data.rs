//! Request-scoped log annotations.
//!
//! The bag lives in a typed slot of the [`Context`], so every task that shares
//! the context chain (detached ones included) sees the same fields. Each bag is
//! guarded by its own lock.

use crate::prelude::*;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutable key/value bag attached to a context.
#[derive(Debug, Default)]
pub struct LogData {
    inner: RwLock<HashMap<String, String>>,
}

impl LogData {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Isolated copy of every field.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.read().clone()
    }

    fn extend<I, K, V>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.write()
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.to_string())));
    }
}

impl<K, V> FromIterator<(K, V)> for LogData
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(fields: I) -> Self {
        let bag = LogData::default();
        bag.extend(fields);
        bag
    }
}

/// Return a copy of all the log fields held by `ctx`.
///
/// The copy is detached from the bag, changing it does not touch the context.
/// A context without a bag yields an empty map.
pub fn log_data(ctx: &Context) -> HashMap<String, String> {
    ctx.value::<LogData>()
        .map(|bag| bag.snapshot())
        .unwrap_or_default()
}

/// Add `field` to the log data kept for the whole request.
///
/// Passing `None` deletes the field. Adding to a context that was never given a
/// bag stores nothing and returns [`LogDataError::Uninitialized`].
pub fn add_log_data<V>(
    ctx: &Context,
    field: impl Into<String>,
    data: Option<V>,
) -> Result<(), LogDataError>
where
    V: ToString,
{
    let field = field.into();

    match (ctx.value::<LogData>(), data) {
        (Some(bag), Some(data)) => {
            bag.write().insert(field, data.to_string());
            Ok(())
        }
        (Some(bag), None) => {
            bag.write().remove(&field);
            Ok(())
        }
        (None, Some(_)) => Err(LogDataError::Uninitialized),
        (None, None) => Ok(()),
    }
}

/// Derive a context holding a fresh, empty bag.
pub fn context_with_empty_log_data(ctx: &Context) -> Context {
    ctx.with_value(LogData::default())
}

/// Merge `additional` into the bag held by `ctx`, or attach a new bag holding
/// `additional` if there is none yet.
///
/// An existing bag is updated in place, so every holder of the chain sees the
/// new fields.
pub fn context_with_log_data<I, K, V>(ctx: &Context, additional: I) -> Context
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    match ctx.value::<LogData>() {
        Some(bag) => {
            bag.extend(additional);
            ctx.clone()
        }
        None => ctx.with_value(additional.into_iter().collect::<LogData>()),
    }
}
