//! Cancellation identities and the registry that maps them to running effects
//!
//! Any hashable value can identify a class of operation:
//!
//! ```
//! use composable_arch_core::cancellation::CancelId;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct SearchId;
//!
//! assert_eq!(CancelId::new(SearchId), CancelId::new(SearchId));
//! assert_ne!(CancelId::new("search"), CancelId::new(SearchId));
//! ```
//!
//! Ids of different types never compare equal, even if their values hash
//! the same.

use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

/// Values usable as cancellation identities
pub trait CancelKey: Hash + Eq + Debug + Send + Sync + 'static {}

impl<T> CancelKey for T where T: Hash + Eq + Debug + Send + Sync + 'static {}

trait ErasedKey: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn ErasedKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
}

impl<T: CancelKey> ErasedKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn ErasedKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Type-erased cancellation identity
#[derive(Clone)]
pub struct CancelId {
    key: Arc<dyn ErasedKey>,
}

impl CancelId {
    /// Wrap a hashable value as a cancellation identity.
    ///
    /// Wrapping an existing `CancelId` returns it unchanged.
    pub fn new<T: CancelKey>(value: T) -> Self {
        if let Some(id) = (&value as &dyn Any).downcast_ref::<Self>() {
            return id.clone();
        }
        Self {
            key: Arc::new(value),
        }
    }
}

impl PartialEq for CancelId {
    fn eq(&self, other: &Self) -> bool {
        self.key.eq_key(&*other.key)
    }
}

impl Eq for CancelId {}

impl Hash for CancelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash_key(state);
    }
}

impl Debug for CancelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CancelId({:?})", self.key)
    }
}

static SHARED: LazyLock<Arc<CancellationRegistry>> =
    LazyLock::new(|| Arc::new(CancellationRegistry::new()));

/// Table of in-flight cancellable effects, keyed by [`CancelId`].
///
/// Entries are added when a cancellable effect is subscribed and removed when
/// it completes or is cancelled. All cancellation hooks run after the table
/// lock is released.
#[derive(Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<CancelId, Vec<Subscription>>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    /// Register `subscription` under `id`.
    ///
    /// With `cancel_in_flight`, every subscription already registered under
    /// `id` is removed and cancelled before this call returns, so the caller
    /// can start new work knowing the old work can no longer deliver.
    pub fn insert(&self, id: CancelId, subscription: Subscription, cancel_in_flight: bool) {
        let displaced = {
            let mut entries = self.entries.lock();
            let slot = entries.entry(id).or_default();
            let displaced = if cancel_in_flight {
                std::mem::take(slot)
            } else {
                Vec::new()
            };
            slot.push(subscription);
            displaced
        };

        if !displaced.is_empty() {
            tracing::trace!(count = displaced.len(), "Cancelling in-flight effects");
            metrics::counter!("effects_cancelled_total").increment(displaced.len() as u64);
        }
        for subscription in displaced {
            subscription.cancel();
        }
    }

    /// Cancel every subscription registered under `id`.
    ///
    /// Returns how many subscriptions were cancelled.
    pub fn cancel(&self, id: &CancelId) -> usize {
        let cancelled = self.entries.lock().remove(id).unwrap_or_default();
        let count = cancelled.len();

        if count > 0 {
            tracing::debug!(?id, count, "Cancelling effects");
            metrics::counter!("effects_cancelled_total").increment(count as u64);
        }
        for subscription in cancelled {
            subscription.cancel();
        }
        count
    }

    /// Forget `subscription` under `id` without cancelling it
    pub fn remove(&self, id: &CancelId, subscription: &Subscription) {
        let mut entries = self.entries.lock();
        if let Some(slot) = entries.get_mut(id) {
            slot.retain(|existing| !existing.ptr_eq(subscription));
            if slot.is_empty() {
                entries.remove(id);
            }
        }
    }

    /// Whether anything is currently registered under `id`
    #[must_use]
    pub fn is_active(&self, id: &CancelId) -> bool {
        self.entries.lock().contains_key(id)
    }
}

impl Debug for CancellationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationRegistry")
            .field("active_ids", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct TimerId;

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct RowId(u32);

    #[test]
    fn test_ids_compare_by_type_and_value() {
        assert_eq!(CancelId::new(RowId(1)), CancelId::new(RowId(1)));
        assert_ne!(CancelId::new(RowId(1)), CancelId::new(RowId(2)));
        assert_ne!(CancelId::new(1_u32), CancelId::new(RowId(1)));
        assert_eq!(CancelId::new(CancelId::new(TimerId)), CancelId::new(TimerId));
    }

    #[test]
    fn test_insert_with_cancel_in_flight_cancels_previous() {
        let registry = CancellationRegistry::new();
        let first = Subscription::new();
        let second = Subscription::new();

        registry.insert(CancelId::new(TimerId), first.clone(), true);
        registry.insert(CancelId::new(TimerId), second.clone(), true);

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(registry.is_active(&CancelId::new(TimerId)));
    }

    #[test]
    fn test_insert_without_cancel_in_flight_keeps_both() {
        let registry = CancellationRegistry::new();
        let first = Subscription::new();
        let second = Subscription::new();

        registry.insert(CancelId::new(TimerId), first.clone(), false);
        registry.insert(CancelId::new(TimerId), second.clone(), false);

        assert_eq!(registry.cancel(&CancelId::new(TimerId)), 2);
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        assert!(!registry.is_active(&CancelId::new(TimerId)));
    }

    #[test]
    fn test_remove_prunes_empty_entries() {
        let registry = CancellationRegistry::new();
        let subscription = Subscription::new();

        registry.insert(CancelId::new(RowId(7)), subscription.clone(), false);
        registry.remove(&CancelId::new(RowId(7)), &subscription);

        assert!(!registry.is_active(&CancelId::new(RowId(7))));
        assert!(!subscription.is_cancelled());
    }

    #[test]
    fn test_cancel_unknown_id_is_noop() {
        let registry = CancellationRegistry::new();
        assert_eq!(registry.cancel(&CancelId::new("nothing")), 0);
    }
}
