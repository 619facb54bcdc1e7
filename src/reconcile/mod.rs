//! Cart promotion reconcilers
//!
//! Both reconcilers are fed every cart snapshot the storefront observes and
//! decide for themselves whether anything changed enough to call the store.
//! At most one remote mutation per reconciler is in flight at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

pub mod bundle;
pub mod debounce;
pub mod vip;

pub use bundle::{BundlePass, BundlePromotionReconciler, FingerprintMemo};
pub use debounce::Debouncer;
pub use vip::{SkipReason, VipDiscountReconciler, VipOutcome};

/// Re-fetch server-rendered data for the current view without navigating.
pub trait SoftRefresh: Send + Sync {
    fn refresh(&self);
}

/// Refresh primitive backed by a generation counter that subscribers watch.
#[derive(Debug)]
pub struct RefreshSignal { tx: watch::Sender<u64> }

impl RefreshSignal {
    pub fn new() -> Self { Self { tx: watch::channel(0).0 } }
    pub fn generation(&self) -> u64 { *self.tx.borrow() }
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.tx.subscribe() }
}

impl Default for RefreshSignal { fn default() -> Self { Self::new() } }

impl SoftRefresh for RefreshSignal {
    fn refresh(&self) { self.tx.send_modify(|generation| *generation += 1); }
}

/// Holds an in-flight flag for its lifetime; released on drop.
///
/// Owns a handle to the flag so it can move into a spawned task and outlive
/// the caller that acquired it.
pub(crate) struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

/// Poisoning only means another observer panicked mid-update; the state is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
