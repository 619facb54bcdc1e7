//! Bundle promotion reconciler
//!
//! Watches bundle membership across observations and asks the store to
//! re-evaluate bundle promotions once a bundle has no items left in the cart.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{lock, InFlightGuard};
use crate::domain::aggregates::{BundleMembership, Cart, LineItem};
use crate::domain::events::{ReconcileEvent, ReconcileEventKind};
use crate::domain::value_objects::Fingerprint;
use crate::publish::EventSink;
use crate::store_api::StoreApi;

/// Caches the fingerprint of the last items collection it was given.
#[derive(Debug, Default)]
pub struct FingerprintMemo { items: Option<Arc<[LineItem]>>, fingerprint: Fingerprint }

impl FingerprintMemo {
    pub fn fingerprint(&mut self, cart: Option<&Cart>) -> Fingerprint {
        let Some(cart) = cart else { return Fingerprint::default() };
        let items = cart.items_handle();
        if self.items.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, items)) {
            return self.fingerprint.clone();
        }
        self.fingerprint = Fingerprint::of(Some(cart));
        self.items = Some(items.clone());
        self.fingerprint.clone()
    }
}

/// Result of one observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundlePass {
    /// Composition unchanged since the last scan.
    Unchanged,
    /// A sync is in flight; the observation was not consumed.
    Busy,
    Scanned { bundles: usize },
    Synced { removed: Vec<String> },
    SyncFailed { removed: Vec<String> },
}

#[derive(Debug, Default)]
struct BundleState {
    cart_id: Option<String>,
    last_fingerprint: Option<Fingerprint>,
    baseline: BundleMembership,
    memo: FingerprintMemo,
}

pub struct BundlePromotionReconciler {
    session_id: String,
    api: Arc<dyn StoreApi>,
    events: Arc<dyn EventSink>,
    syncing: Arc<AtomicBool>,
    state: Mutex<BundleState>,
}

impl BundlePromotionReconciler {
    pub fn new(session_id: impl Into<String>, api: Arc<dyn StoreApi>, events: Arc<dyn EventSink>) -> Self {
        Self { session_id: session_id.into(), api, events, syncing: Arc::new(AtomicBool::new(false)), state: Mutex::new(BundleState::default()) }
    }

    pub fn is_syncing(&self) -> bool { self.syncing.load(Ordering::Acquire) }

    /// Scans `cart` and syncs bundle promotions when a bundle has left it.
    ///
    /// The sync runs on its own task holding the in-flight guard, so dropping
    /// the returned future never cancels a started call or loses a removal.
    pub async fn observe(&self, cart: Option<&Cart>) -> BundlePass {
        if self.is_syncing() { return BundlePass::Busy; }

        let (guard, cart_id, removed) = {
            let mut state = lock(&self.state);
            // a sync may have started between the check above and the lock
            if self.is_syncing() { return BundlePass::Busy; }
            let fingerprint = state.memo.fingerprint(cart);
            let cart_id = cart.map(|c| c.id().to_string());

            if cart_id.is_some() && state.cart_id.is_some() && cart_id != state.cart_id {
                debug!(session = %self.session_id, "cart replaced, resetting bundle baseline");
                state.baseline = BundleMembership::default();
                state.last_fingerprint = None;
            }
            state.cart_id = cart_id.clone();
            if state.last_fingerprint.as_ref() == Some(&fingerprint) { return BundlePass::Unchanged; }

            let current = BundleMembership::from_cart(cart);
            let removed = current.removed_since(&state.baseline);
            let cart_id = match cart_id {
                Some(id) if !removed.is_empty() => id,
                _ => {
                    let bundles = current.bundle_count();
                    state.baseline = current;
                    state.last_fingerprint = Some(fingerprint);
                    return BundlePass::Scanned { bundles };
                }
            };
            let Some(guard) = InFlightGuard::try_acquire(&self.syncing) else { return BundlePass::Busy };
            state.baseline = current;
            state.last_fingerprint = Some(fingerprint);
            (guard, cart_id, removed)
        };

        info!(session = %self.session_id, cart = %cart_id, ?removed, "bundle left cart, syncing bundle promotions");
        self.events.publish(ReconcileEvent::new(&self.session_id, &cart_id, ReconcileEventKind::BundleSyncRequested { removed_bundles: removed.clone() }));

        let sync = tokio::spawn(sync_bundles(guard, self.session_id.clone(), cart_id, self.api.clone(), self.events.clone()));
        match sync.await {
            Ok(true) => BundlePass::Synced { removed },
            Ok(false) => BundlePass::SyncFailed { removed },
            Err(e) => {
                warn!(session = %self.session_id, "Bundle promotion sync task ended abnormally: {}", e);
                BundlePass::SyncFailed { removed }
            }
        }
    }
}

/// Runs one sync to completion and releases the in-flight guard. Returns whether it succeeded.
async fn sync_bundles(
    guard: InFlightGuard,
    session_id: String,
    cart_id: String,
    api: Arc<dyn StoreApi>,
    events: Arc<dyn EventSink>,
) -> bool {
    let result = api.sync_bundle_promotions(&cart_id).await;
    drop(guard);
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(session = %session_id, cart = %cart_id, "Bundle promotion sync failed: {}", e);
            events.publish(ReconcileEvent::new(&session_id, &cart_id, ReconcileEventKind::BundleSyncFailed { reason: e.to_string() }));
            false
        }
    }
}
