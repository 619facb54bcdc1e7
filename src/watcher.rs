//! Per-session cart watchers
//!
//! A `CartWatcher` owns both reconcilers for one storefront session and is
//! fed every snapshot that session reports.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::aggregates::Cart;
use crate::publish::EventSink;
use crate::reconcile::{lock, BundlePass, BundlePromotionReconciler, RefreshSignal, VipDiscountReconciler};
use crate::session_memory::{SessionMemory, SessionStorage};
use crate::store_api::StoreApi;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub cart: Option<Cart>,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Absent keeps the session's current token; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub auth_token: Option<Option<String>>,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub bundle_pass: BundlePass,
    pub refresh_generation: u64,
}

pub struct CartWatcher {
    session_id: String,
    api: Arc<dyn StoreApi>,
    bundle: BundlePromotionReconciler,
    vip: VipDiscountReconciler,
    refresh: Arc<RefreshSignal>,
    last_seen: Mutex<Instant>,
}

impl CartWatcher {
    pub fn new(
        session_id: impl Into<String>,
        api: Arc<dyn StoreApi>,
        memory: SessionMemory,
        events: Arc<dyn EventSink>,
        settle_delay: Duration,
    ) -> Self {
        let session_id = session_id.into();
        let refresh = Arc::new(RefreshSignal::new());
        let bundle = BundlePromotionReconciler::new(&session_id, api.clone(), events.clone());
        let vip = VipDiscountReconciler::new(&session_id, api.clone(), memory, refresh.clone(), events, settle_delay);
        Self { session_id, api, bundle, vip, refresh, last_seen: Mutex::new(Instant::now()) }
    }

    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn refresh(&self) -> &RefreshSignal { &self.refresh }
    pub fn vip(&self) -> &VipDiscountReconciler { &self.vip }
    pub fn bundle(&self) -> &BundlePromotionReconciler { &self.bundle }
    pub fn idle_for(&self) -> Duration { lock(&self.last_seen).elapsed() }

    pub async fn observe(&self, snapshot: &CartSnapshot) -> WatchReport {
        *lock(&self.last_seen) = Instant::now();
        if let Some(token) = &snapshot.auth_token {
            self.api.set_auth_token(token.clone());
        }
        self.vip.observe(snapshot.cart.as_ref(), snapshot.customer_id.as_deref()).await;
        let bundle_pass = self.bundle.observe(snapshot.cart.as_ref()).await;
        WatchReport { bundle_pass, refresh_generation: self.refresh.generation() }
    }

    pub fn shutdown(&self) { self.vip.shutdown(); }
}

pub type StoreApiFactory = Arc<dyn Fn() -> Arc<dyn StoreApi> + Send + Sync>;
pub type StorageFactory = Arc<dyn Fn(&str) -> Arc<dyn SessionStorage> + Send + Sync>;

pub struct SessionRegistry {
    watchers: Mutex<HashMap<String, Arc<CartWatcher>>>,
    api_factory: StoreApiFactory,
    storage_factory: StorageFactory,
    events: Arc<dyn EventSink>,
    settle_delay: Duration,
}

impl SessionRegistry {
    pub fn new(api_factory: StoreApiFactory, storage_factory: StorageFactory, events: Arc<dyn EventSink>, settle_delay: Duration) -> Self {
        Self { watchers: Mutex::new(HashMap::new()), api_factory, storage_factory, events, settle_delay }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<CartWatcher>> { lock(&self.watchers).get(session_id).cloned() }

    pub fn get_or_create(&self, session_id: &str) -> Arc<CartWatcher> {
        lock(&self.watchers)
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = %session_id, "creating cart watcher");
                let memory = SessionMemory::new((self.storage_factory)(session_id));
                Arc::new(CartWatcher::new(session_id, (self.api_factory)(), memory, self.events.clone(), self.settle_delay))
            })
            .clone()
    }

    /// Tears the session's watcher down. Returns whether one existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let Some(watcher) = lock(&self.watchers).remove(session_id) else { return false };
        watcher.shutdown();
        true
    }

    /// Tears down every watcher that has not observed a snapshot for longer
    /// than `max_idle`. Returns how many were removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted: Vec<_> = {
            let mut watchers = lock(&self.watchers);
            let idle: Vec<String> = watchers.iter().filter(|(_, w)| w.idle_for() > max_idle).map(|(id, _)| id.clone()).collect();
            idle.iter().filter_map(|id| watchers.remove(id)).collect()
        };
        for watcher in &evicted {
            tracing::debug!(session = %watcher.session_id(), "evicting idle cart watcher");
            watcher.shutdown();
        }
        evicted.len()
    }

    pub fn len(&self) -> usize { lock(&self.watchers).len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::LineItem;
    use crate::publish::NullEventSink;
    use crate::session_memory::InMemorySessionStorage;
    use crate::store_api::fake::FakeStoreApi;

    fn registry(api: Arc<FakeStoreApi>) -> SessionRegistry {
        let api_factory: StoreApiFactory = Arc::new(move || api.clone() as Arc<dyn StoreApi>);
        let storage_factory: StorageFactory = Arc::new(|_: &str| Arc::new(InMemorySessionStorage::new()) as Arc<dyn SessionStorage>);
        SessionRegistry::new(api_factory, storage_factory, Arc::new(NullEventSink), Duration::from_millis(400))
    }

    fn snapshot(items: Vec<LineItem>) -> CartSnapshot {
        CartSnapshot { cart: Some(Cart::new("c1", "usd").with_items(items)), customer_id: Some("cus_1".into()), auth_token: None }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_drives_both_reconcilers() {
        let api = FakeStoreApi::with_vip("VIP10");
        let registry = registry(api.clone());
        let watcher = registry.get_or_create("sess_1");

        let report = watcher.observe(&snapshot(vec![LineItem::bundled("li1", "p1", "bundle-A")])).await;
        assert_eq!(report, WatchReport { bundle_pass: BundlePass::Scanned { bundles: 1 }, refresh_generation: 0 });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.apply_count(), 1);

        let report = watcher.observe(&snapshot(vec![])).await;
        assert_eq!(report.bundle_pass, BundlePass::Synced { removed: vec!["bundle-A".into()] });
        assert_eq!(report.refresh_generation, 1);
        assert_eq!(api.sync_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_reuses_and_removes_watchers() {
        let api = FakeStoreApi::with_vip("VIP10");
        let registry = registry(api.clone());
        let first = registry.get_or_create("sess_1");
        assert!(Arc::ptr_eq(&first, &registry.get_or_create("sess_1")));
        registry.get_or_create("sess_2");
        assert_eq!(registry.len(), 2);

        first.observe(&snapshot(vec![])).await;
        assert!(first.vip().is_pending());
        assert!(registry.remove("sess_1"));
        assert!(!registry.remove("sess_1"));
        assert!(registry.get("sess_1").is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.vip_count(), 0);
    }

    #[tokio::test]
    async fn test_token_only_changes_when_snapshot_carries_one() {
        let api = FakeStoreApi::new();
        let watcher = registry(api.clone()).get_or_create("sess_1");
        let with_token = CartSnapshot { auth_token: Some(Some("tok_1".into())), ..snapshot(vec![]) };
        watcher.observe(&with_token).await;
        watcher.observe(&snapshot(vec![])).await;
        assert_eq!(api.tokens.lock().unwrap().clone(), vec![Some("tok_1".to_string())]);

        let logged_out = CartSnapshot { auth_token: Some(None), ..snapshot(vec![]) };
        watcher.observe(&logged_out).await;
        assert_eq!(api.tokens.lock().unwrap().last().cloned(), Some(None));
        watcher.shutdown();
    }

    #[test]
    fn test_snapshot_tells_missing_token_from_null() {
        let missing: CartSnapshot = serde_json::from_value(serde_json::json!({"customer_id": "cus_1"})).unwrap();
        assert_eq!(missing.auth_token, None);
        let cleared: CartSnapshot = serde_json::from_value(serde_json::json!({"auth_token": null})).unwrap();
        assert_eq!(cleared.auth_token, Some(None));
        let set: CartSnapshot = serde_json::from_value(serde_json::json!({"auth_token": "tok_1"})).unwrap();
        assert_eq!(set.auth_token, Some(Some("tok_1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_watchers_are_evicted() {
        let api = FakeStoreApi::with_vip("VIP10");
        let registry = registry(api.clone());
        let stale = registry.get_or_create("sess_1");
        registry.get_or_create("sess_2");
        stale.observe(&snapshot(vec![])).await;

        tokio::time::advance(Duration::from_secs(200)).await;
        registry.get("sess_2").unwrap().observe(&snapshot(vec![])).await;
        assert_eq!(registry.evict_idle(Duration::from_secs(300)), 0);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(registry.evict_idle(Duration::from_secs(300)), 1);
        assert!(registry.get("sess_1").is_none());
        assert!(registry.get("sess_2").is_some());
    }
}
