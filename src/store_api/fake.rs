//! In-process store API double for reconciler tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{StoreApi, VipDiscount};
use crate::domain::aggregates::{AppliedPromotion, Cart};
use crate::domain::value_objects::PromotionCode;
use crate::{Result, SyncError};

#[derive(Default)]
pub(crate) struct FakeStoreApi {
    pub vip: Mutex<VipDiscount>,
    pub rejected_codes: Mutex<HashSet<PromotionCode>>,
    pub fail_sync: Mutex<bool>,
    pub fail_apply: Mutex<bool>,
    pub sync_calls: Mutex<Vec<String>>,
    pub syncs_finished: Mutex<usize>,
    pub vip_calls: Mutex<usize>,
    pub apply_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub tokens: Mutex<Vec<Option<String>>>,
    /// When set, remote calls wait for a `notify_one` before returning.
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeStoreApi {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn with_vip(code: &str) -> Arc<Self> {
        let api = Self::default();
        *api.vip.lock().unwrap() = VipDiscount { is_vip: true, discount_code: Some(code.to_string()) };
        Arc::new(api)
    }

    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn reject(&self, code: &str) { self.rejected_codes.lock().unwrap().insert(PromotionCode::new(code).unwrap()); }
    pub fn sync_count(&self) -> usize { self.sync_calls.lock().unwrap().len() }
    pub fn finished_sync_count(&self) -> usize { *self.syncs_finished.lock().unwrap() }
    pub fn vip_count(&self) -> usize { *self.vip_calls.lock().unwrap() }
    pub fn apply_count(&self) -> usize { self.apply_calls.lock().unwrap().len() }
    pub fn last_apply(&self) -> Option<(String, Vec<String>)> { self.apply_calls.lock().unwrap().last().cloned() }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate { gate.notified().await; }
    }
}

#[async_trait]
impl StoreApi for FakeStoreApi {
    async fn sync_bundle_promotions(&self, cart_id: &str) -> Result<()> {
        self.sync_calls.lock().unwrap().push(cart_id.to_string());
        self.wait_gate().await;
        *self.syncs_finished.lock().unwrap() += 1;
        if *self.fail_sync.lock().unwrap() { return Err(SyncError::Api { status: 502, message: "bad gateway".into() }); }
        Ok(())
    }

    async fn get_vip_discount(&self) -> Result<VipDiscount> {
        *self.vip_calls.lock().unwrap() += 1;
        Ok(self.vip.lock().unwrap().clone())
    }

    async fn apply_promotions(&self, cart_id: &str, codes: &[PromotionCode]) -> Result<Cart> {
        self.apply_calls.lock().unwrap().push((cart_id.to_string(), codes.iter().map(|c| c.to_string()).collect()));
        self.wait_gate().await;
        if *self.fail_apply.lock().unwrap() { return Err(SyncError::Api { status: 500, message: "boom".into() }); }
        let rejected = self.rejected_codes.lock().unwrap().clone();
        let promotions = codes.iter().filter(|c| !rejected.contains(*c)).map(|c| AppliedPromotion::manual(c.as_str())).collect();
        Ok(Cart::new(cart_id, "usd").with_promotions(promotions))
    }

    fn set_auth_token(&self, token: Option<String>) { self.tokens.lock().unwrap().push(token); }
}
