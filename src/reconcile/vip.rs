//! VIP discount reconciler
//!
//! Auto-applies a member's assigned discount code to their cart, at most once
//! per code per cart. Attempts are debounced on `(cart id, customer id)`
//! identity changes and guarded by an in-flight flag, a per-lifetime set of
//! processed attempt keys, and session memory that survives reloads.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{lock, Debouncer, InFlightGuard, SoftRefresh};
use crate::domain::aggregates::Cart;
use crate::domain::events::{ReconcileEvent, ReconcileEventKind};
use crate::domain::value_objects::{AttemptKey, PromotionCode};
use crate::publish::EventSink;
use crate::session_memory::SessionMemory;
use crate::store_api::StoreApi;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason { Unmounted, InFlight, MissingIdentity, AlreadyProcessed }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VipOutcome {
    Skipped { reason: SkipReason },
    NotEligible,
    AlreadyApplied { code: String },
    PreviouslyAttempted { code: String },
    Applied { code: String },
    Rejected { code: String },
    Failed { reason: String },
}

impl VipOutcome {
    fn skipped(reason: SkipReason) -> Self { Self::Skipped { reason } }
}

#[derive(Debug, Default)]
struct VipState {
    cart: Option<Cart>,
    customer_id: Option<String>,
    /// `None` until the first observation; afterwards the last customer seen.
    observed_customer: Option<Option<String>>,
    scheduled: Option<AttemptKey>,
    processed: HashSet<AttemptKey>,
}

impl VipState {
    fn attempt_key(&self) -> Option<AttemptKey> {
        let cart_id = self.cart.as_ref().map(Cart::id).filter(|id| !id.is_empty())?;
        let customer_id = self.customer_id.as_deref().filter(|id| !id.is_empty())?;
        Some(AttemptKey::new(cart_id, customer_id))
    }
}

struct VipInner {
    session_id: String,
    api: Arc<dyn StoreApi>,
    memory: SessionMemory,
    refresh: Arc<dyn SoftRefresh>,
    events: Arc<dyn EventSink>,
    in_flight: Arc<AtomicBool>,
    mounted: AtomicBool,
    state: Mutex<VipState>,
}

pub struct VipDiscountReconciler { inner: Arc<VipInner>, debouncer: Debouncer }

impl VipDiscountReconciler {
    pub fn new(
        session_id: impl Into<String>,
        api: Arc<dyn StoreApi>,
        memory: SessionMemory,
        refresh: Arc<dyn SoftRefresh>,
        events: Arc<dyn EventSink>,
        settle_delay: Duration,
    ) -> Self {
        let inner = VipInner {
            session_id: session_id.into(), api, memory, refresh, events,
            in_flight: Arc::new(AtomicBool::new(false)), mounted: AtomicBool::new(true), state: Mutex::new(VipState::default()),
        };
        Self { inner: Arc::new(inner), debouncer: Debouncer::new(settle_delay) }
    }

    pub fn is_in_flight(&self) -> bool { self.inner.in_flight.load(Ordering::Acquire) }
    pub fn is_pending(&self) -> bool { self.debouncer.is_pending() }

    /// Records the latest snapshot. A change of cart or customer identity
    /// restarts the settle timer; a customer change also forgets prior attempts.
    pub async fn observe(&self, cart: Option<&Cart>, customer_id: Option<&str>) {
        if !self.inner.mounted.load(Ordering::Acquire) { return; }
        let customer_id = customer_id.map(str::to_string);

        let (identity_changed, reschedule, key) = {
            let mut state = lock(&self.inner.state);
            let identity_changed = state.observed_customer.as_ref().is_some_and(|seen| *seen != customer_id);
            state.observed_customer = Some(customer_id.clone());
            state.cart = cart.cloned();
            state.customer_id = customer_id;
            if identity_changed {
                state.processed.clear();
                state.scheduled = None;
            }
            let key = state.attempt_key();
            let reschedule = key != state.scheduled || identity_changed;
            state.scheduled = key.clone();
            (identity_changed, reschedule, key)
        };

        if identity_changed {
            debug!(session = %self.inner.session_id, "customer changed, clearing VIP discount memory");
            self.inner.memory.clear().await;
        }
        if !reschedule { return; }
        match key {
            Some(key) => {
                debug!(session = %self.inner.session_id, attempt = %key, "scheduling VIP discount check");
                let inner = self.inner.clone();
                self.debouncer.schedule(async move { inner.attempt().await; });
            }
            None => self.debouncer.cancel(),
        }
    }

    /// Runs one attempt immediately against the latest snapshot.
    pub async fn attempt_now(&self) -> VipOutcome { self.inner.attempt().await }

    /// Cancels any pending attempt. Completions still in flight no longer
    /// touch reconciler state or trigger a refresh.
    pub fn shutdown(&self) {
        self.inner.mounted.store(false, Ordering::Release);
        self.debouncer.cancel();
    }
}

impl Drop for VipDiscountReconciler {
    fn drop(&mut self) { self.shutdown(); }
}

impl VipInner {
    fn mounted(&self) -> bool { self.mounted.load(Ordering::Acquire) }
    fn in_flight(&self) -> bool { self.in_flight.load(Ordering::Acquire) }

    fn mark_processed(&self, key: &AttemptKey) {
        if self.mounted() { lock(&self.state).processed.insert(key.clone()); }
    }

    fn publish(&self, cart_id: &str, kind: ReconcileEventKind) {
        self.events.publish(ReconcileEvent::new(&self.session_id, cart_id, kind));
    }

    async fn attempt(&self) -> VipOutcome {
        if !self.mounted() { return VipOutcome::skipped(SkipReason::Unmounted); }
        if self.in_flight() { return VipOutcome::skipped(SkipReason::InFlight); }

        let (key, cart) = {
            let state = lock(&self.state);
            let Some(key) = state.attempt_key() else { return VipOutcome::skipped(SkipReason::MissingIdentity) };
            if state.processed.contains(&key) { return VipOutcome::skipped(SkipReason::AlreadyProcessed); }
            let Some(cart) = state.cart.clone() else { return VipOutcome::skipped(SkipReason::MissingIdentity) };
            (key, cart)
        };

        let discount = match self.api.get_vip_discount().await {
            Ok(discount) => discount,
            Err(e) => {
                warn!(session = %self.session_id, "VIP discount lookup failed: {}", e);
                return VipOutcome::Failed { reason: e.to_string() };
            }
        };
        if !self.mounted() { return VipOutcome::skipped(SkipReason::Unmounted); }
        if self.in_flight() { return VipOutcome::skipped(SkipReason::InFlight); }

        let Some(code) = discount.code() else {
            debug!(session = %self.session_id, "customer has no VIP discount");
            return VipOutcome::NotEligible;
        };

        if cart.has_promotion(&code) {
            self.memory.set(key.cart_id(), &code).await;
            self.mark_processed(&key);
            return VipOutcome::AlreadyApplied { code: code.to_string() };
        }
        if self.memory.get(key.cart_id()).await.as_ref() == Some(&code) {
            debug!(session = %self.session_id, cart = %key.cart_id(), code = %code, "VIP discount already attempted this session");
            self.mark_processed(&key);
            return VipOutcome::PreviouslyAttempted { code: code.to_string() };
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            return VipOutcome::skipped(SkipReason::InFlight);
        };
        let codes = with_code(cart.promotion_codes(), &code);
        let result = self.api.apply_promotions(key.cart_id(), &codes).await;

        // recorded even when the backend drops the code, so it is not retried this session
        self.memory.set(key.cart_id(), &code).await;
        self.mark_processed(&key);

        match result {
            Ok(updated) if updated.has_promotion(&code) => {
                info!(session = %self.session_id, cart = %key.cart_id(), code = %code, "VIP discount applied");
                self.publish(key.cart_id(), ReconcileEventKind::VipDiscountApplied { code: code.to_string() });
                if self.mounted() { self.refresh.refresh(); }
                VipOutcome::Applied { code: code.to_string() }
            }
            Ok(_) => {
                info!(session = %self.session_id, cart = %key.cart_id(), code = %code, "VIP discount not accepted by cart");
                self.publish(key.cart_id(), ReconcileEventKind::VipDiscountRejected { code: code.to_string() });
                VipOutcome::Rejected { code: code.to_string() }
            }
            Err(e) => {
                warn!(session = %self.session_id, cart = %key.cart_id(), "Failed to apply VIP discount: {}", e);
                self.publish(key.cart_id(), ReconcileEventKind::VipDiscountFailed { code: code.to_string(), reason: e.to_string() });
                VipOutcome::Failed { reason: e.to_string() }
            }
        }
    }
}

/// Existing codes (deduplicated, order kept) followed by `code`.
fn with_code(existing: Vec<PromotionCode>, code: &PromotionCode) -> Vec<PromotionCode> {
    let mut seen = HashSet::new();
    let mut codes: Vec<PromotionCode> = existing.into_iter().filter(|c| seen.insert(c.clone())).collect();
    if !seen.contains(code) { codes.push(code.clone()); }
    codes
}
