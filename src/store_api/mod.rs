//! Store API seam: the remote, authoritative cart service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::Cart;
use crate::domain::value_objects::PromotionCode;
use crate::Result;

pub mod http;
#[cfg(test)]
pub(crate) mod fake;

pub use http::MedusaStoreClient;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipDiscount {
    pub is_vip: bool,
    #[serde(default)]
    pub discount_code: Option<String>,
}

impl VipDiscount {
    /// The assigned code, if the customer is a VIP and has one.
    pub fn code(&self) -> Option<PromotionCode> {
        if !self.is_vip { return None; }
        self.discount_code.as_deref().and_then(|c| PromotionCode::new(c).ok())
    }
}

#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Reconciles automatic bundle promotions server-side. Idempotent.
    async fn sync_bundle_promotions(&self, cart_id: &str) -> Result<()>;

    async fn get_vip_discount(&self) -> Result<VipDiscount>;

    /// Requests the given codes on the cart. Ineligible codes are dropped by
    /// the backend, so callers must inspect the returned cart.
    async fn apply_promotions(&self, cart_id: &str, codes: &[PromotionCode]) -> Result<Cart>;

    /// Customer credentials for subsequent calls; `None` after logout.
    fn set_auth_token(&self, _token: Option<String>) {}
}
