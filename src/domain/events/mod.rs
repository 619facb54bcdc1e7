//! Domain events
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub id: Uuid,
    pub session_id: String,
    pub cart_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ReconcileEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileEventKind {
    BundleSyncRequested { removed_bundles: Vec<String> },
    BundleSyncFailed { reason: String },
    VipDiscountApplied { code: String },
    VipDiscountRejected { code: String },
    VipDiscountFailed { code: String, reason: String },
}

impl ReconcileEventKind {
    /// Subject suffix used when the event is published on a message bus.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::BundleSyncRequested { .. } => "bundle_sync_requested",
            Self::BundleSyncFailed { .. } => "bundle_sync_failed",
            Self::VipDiscountApplied { .. } => "vip_discount_applied",
            Self::VipDiscountRejected { .. } => "vip_discount_rejected",
            Self::VipDiscountFailed { .. } => "vip_discount_failed",
        }
    }
}

impl ReconcileEvent {
    pub fn new(session_id: impl Into<String>, cart_id: impl Into<String>, kind: ReconcileEventKind) -> Self {
        Self { id: Uuid::now_v7(), session_id: session_id.into(), cart_id: cart_id.into(), occurred_at: Utc::now(), kind }
    }
}
