//! OpenSASE Storefront Sync
//!
//! Cart promotion reconciliation for a Medusa-backed storefront.
//!
//! ## Features
//! - Bundle promotion sync when a bundle leaves the cart
//! - VIP discount auto-apply, once per code per cart
//! - Session-scoped memory of attempted codes
//! - Per-session cart watchers behind an HTTP sidecar

use thiserror::Error;

pub mod api;
pub mod config;
pub mod domain;
pub mod publish;
pub mod reconcile;
pub mod session_memory;
pub mod store_api;
pub mod watcher;

pub use config::SyncConfig;
pub use domain::aggregates::{AppliedPromotion, BundleMembership, Cart, LineItem};
pub use domain::events::{ReconcileEvent, ReconcileEventKind};
pub use domain::value_objects::{AttemptKey, Fingerprint, PromotionCode};
pub use reconcile::{BundlePass, BundlePromotionReconciler, SoftRefresh, VipDiscountReconciler, VipOutcome};
pub use session_memory::{SessionMemory, SessionStorage};
pub use store_api::{MedusaStoreClient, StoreApi, VipDiscount};
pub use watcher::{CartWatcher, SessionRegistry};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session not found")]
    SessionNotFound,
}

pub type Result<T> = std::result::Result<T, SyncError>;
