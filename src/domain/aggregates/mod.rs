//! Aggregates module
pub mod cart;

pub use cart::{AppliedPromotion, BundleMembership, Cart, LineItem, BUNDLE_ID_KEY};
