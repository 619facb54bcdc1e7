//! Cart Aggregate
//!
//! Read-only snapshot of the remote cart. Mutations happen through the store
//! API, which returns a fresh snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use crate::domain::value_objects::PromotionCode;

pub const BUNDLE_ID_KEY: &str = "bundle_id";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    id: String,
    #[serde(default)]
    currency_code: String,
    #[serde(default = "empty_items")]
    items: Arc<[LineItem]>,
    #[serde(default)]
    promotions: Vec<AppliedPromotion>,
}

fn empty_items() -> Arc<[LineItem]> { Arc::from(Vec::new()) }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl LineItem {
    pub fn new(id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self { id: id.into(), product_id: Some(product_id.into()), metadata: None }
    }

    pub fn bundled(id: impl Into<String>, product_id: impl Into<String>, bundle_id: impl Into<String>) -> Self {
        let metadata = HashMap::from([(BUNDLE_ID_KEY.to_string(), serde_json::Value::String(bundle_id.into()))]);
        Self { metadata: Some(metadata), ..Self::new(id, product_id) }
    }

    /// Bundle tag from metadata; blank tags count as untagged.
    pub fn bundle_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.get(BUNDLE_ID_KEY)?.as_str().filter(|b| !b.is_empty())
    }

    /// Product id, falling back to the line item id for items without one.
    pub fn member_id(&self) -> &str { self.product_id.as_deref().unwrap_or(&self.id) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub is_automatic: bool,
}

impl AppliedPromotion {
    pub fn manual(code: impl Into<String>) -> Self { Self { id: None, code: Some(code.into()), is_automatic: false } }
    pub fn automatic(code: impl Into<String>) -> Self { Self { is_automatic: true, ..Self::manual(code) } }
}

impl Cart {
    pub fn new(id: impl Into<String>, currency: &str) -> Self {
        Self { id: id.into(), currency_code: currency.to_string(), items: empty_items(), promotions: vec![] }
    }

    pub fn with_items(mut self, items: Vec<LineItem>) -> Self { self.items = Arc::from(items); self }
    pub fn with_promotions(mut self, promotions: Vec<AppliedPromotion>) -> Self { self.promotions = promotions; self }

    pub fn id(&self) -> &str { &self.id }
    pub fn currency_code(&self) -> &str { &self.currency_code }
    pub fn items(&self) -> &[LineItem] { &self.items }
    /// Shared handle to the items, used for identity-based memoization.
    pub fn items_handle(&self) -> &Arc<[LineItem]> { &self.items }
    pub fn promotions(&self) -> &[AppliedPromotion] { &self.promotions }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Codes of all promotions on the cart that carry one, in cart order.
    pub fn promotion_codes(&self) -> Vec<PromotionCode> {
        self.promotions.iter().filter_map(|p| p.code.clone()).filter_map(|c| PromotionCode::new(c).ok()).collect()
    }

    pub fn has_promotion(&self, code: &PromotionCode) -> bool {
        self.promotions.iter().filter_map(|p| p.code.as_deref()).any(|c| code.matches(c))
    }
}

/// `bundle_id -> product ids` for the bundled items currently in a cart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BundleMembership(BTreeMap<String, BTreeSet<String>>);

impl BundleMembership {
    pub fn from_cart(cart: Option<&Cart>) -> Self {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for item in cart.map(Cart::items).unwrap_or_default() {
            if let Some(bundle_id) = item.bundle_id() {
                map.entry(bundle_id.to_string()).or_default().insert(item.member_id().to_string());
            }
        }
        Self(map)
    }

    pub fn contains(&self, bundle_id: &str) -> bool { self.0.contains_key(bundle_id) }
    pub fn members(&self, bundle_id: &str) -> Option<&BTreeSet<String>> { self.0.get(bundle_id) }
    pub fn bundle_count(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Bundles present in `previous` that have no members left here.
    /// A bundle that only shrank is not reported.
    pub fn removed_since(&self, previous: &BundleMembership) -> Vec<String> {
        previous.0.keys().filter(|b| !self.contains(b)).cloned().collect()
    }
}
