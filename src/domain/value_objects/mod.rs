//! Value Objects for cart reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::aggregates::Cart;

/// Promotion code value object. Equality and hashing ignore case.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromotionCode(String);

impl PromotionCode {
    pub fn new(value: impl Into<String>) -> Result<Self, PromotionCodeError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(PromotionCodeError::Empty); }
        if value.len() > 100 { return Err(PromotionCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    fn folded(&self) -> String { self.0.to_lowercase() }

    /// Case-insensitive comparison against a raw code string.
    pub fn matches(&self, other: &str) -> bool { self.folded() == other.trim().to_lowercase() }
}

impl PartialEq for PromotionCode {
    fn eq(&self, other: &Self) -> bool { self.folded() == other.folded() }
}
impl Eq for PromotionCode {}

impl Hash for PromotionCode {
    fn hash<H: Hasher>(&self, state: &mut H) { self.folded().hash(state) }
}

impl fmt::Display for PromotionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for PromotionCode {
    type Error = PromotionCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PromotionCode> for String {
    fn from(code: PromotionCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PromotionCodeError { Empty, TooLong }
impl std::error::Error for PromotionCodeError {}
impl fmt::Display for PromotionCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Promotion code empty"), Self::TooLong => write!(f, "Promotion code too long") }
    }
}

/// Digest of a cart's line-item/bundle composition.
///
/// Built from the sorted `"{line_item_id}:{bundle_id}"` pairs joined with `|`,
/// so item order and unrelated cart fields (totals, addresses) do not affect it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const SEPARATOR: char = '|';

    pub fn of(cart: Option<&Cart>) -> Self {
        let Some(cart) = cart else { return Self::default() };
        let mut pairs: Vec<String> = cart
            .items()
            .iter()
            .map(|item| format!("{}:{}", item.id, item.bundle_id().unwrap_or("")))
            .collect();
        pairs.sort();
        Self(pairs.join(&Self::SEPARATOR.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Identifies one VIP attempt: a cart paired with the customer viewing it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttemptKey { cart_id: String, customer_id: String }

impl AttemptKey {
    pub fn new(cart_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self { cart_id: cart_id.into(), customer_id: customer_id.into() }
    }
    pub fn cart_id(&self) -> &str { &self.cart_id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}{}", self.cart_id, self.customer_id) }
}
