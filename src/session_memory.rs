//! Session-scoped memory of the last VIP code attempted per cart.
//!
//! Single slot: only the most recent `{cartId, code}` pair is kept. Storage
//! failures never surface; reads degrade to "no record" and writes are dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::value_objects::PromotionCode;
use crate::{Result, SyncError};

pub const VIP_MEMORY_KEY: &str = "vip_discount_applied";

/// Key/value storage scoped to one storefront session.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_item(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStorage { items: Mutex<HashMap<String, String>> }

impl InMemorySessionStorage {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(items.get(key).cloned())
    }
    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|e| SyncError::Storage(e.to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|e| SyncError::Storage(e.to_string()))?;
        items.remove(key);
        Ok(())
    }
}

/// Postgres-backed storage, one namespace per session id.
#[derive(Clone)]
pub struct PgSessionStorage { db: PgPool, session_id: String }

impl PgSessionStorage {
    pub fn new(db: PgPool, session_id: impl Into<String>) -> Self { Self { db, session_id: session_id.into() } }
}

#[async_trait]
impl SessionStorage for PgSessionStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM session_storage WHERE session_id = $1 AND key = $2")
            .bind(&self.session_id).bind(key).fetch_optional(&self.db).await.map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(row.map(|r| r.0))
    }
    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT INTO session_storage (session_id, key, value, updated_at) VALUES ($1, $2, $3, NOW()) ON CONFLICT (session_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()")
            .bind(&self.session_id).bind(key).bind(value).execute(&self.db).await.map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }
    async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_storage WHERE session_id = $1 AND key = $2")
            .bind(&self.session_id).bind(key).execute(&self.db).await.map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryRecord { cart_id: String, code: String }

#[derive(Clone)]
pub struct SessionMemory { storage: Arc<dyn SessionStorage> }

impl SessionMemory {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self { Self { storage } }

    pub fn in_memory() -> Self { Self::new(Arc::new(InMemorySessionStorage::new())) }

    /// Code last recorded for `cart_id`, if the slot holds that cart.
    pub async fn get(&self, cart_id: &str) -> Option<PromotionCode> {
        let raw = match self.storage.get_item(VIP_MEMORY_KEY).await {
            Ok(raw) => raw?,
            Err(e) => { tracing::debug!("Session memory read failed: {}", e); return None; }
        };
        let record: MemoryRecord = serde_json::from_str(&raw).ok()?;
        if record.cart_id != cart_id { return None; }
        PromotionCode::new(record.code).ok()
    }

    pub async fn set(&self, cart_id: &str, code: &PromotionCode) {
        let record = MemoryRecord { cart_id: cart_id.to_string(), code: code.as_str().to_string() };
        let write = match serde_json::to_string(&record) {
            Ok(raw) => self.storage.set_item(VIP_MEMORY_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = write { tracing::debug!("Session memory write failed: {}", e); }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.storage.remove_item(VIP_MEMORY_KEY).await {
            tracing::debug!("Session memory clear failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStorage;

    #[async_trait]
    impl SessionStorage for BrokenStorage {
        async fn get_item(&self, _key: &str) -> Result<Option<String>> { Err(SyncError::Storage("unavailable".into())) }
        async fn set_item(&self, _key: &str, _value: &str) -> Result<()> { Err(SyncError::Storage("quota exceeded".into())) }
        async fn remove_item(&self, _key: &str) -> Result<()> { Err(SyncError::Storage("unavailable".into())) }
    }

    fn code(s: &str) -> PromotionCode { PromotionCode::new(s).unwrap() }

    #[tokio::test]
    async fn test_single_slot_per_cart() {
        let memory = SessionMemory::in_memory();
        assert!(memory.get("c1").await.is_none());
        memory.set("c1", &code("VIP10")).await;
        assert_eq!(memory.get("c1").await, Some(code("vip10")));
        memory.set("c2", &code("VIP20")).await;
        assert!(memory.get("c1").await.is_none());
        assert_eq!(memory.get("c2").await, Some(code("VIP20")));
        memory.clear().await;
        assert!(memory.get("c2").await.is_none());
    }

    #[tokio::test]
    async fn test_record_format() {
        let storage = Arc::new(InMemorySessionStorage::new());
        SessionMemory::new(storage.clone()).set("c1", &code("VIP10")).await;
        let raw = storage.get_item(VIP_MEMORY_KEY).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&raw).unwrap(), serde_json::json!({"cartId": "c1", "code": "VIP10"}));
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_missing() {
        let storage = Arc::new(InMemorySessionStorage::new());
        storage.set_item(VIP_MEMORY_KEY, "{not json").await.unwrap();
        assert!(SessionMemory::new(storage).get("c1").await.is_none());
    }

    #[tokio::test]
    async fn test_storage_failures_are_swallowed() {
        let memory = SessionMemory::new(Arc::new(BrokenStorage));
        memory.set("c1", &code("VIP10")).await;
        memory.clear().await;
        assert!(memory.get("c1").await.is_none());
    }
}
