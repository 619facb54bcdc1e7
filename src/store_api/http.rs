//! Medusa store API client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use super::{StoreApi, VipDiscount};
use crate::config::SyncConfig;
use crate::domain::aggregates::Cart;
use crate::domain::value_objects::PromotionCode;
use crate::{Result, SyncError};

pub const PUBLISHABLE_KEY_HEADER: &str = "x-publishable-api-key";

#[derive(Clone)]
pub struct MedusaStoreClient {
    client: Client,
    base_url: String,
    publishable_key: Option<String>,
    auth_token: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Serialize)]
struct ApplyPromotionsRequest<'a> { promo_codes: Vec<&'a str> }

#[derive(Debug, Deserialize)]
struct CartResponse { cart: Cart }

impl MedusaStoreClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, &config.store_api_url, config.publishable_key.clone()))
    }

    pub fn with_client(client: Client, base_url: &str, publishable_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            publishable_key,
            auth_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Copy of this client sharing the connection pool but with its own token.
    pub fn for_session(&self, auth_token: Option<String>) -> Self {
        Self { auth_token: Arc::new(RwLock::new(auth_token)), ..self.clone() }
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.publishable_key {
            Some(key) => request.header(PUBLISHABLE_KEY_HEADER, key),
            None => request,
        };
        match self.auth_token.read().ok().and_then(|t| t.clone()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() { return Ok(response); }
        let message = response.text().await.unwrap_or_default();
        Err(SyncError::Api { status: status.as_u16(), message })
    }
}

#[async_trait]
impl StoreApi for MedusaStoreClient {
    async fn sync_bundle_promotions(&self, cart_id: &str) -> Result<()> {
        let url = self.url(&format!("/store/carts/{}/bundle-promotions/sync", cart_id));
        let response = self.authorize(self.client.post(url)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_vip_discount(&self) -> Result<VipDiscount> {
        let response = self.authorize(self.client.get(self.url("/store/customers/me/vip-discount"))).send().await?;
        Ok(Self::check(response).await?.json::<VipDiscount>().await?)
    }

    async fn apply_promotions(&self, cart_id: &str, codes: &[PromotionCode]) -> Result<Cart> {
        let body = ApplyPromotionsRequest { promo_codes: codes.iter().map(PromotionCode::as_str).collect() };
        let url = self.url(&format!("/store/carts/{}/promotions", cart_id));
        let response = self.authorize(self.client.post(url)).json(&body).send().await?;
        Ok(Self::check(response).await?.json::<CartResponse>().await?.cart)
    }

    fn set_auth_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.auth_token.write() { *current = token; }
    }
}
