use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Entitlement;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur when talking to the billing service
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Subscription state the decision engine needs.
///
/// Object-safe so the engine can hold an `Arc<dyn SubscriptionService>`.
pub trait SubscriptionService: Send + Sync {
    fn entitlement(&self, user_id: Uuid) -> BoxFuture<'_, Result<Entitlement, BillingError>>;

    /// Use up one super-like; no-op for premium users
    fn consume_super_like(&self, user_id: Uuid) -> BoxFuture<'_, Result<(), BillingError>>;
}

/// HTTP client for the billing service.
///
/// Entitlements are cached for `cache_ttl`; a consume drops the user's entry.
pub struct BillingClient {
    base_url: String,
    api_key: String,
    client: Client,
    cache: moka::future::Cache<Uuid, Entitlement>,
}

impl BillingClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        cache_ttl: Duration,
        cache_size: u64,
    ) -> Result<Self, BillingError> {
        let client = Client::builder().timeout(timeout).build()?;

        let cache = moka::future::CacheBuilder::new(cache_size)
            .time_to_live(cache_ttl)
            .build();

        Ok(Self {
            base_url,
            api_key,
            client,
            cache,
        })
    }

    fn entitlement_url(&self, user_id: Uuid) -> String {
        format!(
            "{}/v1/entitlements/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&user_id.to_string())
        )
    }

    async fn fetch_entitlement(&self, user_id: Uuid) -> Result<Entitlement, BillingError> {
        if let Some(cached) = self.cache.get(&user_id).await {
            tracing::trace!("Entitlement cache hit: {}", user_id);
            return Ok(cached);
        }

        let url = self.entitlement_url(user_id);
        tracing::debug!("Fetching entitlement from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(BillingError::NotFound(format!(
                    "No entitlement for user {}",
                    user_id
                )))
            }
            status => {
                return Err(BillingError::Api(format!(
                    "Failed to fetch entitlement: {}",
                    status
                )))
            }
        }

        let entitlement: Entitlement = response
            .json()
            .await
            .map_err(|e| BillingError::InvalidResponse(format!("Failed to parse entitlement: {}", e)))?;

        self.cache.insert(user_id, entitlement).await;
        Ok(entitlement)
    }

    async fn post_consume(&self, user_id: Uuid) -> Result<(), BillingError> {
        let url = format!("{}/super-likes/consume", self.entitlement_url(user_id));

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        self.cache.invalidate(&user_id).await;

        if !response.status().is_success() {
            return Err(BillingError::Api(format!(
                "Failed to consume super-like: {}",
                response.status()
            )));
        }

        Ok(())
    }
}

impl SubscriptionService for BillingClient {
    fn entitlement(&self, user_id: Uuid) -> BoxFuture<'_, Result<Entitlement, BillingError>> {
        Box::pin(self.fetch_entitlement(user_id))
    }

    fn consume_super_like(&self, user_id: Uuid) -> BoxFuture<'_, Result<(), BillingError>> {
        Box::pin(self.post_consume(user_id))
    }
}

/// Fixed entitlements for tests and local runs
#[derive(Debug, Default)]
pub struct StaticEntitlements {
    default: Entitlement,
    grants: Mutex<HashMap<Uuid, Entitlement>>,
}

impl StaticEntitlements {
    /// Every user not explicitly granted gets `default`
    pub fn new(default: Entitlement) -> Self {
        Self {
            default,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn grant(&self, user_id: Uuid, entitlement: Entitlement) {
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, entitlement);
    }

    fn current(&self, user_id: Uuid) -> Entitlement {
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .copied()
            .unwrap_or(self.default)
    }
}

impl SubscriptionService for StaticEntitlements {
    fn entitlement(&self, user_id: Uuid) -> BoxFuture<'_, Result<Entitlement, BillingError>> {
        let entitlement = self.current(user_id);
        Box::pin(async move { Ok(entitlement) })
    }

    fn consume_super_like(&self, user_id: Uuid) -> BoxFuture<'_, Result<(), BillingError>> {
        let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = grants.entry(user_id).or_insert(self.default);
        if !entry.premium {
            entry.super_likes_remaining = entry.super_likes_remaining.saturating_sub(1);
        }
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: String) -> BillingClient {
        BillingClient::new(
            url,
            "test-key".to_string(),
            Duration::from_secs(5),
            Duration::from_secs(60),
            100,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_entitlement_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let user = Uuid::new_v4();

        let mock = server
            .mock("GET", format!("/v1/entitlements/{}", user).as_str())
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"premium": false, "superLikesRemaining": 3}"#)
            .expect(1)
            .create_async()
            .await;

        let billing = client(server.url());
        let first = billing.entitlement(user).await.unwrap();
        let second = billing.entitlement(user).await.unwrap();

        assert_eq!(first, Entitlement { premium: false, super_likes_remaining: 3 });
        assert_eq!(first, second);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_consume_invalidates_cache() {
        let mut server = mockito::Server::new_async().await;
        let user = Uuid::new_v4();
        let path = format!("/v1/entitlements/{}", user);

        let get = server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(r#"{"premium": false, "superLikesRemaining": 1}"#)
            .expect(2)
            .create_async()
            .await;
        let consume = server
            .mock("POST", format!("{}/super-likes/consume", path).as_str())
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let billing = client(server.url());
        billing.entitlement(user).await.unwrap();
        billing.consume_super_like(user).await.unwrap();
        billing.entitlement(user).await.unwrap();

        get.assert_async().await;
        consume.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_user_and_server_error() {
        let mut server = mockito::Server::new_async().await;
        let missing = Uuid::new_v4();
        let broken = Uuid::new_v4();

        server
            .mock("GET", format!("/v1/entitlements/{}", missing).as_str())
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", format!("/v1/entitlements/{}", broken).as_str())
            .with_status(500)
            .create_async()
            .await;

        let billing = client(server.url());
        assert!(matches!(billing.entitlement(missing).await, Err(BillingError::NotFound(_))));
        assert!(matches!(billing.entitlement(broken).await, Err(BillingError::Api(_))));
    }

    #[tokio::test]
    async fn test_static_entitlements_consume() {
        let billing = StaticEntitlements::new(Entitlement { premium: false, super_likes_remaining: 1 });
        let premium = Uuid::new_v4();
        billing.grant(premium, Entitlement { premium: true, super_likes_remaining: 0 });

        let user = Uuid::new_v4();
        billing.consume_super_like(user).await.unwrap();
        assert_eq!(billing.entitlement(user).await.unwrap().super_likes_remaining, 0);

        billing.consume_super_like(premium).await.unwrap();
        assert!(billing.entitlement(premium).await.unwrap().can_super_like());
    }
}
