use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::error::{GatewayError, GatewayResult};
use crate::cache::{Clock, SystemClock};

/// Renew at least this long before the advertised expiry.
pub const RENEWAL_MARGIN_SECS: u64 = 300;

/// Never hold one token longer than this, whatever the server advertises.
pub const MAX_TOKEN_CACHE_SECS: u64 = 3300;

/// Response of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// One credential exchange against the token endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> GatewayResult<TokenGrant>;
}

/// OAuth2 `client_credentials` grant over a form-encoded POST.
pub struct OAuthClientCredentials {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClientCredentials {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl CredentialExchange for OAuthClientCredentials {
    async fn exchange(&self) -> GatewayResult<TokenGrant> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                error!("❌ Unauthorized - check the client credentials");
            }
            return Err(GatewayError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| GatewayError::Auth(format!("malformed token response: {e}")))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// How long a freshly issued token may be reused.
pub fn token_cache_ttl(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(RENEWAL_MARGIN_SECS).min(MAX_TOKEN_CACHE_SECS))
}

/// Single-slot cache for the upstream bearer token.
///
/// Concurrent callers that find the slot empty queue on one exchange; the
/// ones behind the first take its grant instead of issuing their own, even
/// when that grant is too short-lived to enter the slot.
pub struct TokenManager {
    exchange: Arc<dyn CredentialExchange>,
    slot: RwLock<Option<CachedToken>>,
    /// Last issued token, handed to callers that queued behind its exchange.
    refresh: Mutex<Option<String>>,
    issued: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(exchange: Arc<dyn CredentialExchange>) -> Self {
        Self::with_clock(exchange, Arc::new(SystemClock))
    }

    pub fn with_clock(exchange: Arc<dyn CredentialExchange>, clock: Arc<dyn Clock>) -> Self {
        Self {
            exchange,
            slot: RwLock::new(None),
            refresh: Mutex::new(None),
            issued: AtomicU64::new(0),
            clock,
        }
    }

    pub async fn get_access_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.cached_token() {
            debug!("✅ Using cached access token");
            return Ok(token);
        }

        let seen = self.issued.load(Ordering::Acquire);
        let mut last_issued = self.refresh.lock().await;

        // Otro llamador pudo renovarlo mientras esperábamos
        if let Some(token) = self.cached_token() {
            debug!("✅ Access token refreshed by a concurrent caller");
            return Ok(token);
        }
        if self.issued.load(Ordering::Acquire) != seen {
            if let Some(token) = last_issued.as_ref() {
                debug!("✅ Sharing the access token issued while waiting");
                return Ok(token.clone());
            }
        }

        info!("🔄 Fetching new access token...");
        let grant = self.exchange.exchange().await.map_err(|e| {
            error!("❌ Error fetching access token: {}", e);
            e
        })?;

        let ttl = token_cache_ttl(grant.expires_in);
        *self.slot.write() = Some(CachedToken {
            value: grant.access_token.clone(),
            expires_at: self.clock.now() + ttl,
        });
        *last_issued = Some(grant.access_token.clone());
        self.issued.fetch_add(1, Ordering::Release);

        info!(
            "✅ New access token cached for {} seconds (expires in {}s)",
            ttl.as_secs(),
            grant.expires_in
        );
        Ok(grant.access_token)
    }

    /// Current token, if it is still inside its reuse window. Never refreshes.
    pub fn cached_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.slot
            .read()
            .as_ref()
            .filter(|token| now < token.expires_at)
            .map(|token| token.value.clone())
    }
}
