//! Login with Amazon access tokens.

use crate::errors::AdsError;
use crate::metrics_defs::TOKEN_REFRESH;
use serde::Deserialize;
use shared::counter;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use url::Url;

/// Tokens are refreshed this long before the vendor says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Exchanges the long-lived refresh token for short-lived access tokens and
/// hands out the cached one while it is still valid.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    // The lock is held across the refresh so concurrent callers refresh once.
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        client: reqwest::Client,
        token_url: Url,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    ) -> Self {
        TokenProvider {
            client,
            token_url,
            client_id,
            client_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, AdsError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + EXPIRY_MARGIN
        {
            return Ok(token.access_token.clone());
        }

        let token = self.refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    /// Drops the cached token so the next call refreshes it. Used after the
    /// vendor rejects a token before its advertised expiry.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedToken, AdsError> {
        counter!(TOKEN_REFRESH).increment(1);

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdsError::Auth(format!("{status}: {body}")));
        }

        let token = response.json::<TokenResponse>().await?;
        tracing::debug!(expires_in = token.expires_in, "refreshed access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}
