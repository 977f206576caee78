//! OAuth token lifecycle (spec §4.2). The token is mutated only here;
//! every other component reads it through [`AuthManager::access_token`].

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use hvac_core::retry::RetryPolicy;
use hvac_core::storage::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CloudError;
use crate::types::TokenResponse;

mod epoch_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        dt.timestamp_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = i64::deserialize(d)?;
        Utc.timestamp_millis_opt(millis).single().ok_or_else(|| serde::de::Error::custom("invalid epoch millis"))
    }
}

/// Persisted token shape (spec §6): `{accessToken, refreshToken,
/// expiresAt, tokenType, scope}`, `expiresAt` as epoch millis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(with = "epoch_millis")]
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

/// Hard-expired threshold: a token within 5 minutes of `expiresAt` is
/// treated as already expired. Proactive-refresh threshold: a token
/// within 1 hour of expiry is refreshed ahead of need.
const HARD_EXPIRY_WINDOW: ChronoDuration = ChronoDuration::minutes(5);
const PROACTIVE_REFRESH_WINDOW: ChronoDuration = ChronoDuration::hours(1);

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= HARD_EXPIRY_WINDOW
    }

    pub fn needs_proactive_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now <= PROACTIVE_REFRESH_WINDOW
    }
}

pub struct AuthManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    token_path: PathBuf,
    retry: RetryPolicy,
    token: Mutex<Option<Token>>,
}

impl AuthManager {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_path: token_path.into(),
            retry: RetryPolicy::default(),
            token: Mutex::new(None),
        }
    }

    /// Loads the persisted token, if any. A token already past its hard
    /// expiry window is discarded rather than kept around uselessly. A
    /// corrupt or unreadable token file is logged and treated the same
    /// as "no token" — cold start should never be fatal (open question,
    /// see DESIGN.md).
    pub async fn load(&self) -> Result<(), CloudError> {
        match read_json::<Token>(&self.token_path).await {
            Ok(Some(token)) => {
                if token.is_expired(Utc::now()) {
                    tracing::info!("discarding persisted token past its hard expiry window");
                    *self.token.lock().await = None;
                } else {
                    *self.token.lock().await = Some(token);
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to load persisted token, starting unauthenticated");
            }
        }
        Ok(())
    }

    pub async fn access_token(&self) -> Option<String> {
        self.token.lock().await.as_ref().map(|t| t.access_token.clone())
    }

    pub async fn has_auth(&self) -> bool {
        let now = Utc::now();
        self.token.lock().await.as_ref().map(|t| !t.is_expired(now)).unwrap_or(false)
    }

    /// Ensures a usable token exists, refreshing reactively if the
    /// current one is hard-expired or absent. Returns whether the caller
    /// now has a valid token to act with.
    pub async fn ensure_valid_token(&self) -> bool {
        if self.has_auth().await {
            return true;
        }
        let Some(refresh_token) = self.current_refresh_token().await else {
            return false;
        };
        self.refresh_token(&refresh_token).await.is_ok()
    }

    /// Proactively refreshes a token nearing expiry, even though it's
    /// still technically valid. Intended to be called on an hourly cron.
    pub async fn check_and_refresh_token(&self) -> bool {
        let now = Utc::now();
        let needs_refresh = self.token.lock().await.as_ref().map(|t| t.needs_proactive_refresh(now)).unwrap_or(false);
        if !needs_refresh {
            return true;
        }
        let Some(refresh_token) = self.current_refresh_token().await else {
            return false;
        };
        self.refresh_token(&refresh_token).await.is_ok()
    }

    async fn current_refresh_token(&self) -> Option<String> {
        self.token.lock().await.as_ref().and_then(|t| t.refresh_token.clone())
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<(), CloudError> {
        let basic = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        let http = self.http.clone();
        let url = self.token_url.clone();
        let refresh_token = refresh_token.to_string();

        let response: TokenResponse = self
            .retry
            .run("refresh_token", CloudError::classification, || {
                let http = http.clone();
                let url = url.clone();
                let basic = basic.clone();
                let refresh_token = refresh_token.clone();
                async move {
                    let resp = http
                        .post(&url)
                        .header("Authorization", format!("Basic {basic}"))
                        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
                        .send()
                        .await?;
                    let status = resp.status();
                    if status.is_success() {
                        resp.json::<TokenResponse>().await.map_err(CloudError::Request)
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        Err(CloudError::from_status(status, body))
                    }
                }
            })
            .await?;

        let now = Utc::now();
        let mut guard = self.token.lock().await;
        let previous_refresh_token = guard.as_ref().and_then(|t| t.refresh_token.clone());
        let token = Token {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            expires_at: now + ChronoDuration::seconds(response.expires_in as i64),
            token_type: response.token_type,
            scope: response.scope,
        };
        *guard = Some(token.clone());
        drop(guard);

        write_json_atomic(&self.token_path, &token)
            .await
            .map_err(|e| CloudError::Permanent { status: 0, body: e.to_string() })?;
        Ok(())
    }

    pub async fn clear(&self) {
        *self.token.lock().await = None;
        let _ = tokio::fs::remove_file(&self.token_path).await;
    }
}
