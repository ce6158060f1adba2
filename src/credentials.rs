//! Access tokens for Google Cloud APIs.
//!
//! The collector never looks at the environment for credentials; it receives a
//! [`CredentialProvider`]. Production uses [`ServiceAccountCredentials`], built
//! from the key file named by `GOOGLE_APPLICATION_CREDENTIALS`.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// Fixed bearer token.
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

/// OAuth2 JWT-bearer flow for a service account key.
pub struct ServiceAccountCredentials {
    http: reqwest::Client,
    client_email: String,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    token_uri: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountCredentials {
    /// Read and validate a key file. Errors here are fatal at startup.
    pub fn from_file(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ApiError::Credentials(format!("cannot read key file {}: {}", path.display(), e))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            ApiError::Credentials(format!("key file {} is not valid JSON: {}", path.display(), e))
        })?;
        Self::from_key(key, timeout)
    }

    pub fn from_key(key: ServiceAccountKey, timeout: Duration) -> Result<Self, ApiError> {
        if key.key_type != "service_account" {
            return Err(ApiError::Credentials(format!(
                "unsupported credential type '{}', expected 'service_account'",
                key.key_type
            )));
        }
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ApiError::Credentials(format!("invalid private key: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::transport("oauth2"))?;

        Ok(Self {
            http,
            client_email: key.client_email,
            key_id: key.private_key_id,
            encoding_key,
            token_uri: key.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            cached: Mutex::new(None),
        })
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn signed_assertion(&self, now: i64) -> Result<String, ApiError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ApiError::Credentials(format!("failed to sign assertion: {}", e)))
    }

    async fn exchange(&self, now: i64) -> Result<CachedToken, ApiError> {
        let assertion = self.signed_assertion(now)?;
        let res = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(ApiError::transport("oauth2"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status { service: "oauth2", status, body });
        }
        let token: TokenResponse = res.json().await.map_err(ApiError::body("oauth2"))?;

        debug!(client_email = %self.client_email, expires_in = ?token.expires_in, "obtained access token");
        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS),
        })
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountCredentials {
    async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }
        let fresh = self.exchange(now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}
