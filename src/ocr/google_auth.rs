//! Google API credentials for the Cloud Vision backend.
//!
//! Either a plain API key, or a service account whose JSON key is used to
//! mint short-lived OAuth2 access tokens (RS256 JWT bearer grant).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds before expiry at which a cached token is refreshed.
const REFRESH_MARGIN_SECS: u64 = 60;

#[derive(Clone)]
pub enum GoogleAuth {
    ApiKey(String),
    ServiceAccount(ServiceAccount),
}

#[derive(Clone)]
pub struct ServiceAccount {
    key: ServiceAccountKey,
    /// Cached OAuth2 access token.
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// How a request should carry credentials.
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl ServiceAccount {
    /// Load a service account JSON key from disk.
    pub fn from_key_file(path: &str) -> Result<Self> {
        let key_json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key: {}", path))?;
        Self::from_key_json(&key_json)
    }

    pub fn from_key_json(key_json: &str) -> Result<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(key_json).context("Failed to parse service account key")?;
        info!("Loaded service account {}", key.client_email);
        Ok(Self {
            key,
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    /// Get a valid OAuth2 access token, refreshing if expired.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let mut cache = self.token_cache.lock().await;
        if let Some(ref cached) = *cache {
            if now_secs() < cached.expires_at.saturating_sub(REFRESH_MARGIN_SECS) {
                return Ok(cached.access_token.clone());
            }
        }

        let now = now_secs();
        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": VISION_SCOPE,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Invalid RSA private key in service account JSON")?;
        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let resp: TokenResponse = client
            .post(self.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        debug!("Minted access token valid for {}s", resp.expires_in);
        *cache = Some(CachedToken {
            access_token: resp.access_token.clone(),
            expires_at: now + resp.expires_in,
        });

        Ok(resp.access_token)
    }
}

impl GoogleAuth {
    pub async fn credential(&self, client: &reqwest::Client) -> Result<Credential> {
        match self {
            Self::ApiKey(key) => Ok(Credential::ApiKey(key.clone())),
            Self::ServiceAccount(sa) => Ok(Credential::Bearer(sa.access_token(client).await?)),
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_key_credential() {
        let auth = GoogleAuth::ApiKey("k123".to_string());
        let client = reqwest::Client::new();
        match auth.credential(&client).await.unwrap() {
            Credential::ApiKey(k) => assert_eq!(k, "k123"),
            Credential::Bearer(_) => panic!("expected api key"),
        }
    }

    #[test]
    fn test_parse_service_account_key() {
        let sa = ServiceAccount::from_key_json(
            r#"{"client_email": "ocr@example.iam.gserviceaccount.com", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(sa.token_uri(), TOKEN_URI);
    }

    #[test]
    fn test_missing_key_file_fails() {
        assert!(ServiceAccount::from_key_file("/nonexistent/key.json").is_err());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let sa = ServiceAccount::from_key_json(
            r#"{"client_email": "a@b", "private_key": "not a pem"}"#,
        )
        .unwrap();
        *sa.token_cache.lock().await = Some(CachedToken {
            access_token: "cached".to_string(),
            expires_at: now_secs() + 3600,
        });
        let token = sa.access_token(&reqwest::Client::new()).await.unwrap();
        assert_eq!(token, "cached");
    }
}
