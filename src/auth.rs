use crate::credentials::{AuthorizedUser, CredentialError, ServiceAccountKey};
use crate::LOG_TARGET;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

/// OAuth scope granting Firestore access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime of a self-signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Upper bound on a token lifetime reported by an endpoint.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Supplies bearer tokens for store requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// Fixed token, used against the emulator.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Holds the last token and refetches it once it is close to expiry.
#[derive(Default)]
struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, CredentialError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse, CredentialError>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(cached.token.clone());
            }
        }

        let fresh = fetch().await?;
        debug!(target: LOG_TARGET, expires_in = fresh.expires_in, "fetched access token");
        let token = fresh.access_token.clone();
        *guard = Some(CachedToken {
            token: fresh.access_token,
            expires_at: expiry_after(Utc::now(), fresh.expires_in),
        });
        Ok(token)
    }
}

fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
}

async fn read_token_response(resp: reqwest::Response) -> Result<TokenResponse, CredentialError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        return Err(CredentialError::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json().await?)
}

#[derive(Debug, Serialize, PartialEq)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn assertion_claims(key: &ServiceAccountKey, now: DateTime<Utc>) -> AssertionClaims<'_> {
    let iat = now.timestamp();
    AssertionClaims {
        iss: &key.client_email,
        scope: DATASTORE_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

/// Exchanges a self-signed RS256 assertion for an access token.
pub struct ServiceAccountTokenSource {
    client: Client,
    key: ServiceAccountKey,
    cache: TokenCache,
}

impl ServiceAccountTokenSource {
    pub fn new(client: Client, key: ServiceAccountKey) -> Self {
        Self {
            client,
            key,
            cache: TokenCache::default(),
        }
    }

    fn sign_assertion(&self) -> Result<String, CredentialError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        let claims = assertion_claims(&self.key, Utc::now());
        Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
    }

    async fn exchange(&self) -> Result<TokenResponse, CredentialError> {
        let assertion = self.sign_assertion()?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        read_token_response(resp).await
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn token(&self) -> Result<String, CredentialError> {
        self.cache.get_or_fetch(move || self.exchange()).await
    }
}

/// Refresh-token grant for `gcloud` user credentials.
pub struct AuthorizedUserTokenSource {
    client: Client,
    user: AuthorizedUser,
    cache: TokenCache,
}

impl AuthorizedUserTokenSource {
    pub fn new(client: Client, user: AuthorizedUser) -> Self {
        Self {
            client,
            user,
            cache: TokenCache::default(),
        }
    }

    async fn refresh(&self) -> Result<TokenResponse, CredentialError> {
        let resp = self
            .client
            .post(&self.user.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.user.client_id.as_str()),
                ("client_secret", self.user.client_secret.as_str()),
                ("refresh_token", self.user.refresh_token.as_str()),
            ])
            .send()
            .await?;
        read_token_response(resp).await
    }
}

#[async_trait]
impl TokenSource for AuthorizedUserTokenSource {
    async fn token(&self) -> Result<String, CredentialError> {
        self.cache.get_or_fetch(move || self.refresh()).await
    }
}

/// Default service account of the compute instance the process runs on.
pub struct MetadataServerTokenSource {
    client: Client,
    base_url: String,
    cache: TokenCache,
}

impl MetadataServerTokenSource {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, METADATA_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            cache: TokenCache::default(),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, CredentialError> {
        let url = format!(
            "{}/instance/service-accounts/default/token",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        read_token_response(resp).await
    }

    /// Project the instance belongs to.
    pub async fn project_id(&self) -> Result<String, CredentialError> {
        let url = format!("{}/project/project-id", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(CredentialError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let project = resp.text().await?.trim().to_string();
        if project.is_empty() {
            return Err(CredentialError::MissingProjectId);
        }
        Ok(project)
    }
}

#[async_trait]
impl TokenSource for MetadataServerTokenSource {
    async fn token(&self) -> Result<String, CredentialError> {
        self.cache.get_or_fetch(move || self.fetch()).await
    }
}
