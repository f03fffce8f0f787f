//! OAuth 2.0 Authorization Server Metadata (RFC 8414) / OIDC discovery.
//! Detection entry point for scenario 1: a peer's `401`
//! response carries a `WWW-Authenticate: Bearer authorization_uri="..."`
//! header, which the caller parses with [`parse_www_authenticate`] before
//! falling back to the well-known discovery documents this module fetches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("issuer must use https")]
    InsecureIssuer,
    #[error("http error: {0}")]
    Http(String),
    #[error("malformed discovery document: {0}")]
    Malformed(String),
}

/// OAuth 2.0 Authorization Server Metadata, the fields mcpproxy actually
/// uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported.iter().any(|m| m == "S256")
    }

    pub fn supports_device_code(&self) -> bool {
        self.device_authorization_endpoint.is_some()
    }
}

struct CacheEntry {
    metadata: AuthorizationServerMetadata,
    expires_at: Instant,
}

/// Fetches and caches discovery documents, trying RFC 8414's
/// `/.well-known/oauth-authorization-server` before falling back to OIDC
/// discovery's `/.well-known/openid-configuration`.
pub struct DiscoveryFetcher {
    client: reqwest::Client,
    cache: tokio::sync::Mutex<HashMap<String, CacheEntry>>,
}

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);
const MAX_BODY_BYTES: usize = 10 * 1024;

impl DiscoveryFetcher {
    pub fn new() -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;
        Ok(Self {
            client,
            cache: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    pub async fn fetch(&self, issuer: &str) -> Result<AuthorizationServerMetadata, DiscoveryError> {
        if !issuer.starts_with("https://") && !issuer.starts_with("http://127.0.0.1") && !issuer.starts_with("http://localhost") {
            return Err(DiscoveryError::InsecureIssuer);
        }

        if let Some(cached) = self.cache.lock().await.get(issuer) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.metadata.clone());
            }
        }

        let trimmed = issuer.trim_end_matches('/');
        let candidates = [
            format!("{trimmed}/.well-known/oauth-authorization-server"),
            format!("{trimmed}/.well-known/openid-configuration"),
        ];

        let mut last_err = None;
        for url in candidates {
            match self.fetch_one(&url).await {
                Ok(metadata) => {
                    self.cache.lock().await.insert(
                        issuer.to_string(),
                        CacheEntry {
                            metadata: metadata.clone(),
                            expires_at: Instant::now() + DEFAULT_CACHE_TTL.min(MAX_CACHE_TTL),
                        },
                    );
                    return Ok(metadata);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(DiscoveryError::Malformed("no discovery endpoint responded".to_string())))
    }

    async fn fetch_one(&self, url: &str) -> Result<AuthorizationServerMetadata, DiscoveryError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::Http(format!("{} returned {}", url, resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| DiscoveryError::Http(e.to_string()))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(DiscoveryError::Malformed("discovery document too large".to_string()));
        }
        serde_json::from_slice(&bytes).map_err(|e| DiscoveryError::Malformed(e.to_string()))
    }
}

impl Default for DiscoveryFetcher {
    fn default() -> Self {
        Self::new().expect("default reqwest client construction cannot fail")
    }
}

/// Parses a `WWW-Authenticate: Bearer authorization_uri="...", resource="..."`
/// header value.
pub fn parse_www_authenticate(header: &str) -> Option<(String, Option<String>)> {
    if !header.trim_start().starts_with("Bearer") {
        return None;
    }
    let mut authorization_uri = None;
    let mut resource = None;
    for part in header.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("authorization_uri=") {
            authorization_uri = Some(v.trim_matches('"').to_string());
        } else if let Some(v) = part.strip_prefix("resource=") {
            resource = Some(v.trim_matches('"').to_string());
        }
    }
    authorization_uri.map(|uri| (uri, resource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_www_authenticate_header() {
        let header = r#"Bearer authorization_uri="http://127.0.0.1:9999/authorize", resource="https://api.example""#;
        let (uri, resource) = parse_www_authenticate(header).unwrap();
        assert_eq!(uri, "http://127.0.0.1:9999/authorize");
        assert_eq!(resource.as_deref(), Some("https://api.example"));
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        assert!(parse_www_authenticate("Basic realm=\"x\"").is_none());
    }

    #[tokio::test]
    async fn fetches_rfc8414_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "code_challenge_methods_supported": ["S256"],
            })))
            .mount(&server)
            .await;

        let fetcher = DiscoveryFetcher::new().unwrap();
        let metadata = fetcher.fetch(&server.uri()).await.unwrap();
        assert!(metadata.supports_pkce());
        assert!(!metadata.supports_device_code());
    }
}
