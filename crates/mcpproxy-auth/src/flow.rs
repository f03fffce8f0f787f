//! End-to-end OAuth 2.1 flow orchestration.
//! Drives: discovery → DCR (if the server has no pre-registered client) →
//! authorization-code+PKCE, falling back to device-code when the server
//! advertises no loopback-friendly authorization endpoint → token
//! persistence. The whole flow is bounded by a 5 minute hard ceiling; a
//! caller that lets the returned future run past it gets
//! [`OAuthFlowError::Timeout`] instead of hanging the upstream's state
//! machine forever.

use crate::dcr::{self, DcrError, RegisteredClient};
use crate::discovery::{AuthorizationServerMetadata, DiscoveryError, DiscoveryFetcher};
use crate::pkce::PkcePair;
use crate::tokens::{TokenSet, TokenStore, TokenStoreError};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hard ceiling on an interactive OAuth flow, 
pub const FLOW_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("dynamic client registration failed: {0}")]
    Registration(#[from] DcrError),
    #[error("token storage failed: {0}")]
    Storage(#[from] TokenStoreError),
    #[error("http error: {0}")]
    Http(String),
    #[error("token endpoint rejected the request: {0}")]
    TokenRejected(String),
    #[error("authorization server supports neither authorization-code nor device-code flows")]
    NoUsableGrant,
    #[error("flow exceeded the 5 minute authorization ceiling")]
    Timeout,
    #[error("flow was cancelled")]
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_expires_in() -> i64 {
    3600
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl From<TokenResponse> for TokenSet {
    fn from(resp: TokenResponse) -> Self {
        TokenSet {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(resp.expires_in),
            token_type: resp.token_type,
        }
    }
}

/// Instructions for a human to complete an interactive grant: either
/// "open this URL, we're listening on a loopback redirect" or "go enter
/// this code at this verification URL" for device flow.
#[derive(Debug, Clone)]
pub enum AuthorizationPrompt {
    AuthorizationCode { authorize_url: String, redirect_uri: String, state: String },
    DeviceCode { verification_uri: String, user_code: String, device_code: String, interval: Duration },
}

pub struct OAuthFlow {
    http: reqwest::Client,
    discovery: DiscoveryFetcher,
    store: Arc<dyn TokenStore>,
}

impl OAuthFlow {
    pub fn new(store: Arc<dyn TokenStore>) -> Result<Self, OAuthFlowError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OAuthFlowError::Http(e.to_string()))?;
        Ok(Self { http, discovery: DiscoveryFetcher::new()?, store })
    }

    /// Runs discovery (and DCR if `client_id` is absent), returning both
    /// the resolved metadata and the client the flow should authenticate
    /// as.
    pub async fn prepare(
        &self,
        issuer: &str,
        client_id: Option<&str>,
        redirect_uri: &str,
    ) -> Result<(AuthorizationServerMetadata, String), OAuthFlowError> {
        let metadata = self.discovery.fetch(issuer).await?;
        if let Some(id) = client_id {
            return Ok((metadata, id.to_string()));
        }
        let endpoint = metadata
            .registration_endpoint
            .clone()
            .ok_or(OAuthFlowError::Registration(DcrError::NotSupported))?;
        let registered: RegisteredClient = dcr::register(&self.http, &endpoint, redirect_uri).await?;
        Ok((metadata, registered.client_id))
    }

    /// Builds the authorization-code + PKCE redirect URL and the
    /// matching verifier the caller must hold onto until the redirect
    /// lands.
    pub fn build_authorization_code_prompt(
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
        redirect_uri: &str,
    ) -> (AuthorizationPrompt, PkcePair) {
        let pkce = PkcePair::generate();
        let state = Uuid::new_v4().to_string();
        let authorize_url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method={}",
            metadata.authorization_endpoint,
            client_id,
            redirect_uri,
            state,
            pkce.challenge,
            PkcePair::challenge_method(),
        );
        (
            AuthorizationPrompt::AuthorizationCode { authorize_url, redirect_uri: redirect_uri.to_string(), state },
            pkce,
        )
    }

    /// Exchanges an authorization code for tokens and persists them.
    pub async fn complete_authorization_code(
        &self,
        server_name: &str,
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenSet, OAuthFlowError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("code_verifier", verifier),
        ];
        let tokens = self.exchange(&metadata.token_endpoint, &params).await?;
        self.store.save(server_name, &tokens).await?;
        Ok(tokens)
    }

    /// Starts a device-code grant, returning the prompt the user must be
    /// shown and the device code the caller polls with.
    pub async fn start_device_code(
        &self,
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
    ) -> Result<AuthorizationPrompt, OAuthFlowError> {
        let endpoint = metadata
            .device_authorization_endpoint
            .as_ref()
            .ok_or(OAuthFlowError::NoUsableGrant)?;
        #[derive(Deserialize)]
        struct DeviceAuthResponse {
            device_code: String,
            user_code: String,
            verification_uri: String,
            #[serde(default = "default_interval")]
            interval: u64,
        }
        fn default_interval() -> u64 {
            5
        }

        let resp = self
            .http
            .post(endpoint)
            .form(&[("client_id", client_id)])
            .send()
            .await
            .map_err(|e| OAuthFlowError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OAuthFlowError::TokenRejected(resp.status().to_string()));
        }
        let body: DeviceAuthResponse = resp.json().await.map_err(|e| OAuthFlowError::Http(e.to_string()))?;
        Ok(AuthorizationPrompt::DeviceCode {
            verification_uri: body.verification_uri,
            user_code: body.user_code,
            device_code: body.device_code,
            interval: Duration::from_secs(body.interval),
        })
    }

    /// Polls the token endpoint until the user completes the device-code
    /// flow, the server reports the code expired, or [`FLOW_TIMEOUT`]
    /// elapses.
    pub async fn poll_device_code(
        &self,
        server_name: &str,
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
        device_code: &str,
        interval: Duration,
    ) -> Result<TokenSet, OAuthFlowError> {
        let deadline = tokio::time::Instant::now() + FLOW_TIMEOUT;
        let mut poll_interval = interval.max(Duration::from_secs(1));
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(OAuthFlowError::Timeout);
            }
            tokio::time::sleep(poll_interval).await;

            let params = [
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("device_code", device_code),
                ("client_id", client_id),
            ];
            match self.exchange(&metadata.token_endpoint, &params).await {
                Ok(tokens) => {
                    self.store.save(server_name, &tokens).await?;
                    return Ok(tokens);
                }
                Err(OAuthFlowError::TokenRejected(reason)) if reason.contains("authorization_pending") => {
                    continue;
                }
                Err(OAuthFlowError::TokenRejected(reason)) if reason.contains("slow_down") => {
                    poll_interval += Duration::from_secs(5);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refreshes an access token using a stored refresh token. Per
    ///, the managed upstream re-enters `Authenticating` only
    /// when *this* call fails, not on every 401 a connection observes
    /// against an otherwise-live cached token.
    pub async fn refresh(
        &self,
        server_name: &str,
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<TokenSet, OAuthFlowError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        let tokens = self.exchange(&metadata.token_endpoint, &params).await?;
        self.store.save(server_name, &tokens).await?;
        Ok(tokens)
    }

    async fn exchange(&self, token_endpoint: &str, params: &[(&str, &str)]) -> Result<TokenSet, OAuthFlowError> {
        let resp = self
            .http
            .post(token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| OAuthFlowError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            debug!(%status, body = %text, "token endpoint rejected exchange");
            return Err(OAuthFlowError::TokenRejected(text));
        }

        let body: TokenResponse = resp.json().await.map_err(|e| OAuthFlowError::Http(e.to_string()))?;
        Ok(body.into())
    }

    /// Loads whatever tokens are cached for a server, warning (not
    /// failing) if the backend errors, since a missing token just means
    /// the caller needs to authenticate.
    pub async fn cached(&self, server_name: &str) -> Option<TokenSet> {
        match self.store.load(server_name).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(server = server_name, error = %e, "failed to load cached tokens");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::InMemoryTokenStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata(server: &MockServer) -> AuthorizationServerMetadata {
        AuthorizationServerMetadata {
            issuer: server.uri(),
            authorization_endpoint: format!("{}/authorize", server.uri()),
            token_endpoint: format!("{}/token", server.uri()),
            registration_endpoint: None,
            device_authorization_endpoint: None,
            code_challenge_methods_supported: vec!["S256".to_string()],
        }
    }

    #[tokio::test]
    async fn authorization_code_exchange_persists_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryTokenStore::default());
        let flow = OAuthFlow::new(store.clone()).unwrap();
        let md = metadata(&server);
        let tokens = flow
            .complete_authorization_code("srv", &md, "client-1", "code-1", "http://127.0.0.1:0/callback", "verifier")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(store.load("srv").await.unwrap().unwrap().access_token, "at");
    }

    #[tokio::test]
    async fn token_endpoint_rejection_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryTokenStore::default());
        let flow = OAuthFlow::new(store).unwrap();
        let md = metadata(&server);
        let err = flow
            .refresh("srv", &md, "client-1", "stale-refresh-token")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthFlowError::TokenRejected(_)));
    }

    #[test]
    fn authorization_code_prompt_embeds_pkce_challenge() {
        let md = AuthorizationServerMetadata {
            issuer: "https://auth.example".to_string(),
            authorization_endpoint: "https://auth.example/authorize".to_string(),
            token_endpoint: "https://auth.example/token".to_string(),
            registration_endpoint: None,
            device_authorization_endpoint: None,
            code_challenge_methods_supported: vec!["S256".to_string()],
        };
        let (prompt, pkce) = OAuthFlow::build_authorization_code_prompt(&md, "client-1", "http://127.0.0.1:0/cb");
        match prompt {
            AuthorizationPrompt::AuthorizationCode { authorize_url,.. } => {
                assert!(authorize_url.contains(&pkce.challenge));
                assert!(authorize_url.contains("code_challenge_method=S256"));
            }
            _ => panic!("expected authorization code prompt"),
        }
    }
}
