//! RFC 7591 Dynamic Client Registration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DcrError {
    #[error("authorization server does not advertise a registration endpoint")]
    NotSupported,
    #[error("http error: {0}")]
    Http(String),
    #[error("registration rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: Vec<&'a str>,
    grant_types: Vec<&'a str>,
    response_types: Vec<&'a str>,
    token_endpoint_auth_method: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_id_issued_at: Option<i64>,
}

/// Registers mcpproxy as an OAuth client against `registration_endpoint`,
/// using the loopback redirect URI the local authorization-code listener
/// binds to.
pub async fn register(
    client: &reqwest::Client,
    registration_endpoint: &str,
    redirect_uri: &str,
) -> Result<RegisteredClient, DcrError> {
    let body = RegistrationRequest {
        client_name: "mcpproxy",
        redirect_uris: vec![redirect_uri],
        grant_types: vec!["authorization_code", "refresh_token"],
        response_types: vec!["code"],
        token_endpoint_auth_method: "none",
    };

    let resp = client
        .post(registration_endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| DcrError::Http(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(DcrError::Rejected(format!("{status}: {text}")));
    }

    resp.json::<RegisteredClient>()
        .await
        .map_err(|e| DcrError::Http(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn registers_client_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "client_id": "abc123",
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let registered = register(
            &client,
            &format!("{}/register", server.uri()),
            "http://127.0.0.1:0/callback",
        )
        .await
        .unwrap();
        assert_eq!(registered.client_id, "abc123");
        assert!(registered.client_secret.is_none());
    }

    #[tokio::test]
    async fn surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client_metadata"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = register(
            &client,
            &format!("{}/register", server.uri()),
            "http://127.0.0.1:0/callback",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DcrError::Rejected(_)));
    }
}
