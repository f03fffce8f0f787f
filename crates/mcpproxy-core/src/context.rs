//! `RequestContext` and `OAuthCorrelation`. 

use std::time::Instant;
use uuid::Uuid;

/// Valid client-supplied request id pattern,:
/// `^[A-Za-z0-9_-]{1,256}$`.
pub fn is_valid_request_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 256
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Per-HTTP-request context propagated through the whole handler chain.
/// `request_id` is either the client-supplied value (if valid) or a
/// freshly generated UUID v4.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub start: Instant,
}

impl RequestContext {
    /// Builds a context from a client-supplied header value, if any.
    pub fn new(client_supplied: Option<&str>) -> Self {
        let request_id = match client_supplied {
            Some(candidate) if is_valid_request_id(candidate) => candidate.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Self {
            request_id,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Spans an entire OAuth flow (browser round-trip + callback), distinct
/// from `request_id`.
#[derive(Debug, Clone)]
pub struct OAuthCorrelation {
    pub correlation_id: String,
}

impl OAuthCorrelation {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for OAuthCorrelation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_client_id_is_echoed() {
        let ctx = RequestContext::new(Some("abc-123_XYZ"));
        assert_eq!(ctx.request_id, "abc-123_XYZ");
    }

    #[test]
    fn invalid_client_id_is_replaced() {
        let ctx = RequestContext::new(Some("has a space"));
        assert_ne!(ctx.request_id, "has a space");
        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn absent_client_id_generates_uuid() {
        let ctx = RequestContext::new(None);
        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn rejects_overlong_ids() {
        let too_long = "a".repeat(257);
        assert!(!is_valid_request_id(&too_long));
    }
}
