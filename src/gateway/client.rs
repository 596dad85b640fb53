//! HTTP callback client for the core service.
//!
//! One request per process lifetime, bounded timeout, no retries, no
//! caching. A non-success status or transport failure is indistinguishable
//! from a denial to the caller: the gateway fails closed.

use std::time::Duration;

use serde::Deserialize;

use super::GatewayError;
use crate::config::GatewayConfig;

/// Result of an access check: may this identity run this operation, and
/// which storage region serves the repository.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessDecision {
    pub access: bool,
    #[serde(default)]
    pub region: Option<String>,
}

/// Result of a key lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyLookup {
    pub found: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

pub struct CoreClient {
    http: reqwest::blocking::Client,
    base: String,
    token: Option<String>,
}

impl CoreClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        if cfg.api_url.trim().is_empty() {
            return Err(GatewayError::Config("gateway.api_url is not set".into()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(GatewayError::Callback)?;
        Ok(Self {
            http,
            base: cfg.api_url.trim_end_matches('/').to_string(),
            token: cfg.api_token.clone(),
        })
    }

    /// `POST <base>/ssh/checkaccess/` — may `username` reach `gitdir`?
    pub fn check_access(
        &self,
        gitdir: &str,
        username: &str,
    ) -> Result<AccessDecision, GatewayError> {
        let mut req = self
            .http
            .post(format!("{}/ssh/checkaccess/", self.base))
            .form(&[("gitdir", gitdir), ("username", username)]);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("token {token}"));
        }
        let resp = req.send().map_err(GatewayError::Callback)?;
        if !resp.status().is_success() {
            // Non-success is a denial, not a retry opportunity.
            return Err(GatewayError::Denied);
        }
        resp.json().map_err(GatewayError::Callback)
    }

    /// `POST <base>/ssh/lookupkey/` — resolve a key to an account.
    pub fn lookup_key(
        &self,
        search_key: &str,
        username: Option<&str>,
    ) -> Result<KeyLookup, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![("search_key", search_key)];
        if let Some(username) = username {
            form.push(("username", username));
        }
        let mut req = self
            .http
            .post(format!("{}/ssh/lookupkey/", self.base))
            .form(&form);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("token {token}"));
        }
        let resp = req.send().map_err(GatewayError::Callback)?;
        if !resp.status().is_success() {
            return Err(GatewayError::Denied);
        }
        resp.json().map_err(GatewayError::Callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn missing_api_url_is_a_config_error() {
        let cfg = GatewayConfig::default();
        assert!(matches!(
            CoreClient::new(&cfg),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn unreachable_service_fails_closed() {
        let cfg = GatewayConfig {
            api_url: "http://127.0.0.1:1/pv".to_string(),
            timeout_secs: 1,
            ..GatewayConfig::default()
        };
        let client = CoreClient::new(&cfg).unwrap();
        let err = client.check_access("tools.git", "alice").unwrap_err();
        assert!(matches!(err, GatewayError::Callback(_)));
    }

    #[test]
    fn decision_parses_with_and_without_region() {
        let d: AccessDecision = serde_json::from_str(r#"{"access": true}"#).unwrap();
        assert!(d.access);
        assert!(d.region.is_none());

        let d: AccessDecision =
            serde_json::from_str(r#"{"access": true, "region": "eu-1"}"#).unwrap();
        assert_eq!(d.region.as_deref(), Some("eu-1"));
    }
}
