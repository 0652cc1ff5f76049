//! Identity API HTTP client
//!
//! Uses synchronous HTTP (ureq) so a sync run blocks on each page before
//! requesting the next one.

use std::time::Duration;

use super::api::RawResponse;
use crate::config::ApiCredentials;

/// Failure of a single page fetch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    /// The API answered with a status other than 200
    #[error("request to {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
    /// The body was not a JSON list of records
    #[error("response from {endpoint} could not be decoded: {message}")]
    Decode { endpoint: String, message: String },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }
}

/// Issues a single GET against the identity API.
///
/// `endpoint` is relative to the API base, including its query string.
/// Implementations return every HTTP status as a `RawResponse`; only
/// failures to complete the exchange are errors.
pub trait RemoteClient: Send + Sync {
    fn get(&self, endpoint: &str) -> Result<RawResponse, FetchError>;
}

/// Identity API client authenticated with a static API token
pub struct OktaClient {
    agent: ureq::Agent,
    base_url: String,
    api_token: String,
}

impl OktaClient {
    /// Per-request timeout covering connect, send and body read
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new client for the given API base URL and token
    pub fn new(credentials: &ApiCredentials) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Self::REQUEST_TIMEOUT))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            api_token: credentials.api_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

impl RemoteClient for OktaClient {
    fn get(&self, endpoint: &str) -> Result<RawResponse, FetchError> {
        let transport_error = |e: ureq::Error| FetchError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };

        let mut response = self
            .agent
            .get(&self.url_for(endpoint))
            .header("Authorization", &format!("SSWS {}", self.api_token))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .call()
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_vec().map_err(transport_error)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = OktaClient::new(&ApiCredentials {
            base_url: "https://acme.okta.com/api/v1/".to_string(),
            api_token: "token".to_string(),
        });
        assert_eq!(client.base_url(), "https://acme.okta.com/api/v1");
        assert_eq!(
            client.url_for("users?limit=1"),
            "https://acme.okta.com/api/v1/users?limit=1"
        );
        assert_eq!(
            client.url_for("/groups?limit=1"),
            "https://acme.okta.com/api/v1/groups?limit=1"
        );
    }

    #[test]
    fn test_error_endpoint() {
        let err = FetchError::Status {
            endpoint: "users?limit=1".to_string(),
            status: 429,
        };
        assert_eq!(err.endpoint(), "users?limit=1");
        assert_eq!(err.to_string(), "request to users?limit=1 returned status 429");
    }
}
