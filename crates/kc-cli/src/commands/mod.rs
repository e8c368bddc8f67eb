//! Command implementations.

pub mod audit;
pub mod checksum;
pub mod config;

pub use audit::run_audit;
pub use checksum::run_checksum;
pub use config::{run_config, run_status};

use kc_admin_api::ErrorResponse;
use reqwest::{StatusCode, Url};

use crate::{CliConfig, CliError};

/// API client for the audit server.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a new API client.
    pub fn new(
        config: &CliConfig,
        server_override: Option<&str>,
        token_override: Option<&str>,
    ) -> crate::CliResult<Self> {
        let server = config.effective_server(server_override);
        let base_url = Url::parse(&server)
            .map_err(|e| CliError::Config(format!("invalid server URL {server}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CliError::Config(format!("invalid server URL {server}")));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.effective_token(token_override),
        })
    }

    /// Builds a URL from path segments. Each segment is percent-encoded.
    pub fn url(&self, segments: &[&str]) -> crate::CliResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CliError::Config(format!("invalid server URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Makes a GET request.
    pub async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> crate::CliResult<T> {
        let request = self.client.get(self.url(segments)?).query(query);
        let response = self.authorized(request).send().await?;
        handle_response(response).await
    }

    /// Makes a POST request.
    pub async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> crate::CliResult<T> {
        let request = self.client.post(self.url(segments)?).json(body);
        let response = self.authorized(request).send().await?;
        handle_response(response).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }
}

/// Handles a response with a body.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> crate::CliResult<T> {
    let status = response.status();

    if status.is_success() {
        return response.json().await.map_err(CliError::Http);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

/// Maps an error response to a CLI error, preferring the server's
/// description over the raw body.
fn error_from_body(status: StatusCode, body: &str) -> CliError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|e| e.error_description.unwrap_or(e.error))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                body.to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => CliError::Auth(message),
        _ => CliError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &str) -> ApiClient {
        let config = CliConfig {
            server_url: server.to_string(),
            ..CliConfig::default()
        };
        ApiClient::new(&config, None, None).unwrap()
    }

    #[test]
    fn url_encodes_segments() {
        let api = client("http://localhost:8080");
        let url = api
            .url(&["admin", "audit", "realms", "my realm", "actions"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/admin/audit/realms/my%20realm/actions"
        );
    }

    #[test]
    fn url_keeps_base_path() {
        let api = client("https://example.com/audit/");
        let url = api.url(&["health"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/audit/health");
    }

    #[test]
    fn rejects_invalid_server() {
        let config = CliConfig {
            server_url: "not a url".to_string(),
            ..CliConfig::default()
        };
        assert!(matches!(
            ApiClient::new(&config, None, None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn error_body_description_is_used() {
        let body = r#"{"error":"conflict","error_description":"Action already reverted"}"#;
        match error_from_body(StatusCode::CONFLICT, body) {
            CliError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "Action already reverted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_maps_to_auth() {
        assert!(matches!(
            error_from_body(StatusCode::UNAUTHORIZED, ""),
            CliError::Auth(message) if message == "Unauthorized"
        ));
    }
}
