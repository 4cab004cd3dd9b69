use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::credential::TokenResponse;
use crate::config::SpotifyConfig;

/// Grant sent to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: String,
    },
    RefreshToken {
        refresh_token: String,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenRequest::AuthorizationCode { .. } => "authorization_code",
            TokenRequest::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields, in the order the accounts service documents them.
    pub fn form_params<'a>(&'a self, client_id: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![("client_id", client_id), ("grant_type", self.grant_type())];
        match self {
            TokenRequest::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                params.push(("code", code.as_str()));
                params.push(("redirect_uri", redirect_uri.as_str()));
                params.push(("code_verifier", code_verifier.as_str()));
            }
            TokenRequest::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token.as_str()));
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEndpointError {
    /// The endpoint answered with a non-2xx status.
    Rejected { status: u16, message: String },
    /// The request never produced a response (DNS, TLS, timeout, ...).
    Transport(String),
}

impl std::fmt::Display for TokenEndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenEndpointError::Rejected { status, message } => {
                write!(f, "HTTP {}: {}", status, message)
            }
            TokenEndpointError::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for TokenEndpointError {}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request_token(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenEndpointError>;
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Pick the most useful message out of an OAuth error body.
fn error_message(body: &str) -> String {
    let parsed: OAuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

/// `POST {accounts}/api/token` over reqwest.
pub struct HttpTokenEndpoint {
    client: Client,
    url: String,
    client_id: String,
}

impl HttpTokenEndpoint {
    pub fn new(config: &SpotifyConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("spotifusion/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.token_endpoint(),
            client_id: config.client_id.clone(),
        })
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn request_token(
        &self,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenEndpointError> {
        log::debug!("POST {} (grant_type={})", self.url, request.grant_type());

        let response = self
            .client
            .post(&self.url)
            .form(&request.form_params(&self.client_id))
            .send()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TokenEndpointError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(TokenEndpointError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| TokenEndpointError::Rejected {
            status: status.as_u16(),
            message: format!("Malformed token response: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;

    const TOKEN_BODY: &str = r#"{"access_token":"access-1","token_type":"Bearer","scope":"user-top-read","expires_in":3600,"refresh_token":"refresh-1"}"#;

    fn endpoint_for(server: &StubServer) -> HttpTokenEndpoint {
        let mut config = SpotifyConfig::new("client-123", "http://127.0.0.1:5173/callback");
        config.accounts_url = server.url().to_string();
        HttpTokenEndpoint::new(&config).unwrap()
    }

    fn refresh_request() -> TokenRequest {
        TokenRequest::RefreshToken {
            refresh_token: "refresh-0".to_string(),
        }
    }

    #[test]
    fn test_authorization_code_form() {
        let request = TokenRequest::AuthorizationCode {
            code: "the-code".to_string(),
            redirect_uri: "http://127.0.0.1:5173/callback".to_string(),
            code_verifier: "v".repeat(64),
        };
        let verifier = "v".repeat(64);
        assert_eq!(
            request.form_params("client"),
            vec![
                ("client_id", "client"),
                ("grant_type", "authorization_code"),
                ("code", "the-code"),
                ("redirect_uri", "http://127.0.0.1:5173/callback"),
                ("code_verifier", verifier.as_str()),
            ]
        );
    }

    #[test]
    fn test_refresh_form() {
        let request = TokenRequest::RefreshToken {
            refresh_token: "r".to_string(),
        };
        assert_eq!(
            request.form_params("client"),
            vec![
                ("client_id", "client"),
                ("grant_type", "refresh_token"),
                ("refresh_token", "r"),
            ]
        );
    }

    #[test]
    fn test_error_message_prefers_description() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#),
            "Refresh token revoked"
        );
        assert_eq!(error_message(r#"{"error":"invalid_client"}"#), "invalid_client");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_http_endpoint_posts_form_and_parses_token() {
        let server = StubServer::start().await;
        server.respond("/api/token", 200, TOKEN_BODY);
        let endpoint = endpoint_for(&server);

        let response = endpoint.request_token(&refresh_request()).await.unwrap();
        assert_eq!(response.access_token, "access-1");
        assert_eq!(response.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(response.expires_in, 3600);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path(), "/api/token");
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        let form = requests[0].form();
        assert_eq!(form["client_id"], "client-123");
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "refresh-0");
    }

    #[tokio::test]
    async fn test_http_endpoint_maps_error_statuses() {
        let server = StubServer::start().await;
        let endpoint = endpoint_for(&server);

        for status in [400, 401] {
            server.respond(
                "/api/token",
                status,
                r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            );
            assert_eq!(
                endpoint.request_token(&refresh_request()).await,
                Err(TokenEndpointError::Rejected {
                    status,
                    message: "Refresh token revoked".to_string(),
                })
            );
        }

        server.respond("/api/token", 503, "Service Unavailable");
        assert_eq!(
            endpoint.request_token(&refresh_request()).await,
            Err(TokenEndpointError::Rejected {
                status: 503,
                message: "Service Unavailable".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_http_endpoint_rejects_malformed_body() {
        let server = StubServer::start().await;
        server.respond("/api/token", 200, r#"{"token_type":"Bearer"}"#);
        let endpoint = endpoint_for(&server);

        match endpoint.request_token(&refresh_request()).await {
            Err(TokenEndpointError::Rejected { status, message }) => {
                assert_eq!(status, 200);
                assert!(message.starts_with("Malformed token response"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
