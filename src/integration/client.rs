//! Outbound API client contract.
//!
//! Every integration owns exactly one client, constructed at resolution time
//! from the integration's identity. The trait is the seam test doubles mock;
//! [`HttpIntegrationClient`] is the production implementation.
//!
//! Requests are fail-soft: a non-2xx answer comes back as a normal response
//! with its status code captured, only transport failures are errors.

use crate::integration::configuration::ConfigDocument;
use crate::integration::IntegrationIdentity;
use crate::types::{Error, HttpClientConfig, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Request / response values
// =============================================================================

/// HTTP method subset used against integration APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One outbound request.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Top-level body fields redacted from logs (tokens, PII).
    pub anonymize: Vec<String>,
}

impl ClientRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            anonymize: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn with_basic_auth(self, user: &str, password: &str) -> Self {
        let credentials = BASE64.encode(format!("{}:{}", user, password));
        self.with_header("Authorization", format!("Basic {}", credentials))
    }

    pub fn anonymizing(mut self, fields: &[&str]) -> Self {
        self.anonymize = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Body as it may appear in logs: anonymized fields replaced.
    pub fn loggable_body(&self) -> Value {
        let body = match &self.body {
            Some(body) => body,
            None => return Value::Null,
        };
        let mut clone = body.clone();
        if let Some(map) = clone.as_object_mut() {
            for field in &self.anonymize {
                if map.contains_key(field) {
                    map.insert(field.clone(), Value::String("***".to_string()));
                }
            }
        }
        clone
    }
}

/// Response with the remote status captured, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Value,
}

impl ClientResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of a successful token refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Client contract
// =============================================================================

/// Outbound API surface bound to one integration instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    /// Display-aware integration name, used in logs and User-Agent-style
    /// headers so a rebranded instance is distinguishable.
    fn integration_name(&self) -> String;

    /// Execute a request. Transport failures are errors, remote rejections
    /// are responses.
    async fn request(&self, request: ClientRequest) -> Result<ClientResponse>;

    /// Exchange the stored refresh token for a fresh grant.
    ///
    /// Every failure on this path is a token error so status classification
    /// can keep the original message.
    async fn refresh_token(&self, config: &ConfigDocument) -> Result<TokenGrant>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// `reqwest`-backed client, one per resolved integration.
#[derive(Debug)]
pub struct HttpIntegrationClient {
    name: String,
    namespace: String,
    http: reqwest::Client,
}

impl HttpIntegrationClient {
    pub fn new(identity: &IntegrationIdentity, config: &HttpClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Http(Box::new(e)))?;

        Ok(Self {
            name: identity.display_name().to_string(),
            namespace: identity.namespace(),
            http,
        })
    }
}

#[async_trait]
impl IntegrationClient for HttpIntegrationClient {
    fn integration_name(&self) -> String {
        self.name.clone()
    }

    async fn request(&self, request: ClientRequest) -> Result<ClientResponse> {
        tracing::debug!(
            code = "client_request",
            integration = %self.namespace,
            method = ?request.method,
            url = %request.url,
            body = %request.loggable_body(),
            "outbound integration request"
        );

        let mut builder = self
            .http
            .request(request.method.to_reqwest(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(Box::new(e)))?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        tracing::debug!(
            code = "client_response",
            integration = %self.namespace,
            status = status,
            "integration responded"
        );

        Ok(ClientResponse { status, body })
    }

    async fn refresh_token(&self, config: &ConfigDocument) -> Result<TokenGrant> {
        let token_url = config
            .get_str("oauth.token_url")
            .ok_or_else(|| Error::token("no token endpoint configured"))?;
        let refresh_token = config
            .refresh_token()
            .ok_or_else(|| Error::token("no refresh token on file"))?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(client_id) = config.get_str("oauth.client_id") {
            form.push(("client_id", client_id.to_string()));
        }
        if let Some(client_secret) = config.get_str("oauth.client_secret") {
            form.push(("client_secret", client_secret.to_string()));
        }

        let response = self
            .http
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::token(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(Error::token(format!(
                "token endpoint returned {}",
                status.as_u16()
            )));
        }

        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::token("token response missing access_token"))?
            .to_string();
        let refresh_token = body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string);
        let expires_at = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        tracing::info!(
            code = "token_refreshed",
            integration = %self.namespace,
            "access token refreshed"
        );

        Ok(TokenGrant {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}
