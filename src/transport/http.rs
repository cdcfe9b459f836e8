//! HTTP transport backed by `reqwest`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

use super::token::TokenProvider;
use super::{
    CommandTarget, CommandTransport, DataApiResponse, DevOpsRequest, DevOpsResponse,
    DevOpsTransport, HttpMethod,
};

const DATA_API_TOKEN_HEADER: &str = "Token";

/// Sends Data API commands and DevOps requests over HTTPS.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    api_path: String,
    devops_url: String,
    token: Arc<dyn TokenProvider>,
    user_agent: String,
}

impl HttpTransport {
    /// Create a transport for one database endpoint.
    ///
    /// # Arguments
    /// * `endpoint` - Database API endpoint, e.g. `https://<id>-<region>.apps.astra.datastax.com`
    /// * `api_path` - Data API base path, e.g. `api/json/v1`
    /// * `devops_url` - DevOps API base URL
    /// * `token` - Token provider attached to every request
    pub fn new(
        endpoint: impl Into<String>,
        api_path: impl Into<String>,
        devops_url: impl Into<String>,
        token: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_path: api_path.into().trim_matches('/').to_string(),
            devops_url: devops_url.into().trim_end_matches('/').to_string(),
            token,
            user_agent: format!("astra-data-api-rs/{}", crate::VERSION),
        })
    }

    /// Full URL of a command target.
    pub fn command_url(&self, target: &CommandTarget) -> String {
        let mut url = format!("{}/{}", self.endpoint, self.api_path);
        for segment in target.path_segments() {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn devops_request_url(&self, path: &str) -> String {
        format!("{}/{}", self.devops_url, path.trim_start_matches('/'))
    }
}

/// Map a `reqwest` failure to the hard-failure taxonomy.
fn classify(err: reqwest::Error, started: Instant, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
            budget_ms: timeout.as_millis() as u64,
        }
    } else if err.is_decode() {
        TransportError::InvalidResponse(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl CommandTransport for HttpTransport {
    async fn execute(
        &self,
        target: &CommandTarget,
        command: &Value,
        timeout: Duration,
    ) -> Result<DataApiResponse> {
        let url = self.command_url(target);
        let started = Instant::now();
        trace!("POST {} {}", url, command);

        let mut request = self
            .http
            .post(&url)
            .timeout(timeout)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .json(command);
        if let Some(token) = self.token.token().await? {
            request = request.header(DATA_API_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, started, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| classify(e, started, timeout))?;
        debug!(
            "Data API call to {} completed in {}ms",
            target,
            started.elapsed().as_millis()
        );
        DataApiResponse::from_value(body)
    }
}

#[async_trait]
impl DevOpsTransport for HttpTransport {
    async fn request(&self, request: &DevOpsRequest, timeout: Duration) -> Result<DevOpsResponse> {
        let url = self.devops_request_url(&request.path);
        let started = Instant::now();
        debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Delete => self.http.delete(&url),
        }
        .timeout(timeout)
        .header(USER_AGENT, &self.user_agent);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = self.token.token().await? {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, started, timeout))?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| classify(e, started, timeout))?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&text)
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?,
            )
        };

        Ok(DevOpsResponse {
            status: status.as_u16(),
            location,
            body,
        })
    }
}
