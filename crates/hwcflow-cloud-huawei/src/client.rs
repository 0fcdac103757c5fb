//! Service client: authenticated JSON requests against one service endpoint

use crate::config::Credentials;
use crate::error::{ApiError, Result};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_BACKOFF_FACTOR: u32 = 30;

/// Options of a single request
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Accepted statuses; any 2xx when empty
    pub ok_codes: Vec<u16>,
}

impl RequestOpts {
    pub fn json(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    fn accepts(&self, status: StatusCode) -> bool {
        if self.ok_codes.is_empty() {
            status.is_success()
        } else {
            self.ok_codes.contains(&status.as_u16())
        }
    }
}

/// Client bound to one service, region and project
#[derive(Debug, Clone)]
pub struct ServiceClient {
    pub(crate) http: reqwest::Client,
    pub(crate) credentials: Credentials,
    pub(crate) endpoint: String,
    pub(crate) resource_base: String,
    pub(crate) project_id: String,
    pub(crate) domain_id: String,
    pub(crate) region: String,
    pub(crate) max_retries: u32,
    pub(crate) backoff_unit: Duration,
}

impl ServiceClient {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `{endpoint}{version}/[{project_id}/]`
    pub fn resource_base(&self) -> &str {
        &self.resource_base
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Absolute URL for a path template relative to the endpoint,
    /// e.g. `v3/{project_id}/jobs/batch-detail`
    pub fn url(&self, template: &str) -> String {
        format!(
            "{}{}",
            self.endpoint,
            template.replace("{project_id}", &self.project_id)
        )
    }

    /// Like [`url`](Self::url), also substituting named placeholders
    pub fn url_with(&self, template: &str, params: &[(&str, &str)]) -> String {
        let mut url = self.url(template);
        for (name, value) in params {
            url = url.replace(&format!("{{{}}}", name), value);
        }
        url
    }

    /// URL below the resource base, e.g. `["scaling_group", id]`
    pub fn service_url(&self, parts: &[&str]) -> String {
        format!("{}{}", self.resource_base, parts.join("/"))
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::GET, url, RequestOpts::default()).await
    }

    pub async fn post(&self, url: &str, body: Value) -> Result<Value> {
        self.request(Method::POST, url, RequestOpts::json(body)).await
    }

    pub async fn put(&self, url: &str, body: Value) -> Result<Value> {
        self.request(Method::PUT, url, RequestOpts::json(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.request(Method::DELETE, url, RequestOpts::default()).await
    }

    pub async fn delete_with_body(&self, url: &str, body: Value) -> Result<Value> {
        self.request(Method::DELETE, url, RequestOpts::json(body)).await
    }

    /// Send a request, retrying throttled (429) responses
    ///
    /// Returns the decoded body: JSON when it parses, a string otherwise,
    /// `null` when empty. Unaccepted statuses become an [`ApiError`].
    pub async fn request(&self, method: Method, url: &str, opts: RequestOpts) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            let request = self.build_request(method.clone(), url, &opts)?;
            debug!(method = %method, url, "Sending request");

            let response = self.http.execute(request).await?;
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let wait = self.backoff_unit * backoff_factor(attempt);
                warn!(url, attempt = attempt + 1, ?wait, "Request throttled, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await?;
            let body = decode_body(&text);
            if !opts.accepts(status) {
                return Err(ApiError::new(status.as_u16(), method.as_str(), url, body).into());
            }
            return Ok(body);
        }
    }

    fn build_request(&self, method: Method, url: &str, opts: &RequestOpts) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if !self.project_id.is_empty() {
            builder = builder.header("X-Project-Id", &self.project_id);
        }
        if !self.domain_id.is_empty() {
            builder = builder.header("X-Domain-Id", &self.domain_id);
        }
        match &self.credentials {
            Credentials::Token(token) => builder = builder.header("X-Auth-Token", token),
            Credentials::AkSk {
                security_token: Some(token),
                ..
            } => builder = builder.header("X-Security-Token", token),
            Credentials::AkSk { .. } => {}
        }
        for (name, value) in &opts.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &opts.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let mut request = builder.build()?;
        if let Credentials::AkSk { signer, .. } = &self.credentials {
            signer.sign(&mut request, Utc::now())?;
        }
        Ok(request)
    }
}

fn backoff_factor(attempt: u32) -> u32 {
    1u32.checked_shl(attempt)
        .unwrap_or(MAX_BACKOFF_FACTOR)
        .min(MAX_BACKOFF_FACTOR)
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_factor() {
        assert_eq!(backoff_factor(0), 1);
        assert_eq!(backoff_factor(3), 8);
        assert_eq!(backoff_factor(5), 30);
        assert_eq!(backoff_factor(40), 30);
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(decode_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn test_ok_codes() {
        let opts = RequestOpts::default();
        assert!(opts.accepts(StatusCode::NO_CONTENT));
        assert!(!opts.accepts(StatusCode::NOT_FOUND));

        let opts = RequestOpts::default().ok_codes(&[200, 404]);
        assert!(opts.accepts(StatusCode::NOT_FOUND));
        assert!(!opts.accepts(StatusCode::ACCEPTED));
    }
}
