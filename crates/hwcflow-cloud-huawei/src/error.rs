//! HuaweiCloud provider error types

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HuaweiError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("no project found for region {0}")]
    ProjectNotFound(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Failure reported inside an otherwise successful response
    #[error("{0}")]
    Operation(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] hwcflow_cloud::CloudError),
}

impl HuaweiError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        self.api().map(|e| e.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            HuaweiError::Api(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HuaweiError>;

/// A non-2xx response from a service API
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub method: String,
    pub url: String,
    /// Decoded response body; a plain string when it was not JSON
    pub body: Value,
}

impl ApiError {
    pub fn new(status: u16, method: impl Into<String>, url: impl Into<String>, body: Value) -> Self {
        Self {
            status,
            method: method.into(),
            url: url.into(),
            body,
        }
    }

    /// Same error reported with another status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        write!(
            f,
            "{} {}: status {}, error message: {}",
            self.method, self.url, self.status, body
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(
            400,
            "GET",
            "https://as.cn-north-4.myhuaweicloud.com/autoscaling-api/v1/p/scaling_group/g",
            json!({"error": {"code": "AS.2007"}}),
        );
        assert_eq!(
            err.to_string(),
            "GET https://as.cn-north-4.myhuaweicloud.com/autoscaling-api/v1/p/scaling_group/g: \
             status 400, error message: {\"error\":{\"code\":\"AS.2007\"}}"
        );
    }

    #[test]
    fn test_status_helpers() {
        let err: HuaweiError = ApiError::new(404, "DELETE", "u", Value::Null).into();
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));

        let err = HuaweiError::InvalidConfig("region".into());
        assert_eq!(err.status(), None);
        assert!(!err.is_not_found());
    }
}
