//! Provider configuration and the shared client state handed to resources

use crate::catalog;
use crate::client::ServiceClient;
use crate::error::{HuaweiError, Result};
use crate::signer::Signer;
use crate::utils::path_str;
use hwcflow_cloud::{ResourceData, RetryConf, StateChangeConf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(60);

/// Settings of the `provider:` manifest block
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub security_token: String,
    pub auth_token: String,
    pub project_id: String,
    pub domain_id: String,
    pub cloud: String,
    pub insecure: bool,
    pub max_retries: Option<u32>,
    pub enterprise_project_id: String,
    /// Custom endpoints by service key or name
    pub endpoints: BTreeMap<String, String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .field("cloud", &self.cloud)
            .field("insecure", &self.insecure)
            .field("max_retries", &self.max_retries)
            .field("enterprise_project_id", &self.enterprise_project_id)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Parse the manifest block, fill unset fields from `HW_*` variables and validate
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut config: ProviderConfig = if value.is_null() {
            ProviderConfig::default()
        } else {
            serde_json::from_value(value.clone())
                .map_err(|e| HuaweiError::InvalidConfig(format!("provider block: {}", e)))?
        };
        config.fill_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn fill_from_env(&mut self) -> Result<()> {
        fill(&mut self.region, "HW_REGION_NAME");
        fill(&mut self.access_key, "HW_ACCESS_KEY");
        fill(&mut self.secret_key, "HW_SECRET_KEY");
        fill(&mut self.security_token, "HW_SECURITY_TOKEN");
        fill(&mut self.auth_token, "HW_AUTH_TOKEN");
        fill(&mut self.project_id, "HW_PROJECT_ID");
        fill(&mut self.domain_id, "HW_DOMAIN_ID");
        fill(&mut self.cloud, "HW_CLOUD");
        fill(&mut self.enterprise_project_id, "HW_ENTERPRISE_PROJECT_ID");
        if self.cloud.is_empty() {
            self.cloud = DEFAULT_CLOUD.to_string();
        }

        if !self.insecure {
            if let Ok(raw) = std::env::var("HW_INSECURE") {
                self.insecure = matches!(raw.trim().to_lowercase().as_str(), "1" | "true");
            }
        }

        if self.max_retries.is_none() {
            self.max_retries = match std::env::var("HW_MAX_RETRIES") {
                Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse().map_err(|_| {
                    HuaweiError::InvalidConfig(format!(
                        "max_retries should be a positive value, got '{}'",
                        raw
                    ))
                })?),
                _ => Some(DEFAULT_MAX_RETRIES),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(HuaweiError::InvalidConfig(
                "region is required (set it in the provider block or HW_REGION_NAME)".into(),
            ));
        }
        let aksk = !self.access_key.is_empty() && !self.secret_key.is_empty();
        if self.auth_token.is_empty() && !aksk {
            return Err(HuaweiError::InvalidConfig(
                "must config token or aksk to be authorized".into(),
            ));
        }
        Ok(())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }
}

fn fill(field: &mut String, var: &str) {
    if field.is_empty() {
        if let Ok(value) = std::env::var(var) {
            *field = value;
        }
    }
}

/// How requests are authenticated
#[derive(Clone)]
pub enum Credentials {
    AkSk {
        signer: Signer,
        security_token: Option<String>,
    },
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::AkSk { signer, .. } => f
                .debug_struct("AkSk")
                .field("access_key", &signer.access_key())
                .finish_non_exhaustive(),
            Credentials::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Configured provider: settings, HTTP client and the project ID cache
pub struct Config {
    settings: ProviderConfig,
    http: reqwest::Client,
    credentials: Credentials,
    projects: Mutex<HashMap<String, String>>,
    backoff_unit: Duration,
    wait_interval: Option<Duration>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn new(settings: ProviderConfig) -> Result<Self> {
        settings.validate()?;

        let credentials = if !settings.auth_token.is_empty() {
            Credentials::Token(settings.auth_token.clone())
        } else {
            Credentials::AkSk {
                signer: Signer::new(&settings.access_key, &settings.secret_key),
                security_token: Some(settings.security_token.clone()).filter(|t| !t.is_empty()),
            }
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.insecure)
            .build()?;

        Ok(Self {
            settings,
            http,
            credentials,
            projects: Mutex::new(HashMap::new()),
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            wait_interval: None,
        })
    }

    /// Base sleep between retries of throttled requests
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Replace the delays and poll intervals of every status wait
    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = Some(interval);
        self
    }

    /// Apply the wait interval override, if any, to a status wait
    pub fn pace(&self, mut wait: StateChangeConf) -> StateChangeConf {
        if let Some(interval) = self.wait_interval {
            wait.delay = wait.delay.min(interval);
            wait.poll_interval = interval;
        }
        wait
    }

    pub fn pace_retry(&self, mut retry: RetryConf) -> RetryConf {
        if let Some(interval) = self.wait_interval {
            retry.delay = retry.delay.min(interval);
            retry.poll_interval = interval;
        }
        retry
    }

    pub fn settings(&self) -> &ProviderConfig {
        &self.settings
    }

    pub fn region(&self) -> &str {
        &self.settings.region
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The resource's `region`, falling back to the provider region
    pub fn get_region(&self, d: &ResourceData) -> String {
        match d.get_ok("region").and_then(Value::as_str) {
            Some(region) => region.to_string(),
            None => self.settings.region.clone(),
        }
    }

    /// The resource's `enterprise_project_id`, falling back to the provider value
    pub fn get_enterprise_project_id(&self, d: &ResourceData) -> String {
        match d.get_ok("enterprise_project_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => self.settings.enterprise_project_id.clone(),
        }
    }

    /// Project ID of `region`: configured, cached or looked up through IAM
    pub async fn project_id(&self, region: &str) -> Result<String> {
        if region == self.settings.region && !self.settings.project_id.is_empty() {
            return Ok(self.settings.project_id.clone());
        }

        let mut projects = self.projects.lock().await;
        if let Some(id) = projects.get(region) {
            return Ok(id.clone());
        }

        let iam = self.build_client("iam", region, String::new())?;
        let url = format!(
            "{}projects?name={}",
            iam.resource_base(),
            urlencoding::encode(region)
        );
        let body = iam.get(&url).await?;
        let id = path_str("projects[0].id", &body)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| HuaweiError::ProjectNotFound(region.to_string()))?;

        info!(region, project_id = %id, "Resolved project ID");
        projects.insert(region.to_string(), id.clone());
        Ok(id)
    }

    /// Client for `service` (a catalog key such as `autoscaling` or `drs`) in `region`
    pub async fn new_service_client(&self, service: &str, region: &str) -> Result<ServiceClient> {
        let entry = catalog::lookup(service)?;
        if region != self.settings.region && matches!(self.credentials, Credentials::Token(_)) {
            return Err(HuaweiError::InvalidConfig(format!(
                "region {} differs from the provider region {}, which is only supported with AK/SK authentication",
                region, self.settings.region
            )));
        }

        let project_id = if entry.with_project_id {
            self.project_id(region).await?
        } else {
            String::new()
        };
        self.build_client(service, region, project_id)
    }

    fn build_client(&self, service: &str, region: &str, project_id: String) -> Result<ServiceClient> {
        let entry = catalog::lookup(service)?;
        let endpoint = entry.endpoint(region, &self.settings.cloud, &self.settings.endpoints);
        let resource_base = entry.resource_base(&endpoint, &project_id);
        debug!(service, region, %endpoint, "Creating service client");

        Ok(ServiceClient {
            http: self.http.clone(),
            credentials: self.credentials.clone(),
            endpoint,
            resource_base,
            domain_id: if entry.global {
                self.settings.domain_id.clone()
            } else {
                String::new()
            },
            project_id,
            region: region.to_string(),
            max_retries: self.settings.max_retries(),
            backoff_unit: self.backoff_unit,
        })
    }
}
