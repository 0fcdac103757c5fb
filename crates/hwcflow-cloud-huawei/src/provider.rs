//! HuaweiCloud provider implementation

use crate::config::{Config, Credentials, ProviderConfig};
use crate::error::Result;
use crate::services::{AsBandwidthPolicy, AsGroup, DrsJob, ScmCertificate};
use crate::sweepers;
use async_trait::async_trait;
use hwcflow_cloud::{AuthStatus, CloudProvider, Resource, SweeperRegistry};
use serde_json::Value;
use std::sync::Arc;

/// HuaweiCloud provider
pub struct HuaweiProvider {
    config: Arc<Config>,
}

impl HuaweiProvider {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Provider from the manifest's `provider:` settings, completed from `HW_*` variables
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = ProviderConfig::from_value(settings)?;
        Ok(Self::new(Config::new(settings)?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl CloudProvider for HuaweiProvider {
    type Meta = Config;

    fn name(&self) -> &str {
        "huaweicloud"
    }

    fn display_name(&self) -> &str {
        "HuaweiCloud"
    }

    fn meta(&self) -> Arc<Config> {
        self.config.clone()
    }

    fn resources(&self) -> Vec<Arc<dyn Resource<Config>>> {
        vec![
            Arc::new(AsGroup),
            Arc::new(AsBandwidthPolicy),
            Arc::new(DrsJob),
            Arc::new(ScmCertificate),
        ]
    }

    fn sweepers(&self) -> hwcflow_cloud::Result<SweeperRegistry<Config>> {
        sweepers::registry()
    }

    /// Resolving the project of the provider region exercises the credentials
    async fn check_auth(&self) -> hwcflow_cloud::Result<AuthStatus> {
        let region = self.config.region().to_string();
        let method = match self.config.credentials() {
            Credentials::Token(_) => "token",
            Credentials::AkSk { .. } => "AK/SK",
        };
        match self.config.project_id(&region).await {
            Ok(project_id) => Ok(AuthStatus::ok(format!(
                "{} (project {}, {} auth)",
                region, project_id, method
            ))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }
}
