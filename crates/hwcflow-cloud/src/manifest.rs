//! YAML manifest describing the desired resources
//!
//! ```yaml
//! provider:
//!   region: cn-north-4
//! resources:
//!   - type: huaweicloud_as_group
//!     name: web
//!     config:
//!       scaling_group_name: web
//!     timeouts:
//!       create: 15m
//! ```

use crate::error::{CloudError, Result};
use crate::resource::{Operation, ResourceTimeouts};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Provider settings, interpreted by the provider crate
    #[serde(default)]
    pub provider: Value,

    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
}

/// One `resources` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBlock {
    #[serde(rename = "type")]
    pub resource_type: String,

    pub name: String,

    #[serde(default)]
    pub config: Map<String, Value>,

    #[serde(default)]
    pub timeouts: TimeoutsBlock,
}

impl ResourceBlock {
    /// Address used as the state key
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

/// Per-operation timeouts as written in the manifest (`10m`, `1h30m`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutsBlock {
    pub create: Option<String>,
    pub read: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl TimeoutsBlock {
    pub fn resolve(&self) -> Result<ResourceTimeouts> {
        let mut timeouts = ResourceTimeouts::default();
        for (op, value) in [
            (Operation::Create, &self.create),
            (Operation::Read, &self.read),
            (Operation::Update, &self.update),
            (Operation::Delete, &self.delete),
        ] {
            if let Some(raw) = value {
                timeouts.set(op, parse_duration(raw)?);
            }
        }
        Ok(timeouts)
    }
}

impl Manifest {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)?;
        manifest.check_addresses()?;
        Ok(manifest)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CloudError::InvalidManifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded manifest from {}", path.display());
        Self::from_yaml(&content)
    }

    fn check_addresses(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for block in &self.resources {
            if block.name.is_empty() {
                return Err(CloudError::InvalidManifest(format!(
                    "resource of type {} has no name",
                    block.resource_type
                )));
            }
            if !seen.insert(block.address()) {
                return Err(CloudError::DuplicateAddress(block.address()));
            }
        }
        Ok(())
    }
}

/// Parse durations like `90s`, `10m`, `1h30m`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || CloudError::InvalidManifest(format!("invalid duration '{}', expected e.g. 1h, 30m, 90s", s));

    let re = Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").map_err(|_| invalid())?;
    let caps = re.captures(s).ok_or_else(invalid)?;
    if s.is_empty() {
        return Err(invalid());
    }

    let mut secs = 0u64;
    for (index, unit) in [(1, 3600), (2, 60), (3, 1)] {
        if let Some(m) = caps.get(index) {
            let n: u64 = m.as_str().parse().map_err(|_| invalid())?;
            secs += n * unit;
        }
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 90s ").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten minutes").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_yaml(
            r#"
provider:
  region: cn-north-4
resources:
  - type: huaweicloud_drs_job
    name: sync
    config:
      name: tf-test-sync
      engine_type: mysql
    timeouts:
      create: 30m
  - type: huaweicloud_scm_certificate
    name: site
"#,
        )
        .unwrap();

        assert_eq!(manifest.provider["region"], "cn-north-4");
        assert_eq!(manifest.resources.len(), 2);
        let job = &manifest.resources[0];
        assert_eq!(job.address(), "huaweicloud_drs_job.sync");
        assert_eq!(job.config["engine_type"], "mysql");
        let timeouts = job.timeouts.resolve().unwrap();
        assert_eq!(timeouts.create, Some(Duration::from_secs(1800)));
        assert_eq!(timeouts.delete, None);
        assert!(manifest.resources[1].config.is_empty());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = Manifest::from_yaml(
            r#"
resources:
  - type: huaweicloud_as_group
    name: web
  - type: huaweicloud_as_group
    name: web
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CloudError::DuplicateAddress(ref a) if a == "huaweicloud_as_group.web"));
    }
}
