//! Service catalog: endpoint names and API versions per service

use crate::error::{HuaweiError, Result};
use std::collections::BTreeMap;

/// One entry of the service catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCatalog {
    /// Key used by adapters and in the `endpoints` provider setting
    pub key: &'static str,
    /// Host prefix of the endpoint
    pub name: &'static str,
    /// Path prefix of every request, e.g. `autoscaling-api/v1`
    pub version: &'static str,
    /// Whether the version path is followed by the project ID
    pub with_project_id: bool,
    /// Global services have no region in their host name
    pub global: bool,
}

const CATALOG: &[ServiceCatalog] = &[
    ServiceCatalog {
        key: "autoscaling",
        name: "as",
        version: "autoscaling-api/v1",
        with_project_id: true,
        global: false,
    },
    ServiceCatalog {
        key: "autoscalingv2",
        name: "as",
        version: "autoscaling-api/v2",
        with_project_id: true,
        global: false,
    },
    ServiceCatalog {
        key: "drs",
        name: "drs",
        version: "v3",
        with_project_id: true,
        global: false,
    },
    ServiceCatalog {
        key: "drsv5",
        name: "drs",
        version: "v5",
        with_project_id: true,
        global: false,
    },
    ServiceCatalog {
        key: "scm",
        name: "scm",
        version: "v3",
        with_project_id: false,
        global: false,
    },
    ServiceCatalog {
        key: "iam",
        name: "iam",
        version: "v3",
        with_project_id: false,
        global: true,
    },
];

pub fn lookup(key: &str) -> Result<&'static ServiceCatalog> {
    CATALOG
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| HuaweiError::UnknownService(key.to_string()))
}

impl ServiceCatalog {
    /// Endpoint for `region`, honouring custom endpoints configured by
    /// service key or by service name
    pub fn endpoint(&self, region: &str, cloud: &str, custom: &BTreeMap<String, String>) -> String {
        let configured = custom.get(self.key).or_else(|| custom.get(self.name));
        let endpoint = match configured {
            Some(url) => url.clone(),
            None if self.global => format!("https://{}.{}/", self.name, cloud),
            None => format!("https://{}.{}.{}/", self.name, region, cloud),
        };
        if endpoint.ends_with('/') {
            endpoint
        } else {
            format!("{}/", endpoint)
        }
    }

    /// Base of resource URLs: `{endpoint}{version}/[{project_id}/]`
    pub fn resource_base(&self, endpoint: &str, project_id: &str) -> String {
        if self.with_project_id {
            format!("{}{}/{}/", endpoint, self.version, project_id)
        } else {
            format!("{}{}/", endpoint, self.version)
        }
    }
}
