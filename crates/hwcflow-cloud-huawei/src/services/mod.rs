//! Resource adapters, one module per resource type

pub mod as_bandwidth_policy;
pub mod as_group;
pub mod drs_job;
pub mod scm_certificate;

pub use as_bandwidth_policy::AsBandwidthPolicy;
pub use as_group::AsGroup;
pub use drs_job::DrsJob;
pub use scm_certificate::ScmCertificate;

use crate::client::ServiceClient;
use crate::config::Config;
use hwcflow_cloud::{DiagResult, ResourceData, diag_errorf};

/// Client for `service` in the resource's region
pub(crate) async fn service_client(
    conf: &Config,
    d: &ResourceData,
    service: &str,
) -> DiagResult<ServiceClient> {
    let region = conf.get_region(d);
    conf.new_service_client(service, &region)
        .await
        .map_err(|e| diag_errorf!("error creating {} client: {}", service, e))
}
