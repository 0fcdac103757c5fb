//! Sweepers removing resources left behind by acceptance tests
//!
//! Each sweeper lists one resource type in a region, keeps the entries whose
//! name carries a test prefix and deletes them concurrently through
//! [`sweep_orchestrated`]. Deletion goes through the resource's own delete,
//! with the force flags set so that running jobs and populated groups go too.

use crate::client::ServiceClient;
use crate::config::Config;
use crate::error::Result;
use crate::services::{AsBandwidthPolicy, AsGroup, DrsJob, drs_job};
use crate::utils::{path_array, path_i64, path_string};
use async_trait::async_trait;
use hwcflow_cloud::{
    BoxError, Resource, ResourceData, SweepResource, Sweeper, SweeperRegistry, is_sweepable_name,
    sweep_orchestrated,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

const PAGE_SIZE: usize = 100;

/// Registry holding every sweeper of the provider
pub fn registry() -> hwcflow_cloud::Result<SweeperRegistry<Config>> {
    let mut registry = SweeperRegistry::new();
    let sweepers: [Arc<dyn Sweeper<Config>>; 3] = [
        Arc::new(AsGroupSweeper),
        Arc::new(AsBandwidthPolicySweeper),
        Arc::new(DrsJobSweeper),
    ];
    for sweeper in sweepers {
        registry.register(sweeper)?;
    }
    Ok(registry)
}

/// State for deleting `id` with the given extra attributes
fn sweep_data(id: &str, region: &str, extra: Value) -> ResourceData {
    let mut attributes = Map::new();
    attributes.insert("region".to_string(), Value::String(region.to_string()));
    if let Value::Object(extra) = extra {
        attributes.extend(extra);
    }
    ResourceData::from_state(id, attributes)
}

/// Collect `(id, name)` pairs of sweepable entries
fn sweepable(items: &[Value], id_key: &str, name_key: &str) -> Vec<(String, String)> {
    items
        .iter()
        .map(|item| (path_string(id_key, item), path_string(name_key, item)))
        .filter(|(id, name)| !id.is_empty() && is_sweepable_name(name))
        .collect()
}

async fn run_sweep(
    resource: Arc<dyn Resource<Config>>,
    meta: Arc<Config>,
    targets: Vec<ResourceData>,
) -> std::result::Result<(), BoxError> {
    if targets.is_empty() {
        debug!(resource_type = resource.type_name(), "Nothing to sweep");
        return Ok(());
    }
    info!(
        resource_type = resource.type_name(),
        count = targets.len(),
        "Sweeping resources"
    );
    let items = targets
        .into_iter()
        .map(|data| SweepResource::new(resource.clone(), data, meta.clone()))
        .collect();
    sweep_orchestrated(items).await?;
    Ok(())
}

/// All pages of an AS list API using `limit`/`start_number` paging
async fn list_as_pages(client: &ServiceClient, base: &str, key: &str) -> Result<Vec<Value>> {
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut items = Vec::new();
    loop {
        let url = format!(
            "{}{}limit={}&start_number={}",
            base,
            separator,
            PAGE_SIZE,
            items.len()
        );
        let resp = client.get(&url).await?;
        let page = path_array(key, &resp);
        items.extend_from_slice(page);
        let total = path_i64("total_number", &resp).unwrap_or_default() as usize;
        if page.len() < PAGE_SIZE || items.len() >= total {
            return Ok(items);
        }
    }
}

pub struct AsGroupSweeper;

#[async_trait]
impl Sweeper<Config> for AsGroupSweeper {
    fn name(&self) -> &str {
        crate::services::as_group::TYPE_NAME
    }

    async fn sweep(&self, region: &str, meta: Arc<Config>) -> std::result::Result<(), BoxError> {
        let client = meta.new_service_client("autoscaling", region).await?;
        let groups = list_as_pages(&client, &client.service_url(&["scaling_group"]), "scaling_groups").await?;

        let targets = sweepable(&groups, "scaling_group_id", "scaling_group_name")
            .into_iter()
            .map(|(id, _)| sweep_data(&id, region, json!({"force_delete": true})))
            .collect();
        run_sweep(Arc::new(AsGroup), meta, targets).await
    }
}

pub struct AsBandwidthPolicySweeper;

#[async_trait]
impl Sweeper<Config> for AsBandwidthPolicySweeper {
    fn name(&self) -> &str {
        crate::services::as_bandwidth_policy::TYPE_NAME
    }

    async fn sweep(&self, region: &str, meta: Arc<Config>) -> std::result::Result<(), BoxError> {
        let client = meta.new_service_client("autoscalingv2", region).await?;
        let base = format!(
            "{}?scaling_resource_type=BANDWIDTH",
            client.service_url(&["scaling_policy"])
        );
        let policies = list_as_pages(&client, &base, "scaling_policies").await?;

        let targets = sweepable(&policies, "scaling_policy_id", "scaling_policy_name")
            .into_iter()
            .map(|(id, _)| sweep_data(&id, region, json!({})))
            .collect();
        run_sweep(Arc::new(AsBandwidthPolicy), meta, targets).await
    }
}

pub struct DrsJobSweeper;

#[async_trait]
impl Sweeper<Config> for DrsJobSweeper {
    fn name(&self) -> &str {
        drs_job::TYPE_NAME
    }

    async fn sweep(&self, region: &str, meta: Arc<Config>) -> std::result::Result<(), BoxError> {
        let client = meta.new_service_client("drs", region).await?;
        let mut targets = Vec::new();
        for job_type in drs_job::JOB_TYPES {
            let jobs = drs_job::list_jobs(&client, job_type).await?;
            targets.extend(
                sweepable(&jobs, "id", "name")
                    .into_iter()
                    .map(|(id, _)| sweep_data(&id, region, json!({"force_destroy": true}))),
            );
        }
        run_sweep(Arc::new(DrsJob), meta, targets).await
    }
}
