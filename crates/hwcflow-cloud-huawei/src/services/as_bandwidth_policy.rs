//! `huaweicloud_as_bandwidth_policy`: scaling policy on a shared or EIP bandwidth

use super::service_client;
use crate::client::ServiceClient;
use crate::common::check_deleted;
use crate::config::Config;
use crate::error::Result;
use crate::utils::{path_i64, path_search, path_str, path_string, remove_nil, value_ignore_empty};
use async_trait::async_trait;
use hwcflow_cloud::{
    Attribute, DiagResult, Operation, RefreshResult, Resource, ResourceData, ResourceTimeouts,
    Schema, StateChangeConf, Validator, diag_errorf,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

pub const TYPE_NAME: &str = "huaweicloud_as_bandwidth_policy";

const SERVICE_V1: &str = "autoscaling";
const SERVICE_V2: &str = "autoscalingv2";
const WAIT_DELAY: Duration = Duration::from_secs(5);
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct AsBandwidthPolicy;

fn scheduled_policy_schema() -> Schema {
    Schema::new()
        .attribute("launch_time", Attribute::string().required())
        .attribute(
            "recurrence_type",
            Attribute::string()
                .optional()
                .computed()
                .validate(Validator::StringInSlice(&["Daily", "Weekly", "Monthly"])),
        )
        .attribute("recurrence_value", Attribute::string().optional().computed())
        .attribute("start_time", Attribute::string().optional().computed())
        .attribute("end_time", Attribute::string().optional().computed())
}

fn policy_action_schema() -> Schema {
    Schema::new()
        .attribute(
            "operation",
            Attribute::string()
                .optional()
                .computed()
                .validate(Validator::StringInSlice(&["ADD", "REDUCE", "SET"])),
        )
        .attribute("size", Attribute::int().optional().computed())
        .attribute("limits", Attribute::int().optional().computed())
}

#[async_trait]
impl Resource<Config> for AsBandwidthPolicy {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("region", Attribute::string().optional().computed().force_new())
            .attribute(
                "scaling_policy_name",
                Attribute::string()
                    .required()
                    .validate(Validator::StringLenBetween(1, 64))
                    .validate(Validator::StringMatch(
                        r"^[一-龥0-9a-zA-Z_-]+$",
                        "only letters, digits, underscores (_), and hyphens (-) are allowed",
                    )),
            )
            .attribute(
                "scaling_policy_type",
                Attribute::string()
                    .required()
                    .validate(Validator::StringInSlice(&["ALARM", "SCHEDULED", "RECURRENCE"])),
            )
            .attribute("bandwidth_id", Attribute::string().required())
            .attribute("alarm_id", Attribute::string().optional().computed())
            .attribute(
                "scheduled_policy",
                Attribute::block(scheduled_policy_schema())
                    .optional()
                    .computed()
                    .max_items(1),
            )
            .attribute(
                "scaling_policy_action",
                Attribute::block(policy_action_schema())
                    .optional()
                    .computed()
                    .max_items(1),
            )
            .attribute(
                "cool_down_time",
                Attribute::int()
                    .optional()
                    .computed()
                    .validate(Validator::IntBetween(0, 86400)),
            )
            .attribute("description", Attribute::string().optional())
            .attribute(
                "action",
                Attribute::string()
                    .optional()
                    .validate(Validator::StringInSlice(&["pause", "resume"])),
            )
            .attribute("scaling_resource_type", Attribute::string().computed())
            .attribute("status", Attribute::string().computed())
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts {
            update: Some(Duration::from_secs(600)),
            ..Default::default()
        }
    }

    async fn create(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE_V2).await?;

        let body = build_policy_body(d);
        debug!("AS bandwidth policy create options: {}", body);
        let resp = client
            .post(&client.service_url(&["scaling_policy"]), body)
            .await
            .map_err(|e| diag_errorf!("error creating AS bandwidth policy: {}", e))?;
        let policy_id = path_str("scaling_policy_id", &resp).ok_or_else(|| {
            diag_errorf!("unable to find the AS bandwidth policy ID from the API response")
        })?;
        d.set_id(&policy_id);
        info!(id = %policy_id, "AS bandwidth policy created");

        if d.get_str("action") == "pause" {
            let v1 = service_client(conf, d, SERVICE_V1).await?;
            execute_action(&v1, &client, conf, &policy_id, "pause", d.timeout(Operation::Create))
                .await?;
        }

        self.read(d, conf).await
    }

    async fn read(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let region = conf.get_region(d);
        let client = service_client(conf, d, SERVICE_V2).await?;
        let policy_id = d.id().to_string();

        let policy = match get_policy(&client, &policy_id).await {
            Ok(policy) => policy,
            Err(err) => return check_deleted(d, err, "error retrieving AS bandwidth policy"),
        };

        d.set("region", region);
        d.set("scaling_policy_name", path_string("scaling_policy_name", &policy));
        d.set("scaling_policy_type", path_string("scaling_policy_type", &policy));
        d.set("bandwidth_id", path_string("scaling_resource_id", &policy));
        d.set("scaling_resource_type", path_string("scaling_resource_type", &policy));
        d.set("alarm_id", path_string("alarm_id", &policy));
        d.set("cool_down_time", path_i64("cool_down_time", &policy).unwrap_or_default());
        d.set("description", path_string("description", &policy));
        d.set("status", path_string("policy_status", &policy));
        d.set("scheduled_policy", flatten_scheduled_policy(&policy));
        d.set("scaling_policy_action", flatten_policy_action(&policy));
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE_V2).await?;
        let policy_id = d.id().to_string();

        let changes = [
            "scaling_policy_name",
            "scaling_policy_type",
            "bandwidth_id",
            "alarm_id",
            "scheduled_policy",
            "scaling_policy_action",
            "cool_down_time",
            "description",
        ];
        if d.has_changes(&changes) {
            let body = build_policy_body(d);
            debug!("AS bandwidth policy update options: {}", body);
            client
                .put(&client.service_url(&["scaling_policy", &policy_id]), body)
                .await
                .map_err(|e| diag_errorf!("error updating AS bandwidth policy {}: {}", policy_id, e))?;
        }

        if d.has_change("action") {
            let action = d.get_str("action").to_string();
            if !action.is_empty() {
                let v1 = service_client(conf, d, SERVICE_V1).await?;
                execute_action(&v1, &client, conf, &policy_id, &action, d.timeout(Operation::Update))
                    .await?;
            }
        }

        self.read(d, conf).await
    }

    async fn delete(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE_V1).await?;
        let policy_id = d.id().to_string();

        if let Err(err) = client
            .delete(&client.service_url(&["scaling_policy", &policy_id]))
            .await
        {
            return check_deleted(d, err, "error deleting AS bandwidth policy");
        }
        info!(id = %policy_id, "AS bandwidth policy deleted");
        Ok(())
    }
}

fn build_policy_body(d: &ResourceData) -> Value {
    let body = json!({
        "scaling_policy_name": d.get_str("scaling_policy_name"),
        "scaling_resource_id": d.get_str("bandwidth_id"),
        "scaling_resource_type": "BANDWIDTH",
        "scaling_policy_type": d.get_str("scaling_policy_type"),
        "alarm_id": value_ignore_empty(d.get("alarm_id")),
        "cool_down_time": value_ignore_empty(d.get("cool_down_time")),
        "description": value_ignore_empty(d.get("description")),
        "scheduled_policy": build_first_block(d.get_list("scheduled_policy"), &[
            "launch_time",
            "recurrence_type",
            "recurrence_value",
            "start_time",
            "end_time",
        ]),
        "scaling_policy_action": build_first_block(d.get_list("scaling_policy_action"), &[
            "operation",
            "size",
            "limits",
        ]),
    });
    remove_nil(body)
}

/// First element of a single-item block, keeping only non-empty `fields`
fn build_first_block(blocks: &[Value], fields: &[&str]) -> Value {
    let Some(block) = blocks.first() else {
        return Value::Null;
    };
    let map: serde_json::Map<String, Value> = fields
        .iter()
        .map(|field| (field.to_string(), value_ignore_empty(block.get(*field))))
        .filter(|(_, v)| !v.is_null())
        .collect();
    if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    }
}

fn flatten_scheduled_policy(policy: &Value) -> Value {
    match path_search("scheduled_policy", policy) {
        Some(scheduled) => json!([{
            "launch_time": path_string("launch_time", scheduled),
            "recurrence_type": path_string("recurrence_type", scheduled),
            "recurrence_value": path_string("recurrence_value", scheduled),
            "start_time": path_string("start_time", scheduled),
            "end_time": path_string("end_time", scheduled),
        }]),
        None => json!([]),
    }
}

fn flatten_policy_action(policy: &Value) -> Value {
    match path_search("scaling_policy_action", policy) {
        Some(action) => json!([{
            "operation": path_string("operation", action),
            "size": path_i64("size", action).unwrap_or_default(),
            "limits": path_i64("limits", action).unwrap_or_default(),
        }]),
        None => json!([]),
    }
}

async fn get_policy(client: &ServiceClient, policy_id: &str) -> Result<Value> {
    let resp = client
        .get(&client.service_url(&["scaling_policy", policy_id]))
        .await?;
    Ok(path_search("scaling_policy", &resp).cloned().unwrap_or(Value::Null))
}

/// Pause or resume the policy and wait for the matching status
async fn execute_action(
    v1: &ServiceClient,
    v2: &ServiceClient,
    conf: &Config,
    policy_id: &str,
    action: &str,
    timeout: Duration,
) -> DiagResult {
    v1.post(
        &v1.service_url(&["scaling_policy", policy_id, "action"]),
        json!({"action": action}),
    )
    .await
    .map_err(|e| diag_errorf!("error performing {} action on AS bandwidth policy {}: {}", action, policy_id, e))?;

    let expected = if action == "pause" { "PAUSED" } else { "INSERVICE" };
    let wait = conf.pace(
        StateChangeConf::new(["PENDING"], ["COMPLETED"])
            .timeout(timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_POLL_INTERVAL),
    );
    wait.wait_for_state(|| refresh_policy_status(v2, policy_id, expected))
        .await
        .map_err(|e| {
            diag_errorf!(
                "error waiting for AS bandwidth policy {} to become {}: {}",
                policy_id,
                expected,
                e
            )
        })?;
    Ok(())
}

async fn refresh_policy_status(
    client: &ServiceClient,
    policy_id: &str,
    expected: &str,
) -> RefreshResult<Value> {
    let policy = get_policy(client, policy_id).await?;
    let state = if path_string("policy_status", &policy) == expected {
        "COMPLETED"
    } else {
        "PENDING"
    };
    Ok((Some(policy), state.to_string()))
}
