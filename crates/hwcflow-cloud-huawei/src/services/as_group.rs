//! `huaweicloud_as_group`: Auto Scaling group
//!
//! API endpoints (below `autoscaling-api/v1/{project_id}/`):
//! - `POST scaling_group`, `GET|PUT|DELETE scaling_group/{id}`
//! - `POST scaling_group/{id}/action` (`resume` / `pause`)
//! - `GET scaling_group_instance/{id}/list`, `POST scaling_group_instance/{id}/action`
//! - `GET scaling_group_tag/{id}/tags`, `POST scaling_group_tag/{id}/tags/action`

use super::service_client;
use crate::client::ServiceClient;
use crate::common::{check_deleted, convert_expected_400_err_into_404_err};
use crate::config::Config;
use crate::error::Result;
use crate::utils::{
    expand_resource_tags, flatten_tag_list, path_array, path_bool, path_i64, path_search, path_str,
    path_string, remove_nil, value_ignore_empty,
};
use async_trait::async_trait;
use hwcflow_cloud::{
    Attribute, DiagResult, Operation, RefreshResult, Resource, ResourceData, ResourceTimeouts,
    Schema, StateChangeConf, Validator, ValueType, WaitError, diag_errorf,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TYPE_NAME: &str = "huaweicloud_as_group";

const SERVICE: &str = "autoscaling";
const GROUP_NOT_FOUND_CODE: &str = "AS.2007";
const INSTANCE_PAGE_SIZE: usize = 100;
const WAIT_DELAY: Duration = Duration::from_secs(10);
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct AsGroup;

fn network_schema() -> Schema {
    Schema::new()
        .attribute("id", Attribute::string().required())
        .attribute("ipv6_enable", Attribute::bool().optional().computed())
        .attribute("ipv6_bandwidth_id", Attribute::string().optional().computed())
        .attribute("source_dest_check", Attribute::bool().default(true))
}

fn lbaas_listener_schema() -> Schema {
    Schema::new()
        .attribute("pool_id", Attribute::string().required())
        .attribute("protocol_port", Attribute::int().required())
        .attribute("weight", Attribute::int().default(1))
}

#[async_trait]
impl Resource<Config> for AsGroup {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("region", Attribute::string().optional().computed().force_new())
            .attribute(
                "scaling_group_name",
                Attribute::string()
                    .required()
                    .validate(Validator::StringLenBetween(1, 64))
                    .validate(Validator::StringMatch(
                        r"^[一-龥0-9a-zA-Z_-]+$",
                        "only letters, digits, underscores (_), and hyphens (-) are allowed",
                    )),
            )
            .attribute("scaling_configuration_id", Attribute::string().optional().computed())
            .attribute("desire_instance_number", Attribute::int().optional().computed())
            .attribute("min_instance_number", Attribute::int().default(0))
            .attribute("max_instance_number", Attribute::int().default(0))
            .attribute(
                "cool_down_time",
                Attribute::int()
                    .default(300)
                    .validate(Validator::IntBetween(0, 86400)),
            )
            .attribute(
                "lbaas_listeners",
                Attribute::block(lbaas_listener_schema())
                    .optional()
                    .computed()
                    .max_items(6),
            )
            .attribute("vpc_id", Attribute::string().required().force_new())
            .attribute(
                "networks",
                Attribute::block(network_schema()).required().max_items(5),
            )
            .attribute(
                "security_groups",
                Attribute::block(Schema::new().attribute("id", Attribute::string().required()))
                    .optional()
                    .computed(),
            )
            .attribute(
                "availability_zones",
                Attribute::list(ValueType::String).optional().computed(),
            )
            .attribute("multi_az_scaling_policy", Attribute::string().optional().computed())
            .attribute(
                "health_periodic_audit_method",
                Attribute::string()
                    .default("NOVA_AUDIT")
                    .validate(Validator::StringInSlice(&["ELB_AUDIT", "NOVA_AUDIT"])),
            )
            .attribute(
                "health_periodic_audit_time",
                Attribute::int()
                    .default(5)
                    .validate(Validator::IntInSlice(&[0, 1, 5, 15, 60, 180])),
            )
            .attribute(
                "health_periodic_audit_grace_period",
                Attribute::int()
                    .optional()
                    .computed()
                    .validate(Validator::IntBetween(0, 86400)),
            )
            .attribute(
                "instance_terminate_policy",
                Attribute::string()
                    .default("OLD_CONFIG_OLD_INSTANCE")
                    .validate(Validator::StringInSlice(&[
                        "OLD_CONFIG_OLD_INSTANCE",
                        "OLD_CONFIG_NEW_INSTANCE",
                        "OLD_INSTANCE",
                        "NEW_INSTANCE",
                    ])),
            )
            .attribute("agency_name", Attribute::string().optional().computed())
            .attribute("delete_publicip", Attribute::bool().default(false))
            .attribute(
                "delete_instances",
                Attribute::string()
                    .default("no")
                    .validate(Validator::StringInSlice(&["yes", "no"])),
            )
            .attribute("force_delete", Attribute::bool().optional())
            .attribute("enable", Attribute::bool().default(true))
            .attribute("description", Attribute::string().optional().computed())
            .attribute("tags", Attribute::map().optional())
            .attribute("enterprise_project_id", Attribute::string().optional().computed())
            .attribute("instances", Attribute::list(ValueType::String).computed())
            .attribute("current_instance_number", Attribute::int().computed())
            .attribute("status", Attribute::string().computed())
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts {
            create: Some(Duration::from_secs(600)),
            delete: Some(Duration::from_secs(600)),
            ..Default::default()
        }
    }

    async fn create(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE).await?;

        let desire = instance_numbers(d)?;
        let body = build_group_body(d, conf, desire, true);
        debug!("AS group create options: {}", body);

        let resp = client
            .post(&client.service_url(&["scaling_group"]), body)
            .await
            .map_err(|e| diag_errorf!("error creating AS group: {}", e))?;
        let group_id = path_str("scaling_group_id", &resp)
            .ok_or_else(|| diag_errorf!("unable to find the AS group ID from the API response"))?;
        d.set_id(&group_id);
        info!(id = %group_id, "AS group created");

        let tags = d.get_map("tags");
        if !tags.is_empty() {
            update_tags(&client, &group_id, "create", &tags)
                .await
                .map_err(|e| diag_errorf!("error setting tags of AS group {}: {}", group_id, e))?;
        }

        // a new group is paused until resumed
        if d.get_bool("enable") {
            group_action(&client, &group_id, "resume")
                .await
                .map_err(|e| diag_errorf!("error enabling AS group {}: {}", group_id, e))?;
        }

        if desire > 0 {
            let wait = conf.pace(
                StateChangeConf::new(["PENDING"], ["INSERVICE"])
                    .timeout(d.timeout(Operation::Create))
                    .delay(WAIT_DELAY)
                    .poll_interval(WAIT_POLL_INTERVAL),
            );
            wait.wait_for_state(|| refresh_instances_in_service(&client, &group_id, desire as usize))
                .await
                .map_err(|e| {
                    diag_errorf!(
                        "error waiting for instances in the AS group {} to become inservice: {}",
                        group_id,
                        e
                    )
                })?;
        }

        self.read(d, conf).await
    }

    async fn read(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let region = conf.get_region(d);
        let client = service_client(conf, d, SERVICE).await?;
        let group_id = d.id().to_string();

        let group = match get_group(&client, &group_id).await {
            Ok(group) => group,
            Err(err) => return check_deleted(d, err, "AS group"),
        };
        debug!(id = %group_id, "Retrieved AS group");

        let instances = list_instances(&client, &group_id)
            .await
            .map_err(|e| diag_errorf!("can not get the instances in AS Group {}: {}", group_id, e))?;

        let status = path_string("scaling_group_status", &group);
        d.set("region", region);
        d.set("scaling_group_name", path_string("scaling_group_name", &group));
        d.set("scaling_configuration_id", path_string("scaling_configuration_id", &group));
        d.set("vpc_id", path_string("vpc_id", &group));
        d.set("enable", status == "INSERVICE");
        d.set("status", status);
        d.set("current_instance_number", int_at("current_instance_number", &group));
        d.set("desire_instance_number", int_at("desire_instance_number", &group));
        d.set("min_instance_number", int_at("min_instance_number", &group));
        d.set("max_instance_number", int_at("max_instance_number", &group));
        d.set("cool_down_time", int_at("cool_down_time", &group));
        d.set("health_periodic_audit_method", path_string("health_periodic_audit_method", &group));
        d.set("health_periodic_audit_time", int_at("health_periodic_audit_time", &group));
        d.set(
            "health_periodic_audit_grace_period",
            int_at("health_periodic_audit_grace_period", &group),
        );
        d.set("instance_terminate_policy", path_string("instance_terminate_policy", &group));
        d.set("delete_publicip", path_bool("delete_publicip", &group).unwrap_or_default());
        d.set("enterprise_project_id", path_string("enterprise_project_id", &group));
        d.set("availability_zones", path_array("available_zones", &group).to_vec());
        d.set("multi_az_scaling_policy", path_string("multi_az_priority_policy", &group));
        d.set("description", path_string("description", &group));
        d.set("agency_name", path_string("iam_agency_name", &group));
        d.set("instances", instance_ids(&instances));
        d.set("networks", flatten_networks(path_array("networks", &group)));
        d.set("security_groups", flatten_security_groups(path_array("security_groups", &group)));
        d.set("lbaas_listeners", flatten_lbaas_listeners(path_array("lbaas_listeners", &group)));

        match get_tags(&client, &group_id).await {
            Ok(tags) => d.set("tags", Value::Object(flatten_tag_list(&tags))),
            Err(err) => warn!(id = %group_id, "Error fetching tags of AS group: {}", err),
        }
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE).await?;
        let group_id = d.id().to_string();

        let desire = if d.has_changes(&[
            "min_instance_number",
            "max_instance_number",
            "desire_instance_number",
        ]) {
            instance_numbers(d)?
        } else {
            desired_number(d)
        };

        let body = build_group_body(d, conf, desire, false);
        debug!("AS group update options: {}", body);
        client
            .put(&client.service_url(&["scaling_group", &group_id]), body)
            .await
            .map_err(|e| diag_errorf!("error updating AS group {}: {}", group_id, e))?;

        if d.has_change("tags") {
            let (old, new) = d.get_change("tags");
            let old = tag_map(old);
            let new = tag_map(new);
            if !old.is_empty() {
                update_tags(&client, &group_id, "delete", &old)
                    .await
                    .map_err(|e| diag_errorf!("error deleting tags of AS group {}: {}", group_id, e))?;
            }
            if !new.is_empty() {
                update_tags(&client, &group_id, "create", &new)
                    .await
                    .map_err(|e| diag_errorf!("error setting tags of AS group {}: {}", group_id, e))?;
            }
        }

        if d.has_change("enable") {
            if d.get_bool("enable") {
                group_action(&client, &group_id, "resume")
                    .await
                    .map_err(|e| diag_errorf!("error enabling AS group {}: {}", group_id, e))?;
                debug!(id = %group_id, "Enabled AS group");
            } else {
                group_action(&client, &group_id, "pause")
                    .await
                    .map_err(|e| diag_errorf!("error disabling AS group {}: {}", group_id, e))?;
                debug!(id = %group_id, "Disabled AS group");
            }
        }

        self.read(d, conf).await
    }

    async fn delete(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE).await?;
        let group_id = d.id().to_string();
        let timeout = d.timeout(Operation::Delete);

        if d.get_bool("force_delete") {
            let url = format!(
                "{}?force_delete=yes",
                client.service_url(&["scaling_group", &group_id])
            );
            client
                .delete(&url)
                .await
                .map_err(|e| diag_errorf!("error deleting AS group {}: {}", group_id, e))?;
            wait_group_deleted(&client, conf, &group_id, timeout)
                .await
                .map_err(|e| diag_errorf!("error deleting AS group {}: {}", group_id, e))?;
            return Ok(());
        }

        let instances = list_instances(&client, &group_id)
            .await
            .map_err(|e| diag_errorf!("error listing instances of AS group: {}", e))?;
        let ids = instance_ids(&instances);
        debug!(id = %group_id, instances = ?ids, "Instances in AS group");

        for instance in &instances {
            let state = path_string("life_cycle_state", instance);
            if state != "INSERVICE" {
                return Err(diag_errorf!(
                    "can't delete the AS group {}: some instances are not in INSERVICE but in {}, \
                     please try again latter or use force_delete option",
                    group_id,
                    state
                ));
            }
        }

        if !instances.is_empty() {
            let min = d.get_i64("min_instance_number");
            if min > 0 {
                return Err(diag_errorf!(
                    "can't delete the AS group {}: The instance number after the removal will less than \
                     min number {}, please modify the min number to zero or use force_delete option",
                    group_id,
                    min
                ));
            }

            let body = json!({
                "action": "REMOVE",
                "instances_id": ids,
                "instance_delete": d.get_str("delete_instances"),
            });
            client
                .post(
                    &client.service_url(&["scaling_group_instance", &group_id, "action"]),
                    body,
                )
                .await
                .map_err(|e| diag_errorf!("error removing instances of AS group: {}", e))?;

            let wait = conf.pace(
                StateChangeConf::new(["REMOVING"], [""])
                    .timeout(timeout)
                    .delay(WAIT_DELAY)
                    .poll_interval(WAIT_POLL_INTERVAL),
            );
            wait.wait_for_state(|| refresh_instances_removed(&client, &group_id))
                .await
                .map_err(|e| {
                    diag_errorf!("error removing instances from AS group {}: {}", group_id, e)
                })?;
        }

        client
            .delete(&client.service_url(&["scaling_group", &group_id]))
            .await
            .map_err(|e| diag_errorf!("error deleting AS group: {}", e))?;
        info!(id = %group_id, "AS group deleted");
        Ok(())
    }
}

fn desired_number(d: &ResourceData) -> i64 {
    match d.get_ok("desire_instance_number").and_then(Value::as_i64) {
        Some(n) => n,
        None => d.get_i64("min_instance_number"),
    }
}

/// Desired instance number, checked against the min/max bounds
fn instance_numbers(d: &ResourceData) -> DiagResult<i64> {
    let min = d.get_i64("min_instance_number");
    let max = d.get_i64("max_instance_number");
    let desire = desired_number(d);
    debug!(min, max, desire, "Instance number options");
    if desire < min || desire > max {
        return Err(diag_errorf!(
            "invalid parameters: it should be min_instance_number <= desire_instance_number <= max_instance_number"
        ));
    }
    Ok(desire)
}

fn build_group_body(d: &ResourceData, conf: &Config, desire: i64, create: bool) -> Value {
    let enterprise_project_id = conf.get_enterprise_project_id(d);
    let mut body = json!({
        "scaling_group_name": d.get_str("scaling_group_name"),
        "scaling_configuration_id": value_ignore_empty(d.get("scaling_configuration_id")),
        "desire_instance_number": desire,
        "min_instance_number": d.get_i64("min_instance_number"),
        "max_instance_number": d.get_i64("max_instance_number"),
        "cool_down_time": d.get_i64("cool_down_time"),
        "available_zones": value_ignore_empty(d.get("availability_zones")),
        "lbaas_listeners": build_lbaas_listeners(d.get_list("lbaas_listeners")),
        "networks": build_networks(d.get_list("networks")),
        "security_groups": build_security_groups(d.get_list("security_groups")),
        "health_periodic_audit_method": value_ignore_empty(d.get("health_periodic_audit_method")),
        "health_periodic_audit_time": d.get_i64("health_periodic_audit_time"),
        "health_periodic_audit_grace_period": value_ignore_empty(d.get("health_periodic_audit_grace_period")),
        "instance_terminate_policy": value_ignore_empty(d.get("instance_terminate_policy")),
        "multi_az_priority_policy": value_ignore_empty(d.get("multi_az_scaling_policy")),
        "delete_publicip": d.get_bool("delete_publicip"),
        "enterprise_project_id": value_ignore_empty(Some(&Value::String(enterprise_project_id))),
    });

    if create {
        body["vpc_id"] = json!(d.get_str("vpc_id"));
        body["description"] = value_ignore_empty(d.get("description"));
        body["iam_agency_name"] = value_ignore_empty(d.get("agency_name"));
    } else {
        // an empty description clears the remote one
        body["description"] = json!(d.get_str("description"));
        if d.has_change("agency_name") {
            body["iam_agency_name"] = json!(d.get_str("agency_name"));
        }
    }
    remove_nil(body)
}

fn build_networks(networks: &[Value]) -> Value {
    networks
        .iter()
        .map(|network| {
            let address_pairs = if path_bool("source_dest_check", network).unwrap_or(true) {
                json!([])
            } else {
                json!([{"ip_address": "1.1.1.1/0"}])
            };
            let bandwidth = path_str("ipv6_bandwidth_id", network)
                .filter(|id| !id.is_empty())
                .map(|id| json!({"id": id}));
            json!({
                "id": path_string("id", network),
                "ipv6_enable": path_bool("ipv6_enable", network).unwrap_or_default(),
                "ipv6_bandwidth": bandwidth,
                "allowed_address_pairs": address_pairs,
            })
        })
        .collect()
}

fn build_security_groups(groups: &[Value]) -> Value {
    if groups.is_empty() {
        return Value::Null;
    }
    groups
        .iter()
        .map(|group| json!({"id": path_string("id", group)}))
        .collect()
}

fn build_lbaas_listeners(listeners: &[Value]) -> Value {
    if listeners.is_empty() {
        return Value::Null;
    }
    listeners
        .iter()
        .map(|listener| {
            json!({
                "pool_id": path_string("pool_id", listener),
                "protocol_port": path_i64("protocol_port", listener).unwrap_or_default(),
                "weight": path_i64("weight", listener).unwrap_or(1),
            })
        })
        .collect()
}

fn flatten_networks(networks: &[Value]) -> Value {
    networks
        .iter()
        .map(|network| {
            json!({
                "id": path_string("id", network),
                "ipv6_enable": path_bool("ipv6_enable", network).unwrap_or_default(),
                "ipv6_bandwidth_id": path_string("ipv6_bandwidth.id", network),
                "source_dest_check": path_array("allowed_address_pairs", network).is_empty(),
            })
        })
        .collect()
}

fn flatten_security_groups(groups: &[Value]) -> Value {
    groups
        .iter()
        .map(|group| json!({"id": path_string("id", group)}))
        .collect()
}

fn flatten_lbaas_listeners(listeners: &[Value]) -> Value {
    listeners
        .iter()
        .map(|listener| {
            json!({
                "pool_id": path_string("pool_id", listener),
                "protocol_port": path_i64("protocol_port", listener).unwrap_or_default(),
                "weight": path_i64("weight", listener).unwrap_or_default(),
            })
        })
        .collect()
}

fn int_at(path: &str, value: &Value) -> i64 {
    path_i64(path, value).unwrap_or_default()
}

fn tag_map(value: Option<&Value>) -> BTreeMap<String, String> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// IDs of the listed instances; pending instances may not have one yet
fn instance_ids(instances: &[Value]) -> Vec<String> {
    instances
        .iter()
        .filter_map(|instance| path_str("instance_id", instance))
        .filter(|id| !id.is_empty())
        .collect()
}

/// Group details, with "group does not exist" reported as a 404
async fn get_group(client: &ServiceClient, group_id: &str) -> Result<Value> {
    match client
        .get(&client.service_url(&["scaling_group", group_id]))
        .await
    {
        Ok(resp) => Ok(path_search("scaling_group", &resp).cloned().unwrap_or(Value::Null)),
        Err(err) => Err(convert_expected_400_err_into_404_err(
            err,
            "error.code",
            &[GROUP_NOT_FOUND_CODE],
        )),
    }
}

async fn list_instances(client: &ServiceClient, group_id: &str) -> Result<Vec<Value>> {
    let base = client.service_url(&["scaling_group_instance", group_id, "list"]);
    let mut instances = Vec::new();
    loop {
        let url = format!(
            "{}?limit={}&start_number={}",
            base,
            INSTANCE_PAGE_SIZE,
            instances.len()
        );
        let resp = client.get(&url).await?;
        let page = path_array("scaling_group_instances", &resp);
        instances.extend_from_slice(page);
        let total = path_i64("total_number", &resp).unwrap_or_default() as usize;
        if page.len() < INSTANCE_PAGE_SIZE || instances.len() >= total {
            return Ok(instances);
        }
    }
}

async fn group_action(client: &ServiceClient, group_id: &str, action: &str) -> Result<()> {
    client
        .post(
            &client.service_url(&["scaling_group", group_id, "action"]),
            json!({"action": action}),
        )
        .await?;
    Ok(())
}

async fn get_tags(client: &ServiceClient, group_id: &str) -> Result<Vec<Value>> {
    let resp = client
        .get(&client.service_url(&["scaling_group_tag", group_id, "tags"]))
        .await?;
    Ok(path_array("tags", &resp).to_vec())
}

async fn update_tags(
    client: &ServiceClient,
    group_id: &str,
    action: &str,
    tags: &BTreeMap<String, String>,
) -> Result<()> {
    client
        .post(
            &client.service_url(&["scaling_group_tag", group_id, "tags", "action"]),
            json!({"action": action, "tags": expand_resource_tags(tags)}),
        )
        .await?;
    Ok(())
}

/// `PENDING` until `expected` instances are listed and none is still joining
async fn refresh_instances_in_service(
    client: &ServiceClient,
    group_id: &str,
    expected: usize,
) -> RefreshResult<Vec<Value>> {
    let instances = list_instances(client, group_id).await?;
    if instances.len() != expected {
        return Ok((Some(instances), "PENDING".to_string()));
    }
    let joining = instances
        .iter()
        .map(|instance| path_string("life_cycle_state", instance))
        .find(|state| state == "PENDING" || state == "REMOVING");
    match joining {
        Some(state) => Ok((Some(instances), state)),
        None => Ok((Some(instances), "INSERVICE".to_string())),
    }
}

/// Empty state once the group has no instances left
async fn refresh_instances_removed(
    client: &ServiceClient,
    group_id: &str,
) -> RefreshResult<Vec<Value>> {
    let instances = list_instances(client, group_id).await?;
    if instances.is_empty() {
        return Ok((Some(instances), String::new()));
    }
    let state = instances
        .iter()
        .map(|instance| path_string("life_cycle_state", instance))
        .find(|state| state != "INSERVICE")
        .unwrap_or_else(|| "REMOVING".to_string());
    Ok((Some(instances), state))
}

async fn wait_group_deleted(
    client: &ServiceClient,
    conf: &Config,
    group_id: &str,
    timeout: Duration,
) -> std::result::Result<(), WaitError> {
    let wait = conf.pace(
        StateChangeConf::new(Vec::<String>::new(), ["DELETED"])
            .timeout(timeout)
            .delay(WAIT_DELAY)
            .poll_interval(WAIT_POLL_INTERVAL),
    );
    wait.wait_for_state(|| refresh_group_deleted(client, group_id))
        .await?;
    Ok(())
}

async fn refresh_group_deleted(client: &ServiceClient, group_id: &str) -> RefreshResult<Value> {
    match get_group(client, group_id).await {
        Ok(group) => {
            let status = path_string("scaling_group_status", &group);
            Ok((Some(group), status))
        }
        Err(err) if err.is_not_found() => Ok((Some(Value::Null), "DELETED".to_string())),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use serde_json::Map;

    fn config() -> Config {
        Config::new(ProviderConfig {
            region: "cn-north-4".into(),
            auth_token: "token".into(),
            project_id: "p1".into(),
            enterprise_project_id: "0".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn data(attrs: Value) -> ResourceData {
        let mut config: Map<String, Value> = attrs.as_object().cloned().unwrap();
        AsGroup.schema().apply_defaults(&mut config);
        ResourceData::new(config)
    }

    #[test]
    fn test_schema_rejects_bad_names_and_values() {
        let schema = AsGroup.schema();
        let config = json!({
            "scaling_group_name": "bad name!",
            "vpc_id": "vpc-1",
            "networks": [{"id": "n1"}],
            "health_periodic_audit_time": 7,
        });
        let diags = schema.validate(config.as_object().unwrap());
        let paths: Vec<_> = diags
            .errors()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert!(paths.contains(&"scaling_group_name".to_string()));
        assert!(paths.contains(&"health_periodic_audit_time".to_string()));

        let ok = json!({
            "scaling_group_name": "tf-test_组",
            "vpc_id": "vpc-1",
            "networks": [{"id": "n1"}],
        });
        assert!(!schema.validate(ok.as_object().unwrap()).has_error());
    }

    #[test]
    fn test_instance_number_bounds() {
        let d = data(json!({"min_instance_number": 1, "max_instance_number": 3}));
        assert_eq!(instance_numbers(&d).unwrap(), 1);

        let d = data(json!({"min_instance_number": 1, "max_instance_number": 3, "desire_instance_number": 5}));
        let err = instance_numbers(&d).unwrap_err();
        assert!(err.to_string().contains("min_instance_number <= desire_instance_number"));
    }

    #[test]
    fn test_create_body() {
        let d = data(json!({
            "scaling_group_name": "web",
            "vpc_id": "vpc-1",
            "max_instance_number": 2,
            "networks": [
                {"id": "n1"},
                {"id": "n2", "source_dest_check": false, "ipv6_enable": true, "ipv6_bandwidth_id": "bw"},
            ],
            "security_groups": [{"id": "sg-1"}],
        }));
        let body = build_group_body(&d, &config(), 0, true);

        assert_eq!(body["scaling_group_name"], "web");
        assert_eq!(body["vpc_id"], "vpc-1");
        assert_eq!(body["cool_down_time"], 300);
        assert_eq!(body["health_periodic_audit_method"], "NOVA_AUDIT");
        assert_eq!(body["networks"][0]["allowed_address_pairs"], json!([]));
        assert!(body["networks"][0].get("ipv6_bandwidth").is_none());
        assert_eq!(
            body["networks"][1]["allowed_address_pairs"],
            json!([{"ip_address": "1.1.1.1/0"}])
        );
        assert_eq!(body["networks"][1]["ipv6_bandwidth"], json!({"id": "bw"}));
        assert_eq!(body["security_groups"], json!([{"id": "sg-1"}]));
        assert!(body.get("lbaas_listeners").is_none());
        assert!(body.get("description").is_none());
        assert_eq!(body["enterprise_project_id"], "0");
    }

    #[test]
    fn test_flatten_networks() {
        let networks = json!([
            {"id": "n1", "ipv6_enable": false, "allowed_address_pairs": []},
            {"id": "n2", "ipv6_enable": true, "ipv6_bandwidth": {"id": "bw"},
             "allowed_address_pairs": [{"ip_address": "1.1.1.1/0"}]},
        ]);
        let flat = flatten_networks(networks.as_array().unwrap());
        assert_eq!(flat[0]["source_dest_check"], true);
        assert_eq!(flat[1]["source_dest_check"], false);
        assert_eq!(flat[1]["ipv6_bandwidth_id"], "bw");
    }

    #[test]
    fn test_instance_ids_skip_pending() {
        let instances = vec![
            json!({"instance_id": "i-1", "life_cycle_state": "INSERVICE"}),
            json!({"instance_id": "", "life_cycle_state": "PENDING"}),
        ];
        assert_eq!(instance_ids(&instances), vec!["i-1".to_string()]);
    }
}
