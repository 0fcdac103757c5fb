//! `huaweicloud_drs_job`: Data Replication Service migration, synchronization
//! or disaster recovery job
//!
//! API endpoints:
//! - `POST v3/{project_id}/jobs/batch-creation`, `batch-status`, `batch-detail`
//! - `POST v3/{project_id}/jobs/batch-connection`, `batch-precheck`,
//!   `batch-precheck-result`, `batch-starting`
//! - `PUT v3/{project_id}/jobs/batch-modification`, `batch-limit-speed`
//! - `DELETE v3/{project_id}/jobs/batch-jobs`
//! - `POST v3/{project_id}/jobs` (list)
//! - `PUT v5/{project_id}/jobs/{job_id}`, `POST v5/{project_id}/jobs/{job_id}/action`
//! - `POST v5/{project_id}/jobs/{resource_type}/{job_id}/tags/action`

use super::service_client;
use crate::client::ServiceClient;
use crate::common::{check_deleted, convert_expected_400_err_into_404_err};
use crate::config::Config;
use crate::error::{HuaweiError, Result};
use crate::utils::{
    expand_resource_tags, flatten_tag_list, path_array, path_bool, path_i64, path_search, path_str,
    path_string, remove_nil, value_ignore_empty,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use hwcflow_cloud::{
    Attribute, DiagResult, Operation, RefreshResult, Resource, ResourceData, ResourceTimeouts,
    Schema, StateChangeConf, Validator, ValueType, WaitError, diag_errorf,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const TYPE_NAME: &str = "huaweicloud_drs_job";

const SERVICE_V3: &str = "drs";
const SERVICE_V5: &str = "drsv5";
const WAIT_DELAY: Duration = Duration::from_secs(20);
const LIST_PAGE_SIZE: i64 = 100;

/// Error codes DRS answers with (status 400) for a job that does not exist
const JOB_NOT_FOUND_CODES: &[&str] = &["DRS.M00289", "DRS.M05004"];

const FAILED_STATUSES: &[&str] = &[
    "START_JOB_FAILED",
    "CREATE_FAILED",
    "RELEASE_RESOURCE_FAILED",
    "CHILD_TRANSFER_FAILED",
];

/// Statuses in which a job can be deleted without terminating it first
const DELETABLE_STATUSES: &[&str] = &[
    "CREATE_FAILED",
    "RELEASE_RESOURCE_COMPLETE",
    "RELEASE_CHILD_TRANSFER_COMPLETE",
];

const RELEASED_STATUSES: &[&str] = &[
    "RELEASE_RESOURCE_COMPLETE",
    "RELEASE_RESOURCE_STARTED",
    "RELEASE_RESOURCE_FAILED",
];

const STARTED_STATUSES: &[&str] = &[
    "FULL_TRANSFER_STARTED",
    "FULL_TRANSFER_COMPLETE",
    "INCRE_TRANSFER_STARTED",
];

/// Job types a sweeper lists
pub(crate) const JOB_TYPES: &[&str] = &["migration", "sync", "cloudDataGuard"];

pub struct DrsJob;

/// Lifecycle transitions the job status is polled for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOperation {
    Create,
    Start,
    Terminate,
    Stop,
    Reset,
    Restart,
}

impl JobOperation {
    fn as_str(self) -> &'static str {
        match self {
            JobOperation::Create => "create",
            JobOperation::Start => "start",
            JobOperation::Terminate => "terminate",
            JobOperation::Stop => "stop",
            JobOperation::Reset => "reset",
            JobOperation::Restart => "restart",
        }
    }

    fn from_action(action: &str) -> Option<Self> {
        match action {
            "stop" => Some(JobOperation::Stop),
            "restart" => Some(JobOperation::Restart),
            "reset" => Some(JobOperation::Reset),
            _ => None,
        }
    }

    /// Pending and target statuses
    fn states(self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            JobOperation::Create => (&["CREATING"], &["CONFIGURATION"]),
            JobOperation::Start | JobOperation::Reset => {
                (&["STARTJOBING", "WAITING_FOR_START"], STARTED_STATUSES)
            }
            JobOperation::Terminate => (&["PENDING"], &["RELEASE_RESOURCE_COMPLETE"]),
            JobOperation::Stop => (STARTED_STATUSES, &["PAUSING"]),
            JobOperation::Restart => (
                &["STARTJOBING", "WAITING_FOR_START", "CHILD_TRANSFER_STARTING"],
                &[
                    "FULL_TRANSFER_STARTED",
                    "FULL_TRANSFER_COMPLETE",
                    "INCRE_TRANSFER_STARTED",
                    "CHILD_TRANSFER_STARTED",
                    "CHILD_TRANSFER_COMPLETE",
                ],
            ),
        }
    }
}

fn db_info_schema() -> Schema {
    Schema::new()
        .attribute(
            "engine_type",
            Attribute::string()
                .required()
                .force_new()
                .validate(Validator::StringInSlice(&["mysql", "mongodb", "gaussdbv5"])),
        )
        .attribute("ip", Attribute::string().required().force_new())
        .attribute("port", Attribute::int().required().force_new())
        .attribute("user", Attribute::string().required().force_new())
        .attribute("password", Attribute::string().required().force_new().sensitive())
        .attribute("instance_id", Attribute::string().optional().force_new())
        .attribute("region", Attribute::string().optional().computed().force_new())
        .attribute("vpc_id", Attribute::string().optional().computed().force_new())
        .attribute("subnet_id", Attribute::string().optional().force_new())
        .attribute("name", Attribute::string().optional().computed().force_new())
        .attribute("ssl_enabled", Attribute::bool().default(false).force_new())
        .attribute("ssl_cert_key", Attribute::string().optional().force_new())
        .attribute("ssl_cert_name", Attribute::string().optional().force_new())
        .attribute("ssl_cert_check_sum", Attribute::string().optional().force_new())
        .attribute("ssl_cert_password", Attribute::string().optional().force_new())
}

fn limit_speed_schema() -> Schema {
    Schema::new()
        .attribute("speed", Attribute::string().required().force_new())
        .attribute("start_time", Attribute::string().required().force_new())
        .attribute("end_time", Attribute::string().required().force_new())
}

fn table_schema() -> Schema {
    Schema::new()
        .attribute("database", Attribute::string().required())
        .attribute("table_names", Attribute::list(ValueType::String).required())
}

#[async_trait]
impl Resource<Config> for DrsJob {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("region", Attribute::string().optional().computed().force_new())
            .attribute(
                "name",
                Attribute::string()
                    .required()
                    .validate(Validator::StringMatch(
                        r"^[A-Za-z][A-Za-z0-9_.-]*$",
                        "The name consists of 4 to 50 characters, starting with a letter. \
                         Only letters, digits, underscores (_) and hyphens (-) are allowed.",
                    ))
                    .validate(Validator::StringLenBetween(4, 50)),
            )
            .attribute("type", Attribute::string().required().force_new())
            .attribute("engine_type", Attribute::string().required().force_new())
            .attribute("direction", Attribute::string().required().force_new())
            .attribute(
                "source_db",
                Attribute::block(db_info_schema()).required().force_new().max_items(1),
            )
            .attribute(
                "destination_db",
                Attribute::block(db_info_schema()).required().force_new().max_items(1),
            )
            .attribute("destination_db_readnoly", Attribute::bool().default(true).force_new())
            .attribute("net_type", Attribute::string().default("eip").force_new())
            .attribute(
                "migration_type",
                Attribute::string().default("FULL_INCR_TRANS").force_new(),
            )
            .attribute(
                "description",
                Attribute::string()
                    .optional()
                    .validate(Validator::StringMatch(
                        r#"^[^!<>&'"\\]*$"#,
                        "The 'description' has special character",
                    ))
                    .validate(Validator::StringLenBetween(1, 256)),
            )
            .attribute("enterprise_project_id", Attribute::string().optional().force_new())
            .attribute("multi_write", Attribute::bool().default(false).force_new())
            .attribute("expired_days", Attribute::int().default(14).force_new())
            .attribute("start_time", Attribute::string().optional().force_new())
            .attribute("migrate_definer", Attribute::bool().default(true).force_new())
            .attribute(
                "limit_speed",
                Attribute::block(limit_speed_schema())
                    .optional()
                    .force_new()
                    .max_items(3),
            )
            .attribute("tags", Attribute::map().optional())
            .attribute("force_destroy", Attribute::bool().default(false))
            .attribute(
                "action",
                Attribute::string()
                    .optional()
                    .validate(Validator::StringInSlice(&["stop", "restart", "reset"])),
            )
            .attribute("is_sync_re_edit", Attribute::bool().optional())
            .attribute("pause_mode", Attribute::string().optional())
            .attribute("databases", Attribute::list(ValueType::String).optional())
            .attribute("tables", Attribute::block(table_schema()).optional())
            .attribute("created_at", Attribute::string().computed())
            .attribute("status", Attribute::string().computed())
            .attribute("public_ip", Attribute::string().computed())
            .attribute("private_ip", Attribute::string().computed())
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts {
            create: Some(Duration::from_secs(30 * 60)),
            update: Some(Duration::from_secs(10 * 60)),
            delete: Some(Duration::from_secs(10 * 60)),
            ..Default::default()
        }
    }

    async fn create(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        check_argument_combinations(d)?;
        let client = service_client(conf, d, SERVICE_V3).await?;
        let client_v5 = service_client(conf, d, SERVICE_V5).await?;
        let timeout = d.timeout(Operation::Create);

        let job = build_create_job(d, client.project_id(), &conf.get_enterprise_project_id(d))?;
        let resp = client
            .post(
                &client.url("v3/{project_id}/jobs/batch-creation"),
                json!({"jobs": [job.clone()]}),
            )
            .await
            .map_err(|e| diag_errorf!("error creating DRS job: {}", e))?;
        let job_id = match path_str("results[0].id", &resp).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                return Err(diag_errorf!(
                    "error creating DRS job: {}: {}",
                    path_string("results[0].error_code", &resp),
                    path_string("results[0].error_msg", &resp)
                ));
            }
        };
        d.set_id(&job_id);
        info!(id = %job_id, "DRS job created");

        wait_job_status(&client, conf, &job_id, JobOperation::Create, timeout)
            .await
            .map_err(|e| diag_errorf!("{}", e))?;

        if !test_connections(&client, &job_id, &job).await {
            return Err(diag_errorf!("test db connection of job: {} failed", job_id));
        }

        let modification = build_modification(&job_id, &job, d.get_bool("migrate_definer"));
        client
            .put(
                &client.url("v3/{project_id}/jobs/batch-modification"),
                json!({"jobs": [modification]}),
            )
            .await
            .map_err(|e| diag_errorf!("update job failed, error: {}", e))?;

        let speed_limits = d.get_list("limit_speed");
        if !speed_limits.is_empty() {
            client
                .put(
                    &client.url("v3/{project_id}/jobs/batch-limit-speed"),
                    build_limit_speed(&job_id, speed_limits),
                )
                .await
                .map_err(|e| diag_errorf!("limit speed of job: {} failed, error: {}", job_id, e))?;
        }

        if let Some(params) = build_db_object_params(d) {
            update_job_config(&client_v5, &job_id, "db_object", params)
                .await
                .map_err(|e| diag_errorf!("error updating job for db_object: {}", e))?;
        }

        pre_check(&client, conf, &job_id, timeout, "forStartJob")
            .await
            .map_err(|e| diag_errorf!("{}", e))?;

        client
            .post(
                &client.url("v3/{project_id}/jobs/batch-starting"),
                json!({"jobs": [remove_nil(json!({
                    "job_id": job_id,
                    "start_time": value_ignore_empty(d.get("start_time")),
                }))]}),
            )
            .await
            .map_err(|e| diag_errorf!("start DRS job failed, error: {}", e))?;

        wait_job_status(&client, conf, &job_id, JobOperation::Start, timeout)
            .await
            .map_err(|e| diag_errorf!("{}", e))?;

        self.read(d, conf).await
    }

    async fn read(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let region = conf.get_region(d);
        let client = service_client(conf, d, SERVICE_V3).await?;
        let job_id = d.id().to_string();

        let detail = match get_job_detail(&client, &job_id).await {
            Ok(detail) => detail,
            Err(err) => return check_deleted(d, err, "error retrieving DRS job"),
        };
        debug!(id = %job_id, "Retrieved DRS job");

        // net_type is only part of the job list
        let db_use_type = path_string("db_use_type", &detail);
        let listed = list_jobs_page(&client, 1, 1, &db_use_type, &job_id)
            .await
            .map_err(|e| diag_errorf!("query the job list by jobId: {}, error: {}", job_id, e))?;

        d.set("region", region);
        d.set("name", path_string("name", &detail));
        d.set("type", db_use_type);
        d.set("engine_type", path_string("instance_info.engine_type", &detail));
        d.set("direction", path_string("job_direction", &detail));
        d.set("net_type", path_string("jobs[0].net_type", &listed));
        d.set("public_ip", path_string("instance_info.public_ip", &detail));
        d.set("private_ip", path_string("instance_info.ip", &detail));
        d.set(
            "destination_db_readnoly",
            path_bool("is_target_readonly", &detail).unwrap_or_default(),
        );
        d.set("migration_type", path_string("task_type", &detail));
        d.set("description", path_string("description", &detail));
        d.set("multi_write", path_bool("multi_write", &detail).unwrap_or_default());
        d.set("created_at", format_create_time(path_i64("create_time", &detail)));
        d.set("status", path_string("status", &detail));
        d.set("tags", Value::Object(flatten_tag_list(path_array("tags", &detail))));

        let source = flatten_db_info(
            path_search("source_endpoint", &detail),
            d.get_str("source_db.0.password"),
        );
        let target = flatten_db_info(
            path_search("target_endpoint", &detail),
            d.get_str("destination_db.0.password"),
        );
        d.set("source_db", source);
        d.set("destination_db", target);

        if path_bool("object_switch", &detail).unwrap_or_default() {
            let sync_database = path_bool("sync_database", &detail).unwrap_or_default();
            let names = flatten_object_names(path_array("object_infos", &detail), sync_database);
            if sync_database {
                d.set("databases", names);
            } else {
                d.set("tables", names);
            }
        }
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        check_argument_combinations(d)?;
        let client = service_client(conf, d, SERVICE_V3).await?;
        let client_v5 = service_client(conf, d, SERVICE_V5).await?;
        let job_id = d.id().to_string();
        let timeout = d.timeout(Operation::Update);

        if d.has_changes(&["name", "description"]) {
            let detail = match get_job_detail(&client, &job_id).await {
                Ok(detail) => detail,
                Err(err) => return check_deleted(d, err, "error retrieving DRS job"),
            };
            let status = path_string("status", &detail);
            if RELEASED_STATUSES.contains(&status.as_str()) {
                info!(id = %job_id, status = %status, "DRS job released, skipping update");
                return Ok(());
            }

            let body = json!({"jobs": [{
                "job_id": job_id,
                "name": d.get_str("name"),
                "description": d.get_str("description"),
            }]});
            client
                .put(&client.url("v3/{project_id}/jobs/batch-modification"), body)
                .await
                .map_err(|e| diag_errorf!("update job: {} failed, error: {}", job_id, e))?;
        }

        if d.has_change("tags") {
            let (old, new) = d.get_change("tags");
            let resource_type = format!("jobs/{}", d.get_str("type"));
            if let Err(err) =
                update_job_tags(&client_v5, &resource_type, &job_id, tag_map(old), tag_map(new)).await
            {
                warn!(id = %job_id, "failed to update tags for DRS job: {}", err);
            }
        }

        if d.has_change("action") {
            if let Some(operation) = JobOperation::from_action(d.get_str("action")) {
                let resp = client
                    .post(
                        &client.url("v3/{project_id}/jobs/batch-status"),
                        json!({"jobs": [job_id]}),
                    )
                    .await
                    .map_err(|e| diag_errorf!("error retrieving job status: {}", e))?;
                let status = job_status(&resp).map_err(|e| diag_errorf!("error retrieving job status, {}", e))?;
                check_action_allowed(operation, &status).map_err(|e| diag_errorf!("{}", e))?;

                if operation == JobOperation::Reset {
                    pre_check(&client, conf, &job_id, timeout, "forRetryJob")
                        .await
                        .map_err(|e| diag_errorf!("{}", e))?;
                }

                execute_job_action(&client_v5, &job_id, operation.as_str(), build_action_params(d))
                    .await
                    .map_err(|e| diag_errorf!("{}", e))?;

                wait_job_status(&client, conf, &job_id, operation, timeout)
                    .await
                    .map_err(|e| diag_errorf!("{}", e))?;
            }
        }

        if d.has_changes(&["databases", "tables"]) {
            update_objects_selection(d, conf, &client, &client_v5, timeout).await?;
        }

        self.read(d, conf).await
    }

    async fn delete(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE_V3).await?;
        let job_id = d.id().to_string();

        let detail = match get_job_detail(&client, &job_id).await {
            Ok(detail) => detail,
            Err(err) => return check_deleted(d, err, "error retrieving DRS job"),
        };

        let status = path_string("status", &detail);
        if !DELETABLE_STATUSES.contains(&status.as_str()) {
            if !d.get_bool("force_destroy") {
                return Err(diag_errorf!(
                    "the job: {} cannot be deleted when it is running. \
                     If you want to forcibly delete the job please set force_destroy to True",
                    job_id
                ));
            }

            delete_job(&client, &job_id, "force_terminate")
                .await
                .map_err(|e| diag_errorf!("terminate DRS job failed. {:?}: {}", job_id, e))?;
            wait_job_status(
                &client,
                conf,
                &job_id,
                JobOperation::Terminate,
                d.timeout(Operation::Delete),
            )
            .await
            .map_err(|e| diag_errorf!("{}", e))?;
        }

        delete_job(&client, &job_id, "delete")
            .await
            .map_err(|e| diag_errorf!("delete DRS job failed. {:?}: {}", job_id, e))?;
        info!(id = %job_id, "DRS job deleted");
        Ok(())
    }
}

/// `databases` and `tables` are exclusive; `pause_mode` and `is_sync_re_edit` need `action`
fn check_argument_combinations(d: &ResourceData) -> DiagResult {
    if d.get_ok("databases").is_some() && d.get_ok("tables").is_some() {
        return Err(diag_errorf!("\"databases\": conflicts with tables"));
    }
    for key in ["pause_mode", "is_sync_re_edit"] {
        if d.get_ok(key).is_some() && d.get_ok("action").is_none() {
            return Err(diag_errorf!("{:?}: all of `{},action` must be specified", key, key));
        }
    }
    Ok(())
}

fn build_create_job(d: &ResourceData, project_id: &str, enterprise_project_id: &str) -> DiagResult<Value> {
    let direction = d.get_str("direction");
    let source = build_db_endpoint(d, "source_db", project_id);
    let target = build_db_endpoint(d, "destination_db", project_id);

    // the cloud side of the job hosts the replication instance
    let (cloud_db, field) = if direction == "up" {
        (&target, "destination_db")
    } else {
        (&source, "source_db")
    };
    if path_string("instance_id", cloud_db).is_empty() {
        return Err(diag_errorf!(
            "{}.0.instance_id is required when direction is {}",
            field,
            direction
        ));
    }
    let subnet_id = path_string("subnet_id", cloud_db);

    let sys_tags = if enterprise_project_id.is_empty() {
        Value::Null
    } else {
        json!([{"key": "_sys_enterprise_project_id", "value": enterprise_project_id}])
    };

    let job = json!({
        "name": d.get_str("name"),
        "db_use_type": d.get_str("type"),
        "engine_type": d.get_str("engine_type"),
        "job_direction": direction,
        "net_type": d.get_str("net_type"),
        "bind_eip": d.get_str("net_type") == "eip",
        "is_target_readonly": d.get_bool("destination_db_readnoly"),
        "task_type": d.get_str("migration_type"),
        "description": value_ignore_empty(d.get("description")),
        "multi_write": d.get_bool("multi_write"),
        "expired_days": d.get_i64("expired_days").to_string(),
        "node_type": "high",
        "source_endpoint": source,
        "target_endpoint": target,
        "subnet_id": subnet_id,
        "tags": value_ignore_empty(Some(&Value::Array(expand_resource_tags(&d.get_map("tags"))))),
        "sys_tags": sys_tags,
    });
    Ok(remove_nil(job))
}

fn build_db_endpoint(d: &ResourceData, field: &str, project_id: &str) -> Value {
    let attr = |name: &str| value_ignore_empty(d.get(&format!("{}.0.{}", field, name)));
    json!({
        "db_type": attr("engine_type"),
        "ip": attr("ip"),
        "db_name": attr("name"),
        "db_user": attr("user"),
        "db_password": attr("password"),
        "db_port": d.get_i64(&format!("{}.0.port", field)),
        "instance_id": attr("instance_id"),
        "region": attr("region"),
        "vpc_id": attr("vpc_id"),
        "subnet_id": attr("subnet_id"),
        "project_id": project_id,
        "ssl_cert_password": attr("ssl_cert_password"),
        "ssl_cert_check_sum": attr("ssl_cert_check_sum"),
        "ssl_cert_key": attr("ssl_cert_key"),
        "ssl_cert_name": attr("ssl_cert_name"),
        "ssl_link": d.get_bool(&format!("{}.0.ssl_enabled", field)),
    })
}

/// Connection test entry for one side (`so` or `ta`) of the job
fn connection_entry(job_id: &str, job: &Value, endpoint_type: &str, project_id: &str) -> Value {
    let endpoint = match endpoint_type {
        "so" => path_search("source_endpoint", job),
        _ => path_search("target_endpoint", job),
    }
    .cloned()
    .unwrap_or(Value::Null);

    remove_nil(json!({
        "job_id": job_id,
        "net_type": path_search("net_type", job),
        "end_point_type": endpoint_type,
        "project_id": project_id,
        "region": path_search("region", &endpoint),
        "vpc_id": path_search("vpc_id", &endpoint),
        "subnet_id": path_search("subnet_id", &endpoint),
        "db_type": path_search("db_type", &endpoint),
        "ip": path_search("ip", &endpoint),
        "db_user": path_search("db_user", &endpoint),
        "db_password": path_search("db_password", &endpoint),
        "db_port": path_search("db_port", &endpoint),
        "ssl_link": path_search("ssl_link", &endpoint),
        "inst_id": path_search("instance_id", &endpoint),
    }))
}

/// Whether both database endpoints of the job are reachable
async fn test_connections(client: &ServiceClient, job_id: &str, job: &Value) -> bool {
    let body = json!({"jobs": [
        connection_entry(job_id, job, "so", client.project_id()),
        connection_entry(job_id, job, "ta", client.project_id()),
    ]});
    let resp = match client
        .post(&client.url("v3/{project_id}/jobs/batch-connection"), body)
        .await
    {
        Ok(resp) => resp,
        Err(err) => {
            error!(id = job_id, "test connections of job failed: {}", err);
            return false;
        }
    };
    if path_i64("count", &resp) != Some(2) {
        error!(id = job_id, "unexpected connection test results: {}", resp);
        return false;
    }
    path_bool("results[0].success", &resp).unwrap_or_default()
        && path_bool("results[1].success", &resp).unwrap_or_default()
}

/// Full job definition stored after the connection test succeeded
fn build_modification(job_id: &str, job: &Value, migrate_definer: bool) -> Value {
    let field = |name: &str| path_search(name, job).cloned().unwrap_or(Value::Null);
    remove_nil(json!({
        "job_id": job_id,
        "name": field("name"),
        "net_type": field("net_type"),
        "engine_type": field("engine_type"),
        "node_type": field("node_type"),
        "store_db_info": true,
        "is_recreate": false,
        "db_use_type": field("db_use_type"),
        "description": field("description"),
        "task_type": field("task_type"),
        "job_direction": field("job_direction"),
        "is_target_readonly": field("is_target_readonly"),
        "replace_definer": migrate_definer,
        "source_endpoint": field("source_endpoint"),
        "target_endpoint": field("target_endpoint"),
    }))
}

fn build_limit_speed(job_id: &str, limits: &[Value]) -> Value {
    let speed_limit: Vec<Value> = limits
        .iter()
        .map(|limit| {
            json!({
                "speed": path_string("speed", limit),
                "begin": path_string("start_time", limit),
                "end": path_string("end_time", limit),
            })
        })
        .collect();
    json!({"speed_limits": [{"job_id": job_id, "speed_limit": speed_limit}]})
}

/// `db_object` parameters selecting either whole databases or single tables
fn build_db_object_params(d: &ResourceData) -> Option<Value> {
    let databases = d.get_strings("databases");
    if !databases.is_empty() {
        let object_info: Map<String, Value> = databases
            .into_iter()
            .map(|name| {
                let info = json!({"name": name, "all": true});
                (name, info)
            })
            .collect();
        return Some(json!({"db_object": {"object_scope": "database", "object_info": object_info}}));
    }

    let tables = d.get_list("tables");
    if tables.is_empty() {
        return None;
    }
    let object_info: Map<String, Value> = tables
        .iter()
        .map(|entry| {
            let database = path_string("database", entry);
            let table_infos: Map<String, Value> = path_array("table_names", entry)
                .iter()
                .filter_map(Value::as_str)
                .map(|name| (name.to_string(), json!({"name": name, "all": true, "type": "table"})))
                .collect();
            let info = json!({"name": database, "tables": table_infos});
            (database, info)
        })
        .collect();
    Some(json!({"db_object": {"object_scope": "table", "object_info": object_info}}))
}

fn build_action_params(d: &ResourceData) -> Value {
    match d.get_str("action") {
        "stop" => json!({"pause_mode": value_ignore_empty(d.get("pause_mode"))}),
        "restart" => json!({"is_sync_re_edit": value_ignore_empty(d.get("is_sync_re_edit"))}),
        _ => json!({}),
    }
}

/// Whether `operation` may be executed while the job is in `status`
fn check_action_allowed(operation: JobOperation, status: &str) -> std::result::Result<(), String> {
    let allowed = match operation {
        JobOperation::Stop => STARTED_STATUSES.contains(&status),
        JobOperation::Restart => status == "PAUSING",
        JobOperation::Reset => ["FULL_TRANSFER_FAILED", "INCRE_TRANSFER_FAILED"].contains(&status),
        _ => true,
    };
    if allowed {
        return Ok(());
    }
    let verb = match operation {
        JobOperation::Stop => "pausing",
        JobOperation::Restart => "restarting",
        _ => "resetting",
    };
    Err(format!("error {} job for status({})", verb, status))
}

fn flatten_db_info(endpoint: Option<&Value>, password: &str) -> Value {
    let Some(endpoint) = endpoint else {
        return json!([]);
    };
    // passwords are never returned
    let returned = path_string("db_password", endpoint);
    let password = if returned.is_empty() { password.to_string() } else { returned };
    json!([{
        "engine_type": path_string("db_type", endpoint),
        "ip": path_string("ip", endpoint),
        "port": path_i64("db_port", endpoint).unwrap_or_default(),
        "password": password,
        "user": path_string("db_user", endpoint),
        "instance_id": path_string("instance_id", endpoint),
        "name": path_string("instance_name", endpoint),
        "region": path_string("region", endpoint),
        "vpc_id": path_string("vpc_id", endpoint),
        "subnet_id": path_string("subnet_id", endpoint),
        "ssl_cert_password": path_string("ssl_cert_password", endpoint),
        "ssl_cert_check_sum": path_string("ssl_cert_check_sum", endpoint),
        "ssl_cert_key": path_string("ssl_cert_key", endpoint),
        "ssl_cert_name": path_string("ssl_cert_name", endpoint),
        "ssl_enabled": path_bool("ssl_link", endpoint).unwrap_or_default(),
    }])
}

/// Selected database names, or tables grouped by database
fn flatten_object_names(object_infos: &[Value], sync_database: bool) -> Value {
    if sync_database {
        return object_infos
            .iter()
            .map(|info| Value::String(path_string("name", info)))
            .collect();
    }

    let mut databases: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for info in object_infos {
        if path_string("type", info) == "table" {
            databases
                .entry(path_string("parent_id", info))
                .or_default()
                .push(path_string("name", info));
        }
    }
    databases
        .into_iter()
        .map(|(database, tables)| json!({"database": database, "table_names": tables}))
        .collect()
}

/// RFC 3339 time from a millisecond timestamp
fn format_create_time(millis: Option<i64>) -> String {
    millis
        .and_then(|ms| DateTime::from_timestamp(ms / 1000, 0))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
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

/// Status of the first job in a batch-status response, or the error it reports
fn job_status(resp: &Value) -> std::result::Result<String, String> {
    let code = path_string("results[0].error_code", resp);
    if path_i64("count", resp).unwrap_or_default() == 0 || !code.is_empty() {
        return Err(format!("{}: {}", code, path_string("results[0].error_message", resp)));
    }
    Ok(path_string("results[0].status", resp))
}

/// Job details, with the "job does not exist" codes reported as a 404
async fn get_job_detail(client: &ServiceClient, job_id: &str) -> Result<Value> {
    match client
        .post(
            &client.url("v3/{project_id}/jobs/batch-detail"),
            json!({"jobs": [job_id]}),
        )
        .await
    {
        Ok(resp) => Ok(path_search("results[0]", &resp).cloned().unwrap_or(Value::Null)),
        Err(err) => Err(convert_expected_400_err_into_404_err(
            err,
            "results[0].error_code",
            JOB_NOT_FOUND_CODES,
        )),
    }
}

async fn list_jobs_page(
    client: &ServiceClient,
    page: i64,
    per_page: i64,
    db_use_type: &str,
    name: &str,
) -> Result<Value> {
    let body = remove_nil(json!({
        "cur_page": page,
        "per_page": per_page,
        "db_use_type": db_use_type,
        "name": value_ignore_empty(Some(&Value::String(name.to_string()))),
    }));
    client.post(&client.url("v3/{project_id}/jobs"), body).await
}

/// All jobs of one type
pub(crate) async fn list_jobs(client: &ServiceClient, db_use_type: &str) -> Result<Vec<Value>> {
    let mut jobs = Vec::new();
    let mut page = 1;
    loop {
        let resp = list_jobs_page(client, page, LIST_PAGE_SIZE, db_use_type, "").await?;
        let items = path_array("jobs", &resp);
        jobs.extend_from_slice(items);
        let total = path_i64("total_record", &resp).unwrap_or_default() as usize;
        if items.len() < LIST_PAGE_SIZE as usize || jobs.len() >= total {
            return Ok(jobs);
        }
        page += 1;
    }
}

async fn delete_job(client: &ServiceClient, job_id: &str, delete_type: &str) -> Result<()> {
    let resp = client
        .delete_with_body(
            &client.url("v3/{project_id}/jobs/batch-jobs"),
            json!({"jobs": [{"delete_type": delete_type, "job_id": job_id}]}),
        )
        .await?;
    let code = path_string("results[0].error_code", &resp);
    if !code.is_empty() {
        return Err(HuaweiError::Operation(format!(
            "{}: {}",
            code,
            path_string("results[0].error_msg", &resp)
        )));
    }
    Ok(())
}

async fn update_job_config(
    client_v5: &ServiceClient,
    job_id: &str,
    update_type: &str,
    params: Value,
) -> Result<()> {
    client_v5
        .put(
            &client_v5.url_with("v5/{project_id}/jobs/{job_id}", &[("job_id", job_id)]),
            remove_nil(json!({"job": {"type": update_type, "params": params}})),
        )
        .await?;
    Ok(())
}

async fn execute_job_action(
    client_v5: &ServiceClient,
    job_id: &str,
    action: &str,
    params: Value,
) -> std::result::Result<(), String> {
    let resp = client_v5
        .post(
            &client_v5.url_with("v5/{project_id}/jobs/{job_id}/action", &[("job_id", job_id)]),
            remove_nil(json!({"job": {"action_name": action, "action_params": params}})),
        )
        .await
        .map_err(|e| format!("error executing job action: {}", e))?;
    match path_str("status", &resp) {
        None => Err("error getting job action status".to_string()),
        Some(status) if status != "success" => {
            Err(format!("error executing job action: status({})", status))
        }
        Some(_) => Ok(()),
    }
}

async fn update_job_tags(
    client_v5: &ServiceClient,
    resource_type: &str,
    job_id: &str,
    old: BTreeMap<String, String>,
    new: BTreeMap<String, String>,
) -> Result<()> {
    let removed: BTreeMap<String, String> = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let added: BTreeMap<String, String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let url = client_v5.url_with(
        "v5/{project_id}/{resource_type}/{job_id}/tags/action",
        &[("resource_type", resource_type), ("job_id", job_id)],
    );
    if !removed.is_empty() {
        client_v5
            .post(&url, json!({"action": "delete", "tags": expand_resource_tags(&removed)}))
            .await?;
    }
    if !added.is_empty() {
        client_v5
            .post(&url, json!({"action": "create", "tags": expand_resource_tags(&added)}))
            .await?;
    }
    Ok(())
}

async fn update_objects_selection(
    d: &ResourceData,
    conf: &Config,
    client: &ServiceClient,
    client_v5: &ServiceClient,
    timeout: Duration,
) -> DiagResult {
    let job_id = d.id();
    if d.get_str("type") != "sync" {
        return Err(diag_errorf!(
            "only synchronization job supports updating object selection"
        ));
    }
    let status = d.get_str("status");
    if !["INCRE_TRANSFER_STARTED", "INCRE_TRANSFER_FAILED"].contains(&status) {
        return Err(diag_errorf!(
            "error updating synchronization object for status({})",
            status
        ));
    }

    if let Some(params) = build_db_object_params(d) {
        update_job_config(client_v5, job_id, "db_object", params)
            .await
            .map_err(|e| diag_errorf!("error updating job for db_object: {}", e))?;
    }

    pre_check(client, conf, job_id, timeout, "forRetryJob")
        .await
        .map_err(|e| diag_errorf!("{}", e))?;

    execute_job_action(client_v5, job_id, "restart", json!({"is_sync_re_edit": true}))
        .await
        .map_err(|e| diag_errorf!("{}", e))?;

    // the re-edit runs as a child job
    let listed = list_jobs_page(client, 1, 1, "sync", job_id)
        .await
        .map_err(|e| diag_errorf!("{}", e))?;
    let child_id = path_string("jobs[0].children[0].id", &listed);
    if child_id.is_empty() {
        return Err(diag_errorf!(
            "error updating synchronization object: children synchronization job ID not found"
        ));
    }
    wait_job_status(client, conf, &child_id, JobOperation::Restart, timeout)
        .await
        .map_err(|e| diag_errorf!("{}", e))
}

/// Wait for the job status transition of `operation`
async fn wait_job_status(
    client: &ServiceClient,
    conf: &Config,
    job_id: &str,
    operation: JobOperation,
    timeout: Duration,
) -> std::result::Result<(), String> {
    let (pending, target) = operation.states();
    let wait = conf.pace(
        StateChangeConf::new(pending.iter().copied(), target.iter().copied())
            .timeout(timeout)
            .delay(WAIT_DELAY),
    );
    wait.wait_for_state(|| refresh_job_status(client, job_id, operation))
        .await
        .map(|_| ())
        .map_err(|e: WaitError| {
            format!(
                "error waiting for DRS job: {} to be {}: {}",
                job_id,
                operation.as_str(),
                e
            )
        })
}

async fn refresh_job_status(
    client: &ServiceClient,
    job_id: &str,
    operation: JobOperation,
) -> RefreshResult<Value> {
    let resp = client
        .post(
            &client.url("v3/{project_id}/jobs/batch-status"),
            json!({"jobs": [job_id]}),
        )
        .await?;
    let status = job_status(&resp)?;
    if FAILED_STATUSES.contains(&status.as_str()) {
        return Err(status.into());
    }

    // terminating a job passes through release states in no fixed order
    if operation == JobOperation::Terminate && status != "RELEASE_RESOURCE_COMPLETE" {
        return Ok((Some(resp), "PENDING".to_string()));
    }
    Ok((Some(resp), status))
}

/// Run a precheck and wait for every item to pass
async fn pre_check(
    client: &ServiceClient,
    conf: &Config,
    job_id: &str,
    timeout: Duration,
    mode: &str,
) -> std::result::Result<(), String> {
    client
        .post(
            &client.url("v3/{project_id}/jobs/batch-precheck"),
            json!({"jobs": [{"job_id": job_id, "precheck_mode": mode}]}),
        )
        .await
        .map_err(|e| format!("start job: {} preCheck failed, error: {}", job_id, e))?;

    let wait = conf.pace(
        StateChangeConf::new(["pending"], ["complete"])
            .timeout(timeout)
            .delay(WAIT_DELAY),
    );
    wait.wait_for_state(|| refresh_precheck(client, job_id))
        .await
        .map(|_| ())
        .map_err(|e| format!("error waiting for DRS job: {} precheck: {}", job_id, e))
}

async fn refresh_precheck(client: &ServiceClient, job_id: &str) -> RefreshResult<Value> {
    let resp = client
        .post(
            &client.url("v3/{project_id}/jobs/batch-precheck-result"),
            json!({"jobs": [job_id]}),
        )
        .await?;
    let code = path_string("results[0].error_code", &resp);
    if path_i64("count", &resp).unwrap_or_default() == 0 || !code.is_empty() {
        return Err(format!("{}: {}", code, path_string("results[0].error_msg", &resp)).into());
    }
    if path_string("results[0].process", &resp) != "100%" {
        return Ok((Some(resp), "pending".to_string()));
    }
    if path_string("results[0].total_passed_rate", &resp) == "100%" {
        return Ok((Some(resp), "complete".to_string()));
    }
    Err(format!("some preCheck item failed: {}", resp).into())
}
