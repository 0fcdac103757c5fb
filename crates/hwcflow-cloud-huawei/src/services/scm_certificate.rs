//! `huaweicloud_scm_certificate`: SSL certificate purchased through SCM
//!
//! Purchases are auto-paid; the certificate becomes usable once its status
//! is `PAID`. Deleting unsubscribes the order.

use super::service_client;
use crate::client::ServiceClient;
use crate::common::{check_deleted, has_error_code};
use crate::config::Config;
use crate::error::Result;
use crate::utils::{
    expand_resource_tags, flatten_tag_list, path_array, path_i64, path_str, path_string,
    remove_nil, value_ignore_empty,
};
use async_trait::async_trait;
use hwcflow_cloud::{
    Attribute, DiagResult, Operation, RefreshResult, Resource, ResourceData, ResourceTimeouts,
    RetryConf, RetryError, Schema, StateChangeConf, diag_errorf, retry,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TYPE_NAME: &str = "huaweicloud_scm_certificate";

const SERVICE: &str = "scm";
/// Returned while the order of a fresh certificate is still settling
const ORDER_NOT_READY_CODE: &str = "SCM.0016";
const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct ScmCertificate;

fn authentification_schema() -> Schema {
    Schema::new()
        .attribute("record_name", Attribute::string().computed())
        .attribute("record_type", Attribute::string().computed())
        .attribute("record_value", Attribute::string().computed())
        .attribute("domain", Attribute::string().computed())
}

#[async_trait]
impl Resource<Config> for ScmCertificate {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("region", Attribute::string().optional().computed().force_new())
            .attribute("cert_brand", Attribute::string().required().force_new())
            .attribute("cert_type", Attribute::string().required().force_new())
            .attribute("domain_type", Attribute::string().required().force_new())
            .attribute("effective_time", Attribute::int().required().force_new())
            .attribute("domain_numbers", Attribute::int().required().force_new())
            .attribute(
                "primary_domain_type",
                Attribute::string().optional().computed().force_new(),
            )
            .attribute(
                "single_domain_number",
                Attribute::int().optional().computed().force_new(),
            )
            .attribute(
                "wildcard_domain_number",
                Attribute::int().optional().computed().force_new(),
            )
            .attribute("enterprise_project_id", Attribute::string().optional().computed())
            .attribute("tags", Attribute::map().optional().computed())
            .attribute("validity_period", Attribute::int().computed())
            .attribute("status", Attribute::string().computed())
            .attribute("order_id", Attribute::string().computed())
            .attribute("name", Attribute::string().computed())
            .attribute("push_support", Attribute::string().computed())
            .attribute("revoke_reason", Attribute::string().computed())
            .attribute("signature_algorithm", Attribute::string().computed())
            .attribute("issue_time", Attribute::string().computed())
            .attribute("not_before", Attribute::string().computed())
            .attribute("not_after", Attribute::string().computed())
            .attribute("validation_method", Attribute::string().computed())
            .attribute("domain", Attribute::string().computed())
            .attribute("sans", Attribute::string().computed())
            .attribute("fingerprint", Attribute::string().computed())
            .attribute(
                "authentification",
                Attribute::block(authentification_schema()).computed(),
            )
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts {
            create: Some(Duration::from_secs(600)),
            update: Some(Duration::from_secs(600)),
            delete: Some(Duration::from_secs(600)),
            ..Default::default()
        }
    }

    async fn create(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE).await?;

        let body = build_buy_body(d, conf);
        debug!("SCM certificate buy options: {}", body);
        let resp = client
            .post(&client.url("v3/scm/certificates/buy"), body)
            .await
            .map_err(|e| diag_errorf!("error creating SCM certificate: {}", e))?;
        let cert_id = path_str("cert[0].cert_id", &resp)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| diag_errorf!("unable to find the SCM certificate ID from the API response"))?;
        d.set_id(&cert_id);
        info!(id = %cert_id, "SCM certificate ordered");

        let wait = conf.pace(
            StateChangeConf::new(["PENDING"], ["COMPLETED"])
                .timeout(d.timeout(Operation::Create))
                .delay(Duration::from_secs(10))
                .poll_interval(POLL_INTERVAL),
        );
        wait.wait_for_state(|| refresh_certificate_paid(&client, &cert_id))
            .await
            .map_err(|e| {
                diag_errorf!(
                    "error waiting for SCM certificate ({}) creation to PAID: {}",
                    cert_id,
                    e
                )
            })?;

        let tags = d.get_map("tags");
        update_tags(&client, &cert_id, "create", &tags)
            .await
            .map_err(|e| diag_errorf!("error creating SCM certificate tags: {}", e))?;

        self.read(d, conf).await
    }

    async fn read(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let region = conf.get_region(d);
        let client = service_client(conf, d, SERVICE).await?;
        let cert_id = d.id().to_string();

        let cert = match get_certificate(&client, &cert_id).await {
            Ok(cert) => cert,
            Err(err) => return check_deleted(d, err, "error retrieving SCM certificate"),
        };

        d.set("region", region);
        d.set("cert_brand", path_string("brand", &cert));
        d.set("cert_type", path_string("type", &cert));
        d.set("domain_type", path_string("domain_type", &cert));
        d.set("validity_period", path_i64("validity_period", &cert).unwrap_or_default());
        d.set("domain_numbers", path_i64("domain_count", &cert).unwrap_or_default());
        d.set("primary_domain_type", primary_domain_type(&cert));
        d.set("wildcard_domain_number", path_i64("wildcard_count", &cert).unwrap_or_default());
        d.set("enterprise_project_id", path_string("enterprise_project_id", &cert));
        for field in [
            "status",
            "order_id",
            "name",
            "push_support",
            "revoke_reason",
            "signature_algorithm",
            "issue_time",
            "not_before",
            "not_after",
            "validation_method",
            "domain",
            "sans",
            "fingerprint",
        ] {
            d.set(field, path_string(field, &cert));
        }
        d.set("authentification", flatten_authentification(&cert));

        match get_tags(&client, &cert_id).await {
            Ok(tags) => d.set("tags", Value::Object(flatten_tag_list(&tags))),
            Err(err) => warn!(id = %cert_id, "Error fetching tags of SCM certificate: {}", err),
        }
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        if d.has_change("tags") {
            let client = service_client(conf, d, SERVICE).await?;
            let cert_id = d.id().to_string();
            let (old, new) = d.get_change("tags");
            let (old, new) = (tag_map(old), tag_map(new));

            update_tags(&client, &cert_id, "delete", &old)
                .await
                .map_err(|e| diag_errorf!("error deleting SCM certificate tags: {}", e))?;
            update_tags(&client, &cert_id, "create", &new)
                .await
                .map_err(|e| diag_errorf!("error creating SCM certificate tags: {}", e))?;
        }
        self.read(d, conf).await
    }

    async fn delete(&self, d: &mut ResourceData, conf: &Config) -> DiagResult {
        let client = service_client(conf, d, SERVICE).await?;
        let cert_id = d.id().to_string();
        let timeout = d.timeout(Operation::Delete);

        let url = client.url_with(
            "v3/scm/certificates/{cert_id}/unsubscribe",
            &[("cert_id", &cert_id)],
        );
        let retry_conf = conf.pace_retry(
            RetryConf::new(timeout)
                .delay(Duration::from_secs(10))
                .poll_interval(POLL_INTERVAL),
        );
        let resp = retry(&retry_conf, || unsubscribe(&client, &url))
            .await
            .map_err(|e| diag_errorf!("error deleting SCM certificate: {}", e))?;

        if path_string("unsubscribe_results", &resp) != "SUCCESS" {
            return Err(diag_errorf!(
                "error deleting SCM certificate: unsubscribe result is not SUCCESS in deletion API response"
            ));
        }

        let wait = conf.pace(
            StateChangeConf::new(["PENDING"], ["COMPLETED"])
                .timeout(timeout)
                .delay(Duration::from_secs(20))
                .poll_interval(POLL_INTERVAL),
        );
        wait.wait_for_state(|| refresh_certificate_deleted(&client, &cert_id))
            .await
            .map_err(|e| diag_errorf!("error waiting for SCM certificate ({}) deleted: {}", cert_id, e))?;
        info!(id = %cert_id, "SCM certificate deleted");
        Ok(())
    }
}

fn build_buy_body(d: &ResourceData, conf: &Config) -> Value {
    remove_nil(json!({
        "cert_brand": d.get_str("cert_brand"),
        "cert_type": d.get_str("cert_type"),
        "domain_type": d.get_str("domain_type"),
        "effective_time": d.get_i64("effective_time"),
        "domain_numbers": d.get_i64("domain_numbers"),
        "primary_domain_type": value_ignore_empty(d.get("primary_domain_type")),
        "single_domain_number": value_ignore_empty(d.get("single_domain_number")),
        "wildcard_domain_number": value_ignore_empty(d.get("wildcard_domain_number")),
        "enterprise_project_id": value_ignore_empty(Some(&Value::String(conf.get_enterprise_project_id(d)))),
        "order_number": 1,
        "agree_privacy_protection": true,
        "is_auto_pay": true,
    }))
}

fn primary_domain_type(cert: &Value) -> &'static str {
    match path_string("multi_domain_type", cert).as_str() {
        "primary_single" => "SINGLE_DOMAIN",
        "primary_wildcard" => "WILDCARD_DOMAIN",
        _ => "",
    }
}

fn flatten_authentification(cert: &Value) -> Value {
    path_array("authentification", cert)
        .iter()
        .map(|record| {
            json!({
                "record_name": path_string("record_name", record),
                "record_type": path_string("record_type", record),
                "record_value": path_string("record_value", record),
                "domain": path_string("domain", record),
            })
        })
        .collect()
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

async fn get_certificate(client: &ServiceClient, cert_id: &str) -> Result<Value> {
    client
        .get(&client.url_with(
            "v3/scm/certificates/{certificate_id}",
            &[("certificate_id", cert_id)],
        ))
        .await
}

async fn get_tags(client: &ServiceClient, cert_id: &str) -> Result<Vec<Value>> {
    let resp = client
        .get(&client.url_with("v3/scm/{resource_id}/tags", &[("resource_id", cert_id)]))
        .await?;
    Ok(path_array("tags", &resp).to_vec())
}

/// `action` is `create` or `delete`; nothing is sent for an empty tag set
async fn update_tags(
    client: &ServiceClient,
    cert_id: &str,
    action: &str,
    tags: &BTreeMap<String, String>,
) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }
    client
        .post(
            &client.url_with("v3/scm/{resource_id}/tags/action", &[("resource_id", cert_id)]),
            json!({"action": action, "tags": expand_resource_tags(tags)}),
        )
        .await?;
    Ok(())
}

async fn unsubscribe(client: &ServiceClient, url: &str) -> std::result::Result<Value, RetryError> {
    client.delete(url).await.map_err(|err| {
        if has_error_code(&err, 500, "error_code", &[ORDER_NOT_READY_CODE]) {
            RetryError::retryable(err)
        } else {
            RetryError::non_retryable(err)
        }
    })
}

async fn refresh_certificate_paid(client: &ServiceClient, cert_id: &str) -> RefreshResult<Value> {
    let cert = get_certificate(client, cert_id).await?;
    match path_str("status", &cert) {
        None => Err("status is not found in API response".into()),
        Some(status) if status == "PAID" => Ok((Some(cert), "COMPLETED".to_string())),
        Some(_) => Ok((Some(cert), "PENDING".to_string())),
    }
}

async fn refresh_certificate_deleted(client: &ServiceClient, cert_id: &str) -> RefreshResult<Value> {
    match get_certificate(client, cert_id).await {
        Ok(cert) => Ok((Some(cert), "PENDING".to_string())),
        Err(err) if err.is_not_found() => Ok((Some(Value::Null), "COMPLETED".to_string())),
        Err(err) => Err(err.into()),
    }
}
