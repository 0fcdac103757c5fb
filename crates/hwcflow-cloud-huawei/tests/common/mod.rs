use hwcflow_cloud::{Resource, ResourceData};
use hwcflow_cloud_huawei::{Config, ProviderConfig};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::MockServer;

/// Provider config whose services all point at the mock server
pub fn config(server: &MockServer) -> Config {
    build(
        server,
        ProviderConfig {
            region: "cn-north-4".into(),
            auth_token: "token".into(),
            project_id: "p1".into(),
            ..Default::default()
        },
    )
}

#[allow(dead_code)]
pub fn aksk_config(server: &MockServer) -> Config {
    build(
        server,
        ProviderConfig {
            region: "cn-north-4".into(),
            access_key: "AK".into(),
            secret_key: "SK".into(),
            project_id: "p1".into(),
            ..Default::default()
        },
    )
}

fn build(server: &MockServer, mut settings: ProviderConfig) -> Config {
    let endpoint = format!("{}/", server.uri());
    settings.endpoints = ["as", "drs", "scm", "iam"]
        .into_iter()
        .map(|name| (name.to_string(), endpoint.clone()))
        .collect::<BTreeMap<_, _>>();
    settings.max_retries = Some(3);
    Config::new(settings)
        .unwrap()
        .with_wait_interval(Duration::from_millis(10))
        .with_backoff_unit(Duration::from_millis(1))
}

/// Data for a new resource, with schema defaults applied
pub fn data(resource: &dyn Resource<Config>, attrs: Value) -> ResourceData {
    let mut config: Map<String, Value> = attrs.as_object().cloned().unwrap();
    resource.schema().apply_defaults(&mut config);
    ResourceData::new(config)
}

#[allow(dead_code)]
pub fn state(id: &str, attrs: Value) -> ResourceData {
    ResourceData::from_state(id, attrs.as_object().cloned().unwrap_or_default())
}

/// Data for an update from `prior` state to `config`, defaults applied to both
#[allow(dead_code)]
pub fn update(resource: &dyn Resource<Config>, id: &str, prior: Value, config: Value) -> ResourceData {
    let schema = resource.schema();
    let mut prior: Map<String, Value> = prior.as_object().cloned().unwrap();
    let mut config: Map<String, Value> = config.as_object().cloned().unwrap();
    schema.apply_defaults(&mut prior);
    schema.apply_defaults(&mut config);
    ResourceData::from_state(id, prior).with_attributes(config)
}
