//! Plan and apply a manifest against a provider
//!
//! The executor compares manifest blocks with the state file, produces a
//! [`Plan`] and drives the resource operations for it, persisting state
//! after every successful step.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::diag::{DiagResult, Diagnostic, Diagnostics};
use crate::error::{CloudError, Result};
use crate::manifest::{Manifest, ResourceBlock};
use crate::provider::CloudProvider;
use crate::resource::{Resource, ResourceData};
use crate::schema::Schema;
use crate::state::{GlobalState, ResourceState, ResourceStatus, StateManager};
use crate::sweep::{SweepResource, sweep_orchestrated};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Executor<P: CloudProvider> {
    provider: Arc<P>,
    state: StateManager,
}

impl<P: CloudProvider> Executor<P> {
    pub fn new(provider: Arc<P>, state: StateManager) -> Self {
        Self { provider, state }
    }

    fn resource_for(&self, resource_type: &str) -> Result<Arc<dyn Resource<P::Meta>>> {
        self.provider
            .resource(resource_type)
            .ok_or_else(|| CloudError::UnsupportedResourceType(resource_type.to_string()))
    }

    /// Validate the manifest and compute the actions needed to reach it
    pub async fn plan(&self, manifest: &Manifest) -> Result<Plan> {
        let state = self.state.load().await?;
        self.plan_against(manifest, &state)
    }

    fn plan_against(&self, manifest: &Manifest, state: &GlobalState) -> Result<Plan> {
        let mut actions = Vec::new();
        let mut diags = Diagnostics::new();
        let mut wanted = HashSet::new();

        for block in manifest.resources.iter() {
            let address = block.address();
            wanted.insert(address.clone());

            let resource = self.resource_for(&block.resource_type)?;
            let schema = resource.schema();
            let config = prepared_config(&schema, block);
            for diag in schema.validate(&config) {
                diags.push(prefixed(&address, diag));
            }
            if let Err(e) = block.timeouts.resolve() {
                diags.push(Diagnostic::error(e.to_string()).with_attribute(format!("{}.timeouts", address)));
            }

            let action = match state.get_resource(&address) {
                None => Action::new(ActionType::Create, &address, &block.resource_type),
                Some(existing) if existing.status == ResourceStatus::Tainted => {
                    Action::new(ActionType::Replace, &address, &block.resource_type)
                        .with_id(&existing.id)
                        .with_description(format!("{} is tainted, so must be replaced", address))
                }
                Some(existing) => {
                    let force_new = schema.force_new_changes(&existing.attributes, &config);
                    let changed = schema.changed_attributes(&existing.attributes, &config);
                    let action_type = if !force_new.is_empty() {
                        ActionType::Replace
                    } else if !changed.is_empty() {
                        ActionType::Update
                    } else {
                        ActionType::NoOp
                    };
                    let changed = if force_new.is_empty() { changed } else { force_new };
                    Action::new(action_type, &address, &block.resource_type)
                        .with_id(&existing.id)
                        .with_changed(changed)
                }
            };
            actions.push(action);
        }

        for (address, existing) in &state.resources {
            if !wanted.contains(address) {
                actions.push(
                    Action::new(ActionType::Delete, address, &existing.resource_type)
                        .with_id(&existing.id),
                );
            }
        }

        if diags.has_error() {
            return Err(CloudError::Diagnostics(diags));
        }
        Ok(Plan::new(actions))
    }

    /// Plan and apply the manifest
    pub async fn apply(&self, manifest: &Manifest) -> Result<ApplyResult> {
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let plan = self.plan_against(manifest, &state)?;
        let result = self.apply_plan(manifest, &plan, &mut state).await;
        lock.release().await?;
        result
    }

    async fn apply_plan(
        &self,
        manifest: &Manifest,
        plan: &Plan,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        let start = Instant::now();
        let meta = self.provider.meta();
        let mut result = ApplyResult::new();

        for action in &plan.actions {
            if action.action_type == ActionType::NoOp {
                continue;
            }
            info!(address = %action.address, action = %action.action_type, "Applying");
            let resource = self.resource_for(&action.resource_type)?;
            let block = manifest
                .resources
                .iter()
                .find(|b| b.address() == action.address);

            let outcome = match (action.action_type, block) {
                (ActionType::Delete, _) => {
                    self.delete_one(&action.address, resource.as_ref(), &meta, state)
                        .await
                }
                (ActionType::Create, Some(block)) => {
                    self.create_one(block, resource.as_ref(), &meta, state).await
                }
                (ActionType::Update, Some(block)) => {
                    self.update_one(block, resource.as_ref(), &meta, state).await
                }
                (ActionType::Replace, Some(block)) => {
                    match self
                        .delete_one(&action.address, resource.as_ref(), &meta, state)
                        .await
                    {
                        Ok(()) => self.create_one(block, resource.as_ref(), &meta, state).await,
                        Err(diags) => Err(diags),
                    }
                }
                _ => Err(Diagnostics::error(format!(
                    "no configuration for {}",
                    action.address
                ))),
            };

            self.state.save(state).await?;
            match outcome {
                Ok(()) => result.add_success(action.address.clone(), action.description.clone()),
                Err(diags) => result.add_failure(action.address.clone(), diags.to_string()),
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn create_one(
        &self,
        block: &ResourceBlock,
        resource: &dyn Resource<P::Meta>,
        meta: &P::Meta,
        state: &mut GlobalState,
    ) -> DiagResult {
        let schema = resource.schema();
        let timeouts = block
            .timeouts
            .resolve()
            .map_err(Diagnostics::from_err)?
            .or(&resource.timeouts());
        let mut d = ResourceData::new(prepared_config(&schema, block)).with_timeouts(timeouts);

        let outcome = tolerate_warnings(resource.create(&mut d, meta).await, &block.address());
        if !d.id().is_empty() {
            let status = if outcome.is_ok() {
                ResourceStatus::Ready
            } else {
                ResourceStatus::Tainted
            };
            state.set_resource(
                block.address(),
                ResourceState::from_data(&block.resource_type, &d).with_status(status),
            );
        }
        outcome
    }

    async fn update_one(
        &self,
        block: &ResourceBlock,
        resource: &dyn Resource<P::Meta>,
        meta: &P::Meta,
        state: &mut GlobalState,
    ) -> DiagResult {
        let address = block.address();
        let Some(existing) = state.get_resource(&address) else {
            return Err(Diagnostics::error(format!("{} is not in state", address)));
        };
        let schema = resource.schema();
        let timeouts = block
            .timeouts
            .resolve()
            .map_err(Diagnostics::from_err)?
            .or(&resource.timeouts());
        let attributes = merge_config(&schema, &existing.attributes, prepared_config(&schema, block));
        let mut d = existing
            .to_data()
            .with_attributes(attributes)
            .with_timeouts(timeouts);

        let outcome = tolerate_warnings(resource.update(&mut d, meta).await, &address);
        if outcome.is_ok() {
            record(state, &address, &d);
        }
        outcome
    }

    async fn delete_one(
        &self,
        address: &str,
        resource: &dyn Resource<P::Meta>,
        meta: &P::Meta,
        state: &mut GlobalState,
    ) -> DiagResult {
        let Some(existing) = state.get_resource(address) else {
            return Ok(());
        };
        let mut d = existing.to_data();
        tolerate_warnings(resource.delete(&mut d, meta).await, address)?;
        state.remove_resource(address);
        Ok(())
    }

    /// Re-read every resource in state; vanished resources are dropped
    pub async fn refresh(&self) -> Result<ApplyResult> {
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let result = self.refresh_state(&mut state).await;
        self.state.save(&mut state).await?;
        lock.release().await?;
        Ok(result)
    }

    async fn refresh_state(&self, state: &mut GlobalState) -> ApplyResult {
        let start = Instant::now();
        let meta = self.provider.meta();
        let mut result = ApplyResult::new();
        let addresses: Vec<String> = state.resources.keys().cloned().collect();

        for address in addresses {
            let Some(existing) = state.get_resource(&address) else {
                continue;
            };
            let Some(resource) = self.provider.resource(&existing.resource_type) else {
                warn!(address = %address, "Skipping resource of unsupported type {}", existing.resource_type);
                continue;
            };
            let mut d = existing.to_data();
            match tolerate_warnings(resource.read(&mut d, meta.as_ref()).await, &address) {
                Ok(()) => {
                    record(state, &address, &d);
                    let message = if d.id().is_empty() { "removed" } else { "refreshed" };
                    result.add_success(address, message.to_string());
                }
                Err(diags) => result.add_failure(address, diags.to_string()),
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Delete every resource in state concurrently
    pub async fn destroy(&self) -> Result<usize> {
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let meta = self.provider.meta();

        let mut items = Vec::new();
        for existing in state.resources.values() {
            let resource = self.resource_for(&existing.resource_type)?;
            items.push(SweepResource::new(resource, existing.to_data(), meta.clone()));
        }
        let count = items.len();
        info!("Destroying {} resources", count);

        let outcome = sweep_orchestrated(items).await;
        if outcome.is_ok() {
            state.resources.clear();
        } else {
            // Keep only what still exists remotely
            self.refresh_state(&mut state).await;
        }
        self.state.save(&mut state).await?;
        lock.release().await?;

        outcome?;
        Ok(count)
    }

    /// Resources currently recorded in state
    pub async fn state(&self) -> Result<GlobalState> {
        self.state.load().await
    }
}

/// Manifest configuration with schema defaults filled in
fn prepared_config(schema: &Schema, block: &ResourceBlock) -> Map<String, Value> {
    let mut config = block.config.clone();
    schema.apply_defaults(&mut config);
    config
}

/// Configuration layered over state: computed values survive unless configured
fn merge_config(schema: &Schema, state: &Map<String, Value>, config: Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    for (name, attr) in schema.iter() {
        match config.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                merged.insert(name.clone(), value.clone());
            }
            None if attr.computed => {
                if let Some(value) = state.get(name) {
                    merged.insert(name.clone(), value.clone());
                }
            }
            None => {}
        }
    }
    merged
}

fn record(state: &mut GlobalState, address: &str, d: &ResourceData) {
    if d.id().is_empty() {
        info!(address, "Resource no longer exists, removing from state");
        state.remove_resource(address);
    } else if let Some(existing) = state.resources.get_mut(address) {
        existing.refresh(d);
    }
}

fn prefixed(address: &str, mut diag: Diagnostic) -> Diagnostic {
    diag.attribute = Some(match diag.attribute.take() {
        Some(path) => format!("{}.{}", address, path),
        None => address.to_string(),
    });
    diag
}

/// A diagnostics result carrying only warnings counts as success
fn tolerate_warnings(outcome: DiagResult, address: &str) -> DiagResult {
    match outcome {
        Err(diags) if !diags.has_error() => {
            for warning in diags.warnings() {
                warn!(address, "{}", warning);
            }
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag_errorf;
    use crate::provider::AuthStatus;
    use crate::schema::Attribute;
    use crate::sweep::SweeperRegistry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Remote objects keyed by ID
    #[derive(Default)]
    struct Cloud {
        objects: Mutex<HashMap<String, Map<String, Value>>>,
        next_id: Mutex<u32>,
    }

    struct Bucket;

    #[async_trait]
    impl Resource<Cloud> for Bucket {
        fn type_name(&self) -> &'static str {
            "test_bucket"
        }

        fn schema(&self) -> Schema {
            Schema::new()
                .attribute("name", Attribute::string().required().force_new())
                .attribute("size", Attribute::int().default(1))
                .attribute("fail_after_create", Attribute::bool().optional())
                .attribute("labels", Attribute::map().optional())
                .attribute("status", Attribute::string().computed())
        }

        async fn create(&self, d: &mut ResourceData, meta: &Cloud) -> DiagResult {
            let id = {
                let mut next = meta.next_id.lock().unwrap();
                *next += 1;
                format!("bucket-{}", next)
            };
            meta.objects
                .lock()
                .unwrap()
                .insert(id.clone(), d.attributes().clone());
            d.set_id(&id);
            if d.get_bool("fail_after_create") {
                return Err(diag_errorf!("error waiting for bucket ({}) to become ready", id));
            }
            self.read(d, meta).await
        }

        async fn read(&self, d: &mut ResourceData, meta: &Cloud) -> DiagResult {
            let found = meta.objects.lock().unwrap().get(d.id()).cloned();
            match found {
                None => d.set_id(""),
                Some(object) => {
                    d.set("name", object["name"].clone());
                    d.set("size", object["size"].clone());
                    d.set("labels", object.get("labels").cloned().unwrap_or(Value::Null));
                    d.set("status", "ACTIVE");
                }
            }
            Ok(())
        }

        async fn update(&self, d: &mut ResourceData, meta: &Cloud) -> DiagResult {
            {
                let mut objects = meta.objects.lock().unwrap();
                let Some(object) = objects.get_mut(d.id()) else {
                    return Err(Diagnostics::error("bucket vanished"));
                };
                if d.has_change("size") {
                    object.insert("size".to_string(), json!(d.get_i64("size")));
                }
                if d.has_change("labels") {
                    object.insert("labels".to_string(), json!(d.get_map("labels")));
                }
            }
            self.read(d, meta).await
        }

        async fn delete(&self, d: &mut ResourceData, meta: &Cloud) -> DiagResult {
            if d.get_str("name") == "protected" {
                return Err(Diagnostics::error("bucket is protected"));
            }
            meta.objects.lock().unwrap().remove(d.id());
            Ok(())
        }
    }

    struct TestProvider {
        cloud: Arc<Cloud>,
    }

    #[async_trait]
    impl CloudProvider for TestProvider {
        type Meta = Cloud;

        fn name(&self) -> &str {
            "test"
        }

        fn display_name(&self) -> &str {
            "Test"
        }

        fn meta(&self) -> Arc<Cloud> {
            self.cloud.clone()
        }

        fn resources(&self) -> Vec<Arc<dyn Resource<Cloud>>> {
            vec![Arc::new(Bucket)]
        }

        fn sweepers(&self) -> Result<SweeperRegistry<Cloud>> {
            Ok(SweeperRegistry::new())
        }

        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("test"))
        }
    }

    fn manifest(blocks: &str) -> Manifest {
        Manifest::from_yaml(&format!("resources:\n{}", blocks)).unwrap()
    }

    fn executor(dir: &std::path::Path) -> (Executor<TestProvider>, Arc<Cloud>) {
        let cloud = Arc::new(Cloud::default());
        let provider = Arc::new(TestProvider {
            cloud: cloud.clone(),
        });
        (Executor::new(provider, StateManager::new(dir)), cloud)
    }

    const ONE_BUCKET: &str = "  - type: test_bucket\n    name: logs\n    config:\n      name: logs\n";

    #[tokio::test]
    async fn test_apply_creates_then_noop() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        let m = manifest(ONE_BUCKET);

        let plan = executor.plan(&m).await.unwrap();
        assert_eq!(plan.summary().create, 1);

        let result = executor.apply(&m).await.unwrap();
        assert!(result.is_success());
        assert_eq!(cloud.objects.lock().unwrap().len(), 1);

        let state = executor.state().await.unwrap();
        let bucket = state.get_resource("test_bucket.logs").unwrap();
        assert_eq!(bucket.id, "bucket-1");
        assert_eq!(bucket.attributes["status"], "ACTIVE");
        assert_eq!(bucket.attributes["size"], 1);

        let plan = executor.plan(&m).await.unwrap();
        assert!(!plan.has_changes);
    }

    #[tokio::test]
    async fn test_update_and_replace() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        executor.apply(&manifest(ONE_BUCKET)).await.unwrap();

        let resized = manifest("  - type: test_bucket\n    name: logs\n    config:\n      name: logs\n      size: 5\n");
        let plan = executor.plan(&resized).await.unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Update);
        assert_eq!(plan.actions[0].changed, vec!["size"]);
        executor.apply(&resized).await.unwrap();
        assert_eq!(cloud.objects.lock().unwrap()["bucket-1"]["size"], 5);

        let renamed = manifest("  - type: test_bucket\n    name: logs\n    config:\n      name: audit\n      size: 5\n");
        let plan = executor.plan(&renamed).await.unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Replace);
        executor.apply(&renamed).await.unwrap();

        let objects = cloud.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key("bucket-2"));
    }

    const LABELED: &str = "  - type: test_bucket\n    name: logs\n    config:\n      name: logs\n      labels:\n        env: prod\n        owner: ops\n";

    #[tokio::test]
    async fn test_removed_map_key_is_an_update() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        executor.apply(&manifest(LABELED)).await.unwrap();
        assert!(!executor.plan(&manifest(LABELED)).await.unwrap().has_changes);

        let fewer = manifest("  - type: test_bucket\n    name: logs\n    config:\n      name: logs\n      labels:\n        env: prod\n");
        let plan = executor.plan(&fewer).await.unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Update);
        assert_eq!(plan.actions[0].changed, vec!["labels"]);

        executor.apply(&fewer).await.unwrap();
        assert_eq!(cloud.objects.lock().unwrap()["bucket-1"]["labels"], json!({"env": "prod"}));
        assert!(!executor.plan(&fewer).await.unwrap().has_changes);
    }

    #[tokio::test]
    async fn test_dropped_optional_attribute_is_an_update() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        executor.apply(&manifest(LABELED)).await.unwrap();

        let plan = executor.plan(&manifest(ONE_BUCKET)).await.unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Update);
        assert_eq!(plan.actions[0].changed, vec!["labels"]);

        executor.apply(&manifest(ONE_BUCKET)).await.unwrap();
        assert_eq!(cloud.objects.lock().unwrap()["bucket-1"]["labels"], json!({}));
        assert!(!executor.plan(&manifest(ONE_BUCKET)).await.unwrap().has_changes);
    }

    #[tokio::test]
    async fn test_failed_create_is_tainted() {
        let dir = tempdir().unwrap();
        let (executor, _cloud) = executor(dir.path());
        let m = manifest("  - type: test_bucket\n    name: logs\n    config:\n      name: logs\n      fail_after_create: true\n");

        let result = executor.apply(&m).await.unwrap();
        assert!(!result.is_success());
        assert!(result.failed[0].error.as_ref().unwrap().contains("to become ready"));

        let state = executor.state().await.unwrap();
        assert_eq!(state.get_resource("test_bucket.logs").unwrap().status, ResourceStatus::Tainted);
        let plan = executor.plan(&m).await.unwrap();
        assert_eq!(plan.actions[0].action_type, ActionType::Replace);
    }

    #[tokio::test]
    async fn test_invalid_config_is_reported_with_address() {
        let dir = tempdir().unwrap();
        let (executor, _cloud) = executor(dir.path());
        let m = manifest("  - type: test_bucket\n    name: logs\n    config:\n      size: many\n");

        let err = executor.plan(&m).await.unwrap_err();
        let CloudError::Diagnostics(diags) = err else {
            panic!("expected diagnostics");
        };
        let paths: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        assert!(paths.contains(&"test_bucket.logs.name".to_string()));
        assert!(paths.contains(&"test_bucket.logs.size".to_string()));
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let dir = tempdir().unwrap();
        let (executor, _cloud) = executor(dir.path());
        let m = manifest("  - type: test_queue\n    name: q\n");
        assert!(matches!(
            executor.plan(&m).await,
            Err(CloudError::UnsupportedResourceType(_))
        ));
    }

    #[tokio::test]
    async fn test_removed_block_is_deleted_and_refresh_drops_vanished() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        executor
            .apply(&manifest(&format!(
                "{}  - type: test_bucket\n    name: audit\n    config:\n      name: audit\n",
                ONE_BUCKET
            )))
            .await
            .unwrap();
        assert_eq!(cloud.objects.lock().unwrap().len(), 2);

        let plan = executor.plan(&manifest(ONE_BUCKET)).await.unwrap();
        assert_eq!(plan.summary().delete, 1);
        executor.apply(&manifest(ONE_BUCKET)).await.unwrap();
        assert_eq!(cloud.objects.lock().unwrap().len(), 1);

        cloud.objects.lock().unwrap().clear();
        let result = executor.refresh().await.unwrap();
        assert_eq!(result.succeeded[0].message, "removed");
        assert!(executor.state().await.unwrap().resources.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_keeps_failed_resources() {
        let dir = tempdir().unwrap();
        let (executor, cloud) = executor(dir.path());
        executor
            .apply(&manifest(&format!(
                "{}  - type: test_bucket\n    name: keep\n    config:\n      name: protected\n",
                ONE_BUCKET
            )))
            .await
            .unwrap();

        let err = executor.destroy().await.unwrap_err();
        assert!(matches!(err, CloudError::Sweep(ref e) if e.len() == 1));
        assert_eq!(cloud.objects.lock().unwrap().len(), 1);

        let state = executor.state().await.unwrap();
        assert_eq!(state.resources.len(), 1);
        assert!(state.get_resource("test_bucket.keep").is_some());
    }
}
