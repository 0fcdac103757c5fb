//! Concurrent deletion of leftover resources
//!
//! [`sweep_orchestrated`] deletes a batch of resources concurrently and
//! aggregates every failure into one [`SweepError`]. [`SweeperRegistry`]
//! runs named sweepers for a region, dependencies first.

use crate::error::{BoxError, CloudError, Result};
use crate::resource::{Resource, ResourceData};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Name prefixes of resources created by acceptance tests
pub const TEST_NAME_PREFIXES: &[&str] = &["tf_acc_test", "tf-acc-test", "tf_test", "tf-test"];

/// Whether a remote resource name looks like a test leftover
pub fn is_sweepable_name(name: &str) -> bool {
    TEST_NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Aggregated failures of a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepError {
    pub errors: Vec<String>,
}

impl SweepError {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    fn into_result(self) -> std::result::Result<(), SweepError> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            writeln!(f, "1 error occurred:")?;
        } else {
            writeln!(f, "{} errors occurred:", self.errors.len())?;
        }
        for err in &self.errors {
            writeln!(f, "\t* {}", err)?;
        }
        writeln!(f)
    }
}

impl std::error::Error for SweepError {}

/// One resource to delete, with the provider meta its delete needs
pub struct SweepResource<M> {
    pub resource: Arc<dyn Resource<M>>,
    pub data: ResourceData,
    pub meta: Arc<M>,
}

impl<M> SweepResource<M> {
    pub fn new(resource: Arc<dyn Resource<M>>, data: ResourceData, meta: Arc<M>) -> Self {
        Self {
            resource,
            data,
            meta,
        }
    }
}

/// Delete every item concurrently, one task per item
///
/// Waits for all tasks. A diagnostics result carrying only warnings counts
/// as success; a panicking task counts as a failure.
pub async fn sweep_orchestrated<M>(items: Vec<SweepResource<M>>) -> std::result::Result<(), SweepError>
where
    M: Send + Sync + 'static,
{
    let mut tasks = JoinSet::new();
    for item in items {
        tasks.spawn(delete_resource(item));
    }

    let mut failures = SweepError { errors: Vec::new() };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => failures.errors.push(err),
            Err(join_err) => failures.errors.push(format!("deletion task failed: {}", join_err)),
        }
    }
    failures.into_result()
}

async fn delete_resource<M>(item: SweepResource<M>) -> std::result::Result<(), String>
where
    M: Send + Sync,
{
    let SweepResource {
        resource,
        mut data,
        meta,
    } = item;
    debug!(
        resource_type = resource.type_name(),
        id = data.id(),
        "Deleting resource"
    );

    match resource.delete(&mut data, meta.as_ref()).await {
        Ok(()) => Ok(()),
        Err(diags) => match diags.first_error() {
            Some(first) => Err(format!("error deleting resource: {}", first.summary)),
            None => {
                for warning in diags.warnings() {
                    warn!(id = data.id(), "{}", warning);
                }
                Ok(())
            }
        },
    }
}

/// A named cleanup routine for one resource type
#[async_trait]
pub trait Sweeper<M>: Send + Sync {
    fn name(&self) -> &str;

    /// Sweepers that must run before this one
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn sweep(&self, region: &str, meta: Arc<M>) -> std::result::Result<(), BoxError>;
}

/// Named sweepers and their dependency order
pub struct SweeperRegistry<M> {
    sweepers: BTreeMap<String, Arc<dyn Sweeper<M>>>,
}

impl<M> Default for SweeperRegistry<M> {
    fn default() -> Self {
        Self {
            sweepers: BTreeMap::new(),
        }
    }
}

impl<M> SweeperRegistry<M>
where
    M: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sweeper: Arc<dyn Sweeper<M>>) -> Result<()> {
        let name = sweeper.name().to_string();
        if self.sweepers.contains_key(&name) {
            return Err(CloudError::InvalidConfig(format!(
                "sweeper {} is already registered",
                name
            )));
        }
        self.sweepers.insert(name, sweeper);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sweepers.keys().map(String::as_str)
    }

    /// Run order for the requested sweepers (all when empty), dependencies first
    pub fn run_order(&self, requested: &[String]) -> Result<Vec<String>> {
        let roots: Vec<String> = if requested.is_empty() {
            self.sweepers.keys().cloned().collect()
        } else {
            requested.to_vec()
        };

        let mut order = Vec::new();
        let mut done = HashSet::new();
        for name in &roots {
            let mut path = Vec::new();
            self.visit(name, &mut path, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if path.iter().any(|p| p == name) {
            path.push(name.to_string());
            return Err(CloudError::InvalidConfig(format!(
                "sweeper dependency cycle: {}",
                path.join(" -> ")
            )));
        }
        let sweeper = self.sweepers.get(name).ok_or_else(|| match path.last() {
            Some(parent) => CloudError::InvalidConfig(format!(
                "sweeper ({}) has dependency ({}), but that sweeper was not found",
                parent, name
            )),
            None => CloudError::InvalidConfig(format!("sweeper ({}) not found", name)),
        })?;

        path.push(name.to_string());
        for dep in sweeper.dependencies() {
            self.visit(&dep, path, done, order)?;
        }
        path.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Run the requested sweepers (all when empty) for `region`
    ///
    /// Each sweeper runs at most once. A failing sweeper does not stop the
    /// others; all failures are returned together.
    pub async fn run(&self, region: &str, meta: Arc<M>, requested: &[String]) -> Result<Vec<String>> {
        let order = self.run_order(requested)?;
        let mut failures = SweepError { errors: Vec::new() };

        for name in &order {
            let Some(sweeper) = self.sweepers.get(name) else {
                continue;
            };
            info!(sweeper = %name, region, "Running sweeper");
            if let Err(err) = sweeper.sweep(region, meta.clone()).await {
                error!(sweeper = %name, region, "Error running sweeper: {}", err);
                failures
                    .errors
                    .push(format!("sweeper ({}) in region ({}): {}", name, region, err));
            }
        }

        failures.into_result()?;
        Ok(order)
    }
}
