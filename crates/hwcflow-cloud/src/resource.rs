//! Resource data and the resource trait
//!
//! A resource type implements [`Resource`]: it declares a [`Schema`] and
//! default timeouts, and maps create/read/update/delete onto remote API
//! calls. Every operation receives a [`ResourceData`], a view of the
//! resource's attributes plus its prior state.

use crate::diag::DiagResult;
use crate::schema::{Schema, is_subset, is_zero};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timeout used when neither the configuration nor the resource sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// Per-operation timeouts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTimeouts {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl ResourceTimeouts {
    pub fn get(&self, op: Operation) -> Option<Duration> {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    pub fn set(&mut self, op: Operation, timeout: Duration) {
        match op {
            Operation::Create => self.create = Some(timeout),
            Operation::Read => self.read = Some(timeout),
            Operation::Update => self.update = Some(timeout),
            Operation::Delete => self.delete = Some(timeout),
        }
    }

    /// Values set in `self`, falling back to `defaults`
    pub fn or(&self, defaults: &ResourceTimeouts) -> ResourceTimeouts {
        ResourceTimeouts {
            create: self.create.or(defaults.create),
            read: self.read.or(defaults.read),
            update: self.update.or(defaults.update),
            delete: self.delete.or(defaults.delete),
        }
    }
}

/// Attributes of one resource instance as seen by an operation
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    id: String,
    attributes: Map<String, Value>,
    prior: Map<String, Value>,
    timeouts: ResourceTimeouts,
}

impl ResourceData {
    /// Data for a resource about to be created
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            attributes: config,
            ..Default::default()
        }
    }

    /// Data for an existing resource known only by its state
    pub fn from_state(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            prior: attributes.clone(),
            attributes,
            ..Default::default()
        }
    }

    /// Replace the current attributes, keeping the prior state for change detection
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ResourceTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the resource ID; an empty ID marks the resource as gone
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }

    /// Value at a dotted path, e.g. `source_db.0.ip`
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.attributes, path)
    }

    /// Value at `path` if it is set to something other than its zero value
    pub fn get_ok(&self, path: &str) -> Option<&Value> {
        self.get(path).filter(|v| !is_zero(v))
    }

    pub fn get_str(&self, path: &str) -> &str {
        self.get(path).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get_i64(&self, path: &str) -> i64 {
        self.get(path).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_f64(&self, path: &str) -> f64 {
        self.get(path).and_then(Value::as_f64).unwrap_or_default()
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn get_list(&self, path: &str) -> &[Value] {
        match self.get(path) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// String elements of a list attribute
    pub fn get_strings(&self, path: &str) -> Vec<String> {
        self.get_list(path)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// String-valued map attribute (e.g. `tags`)
    pub fn get_map(&self, path: &str) -> BTreeMap<String, String> {
        match self.get(path) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Set a top-level attribute
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Whether a top-level attribute differs from the prior state
    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        !values_equal(old, new)
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has_change(key))
    }

    /// Prior and current values of a top-level attribute
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (
            self.prior.get(key).filter(|v| !v.is_null()),
            self.attributes.get(key).filter(|v| !v.is_null()),
        )
    }

    pub fn timeout(&self, op: Operation) -> Duration {
        self.timeouts.get(op).unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn timeouts(&self) -> &ResourceTimeouts {
        &self.timeouts
    }
}

fn lookup<'a>(attributes: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = attributes.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current).filter(|v| !v.is_null())
}

fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => is_subset(a, b) && is_subset(b, a),
        (Some(v), None) | (None, Some(v)) => is_zero(v),
    }
}

/// A manageable resource type
///
/// `M` is the provider's configured client ("meta") shared by every
/// operation.
#[async_trait]
pub trait Resource<M>: Send + Sync {
    /// Type name used in manifests and state, e.g. `huaweicloud_as_group`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Default per-operation timeouts
    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::default()
    }

    async fn create(&self, d: &mut ResourceData, meta: &M) -> DiagResult;

    /// Refresh `d` from the remote object; clearing the ID means it is gone
    async fn read(&self, d: &mut ResourceData, meta: &M) -> DiagResult;

    async fn update(&self, d: &mut ResourceData, meta: &M) -> DiagResult;

    async fn delete(&self, d: &mut ResourceData, meta: &M) -> DiagResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> ResourceData {
        let attrs = json!({
            "name": "job-1",
            "enable": true,
            "max_instance_number": 3,
            "tags": {"env": "test", "owner": "ops"},
            "source_db": [{"ip": "192.168.0.1", "port": 3306}],
            "empty": ""
        });
        ResourceData::from_state("id-1", attrs.as_object().cloned().unwrap())
    }

    #[test]
    fn test_dotted_path_lookup() {
        let d = data();
        assert_eq!(d.get_str("source_db.0.ip"), "192.168.0.1");
        assert_eq!(d.get_i64("source_db.0.port"), 3306);
        assert!(d.get("source_db.1.ip").is_none());
        assert!(d.get("name.0").is_none());
        assert_eq!(d.get_str("missing"), "");
    }

    #[test]
    fn test_get_ok_skips_zero_values() {
        let d = data();
        assert!(d.get_ok("name").is_some());
        assert!(d.get_ok("empty").is_none());
        assert!(d.get_ok("missing").is_none());
    }

    #[test]
    fn test_get_map() {
        let tags = data().get_map("tags");
        assert_eq!(tags.get("env").map(String::as_str), Some("test"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_change_detection() {
        let mut d = data();
        assert!(!d.has_change("name"));

        d.set("name", "job-2");
        assert!(d.has_change("name"));
        assert!(d.has_changes(&["enable", "name"]));
        let (old, new) = d.get_change("name");
        assert_eq!(old, Some(&json!("job-1")));
        assert_eq!(new, Some(&json!("job-2")));

        // Setting a zero value where nothing was is not a change
        d.set("description", "");
        assert!(!d.has_change("description"));
    }

    #[test]
    fn test_timeouts_fall_back() {
        let defaults = ResourceTimeouts {
            create: Some(Duration::from_secs(600)),
            ..Default::default()
        };
        let mut configured = ResourceTimeouts::default();
        configured.set(Operation::Delete, Duration::from_secs(60));

        let d = ResourceData::default().with_timeouts(configured.or(&defaults));
        assert_eq!(d.timeout(Operation::Create), Duration::from_secs(600));
        assert_eq!(d.timeout(Operation::Delete), Duration::from_secs(60));
        assert_eq!(d.timeout(Operation::Update), DEFAULT_TIMEOUT);
    }
}
