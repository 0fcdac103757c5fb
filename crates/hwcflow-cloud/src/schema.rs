//! Resource attribute schema
//!
//! A [`Schema`] describes the attribute map a resource accepts and
//! produces: value types, required/optional/computed flags, force-new
//! markers, defaults, nested blocks and value validators.

use crate::diag::{Diagnostic, Diagnostics};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    /// List of scalar values (see [`Attribute::list`])
    List,
    /// String-to-string map
    Map,
    /// List of nested objects described by a sub-schema
    Block,
}

impl ValueType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Int => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::Bool => value.is_boolean(),
            ValueType::List | ValueType::Block => value.is_array(),
            ValueType::Map => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Block => "block list",
        }
    }
}

/// Element description of list attributes
#[derive(Debug, Clone)]
pub enum Elem {
    Scalar(ValueType),
    Block(Schema),
}

/// Value validator
#[derive(Debug, Clone)]
pub enum Validator {
    StringLenBetween(usize, usize),
    StringInSlice(&'static [&'static str]),
    /// Pattern and the message shown when it does not match
    StringMatch(&'static str, &'static str),
    IntBetween(i64, i64),
    IntInSlice(&'static [i64]),
}

impl Validator {
    /// Returns an error message when `value` is rejected
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            Validator::StringLenBetween(min, max) => {
                let s = value.as_str()?;
                let len = s.chars().count();
                (len < *min || len > *max).then(|| {
                    format!("expected length to be in the range ({} - {}), got {}", min, max, s)
                })
            }
            Validator::StringInSlice(allowed) => {
                let s = value.as_str()?;
                (!allowed.contains(&s))
                    .then(|| format!("expected to be one of {:?}, got {}", allowed, s))
            }
            Validator::StringMatch(pattern, message) => {
                let s = value.as_str()?;
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => None,
                    Ok(_) => Some(format!("invalid value ({}), {}", s, message)),
                    Err(e) => Some(format!("invalid validation pattern {}: {}", pattern, e)),
                }
            }
            Validator::IntBetween(min, max) => {
                let n = value.as_i64()?;
                (n < *min || n > *max)
                    .then(|| format!("expected to be in the range ({} - {}), got {}", min, max, n))
            }
            Validator::IntInSlice(allowed) => {
                let n = value.as_i64()?;
                (!allowed.contains(&n))
                    .then(|| format!("expected to be one of {:?}, got {}", allowed, n))
            }
        }
    }
}

/// Description of a single attribute
#[derive(Debug, Clone)]
pub struct Attribute {
    pub value_type: ValueType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub max_items: Option<usize>,
    pub elem: Option<Elem>,
    pub validators: Vec<Validator>,
}

impl Attribute {
    fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            max_items: None,
            elem: None,
            validators: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::of(ValueType::String)
    }

    pub fn int() -> Self {
        Self::of(ValueType::Int)
    }

    pub fn float() -> Self {
        Self::of(ValueType::Float)
    }

    pub fn bool() -> Self {
        Self::of(ValueType::Bool)
    }

    pub fn map() -> Self {
        let mut attr = Self::of(ValueType::Map);
        attr.elem = Some(Elem::Scalar(ValueType::String));
        attr
    }

    /// List of scalars of the given type
    pub fn list(elem: ValueType) -> Self {
        let mut attr = Self::of(ValueType::List);
        attr.elem = Some(Elem::Scalar(elem));
        attr
    }

    /// List of nested objects
    pub fn block(schema: Schema) -> Self {
        let mut attr = Self::of(ValueType::Block);
        attr.elem = Some(Elem::Block(schema));
        attr
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.optional = true;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Computed-only attributes can't be set from configuration
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Whether `state` holds the configured `value`; maps must match
    /// exactly, blocks may carry extra computed keys
    fn reflects(&self, value: &Value, state: &Value) -> bool {
        match (self.value_type, value, state) {
            (ValueType::Map, Value::Object(c), Value::Object(s)) => {
                let c: Vec<_> = c.iter().filter(|(_, v)| !v.is_null()).collect();
                c.len() == s.iter().filter(|(_, v)| !v.is_null()).count()
                    && c.iter().all(|(k, v)| s.get(*k).is_some_and(|sv| is_subset(v, sv)))
            }
            _ => is_subset(value, state),
        }
    }
}

/// Attribute schema of a resource (or of a nested block)
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    /// Validate a configuration map against this schema
    pub fn validate(&self, config: &Map<String, Value>) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate_at("", config, &mut diags);
        diags
    }

    fn validate_at(&self, prefix: &str, config: &Map<String, Value>, diags: &mut Diagnostics) {
        for (name, value) in config {
            let path = format!("{}{}", prefix, name);
            if value.is_null() {
                continue;
            }
            let Some(attr) = self.attributes.get(name) else {
                diags.push(
                    Diagnostic::error(format!(
                        "An argument named \"{}\" is not expected here",
                        name
                    ))
                    .with_attribute(path),
                );
                continue;
            };
            if attr.is_computed_only() {
                diags.push(
                    Diagnostic::error(format!("\"{}\": this field cannot be set", name))
                        .with_attribute(path),
                );
                continue;
            }
            validate_value(attr, &path, value, diags);
        }

        for (name, attr) in &self.attributes {
            let missing = config.get(name).is_none_or(Value::is_null);
            if attr.required && missing {
                diags.push(
                    Diagnostic::error(format!(
                        "The argument \"{}\" is required, but no definition was found",
                        name
                    ))
                    .with_attribute(format!("{}{}", prefix, name)),
                );
            }
        }
    }

    /// Fill in defaults for attributes missing from `config`
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, attr) in &self.attributes {
            match config.get_mut(name) {
                None | Some(Value::Null) => {
                    if let Some(ref default) = attr.default {
                        config.insert(name.clone(), default.clone());
                    }
                }
                Some(Value::Array(items)) => {
                    if let Some(Elem::Block(ref nested)) = attr.elem {
                        for item in items.iter_mut() {
                            if let Value::Object(obj) = item {
                                nested.apply_defaults(obj);
                            }
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Names of force-new attributes whose configured value differs
    pub fn force_new_changes(&self, old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .filter(|(name, _)| match new.get(*name) {
                None | Some(Value::Null) => false,
                Some(value) => !old.get(*name).is_some_and(|prior| is_subset(value, prior)),
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of attributes whose configured value is not reflected in `state`
    ///
    /// Optional attributes dropped from the configuration count as changed
    /// while state still holds a non-zero value for them.
    pub fn changed_attributes(&self, state: &Map<String, Value>, config: &Map<String, Value>) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, attr)| !attr.is_computed_only())
            .filter(|(name, attr)| {
                let prior = state.get(*name);
                match config.get(*name).filter(|v| !v.is_null()) {
                    Some(value) => !prior.is_some_and(|prior| attr.reflects(value, prior)),
                    None => attr.optional && !attr.computed && prior.is_some_and(|p| !is_zero(p)),
                }
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn validate_value(attr: &Attribute, path: &str, value: &Value, diags: &mut Diagnostics) {
    if !attr.value_type.matches(value) {
        diags.push(
            Diagnostic::error(format!("expected type {}", attr.value_type.name()))
                .with_attribute(path),
        );
        return;
    }

    for validator in &attr.validators {
        if let Some(message) = validator.check(value) {
            diags.push(Diagnostic::error(message).with_attribute(path));
        }
    }

    match (value, attr.elem.as_ref()) {
        (Value::Array(items), Some(elem)) => {
            if let Some(max) = attr.max_items
                && items.len() > max
            {
                diags.push(
                    Diagnostic::error(format!(
                        "Too many list items: at most {} allowed, got {}",
                        max,
                        items.len()
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                match elem {
                    Elem::Scalar(t) if !t.matches(item) => diags.push(
                        Diagnostic::error(format!("expected type {}", t.name()))
                            .with_attribute(item_path),
                    ),
                    Elem::Scalar(_) => {}
                    Elem::Block(nested) => match item.as_object() {
                        Some(obj) => nested.validate_at(&format!("{}.", item_path), obj, diags),
                        None => diags.push(
                            Diagnostic::error("expected an object").with_attribute(item_path),
                        ),
                    },
                }
            }
        }
        (Value::Object(map), Some(Elem::Scalar(t))) => {
            for (key, item) in map {
                if !t.matches(item) {
                    diags.push(
                        Diagnostic::error(format!("expected type {}", t.name()))
                            .with_attribute(format!("{}.{}", path, key)),
                    );
                }
            }
        }
        _ => {}
    }
}

/// Whether every value in `config` is present and equal in `state`
///
/// Objects in state may carry extra (computed) keys; numbers compare by value.
pub fn is_subset(config: &Value, state: &Value) -> bool {
    match (config, state) {
        (Value::Object(c), Value::Object(s)) => c
            .iter()
            .filter(|(_, v)| !v.is_null())
            .all(|(k, v)| s.get(k).is_some_and(|sv| is_subset(v, sv))),
        (Value::Array(c), Value::Array(s)) => {
            c.len() == s.len() && c.iter().zip(s).all(|(cv, sv)| is_subset(cv, sv))
        }
        (Value::Number(c), Value::Number(s)) => c.as_f64() == s.as_f64(),
        _ => config == state,
    }
}

/// Zero value of a type: what an unset attribute reads as
pub(crate) fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
