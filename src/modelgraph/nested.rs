//! # Nested Attributes
//!
//! `accepts_nested_attributes_for` lets an owner take a whole graph of child
//! attributes through a single `<association>_attributes` key:
//!
//! ```text
//! {"parts_attributes": {"0": {"id": 5, "name": "x"}, "1": {"name": "y"}}}
//! ```
//!
//! Each record is dispatched by its primary key:
//!
//! | Key in record | Matching child | Result |
//! |---------------|----------------|--------|
//! | blank         | -              | build a new child (unless rejected) |
//! | present       | found          | assign onto it, maybe mark for destruction |
//! | present       | not found      | `ObjectNotFound` |
//!
//! The `_destroy` marker is parsed like a declared Boolean, so `"1"` and
//! `"true"` count, `"0"` and absence do not.

use crate::associations::{Association, AssociationReflection};
use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::typecast;
use crate::value::{Dict, Value};
use std::fmt;
use std::rc::Rc;

/// Marker key requesting destruction of the matched child.
pub const DESTROY_ATTRIBUTE: &str = "_destroy";

/// When to skip a nested record.
#[derive(Clone)]
pub enum RejectIf {
    /// Every value except the destroy marker is blank.
    AllBlank,
    /// A declared method of the owner, called with no argument or with the
    /// record attributes; its result is tested for truthiness.
    Method(String),
    Predicate(Rc<dyn Fn(&Dict) -> bool>),
}

/// Upper bound on the number of records in one collection assignment.
#[derive(Clone)]
pub enum Limit {
    Count(usize),
    /// A zero-arity method of the owner returning the limit.
    Method(String),
    Computed(Rc<dyn Fn() -> usize>),
}

#[derive(Clone, Default)]
pub struct NestedAttributesOptions {
    allow_destroy: bool,
    update_only: bool,
    reject_if: Option<RejectIf>,
    limit: Option<Limit>,
}

impl NestedAttributesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_destroy(mut self) -> Self {
        self.allow_destroy = true;
        self
    }

    /// For one-to-one associations: always update the existing target, never
    /// build a replacement.
    pub fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }

    pub fn reject_if(mut self, policy: RejectIf) -> Self {
        self.reject_if = Some(policy);
        self
    }

    pub fn reject_all_blank(self) -> Self {
        self.reject_if(RejectIf::AllBlank)
    }

    pub fn reject_with<F>(self, predicate: F) -> Self
    where
        F: Fn(&Dict) -> bool + 'static,
    {
        self.reject_if(RejectIf::Predicate(Rc::new(predicate)))
    }

    pub fn reject_method(self, name: impl Into<String>) -> Self {
        self.reject_if(RejectIf::Method(name.into()))
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(Limit::Count(count));
        self
    }

    pub fn limit_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> usize + 'static,
    {
        self.limit = Some(Limit::Computed(Rc::new(f)));
        self
    }

    pub fn limit_method(mut self, name: impl Into<String>) -> Self {
        self.limit = Some(Limit::Method(name.into()));
        self
    }

    pub fn allows_destroy(&self) -> bool {
        self.allow_destroy
    }

    pub fn is_update_only(&self) -> bool {
        self.update_only
    }
}

impl fmt::Debug for NestedAttributesOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedAttributesOptions")
            .field("allow_destroy", &self.allow_destroy)
            .field("update_only", &self.update_only)
            .field("reject_if", &self.reject_if.is_some())
            .field("limit", &self.limit.is_some())
            .finish()
    }
}

fn has_destroy_flag(attributes: &Dict) -> bool {
    attributes
        .get(DESTROY_ATTRIBUTE)
        .and_then(typecast::parse_boolean)
        .unwrap_or(false)
}

fn primary_key_name(reflection: &AssociationReflection) -> Result<Option<String>> {
    if let Some(adapter) = reflection.adapter() {
        return Ok(Some(adapter.primary_key()));
    }
    Ok(reflection
        .klass()?
        .primary_attribute()
        .map(|primary| primary.name().to_string()))
}

fn expect_dict(association: &str, value: Value) -> Result<Dict> {
    match value {
        Value::Dict(attributes) => Ok(attributes),
        other => Err(ModelError::Argument(format!(
            "{} attributes must be a dict, got {}",
            association,
            other.describe()
        ))),
    }
}

/// Per-call state shared by the one-to-one and collection paths.
struct Assigner<'a> {
    owner: &'a Model,
    association: Association,
    options: &'a NestedAttributesOptions,
    primary_key: Option<String>,
}

impl Assigner<'_> {
    fn name(&self) -> &str {
        self.association.name()
    }

    fn assignable(&self, attributes: &Dict) -> Dict {
        match &self.primary_key {
            Some(primary_key) => attributes.without(&[primary_key.as_str(), DESTROY_ATTRIBUTE]),
            None => attributes.without(&[DESTROY_ATTRIBUTE]),
        }
    }

    fn input_key<'d>(&self, attributes: &'d Dict) -> Option<&'d Value> {
        self.primary_key
            .as_deref()
            .and_then(|primary_key| attributes.get(primary_key))
            .filter(|key| key.is_present())
    }

    fn call_reject_if(&self, attributes: &Dict) -> Result<bool> {
        if has_destroy_flag(attributes) {
            return Ok(false);
        }
        match &self.options.reject_if {
            None => Ok(false),
            Some(RejectIf::AllBlank) => Ok(attributes
                .iter()
                .all(|(key, value)| key == DESTROY_ATTRIBUTE || value.is_blank())),
            Some(RejectIf::Predicate(predicate)) => Ok(predicate(attributes)),
            Some(RejectIf::Method(name)) => {
                let method = self.owner.class().method(name).ok_or_else(|| {
                    ModelError::UndefinedAttribute {
                        class: self.owner.class().name().to_string(),
                        name: name.clone(),
                    }
                })?;
                let result = match method.arity() {
                    0 => method.call(self.owner, &[])?,
                    _ => method.call(self.owner, &[Value::Dict(attributes.clone())])?,
                };
                Ok(result.is_truthy())
            }
        }
    }

    fn reject_new_object(&self, attributes: &Dict) -> Result<bool> {
        Ok(has_destroy_flag(attributes) || self.call_reject_if(attributes)?)
    }

    fn assign_to_or_mark_for_destruction(&self, record: &Model, attributes: &Dict) -> Result<()> {
        record.assign_attributes(self.assignable(attributes))?;
        if has_destroy_flag(attributes) && self.options.allow_destroy {
            record.mark_for_destruction();
        }
        Ok(())
    }

    /// Whether `record`'s primary key equals the input key once typecast to
    /// the record's primary attribute type.
    fn matches(&self, record: &Model, key: &Value) -> Result<bool> {
        let Some(primary_key) = &self.primary_key else {
            return Ok(false);
        };
        let Some(reflection) = record.class().attribute(primary_key).cloned() else {
            return Ok(false);
        };
        let current = record.read_attribute(primary_key)?;
        Ok(!current.is_nil() && current == reflection.typecast(key)?)
    }

    fn not_found(&self, key: &Value) -> ModelError {
        ModelError::ObjectNotFound {
            class: self.owner.class().name().to_string(),
            association: self.name().to_string(),
            primary_key: self.primary_key.clone().unwrap_or_default(),
            key: key.to_string(),
        }
    }

    fn assign_one(&self, attributes: Dict) -> Result<()> {
        let existing = self.association.target_models()?.into_iter().next();
        let key = self.input_key(&attributes).cloned();

        if let Some(record) = &existing {
            let primary_key = self
                .primary_key
                .as_deref()
                .filter(|primary_key| record.class().has_attribute(primary_key));
            let matched = match (primary_key, &key) {
                (None, _) => true,
                (Some(_), Some(key)) => self.matches(record, key)?,
                (Some(primary_key), None) => record.read_attribute(primary_key)?.is_nil(),
            };
            if self.options.update_only || matched {
                if !self.call_reject_if(&attributes)? {
                    self.assign_to_or_mark_for_destruction(record, &attributes)?;
                }
                return Ok(());
            }
        }

        if let Some(key) = key {
            return Err(self.not_found(&key));
        }
        if self.reject_new_object(&attributes)? {
            return Ok(());
        }
        let assignable = self.assignable(&attributes);
        match existing {
            Some(record) if !record.is_persisted() => record.assign_attributes(assignable),
            _ => self.association.build(assignable).map(|_| ()),
        }
    }

    fn records(&self, value: Value) -> Result<Vec<Dict>> {
        let records = match value {
            Value::Array(records) => records,
            Value::Dict(records) => {
                let keyed = self
                    .primary_key
                    .as_deref()
                    .map(|primary_key| records.contains_key(primary_key))
                    .unwrap_or(false);
                if keyed {
                    vec![Value::Dict(records)]
                } else {
                    records.into_iter().map(|(_, record)| record).collect()
                }
            }
            other => {
                return Err(ModelError::Argument(format!(
                    "{} attributes must be a dict or an array, got {}",
                    self.name(),
                    other.describe()
                )))
            }
        };
        records
            .into_iter()
            .map(|record| expect_dict(self.name(), record))
            .collect()
    }

    fn limit(&self) -> Result<Option<usize>> {
        Ok(match &self.options.limit {
            None => None,
            Some(Limit::Count(count)) => Some(*count),
            Some(Limit::Computed(f)) => Some(f()),
            Some(Limit::Method(name)) => {
                let value = self.owner.send(name, &[])?;
                let limit = value.as_i64().ok_or_else(|| {
                    ModelError::Argument(format!("limit method {} returned {}", name, value.describe()))
                })?;
                Some(usize::try_from(limit).unwrap_or(0))
            }
        })
    }

    fn assign_collection(&self, value: Value) -> Result<()> {
        if self.primary_key.is_none() {
            return Err(ModelError::UndefinedPrimaryAttribute {
                class: self.association.reflection().klass()?.name().to_string(),
                association: self.name().to_string(),
            });
        }
        let records = self.records(value)?;
        if let Some(limit) = self.limit()? {
            if records.len() > limit {
                return Err(ModelError::TooManyObjects {
                    limit,
                    count: records.len(),
                });
            }
        }

        for attributes in records {
            let Some(key) = self.input_key(&attributes).cloned() else {
                if !self.reject_new_object(&attributes)? {
                    self.association.build(self.assignable(&attributes))?;
                }
                continue;
            };
            let mut existing = None;
            for record in self.association.target_models()? {
                if self.matches(&record, &key)? {
                    existing = Some(record);
                    break;
                }
            }
            match existing {
                Some(record) => {
                    if !self.call_reject_if(&attributes)? {
                        self.assign_to_or_mark_for_destruction(&record, &attributes)?;
                    }
                }
                None => return Err(self.not_found(&key)),
            }
        }
        Ok(())
    }
}

impl Model {
    /// Assign a nested attributes block to `association`, which must have
    /// been declared with `accepts_nested_attributes_for`.
    pub fn assign_nested_attributes(&self, association: &str, value: impl Into<Value>) -> Result<()> {
        let options = self
            .class()
            .nested_attributes_options(association)
            .cloned()
            .ok_or_else(|| {
                ModelError::Argument(format!(
                    "{} does not accept nested attributes for {}",
                    self.class().name(),
                    association
                ))
            })?;
        let association = self.association(association)?;
        let primary_key = primary_key_name(association.reflection())?;
        let collection = association.reflection().kind().is_collection();
        tracing::debug!(
            class = self.class().name(),
            association = association.name(),
            collection,
            "assigning nested attributes"
        );

        let assigner = Assigner {
            owner: self,
            association,
            options: &options,
            primary_key,
        };
        let value = value.into();
        if collection {
            assigner.assign_collection(value)
        } else {
            let attributes = expect_dict(assigner.name(), value)?;
            assigner.assign_one(attributes)
        }
    }
}
