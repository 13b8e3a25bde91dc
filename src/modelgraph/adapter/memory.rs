use super::{Adapter, Scope};
use crate::config;
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelClass};
use crate::typecast::{self, Type};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// In-memory adapter for tests and embedding applications without a store.
///
/// Uses `RefCell` for interior mutability since models are single-threaded.
/// Records are kept as shared handles, so lookups return the very instances
/// that were persisted. Keys are incrementing integers.
pub struct MemoryAdapter {
    class: Rc<ModelClass>,
    primary_key: String,
    records: RefCell<BTreeMap<i64, Model>>,
    next_key: Cell<i64>,
    simulate_write_error: RefCell<bool>,
}

impl MemoryAdapter {
    /// Adapter for `class`, keyed by its primary attribute (or the configured
    /// default name).
    pub fn new(class: &Rc<ModelClass>) -> Self {
        let primary_key = class
            .primary_attribute()
            .map(|primary| primary.name().to_string())
            .unwrap_or_else(|| config::current().primary_attribute);
        Self {
            class: class.clone(),
            primary_key,
            records: RefCell::new(BTreeMap::new()),
            next_key: Cell::new(1),
            simulate_write_error: RefCell::new(false),
        }
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        *self.simulate_write_error.borrow_mut() = simulate;
    }

    /// Build and persist a record in one step.
    pub fn insert(&self, attributes: impl Into<Value>) -> Result<Model> {
        let record = self.build(attributes.into())?;
        self.persist(&record, true)?;
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Every record in key order.
    pub fn all(&self) -> Vec<Model> {
        self.records.borrow().values().cloned().collect()
    }

    fn key_of(value: &Value) -> Option<i64> {
        typecast::coerce(&Type::Integer, value)
            .ok()
            .flatten()
            .and_then(|key| key.as_i64())
    }
}

impl Adapter for MemoryAdapter {
    fn data_type(&self) -> Rc<ModelClass> {
        self.class.clone()
    }

    fn primary_key(&self) -> String {
        self.primary_key.clone()
    }

    fn primary_key_type(&self) -> Type {
        Type::Integer
    }

    fn find_one(&self, scope: &Scope, key: &Value) -> Result<Option<Model>> {
        let Some(key) = Self::key_of(key) else {
            return Ok(None);
        };
        let records = self.records.borrow();
        Ok(records.get(&key).filter(|record| scope.matches(record)).cloned())
    }

    fn find_all(&self, scope: &Scope, keys: &[Value]) -> Result<Vec<Model>> {
        let records = self.records.borrow();
        Ok(keys
            .iter()
            .filter_map(Self::key_of)
            .filter_map(|key| records.get(&key))
            .filter(|record| scope.matches(record))
            .cloned()
            .collect())
    }

    fn identify(&self, object: &Model) -> Option<Value> {
        object
            .read_attribute(&self.primary_key)
            .ok()
            .filter(|key| !key.is_nil())
    }

    fn persist(&self, object: &Model, raise_on_failure: bool) -> Result<bool> {
        if *self.simulate_write_error.borrow() {
            return Err(ModelError::Adapter("Simulated write error".to_string()));
        }
        if !object.valid()? {
            if raise_on_failure {
                return Err(ModelError::Validation(object.errors()));
            }
            return Ok(false);
        }

        let key = match self.identify(object).as_ref().and_then(Self::key_of) {
            Some(key) => key,
            None => {
                let key = self.next_key.get();
                object.write_attribute(&self.primary_key, key)?;
                key
            }
        };
        self.next_key.set(self.next_key.get().max(key + 1));
        self.records.borrow_mut().insert(key, object.clone());
        object.mark_persisted();
        object.clear_changes();
        tracing::debug!(class = self.class.name(), key, "persisted record");
        Ok(true)
    }
}
