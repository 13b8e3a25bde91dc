mod memory;

pub use memory::MemoryAdapter;

use crate::error::Result;
use crate::model::{Model, ModelClass};
use crate::typecast::Type;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Abstract interface to the store behind referenced associations.
/// The adapter owns all actual I/O; associations only ask it to find,
/// identify and persist records.
pub trait Adapter {
    // --- Shape ---

    /// Class of the records this adapter returns (used for type checks).
    fn data_type(&self) -> Rc<ModelClass>;

    /// Name of the key field.
    fn primary_key(&self) -> String;

    /// Type of the key; foreign key attributes are declared with it.
    fn primary_key_type(&self) -> Type;

    // --- Records ---

    /// A new, unpersisted record.
    fn build(&self, attributes: Value) -> Result<Model> {
        Model::new(&self.data_type(), attributes)
    }

    /// Query context for loading the targets of `owner`.
    fn scope(&self, _owner: &Model, keys: Vec<Value>) -> Scope {
        Scope::new(self.data_type(), self.primary_key(), keys)
    }

    /// Returns Ok(None) when no record has `key` within `scope`.
    fn find_one(&self, scope: &Scope, key: &Value) -> Result<Option<Model>>;

    /// Records for `keys`, in the order of `keys`. Missing keys are skipped.
    fn find_all(&self, scope: &Scope, keys: &[Value]) -> Result<Vec<Model>>;

    /// Key of a stored record, or None if it has none yet.
    fn identify(&self, object: &Model) -> Option<Value>;

    /// Store `object`. Returns false (or fails, with `raise_on_failure`) when
    /// it cannot be stored.
    fn persist(&self, object: &Model, raise_on_failure: bool) -> Result<bool>;
}

type Filter = Rc<dyn Fn(&Model) -> bool>;

/// Explicit query context handed to adapter lookups.
#[derive(Clone)]
pub struct Scope {
    class: Rc<ModelClass>,
    primary_key: String,
    keys: Vec<Value>,
    filters: Vec<Filter>,
}

impl Scope {
    pub fn new(class: Rc<ModelClass>, primary_key: impl Into<String>, keys: Vec<Value>) -> Self {
        Self {
            class,
            primary_key: primary_key.into(),
            keys,
            filters: Vec::new(),
        }
    }

    pub fn class(&self) -> &Rc<ModelClass> {
        &self.class
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    /// Narrow the scope to records passing `f`.
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> bool + 'static,
    {
        self.filters.push(Rc::new(f));
        self
    }

    pub fn matches(&self, record: &Model) -> bool {
        self.filters.iter().all(|f| f(record))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("class", &self.class.name())
            .field("primary_key", &self.primary_key)
            .field("keys", &self.keys)
            .field("filters", &self.filters.len())
            .finish()
    }
}
