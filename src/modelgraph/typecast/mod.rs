//! # Type Coercion
//!
//! Declared attribute types are [`Type`] descriptors. Turning a raw value into
//! a value of the declared type goes through a process-wide [`Registry`] of
//! typecasters keyed by type name.
//!
//! ## Lookup
//!
//! Every type has an ancestor chain, most specific first:
//!
//! | Type | Chain |
//! |------|-------|
//! | `Integer` | `Integer`, `Numeric`, `Object` |
//! | `DateTime` | `DateTime`, `Date`, `Object` |
//! | model class `Book < Item` | `Book`, `Item`, `Model`, `Object` |
//! | custom `Email < String` | `Email`, `String`, `Object` |
//!
//! The first registered typecaster along the chain wins. A value that already
//! is an instance of the type is returned as-is without consulting any
//! typecaster. A typecaster returning `None` means "not coercible", which is
//! not an error; only a chain with no registered typecaster at all is
//! (`ModelError::TypecasterMissing`).

mod builtin;
mod registry;

pub use builtin::{parse_boolean, BOOLEAN_MAPPING};
pub use registry::{coerce, lookup, register, Registry, Typecaster};

use crate::model::ModelClass;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// An attribute's declared type.
#[derive(Clone)]
pub enum Type {
    /// Anything. Only values that already are instances pass.
    Object,
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    /// Time of day.
    Time,
    Uuid,
    Array,
    Dict,
    Model(Rc<ModelClass>),
    Custom(CustomType),
}

/// An application-defined type.
///
/// Coercion for it is registered under `name`; lookup falls back to the
/// parent's chain. `matches` decides which values already are instances.
#[derive(Clone, Debug)]
pub struct CustomType {
    pub name: String,
    pub parent: Option<Box<Type>>,
    pub matches: Option<fn(&Value) -> bool>,
}

impl CustomType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            matches: None,
        }
    }

    pub fn parent(mut self, parent: Type) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn matching(mut self, matches: fn(&Value) -> bool) -> Self {
        self.matches = Some(matches);
        self
    }
}

impl Type {
    pub fn name(&self) -> String {
        match self {
            Type::Object => "Object".to_string(),
            Type::String => "String".to_string(),
            Type::Integer => "Integer".to_string(),
            Type::Float => "Float".to_string(),
            Type::Decimal => "Decimal".to_string(),
            Type::Boolean => "Boolean".to_string(),
            Type::Date => "Date".to_string(),
            Type::DateTime => "DateTime".to_string(),
            Type::Time => "Time".to_string(),
            Type::Uuid => "UUID".to_string(),
            Type::Array => "Array".to_string(),
            Type::Dict => "Dict".to_string(),
            Type::Model(class) => class.name().to_string(),
            Type::Custom(custom) => custom.name.clone(),
        }
    }

    /// Type names from most to least specific.
    pub fn ancestors(&self) -> Vec<String> {
        let tail: &[&str] = match self {
            Type::Object => &["Object"],
            Type::Integer => &["Integer", "Numeric", "Object"],
            Type::Float => &["Float", "Numeric", "Object"],
            Type::Decimal => &["Decimal", "Numeric", "Object"],
            Type::DateTime => &["DateTime", "Date", "Object"],
            Type::Model(class) => {
                let mut chain: Vec<String> =
                    class.lineage().iter().map(|c| c.name().to_string()).collect();
                chain.push("Model".to_string());
                chain.push("Object".to_string());
                return chain;
            }
            Type::Custom(custom) => {
                let mut chain = vec![custom.name.clone()];
                if let Some(parent) = &custom.parent {
                    chain.extend(parent.ancestors());
                }
                return chain;
            }
            _ => return vec![self.name(), "Object".to_string()],
        };
        tail.iter().map(|s| s.to_string()).collect()
    }

    /// Whether `value` already is an instance of this type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Nil) => false,
            (Type::Object, _) => true,
            (Type::String, Value::String(_))
            | (Type::Integer, Value::Integer(_))
            | (Type::Float, Value::Float(_))
            | (Type::Decimal, Value::Decimal(_))
            | (Type::Boolean, Value::Bool(_))
            | (Type::Date, Value::Date(_))
            | (Type::DateTime, Value::DateTime(_))
            | (Type::Time, Value::Time(_))
            | (Type::Uuid, Value::Uuid(_))
            | (Type::Array, Value::Array(_))
            | (Type::Dict, Value::Dict(_)) => true,
            (Type::Model(class), Value::Model(model)) => model.class().is_a(class),
            (Type::Custom(custom), value) => custom.matches.map(|f| f(value)).unwrap_or(false),
            _ => false,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Boolean)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Model(a), Type::Model(b)) => Rc::ptr_eq(a, b),
            (Type::Custom(a), Type::Custom(b)) => a.name == b.name,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}
