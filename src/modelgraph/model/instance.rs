use super::{ModelClass, Operation};
use crate::associations::Association;
use crate::attributes::{AttributeCell, AttributeKind};
use crate::config;
use crate::error::{ModelError, Result};
use crate::validations::Errors;
use crate::value::{Dict, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handle to a model instance.
#[derive(Clone)]
pub struct Model(pub(crate) Rc<ModelInner>);

pub(crate) struct ModelInner {
    pub(crate) class: Rc<ModelClass>,
    pub(crate) cells: RefCell<HashMap<String, AttributeCell>>,
    pub(crate) associations: RefCell<HashMap<String, Association>>,
    pub(crate) errors: RefCell<Errors>,
    /// Attribute name to the value it had before the first unsaved change.
    pub(crate) changes: RefCell<Vec<(String, Value)>>,
    pub(crate) embedding: RefCell<Option<Embedding>>,
    pub(crate) persisted: Cell<bool>,
    pub(crate) destroyed: Cell<bool>,
    pub(crate) marked_for_destruction: Cell<bool>,
}

/// Non-owning link from an embedded child to the association holding it.
#[derive(Clone)]
pub(crate) struct Embedding {
    pub(crate) owner: Weak<ModelInner>,
    pub(crate) association: String,
}

impl Embedding {
    pub(crate) fn owner(&self) -> Result<Model> {
        self.owner
            .upgrade()
            .map(Model)
            .ok_or_else(|| ModelError::OwnerReleased(self.association.clone()))
    }

    /// Run a child's lifecycle operation against the owner's backing storage.
    pub(crate) fn perform(&self, operation: Operation, child: &Model) -> Result<bool> {
        let owner = self.owner()?;
        match owner.association(&self.association)? {
            Association::EmbedsOne(association) => association.perform(operation, child),
            Association::EmbedsMany(association) => association.perform(operation, child),
            _ => Err(ModelError::Argument(format!(
                "{} is not an embedded association",
                self.association
            ))),
        }
    }
}

impl Model {
    fn allocate(class: &Rc<ModelClass>) -> Self {
        Model(Rc::new(ModelInner {
            class: class.clone(),
            cells: RefCell::new(HashMap::new()),
            associations: RefCell::new(HashMap::new()),
            errors: RefCell::new(Errors::new()),
            changes: RefCell::new(Vec::new()),
            embedding: RefCell::new(None),
            persisted: Cell::new(false),
            destroyed: Cell::new(false),
            marked_for_destruction: Cell::new(false),
        }))
    }

    /// A new, unpersisted instance with `attributes` assigned.
    pub fn new(class: &Rc<ModelClass>, attributes: impl Into<Value>) -> Result<Self> {
        let model = Self::allocate(class);
        model.assign_attributes(attributes)?;
        Ok(model)
    }

    /// Rebuild an already persisted instance from stored data.
    ///
    /// Stored keys are taken as-is: defaults do not apply to them, not even to
    /// an explicit nil, and nothing counts as changed.
    pub fn instantiate(class: &Rc<ModelClass>, data: impl Into<Value>) -> Result<Self> {
        let model = Self::allocate(class);
        let data = match data.into() {
            Value::Nil => Dict::new(),
            Value::Dict(data) => data,
            other => {
                return Err(ModelError::Argument(format!(
                    "cannot instantiate {} from {}",
                    class.name(),
                    other.describe()
                )))
            }
        };
        {
            let mut cells = model.0.cells.borrow_mut();
            for (key, raw) in data {
                match class.attribute(&key) {
                    Some(reflection) if reflection.kind() != AttributeKind::Represents => {
                        cells.insert(reflection.name().to_string(), AttributeCell::loaded(raw));
                    }
                    _ => tracing::debug!(class = class.name(), attribute = %key, "ignoring stored attribute"),
                }
            }
        }
        model.0.persisted.set(true);
        Ok(model)
    }

    pub fn create(class: &Rc<ModelClass>, attributes: impl Into<Value>) -> Result<Self> {
        let model = Self::new(class, attributes)?;
        model.save()?;
        Ok(model)
    }

    pub fn create_strict(class: &Rc<ModelClass>, attributes: impl Into<Value>) -> Result<Self> {
        let model = Self::new(class, attributes)?;
        model.save_strict()?;
        Ok(model)
    }

    pub fn class(&self) -> &Rc<ModelClass> {
        &self.0.class
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn embed_into(&self, owner: &Model, association: &str) {
        *self.0.embedding.borrow_mut() = Some(Embedding {
            owner: owner.downgrade(),
            association: association.to_string(),
        });
    }

    pub(crate) fn embedding(&self) -> Option<Embedding> {
        self.0.embedding.borrow().clone()
    }

    /// The owner this instance is embedded into, if it is still alive.
    pub fn embedder(&self) -> Option<Model> {
        self.embedding().and_then(|e| e.owner.upgrade()).map(Model)
    }

    /// Runtime for the named association, created on first access.
    pub fn association(&self, name: &str) -> Result<Association> {
        if let Some(association) = self.0.associations.borrow().get(name) {
            return Ok(association.clone());
        }
        let reflection = self
            .class()
            .association(name)
            .cloned()
            .ok_or_else(|| ModelError::UndefinedAttribute {
                class: self.class().name().to_string(),
                name: name.to_string(),
            })?;
        let association = Association::new(self, reflection);
        self.0
            .associations
            .borrow_mut()
            .insert(name.to_string(), association.clone());
        Ok(association)
    }

    /// Document written into an owner's backing attribute when embedded.
    pub(crate) fn storage_document(&self) -> Result<Value> {
        let mut document = Dict::new();
        for reflection in self.class().attributes() {
            if reflection.kind() == AttributeKind::Represents {
                continue;
            }
            document.insert(reflection.name(), self.read_reflection(reflection)?);
        }
        Ok(Value::Dict(document))
    }

    /// JSON view of the attributes. Embedded associations appear as their
    /// current in-memory targets.
    pub fn as_json(&self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for reflection in self.class().attributes() {
            let value = if reflection.kind() == AttributeKind::Association {
                self.get(reflection.name())?
            } else {
                self.read_reflection(reflection)?
            };
            map.insert(reflection.name().to_string(), value.to_json()?);
        }
        let json = serde_json::Value::Object(map);
        if config::current().include_root_in_json {
            let mut root = serde_json::Map::new();
            root.insert(underscore(self.class().name()), json);
            return Ok(serde_json::Value::Object(root));
        }
        Ok(json)
    }

    fn structural_eq(&self, other: &Model) -> Result<bool> {
        for reflection in self.class().attributes() {
            let (mine, theirs) = match reflection.kind() {
                AttributeKind::Association => continue,
                _ => (
                    self.read_reflection(reflection)?,
                    other.read_reflection(reflection)?,
                ),
            };
            if mine != theirs {
                return Ok(false);
            }
        }
        for association in self.class().associations() {
            if !association.kind().is_embedded() {
                continue;
            }
            if self.get(association.name())? != other.get(association.name())? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `BookShelf::Item` becomes `book_shelf/item`.
fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for ch in name.replace("::", "/").chars() {
        if ch.is_uppercase() {
            if previous_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            previous_lower = false;
        } else {
            previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

impl PartialEq for Model {
    /// Same instance, or same class and equal non-nil primary keys. Classes
    /// without a primary attribute compare attributes and embedded children.
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if !Rc::ptr_eq(self.class(), other.class()) {
            return false;
        }
        match self.class().primary_attribute() {
            Some(primary) => match (
                self.read_reflection(primary),
                other.read_reflection(primary),
            ) {
                (Ok(mine), Ok(theirs)) => !mine.is_nil() && mine == theirs,
                _ => false,
            },
            None => self.structural_eq(other).unwrap_or(false),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("class", &self.class().name())
            .field("persisted", &self.is_persisted())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}", self.class().name())?;
        for (index, reflection) in self.class().attributes().iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            match self.read_reflection(reflection) {
                Ok(Value::String(s)) => write!(f, "{}{}: {:?}", separator, reflection.name(), s)?,
                Ok(value) => write!(f, "{}{}: {}", separator, reflection.name(), value)?,
                Err(_) => write!(f, "{}{}: ?", separator, reflection.name())?,
            }
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_class_names() {
        assert_eq!(underscore("Book"), "book");
        assert_eq!(underscore("BookShelf"), "book_shelf");
        assert_eq!(underscore("Book::Chapter"), "book/chapter");
    }
}
