use super::{check_type, read_source, transaction, upgrade_owner, write_source, AssociationReflection};
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelInner, Operation};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct State {
    target: Vec<Model>,
    destroyed: Vec<Model>,
    loaded: bool,
}

/// Ordered children stored as an array of dicts in the owner's backing
/// attribute.
///
/// A child's position in storage is derived from its identity among its
/// persisted siblings in the in-memory target, so new, persisted and removed
/// children can be mixed freely before the owner is saved.
pub struct EmbedsMany {
    owner: Weak<ModelInner>,
    reflection: Rc<AssociationReflection>,
    state: RefCell<State>,
}

impl EmbedsMany {
    pub(crate) fn new(owner: Weak<ModelInner>, reflection: Rc<AssociationReflection>) -> Self {
        Self {
            owner,
            reflection,
            state: RefCell::new(State::default()),
        }
    }

    pub fn reflection(&self) -> &Rc<AssociationReflection> {
        &self.reflection
    }

    fn owner(&self) -> Result<Model> {
        upgrade_owner(&self.owner, &self.reflection)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().loaded
    }

    pub fn target(&self) -> Result<Vec<Model>> {
        if !self.is_loaded() {
            let target = self.load()?;
            let mut state = self.state.borrow_mut();
            state.target = target;
            state.loaded = true;
        }
        Ok(self.state.borrow().target.clone())
    }

    /// Children removed by `apply_changes` since the last reset.
    pub fn destroyed(&self) -> Vec<Model> {
        self.state.borrow().destroyed.clone()
    }

    fn load(&self) -> Result<Vec<Model>> {
        let owner = self.owner()?;
        let class = self.reflection.klass()?;
        let children = match read_source(&self.reflection, &owner)? {
            Value::Nil => self.default_children(&owner)?,
            Value::Array(records) => records
                .into_iter()
                .map(|record| Model::instantiate(&class, record))
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(ModelError::Argument(format!(
                    "{} expects an array in its backing attribute, got {}",
                    self.reflection.name(),
                    other.describe()
                )))
            }
        };
        for child in &children {
            child.embed_into(&owner, self.reflection.name());
        }
        Ok(children)
    }

    fn default_children(&self, owner: &Model) -> Result<Vec<Model>> {
        let class = self.reflection.klass()?;
        let defaults = match self.reflection.default_value(owner) {
            Value::Nil => return Ok(Vec::new()),
            Value::Array(items) => items,
            single => vec![single],
        };
        defaults
            .into_iter()
            .map(|item| match item {
                Value::Model(model) => {
                    check_type(&class, &model)?;
                    Ok(model)
                }
                attributes => Model::new(&class, attributes),
            })
            .collect()
    }

    /// Append without type checks. Destroyed children start over as new and
    /// move to the end.
    fn push(&self, owner: &Model, child: Model) {
        if child.is_destroyed() {
            child.reset_lifecycle();
        }
        child.embed_into(owner, self.reflection.name());
        let mut state = self.state.borrow_mut();
        state.target.retain(|existing| !existing.ptr_eq(&child));
        state.destroyed.retain(|existing| !existing.ptr_eq(&child));
        state.target.push(child);
    }

    pub fn build(&self, attributes: impl Into<Value>) -> Result<Model> {
        let owner = self.owner()?;
        self.target()?;
        let child = Model::new(&self.reflection.klass()?, attributes)?;
        self.push(&owner, child.clone());
        Ok(child)
    }

    pub fn create(&self, attributes: impl Into<Value>) -> Result<Model> {
        let child = self.build(attributes)?;
        child.save()?;
        Ok(child)
    }

    /// Append every object, or none when any has the wrong class.
    pub fn concat(&self, objects: Vec<Model>) -> Result<Vec<Model>> {
        let owner = self.owner()?;
        let class = self.reflection.klass()?;
        for object in &objects {
            check_type(&class, object)?;
        }
        self.target()?;
        for object in objects {
            self.push(&owner, object);
        }
        self.target()
    }

    /// Destroy every child and reload from the emptied storage.
    pub fn clear(&self) -> Result<bool> {
        let owner = self.owner()?;
        let children = self.target()?;
        transaction(
            &self.reflection,
            &owner,
            || self.reload().map(|_| ()),
            || {
                for child in &children {
                    child.destroy_strict()?;
                }
                Ok(true)
            },
        )
        .or_else(|error| match error {
            ModelError::ObjectNotDestroyed(_) => Ok(false),
            other => Err(other),
        })?;
        self.reload()?;
        Ok(self.state.borrow().target.is_empty())
    }

    /// Destroy the current children and append `objects` in their place.
    /// On failure, storage and target are restored to their state before
    /// the call.
    pub fn replace(&self, objects: Vec<Model>) -> Result<bool> {
        let owner = self.owner()?;
        let class = self.reflection.klass()?;
        transaction(
            &self.reflection,
            &owner,
            || self.reload().map(|_| ()),
            || {
                if !self.clear()? {
                    return Ok(false);
                }
                for object in &objects {
                    check_type(&class, object)?;
                }
                for object in objects {
                    self.push(&owner, object);
                }
                Ok(true)
            },
        )
    }

    pub fn replace_strict(&self, objects: Vec<Model>) -> Result<()> {
        if self.replace(objects)? {
            Ok(())
        } else {
            Err(super::changes_not_applied(&self.reflection))
        }
    }

    pub fn reset(&self) {
        *self.state.borrow_mut() = State::default();
    }

    pub fn reload(&self) -> Result<Vec<Model>> {
        self.reset();
        self.target()
    }

    /// Save or destroy every child, then move destroyed children out of the
    /// target. Every child is attempted; the result is true only when all
    /// of them succeeded.
    pub fn apply_changes(&self) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(true);
        }
        let children = self.target()?;
        let mut applied = true;
        for child in &children {
            let succeeded = if child.marked_for_destruction() || child.is_destroyed() {
                child.destroy()?
            } else {
                child.save()?
            };
            applied &= succeeded;
        }

        let mut state = self.state.borrow_mut();
        let (destroyed, kept): (Vec<Model>, Vec<Model>) =
            std::mem::take(&mut state.target).into_iter().partition(Model::is_destroyed);
        state.target = kept;
        state.destroyed.extend(destroyed);
        tracing::debug!(
            association = self.reflection.name(),
            children = children.len(),
            destroyed = state.destroyed.len(),
            applied,
            "applied embedded changes"
        );
        Ok(applied)
    }

    pub fn apply_changes_strict(&self) -> Result<()> {
        if self.apply_changes()? {
            Ok(())
        } else {
            Err(super::changes_not_applied(&self.reflection))
        }
    }

    fn records(&self, owner: &Model) -> Result<Vec<Value>> {
        match read_source(&self.reflection, owner)? {
            Value::Nil => Ok(Vec::new()),
            Value::Array(records) => Ok(records),
            other => Err(ModelError::Argument(format!(
                "{} expects an array in its backing attribute, got {}",
                self.reflection.name(),
                other.describe()
            ))),
        }
    }

    /// Position of `child` in storage: among persisted siblings (and the
    /// child itself when creating), by identity.
    fn index_of(&self, child: &Model, including_self: bool) -> Option<usize> {
        self.state
            .borrow()
            .target
            .iter()
            .filter(|sibling| sibling.is_persisted() || (including_self && sibling.ptr_eq(child)))
            .position(|sibling| sibling.ptr_eq(child))
    }

    pub(crate) fn perform(&self, operation: Operation, child: &Model) -> Result<bool> {
        let owner = self.owner()?;
        match operation {
            Operation::Create => {
                let Some(index) = self.index_of(child, true) else {
                    return Ok(false);
                };
                let mut records = self.records(&owner)?;
                let index = index.min(records.len());
                records.insert(index, child.storage_document()?);
                write_source(&self.reflection, &owner, Value::Array(records))?;
                Ok(true)
            }
            Operation::Update => {
                let Some(index) = self.index_of(child, false) else {
                    return Ok(false);
                };
                let mut records = self.records(&owner)?;
                let document = child.storage_document()?;
                match records.get_mut(index) {
                    Some(record) => *record = document,
                    None => records.push(document),
                }
                write_source(&self.reflection, &owner, Value::Array(records))?;
                Ok(true)
            }
            Operation::Destroy => {
                if let Some(index) = self.index_of(child, false) {
                    let mut records = self.records(&owner)?;
                    if index < records.len() {
                        records.remove(index);
                        write_source(&self.reflection, &owner, Value::Array(records))?;
                    }
                }
                Ok(true)
            }
        }
    }
}
