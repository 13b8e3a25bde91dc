use super::{check_type, read_source, upgrade_owner, write_source, AssociationReflection};
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelInner, Operation};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct State {
    target: Option<Model>,
    loaded: bool,
}

/// A single child stored as a dict in the owner's backing attribute.
pub struct EmbedsOne {
    owner: Weak<ModelInner>,
    reflection: Rc<AssociationReflection>,
    state: RefCell<State>,
}

impl EmbedsOne {
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

    pub fn target(&self) -> Result<Option<Model>> {
        if !self.is_loaded() {
            let target = self.load()?;
            self.set_target(target);
        }
        Ok(self.state.borrow().target.clone())
    }

    fn load(&self) -> Result<Option<Model>> {
        let owner = self.owner()?;
        let class = self.reflection.klass()?;
        let target = match read_source(&self.reflection, &owner)? {
            Value::Nil => match self.reflection.default_value(&owner) {
                Value::Nil => None,
                Value::Model(model) => {
                    check_type(&class, &model)?;
                    Some(model)
                }
                attributes => Some(Model::new(&class, attributes)?),
            },
            data @ Value::Dict(_) => Some(Model::instantiate(&class, data)?),
            other => {
                return Err(ModelError::Argument(format!(
                    "{} expects a dict in its backing attribute, got {}",
                    self.reflection.name(),
                    other.describe()
                )))
            }
        };
        if let Some(child) = &target {
            child.embed_into(&owner, self.reflection.name());
        }
        Ok(target)
    }

    fn set_target(&self, target: Option<Model>) {
        let mut state = self.state.borrow_mut();
        state.target = target;
        state.loaded = true;
    }

    /// A new child from `attributes`, replacing the current target in memory.
    pub fn build(&self, attributes: impl Into<Value>) -> Result<Model> {
        let owner = self.owner()?;
        let child = Model::new(&self.reflection.klass()?, attributes)?;
        child.embed_into(&owner, self.reflection.name());
        self.set_target(Some(child.clone()));
        Ok(child)
    }

    pub fn create(&self, attributes: impl Into<Value>) -> Result<Model> {
        let child = self.build(attributes)?;
        child.save()?;
        Ok(child)
    }

    pub fn replace(&self, object: Option<Model>) -> Result<Option<Model>> {
        let owner = self.owner()?;
        if let Some(child) = &object {
            check_type(&self.reflection.klass()?, child)?;
            child.embed_into(&owner, self.reflection.name());
        }
        self.set_target(object.clone());
        Ok(object)
    }

    pub fn reset(&self) {
        *self.state.borrow_mut() = State::default();
    }

    pub fn reload(&self) -> Result<Option<Model>> {
        self.reset();
        self.target()
    }

    /// Write the target into the backing attribute, or clear it when the
    /// target is gone or marked for destruction.
    ///
    /// The child is serialized as it is, without validating it; the owner's
    /// ancestry validation guards that. Only a failure in the child's own
    /// associations makes this return false.
    pub fn apply_changes(&self) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(true);
        }
        let owner = self.owner()?;
        let applied = match self.target()? {
            Some(child) if child.marked_for_destruction() || child.is_destroyed() => {
                if !child.is_destroyed() {
                    child.destroy()?;
                }
                self.set_target(None);
                self.clear_source(&owner)?;
                true
            }
            Some(child) => {
                let applied = child.apply_association_changes()?;
                write_source(&self.reflection, &owner, child.storage_document()?)?;
                child.mark_persisted();
                child.clear_changes();
                applied
            }
            None => {
                self.clear_source(&owner)?;
                true
            }
        };
        tracing::debug!(association = self.reflection.name(), applied, "applied embedded changes");
        Ok(applied)
    }

    fn clear_source(&self, owner: &Model) -> Result<()> {
        if !read_source(&self.reflection, owner)?.is_nil() {
            write_source(&self.reflection, owner, Value::Nil)?;
        }
        Ok(())
    }

    pub fn apply_changes_strict(&self) -> Result<()> {
        if self.apply_changes()? {
            Ok(())
        } else {
            Err(super::changes_not_applied(&self.reflection))
        }
    }

    /// Lifecycle of the embedded child. Only the current target writes.
    pub(crate) fn perform(&self, operation: Operation, child: &Model) -> Result<bool> {
        let is_target = self
            .state
            .borrow()
            .target
            .as_ref()
            .map(|target| target.ptr_eq(child))
            .unwrap_or(false);
        let owner = self.owner()?;
        match operation {
            Operation::Create | Operation::Update => {
                if !is_target {
                    return Ok(false);
                }
                write_source(&self.reflection, &owner, child.storage_document()?)?;
                Ok(true)
            }
            Operation::Destroy => {
                if is_target {
                    write_source(&self.reflection, &owner, Value::Nil)?;
                }
                Ok(true)
            }
        }
    }
}
