use super::{check_type, upgrade_owner, AssociationReflection};
use crate::adapter::Adapter;
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelInner};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct State {
    target: Option<Model>,
    loaded: bool,
}

/// One adapter record linked through a foreign key attribute.
pub struct ReferencesOne {
    owner: Weak<ModelInner>,
    reflection: Rc<AssociationReflection>,
    state: RefCell<State>,
}

impl ReferencesOne {
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

    fn adapter(&self) -> Result<&Rc<dyn Adapter>> {
        self.reflection.require_adapter()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().loaded
    }

    fn read_key(&self, owner: &Model) -> Result<Value> {
        owner.read_attribute(&self.reflection.foreign_key_name())
    }

    fn write_key(&self, owner: &Model, key: Value) -> Result<()> {
        owner.write_attribute(&self.reflection.foreign_key_name(), key)
    }

    fn identify(&self, object: Option<&Model>) -> Result<Value> {
        let adapter = self.adapter()?;
        Ok(object.and_then(|o| adapter.identify(o)).unwrap_or_default())
    }

    /// Whether the stored key no longer matches the cached target.
    fn source_changed(&self, owner: &Model) -> Result<bool> {
        let target = self.state.borrow().target.clone();
        Ok(self.read_key(owner)? != self.identify(target.as_ref())?)
    }

    pub fn target(&self) -> Result<Option<Model>> {
        let owner = self.owner()?;
        if !self.is_loaded() || self.source_changed(&owner)? {
            let target = self.load(&owner)?;
            self.set_target(target);
        }
        Ok(self.state.borrow().target.clone())
    }

    fn load(&self, owner: &Model) -> Result<Option<Model>> {
        let key = self.read_key(owner)?;
        if key.is_nil() {
            return Ok(None);
        }
        let adapter = self.adapter()?;
        let scope = self
            .reflection
            .apply_scope(owner, adapter.scope(owner, vec![key.clone()]));
        adapter.find_one(&scope, &key)
    }

    fn set_target(&self, target: Option<Model>) {
        let mut state = self.state.borrow_mut();
        state.target = target;
        state.loaded = true;
    }

    /// Link `object` (which must already be persisted) or unlink with `None`.
    /// The foreign key is written immediately.
    pub fn replace(&self, object: Option<Model>) -> Result<Option<Model>> {
        let owner = self.owner()?;
        let key = match &object {
            Some(object) => {
                check_type(&self.reflection.klass()?, object)?;
                let key = self.identify(Some(object))?;
                if key.is_nil() {
                    return Err(ModelError::AssociationObjectNotPersisted {
                        class: object.class().name().to_string(),
                        association: self.reflection.name().to_string(),
                    });
                }
                key
            }
            None => Value::Nil,
        };
        self.set_target(object.clone());
        self.write_key(&owner, key)?;
        Ok(object)
    }

    /// A new, unsaved target. The foreign key is cleared until it is saved.
    pub fn build(&self, attributes: impl Into<Value>) -> Result<Model> {
        let owner = self.owner()?;
        let object = self.adapter()?.build(attributes.into())?;
        self.set_target(Some(object.clone()));
        self.write_key(&owner, Value::Nil)?;
        Ok(object)
    }

    pub fn create(&self, attributes: impl Into<Value>) -> Result<Model> {
        let owner = self.owner()?;
        let object = self.build(attributes)?;
        if self.adapter()?.persist(&object, false)? {
            self.write_key(&owner, self.identify(Some(&object))?)?;
        }
        Ok(object)
    }

    pub fn reset(&self) {
        *self.state.borrow_mut() = State::default();
    }

    pub fn reload(&self) -> Result<Option<Model>> {
        self.reset();
        self.target()
    }

    /// Write the foreign key from the target, persisting a new or changed
    /// target first when autosave is on.
    pub fn apply_changes(&self) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(true);
        }
        let owner = self.owner()?;
        let target = self.state.borrow().target.clone();
        let applied = match target {
            None => true,
            Some(object) if object.marked_for_destruction() => {
                self.set_target(None);
                self.write_key(&owner, Value::Nil)?;
                true
            }
            Some(object) => {
                let mut persisted = true;
                if self.reflection.is_autosave() && (object.is_new_record() || object.is_changed()) {
                    persisted = self.adapter()?.persist(&object, false)?;
                }
                self.write_key(&owner, self.identify(Some(&object))?)?;
                persisted
            }
        };
        tracing::debug!(association = self.reflection.name(), applied, "applied reference changes");
        Ok(applied)
    }

    pub fn apply_changes_strict(&self) -> Result<()> {
        if self.apply_changes()? {
            Ok(())
        } else {
            Err(super::changes_not_applied(&self.reflection))
        }
    }
}
