use super::{check_type, upgrade_owner, AssociationReflection};
use crate::adapter::Adapter;
use crate::error::{ModelError, Result};
use crate::model::{Model, ModelInner};
use crate::value::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Default)]
struct State {
    target: Vec<Model>,
    /// Stored key list the target was last loaded from or written as.
    keys: Vec<Value>,
    loaded: bool,
}

/// Adapter records linked through an ordered list of keys.
///
/// The key list is always re-derived from the target after a mutation;
/// targets the adapter cannot identify yet (built, awaiting autosave) are left
/// out of it. The target reloads only when the stored key list changes behind
/// the runtime's back.
pub struct ReferencesMany {
    owner: Weak<ModelInner>,
    reflection: Rc<AssociationReflection>,
    state: RefCell<State>,
}

impl ReferencesMany {
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

    fn read_keys(&self, owner: &Model) -> Result<Vec<Value>> {
        let keys = owner.read_attribute(&self.reflection.foreign_key_name())?;
        Ok(keys
            .into_array()
            .unwrap_or_default()
            .into_iter()
            .filter(|key| !key.is_nil())
            .collect())
    }

    fn write_keys(&self, owner: &Model) -> Result<()> {
        let keys = self.identify()?;
        owner.write_attribute(&self.reflection.foreign_key_name(), Value::Array(keys))?;
        let stored = self.read_keys(owner)?;
        self.state.borrow_mut().keys = stored;
        Ok(())
    }

    /// Keys of the current in-memory targets, skipping unidentifiable ones.
    pub fn identify(&self) -> Result<Vec<Value>> {
        let adapter = self.adapter()?;
        Ok(self
            .state
            .borrow()
            .target
            .iter()
            .filter_map(|object| adapter.identify(object))
            .collect())
    }

    pub fn target(&self) -> Result<Vec<Model>> {
        let owner = self.owner()?;
        let keys = self.read_keys(&owner)?;
        let stale = {
            let state = self.state.borrow();
            !state.loaded || state.keys != keys
        };
        if stale {
            let target = self.load(&owner, &keys)?;
            self.set_target(target);
            self.state.borrow_mut().keys = keys;
        }
        Ok(self.state.borrow().target.clone())
    }

    /// Keys without a record (deleted, or outside the scope) load nothing.
    fn load(&self, owner: &Model, keys: &[Value]) -> Result<Vec<Model>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let adapter = self.adapter()?;
        let scope = self
            .reflection
            .apply_scope(owner, adapter.scope(owner, keys.to_vec()));
        adapter.find_all(&scope, keys)
    }

    fn set_target(&self, target: Vec<Model>) {
        let mut state = self.state.borrow_mut();
        state.target = target;
        state.loaded = true;
    }

    /// Objects must be of the target class and, unless autosave will persist
    /// them, already identifiable by the adapter.
    fn check_linkable(&self, objects: &[Model]) -> Result<()> {
        let class = self.reflection.klass()?;
        let adapter = self.adapter()?;
        for object in objects {
            check_type(&class, object)?;
            if !self.reflection.is_autosave() && adapter.identify(object).is_none() {
                return Err(ModelError::AssociationObjectNotPersisted {
                    class: object.class().name().to_string(),
                    association: self.reflection.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Append objects not already in the target (by identity).
    pub fn concat(&self, objects: Vec<Model>) -> Result<Vec<Model>> {
        let owner = self.owner()?;
        self.check_linkable(&objects)?;
        self.target()?;
        {
            let mut state = self.state.borrow_mut();
            for object in objects {
                if !state.target.iter().any(|existing| existing.ptr_eq(&object)) {
                    state.target.push(object);
                }
            }
        }
        self.write_keys(&owner)?;
        self.target()
    }

    pub fn replace(&self, objects: Vec<Model>) -> Result<Vec<Model>> {
        let owner = self.owner()?;
        self.check_linkable(&objects)?;
        let mut target: Vec<Model> = Vec::with_capacity(objects.len());
        for object in objects {
            if !target.iter().any(|existing| existing.ptr_eq(&object)) {
                target.push(object);
            }
        }
        self.set_target(target);
        self.write_keys(&owner)?;
        self.target()
    }

    /// Unlink `object`. Returns whether it was linked.
    pub fn delete(&self, object: &Model) -> Result<bool> {
        let owner = self.owner()?;
        self.target()?;
        let removed = {
            let mut state = self.state.borrow_mut();
            let before = state.target.len();
            state.target.retain(|existing| !existing.ptr_eq(object));
            state.target.len() != before
        };
        self.write_keys(&owner)?;
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let owner = self.owner()?;
        self.set_target(Vec::new());
        self.write_keys(&owner)
    }

    pub fn build(&self, attributes: impl Into<Value>) -> Result<Model> {
        let object = self.adapter()?.build(attributes.into())?;
        self.target()?;
        self.state.borrow_mut().target.push(object.clone());
        Ok(object)
    }

    pub fn create(&self, attributes: impl Into<Value>) -> Result<Model> {
        let owner = self.owner()?;
        let object = self.build(attributes)?;
        self.adapter()?.persist(&object, false)?;
        self.write_keys(&owner)?;
        Ok(object)
    }

    pub fn reset(&self) {
        *self.state.borrow_mut() = State::default();
    }

    pub fn reload(&self) -> Result<Vec<Model>> {
        self.reset();
        self.target()
    }

    /// Drop targets marked for destruction, persist new or changed ones when
    /// autosave is on (all are attempted), then rewrite the key list.
    pub fn apply_changes(&self) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(true);
        }
        let owner = self.owner()?;
        let targets = self.state.borrow().target.clone();
        let mut applied = true;
        let mut kept = Vec::with_capacity(targets.len());
        for object in targets {
            if object.marked_for_destruction() {
                continue;
            }
            if self.reflection.is_autosave() && (object.is_new_record() || object.is_changed()) {
                applied &= self.adapter()?.persist(&object, false)?;
            }
            kept.push(object);
        }
        self.set_target(kept);
        self.write_keys(&owner)?;
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
