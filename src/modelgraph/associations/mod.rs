//! # Associations
//!
//! | Kind | Stored in | Target |
//! |------|-----------|--------|
//! | `embeds_one` | backing attribute `<name>` (a dict) | one child |
//! | `embeds_many` | backing attribute `<name>` (an array of dicts) | ordered children |
//! | `references_one` | `<name>_id` | one adapter record |
//! | `references_many` | `<singular>_ids` | ordered adapter records |
//!
//! Declarations are [`AssociationReflection`]s. Each instance gets one
//! runtime per association ([`Association`]), created on first access,
//! which loads its target lazily from the stored form and writes changes back
//! when `apply_changes` runs (as part of the owner's save).
//!
//! Embedded backing attributes hold the structured document by default. A
//! JSON string found there is decoded on read. `read_with` / `write_with`
//! replace both directions.
//!
//! Runtimes keep only a weak reference to their owner, and embedded children
//! keep only a weak reference back to the runtime's owner.

mod embeds_many;
mod embeds_one;
mod reflection;
mod references_many;
mod references_one;

pub use embeds_many::EmbedsMany;
pub use embeds_one::EmbedsOne;
pub use reflection::{AssociationKind, AssociationReflection, ScopeFn, SourceReader, SourceWriter, Target};
pub use references_many::ReferencesMany;
pub use references_one::ReferencesOne;

use crate::error::{ModelError, Result};
use crate::model::{Model, ModelClass, ModelInner};
use crate::value::Value;
use std::rc::{Rc, Weak};

/// Runtime of one association on one owner instance.
#[derive(Clone)]
pub enum Association {
    EmbedsOne(Rc<EmbedsOne>),
    EmbedsMany(Rc<EmbedsMany>),
    ReferencesOne(Rc<ReferencesOne>),
    ReferencesMany(Rc<ReferencesMany>),
}

impl Association {
    pub(crate) fn new(owner: &Model, reflection: Rc<AssociationReflection>) -> Self {
        let owner = owner.downgrade();
        match reflection.kind() {
            AssociationKind::EmbedsOne => Association::EmbedsOne(Rc::new(EmbedsOne::new(owner, reflection))),
            AssociationKind::EmbedsMany => Association::EmbedsMany(Rc::new(EmbedsMany::new(owner, reflection))),
            AssociationKind::ReferencesOne => {
                Association::ReferencesOne(Rc::new(ReferencesOne::new(owner, reflection)))
            }
            AssociationKind::ReferencesMany => {
                Association::ReferencesMany(Rc::new(ReferencesMany::new(owner, reflection)))
            }
        }
    }

    pub fn reflection(&self) -> &Rc<AssociationReflection> {
        match self {
            Association::EmbedsOne(a) => a.reflection(),
            Association::EmbedsMany(a) => a.reflection(),
            Association::ReferencesOne(a) => a.reflection(),
            Association::ReferencesMany(a) => a.reflection(),
        }
    }

    pub fn name(&self) -> &str {
        self.reflection().name()
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Association::EmbedsOne(a) => a.is_loaded(),
            Association::EmbedsMany(a) => a.is_loaded(),
            Association::ReferencesOne(a) => a.is_loaded(),
            Association::ReferencesMany(a) => a.is_loaded(),
        }
    }

    /// The target as a value: a model or nil for singular associations, an
    /// array of models for collections.
    pub fn reader(&self) -> Result<Value> {
        Ok(match self {
            Association::EmbedsOne(a) => a.target()?.into(),
            Association::EmbedsMany(a) => models_value(a.target()?),
            Association::ReferencesOne(a) => a.target()?.into(),
            Association::ReferencesMany(a) => models_value(a.target()?),
        })
    }

    /// Replace the target with a model, nil, or an array of models.
    pub fn writer(&self, value: Value) -> Result<()> {
        match self {
            Association::EmbedsOne(a) => {
                a.replace(single(self.reflection(), value)?)?;
            }
            Association::ReferencesOne(a) => {
                a.replace(single(self.reflection(), value)?)?;
            }
            Association::EmbedsMany(a) => a.replace_strict(many(self.reflection(), value)?)?,
            Association::ReferencesMany(a) => {
                a.replace(many(self.reflection(), value)?)?;
            }
        }
        Ok(())
    }

    /// Targets as a list, whatever the arity.
    pub fn target_models(&self) -> Result<Vec<Model>> {
        Ok(match self {
            Association::EmbedsOne(a) => a.target()?.into_iter().collect(),
            Association::EmbedsMany(a) => a.target()?,
            Association::ReferencesOne(a) => a.target()?.into_iter().collect(),
            Association::ReferencesMany(a) => a.target()?,
        })
    }

    pub fn build(&self, attributes: impl Into<Value>) -> Result<Model> {
        match self {
            Association::EmbedsOne(a) => a.build(attributes),
            Association::EmbedsMany(a) => a.build(attributes),
            Association::ReferencesOne(a) => a.build(attributes),
            Association::ReferencesMany(a) => a.build(attributes),
        }
    }

    pub fn create(&self, attributes: impl Into<Value>) -> Result<Model> {
        match self {
            Association::EmbedsOne(a) => a.create(attributes),
            Association::EmbedsMany(a) => a.create(attributes),
            Association::ReferencesOne(a) => a.create(attributes),
            Association::ReferencesMany(a) => a.create(attributes),
        }
    }

    pub fn reload(&self) -> Result<Value> {
        self.reset();
        self.reader()
    }

    pub fn reset(&self) {
        match self {
            Association::EmbedsOne(a) => a.reset(),
            Association::EmbedsMany(a) => a.reset(),
            Association::ReferencesOne(a) => a.reset(),
            Association::ReferencesMany(a) => a.reset(),
        }
    }

    pub fn apply_changes(&self) -> Result<bool> {
        match self {
            Association::EmbedsOne(a) => a.apply_changes(),
            Association::EmbedsMany(a) => a.apply_changes(),
            Association::ReferencesOne(a) => a.apply_changes(),
            Association::ReferencesMany(a) => a.apply_changes(),
        }
    }

    pub fn apply_changes_strict(&self) -> Result<()> {
        if self.apply_changes()? {
            Ok(())
        } else {
            Err(self.not_applied())
        }
    }

    fn not_applied(&self) -> ModelError {
        changes_not_applied(self.reflection())
    }

    pub fn as_embeds_one(&self) -> Option<&Rc<EmbedsOne>> {
        match self {
            Association::EmbedsOne(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_embeds_many(&self) -> Option<&Rc<EmbedsMany>> {
        match self {
            Association::EmbedsMany(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_references_one(&self) -> Option<&Rc<ReferencesOne>> {
        match self {
            Association::ReferencesOne(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_references_many(&self) -> Option<&Rc<ReferencesMany>> {
        match self {
            Association::ReferencesMany(a) => Some(a),
            _ => None,
        }
    }
}

pub(crate) fn changes_not_applied(reflection: &AssociationReflection) -> ModelError {
    ModelError::AssociationChangesNotApplied {
        class: reflection
            .klass()
            .map(|class| class.name().to_string())
            .unwrap_or_default(),
        association: reflection.name().to_string(),
    }
}

fn models_value(models: Vec<Model>) -> Value {
    Value::Array(models.into_iter().map(Value::Model).collect())
}

fn single(reflection: &AssociationReflection, value: Value) -> Result<Option<Model>> {
    match value {
        Value::Nil => Ok(None),
        Value::Model(model) => Ok(Some(model)),
        other => Err(type_mismatch(reflection, &other)),
    }
}

fn many(reflection: &AssociationReflection, value: Value) -> Result<Vec<Model>> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Model(model) => Ok(model),
                other => Err(type_mismatch(reflection, &other)),
            })
            .collect(),
        other => Err(type_mismatch(reflection, &other)),
    }
}

pub(crate) fn type_mismatch(reflection: &AssociationReflection, got: &Value) -> ModelError {
    ModelError::AssociationTypeMismatch {
        expected: reflection
            .klass()
            .map(|class| class.name().to_string())
            .unwrap_or_else(|_| reflection.name().to_string()),
        got: got.describe(),
    }
}

/// Fail with a type mismatch unless `object` is an instance of `class`.
pub(crate) fn check_type(class: &Rc<ModelClass>, object: &Model) -> Result<()> {
    if object.class().is_a(class) {
        Ok(())
    } else {
        Err(ModelError::AssociationTypeMismatch {
            expected: class.name().to_string(),
            got: object.class().name().to_string(),
        })
    }
}

pub(crate) fn upgrade_owner(owner: &Weak<ModelInner>, reflection: &AssociationReflection) -> Result<Model> {
    owner
        .upgrade()
        .map(Model)
        .ok_or_else(|| ModelError::OwnerReleased(reflection.name().to_string()))
}

/// Stored form of an embedded association.
pub(crate) fn read_source(reflection: &AssociationReflection, owner: &Model) -> Result<Value> {
    if let Some(reader) = reflection.reader() {
        return reader(reflection, owner);
    }
    match owner.read_attribute(reflection.name())? {
        Value::String(encoded) if encoded.trim().is_empty() => Ok(Value::Nil),
        Value::String(encoded) => {
            let json: serde_json::Value = serde_json::from_str(&encoded)?;
            Ok(Value::from_json(json))
        }
        raw => Ok(raw),
    }
}

pub(crate) fn write_source(reflection: &AssociationReflection, owner: &Model, value: Value) -> Result<()> {
    match reflection.writer() {
        Some(writer) => writer(reflection, owner, value),
        None => owner.write_attribute(reflection.name(), value),
    }
}

/// Run `body` against the stored form; restore the snapshot and reload when
/// it fails or reports failure.
pub(crate) fn transaction<F, R>(
    reflection: &AssociationReflection,
    owner: &Model,
    reload: R,
    body: F,
) -> Result<bool>
where
    F: FnOnce() -> Result<bool>,
    R: Fn() -> Result<()>,
{
    let snapshot = read_source(reflection, owner)?;
    let outcome = body();
    if matches!(outcome, Ok(true)) {
        return outcome;
    }
    tracing::warn!(
        class = owner.class().name(),
        association = reflection.name(),
        "rolling back association changes"
    );
    write_source(reflection, owner, snapshot)?;
    reload()?;
    outcome
}

/// `line_items` becomes `line_item`.
pub(crate) fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = name.strip_suffix("ses") {
        format!("{}s", stem)
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

/// `line_items` becomes `LineItem`.
pub(crate) fn classify(name: &str) -> String {
    singularize(name)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
