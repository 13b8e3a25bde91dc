use super::Model;
use crate::error::{ModelError, Result};

/// A child lifecycle operation redirected to its owning association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Create,
    Update,
    Destroy,
}

type PerformerRef<'a> = &'a dyn Fn(&Model) -> Result<bool>;

impl Model {
    pub fn is_new_record(&self) -> bool {
        !self.0.persisted.get()
    }

    pub fn is_persisted(&self) -> bool {
        self.0.persisted.get() && !self.0.destroyed.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Flag the instance as stored. Adapters call this after writing it.
    pub fn mark_persisted(&self) {
        self.0.persisted.set(true);
        self.0.destroyed.set(false);
    }

    pub(crate) fn reset_lifecycle(&self) {
        self.0.persisted.set(false);
        self.0.destroyed.set(false);
        self.0.marked_for_destruction.set(false);
    }

    pub fn mark_for_destruction(&self) {
        self.0.marked_for_destruction.set(true);
    }

    pub fn marked_for_destruction(&self) -> bool {
        self.0.marked_for_destruction.get()
    }

    /// Validate the whole graph, apply association changes and run the
    /// create or update performer. Returns false when validation, an
    /// association or the performer fails.
    pub fn save(&self) -> Result<bool> {
        self.save_object(None, false)
    }

    pub fn save_strict(&self) -> Result<()> {
        self.save_object(None, true).map(|_| ())
    }

    /// Save with a one-off performer instead of the class performers.
    pub fn save_with<F>(&self, performer: F) -> Result<bool>
    where
        F: Fn(&Model) -> Result<bool>,
    {
        self.save_object(Some(&performer), false)
    }

    pub fn destroy(&self) -> Result<bool> {
        self.destroy_object(None, false)
    }

    pub fn destroy_strict(&self) -> Result<()> {
        self.destroy_object(None, true).map(|_| ())
    }

    pub fn destroy_with<F>(&self, performer: F) -> Result<bool>
    where
        F: Fn(&Model) -> Result<bool>,
    {
        self.destroy_object(Some(&performer), false)
    }

    /// Apply every association's pending changes. All of them are attempted
    /// even when an earlier one fails.
    pub fn apply_association_changes(&self) -> Result<bool> {
        Ok(self.apply_association_changes_reporting()?.is_none())
    }

    pub fn apply_association_changes_strict(&self) -> Result<()> {
        match self.apply_association_changes_reporting()? {
            None => Ok(()),
            Some(association) => Err(ModelError::AssociationChangesNotApplied {
                class: self.class().name().to_string(),
                association,
            }),
        }
    }

    /// Name of the first association that failed, if any.
    fn apply_association_changes_reporting(&self) -> Result<Option<String>> {
        let mut failed = None;
        for reflection in self.class().associations().to_vec() {
            let applied = self.association(reflection.name())?.apply_changes()?;
            if !applied && failed.is_none() {
                failed = Some(reflection.name().to_string());
            }
        }
        Ok(failed)
    }

    fn save_object(&self, performer: Option<PerformerRef<'_>>, strict: bool) -> Result<bool> {
        if !self.valid_ancestry()? {
            tracing::debug!(class = self.class().name(), "save halted by validation");
            if strict {
                return Err(ModelError::Validation(self.errors()));
            }
            return Ok(false);
        }

        if let Some(association) = self.apply_association_changes_reporting()? {
            if strict {
                return Err(ModelError::AssociationChangesNotApplied {
                    class: self.class().name().to_string(),
                    association,
                });
            }
            return Ok(false);
        }

        let performed = match performer {
            Some(performer) => performer(self)?,
            None => self.perform_save()?,
        };
        tracing::debug!(class = self.class().name(), performed, "saved");
        if performed {
            self.mark_persisted();
            self.clear_changes();
        } else if strict {
            return Err(ModelError::ObjectNotSaved(self.class().name().to_string()));
        }
        Ok(performed)
    }

    fn perform_save(&self) -> Result<bool> {
        let operation = if self.is_new_record() {
            Operation::Create
        } else {
            Operation::Update
        };
        if let Some(embedding) = self.embedding() {
            return embedding.perform(operation, self);
        }

        let performers = self.class().performers();
        let specific = match operation {
            Operation::Create => performers.create.clone(),
            _ => performers.update.clone(),
        };
        let performer = specific
            .or_else(|| performers.save.clone())
            .ok_or_else(|| ModelError::UnsavableObject(self.class().name().to_string()))?;
        performer(self)
    }

    fn destroy_object(&self, performer: Option<PerformerRef<'_>>, strict: bool) -> Result<bool> {
        let performed = match performer {
            Some(performer) => performer(self)?,
            None => match self.embedding() {
                Some(embedding) => embedding.perform(Operation::Destroy, self)?,
                None => {
                    let performer = self.class().performers().destroy.clone().ok_or_else(|| {
                        ModelError::UndestroyableObject(self.class().name().to_string())
                    })?;
                    performer(self)?
                }
            },
        };
        tracing::debug!(class = self.class().name(), performed, "destroyed");
        if performed {
            self.0.destroyed.set(true);
            self.0.marked_for_destruction.set(false);
        } else if strict {
            return Err(ModelError::ObjectNotDestroyed(self.class().name().to_string()));
        }
        Ok(performed)
    }
}

#[cfg(test)]
mod tests {
    use crate::attributes::AttributeReflection;
    use crate::error::ModelError;
    use crate::model::{Model, ModelClass};
    use crate::typecast::Type;
    use crate::validations::Validator;
    use crate::value::Value;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn save_without_performer_is_unsavable() {
        let class = ModelClass::builder("Post").build().unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();
        assert!(matches!(model.save(), Err(ModelError::UnsavableObject(_))));
        assert!(matches!(model.destroy(), Err(ModelError::UndestroyableObject(_))));
    }

    #[test]
    fn create_and_update_fall_back_to_save() {
        let creates = Rc::new(Cell::new(0));
        let saves = Rc::new(Cell::new(0));
        let (c, s) = (creates.clone(), saves.clone());
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .define_create(move |_| {
                c.set(c.get() + 1);
                Ok(true)
            })
            .define_save(move |_| {
                s.set(s.get() + 1);
                Ok(true)
            })
            .build()
            .unwrap();

        let model = Model::new(&class, json!({"title": "a"})).unwrap();
        assert!(model.save().unwrap());
        assert!(model.is_persisted());
        assert!(!model.is_changed());
        assert!(model.save().unwrap());
        assert_eq!((creates.get(), saves.get()), (1, 1));
    }

    #[test]
    fn invalid_model_is_not_saved() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .validates("title", Validator::Presence)
            .define_save(|_| Ok(true))
            .build()
            .unwrap();

        let model = Model::new(&class, Value::Nil).unwrap();
        assert!(!model.save().unwrap());
        assert!(model.is_new_record());
        assert_eq!(model.errors().get("title"), ["can't be blank"]);
        assert!(matches!(model.save_strict(), Err(ModelError::Validation(_))));
        assert!(matches!(
            Model::create_strict(&class, Value::Nil),
            Err(ModelError::Validation(_))
        ));
    }

    #[test]
    fn failed_performer_in_strict_mode() {
        let class = ModelClass::builder("Post")
            .define_save(|_| Ok(false))
            .define_destroy(|_| Ok(false))
            .build()
            .unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();
        assert!(!model.save().unwrap());
        assert!(matches!(model.save_strict(), Err(ModelError::ObjectNotSaved(_))));
        assert!(matches!(model.destroy_strict(), Err(ModelError::ObjectNotDestroyed(_))));
    }

    #[test]
    fn block_performers_override_class_performers() {
        let class = ModelClass::builder("Post").build().unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();

        assert!(model.save_with(|_| Ok(true)).unwrap());
        assert!(model.is_persisted());

        model.mark_for_destruction();
        assert!(model.destroy_with(|_| Ok(true)).unwrap());
        assert!(model.is_destroyed());
        assert!(!model.is_persisted());
        assert!(!model.marked_for_destruction());
    }
}
