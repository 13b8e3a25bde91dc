//! # Validation
//!
//! Each class carries a list of [`Validation`]s. [`Model::valid`] runs them
//! against the instance alone; [`Model::valid_ancestry`] also walks embedded
//! associations and is what `save` uses.
//!
//! Error keys move in two directions:
//!
//! - child errors fold *down* into dotted keys on the parent:
//!   `"<association>.<index>.<field>"` for collections,
//!   `"<association>.<field>"` for single children. Children marked for
//!   destruction are skipped.
//! - errors of a represented reference fold *up*: `"<reference>.<column>"`
//!   moves to the represented attribute's own name.

mod errors;
mod validators;

pub use errors::Errors;
pub use validators::{CustomValidator, Validation, Validator};

use crate::attributes::AttributeKind;
use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::value::Value;

impl Model {
    /// Errors from the last validation run.
    pub fn errors(&self) -> Errors {
        self.0.errors.borrow().clone()
    }

    pub fn add_error(&self, key: impl Into<String>, message: impl Into<String>) {
        self.0.errors.borrow_mut().add(key, message);
    }

    /// Run the class validations, including explicitly nested ones.
    pub fn valid(&self) -> Result<bool> {
        let mut errors = self.run_validations()?;
        self.emerge_represented(&mut errors);
        Ok(self.store_errors(errors))
    }

    pub fn invalid(&self) -> Result<bool> {
        Ok(!self.valid()?)
    }

    pub fn validate_strict(&self) -> Result<()> {
        if self.valid()? {
            Ok(())
        } else {
            Err(ModelError::Validation(self.errors()))
        }
    }

    /// Run the class validations and validate every embedded association.
    pub fn valid_ancestry(&self) -> Result<bool> {
        let mut errors = self.run_validations()?;
        let explicit: Vec<String> = self
            .class()
            .validations()
            .iter()
            .filter_map(|v| v.nested_name().map(str::to_string))
            .collect();
        for reflection in self.class().associations().to_vec() {
            if reflection.kind().is_embedded() && !explicit.iter().any(|n| n == reflection.name()) {
                self.validate_nested(reflection.name(), &mut errors)?;
            }
        }
        self.emerge_represented(&mut errors);
        Ok(self.store_errors(errors))
    }

    pub fn validate_ancestry_strict(&self) -> Result<()> {
        if self.valid_ancestry()? {
            Ok(())
        } else {
            Err(ModelError::Validation(self.errors()))
        }
    }

    fn store_errors(&self, errors: Errors) -> bool {
        let valid = errors.is_empty();
        *self.0.errors.borrow_mut() = errors;
        valid
    }

    fn run_validations(&self) -> Result<Errors> {
        let mut errors = Errors::new();
        for validation in self.class().validations().to_vec() {
            match validation {
                Validation::Attribute { name, validator } => {
                    if let Some(message) = validator.check(&self.get(&name)?) {
                        errors.add(name, message);
                    }
                }
                Validation::Custom(f) => f(self, &mut errors)?,
                Validation::Nested(name) => self.validate_nested(&name, &mut errors)?,
                Validation::Associated(name) => {
                    let mut invalid = false;
                    for child in self.get(&name)?.models() {
                        if !child.marked_for_destruction() && !child.valid()? {
                            invalid = true;
                        }
                    }
                    if invalid {
                        errors.add(name, "is invalid");
                    }
                }
            }
        }
        Ok(errors)
    }

    fn validate_nested(&self, name: &str, errors: &mut Errors) -> Result<()> {
        match self.get(name)? {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Value::Model(child) = item {
                        let prefix = format!("{}.{}", name, index);
                        Self::import_child(child, &prefix, errors)?;
                    }
                }
            }
            Value::Model(child) => Self::import_child(&child, name, errors)?,
            _ => {}
        }
        Ok(())
    }

    fn import_child(child: &Model, prefix: &str, errors: &mut Errors) -> Result<()> {
        if child.marked_for_destruction() {
            return Ok(());
        }
        if !child.valid_ancestry()? {
            errors.import(&child.errors(), Some(prefix));
        }
        Ok(())
    }

    fn emerge_represented(&self, errors: &mut Errors) {
        for reflection in self.class().attributes() {
            if reflection.kind() != AttributeKind::Represents {
                continue;
            }
            let key = format!(
                "{}.{}",
                reflection.reference().unwrap_or_default(),
                reflection.column_name()
            );
            for message in errors.delete(&key) {
                if !errors.get(reflection.name()).contains(&message) {
                    errors.add(reflection.name(), message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeReflection;
    use crate::model::ModelClass;
    use crate::typecast::Type;
    use serde_json::json;

    #[test]
    fn custom_validator_adds_errors() {
        let class = ModelClass::builder("Range")
            .attribute(AttributeReflection::new("from", Type::Integer))
            .attribute(AttributeReflection::new("to", Type::Integer))
            .validate(|model, errors| {
                let from = model.get("from")?.as_i64().unwrap_or(0);
                let to = model.get("to")?.as_i64().unwrap_or(0);
                if from > to {
                    errors.add("base", "from must not exceed to");
                }
                Ok(())
            })
            .build()
            .unwrap();

        let model = Model::new(&class, json!({"from": 5, "to": 1})).unwrap();
        assert!(!model.valid().unwrap());
        assert_eq!(model.errors().full_messages(), vec!["from must not exceed to".to_string()]);
        assert!(matches!(model.validate_strict(), Err(ModelError::Validation(_))));

        model.set("to", 9).unwrap();
        assert!(model.valid().unwrap());
        assert!(model.errors().is_empty());
    }
}
