use super::Model;
use crate::error::Result;
use crate::value::{Dict, Value};

impl Model {
    /// Record a change, forgetting it again when the value returns to the
    /// original.
    pub(crate) fn track_change(&self, name: &str, old: Value, new: Value) {
        let mut changes = self.0.changes.borrow_mut();
        match changes.iter().position(|(changed, _)| changed == name) {
            Some(index) if changes[index].1 == new => {
                changes.remove(index);
            }
            Some(_) => {}
            None if old != new => changes.push((name.to_string(), old)),
            None => {}
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.0.changes.borrow().is_empty()
    }

    /// Names of changed attributes, in the order they first changed.
    pub fn changed(&self) -> Vec<String> {
        self.0
            .changes
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Changed attribute name to `[old, new]`.
    pub fn changes(&self) -> Result<Dict> {
        let originals = self.0.changes.borrow().clone();
        let mut changes = Dict::new();
        for (name, old) in originals {
            let new = self.read_attribute(&name)?;
            changes.insert(name, Value::Array(vec![old, new]));
        }
        Ok(changes)
    }

    pub fn attribute_changed(&self, name: &str) -> Result<bool> {
        let reflection = self.reflection(name)?;
        Ok(self
            .0
            .changes
            .borrow()
            .iter()
            .any(|(changed, _)| changed == reflection.name()))
    }

    /// The value before the first unsaved change, or the current value.
    pub fn attribute_was(&self, name: &str) -> Result<Value> {
        let reflection = self.reflection(name)?;
        let original = self
            .0
            .changes
            .borrow()
            .iter()
            .find(|(changed, _)| changed == reflection.name())
            .map(|(_, old)| old.clone());
        match original {
            Some(old) => Ok(old),
            None => self.read_reflection(&reflection),
        }
    }

    pub fn clear_changes(&self) {
        self.0.changes.borrow_mut().clear();
    }

    /// Put every changed attribute back to its original value.
    pub fn restore_attributes(&self) -> Result<()> {
        let originals = std::mem::take(&mut *self.0.changes.borrow_mut());
        for (name, old) in originals {
            let reflection = self.reflection(&name)?;
            self.write_cell(&reflection, old);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::attributes::AttributeReflection;
    use crate::model::{Model, ModelClass};
    use crate::typecast::Type;
    use crate::value::Value;
    use serde_json::json;

    fn post() -> Model {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .attribute(AttributeReflection::new("views", Type::Integer).default(0))
            .build()
            .unwrap();
        Model::instantiate(&class, json!({"title": "first", "views": 1})).unwrap()
    }

    #[test]
    fn tracks_changes_against_original() {
        let model = post();
        assert!(!model.is_changed());

        model.set("title", "second").unwrap();
        model.set("title", "third").unwrap();
        assert_eq!(model.changed(), vec!["title".to_string()]);
        assert_eq!(model.attribute_was("title").unwrap(), Value::from("first"));
        assert_eq!(
            model.changes().unwrap().get("title"),
            Some(&Value::Array(vec!["first".into(), "third".into()]))
        );
    }

    #[test]
    fn writing_back_the_original_clears_the_change() {
        let model = post();
        model.set("views", "2").unwrap();
        assert!(model.attribute_changed("views").unwrap());
        model.set("views", 1).unwrap();
        assert!(!model.attribute_changed("views").unwrap());
        assert!(!model.is_changed());
    }

    #[test]
    fn restore_attributes_reverts() {
        let model = post();
        model.set("title", "changed").unwrap();
        model.restore_attributes().unwrap();
        assert_eq!(model.get("title").unwrap(), Value::from("first"));
        assert!(!model.is_changed());
    }
}
