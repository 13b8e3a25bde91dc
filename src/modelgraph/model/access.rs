//! Generic attribute access: the read pipeline, writes, bulk assignment and
//! accessor-name dispatch.

use super::Model;
use crate::attributes::{AttributeKind, AttributeReflection};
use crate::config;
use crate::error::{ModelError, Result};
use crate::value::{Dict, Value};
use std::rc::Rc;

const NESTED_SUFFIX: &str = "_attributes";
const TRANSLATIONS_SUFFIX: &str = "_translations";

impl Model {
    pub(crate) fn reflection(&self, name: &str) -> Result<Rc<AttributeReflection>> {
        self.class()
            .attribute(name)
            .cloned()
            .ok_or_else(|| self.undefined(name))
    }

    fn undefined(&self, name: &str) -> ModelError {
        ModelError::UndefinedAttribute {
            class: self.class().name().to_string(),
            name: name.to_string(),
        }
    }

    fn localized_stem<'a>(&self, name: &'a str) -> Option<&'a str> {
        let stem = name.strip_suffix(TRANSLATIONS_SUFFIX)?;
        self.class()
            .attribute(stem)
            .filter(|r| r.kind() == AttributeKind::Localized)
            .map(|_| stem)
    }

    fn nested_stem<'a>(&self, name: &'a str) -> Option<&'a str> {
        let stem = name.strip_suffix(NESTED_SUFFIX)?;
        self.class().nested_attributes_options(stem).map(|_| stem)
    }

    /// Read through the accessor named `name`: associations yield their
    /// targets, localized attributes the current locale's translation.
    pub fn get(&self, name: &str) -> Result<Value> {
        if self.class().association(name).is_some() {
            return self.association(name)?.reader();
        }
        if let Some(reflection) = self.class().attribute(name).cloned() {
            return match reflection.kind() {
                AttributeKind::Localized => self.read_translation(&reflection),
                _ => self.read_reflection(&reflection),
            };
        }
        if let Some(stem) = self.localized_stem(name) {
            return self.read_attribute(stem);
        }
        Err(self.undefined(name))
    }

    /// Write through the accessor named `name`. Accepts association names,
    /// `<association>_attributes` and `<localized>_translations`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if self.class().association(name).is_some() {
            return self.association(name)?.writer(value);
        }
        if let Some(reflection) = self.class().attribute(name).cloned() {
            return match reflection.kind() {
                AttributeKind::Localized => self.write_translation(&reflection, value),
                _ => self.write_attribute(name, value),
            };
        }
        if let Some(stem) = self.nested_stem(name) {
            return self.assign_nested_attributes(stem, value);
        }
        if let Some(stem) = self.localized_stem(name) {
            return self.write_attribute(stem, value);
        }
        Err(self.undefined(name))
    }

    fn accepts(&self, name: &str) -> bool {
        self.class().association(name).is_some()
            || self.class().has_attribute(name)
            || self.localized_stem(name).is_some()
    }

    /// Bulk assignment. Plain attributes and associations go first, nested
    /// attributes second and represented attributes last, so that
    /// represented values land on references assigned in the same call.
    /// Unknown keys are ignored.
    pub fn assign_attributes(&self, attributes: impl Into<Value>) -> Result<()> {
        let attributes = match attributes.into() {
            Value::Nil => return Ok(()),
            Value::Dict(attributes) => attributes,
            other => {
                return Err(ModelError::Argument(format!(
                    "expected attributes as a dict, got {}",
                    other.describe()
                )))
            }
        };

        let mut nested = Vec::new();
        let mut represented = Vec::new();
        for (key, value) in attributes {
            let is_represented = self
                .class()
                .attribute(&key)
                .map(|r| r.kind() == AttributeKind::Represents)
                .unwrap_or(false);
            if self.nested_stem(&key).is_some() {
                nested.push((key, value));
            } else if is_represented {
                represented.push((key, value));
            } else if self.accepts(&key) {
                self.set(&key, value)?;
            } else {
                tracing::debug!(class = self.class().name(), attribute = %key, "ignoring unknown attribute");
            }
        }
        for (key, value) in nested.into_iter().chain(represented) {
            self.set(&key, value)?;
        }
        Ok(())
    }

    pub fn read_attribute(&self, name: &str) -> Result<Value> {
        let reflection = self.reflection(name)?;
        self.read_reflection(&reflection)
    }

    /// The typecast value, computed once per write and cached.
    pub(crate) fn read_reflection(&self, reflection: &AttributeReflection) -> Result<Value> {
        if reflection.kind() == AttributeKind::Represents {
            return self.read_represented(reflection);
        }
        Ok(self.read_cached(reflection)?.1)
    }

    /// `(before_type_cast, value)` for a locally stored attribute.
    fn read_cached(&self, reflection: &AttributeReflection) -> Result<(Value, Value)> {
        let (raw, from_storage) = {
            let cells = self.0.cells.borrow();
            match cells.get(reflection.name()) {
                Some(cell) => {
                    if let Some((before, value)) = cell.cached() {
                        return Ok((before.clone(), value.clone()));
                    }
                    (cell.raw().clone(), cell.from_storage())
                }
                None => (Value::Nil, false),
            }
        };

        let before = if !from_storage && reflection.is_absent(&raw) {
            reflection.default_value(self)
        } else {
            raw
        };
        let value = reflection.cast(self, &before)?;
        self.0
            .cells
            .borrow_mut()
            .entry(reflection.name().to_string())
            .or_default()
            .store(before.clone(), value.clone(), None);
        Ok((before, value))
    }

    fn represented_target(&self, reflection: &AttributeReflection) -> Result<Option<Model>> {
        let reference = reflection.reference().unwrap_or_default();
        Ok(self.get(reference)?.into_model())
    }

    fn read_represented(&self, reflection: &AttributeReflection) -> Result<Value> {
        let Some(target) = self.represented_target(reflection)? else {
            if let Some(cell) = self.0.cells.borrow_mut().get_mut(reflection.name()) {
                if cell.has_source() {
                    cell.invalidate();
                }
            }
            return Ok(self.read_cached(reflection)?.1);
        };

        let source = target.read_attribute(reflection.column_name())?;
        if let Some(value) = self
            .0
            .cells
            .borrow()
            .get(reflection.name())
            .and_then(|cell| cell.cached_for_source(&source))
        {
            return Ok(value.clone());
        }

        let before = if reflection.is_absent(&source) {
            reflection.default_value(self)
        } else {
            source.clone()
        };
        let value = reflection.cast(self, &before)?;
        self.0
            .cells
            .borrow_mut()
            .entry(reflection.name().to_string())
            .or_default()
            .store(before, value.clone(), Some(source));
        Ok(value)
    }

    pub fn read_attribute_before_type_cast(&self, name: &str) -> Result<Value> {
        let reflection = self.reflection(name)?;
        if reflection.kind() == AttributeKind::Represents {
            if let Some(target) = self.represented_target(&reflection)? {
                return target.read_attribute_before_type_cast(reflection.column_name());
            }
        }
        Ok(self.read_cached(&reflection)?.0)
    }

    /// Replace the raw value. Readonly attributes discard the write;
    /// represented attributes also write through to their reference.
    pub fn write_attribute(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let reflection = self.reflection(name)?;
        let value = value.into();
        if reflection.is_readonly(self) {
            tracing::debug!(class = self.class().name(), attribute = reflection.name(), "discarding write to readonly attribute");
            return Ok(());
        }

        if reflection.kind() == AttributeKind::Represents {
            if let Some(target) = self.represented_target(&reflection)? {
                target.write_attribute(reflection.column_name(), value.clone())?;
            }
            self.write_cell(&reflection, value);
            return Ok(());
        }

        let old = self.read_reflection(&reflection)?;
        self.write_cell(&reflection, value);
        let new = self.read_reflection(&reflection)?;
        self.track_change(reflection.name(), old, new);
        Ok(())
    }

    pub(crate) fn write_cell(&self, reflection: &AttributeReflection, value: Value) {
        self.0
            .cells
            .borrow_mut()
            .entry(reflection.name().to_string())
            .or_default()
            .write(value);
    }

    fn read_translation(&self, reflection: &AttributeReflection) -> Result<Value> {
        let translations = self.read_reflection(reflection)?;
        let Some(translations) = translations.as_dict() else {
            return Ok(Value::Nil);
        };
        let translation = config::current()
            .locale_chain()
            .iter()
            .filter_map(|locale| translations.get(locale))
            .find(|value| !value.is_nil())
            .cloned();
        Ok(translation.unwrap_or_default())
    }

    fn write_translation(&self, reflection: &AttributeReflection, value: Value) -> Result<()> {
        let mut translations = self
            .read_reflection(reflection)?
            .into_dict()
            .unwrap_or_default();
        translations.insert(config::current().locale, value);
        self.write_attribute(reflection.name(), Value::Dict(translations))
    }

    pub fn attribute_default(&self, name: &str) -> Result<Value> {
        Ok(self.reflection(name)?.default_value(self))
    }

    /// The resolved enum set, if the attribute declares one.
    pub fn attribute_values(&self, name: &str) -> Result<Option<Vec<Value>>> {
        Ok(self.reflection(name)?.enum_values(self))
    }

    /// `false` and zero count as present.
    pub fn is_attribute_present(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_present())
    }

    pub fn came_from_user(&self, name: &str) -> Result<bool> {
        let reflection = self.reflection(name)?;
        Ok(self
            .0
            .cells
            .borrow()
            .get(reflection.name())
            .map(|cell| cell.came_from_user())
            .unwrap_or(false))
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.class()
            .attribute_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Every attribute's typecast value, in declaration order.
    pub fn attributes(&self) -> Result<Dict> {
        let mut attributes = Dict::new();
        for reflection in self.class().attributes() {
            attributes.insert(reflection.name(), self.read_reflection(reflection)?);
        }
        Ok(attributes)
    }

    pub fn primary_value(&self) -> Result<Value> {
        match self.class().primary_attribute() {
            Some(primary) => self.read_reflection(primary),
            None => Ok(Value::Nil),
        }
    }

    /// Dispatch a generated accessor or a declared method by name:
    /// `title`, `title=`, `title?`, `title_before_type_cast`, `title_default`,
    /// `title_values`, `title_was`, `title_changed?`, `title_translations`,
    /// `books_attributes=`.
    pub fn send(&self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(method) = self.class().method(name) {
            return method.call(self, args);
        }
        if let Some(writer) = name.strip_suffix('=') {
            let [value] = args else {
                return Err(arity_error(name, args.len(), 1));
            };
            self.set(writer, value.clone())?;
            return Ok(value.clone());
        }
        if !args.is_empty() {
            return Err(arity_error(name, args.len(), 0));
        }
        if let Some(predicate) = name.strip_suffix('?') {
            if let Some(attribute) = predicate.strip_suffix("_changed") {
                if self.class().has_attribute(attribute) {
                    return Ok(Value::Bool(self.attribute_changed(attribute)?));
                }
            }
            return Ok(Value::Bool(self.is_attribute_present(predicate)?));
        }
        if self.accepts(name) {
            return self.get(name);
        }

        let suffixed = |suffix: &str| {
            name.strip_suffix(suffix)
                .filter(|stem| self.class().has_attribute(stem))
        };
        if let Some(attribute) = suffixed("_before_type_cast") {
            return self.read_attribute_before_type_cast(attribute);
        }
        if let Some(attribute) = suffixed("_default") {
            return self.attribute_default(attribute);
        }
        if let Some(attribute) = suffixed("_values") {
            return Ok(self
                .attribute_values(attribute)?
                .map(Value::Array)
                .unwrap_or_default());
        }
        if let Some(attribute) = suffixed("_was") {
            return self.attribute_was(attribute);
        }
        Err(self.undefined(name))
    }
}

fn arity_error(name: &str, given: usize, expected: usize) -> ModelError {
    ModelError::Argument(format!(
        "wrong number of arguments for {} (given {}, expected {})",
        name, given, expected
    ))
}

#[cfg(test)]
mod tests {
    use crate::attributes::AttributeReflection;
    use crate::model::{Model, ModelClass};
    use crate::typecast::Type;
    use crate::value::Value;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn enum_filters_after_coercion() {
        let class = ModelClass::builder("Rating")
            .attribute(AttributeReflection::new("stars", Type::Integer).enumerate([1, 2, 3]))
            .build()
            .unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();

        model.set("stars", "2").unwrap();
        assert_eq!(model.get("stars").unwrap(), Value::from(2));
        model.set("stars", "9").unwrap();
        assert_eq!(model.get("stars").unwrap(), Value::Nil);
    }

    #[test]
    fn default_blank_applies_to_empty_strings() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String).default("X").default_blank())
            .attribute(AttributeReflection::new("subtitle", Type::String).default("X"))
            .build()
            .unwrap();
        let model = Model::new(&class, json!({"title": "", "subtitle": ""})).unwrap();

        assert_eq!(model.get("title").unwrap(), Value::from("X"));
        assert_eq!(model.get("subtitle").unwrap(), Value::from(""));
    }

    #[test]
    fn readonly_write_is_discarded() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("slug", Type::String).readonly())
            .build()
            .unwrap();
        let model = Model::instantiate(&class, json!({"slug": "first"})).unwrap();
        model.set("slug", "second").unwrap();
        assert_eq!(model.get("slug").unwrap(), Value::from("first"));
    }

    #[test]
    fn before_type_cast_keeps_raw_input() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("views", Type::Integer))
            .build()
            .unwrap();
        let model = Model::new(&class, json!({"views": "12"})).unwrap();
        assert_eq!(model.get("views").unwrap(), Value::from(12));
        assert_eq!(model.read_attribute_before_type_cast("views").unwrap(), Value::from("12"));
        assert!(model.came_from_user("views").unwrap());
    }

    #[test]
    fn computed_default_sees_instance() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .attribute(AttributeReflection::new("slug", Type::String).default_with(|model| {
                let title = model.get("title").unwrap_or_default();
                Value::from(title.to_string().to_lowercase().replace(' ', "-"))
            }))
            .build()
            .unwrap();
        let model = Model::new(&class, json!({"title": "Hello World"})).unwrap();
        assert_eq!(model.get("slug").unwrap(), Value::from("hello-world"));
    }

    #[test]
    fn instantiate_keeps_explicit_nil() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String).default("X"))
            .attribute(AttributeReflection::new("body", Type::String).default("Y"))
            .build()
            .unwrap();
        let model = Model::instantiate(&class, json!({"title": null})).unwrap();
        assert_eq!(model.get("title").unwrap(), Value::Nil);
        assert_eq!(model.get("body").unwrap(), Value::from("Y"));
        assert!(model.is_persisted());
    }

    #[test]
    fn collection_and_dictionary_kinds() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::collection("ids", Type::Integer))
            .attribute(AttributeReflection::dictionary("meta", Type::String).keys(["color"]))
            .build()
            .unwrap();
        let model = Model::new(
            &class,
            json!({"ids": ["1", "x", 3], "meta": {"color": 5, "size": "L"}}),
        )
        .unwrap();

        assert_eq!(
            model.get("ids").unwrap(),
            Value::Array(vec![Value::from(1), Value::Nil, Value::from(3)])
        );
        assert_eq!(model.get("meta").unwrap(), Value::from(json!({"color": "5"})));

        model.set("ids", 7).unwrap();
        assert_eq!(model.get("ids").unwrap(), Value::Array(vec![Value::from(7)]));
    }

    #[test]
    fn send_dispatches_generated_accessors() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("state", Type::String).default("draft").enumerate(["draft", "live"]))
            .build()
            .unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();

        assert_eq!(model.send("state", &[]).unwrap(), Value::from("draft"));
        assert_eq!(model.send("state?", &[]).unwrap(), Value::Bool(true));
        assert_eq!(model.send("state_default", &[]).unwrap(), Value::from("draft"));
        assert_eq!(
            model.send("state_values", &[]).unwrap(),
            Value::Array(vec!["draft".into(), "live".into()])
        );
        model.send("state=", &[Value::from("live")]).unwrap();
        assert_eq!(model.send("state_was", &[]).unwrap(), Value::from("draft"));
        assert_eq!(model.send("state_changed?", &[]).unwrap(), Value::Bool(true));
        assert!(model.send("state=", &[]).is_err());
        assert!(model.send("missing", &[]).is_err());
    }

    #[test]
    fn default_fn_runs_once_until_the_next_write() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("token", Type::String).default_fn(move || {
                counter.set(counter.get() + 1);
                Value::from("generated")
            }))
            .build()
            .unwrap();
        let model = Model::new(&class, Value::Nil).unwrap();

        for _ in 0..3 {
            assert_eq!(model.get("token").unwrap(), Value::from("generated"));
        }
        assert_eq!(model.read_attribute_before_type_cast("token").unwrap(), Value::from("generated"));
        assert_eq!(calls.get(), 1);

        model.set("token", Value::Nil).unwrap();
        model.get("token").unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn alias_shares_the_target_cell() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .alias("headline", "title")
            .build()
            .unwrap();
        let model = Model::new(&class, json!({"headline": "First"})).unwrap();
        assert_eq!(model.get("title").unwrap(), Value::from("First"));

        model.set("title", 42).unwrap();
        assert_eq!(model.get("headline").unwrap(), Value::from("42"));
        assert_eq!(model.send("headline_before_type_cast", &[]).unwrap(), Value::from(42));
        assert_eq!(model.changed(), vec!["title".to_string()]);
    }

    #[test]
    fn unknown_keys_are_ignored_but_set_fails() {
        let class = ModelClass::builder("Post")
            .attribute(AttributeReflection::new("title", Type::String))
            .build()
            .unwrap();
        let model = Model::new(&class, json!({"title": "a", "bogus": 1})).unwrap();
        assert_eq!(model.get("title").unwrap(), Value::from("a"));
        assert!(model.set("bogus", 1).is_err());
    }
}
