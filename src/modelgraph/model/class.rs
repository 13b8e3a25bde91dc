use super::Model;
use crate::adapter::Adapter;
use crate::associations::{AssociationReflection, Target};
use crate::attributes::{AttributeKind, AttributeReflection};
use crate::config;
use crate::error::{ModelError, Result};
use crate::nested::NestedAttributesOptions;
use crate::typecast::Type;
use crate::validations::{Errors, Validation, Validator};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Executes the actual side effect of a save or destroy.
pub type Performer = Rc<dyn Fn(&Model) -> Result<bool>>;

/// A named instance method with a fixed arity, reachable through
/// [`Model::send`] and used by symbol-dispatched nested attribute options.
#[derive(Clone)]
pub struct Method {
    arity: usize,
    body: Rc<dyn Fn(&Model, &[Value]) -> Result<Value>>,
}

impl Method {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, model: &Model, args: &[Value]) -> Result<Value> {
        if args.len() != self.arity {
            return Err(ModelError::Argument(format!(
                "wrong number of arguments (given {}, expected {})",
                args.len(),
                self.arity
            )));
        }
        (self.body)(model, args)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Performers {
    pub(crate) save: Option<Performer>,
    pub(crate) create: Option<Performer>,
    pub(crate) update: Option<Performer>,
    pub(crate) destroy: Option<Performer>,
}

/// A declared model class: attribute and association reflections, nested
/// attribute options, validations, lifecycle performers and named methods.
///
/// Classes are immutable once built and shared through `Rc`.
pub struct ModelClass {
    name: String,
    parent: Option<Rc<ModelClass>>,
    attributes: Vec<Rc<AttributeReflection>>,
    aliases: HashMap<String, String>,
    associations: Vec<Rc<AssociationReflection>>,
    nested_attributes: Vec<(String, NestedAttributesOptions)>,
    validations: Vec<Validation>,
    performers: Performers,
    methods: HashMap<String, Method>,
}

impl ModelClass {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name.into(), None)
    }

    /// Start a subclass from the parent's declarations.
    pub fn inherit(name: impl Into<String>, parent: &Rc<ModelClass>) -> ClassBuilder {
        ClassBuilder::new(name.into(), Some(parent.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<ModelClass>> {
        self.parent.as_ref()
    }

    /// This class followed by its ancestors.
    pub fn lineage(self: &Rc<Self>) -> Vec<Rc<ModelClass>> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent.clone();
        while let Some(class) = current {
            current = class.parent.clone();
            lineage.push(class);
        }
        lineage
    }

    pub fn is_a(self: &Rc<Self>, other: &Rc<ModelClass>) -> bool {
        self.lineage().iter().any(|class| Rc::ptr_eq(class, other))
    }

    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Reflection for an attribute or one of its aliases.
    pub fn attribute(&self, name: &str) -> Option<&Rc<AttributeReflection>> {
        let name = self.resolve_alias(name);
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn attributes(&self) -> &[Rc<AttributeReflection>] {
        &self.attributes
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name()).collect()
    }

    pub fn primary_attribute(&self) -> Option<&Rc<AttributeReflection>> {
        self.attributes.iter().find(|a| a.is_primary())
    }

    pub fn association(&self, name: &str) -> Option<&Rc<AssociationReflection>> {
        self.associations.iter().find(|a| a.name() == name)
    }

    pub fn associations(&self) -> &[Rc<AssociationReflection>] {
        &self.associations
    }

    pub fn nested_attributes_options(&self, association: &str) -> Option<&NestedAttributesOptions> {
        self.nested_attributes
            .iter()
            .find(|(name, _)| name == association)
            .map(|(_, options)| options)
    }

    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub(crate) fn performers(&self) -> &Performers {
        &self.performers
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelClass({})", self.name)
    }
}

/// Declares a [`ModelClass`].
///
/// Declaration problems (kind redefinition, unknown alias targets, missing
/// typecasters or normalizers, unresolvable inline classes) surface from
/// [`ClassBuilder::build`].
pub struct ClassBuilder {
    name: String,
    parent: Option<Rc<ModelClass>>,
    attributes: Vec<Rc<AttributeReflection>>,
    aliases: HashMap<String, String>,
    associations: Vec<AssociationReflection>,
    nested_attributes: Vec<(String, NestedAttributesOptions)>,
    validations: Vec<Validation>,
    performers: Performers,
    methods: HashMap<String, Method>,
    errors: Vec<ModelError>,
}

impl ClassBuilder {
    fn new(name: String, parent: Option<Rc<ModelClass>>) -> Self {
        let mut builder = Self {
            name,
            parent: None,
            attributes: Vec::new(),
            aliases: HashMap::new(),
            associations: Vec::new(),
            nested_attributes: Vec::new(),
            validations: Vec::new(),
            performers: Performers::default(),
            methods: HashMap::new(),
            errors: Vec::new(),
        };
        if let Some(parent) = parent {
            builder.attributes = parent.attributes.clone();
            builder.aliases = parent.aliases.clone();
            builder.associations = parent.associations.iter().map(|a| (**a).clone()).collect();
            builder.nested_attributes = parent.nested_attributes.clone();
            builder.validations = parent.validations.clone();
            builder.performers = parent.performers.clone();
            builder.methods = parent.methods.clone();
            builder.parent = Some(parent);
        }
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(mut self, reflection: AttributeReflection) -> Self {
        match self.attributes.iter().position(|a| a.name() == reflection.name()) {
            Some(index) if self.attributes[index].kind() != reflection.kind() => {
                self.errors.push(ModelError::Argument(format!(
                    "{} is already defined on {} as {:?}, cannot redefine it as {:?}",
                    reflection.name(),
                    self.name,
                    self.attributes[index].kind(),
                    reflection.kind()
                )));
            }
            Some(index) => self.attributes[index] = Rc::new(reflection),
            None => self.attributes.push(Rc::new(reflection)),
        }
        self
    }

    /// Primary attribute named after the configured default (`id`).
    pub fn primary_key(self, ty: Type) -> Self {
        let name = config::current().primary_attribute;
        self.primary(name, ty)
    }

    pub fn primary(self, name: impl Into<String>, ty: Type) -> Self {
        self.attribute(AttributeReflection::primary(name, ty))
    }

    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    pub fn association(mut self, reflection: AssociationReflection) -> Self {
        match self.associations.iter().position(|a| a.name() == reflection.name()) {
            Some(index) => self.associations[index] = reflection,
            None => self.associations.push(reflection),
        }
        self
    }

    pub fn embeds_one(self, name: impl Into<String>, target: impl Into<Target>) -> Self {
        self.association(AssociationReflection::embeds_one(name, target))
    }

    pub fn embeds_many(self, name: impl Into<String>, target: impl Into<Target>) -> Self {
        self.association(AssociationReflection::embeds_many(name, target))
    }

    pub fn references_one(self, name: impl Into<String>, adapter: Rc<dyn Adapter>) -> Self {
        self.association(AssociationReflection::references_one(name, adapter))
    }

    pub fn references_many(self, name: impl Into<String>, adapter: Rc<dyn Adapter>) -> Self {
        self.association(AssociationReflection::references_many(name, adapter))
    }

    pub fn accepts_nested_attributes_for(
        mut self,
        association: impl Into<String>,
        options: NestedAttributesOptions,
    ) -> Self {
        let association = association.into();
        self.nested_attributes.retain(|(name, _)| *name != association);
        self.nested_attributes.push((association, options));
        self
    }

    pub fn validates(mut self, attribute: impl Into<String>, validator: Validator) -> Self {
        self.validations.push(Validation::Attribute {
            name: attribute.into(),
            validator,
        });
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model, &mut Errors) -> Result<()> + 'static,
    {
        self.validations.push(Validation::Custom(Rc::new(f)));
        self
    }

    pub fn validates_nested(mut self, name: impl Into<String>) -> Self {
        self.validations.push(Validation::Nested(name.into()));
        self
    }

    pub fn validates_associated(mut self, name: impl Into<String>) -> Self {
        self.validations.push(Validation::Associated(name.into()));
        self
    }

    pub fn define_save<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Result<bool> + 'static,
    {
        self.performers.save = Some(Rc::new(f));
        self
    }

    pub fn define_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Result<bool> + 'static,
    {
        self.performers.create = Some(Rc::new(f));
        self
    }

    pub fn define_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Result<bool> + 'static,
    {
        self.performers.update = Some(Rc::new(f));
        self
    }

    pub fn define_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Result<bool> + 'static,
    {
        self.performers.destroy = Some(Rc::new(f));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, arity: usize, f: F) -> Self
    where
        F: Fn(&Model, &[Value]) -> Result<Value> + 'static,
    {
        self.methods.insert(
            name.into(),
            Method {
                arity,
                body: Rc::new(f),
            },
        );
        self
    }

    pub fn build(self) -> Result<Rc<ModelClass>> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        let name = self.name;
        let mut attributes = self.attributes;

        let mut associations = Vec::with_capacity(self.associations.len());
        for mut reflection in self.associations {
            reflection.resolve_inline(&name)?;
            let backing = reflection.backing_attribute();
            match attributes.iter().position(|a| a.name() == backing.name()) {
                Some(index) if attributes[index].kind() == backing.kind() => {}
                Some(_) => {
                    return Err(ModelError::Argument(format!(
                        "association {} on {} conflicts with attribute {}",
                        reflection.name(),
                        name,
                        backing.name()
                    )))
                }
                None => attributes.push(Rc::new(backing)),
            }
            associations.push(Rc::new(reflection));
        }

        for target in self.aliases.values() {
            if !attributes.iter().any(|a| a.name() == target) {
                return Err(ModelError::UndefinedAttribute {
                    class: name,
                    name: target.clone(),
                });
            }
        }

        for (association, _) in &self.nested_attributes {
            if !associations.iter().any(|a| a.name() == association) {
                return Err(ModelError::Argument(format!(
                    "no association found for name `{}`, has it been defined yet?",
                    association
                )));
            }
        }

        let mut validations = self.validations;
        for attribute in &attributes {
            attribute.check()?;
            if attribute.kind() != AttributeKind::Represents {
                continue;
            }
            let reference = attribute.reference().unwrap_or_default();
            let known = associations.iter().any(|a| a.name() == reference)
                || attributes.iter().any(|a| a.name() == reference);
            if !known {
                return Err(ModelError::UndefinedAttribute {
                    class: name,
                    name: reference.to_string(),
                });
            }
            if !validations.iter().any(|v| v.nested_name() == Some(reference)) {
                validations.push(Validation::Nested(reference.to_string()));
            }
        }

        tracing::debug!(class = %name, attributes = attributes.len(), "built model class");
        Ok(Rc::new(ModelClass {
            name,
            parent: self.parent,
            attributes,
            aliases: self.aliases,
            associations,
            nested_attributes: self.nested_attributes,
            validations,
            performers: self.performers,
            methods: self.methods,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typecast::CustomType;

    #[test]
    fn lineage_and_is_a() {
        let item = ModelClass::builder("Item").build().unwrap();
        let book = ModelClass::inherit("Book", &item).build().unwrap();

        let names: Vec<_> = book.lineage().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["Book", "Item"]);
        assert!(book.is_a(&item));
        assert!(!item.is_a(&book));
        assert_eq!(
            Type::Model(book.clone()).ancestors(),
            vec!["Book", "Item", "Model", "Object"]
        );
    }

    #[test]
    fn subclass_inherits_and_extends_attributes() {
        let item = ModelClass::builder("Item")
            .attribute(AttributeReflection::new("title", Type::String))
            .build()
            .unwrap();
        let book = ModelClass::inherit("Book", &item)
            .attribute(AttributeReflection::new("title", Type::String).default("Untitled"))
            .attribute(AttributeReflection::new("pages", Type::Integer))
            .build()
            .unwrap();

        assert_eq!(book.attribute_names(), vec!["title", "pages"]);
        assert!(book.attribute("title").unwrap().has_default());
        assert!(!item.attribute("title").unwrap().has_default());
    }

    #[test]
    fn redefining_with_another_kind_fails() {
        let item = ModelClass::builder("Item")
            .attribute(AttributeReflection::new("tags", Type::String))
            .build()
            .unwrap();
        let result = ModelClass::inherit("Book", &item)
            .attribute(AttributeReflection::collection("tags", Type::String))
            .build();
        assert!(matches!(result, Err(ModelError::Argument(_))));
    }

    #[test]
    fn alias_to_unknown_attribute_fails() {
        let result = ModelClass::builder("Item").alias("headline", "title").build();
        assert!(matches!(
            result,
            Err(ModelError::UndefinedAttribute { name, .. }) if name == "title"
        ));
    }

    #[test]
    fn alias_resolves_to_target_reflection() {
        let item = ModelClass::builder("Item")
            .attribute(AttributeReflection::new("title", Type::String))
            .alias("headline", "title")
            .build()
            .unwrap();
        assert_eq!(item.attribute("headline").unwrap().name(), "title");
    }

    #[test]
    fn missing_typecaster_fails_at_build() {
        let orphan = Type::Custom(CustomType::new("Unregistered"));
        let result = ModelClass::builder("Item")
            .attribute(AttributeReflection::new("thing", orphan))
            .build();
        assert!(matches!(
            result,
            Err(ModelError::TypecasterMissing(name)) if name == "Unregistered"
        ));
    }

    #[test]
    fn nested_attributes_for_unknown_association_fails() {
        let result = ModelClass::builder("Item")
            .accepts_nested_attributes_for("parts", NestedAttributesOptions::new())
            .build();
        assert!(matches!(result, Err(ModelError::Argument(_))));
    }

    #[test]
    fn method_checks_arity() {
        let item = ModelClass::builder("Item")
            .method("double", 1, |_, args| {
                Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
            })
            .build()
            .unwrap();
        let model = Model::new(&item, Value::Nil).unwrap();
        let method = item.method("double").unwrap();
        assert_eq!(method.call(&model, &[Value::from(4)]).unwrap(), Value::from(8));
        assert!(matches!(method.call(&model, &[]), Err(ModelError::Argument(_))));
    }
}
