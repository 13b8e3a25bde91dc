use super::{classify, singularize};
use crate::adapter::{Adapter, Scope};
use crate::attributes::{AttributeReflection, DefaultValue};
use crate::error::{ModelError, Result};
use crate::model::{ClassBuilder, Model, ModelClass};
use crate::value::Value;
use once_cell::unsync::OnceCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    EmbedsOne,
    EmbedsMany,
    ReferencesOne,
    ReferencesMany,
}

impl AssociationKind {
    pub fn is_embedded(self) -> bool {
        matches!(self, AssociationKind::EmbedsOne | AssociationKind::EmbedsMany)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, AssociationKind::EmbedsMany | AssociationKind::ReferencesMany)
    }
}

/// Where an embedded association's class comes from.
#[derive(Clone)]
pub enum Target {
    Class(Rc<ModelClass>),
    /// Resolved on first use and cached. `None` is a declaration error.
    Lazy(Rc<dyn Fn() -> Option<Rc<ModelClass>>>),
    /// A class declared in place, named `<Owner>::<Association>`.
    Inline(Rc<dyn Fn(ClassBuilder) -> ClassBuilder>),
}

impl Target {
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Option<Rc<ModelClass>> + 'static,
    {
        Target::Lazy(Rc::new(f))
    }

    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(ClassBuilder) -> ClassBuilder + 'static,
    {
        Target::Inline(Rc::new(f))
    }
}

impl From<&Rc<ModelClass>> for Target {
    fn from(class: &Rc<ModelClass>) -> Self {
        Target::Class(class.clone())
    }
}

impl From<Rc<ModelClass>> for Target {
    fn from(class: Rc<ModelClass>) -> Self {
        Target::Class(class)
    }
}

pub type SourceReader = Rc<dyn Fn(&AssociationReflection, &Model) -> Result<Value>>;
pub type SourceWriter = Rc<dyn Fn(&AssociationReflection, &Model, Value) -> Result<()>>;
pub type ScopeFn = Rc<dyn Fn(&Model, Scope) -> Scope>;

/// Declaration of one association.
#[derive(Clone)]
pub struct AssociationReflection {
    name: String,
    kind: AssociationKind,
    target: Option<Target>,
    class: OnceCell<Rc<ModelClass>>,
    adapter: Option<Rc<dyn Adapter>>,
    foreign_key: Option<String>,
    scope: Option<ScopeFn>,
    reader: Option<SourceReader>,
    writer: Option<SourceWriter>,
    autosave: bool,
    default: Option<DefaultValue>,
}

impl AssociationReflection {
    fn new(name: String, kind: AssociationKind) -> Self {
        Self {
            name,
            kind,
            target: None,
            class: OnceCell::new(),
            adapter: None,
            foreign_key: None,
            scope: None,
            reader: None,
            writer: None,
            autosave: false,
            default: None,
        }
    }

    fn embedded(name: impl Into<String>, kind: AssociationKind, target: Target) -> Self {
        let mut reflection = Self::new(name.into(), kind);
        if let Target::Class(class) = &target {
            let _ = reflection.class.set(class.clone());
        }
        reflection.target = Some(target);
        reflection
    }

    fn referenced(name: impl Into<String>, kind: AssociationKind, adapter: Rc<dyn Adapter>) -> Self {
        let mut reflection = Self::new(name.into(), kind);
        reflection.adapter = Some(adapter);
        reflection
    }

    pub fn embeds_one(name: impl Into<String>, target: impl Into<Target>) -> Self {
        Self::embedded(name, AssociationKind::EmbedsOne, target.into())
    }

    pub fn embeds_many(name: impl Into<String>, target: impl Into<Target>) -> Self {
        Self::embedded(name, AssociationKind::EmbedsMany, target.into())
    }

    pub fn references_one(name: impl Into<String>, adapter: Rc<dyn Adapter>) -> Self {
        Self::referenced(name, AssociationKind::ReferencesOne, adapter)
    }

    pub fn references_many(name: impl Into<String>, adapter: Rc<dyn Adapter>) -> Self {
        Self::referenced(name, AssociationKind::ReferencesMany, adapter)
    }

    /// Persist new or changed referenced targets when the owner saves.
    pub fn autosave(mut self) -> Self {
        self.autosave = true;
        self
    }

    pub fn foreign_key(mut self, name: impl Into<String>) -> Self {
        self.foreign_key = Some(name.into());
        self
    }

    /// Narrow the adapter scope used to load referenced targets.
    pub fn scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model, Scope) -> Scope + 'static,
    {
        self.scope = Some(Rc::new(f));
        self
    }

    /// Custom decoding of the embedded backing attribute.
    pub fn read_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&AssociationReflection, &Model) -> Result<Value> + 'static,
    {
        self.reader = Some(Rc::new(f));
        self
    }

    /// Custom encoding of the embedded backing attribute.
    pub fn write_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&AssociationReflection, &Model, Value) -> Result<()> + 'static,
    {
        self.writer = Some(Rc::new(f));
        self
    }

    /// Children used while the backing attribute is nil: attribute dicts or
    /// ready instances.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Value + 'static,
    {
        self.default = Some(DefaultValue::Computed(Rc::new(f)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn is_autosave(&self) -> bool {
        self.autosave
    }

    pub fn adapter(&self) -> Option<&Rc<dyn Adapter>> {
        self.adapter.as_ref()
    }

    pub(crate) fn require_adapter(&self) -> Result<&Rc<dyn Adapter>> {
        self.adapter.as_ref().ok_or_else(|| {
            ModelError::Argument(format!("association {} has no adapter", self.name))
        })
    }

    /// `<name>_id` for one, `<singular>_ids` for many, unless overridden.
    pub fn foreign_key_name(&self) -> String {
        if let Some(foreign_key) = &self.foreign_key {
            return foreign_key.clone();
        }
        match self.kind {
            AssociationKind::ReferencesMany => format!("{}_ids", singularize(&self.name)),
            _ => format!("{}_id", self.name),
        }
    }

    /// Attribute holding the association's stored form.
    pub fn source_attribute(&self) -> String {
        if self.kind.is_embedded() {
            self.name.clone()
        } else {
            self.foreign_key_name()
        }
    }

    pub(crate) fn reader(&self) -> Option<&SourceReader> {
        self.reader.as_ref()
    }

    pub(crate) fn writer(&self) -> Option<&SourceWriter> {
        self.writer.as_ref()
    }

    pub(crate) fn apply_scope(&self, owner: &Model, scope: Scope) -> Scope {
        match &self.scope {
            Some(f) => f(owner, scope),
            None => scope,
        }
    }

    pub fn default_value(&self, owner: &Model) -> Value {
        self.default
            .as_ref()
            .map(|default| default.resolve(owner))
            .unwrap_or_default()
    }

    /// The target class. Referenced associations take it from the adapter.
    pub fn klass(&self) -> Result<Rc<ModelClass>> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.data_type());
        }
        self.class
            .get_or_try_init(|| match &self.target {
                Some(Target::Class(class)) => Ok(class.clone()),
                Some(Target::Lazy(resolve)) => resolve().ok_or_else(|| {
                    ModelError::Argument(format!(
                        "cannot resolve the class of association {}",
                        self.name
                    ))
                }),
                _ => Err(ModelError::Argument(format!(
                    "association {} has no target class",
                    self.name
                ))),
            })
            .cloned()
    }

    /// Build an inline target class under the owner's name.
    pub(crate) fn resolve_inline(&mut self, owner: &str) -> Result<()> {
        let Some(Target::Inline(define)) = &self.target else {
            return Ok(());
        };
        let builder = ModelClass::builder(format!("{}::{}", owner, classify(&self.name)));
        let class = define(builder).build()?;
        self.class = OnceCell::new();
        let _ = self.class.set(class.clone());
        self.target = Some(Target::Class(class));
        Ok(())
    }

    /// Owner attribute this association stores into.
    pub(crate) fn backing_attribute(&self) -> AttributeReflection {
        match (&self.kind, &self.adapter) {
            (AssociationKind::ReferencesOne, Some(adapter)) => {
                AttributeReflection::new(self.foreign_key_name(), adapter.primary_key_type())
            }
            (AssociationKind::ReferencesMany, Some(adapter)) => {
                AttributeReflection::collection(self.foreign_key_name(), adapter.primary_key_type())
            }
            _ => AttributeReflection::association(&self.name),
        }
    }
}

impl fmt::Debug for AssociationReflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationReflection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typecast::Type;

    #[test]
    fn foreign_key_names() {
        let author = ModelClass::builder("Author").build().unwrap();
        let adapter: Rc<dyn Adapter> = Rc::new(crate::adapter::MemoryAdapter::new(&author));

        let one = AssociationReflection::references_one("author", adapter.clone());
        assert_eq!(one.foreign_key_name(), "author_id");
        let many = AssociationReflection::references_many("authors", adapter.clone());
        assert_eq!(many.foreign_key_name(), "author_ids");
        let custom = AssociationReflection::references_one("writer", adapter).foreign_key("writer_key");
        assert_eq!(custom.source_attribute(), "writer_key");
    }

    #[test]
    fn lazy_target_resolves_once() {
        let part = ModelClass::builder("Part").build().unwrap();
        let captured = part.clone();
        let reflection = AssociationReflection::embeds_many("parts", Target::lazy(move || Some(captured.clone())));
        assert!(Rc::ptr_eq(&reflection.klass().unwrap(), &part));
    }

    #[test]
    fn unresolvable_lazy_target_fails_on_use() {
        let reflection = AssociationReflection::embeds_one("part", Target::lazy(|| None));
        assert!(matches!(reflection.klass(), Err(ModelError::Argument(_))));
    }

    #[test]
    fn inline_target_is_named_after_owner() {
        let mut reflection = AssociationReflection::embeds_many(
            "line_items",
            Target::inline(|class| class.attribute(AttributeReflection::new("sku", Type::String))),
        );
        reflection.resolve_inline("Order").unwrap();
        let class = reflection.klass().unwrap();
        assert_eq!(class.name(), "Order::LineItem");
        assert!(class.has_attribute("sku"));
    }
}
