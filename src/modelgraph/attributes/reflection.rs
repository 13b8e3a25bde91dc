//! Declaration-time attribute metadata.

use crate::error::{ModelError, Result};
use crate::model::Model;
use crate::normalize::{self, NormalizeContext};
use crate::typecast::{self, Type};
use crate::value::{Dict, Value};
use std::rc::Rc;

/// The kind of value an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Attribute,
    Collection,
    Dictionary,
    Localized,
    Represents,
    /// Backing storage of an embedded association.
    Association,
}

#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    /// Evaluated with the owning instance.
    Computed(Rc<dyn Fn(&Model) -> Value>),
    /// Zero-arity producer.
    Generated(Rc<dyn Fn() -> Value>),
}

impl DefaultValue {
    pub fn resolve(&self, model: &Model) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Computed(f) => f(model),
            DefaultValue::Generated(f) => f(),
        }
    }
}

#[derive(Clone)]
pub enum Enumeration {
    Values(Vec<Value>),
    Computed(Rc<dyn Fn(&Model) -> Vec<Value>>),
}

#[derive(Clone)]
pub enum Readonly {
    Never,
    Always,
    Computed(Rc<dyn Fn(&Model) -> bool>),
}

#[derive(Clone)]
pub enum NormalizerSpec {
    /// A normalizer from the registry, with its options.
    Named { name: String, options: Value },
    Inline(Rc<dyn Fn(Value, &NormalizeContext<'_>) -> Value>),
}

/// Immutable metadata for one declared attribute.
#[derive(Clone)]
pub struct AttributeReflection {
    name: String,
    kind: AttributeKind,
    ty: Type,
    default: Option<DefaultValue>,
    default_blank: bool,
    enumeration: Option<Enumeration>,
    normalizers: Vec<NormalizerSpec>,
    readonly: Readonly,
    primary: bool,
    keys: Option<Vec<String>>,
    reference: Option<String>,
    column: Option<String>,
}

impl AttributeReflection {
    fn with_kind(name: impl Into<String>, kind: AttributeKind, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            default: None,
            default_blank: false,
            enumeration: None,
            normalizers: Vec::new(),
            readonly: Readonly::Never,
            primary: false,
            keys: None,
            reference: None,
            column: None,
        }
    }

    /// A scalar attribute.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self::with_kind(name, AttributeKind::Attribute, ty)
    }

    pub fn collection(name: impl Into<String>, ty: Type) -> Self {
        Self::with_kind(name, AttributeKind::Collection, ty)
    }

    pub fn dictionary(name: impl Into<String>, ty: Type) -> Self {
        Self::with_kind(name, AttributeKind::Dictionary, ty)
    }

    pub fn localized(name: impl Into<String>, ty: Type) -> Self {
        Self::with_kind(name, AttributeKind::Localized, ty)
    }

    /// A proxy for `reference`'s column of the same name.
    pub fn represents(name: impl Into<String>, reference: impl Into<String>) -> Self {
        let mut reflection = Self::with_kind(name, AttributeKind::Represents, Type::Object);
        reflection.reference = Some(reference.into());
        reflection
    }

    /// The class identity attribute. UUID primaries generate their own value.
    pub fn primary(name: impl Into<String>, ty: Type) -> Self {
        let generates_uuid = matches!(ty, Type::Uuid);
        let mut reflection = Self::with_kind(name, AttributeKind::Attribute, ty);
        reflection.primary = true;
        if generates_uuid {
            reflection.default = Some(DefaultValue::Generated(Rc::new(|| {
                Value::Uuid(uuid::Uuid::new_v4())
            })));
        }
        reflection
    }

    pub(crate) fn association(name: impl Into<String>) -> Self {
        Self::with_kind(name, AttributeKind::Association, Type::Object)
    }

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

    pub fn default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.default = Some(DefaultValue::Generated(Rc::new(f)));
        self
    }

    /// Treat blank raw values (not only nil) as absent for defaulting.
    pub fn default_blank(mut self) -> Self {
        self.default_blank = true;
        self
    }

    pub fn enumerate<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enumeration = Some(Enumeration::Values(
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn enumerate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> Vec<Value> + 'static,
    {
        self.enumeration = Some(Enumeration::Computed(Rc::new(f)));
        self
    }

    /// Append a registered normalizer.
    pub fn normalize(self, name: impl Into<String>) -> Self {
        self.normalize_with_options(name, Value::Nil)
    }

    pub fn normalize_with_options(mut self, name: impl Into<String>, options: impl Into<Value>) -> Self {
        self.normalizers.push(NormalizerSpec::Named {
            name: name.into(),
            options: options.into(),
        });
        self
    }

    /// Append an inline normalizer.
    pub fn normalizer<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &NormalizeContext<'_>) -> Value + 'static,
    {
        self.normalizers.push(NormalizerSpec::Inline(Rc::new(f)));
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = Readonly::Always;
        self
    }

    pub fn readonly_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&Model) -> bool + 'static,
    {
        self.readonly = Readonly::Computed(Rc::new(f));
        self
    }

    /// Permitted keys of a dictionary attribute.
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Column read on the reference of a represents attribute.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Override the declared type.
    pub fn typed(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }

    pub fn permitted_keys(&self) -> Option<&[String]> {
        self.keys.as_deref()
    }

    pub(crate) fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fail early when the type or a named normalizer cannot be resolved.
    pub(crate) fn check(&self) -> Result<()> {
        if typecast::lookup(&self.ty).is_none() {
            return Err(ModelError::TypecasterMissing(self.ty.name()));
        }
        for step in &self.normalizers {
            if let NormalizerSpec::Named { name, .. } = step {
                if normalize::lookup(name).is_none() {
                    return Err(ModelError::NormalizerMissing(name.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn default_value(&self, model: &Model) -> Value {
        self.default
            .as_ref()
            .map(|default| default.resolve(model))
            .unwrap_or(Value::Nil)
    }

    /// Whether a raw value counts as absent for defaulting purposes.
    pub fn is_absent(&self, raw: &Value) -> bool {
        raw.is_nil() || (self.default_blank && raw.is_blank())
    }

    pub fn enum_values(&self, model: &Model) -> Option<Vec<Value>> {
        self.enumeration.as_ref().map(|enumeration| match enumeration {
            Enumeration::Values(values) => values.clone(),
            Enumeration::Computed(f) => f(model),
        })
    }

    pub fn is_readonly(&self, model: &Model) -> bool {
        match &self.readonly {
            Readonly::Never => false,
            Readonly::Always => true,
            Readonly::Computed(f) => f(model),
        }
    }

    /// Coerce one value to the declared type; uncoercible values become nil.
    pub fn typecast(&self, value: &Value) -> Result<Value> {
        Ok(typecast::coerce(&self.ty, value)?.unwrap_or(Value::Nil))
    }

    fn enumerize(value: Value, allowed: Option<&[Value]>) -> Value {
        match allowed {
            Some(allowed) if !value.is_nil() && !allowed.contains(&value) => Value::Nil,
            _ => value,
        }
    }

    fn normalize_value(&self, model: &Model, value: Value) -> Result<Value> {
        let context = NormalizeContext {
            attribute: &self.name,
            model,
        };
        let mut value = value;
        for step in &self.normalizers {
            value = match step {
                NormalizerSpec::Named { name, options } => {
                    let normalizer = normalize::lookup(name)
                        .ok_or_else(|| ModelError::NormalizerMissing(name.clone()))?;
                    normalizer(value, options, &context)
                }
                NormalizerSpec::Inline(f) => f(value, &context),
            };
        }
        Ok(value)
    }

    /// Coerce, enum-filter and normalize a default-applied raw value.
    pub(crate) fn cast(&self, model: &Model, before_type_cast: &Value) -> Result<Value> {
        let allowed = self.enum_values(model);
        let allowed = allowed.as_deref();
        let value = match self.kind {
            AttributeKind::Association => return Ok(before_type_cast.clone()),
            AttributeKind::Attribute | AttributeKind::Represents => {
                Self::enumerize(self.typecast(before_type_cast)?, allowed)
            }
            AttributeKind::Collection => {
                let items = match before_type_cast {
                    Value::Nil => Vec::new(),
                    Value::Array(items) => items.clone(),
                    scalar => vec![scalar.clone()],
                };
                let items = items
                    .iter()
                    .map(|item| Ok(Self::enumerize(self.typecast(item)?, allowed)))
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(items)
            }
            AttributeKind::Dictionary => {
                let mut dict = Dict::new();
                if let Value::Dict(source) = before_type_cast {
                    for (key, item) in source.iter() {
                        if let Some(keys) = &self.keys {
                            if !keys.iter().any(|k| k == key) {
                                continue;
                            }
                        }
                        dict.insert(key, Self::enumerize(self.typecast(item)?, allowed));
                    }
                }
                Value::Dict(dict)
            }
            AttributeKind::Localized => {
                let mut dict = Dict::new();
                if let Value::Dict(source) = before_type_cast {
                    for (locale, item) in source.iter() {
                        dict.insert(locale, self.typecast(item)?);
                    }
                }
                Value::Dict(dict)
            }
        };
        self.normalize_value(model, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_flags() {
        let reflection = AttributeReflection::new("status", Type::String)
            .default("draft")
            .default_blank()
            .enumerate(["draft", "published"])
            .normalize("strip")
            .readonly();

        assert_eq!(reflection.name(), "status");
        assert_eq!(reflection.kind(), AttributeKind::Attribute);
        assert!(reflection.has_default());
        assert!(reflection.is_absent(&Value::from("")));
        assert!(reflection.is_absent(&Value::Nil));
        assert!(!reflection.is_absent(&Value::from("x")));
        assert!(reflection.check().is_ok());
    }

    #[test]
    fn blank_is_present_without_default_blank() {
        let reflection = AttributeReflection::new("title", Type::String).default("X");
        assert!(!reflection.is_absent(&Value::from("")));
    }

    #[test]
    fn uuid_primary_generates_default() {
        let reflection = AttributeReflection::primary("id", Type::Uuid);
        assert!(reflection.is_primary());
        assert!(reflection.has_default());

        let integer = AttributeReflection::primary("id", Type::Integer);
        assert!(!integer.has_default());
    }

    #[test]
    fn unknown_normalizer_fails_check() {
        let reflection = AttributeReflection::new("title", Type::String).normalize("does_not_exist");
        assert!(matches!(
            reflection.check(),
            Err(ModelError::NormalizerMissing(name)) if name == "does_not_exist"
        ));
    }

    #[test]
    fn represents_defaults_column_to_name() {
        let reflection = AttributeReflection::represents("name", "author");
        assert_eq!(reflection.reference(), Some("author"));
        assert_eq!(reflection.column_name(), "name");
        assert_eq!(reflection.column("full_name").column_name(), "full_name");
    }

    #[test]
    fn enumerize_keeps_nil_and_members() {
        let allowed = vec![Value::from(1), Value::from(2)];
        assert_eq!(AttributeReflection::enumerize(Value::from(2), Some(&allowed)), Value::from(2));
        assert_eq!(AttributeReflection::enumerize(Value::from(9), Some(&allowed)), Value::Nil);
        assert_eq!(AttributeReflection::enumerize(Value::from(9), None), Value::from(9));
    }
}
