use super::{builtin, Type};
use crate::error::{ModelError, Result};
use crate::value::Value;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Coerces a raw value towards the requested type. `None` means "not coercible".
pub type Typecaster = Arc<dyn Fn(&Value, &Type) -> Option<Value> + Send + Sync>;

/// Typecasters keyed by type name.
#[derive(Clone, Default)]
pub struct Registry {
    casters: HashMap<String, Typecaster>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in scalar typecasters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::install(&mut registry);
        registry
    }

    /// Register (or override) the typecaster for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, caster: F)
    where
        F: Fn(&Value, &Type) -> Option<Value> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        tracing::debug!(type_name = %type_name, "registering typecaster");
        self.casters.insert(type_name, Arc::new(caster));
    }

    /// Most specific typecaster along the type's ancestor chain.
    pub fn lookup(&self, ty: &Type) -> Option<Typecaster> {
        ty.ancestors()
            .iter()
            .find_map(|name| self.casters.get(name).cloned())
    }

    pub fn coerce(&self, ty: &Type, value: &Value) -> Result<Option<Value>> {
        if ty.matches(value) {
            return Ok(Some(value.clone()));
        }
        let caster = self
            .lookup(ty)
            .ok_or_else(|| ModelError::TypecasterMissing(ty.name()))?;
        if value.is_nil() {
            return Ok(None);
        }
        Ok(caster(value, ty))
    }
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::with_builtins()));

/// Register a typecaster in the process-wide registry.
pub fn register<F>(type_name: impl Into<String>, caster: F)
where
    F: Fn(&Value, &Type) -> Option<Value> + Send + Sync + 'static,
{
    REGISTRY
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .register(type_name, caster);
}

/// Look up a typecaster in the process-wide registry.
pub fn lookup(ty: &Type) -> Option<Typecaster> {
    REGISTRY
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .lookup(ty)
}

/// Coerce through the process-wide registry.
///
/// The registry lock is released before the typecaster runs, so typecasters
/// may coerce recursively.
pub fn coerce(ty: &Type, value: &Value) -> Result<Option<Value>> {
    if ty.matches(value) {
        return Ok(Some(value.clone()));
    }
    let caster = lookup(ty).ok_or_else(|| ModelError::TypecasterMissing(ty.name()))?;
    if value.is_nil() {
        return Ok(None);
    }
    Ok(caster(value, ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typecast::CustomType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn identity_short_circuit_skips_caster() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut registry = Registry::new();
        registry.register("Integer", |_, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Some(Value::from(0))
        });

        let result = registry.coerce(&Type::Integer, &Value::from(42)).unwrap();
        assert_eq!(result, Some(Value::from(42)));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_caster_is_an_error() {
        let registry = Registry::new();
        let err = registry.coerce(&Type::Integer, &Value::from("1")).unwrap_err();
        assert!(matches!(err, ModelError::TypecasterMissing(name) if name == "Integer"));
    }

    #[test]
    fn uncoercible_value_is_none_not_error() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.coerce(&Type::Integer, &Value::from("abc")).unwrap(), None);
    }

    #[test]
    fn lookup_walks_to_parent() {
        let registry = Registry::with_builtins();
        let email = Type::Custom(CustomType::new("Email").parent(Type::String));
        let result = registry.coerce(&email, &Value::from(12)).unwrap();
        assert_eq!(result, Some(Value::from("12")));
    }

    #[test]
    fn most_specific_caster_wins() {
        let mut registry = Registry::with_builtins();
        registry.register("Email", |value, _| {
            value.as_str().map(|s| Value::from(s.to_lowercase()))
        });
        let email = Type::Custom(CustomType::new("Email").parent(Type::String));
        let result = registry.coerce(&email, &Value::from("A@B.IO")).unwrap();
        assert_eq!(result, Some(Value::from("a@b.io")));
    }

    #[test]
    fn nil_coerces_to_none() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.coerce(&Type::String, &Value::Nil).unwrap(), None);
    }
}
