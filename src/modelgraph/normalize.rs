//! Named normalizers.
//!
//! Normalizers run last in the attribute read pipeline, after coercion and
//! enum filtering. Attributes refer to registered normalizers by name (with an
//! options value) or carry inline closures; see
//! [`AttributeReflection::normalize`](crate::attributes::AttributeReflection::normalize).

use crate::model::Model;
use crate::value::Value;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What a normalizer gets to see besides the value.
pub struct NormalizeContext<'a> {
    pub attribute: &'a str,
    pub model: &'a Model,
}

pub type Normalizer = Arc<dyn Fn(Value, &Value, &NormalizeContext<'_>) -> Value + Send + Sync>;

fn normalizer<F>(f: F) -> Normalizer
where
    F: Fn(Value, &Value, &NormalizeContext<'_>) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

static NORMALIZERS: Lazy<RwLock<HashMap<String, Normalizer>>> = Lazy::new(|| {
    let mut normalizers: HashMap<String, Normalizer> = HashMap::new();
    normalizers.insert(
        "strip".to_string(),
        normalizer(|value, _, _| map_strings(value, &|s| s.trim().to_string())),
    );
    normalizers.insert(
        "downcase".to_string(),
        normalizer(|value, _, _| map_strings(value, &|s| s.to_lowercase())),
    );
    normalizers.insert(
        "upcase".to_string(),
        normalizer(|value, _, _| map_strings(value, &|s| s.to_uppercase())),
    );
    normalizers.insert(
        "truncate".to_string(),
        normalizer(|value, options, _| {
            let Some(length) = options
                .as_dict()
                .and_then(|o| o.get("length"))
                .and_then(Value::as_i64)
                .and_then(|l| usize::try_from(l).ok())
            else {
                return value;
            };
            map_strings(value, &|s| s.chars().take(length).collect())
        }),
    );
    RwLock::new(normalizers)
});

fn map_strings(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| map_strings(item, f)).collect()),
        other => other,
    }
}

/// Register (or override) a named normalizer.
pub fn register<F>(name: impl Into<String>, normalizer: F)
where
    F: Fn(Value, &Value, &NormalizeContext<'_>) -> Value + Send + Sync + 'static,
{
    let name = name.into();
    tracing::debug!(normalizer = %name, "registering normalizer");
    NORMALIZERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(name, Arc::new(normalizer));
}

pub fn lookup(name: &str) -> Option<Normalizer> {
    NORMALIZERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        for name in ["strip", "downcase", "upcase", "truncate"] {
            assert!(lookup(name).is_some(), "{}", name);
        }
        assert!(lookup("nonexistent").is_none());
    }

    #[test]
    fn map_strings_reaches_into_arrays() {
        let value = Value::Array(vec![Value::from(" a "), Value::from(1)]);
        let stripped = map_strings(value, &|s| s.trim().to_string());
        assert_eq!(stripped, Value::Array(vec![Value::from("a"), Value::from(1)]));
    }
}
