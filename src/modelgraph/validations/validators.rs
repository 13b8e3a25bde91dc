use super::Errors;
use crate::error::Result;
use crate::model::Model;
use crate::value::Value;
use std::rc::Rc;

/// Field-level checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Presence,
    Absence,
    Length {
        minimum: Option<usize>,
        maximum: Option<usize>,
    },
    Inclusion(Vec<Value>),
    Exclusion(Vec<Value>),
}

impl Validator {
    pub fn length(minimum: Option<usize>, maximum: Option<usize>) -> Self {
        Validator::Length { minimum, maximum }
    }

    pub fn inclusion<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Validator::Inclusion(values.into_iter().map(Into::into).collect())
    }

    pub fn exclusion<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Validator::Exclusion(values.into_iter().map(Into::into).collect())
    }

    /// Failure message for `value`, if any.
    pub fn check(&self, value: &Value) -> Option<String> {
        match self {
            Validator::Presence if value.is_blank() => Some("can't be blank".to_string()),
            Validator::Absence if value.is_present() => Some("must be blank".to_string()),
            Validator::Length { minimum, maximum } => {
                let length = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Dict(dict) => dict.len(),
                    Value::Nil => 0,
                    other => other.to_string().chars().count(),
                };
                match (minimum, maximum) {
                    (Some(min), _) if length < *min => {
                        Some(format!("is too short (minimum is {} characters)", min))
                    }
                    (_, Some(max)) if length > *max => {
                        Some(format!("is too long (maximum is {} characters)", max))
                    }
                    _ => None,
                }
            }
            Validator::Inclusion(values) if !values.contains(value) => {
                Some("is not included in the list".to_string())
            }
            Validator::Exclusion(values) if values.contains(value) => {
                Some("is reserved".to_string())
            }
            _ => None,
        }
    }
}

pub type CustomValidator = Rc<dyn Fn(&Model, &mut Errors) -> Result<()>>;

/// A validation declared on a model class.
#[derive(Clone)]
pub enum Validation {
    Attribute { name: String, validator: Validator },
    Custom(CustomValidator),
    /// Validate embedded or referenced children and import their errors.
    Nested(String),
    /// Validate children and add a single "is invalid" under the association.
    Associated(String),
}

impl Validation {
    pub fn nested_name(&self) -> Option<&str> {
        match self {
            Validation::Nested(name) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_treats_false_and_zero_as_present() {
        assert_eq!(Validator::Presence.check(&Value::Nil), Some("can't be blank".to_string()));
        assert_eq!(Validator::Presence.check(&Value::from("  ")), Some("can't be blank".to_string()));
        assert_eq!(Validator::Presence.check(&Value::from(false)), None);
        assert_eq!(Validator::Presence.check(&Value::from(0)), None);
    }

    #[test]
    fn length_bounds() {
        let validator = Validator::length(Some(2), Some(4));
        assert!(validator.check(&Value::from("a")).is_some());
        assert!(validator.check(&Value::from("abc")).is_none());
        assert!(validator.check(&Value::from("abcde")).is_some());
        assert!(validator.check(&Value::Nil).is_some());
    }

    #[test]
    fn inclusion_and_exclusion() {
        let inclusion = Validator::inclusion(["a", "b"]);
        assert!(inclusion.check(&Value::from("a")).is_none());
        assert_eq!(
            inclusion.check(&Value::from("c")),
            Some("is not included in the list".to_string())
        );

        let exclusion = Validator::exclusion(["admin"]);
        assert_eq!(exclusion.check(&Value::from("admin")), Some("is reserved".to_string()));
        assert!(exclusion.check(&Value::from("guest")).is_none());
    }
}
