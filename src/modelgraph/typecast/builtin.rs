//! Built-in typecasters for the scalar kinds.

use super::registry::Registry;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

/// String spellings accepted by the Boolean typecaster.
pub const BOOLEAN_MAPPING: &[(&str, bool)] = &[
    ("1", true),
    ("0", false),
    ("t", true),
    ("f", false),
    ("T", true),
    ("F", false),
    ("true", true),
    ("false", false),
    ("TRUE", true),
    ("FALSE", false),
    ("y", true),
    ("n", false),
    ("yes", true),
    ("no", false),
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

pub(super) fn install(registry: &mut Registry) {
    registry.register("Object", |_, _| None);
    registry.register("String", |value, _| to_string(value));
    registry.register("Integer", |value, _| to_integer(value));
    registry.register("Float", |value, _| to_float(value).map(Value::Float));
    registry.register("Decimal", |value, _| to_decimal(value).map(Value::Decimal));
    registry.register("Boolean", |value, _| parse_boolean(value).map(Value::Bool));
    registry.register("Date", |value, _| to_date(value).map(Value::Date));
    registry.register("DateTime", |value, _| to_datetime(value).map(Value::DateTime));
    registry.register("Time", |value, _| to_time(value).map(Value::Time));
    registry.register("UUID", |value, _| match value {
        Value::String(s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
        _ => None,
    });
    registry.register("Array", |value, _| match value {
        Value::Array(items) => Some(Value::Array(items.clone())),
        Value::String(s) => Some(Value::Array(
            s.split(',').map(|part| Value::from(part.trim())).collect(),
        )),
        _ => None,
    });
    registry.register("Dict", |value, _| match value {
        Value::Dict(dict) => Some(Value::Dict(dict.clone())),
        _ => None,
    });
}

/// Boolean coercion shared with the nested-attributes `_destroy` flag.
pub fn parse_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Integer(1) => Some(true),
        Value::Integer(0) => Some(false),
        Value::String(s) => BOOLEAN_MAPPING
            .iter()
            .find(|(spelling, _)| *spelling == s.as_str())
            .map(|(_, flag)| *flag),
        _ => None,
    }
}

fn to_string(value: &Value) -> Option<Value> {
    match value {
        Value::Array(_) | Value::Dict(_) | Value::Model(_) | Value::Nil => None,
        other => Some(Value::String(other.to_string())),
    }
}

fn parse_float(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace('_', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn to_integer(value: &Value) -> Option<Value> {
    let truncated = match value {
        Value::Integer(i) => return Some(Value::Integer(*i)),
        Value::String(s) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                return Some(Value::Integer(i));
            }
            parse_float(s)?
        }
        Value::Float(f) if f.is_finite() => *f,
        Value::Decimal(d) => return d.trunc().to_i64().map(Value::Integer),
        _ => return None,
    };
    let truncated = truncated.trunc();
    if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return None;
    }
    Some(Value::Integer(truncated as i64))
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        Value::Decimal(d) => d.to_f64(),
        Value::String(s) => parse_float(s),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(d) => Some(*d),
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Float(f) if f.is_finite() => Decimal::from_str(&f.to_string()).ok(),
        Value::String(s) => {
            let trimmed = s.trim().replace('_', "");
            Decimal::from_str(&trimmed)
                .or_else(|_| Decimal::from_scientific(&trimmed))
                .ok()
        }
        _ => None,
    }
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::DateTime(dt) => Some(dt.date_naive()),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_datetime(s).map(|dt| dt.date_naive())),
        _ => None,
    }
}

fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()),
        Value::String(s) => parse_datetime(s).or_else(|| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

fn to_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::DateTime(dt) => Some(dt.time()),
        Value::String(s) => TIME_FORMATS
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(s.trim(), format).ok())
            .or_else(|| parse_datetime(s).map(|dt| dt.time())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typecast::Type;

    fn cast(ty: Type, value: impl Into<Value>) -> Option<Value> {
        Registry::with_builtins().coerce(&ty, &value.into()).unwrap()
    }

    #[test]
    fn integer_truncates_floats_and_numeric_strings() {
        assert_eq!(cast(Type::Integer, "2"), Some(Value::from(2)));
        assert_eq!(cast(Type::Integer, "1.9"), Some(Value::from(1)));
        assert_eq!(cast(Type::Integer, 3.7), Some(Value::from(3)));
        assert_eq!(cast(Type::Integer, "1_000"), Some(Value::from(1000)));
        assert_eq!(cast(Type::Integer, ""), None);
        assert_eq!(cast(Type::Integer, "abc"), None);
        assert_eq!(cast(Type::Integer, true), None);
    }

    #[test]
    fn float_parses_strings() {
        assert_eq!(cast(Type::Float, "1.5"), Some(Value::Float(1.5)));
        assert_eq!(cast(Type::Float, 2), Some(Value::Float(2.0)));
        assert_eq!(cast(Type::Float, "NaN"), None);
    }

    #[test]
    fn decimal_keeps_short_representation() {
        assert_eq!(
            cast(Type::Decimal, 0.1),
            Some(Value::Decimal(Decimal::from_str("0.1").unwrap()))
        );
        assert_eq!(
            cast(Type::Decimal, "12.50"),
            Some(Value::Decimal(Decimal::from_str("12.50").unwrap()))
        );
    }

    #[test]
    fn boolean_mapping() {
        for truthy in ["1", "true", "t", "yes", "y", "TRUE"] {
            assert_eq!(cast(Type::Boolean, truthy), Some(Value::Bool(true)), "{}", truthy);
        }
        for falsy in ["0", "false", "f", "no", "n", "FALSE"] {
            assert_eq!(cast(Type::Boolean, falsy), Some(Value::Bool(false)), "{}", falsy);
        }
        assert_eq!(cast(Type::Boolean, 1), Some(Value::Bool(true)));
        assert_eq!(cast(Type::Boolean, "maybe"), None);
        assert_eq!(cast(Type::Boolean, 2), None);
    }

    #[test]
    fn string_from_scalars() {
        assert_eq!(cast(Type::String, 12), Some(Value::from("12")));
        assert_eq!(cast(Type::String, false), Some(Value::from("false")));
        assert_eq!(cast(Type::String, Value::Array(vec![])), None);
    }

    #[test]
    fn dates_and_times() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        assert_eq!(cast(Type::Date, "2024-05-17"), Some(Value::Date(date)));
        assert_eq!(cast(Type::Date, "2024-05-17T10:00:00Z"), Some(Value::Date(date)));
        assert_eq!(cast(Type::Date, "not a date"), None);

        let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(cast(Type::DateTime, "2024-05-17"), Some(Value::DateTime(midnight)));
        assert_eq!(cast(Type::DateTime, Value::Date(date)), Some(Value::DateTime(midnight)));

        let seven = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        assert_eq!(cast(Type::Time, "07:30"), Some(Value::Time(seven)));
    }

    #[test]
    fn array_splits_strings() {
        assert_eq!(
            cast(Type::Array, "a, b,c"),
            Some(Value::Array(vec!["a".into(), "b".into(), "c".into()]))
        );
        assert_eq!(cast(Type::Array, 1), None);
    }

    #[test]
    fn uuid_parses_strings() {
        let id = Uuid::new_v4();
        assert_eq!(cast(Type::Uuid, id.to_string()), Some(Value::Uuid(id)));
        assert_eq!(cast(Type::Uuid, "nope"), None);
    }
}
