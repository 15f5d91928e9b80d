//! Type coercion and cleaning per field kind
//!
//! Each [`FieldKind`] accepts a small set of JSON shapes and produces one
//! canonical output shape. Booleans coerce to integers before any numeric
//! validation, so `false` becomes `0` rather than being treated as missing.

use crate::core::entity::FieldKind;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is a valid regex"))
}

/// Validate and clean a non-null value for the given kind
///
/// # Errors
///
/// Returns a human-readable reason when the value cannot represent the kind.
pub fn clean_value(kind: FieldKind, value: &Value) -> Result<Value, String> {
    match kind {
        FieldKind::Int => to_int(value),
        FieldKind::Float => to_float(value),
        FieldKind::Bool => to_bool_int(value),
        FieldKind::Text => to_text(value).map(|s| Value::String(strip_tags(&s))),
        FieldKind::Raw => to_text(value).map(|s| Value::String(strip_control_chars(&s))),
    }
}

/// 2^63; every integral f64 in `[-2^63, 2^63)` fits an i64
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn to_int(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && (-I64_LIMIT..I64_LIMIT).contains(&f) => {
                        Ok(Value::from(f as i64))
                    }
                    Some(f) if f.fract() == 0.0 && f.is_finite() => {
                        Err(format!("integer {n} is out of range"))
                    }
                    _ => Err(format!("expected an integer, got {n}")),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("expected an integer, got string '{s}'")),
        other => Err(format!("expected an integer, got {}", type_name(other))),
    }
}

fn to_float(value: &Value) -> Result<Value, String> {
    let f = match value {
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("expected a number, got {n}"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected a number, got string '{s}'"))?,
        other => return Err(format!("expected a number, got {}", type_name(other))),
    };

    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("number {f} is not finite"))
}

fn to_bool_int(value: &Value) -> Result<Value, String> {
    let flag = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => return Err(format!("expected 0 or 1, got {n}")),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "0" | "false" | "" => false,
            "1" | "true" => true,
            _ => return Err(format!("expected a boolean, got string '{s}'")),
        },
        other => return Err(format!("expected a boolean, got {}", type_name(other))),
    };
    Ok(Value::from(i64::from(flag)))
}

fn to_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected text, got {}", type_name(other))),
    }
}

/// Remove HTML tags and surrounding whitespace
pub fn strip_tags(input: &str) -> String {
    tag_pattern().replace_all(input, "").trim().to_string()
}

/// Remove control characters other than tab, newline and carriage return
pub fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(json!(5), json!(5); "integer")]
    #[test_case(json!("17"), json!(17); "numeric string")]
    #[test_case(json!(3.0), json!(3); "integral float")]
    #[test_case(json!(false), json!(0); "false is zero")]
    #[test_case(json!(true), json!(1); "true is one")]
    #[test_case(json!(-9_223_372_036_854_775_808.0), json!(i64::MIN); "i64 min as float")]
    fn test_int_accepts(input: Value, expected: Value) {
        assert_eq!(clean_value(FieldKind::Int, &input).unwrap(), expected);
    }

    #[test_case(json!(2.5); "fractional float")]
    #[test_case(json!("abc"); "non numeric string")]
    #[test_case(json!([1]); "array")]
    #[test_case(json!(u64::MAX); "above i64 max")]
    #[test_case(json!(1e19); "large float")]
    #[test_case(json!(-1e19); "large negative float")]
    fn test_int_rejects(input: Value) {
        assert!(clean_value(FieldKind::Int, &input).is_err());
    }

    #[test_case(json!(false), json!(0); "false")]
    #[test_case(json!(true), json!(1); "true")]
    #[test_case(json!(1), json!(1); "one")]
    #[test_case(json!("0"), json!(0); "string zero")]
    #[test_case(json!("true"), json!(1); "string true")]
    fn test_bool_exports_as_int(input: Value, expected: Value) {
        assert_eq!(clean_value(FieldKind::Bool, &input).unwrap(), expected);
    }

    #[test]
    fn test_bool_rejects_other_numbers() {
        assert!(clean_value(FieldKind::Bool, &json!(2)).is_err());
    }

    #[test]
    fn test_float_parsing() {
        assert_eq!(clean_value(FieldKind::Float, &json!("7.25")).unwrap(), json!(7.25));
        assert_eq!(clean_value(FieldKind::Float, &json!(3)).unwrap(), json!(3.0));
        assert!(clean_value(FieldKind::Float, &json!({})).is_err());
    }

    #[test]
    fn test_text_strips_tags() {
        let cleaned = clean_value(FieldKind::Text, &json!("  <p>Hello <b>world</b></p> ")).unwrap();
        assert_eq!(cleaned, json!("Hello world"));
    }

    #[test]
    fn test_raw_keeps_markup() {
        let cleaned = clean_value(FieldKind::Raw, &json!("<p>Hi\u{0000}\nthere</p>")).unwrap();
        assert_eq!(cleaned, json!("<p>Hi\nthere</p>"));
    }

    #[test]
    fn test_text_accepts_numbers() {
        assert_eq!(clean_value(FieldKind::Text, &json!(42)).unwrap(), json!("42"));
    }
}
