//! Field value transforms (§4.4: `strip`/`lower`/`upper`/`int`/`float`/`json`),
//! shared by the JsonCss and JsonXPath strategies.

use crawlforge_types::schema::FieldTransform;
use serde_json::Value;

/// Applies `transform` to a freshly-extracted string value. `Int`/`Float`
/// that fail to parse fall back to the raw string rather than erroring the
/// whole field — a malformed number is still useful as text.
pub fn apply(raw: &str, transform: Option<FieldTransform>) -> Value {
    match transform {
        None => Value::String(raw.to_string()),
        Some(FieldTransform::Strip) => Value::String(raw.trim().to_string()),
        Some(FieldTransform::Lower) => Value::String(raw.to_lowercase()),
        Some(FieldTransform::Upper) => Value::String(raw.to_uppercase()),
        Some(FieldTransform::Int) => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(FieldTransform::Float) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(FieldTransform::Json) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_transform_parses_and_falls_back_on_failure() {
        assert_eq!(apply("42", Some(FieldTransform::Int)), Value::from(42));
        assert_eq!(apply("abc", Some(FieldTransform::Int)), Value::String("abc".to_string()));
    }

    #[test]
    fn json_transform_parses_embedded_json() {
        let value = apply(r#"{"a":1}"#, Some(FieldTransform::Json));
        assert_eq!(value["a"], Value::from(1));
    }

    #[test]
    fn strip_trims_whitespace() {
        assert_eq!(apply("  hi  ", Some(FieldTransform::Strip)), Value::String("hi".to_string()));
    }
}
