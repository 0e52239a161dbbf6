//! Declarative selector trees used by the schema-driven extraction strategies
//! (§4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Attribute,
    Html,
    Nested,
    List,
    NestedList,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransform {
    Strip,
    Lower,
    Upper,
    Int,
    Float,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionField {
    pub name: String,
    pub selector: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub attribute: Option<String>,
    pub transform: Option<FieldTransform>,
    pub default: Option<serde_json::Value>,
    /// Sub-schema used when `field_type` is `Nested` or `NestedList`.
    pub fields: Option<Vec<ExtractionField>>,
    /// Regex pattern + capture group, used when `field_type` is `Regex`.
    pub pattern: Option<String>,
    pub group: Option<usize>,
}

/// A named, immutable selector tree (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub name: String,
    pub base_selector: String,
    pub fields: Vec<ExtractionField>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_round_trips_through_json() {
        let schema = ExtractionSchema {
            name: "products".into(),
            base_selector: ".product".into(),
            fields: vec![ExtractionField {
                name: "name".into(),
                selector: "h2".into(),
                field_type: FieldType::Text,
                attribute: None,
                transform: None,
                default: None,
                fields: None,
                pattern: None,
                group: None,
            }],
        };
        let json = serde_json::to_string(&schema).unwrap();
        let back: ExtractionSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_selector, ".product");
        assert_eq!(back.fields.len(), 1);
    }
}
