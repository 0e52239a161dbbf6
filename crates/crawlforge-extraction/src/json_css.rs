//! JsonCss strategy (§4.4): `ExtractionSchema` driven by CSS selectors over
//! a `scraper::Html` document.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crawlforge_types::error::CrawlError;
use crawlforge_types::schema::{ExtractionField, ExtractionSchema, FieldType};

use crate::{transform, ExtractionContext, ExtractionStrategy};

pub struct JsonCssExtractor {
    schema: ExtractionSchema,
}

impl JsonCssExtractor {
    pub fn new(schema: ExtractionSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl ExtractionStrategy for JsonCssExtractor {
    async fn extract(&self, input: &str, _ctx: &ExtractionContext<'_>) -> Result<Value, CrawlError> {
        let document = Html::parse_document(input);
        let base_selector = Selector::parse(&self.schema.base_selector).map_err(|e| CrawlError::ExtractionError {
            message: format!("invalid base_selector `{}`: {e:?}", self.schema.base_selector),
        })?;

        let items: Vec<Value> = document
            .select(&base_selector)
            .map(|el| extract_object(&el, &self.schema.fields))
            .collect();

        Ok(Value::Array(items))
    }

    fn name(&self) -> &str {
        "json_css"
    }
}

/// Builds one object from `fields` against `scope`. A field that fails
/// (bad selector, regex that doesn't compile) becomes `{_error: "..."}`
/// under its own field name rather than failing the whole item (§4.4
/// "Failure semantics" — per-block errors stay within `success=true`).
fn extract_object(scope: &ElementRef<'_>, fields: &[ExtractionField]) -> Value {
    let mut obj = Map::new();
    for field in fields {
        let value = match extract_field(scope, field) {
            Ok(Some(v)) => v,
            Ok(None) => field.default.clone().unwrap_or(Value::Null),
            Err(message) => {
                let mut err = Map::new();
                err.insert("_error".to_string(), Value::String(message));
                Value::Object(err)
            }
        };
        obj.insert(field.name.clone(), value);
    }
    Value::Object(obj)
}

fn select_first<'a>(scope: &ElementRef<'a>, selector_str: &str) -> Result<Option<ElementRef<'a>>, String> {
    if selector_str.is_empty() || selector_str == ":scope" {
        return Ok(Some(*scope));
    }
    let selector =
        Selector::parse(selector_str).map_err(|e| format!("invalid selector `{selector_str}`: {e:?}"))?;
    Ok(scope.select(&selector).next())
}

fn select_all<'a>(scope: &ElementRef<'a>, selector_str: &str) -> Result<Vec<ElementRef<'a>>, String> {
    let selector =
        Selector::parse(selector_str).map_err(|e| format!("invalid selector `{selector_str}`: {e:?}"))?;
    Ok(scope.select(&selector).collect())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn extract_field(scope: &ElementRef<'_>, field: &ExtractionField) -> Result<Option<Value>, String> {
    match field.field_type {
        FieldType::Text => {
            let Some(target) = select_first(scope, &field.selector)? else { return Ok(None) };
            Ok(Some(transform::apply(&element_text(&target), field.transform)))
        }
        FieldType::Attribute => {
            let Some(target) = select_first(scope, &field.selector)? else { return Ok(None) };
            let attr_name = field.attribute.as_deref().unwrap_or("href");
            let Some(raw) = target.value().attr(attr_name) else { return Ok(None) };
            Ok(Some(transform::apply(raw, field.transform)))
        }
        FieldType::Html => {
            let Some(target) = select_first(scope, &field.selector)? else { return Ok(None) };
            Ok(Some(transform::apply(&target.html(), field.transform)))
        }
        FieldType::Nested => {
            let Some(target) = select_first(scope, &field.selector)? else { return Ok(None) };
            let sub_fields = field.fields.as_deref().unwrap_or(&[]);
            Ok(Some(extract_object(&target, sub_fields)))
        }
        FieldType::List => {
            let targets = select_all(scope, &field.selector)?;
            let values = targets
                .into_iter()
                .map(|t| transform::apply(&element_text(&t), field.transform))
                .collect();
            Ok(Some(Value::Array(values)))
        }
        FieldType::NestedList => {
            let targets = select_all(scope, &field.selector)?;
            let sub_fields = field.fields.as_deref().unwrap_or(&[]);
            let values = targets.into_iter().map(|t| extract_object(&t, sub_fields)).collect();
            Ok(Some(Value::Array(values)))
        }
        FieldType::Regex => {
            let Some(target) = select_first(scope, &field.selector)? else { return Ok(None) };
            let text = element_text(&target);
            let Some(pattern) = &field.pattern else {
                return Err("regex field type requires `pattern`".to_string());
            };
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex `{pattern}`: {e}"))?;
            let Some(caps) = re.captures(&text) else { return Ok(None) };
            let group = field.group.unwrap_or(0);
            let Some(m) = caps.get(group) else { return Ok(None) };
            Ok(Some(transform::apply(m.as_str(), field.transform)))
        }
    }
}
