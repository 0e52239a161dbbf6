//! Regex strategy (§4.4): an ordered list of named patterns applied to the
//! input text; output is a mapping `name -> [matches]`.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};

use crawlforge_types::error::CrawlError;

use crate::{ExtractionContext, ExtractionStrategy};

#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub name: String,
    pub pattern: String,
}

pub struct RegexExtractor {
    patterns: Vec<NamedPattern>,
}

impl RegexExtractor {
    pub fn new(patterns: Vec<NamedPattern>) -> Self {
        Self { patterns }
    }
}

#[async_trait]
impl ExtractionStrategy for RegexExtractor {
    async fn extract(&self, input: &str, _ctx: &ExtractionContext<'_>) -> Result<Value, CrawlError> {
        let mut obj = Map::new();
        for named in &self.patterns {
            let re = Regex::new(&named.pattern).map_err(|e| CrawlError::ExtractionError {
                message: format!("invalid regex `{}` for `{}`: {e}", named.pattern, named.name),
            })?;

            let matches: Vec<Value> = re
                .find_iter(input)
                .map(|m| Value::String(m.as_str().to_string()))
                .collect();
            obj.insert(named.name.clone(), Value::Array(matches));
        }
        Ok(Value::Object(obj))
    }

    fn name(&self) -> &str {
        "regex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_matches_per_named_pattern_in_order() {
        let extractor = RegexExtractor::new(vec![
            NamedPattern { name: "emails".into(), pattern: r"[\w.]+@[\w.]+".into() },
            NamedPattern { name: "numbers".into(), pattern: r"\d+".into() },
        ]);
        let input = "contact a@example.com or b@example.com, order 123 of 456";
        let result = extractor
            .extract(input, &ExtractionContext { url: "https://example.com" })
            .await
            .unwrap();

        assert_eq!(result["emails"].as_array().unwrap().len(), 2);
        assert_eq!(result["numbers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_pattern_is_an_extraction_wide_failure() {
        let extractor = RegexExtractor::new(vec![NamedPattern { name: "bad".into(), pattern: "(".into() }]);
        let result = extractor.extract("text", &ExtractionContext { url: "https://example.com" }).await;
        assert!(result.is_err());
    }
}
