use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{Extractor, ExtractorError};
use crate::domain::{FieldMap, Schema};

/// Field extraction through an Ollama-compatible `/api/generate` endpoint.
///
/// The request asks for `format: "json"` so the model is forced to emit a
/// JSON object; the prompt carries the document text and the caller's
/// schema verbatim. The response object is normalized against the schema
/// before it leaves this adapter: every schema key is present, with JSON
/// `null` standing in for fields the model did not find.
pub struct OllamaExtractor {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaExtractor {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build never fails with valid TLS config");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn build_prompt(document_text: &str, schema: &Schema) -> String {
        let schema_json = serde_json::to_string_pretty(&Value::Object(schema.clone()))
            .unwrap_or_else(|_| "{}".to_string());
        format!(
            "You are an expert data extraction assistant. Extract information \
             from the text to match the provided JSON schema exactly.\n\n\
             **TEXT TO ANALYZE:**\n{document_text}\n\n\
             **REQUIRED JSON OUTPUT SCHEMA:**\n{schema_json}\n\n\
             Respond ONLY with valid JSON that matches this schema."
        )
    }
}

#[async_trait]
impl Extractor for OllamaExtractor {
    async fn extract(
        &self,
        document_text: &str,
        schema: &Schema,
    ) -> Result<FieldMap, ExtractorError> {
        if schema.is_empty() {
            return Err(ExtractorError::MalformedSchema(
                "schema contains no fields".to_string(),
            ));
        }

        let body = serde_json::json!({
            "model": self.model,
            "prompt": Self::build_prompt(document_text, schema),
            "format": "json",
            "stream": false,
        });

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractorError::Timeout
                } else {
                    ExtractorError::BackendUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractorError::BackendUnavailable(format!(
                "backend returned {status}: {text}"
            )));
        }

        let generated: GenerateResponse = response.json().await.map_err(|e| {
            ExtractorError::BackendUnavailable(format!("unreadable response body: {e}"))
        })?;

        // Invalid JSON from a model forced into json mode is a backend
        // fault, not a schema fault, so it stays retryable.
        let parsed: Value = serde_json::from_str(&generated.response).map_err(|e| {
            ExtractorError::BackendUnavailable(format!("model emitted invalid JSON: {e}"))
        })?;
        let fields = match parsed {
            Value::Object(map) => map,
            other => {
                return Err(ExtractorError::BackendUnavailable(format!(
                    "model emitted a JSON {} instead of an object",
                    json_type_name(&other)
                )));
            }
        };

        Ok(normalize(schema, fields))
    }
}

/// Keep exactly the schema's keys in the schema's order; a key the model
/// skipped becomes an explicit `null`, and keys the model invented are
/// dropped.
fn normalize(schema: &Schema, mut fields: FieldMap) -> FieldMap {
    schema
        .keys()
        .map(|key| (key.clone(), fields.remove(key).unwrap_or(Value::Null)))
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
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
    use serde_json::json;

    use super::*;

    fn schema_of(pairs: &[(&str, &str)]) -> Schema {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn given_missing_key_when_normalized_then_explicit_null() {
        let schema = schema_of(&[("vendor", "extract vendor"), ("total", "extract total")]);
        let mut fields = FieldMap::new();
        fields.insert("vendor".to_string(), json!("Acme"));

        let normalized = normalize(&schema, fields);
        assert_eq!(normalized["vendor"], json!("Acme"));
        assert_eq!(normalized["total"], Value::Null);
        assert!(normalized.contains_key("total"));
    }

    #[test]
    fn given_extra_keys_when_normalized_then_dropped_and_schema_order_kept() {
        let schema = schema_of(&[("total", "extract total"), ("vendor", "extract vendor")]);
        let mut fields = FieldMap::new();
        fields.insert("vendor".to_string(), json!("Acme"));
        fields.insert("hallucinated".to_string(), json!("noise"));
        fields.insert("total".to_string(), json!("$500"));

        let normalized = normalize(&schema, fields);
        let keys: Vec<&String> = normalized.keys().collect();
        assert_eq!(keys, ["total", "vendor"]);
    }

    #[test]
    fn given_schema_when_prompt_built_then_text_and_schema_embedded() {
        let schema = schema_of(&[("vendor", "extract the vendor name")]);
        let prompt = OllamaExtractor::build_prompt("Vendor: Acme.", &schema);
        assert!(prompt.contains("Vendor: Acme."));
        assert!(prompt.contains("extract the vendor name"));
        assert!(prompt.contains("Respond ONLY with valid JSON"));
    }
}
