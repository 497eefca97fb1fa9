//! Document extraction service
//!
//! Turns an uploaded DD-214, rating decision, or medical record into a
//! structured object by sending the document to the vision model with a
//! fixed per-type instruction template and parsing the first JSON object
//! out of the free-form reply. Pure bytes in, structure out: nothing here
//! touches the store.

use crate::model::{ContentBlock, MediaSource, ModelClient, ModelMessage, ModelRequest};
use base64::Engine;
use claimforge_common::errors::{AppError, Result};
use claimforge_common::types::claim_key;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
];

const EXTRACTION_SYSTEM: &str = "\
You extract structured data from veterans' documents. Reply with a single \
JSON object and nothing else. Use snake_case field names, numbers as \
numbers, dates as YYYY-MM-DD strings, and null for anything you cannot \
read from the document. Never guess.";

/// Closed set of supported document categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Dd214,
    RatingDecision,
    MedicalRecord,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Dd214 => "dd214",
            DocumentType::RatingDecision => "rating_decision",
            DocumentType::MedicalRecord => "medical_record",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            DocumentType::Dd214 => {
                "This is a DD-214 (Certificate of Release or Discharge from \
                 Active Duty). Extract: {\"first_name\", \"middle_name\", \
                 \"last_name\", \"date_of_birth\", \"branch\" (one of: army, \
                 navy, air_force, marines, coast_guard, space_force, \
                 national_guard, reserves), \"service_start_date\", \
                 \"service_end_date\", \"discharge_type\", \
                 \"rank_at_separation\"}."
            }
            DocumentType::RatingDecision => {
                "This is a VA rating decision letter. Extract: \
                 {\"combined_rating\" (integer percentage 0-100), \
                 \"effective_date\", \"monthly_compensation_cents\" (integer \
                 cents), \"claims\": [{\"title\", \"diagnostic_code\", \
                 \"description\", \"rating\" (integer percentage)}]}."
            }
            DocumentType::MedicalRecord => {
                "This is a medical record. Extract: {\"provider\", \
                 \"treatment_facility\", \"claims\": [{\"title\" (condition \
                 name), \"diagnostic_code\", \"description\", \
                 \"onset_date\"}]}."
            }
        }
    }
}

/// Tolerates model output that does not match the requested shape: a field
/// that fails to deserialize becomes None instead of failing the document
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dd214Data {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub date_of_birth: Option<chrono::NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub branch: Option<claimforge_common::types::ServiceBranch>,
    #[serde(default, deserialize_with = "lenient")]
    pub service_start_date: Option<chrono::NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub service_end_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub discharge_type: Option<String>,
    #[serde(default)]
    pub rank_at_separation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedClaim {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub diagnostic_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rating: Option<i16>,
    #[serde(default, deserialize_with = "lenient")]
    pub onset_date: Option<chrono::NaiveDate>,
}

impl ExtractedClaim {
    pub fn key(&self) -> Option<String> {
        claim_key(
            self.diagnostic_code.as_deref(),
            self.title.as_deref(),
            self.description.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingDecisionData {
    #[serde(default, deserialize_with = "lenient")]
    pub combined_rating: Option<i16>,
    #[serde(default, deserialize_with = "lenient")]
    pub effective_date: Option<chrono::NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    pub monthly_compensation_cents: Option<i64>,
    #[serde(default)]
    pub claims: Vec<ExtractedClaim>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalRecordData {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub treatment_facility: Option<String>,
    #[serde(default)]
    pub claims: Vec<ExtractedClaim>,
}

/// Result of extracting one document; failures are data, not errors, so a
/// bad file never blocks the rest of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

pub struct Extractor {
    model: Arc<dyn ModelClient>,
}

impl Extractor {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Extract one document. An unsupported mime type fails fast before any
    /// upstream call; model and parse failures come back as an unsuccessful
    /// outcome instead.
    pub async fn extract(
        &self,
        document_type: DocumentType,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionOutcome> {
        if !ACCEPTED_MIME_TYPES.contains(&mime_type) {
            return Err(AppError::UnsupportedMediaType {
                mime_type: mime_type.to_string(),
            });
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let source = MediaSource::base64(mime_type, encoded);
        let media_block = if mime_type == "application/pdf" {
            ContentBlock::Document { source }
        } else {
            ContentBlock::Image { source }
        };

        let request = ModelRequest {
            system: EXTRACTION_SYSTEM.to_string(),
            messages: vec![ModelMessage::user(vec![
                media_block,
                ContentBlock::text(document_type.instructions()),
            ])],
            tools: vec![],
        };

        let reply = match self.model.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(document_type = document_type.as_str(), error = %e, "extraction upstream failed");
                return Ok(ExtractionOutcome {
                    success: false,
                    document_type,
                    data: None,
                    error: Some(e.to_string()),
                    raw_response: None,
                });
            }
        };

        let text: String = reply
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        Ok(self.parse_reply(document_type, &text))
    }

    fn parse_reply(&self, document_type: DocumentType, text: &str) -> ExtractionOutcome {
        let Some(object) = first_json_object(text) else {
            return ExtractionOutcome {
                success: false,
                document_type,
                data: None,
                error: Some("no JSON object found in model reply".to_string()),
                raw_response: Some(text.to_string()),
            };
        };

        let parsed: std::result::Result<Value, _> = match document_type {
            DocumentType::Dd214 => serde_json::from_str::<Dd214Data>(object)
                .and_then(|d| serde_json::to_value(&d)),
            DocumentType::RatingDecision => serde_json::from_str::<RatingDecisionData>(object)
                .and_then(|d| serde_json::to_value(&d)),
            DocumentType::MedicalRecord => serde_json::from_str::<MedicalRecordData>(object)
                .and_then(|d| serde_json::to_value(&d)),
        };

        match parsed {
            Ok(data) => {
                info!(document_type = document_type.as_str(), "document extracted");
                ExtractionOutcome {
                    success: true,
                    document_type,
                    data: Some(data),
                    error: None,
                    raw_response: None,
                }
            }
            Err(e) => ExtractionOutcome {
                success: false,
                document_type,
                data: None,
                error: Some(format!("malformed extraction object: {e}")),
                raw_response: Some(text.to_string()),
            },
        }
    }
}

/// Locate the first top-level JSON object in free-form text. Brace matching
/// respects string literals and escape sequences, so a `{` inside a quoted
/// value never opens a scope.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Merge successful same-type extractions from a batch of documents.
///
/// Scalar fields: the most recently seen non-null value wins. `claims`
/// arrays: union across documents, deduplicated by claim key with the first
/// occurrence kept.
pub fn merge_extracted(values: &[Value]) -> Value {
    let mut merged = serde_json::Map::new();
    let mut claims: Vec<Value> = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for value in values {
        let Some(object) = value.as_object() else {
            continue;
        };
        for (field, field_value) in object {
            if field == "claims" {
                for claim in field_value.as_array().into_iter().flatten() {
                    let key = claim_key(
                        claim["diagnostic_code"].as_str(),
                        claim["title"].as_str(),
                        claim["description"].as_str(),
                    );
                    match key {
                        Some(key) => {
                            if seen_keys.insert(key) {
                                claims.push(claim.clone());
                            }
                        }
                        // A claim with no identifying text at all is noise
                        None => {}
                    }
                }
            } else if !field_value.is_null() {
                merged.insert(field.clone(), field_value.clone());
            }
        }
    }

    if !claims.is_empty() || values.iter().any(|v| v.get("claims").is_some()) {
        merged.insert("claims".to_string(), Value::Array(claims));
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelReply, ScriptedModel};
    use serde_json::json;

    fn reply_with(text: &str) -> ModelReply {
        ModelReply {
            blocks: vec![ContentBlock::text(text)],
            stop_reason: Some("end_turn".into()),
        }
    }

    #[test]
    fn finds_first_object_in_prose() {
        let text = r#"Here is what I found: {"first_name": "Jane"} hope that helps"#;
        assert_eq!(first_json_object(text), Some(r#"{"first_name": "Jane"}"#));
    }

    #[test]
    fn braces_inside_strings_do_not_open_scopes() {
        let text = r#"{"description": "notes {with} braces and a quote \" mark", "rating": 30}"#;
        let object = first_json_object(text).unwrap();
        let parsed: Value = serde_json::from_str(object).unwrap();
        assert_eq!(parsed["rating"], 30);
    }

    #[test]
    fn no_object_yields_none() {
        assert!(first_json_object("I could not read this document.").is_none());
        assert!(first_json_object("unbalanced { forever").is_none());
    }

    #[tokio::test]
    async fn unsupported_mime_fails_before_upstream() {
        // An exhausted script errors if called; rejection must come first
        let extractor = Extractor::new(Arc::new(ScriptedModel::new(vec![])));
        let err = extractor
            .extract(DocumentType::Dd214, b"%!PS", "application/postscript")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));
    }

    #[tokio::test]
    async fn successful_extraction_yields_typed_data() {
        let model = ScriptedModel::new(vec![reply_with(
            r#"Sure. {"first_name": "Jane", "last_name": "Doe", "branch": "army",
                "service_start_date": "2001-06-15", "date_of_birth": null}"#,
        )]);
        let extractor = Extractor::new(Arc::new(model));

        let outcome = extractor
            .extract(DocumentType::Dd214, b"pdfbytes", "application/pdf")
            .await
            .unwrap();
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["first_name"], "Jane");
        assert_eq!(data["branch"], "army");
        assert!(data["date_of_birth"].is_null());
    }

    #[tokio::test]
    async fn reply_without_json_is_a_failed_outcome_with_raw_text() {
        let model = ScriptedModel::new(vec![reply_with("I cannot read this image.")]);
        let extractor = Extractor::new(Arc::new(model));

        let outcome = extractor
            .extract(DocumentType::MedicalRecord, b"img", "image/png")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.raw_response.as_deref(),
            Some("I cannot read this image.")
        );
    }

    #[test]
    fn batch_merge_dedups_claims_and_keeps_latest_scalars() {
        let first = json!({
            "combined_rating": 30,
            "effective_date": null,
            "claims": [
                {"title": "Tinnitus", "diagnostic_code": "6260"},
                {"title": "Knee strain", "diagnostic_code": null}
            ]
        });
        let second = json!({
            "combined_rating": 50,
            "effective_date": "2020-01-01",
            "claims": [
                {"title": "Ringing in ears", "diagnostic_code": "6260"},
                {"title": "PTSD", "diagnostic_code": "9411"}
            ]
        });

        let merged = merge_extracted(&[first, second]);
        assert_eq!(merged["combined_rating"], 50);
        assert_eq!(merged["effective_date"], "2020-01-01");

        let claims = merged["claims"].as_array().unwrap();
        // 6260 dedups across documents, first occurrence kept
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[0]["title"], "Tinnitus");
    }
}
