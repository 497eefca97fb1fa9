//! Document extraction handlers
//!
//! Single-document extraction plus a batch form that merges successful
//! same-type results. A bad file in a batch produces a failed outcome for
//! that file only; the rest of the batch proceeds.

use crate::AppState;
use axum::{extract::State, Json};
use base64::Engine;
use claimforge_common::errors::{AppError, Result};
use claimforge_engine::extract::{merge_extracted, DocumentType, ExtractionOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ExtractRequest {
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,

    pub document_type: DocumentType,

    /// Document bytes, standard base64
    #[validate(length(min = 1))]
    pub file_base64: String,

    #[validate(length(min = 1, max = 128))]
    pub mime_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtractBatchRequest {
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,

    #[validate(length(min = 1, max = 20))]
    pub documents: Vec<BatchDocument>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BatchDocument {
    pub document_type: DocumentType,
    pub file_base64: String,
    pub mime_type: String,
}

#[derive(Serialize)]
pub struct ExtractBatchResponse {
    pub results: Vec<ExtractionOutcome>,
    /// Successful results merged per document type
    pub merged: BTreeMap<String, Value>,
}

fn decode_file(file_base64: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(file_base64)
        .map_err(|e| AppError::InvalidFormat {
            message: format!("file_base64 is not valid base64: {e}"),
        })
}

/// Extract one document
pub async fn extract_document(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractionOutcome>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let bytes = decode_file(&request.file_base64)?;
    let outcome = state
        .extractor
        .extract(request.document_type, &bytes, &request.mime_type)
        .await?;

    Ok(Json(outcome))
}

/// Extract a batch of documents and merge same-type results
pub async fn extract_batch(
    State(state): State<AppState>,
    Json(request): Json<ExtractBatchRequest>,
) -> Result<Json<ExtractBatchResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let mut results = Vec::with_capacity(request.documents.len());
    for doc in &request.documents {
        let outcome = match decode_file(&doc.file_base64) {
            Ok(bytes) => {
                match state
                    .extractor
                    .extract(doc.document_type, &bytes, &doc.mime_type)
                    .await
                {
                    Ok(outcome) => outcome,
                    // Mime rejection fails this file only inside a batch
                    Err(e) => failed_outcome(doc.document_type, e.to_string()),
                }
            }
            Err(e) => failed_outcome(doc.document_type, e.to_string()),
        };
        results.push(outcome);
    }

    let mut merged = BTreeMap::new();
    for document_type in [
        DocumentType::Dd214,
        DocumentType::RatingDecision,
        DocumentType::MedicalRecord,
    ] {
        let values: Vec<Value> = results
            .iter()
            .filter(|o| o.success && o.document_type == document_type)
            .filter_map(|o| o.data.clone())
            .collect();
        if !values.is_empty() {
            merged.insert(document_type.as_str().to_string(), merge_extracted(&values));
        }
    }

    Ok(Json(ExtractBatchResponse { results, merged }))
}

fn failed_outcome(document_type: DocumentType, error: String) -> ExtractionOutcome {
    ExtractionOutcome {
        success: false,
        document_type,
        data: None,
        error: Some(error),
        raw_response: None,
    }
}
