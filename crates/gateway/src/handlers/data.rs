//! Data gateway handler
//!
//! One endpoint, one logical operation per request. An unrecognized
//! operation name is rejected as a transport-level 400; a recognized
//! operation that fails (validation, constraint, missing row on update)
//! comes back inside the `{data, error}` envelope with a 200.

use crate::AppState;
use axum::{extract::State, Json};
use claimforge_common::errors::{AppError, Result};
use claimforge_common::gateway::{self, Envelope, Operation};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct DataRequest {
    /// Logical operation name, snake_case
    pub operation: String,

    /// Acting user; every operation is scoped to this identity
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,

    /// Operation payload, where required
    #[serde(default)]
    pub data: Option<Value>,

    /// Target row id, for by-id operations
    #[serde(default)]
    pub id: Option<Uuid>,
}

/// Execute one gateway operation
pub async fn data_operation(
    State(state): State<AppState>,
    Json(request): Json<DataRequest>,
) -> Result<Json<Envelope>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let op = Operation::parse(&request.operation)?;

    let envelope = match gateway::execute(
        state.store.as_ref(),
        op,
        &request.user_id,
        request.data,
        request.id,
    )
    .await
    {
        Ok(data) => Envelope::ok(data),
        Err(e) => {
            warn!(operation = %request.operation, error = %e, "data operation failed");
            Envelope::err(e.to_string())
        }
    };

    Ok(Json(envelope))
}
