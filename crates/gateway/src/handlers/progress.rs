//! Application progress handler

use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use claimforge_common::errors::Result;
use claimforge_engine::ProgressReport;

/// Report the six-step application progress for a user
pub async fn get_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ProgressReport>> {
    let report = ProgressReport::load(state.store.as_ref(), &user_id).await?;
    Ok(Json(report))
}
