//! Handlers for the `/job` resource.

use axum::extract::{Path, Query, State};
use axum::Json;
use lightbake_core::job::{JobSnapshot, JobView};
use lightbake_core::types::JobId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Query parameters for polling a job.
#[derive(Debug, Default, Deserialize)]
pub struct PollQuery {
    /// Number of progress events the caller has already consumed.
    #[serde(default)]
    pub offset: usize,
}

/// GET /api/job/{id}?offset=N
///
/// Returns the job status plus every progress event from `offset` onwards.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Query(query): Query<PollQuery>,
) -> AppResult<Json<JobView>> {
    let view = state.registry.get(id, query.offset)?;
    Ok(Json(view))
}

/// DELETE /api/job/{id}
///
/// Cancels a running job and returns its last known snapshot. Responds
/// 404 once the job has finished or was already cancelled.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<Json<JobSnapshot>> {
    let snapshot = state.registry.cancel(id)?;
    Ok(Json(snapshot))
}
