//! Handler for bake submission.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use lightbake_core::bake::{BakeKind, BakeParams, BakeRequest};
use lightbake_core::job::SubmitResponse;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/bake/{kind}/{game}/{name}
///
/// The request body is the scene to bake; quality settings come from the
/// query string. Returns the id of the registered job right away; the bake
/// itself runs in the background.
pub async fn submit_bake(
    State(state): State<AppState>,
    Path((kind, game, name)): Path<(BakeKind, String, String)>,
    Query(params): Query<BakeParams>,
    body: Bytes,
) -> AppResult<Json<SubmitResponse>> {
    if body.is_empty() {
        return Err(AppError::BadRequest(
            "Request body must contain the scene to bake".into(),
        ));
    }

    let request = BakeRequest {
        kind,
        game,
        name,
        params,
    };
    let job_id = state.baker.submit(&state.registry, request, &body).await?;

    Ok(Json(SubmitResponse { job_id }))
}
