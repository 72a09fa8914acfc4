//! Route definitions for the `/job` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/job`.
///
/// ```text
/// GET    /{id}?offset=N   -> get_job
/// DELETE /{id}            -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(jobs::get_job).delete(jobs::cancel_job))
}
