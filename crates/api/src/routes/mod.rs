pub mod bake;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /bake/{kind}/{game}/{name}     submit a bake (POST, binary body)
/// /job/{id}                      poll (GET ?offset=N), cancel (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bake", bake::router())
        .nest("/job", jobs::router())
}
