use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use pushlog_db::RepositoryRecord;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub archived: bool,
}

pub async fn list_repositories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RepositoryRecord>>, (StatusCode, String)> {
    let repositories = state
        .db
        .repositories()
        .list(params.archived)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(repositories))
}
