use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;

use pushlog_core::{DiffError, DiffRequest};
use pushlog_diff::{DataTree, FileDiff};

use super::AppState;

pub async fn get_diff(
    State(state): State<AppState>,
    Query(request): Query<DiffRequest>,
) -> Result<Json<DataTree<FileDiff>>, (StatusCode, String)> {
    let tree = state
        .diffs
        .diff(request)
        .await
        .map_err(|e| (status_for(&e), e.to_string()))?;

    Ok(Json(tree))
}

fn status_for(err: &DiffError) -> StatusCode {
    match err {
        DiffError::UnknownRepository(_) => StatusCode::NOT_FOUND,
        err if err.is_bad_request() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
