use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn list_waste_types(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let types = blocking(&state, |engine| engine.catalog.list()).await?;
    Ok(Json(types))
}

pub async fn get_rate_history(
    State(state): State<AppState>,
    Path(waste_type_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rates = blocking(&state, move |engine| engine.catalog.rate_history(&waste_type_id)).await?;
    Ok(Json(rates))
}
