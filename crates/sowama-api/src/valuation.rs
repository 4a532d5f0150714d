use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use sowama_types::api::ValueAtQuery;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn get_token(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = blocking(&state, |engine| engine.valuation.stats()).await?;
    Ok(Json(stats))
}

/// Record in force now, or at `?at=` when given.
pub async fn get_token_value(
    State(state): State<AppState>,
    Query(query): Query<ValueAtQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record = blocking(&state, move |engine| match query.at {
        Some(at) => engine.valuation.record_at(at),
        None => engine.valuation.current_record(),
    })
    .await?;
    Ok(Json(record))
}

pub async fn get_token_history(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let history = blocking(&state, |engine| engine.valuation.history()).await?;
    Ok(Json(history))
}
