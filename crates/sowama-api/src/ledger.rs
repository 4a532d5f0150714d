use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use sowama_types::api::{BalanceResponse, Claims, DeliveryRequest, DonationRequest, HistoryQuery};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

const MAX_HISTORY: u32 = 500;

pub async fn get_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let uid = user_id.clone();
    let points = blocking(&state, move |engine| engine.ledger.balance(&uid)).await?;
    Ok(Json(BalanceResponse { user_id, points }))
}

pub async fn get_balance_value(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let value = blocking(&state, move |engine| engine.value_of_balance(&user_id)).await?;
    Ok(Json(value))
}

pub async fn get_ledger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let limit = query.limit.clamp(1, MAX_HISTORY);
    let entries = blocking(&state, move |engine| {
        engine
            .ledger
            .history(&user_id, query.order)
            .with_page_size(limit)
            .take(limit as usize)
    })
    .await?;
    Ok(Json(entries))
}

pub async fn post_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeliveryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let entry = blocking(&state, move |engine| {
        engine
            .ledger
            .record_delivery(&user_id, &req.waste_type_id, req.mass_kg)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn post_donation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DonationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let entry = blocking(&state, move |engine| {
        engine
            .ledger
            .record_donation(&user_id, req.points, &req.project)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_impact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let snapshot = blocking(&state, move |engine| engine.impact_for(&user_id)).await?;
    Ok(Json(snapshot))
}

pub async fn get_system_impact(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = blocking(&state, |engine| engine.system_impact()).await?;
    Ok(Json(snapshot))
}
