use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use sowama_types::api::{Claims, SetRateRequest, UpdateTokenValueRequest, UpsertProductRequest};
use sowama_types::models::Product;

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn set_token_value(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTokenValueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub.to_string();
    let record = blocking(&state, move |engine| {
        engine.valuation.update_value(req.value, &actor, req.effective_at)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn set_rate(
    State(state): State<AppState>,
    Path(waste_type_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetRateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub.to_string();
    let rate = blocking(&state, move |engine| {
        engine.catalog.set_rate(&waste_type_id, req.points_per_kg, &actor)
    })
    .await?;
    Ok(Json(rate))
}

pub async fn upsert_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = Product {
        id: product_id,
        name: req.name,
        description: req.description,
        points_cost: req.points_cost,
        category: req.category,
        stock: req.stock,
    };
    let saved = product.clone();
    blocking(&state, move |engine| engine.marketplace.upsert_product(&saved)).await?;
    info!("Admin {} updated product {}", claims.sub, product.id);
    Ok(Json(product))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = blocking(&state, |engine| engine.system_stats()).await?;
    Ok(Json(stats))
}
