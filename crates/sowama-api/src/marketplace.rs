use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use sowama_engine::RedemptionFailure;
use sowama_types::api::{Claims, ProductQuery, RedemptionResponse};

use crate::error::{ApiError, blocking};
use crate::state::AppState;

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let products = blocking(&state, move |engine| {
        engine.marketplace.products(query.category.as_deref())
    })
    .await?;
    Ok(Json(products))
}

/// Failed redemptions still answer with a redemption body, so the client
/// can show the shortfall.
pub async fn redeem(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let result = blocking(&state, move |engine| {
        engine.marketplace.redeem(&user_id, &product_id)
    })
    .await?;

    let status = match &result.reason {
        None => StatusCode::OK,
        Some(RedemptionFailure::NotFound) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::CONFLICT,
    };
    let shortfall = match &result.reason {
        Some(RedemptionFailure::InsufficientBalance { shortfall, .. }) => Some(*shortfall),
        _ => None,
    };

    Ok((
        status,
        Json(RedemptionResponse {
            success: result.success,
            entry: result.entry,
            reason: result.reason.map(|r| r.to_string()),
            shortfall,
        }),
    ))
}
