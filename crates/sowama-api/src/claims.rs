use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use sowama_engine::EngineError;
use sowama_engine::providers::SocialCredentials;
use sowama_types::api::{Claims, LinkSocialRequest, MintRequest, VerifyPostRequest};

use crate::error::ApiError;
use crate::state::AppState;

// Claim operations are async all the way down; the machine moves its own
// store calls onto the blocking pool.

pub async fn get_claim(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .engine
        .claims
        .session(&claims.sub.to_string())
        .await?
        .ok_or_else(|| EngineError::NotFound("claim session".into()))?;
    Ok(Json(session))
}

pub async fn get_claim_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.engine.claims.history(&claims.sub.to_string()).await?;
    Ok(Json(history))
}

pub async fn link_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LinkSocialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = SocialCredentials {
        handle: req.handle,
        access_token: req.access_token,
    };
    let session = state
        .engine
        .claims
        .link_account(&claims.sub.to_string(), credentials)
        .await?;
    Ok(Json(session))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .engine
        .claims
        .request_verification(&claims.sub.to_string(), req.min_weight_kg, req.location)
        .await?;
    Ok(Json(session))
}

pub async fn mint(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .engine
        .claims
        .submit_claim(&claims.sub.to_string(), req.wallet_address)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(session)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.engine.claims.refresh(&claims.sub.to_string()).await?;
    Ok(Json(session))
}

pub async fn abandon(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.claims.abandon(&claims.sub.to_string()).await?;
    Ok(StatusCode::NO_CONTENT)
}
