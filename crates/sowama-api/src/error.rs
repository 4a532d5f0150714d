use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use sowama_engine::{Engine, EngineError};
use sowama_types::api::ErrorBody;

use crate::state::AppState;

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// A blocking task panicked or was cancelled.
    Internal,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientBalance { .. }
        | EngineError::OutOfStock(_)
        | EngineError::DuplicateClaim(_)
        | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "internal_error",
                    message: "internal error".into(),
                    shortfall: None,
                },
            ),
            Self::Engine(e) => {
                let status = status_for(&e);
                let shortfall = match &e {
                    EngineError::InsufficientBalance { shortfall, .. } => Some(*shortfall),
                    _ => None,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Request failed: {:#}", e);
                    "internal error".to_string()
                } else {
                    e.to_string()
                };
                (
                    status,
                    ErrorBody {
                        error: e.kind(),
                        message,
                        shortfall,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Runs a synchronous engine call off the async runtime.
pub async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sowama_engine::ProviderError;

    #[test]
    fn business_errors_map_to_client_statuses() {
        assert_eq!(
            status_for(&EngineError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::DuplicateClaim("GIFT_1_A".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ProviderError::Timeout("social bridge".into()).into()),
            StatusCode::BAD_GATEWAY
        );
    }
}
