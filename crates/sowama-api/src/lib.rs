pub mod admin;
pub mod catalog;
pub mod claims;
pub mod error;
pub mod events;
pub mod ledger;
pub mod marketplace;
pub mod middleware;
pub mod state;
pub mod valuation;

use axum::{
    Router, middleware as mw,
    routing::{get, post, put},
};

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;

pub async fn health() -> &'static str {
    "ok"
}

/// Every route of the rewards API. Layers such as CORS and tracing are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/token/value", post(admin::set_token_value))
        .route("/admin/waste-types/{id}/rate", put(admin::set_rate))
        .route("/admin/products/{id}", put(admin::upsert_product))
        .route("/admin/stats", get(admin::get_stats))
        .layer(mw::from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/balance", get(ledger::get_balance))
        .route("/balance/value", get(ledger::get_balance_value))
        .route("/ledger", get(ledger::get_ledger))
        .route("/deliveries", post(ledger::post_delivery))
        .route("/donations", post(ledger::post_donation))
        .route("/impact", get(ledger::get_impact))
        .route("/impact/system", get(ledger::get_system_impact))
        .route("/waste-types", get(catalog::list_waste_types))
        .route("/waste-types/{id}/rates", get(catalog::get_rate_history))
        .route("/products", get(marketplace::list_products))
        .route("/products/{id}/redeem", post(marketplace::redeem))
        .route("/token", get(valuation::get_token))
        .route("/token/value", get(valuation::get_token_value))
        .route("/token/history", get(valuation::get_token_history))
        .route("/claim", get(claims::get_claim))
        .route("/claim/history", get(claims::get_claim_history))
        .route("/claim/link", post(claims::link_account))
        .route("/claim/verify", post(claims::verify))
        .route("/claim/mint", post(claims::mint))
        .route("/claim/refresh", post(claims::refresh))
        .route("/claim/abandon", post(claims::abandon))
        .route("/events", get(events::stream_events))
        .merge(admin_routes)
        .layer(mw::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use sowama_db::Database;
    use sowama_engine::providers::PostLookup;
    use sowama_engine::testing::{ScriptedChain, ScriptedSocial};
    use sowama_engine::{Engine, EngineConfig, SystemClock};
    use sowama_types::api::{Claims, Role};

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    fn app() -> (Router, Arc<ScriptedSocial>) {
        let social = Arc::new(ScriptedSocial::new());
        let engine = Engine::new(
            Arc::new(Database::open_in_memory().unwrap()),
            social.clone(),
            Arc::new(ScriptedChain::new()),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
        .unwrap();
        (router(AppStateInner::new(engine, SECRET)), social)
    }

    fn token(sub: Uuid, role: Role) -> String {
        let claims = Claims {
            sub,
            role,
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_is_public_and_the_rest_is_not() {
        let (app, _) = app();
        let (status, _) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", "/balance", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/balance", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn delivery_credits_balance() {
        let (app, _) = app();
        let user = token(Uuid::new_v4(), Role::User);

        let (status, entry) = send(
            &app,
            "POST",
            "/deliveries",
            Some(&user),
            Some(json!({ "waste_type_id": "food_scraps", "mass_kg": 5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry["points_delta"], 100);
        assert_eq!(entry["kind"], "delivery");

        let (_, balance) = send(&app, "GET", "/balance", Some(&user), None).await;
        assert_eq!(balance["points"], 100);

        let (_, value) = send(&app, "GET", "/balance/value", Some(&user), None).await;
        assert_eq!(value["token_value_usd"], 0.01);

        let uri = "/ledger?order=oldest_first&limit=10";
        let (_, ledger) = send(&app, "GET", uri, Some(&user), None).await;
        assert_eq!(ledger.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_bad_request() {
        let (app, _) = app();
        let user = token(Uuid::new_v4(), Role::User);
        let (status, body) = send(
            &app,
            "POST",
            "/deliveries",
            Some(&user),
            Some(json!({ "waste_type_id": "food_scraps", "mass_kg": -2.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
    }

    #[tokio::test]
    async fn redemption_shortfall_is_reported() {
        let (app, _) = app();
        let admin = token(Uuid::new_v4(), Role::Admin);
        let user = token(Uuid::new_v4(), Role::User);

        let (status, _) = send(
            &app,
            "PUT",
            "/admin/products/p50",
            Some(&admin),
            Some(json!({
                "name": "Seed pack",
                "points_cost": 50,
                "category": "garden",
                "stock": 5
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        send(
            &app,
            "POST",
            "/deliveries",
            Some(&user),
            Some(json!({ "waste_type_id": "food_scraps", "mass_kg": 1.0 })),
        )
        .await;

        let (status, body) = send(&app, "POST", "/products/p50/redeem", Some(&user), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["shortfall"], 30);

        let (status, _) = send(&app, "POST", "/products/nope/redeem", Some(&user), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_need_admin_role() {
        let (app, _) = app();
        let user = token(Uuid::new_v4(), Role::User);
        let admin = token(Uuid::new_v4(), Role::Admin);
        let body = json!({ "value": 0.015 });

        let uri = "/admin/token/value";
        let (status, _) = send(&app, "POST", uri, Some(&user), Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, record) = send(&app, "POST", uri, Some(&admin), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["value"], 0.015);

        let (_, token_stats) = send(&app, "GET", "/token", Some(&user), None).await;
        assert_eq!(token_stats["current_value_usd"], 0.015);
        assert_eq!(token_stats["initial_value_usd"], 0.01);

        let (status, _) = send(
            &app,
            "PUT",
            "/admin/waste-types/food_scraps/rate",
            Some(&admin),
            Some(json!({ "points_per_kg": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn claim_flow_over_http() {
        let (app, social) = app();
        let user = token(Uuid::new_v4(), Role::User);

        let (status, _) = send(&app, "GET", "/claim", Some(&user), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, session) = send(
            &app,
            "POST",
            "/claim/link",
            Some(&user),
            Some(json!({ "handle": "ana", "access_token": "t" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["status"], "awaiting_post");

        social.push(Ok(PostLookup::found("tweet-9")));
        let (_, session) = send(&app, "POST", "/claim/verify", Some(&user), Some(json!({}))).await;
        assert_eq!(session["status"], "detected");
        assert!(session["gift_code"].as_str().unwrap().starts_with("GIFT_"));

        let (status, session) = send(
            &app,
            "POST",
            "/claim/mint",
            Some(&user),
            Some(json!({ "wallet_address": "0xabc" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(session["status"], "minting");

        let (status, body) = send(&app, "POST", "/claim/mint", Some(&user), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "duplicate_claim");

        let (_, session) = send(&app, "POST", "/claim/refresh", Some(&user), None).await;
        assert_eq!(session["status"], "minted");

        let (_, balance) = send(&app, "GET", "/balance", Some(&user), None).await;
        assert_eq!(balance["points"], 50);
    }
}
