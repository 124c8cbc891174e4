use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::services::{AuthenticateUserRequest, RegisterUserRequest};
use domain::Username;

use crate::{auth::LoginResponse, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    username: Username,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/me", get(current_user))
        .route("/logout", post(logout_user))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<Value>, ApiError> {
    state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok(Json(json!({ "success": true })))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(&user.username)?;
    tracing::info!(username = %user.username, "用户登录");

    Ok(Json(LoginResponse {
        success: true,
        username: user.username,
        token,
    }))
}

async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiError> {
    let username = state.jwt_service.extract_user_from_headers(&headers)?;
    Ok(Json(MeResponse { username }))
}

/// 令牌无状态，登出只需客户端丢弃令牌
async fn logout_user() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(state).run(socket).await;
    })
}
