use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::domain::error::AppError;
use crate::security::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: AuthUser,
}

/// `POST /auth/register` (§6). Rate limited 5/hour, keyed by client IP —
/// there's no authenticated subject yet at this boundary.
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> Result<(axum::http::StatusCode, Json<TokenResponse>), AppError> {
    state.rate_limit_register.check(&addr.ip().to_string())?;

    if req.password.len() < 8 {
        return Err(AppError::Validation("password must be at least 8 characters".to_string()));
    }

    let user = state.users.register(&req.email, &req.password, req.full_name.as_deref()).await?;
    let (access_token, _exp) = state.auth_service.issue_token(&user.id)?;

    Ok((axum::http::StatusCode::CREATED, Json(TokenResponse { access_token, token_type: "bearer", user })))
}

/// `POST /auth/login` (§6). Rate limited 10/min, keyed by client IP.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    state.rate_limit_login.check(&addr.ip().to_string())?;

    let user = state.users.authenticate(&req.email, &req.password).await?;
    let (access_token, _exp) = state.auth_service.issue_token(&user.id)?;

    Ok(Json(TokenResponse { access_token, token_type: "bearer", user }))
}
