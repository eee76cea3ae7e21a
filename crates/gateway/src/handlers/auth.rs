//! Registration and login handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use peerdesk_common::{
    errors::Result,
    identity::{LoginResponse, RegisterRequest, RegisteredUser},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Create an author or reviewer account
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>)> {
    let registered = state.accounts.register(request).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let response = state.accounts.login(&request.email, &request.password).await?;
    Ok(Json(response))
}
