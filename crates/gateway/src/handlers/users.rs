//! Reviewer administration handlers

use crate::AppState;
use axum::{extract::State, Json};
use peerdesk_common::{auth::Caller, errors::Result, identity::UserProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ReviewerStatusRequest {
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    /// APPROVED or REJECTED
    pub status: String,
}

#[derive(Serialize)]
pub struct ReviewerStatusResponse {
    pub message: String,
    pub user: UserProfile,
}

/// Reviewer applications awaiting a decision
pub async fn pending_reviewers(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<UserProfile>>> {
    Ok(Json(state.accounts.list_pending_reviewers(&caller).await?))
}

/// Approved reviewers available for assignment
pub async fn reviewers(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<UserProfile>>> {
    Ok(Json(state.accounts.list_reviewers(&caller).await?))
}

pub async fn reviewer_status(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReviewerStatusRequest>,
) -> Result<Json<ReviewerStatusResponse>> {
    let user = state
        .accounts
        .set_reviewer_status(&caller, request.user_id, &request.status)
        .await?;

    Ok(Json(ReviewerStatusResponse {
        message: format!("Reviewer {}", user.reviewer_status),
        user,
    }))
}
