//! Paper submission and review workflow handlers

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use peerdesk_common::{
    auth::{Caller, OptionalCaller},
    errors::{AppError, Result},
    identity::AuthorDetails,
    review::{PaperView, PublishedPaper, SubmissionRequest},
    storage::Upload,
};

/// Body for assign / remove reviewer
#[derive(Debug, Deserialize)]
pub struct ReviewerRequest {
    #[serde(alias = "paperId")]
    pub paper_id: Uuid,
    #[serde(alias = "reviewerId")]
    pub reviewer_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(alias = "paperId")]
    pub paper_id: Uuid,
    #[serde(default)]
    pub remark: String,
    /// APPROVE or REJECT
    pub recommendation: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    #[serde(alias = "paperId")]
    pub paper_id: Uuid,
    /// PUBLISH or REJECT
    pub decision: String,
}

/// Result of a workflow action
#[derive(Serialize)]
pub struct PaperResponse {
    pub message: String,
    pub paper: PaperView,
}

impl PaperResponse {
    fn new(message: &str, paper: PaperView) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
            paper,
        })
    }
}

fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::Validation {
        message: format!("Malformed multipart body: {}", e),
        field: None,
    }
}

async fn text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(multipart_error)
}

/// Accept a manuscript upload, with or without a logged-in author
pub async fn submit(
    State(state): State<AppState>,
    OptionalCaller(caller): OptionalCaller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PaperResponse>)> {
    let mut title = String::new();
    let mut abstract_text = String::new();
    let mut name = None;
    let mut email = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("title") => title = text(field).await?,
            Some("abstract") => abstract_text = text(field).await?,
            Some("name") => name = Some(text(field).await?),
            Some("email") => email = Some(text(field).await?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or("manuscript.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    upload = Some(Upload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            other => tracing::debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let author = match (name, email) {
        (None, None) => None,
        (name, email) => Some(AuthorDetails {
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
        }),
    };

    let paper = state
        .workflow
        .submit_paper(
            caller.as_ref(),
            SubmissionRequest {
                title,
                abstract_text,
                author,
                upload,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        PaperResponse::new("Paper submitted successfully", paper),
    ))
}

pub async fn published(State(state): State<AppState>) -> Result<Json<Vec<PublishedPaper>>> {
    Ok(Json(state.workflow.list_published().await?))
}

pub async fn my_papers(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<PaperView>>> {
    Ok(Json(state.workflow.list_owned(&caller).await?))
}

pub async fn all(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<PaperView>>> {
    Ok(Json(state.workflow.list_all(&caller).await?))
}

pub async fn assigned(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<PaperView>>> {
    Ok(Json(state.workflow.list_assigned(&caller).await?))
}

pub async fn assign(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReviewerRequest>,
) -> Result<Json<PaperResponse>> {
    let paper = state
        .workflow
        .assign_reviewer(&caller, request.paper_id, request.reviewer_id)
        .await?;
    Ok(PaperResponse::new("Reviewer assigned", paper))
}

pub async fn remove_reviewer(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReviewerRequest>,
) -> Result<Json<PaperResponse>> {
    let paper = state
        .workflow
        .remove_reviewer(&caller, request.paper_id, request.reviewer_id)
        .await?;
    Ok(PaperResponse::new("Reviewer removed", paper))
}

pub async fn review(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<PaperResponse>> {
    let paper = state
        .workflow
        .submit_review(
            &caller,
            request.paper_id,
            request.remark,
            &request.recommendation,
        )
        .await?;
    Ok(PaperResponse::new("Review submitted", paper))
}

pub async fn decision(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<PaperResponse>> {
    let paper = state
        .workflow
        .final_decision(&caller, request.paper_id, &request.decision)
        .await?;
    Ok(PaperResponse::new("Decision recorded", paper))
}

/// Redirect to the stored manuscript
pub async fn file(
    State(state): State<AppState>,
    OptionalCaller(caller): OptionalCaller,
    Path(id): Path<Uuid>,
) -> Result<Redirect> {
    let url = state.workflow.file_url(caller.as_ref(), id).await?;
    Ok(Redirect::temporary(&url))
}
