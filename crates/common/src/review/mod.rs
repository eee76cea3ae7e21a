//! Paper review workflow
//!
//! The closed vocabulary of the review process (paper status, assignment
//! status, reviewer recommendation, admin decision), the `Paper` aggregate
//! that owns its reviewer assignments, and the service that runs each
//! transition against the stores and fires notifications.

mod paper;
mod service;

pub use paper::{
    next_status, Command, NewPaper, Paper, ReviewerAssignment, StatusEvent, StoredFile,
    Transition,
};
pub use service::{
    AssignmentView, PaperView, PublishedPaper, ReviewWorkflow, SubmissionRequest,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Overall status of a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaperStatus {
    Submitted,
    UnderReview,
    Published,
    Rejected,
}

impl PaperStatus {
    /// Published and rejected papers accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperStatus::Published | PaperStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Submitted => "SUBMITTED",
            PaperStatus::UnderReview => "UNDER_REVIEW",
            PaperStatus::Published => "PUBLISHED",
            PaperStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(PaperStatus::Submitted),
            "UNDER_REVIEW" => Ok(PaperStatus::UnderReview),
            "PUBLISHED" => Ok(PaperStatus::Published),
            "REJECTED" => Ok(PaperStatus::Rejected),
            other => Err(format!("unknown paper status: {}", other)),
        }
    }
}

/// Progress of a single reviewer on a paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Assigned,
    Reviewed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "ASSIGNED",
            AssignmentStatus::Reviewed => "REVIEWED",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" => Ok(AssignmentStatus::Assigned),
            "REVIEWED" => Ok(AssignmentStatus::Reviewed),
            other => Err(format!("unknown assignment status: {}", other)),
        }
    }
}

/// A reviewer's advisory verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Approve,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "APPROVE",
            Recommendation::Reject => "REJECT",
        }
    }
}

impl FromStr for Recommendation {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVE" => Ok(Recommendation::Approve),
            "REJECT" => Ok(Recommendation::Reject),
            other => Err(WorkflowError::InvalidRecommendation {
                value: other.to_string(),
            }),
        }
    }
}

/// The admin's binding decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Publish,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Publish => "PUBLISH",
            Decision::Reject => "REJECT",
        }
    }
}

impl FromStr for Decision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLISH" => Ok(Decision::Publish),
            "REJECT" => Ok(Decision::Reject),
            other => Err(WorkflowError::InvalidDecision {
                value: other.to_string(),
            }),
        }
    }
}

/// Coarse classification of workflow failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidState,
    Validation,
}

/// Rejections produced by the review workflow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Paper not found: {id}")]
    PaperNotFound { id: Uuid },

    #[error("Reviewer not found: {id}")]
    ReviewerNotFound { id: Uuid },

    #[error("Reviewer {reviewer_id} is not assigned to this paper")]
    AssignmentNotFound { reviewer_id: Uuid },

    #[error("Reviewer {reviewer_id} is already assigned")]
    AlreadyAssigned { reviewer_id: Uuid },

    #[error("Not assigned to this paper")]
    NotAssigned { reviewer_id: Uuid },

    #[error("Paper is finalized ({status})")]
    TerminalPaper { status: PaperStatus },

    #[error("Decision already recorded ({status})")]
    AlreadyFinal { status: PaperStatus },

    #[error("Invalid decision: {value:?}")]
    InvalidDecision { value: String },

    #[error("Invalid recommendation: {value:?}")]
    InvalidRecommendation { value: String },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::PaperNotFound { .. }
            | WorkflowError::ReviewerNotFound { .. }
            | WorkflowError::AssignmentNotFound { .. } => ErrorKind::NotFound,
            WorkflowError::NotAssigned { .. } => ErrorKind::Unauthorized,
            WorkflowError::AlreadyAssigned { .. }
            | WorkflowError::TerminalPaper { .. }
            | WorkflowError::AlreadyFinal { .. } => ErrorKind::InvalidState,
            WorkflowError::InvalidDecision { .. }
            | WorkflowError::InvalidRecommendation { .. } => ErrorKind::Validation,
        }
    }
}
