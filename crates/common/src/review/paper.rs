//! Paper aggregate and status transition function

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{AssignmentStatus, Decision, PaperStatus, Recommendation, WorkflowError};

/// Location of an uploaded manuscript, stored verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub public_id: String,
}

/// One reviewer's progress on a paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerAssignment {
    pub reviewer_id: Uuid,
    pub status: AssignmentStatus,
    pub remark: String,
    pub recommendation: Option<Recommendation>,
    pub assigned_at: DateTime<Utc>,
}

impl ReviewerAssignment {
    fn new(reviewer_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            reviewer_id,
            status: AssignmentStatus::Assigned,
            remark: String::new(),
            recommendation: None,
            assigned_at: now,
        }
    }
}

/// Details needed to open a new paper record
#[derive(Debug, Clone)]
pub struct NewPaper {
    pub title: String,
    pub abstract_text: String,
    pub author_id: Uuid,
    pub file: StoredFile,
}

/// A submitted manuscript and its review lifecycle.
///
/// `status` and `reviewers` are only reachable through [`Paper::apply`],
/// which checks every invariant before touching either field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paper {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub author_id: Uuid,
    pub file: StoredFile,
    pub submitted_at: DateTime<Utc>,
    status: PaperStatus,
    reviewers: Vec<ReviewerAssignment>,
}

/// Workflow actions applied to a paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AssignReviewer {
        reviewer_id: Uuid,
    },
    RemoveReviewer {
        reviewer_id: Uuid,
    },
    SubmitReview {
        reviewer_id: Uuid,
        remark: String,
        recommendation: Recommendation,
    },
    Decide {
        decision: Decision,
    },
}

impl Command {
    /// Short action name used in logs and metrics
    pub fn action(&self) -> &'static str {
        match self {
            Command::AssignReviewer { .. } => "assign_reviewer",
            Command::RemoveReviewer { .. } => "remove_reviewer",
            Command::SubmitReview { .. } => "submit_review",
            Command::Decide { .. } => "final_decision",
        }
    }
}

/// What a command does to the paper-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    ReviewerAssigned,
    ReviewerRemoved { remaining: usize },
    ReviewSubmitted,
    Decided(Decision),
}

/// Status before and after an applied command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PaperStatus,
    pub to: PaperStatus,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Status transition function, total over (status, event).
pub fn next_status(current: PaperStatus, event: StatusEvent) -> Result<PaperStatus, WorkflowError> {
    use PaperStatus::*;

    match (current, event) {
        (Published | Rejected, StatusEvent::Decided(_)) => {
            Err(WorkflowError::AlreadyFinal { status: current })
        }
        (Published | Rejected, _) => Err(WorkflowError::TerminalPaper { status: current }),
        (Submitted | UnderReview, StatusEvent::ReviewerAssigned) => Ok(UnderReview),
        (UnderReview, StatusEvent::ReviewerRemoved { remaining: 0 }) => Ok(Submitted),
        (
            status @ (Submitted | UnderReview),
            StatusEvent::ReviewerRemoved { .. } | StatusEvent::ReviewSubmitted,
        ) => Ok(status),
        (Submitted | UnderReview, StatusEvent::Decided(Decision::Publish)) => Ok(Published),
        (Submitted | UnderReview, StatusEvent::Decided(Decision::Reject)) => Ok(Rejected),
    }
}

impl Paper {
    /// Open a new paper in `SUBMITTED`
    pub fn submit(details: NewPaper, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: details.title,
            abstract_text: details.abstract_text,
            author_id: details.author_id,
            file: details.file,
            submitted_at: now,
            status: PaperStatus::Submitted,
            reviewers: Vec::new(),
        }
    }

    /// Rebuild a paper from persisted state
    pub(crate) fn rehydrate(
        id: Uuid,
        details: NewPaper,
        submitted_at: DateTime<Utc>,
        status: PaperStatus,
        reviewers: Vec<ReviewerAssignment>,
    ) -> Self {
        Self {
            id,
            title: details.title,
            abstract_text: details.abstract_text,
            author_id: details.author_id,
            file: details.file,
            submitted_at,
            status,
            reviewers,
        }
    }

    pub fn status(&self) -> PaperStatus {
        self.status
    }

    pub fn reviewers(&self) -> &[ReviewerAssignment] {
        &self.reviewers
    }

    pub fn assignment_for(&self, reviewer_id: Uuid) -> Option<&ReviewerAssignment> {
        self.reviewers.iter().find(|r| r.reviewer_id == reviewer_id)
    }

    pub fn is_assigned(&self, reviewer_id: Uuid) -> bool {
        self.assignment_for(reviewer_id).is_some()
    }

    /// Apply a workflow command. On error the paper is left untouched.
    pub fn apply(&mut self, command: Command, now: DateTime<Utc>) -> Result<Transition, WorkflowError> {
        let from = self.status;

        let to = match command {
            Command::AssignReviewer { reviewer_id } => {
                let to = next_status(from, StatusEvent::ReviewerAssigned)?;
                if self.is_assigned(reviewer_id) {
                    return Err(WorkflowError::AlreadyAssigned { reviewer_id });
                }
                self.reviewers.push(ReviewerAssignment::new(reviewer_id, now));
                to
            }
            Command::RemoveReviewer { reviewer_id } => {
                let index = self
                    .reviewers
                    .iter()
                    .position(|r| r.reviewer_id == reviewer_id);
                let remaining = self.reviewers.len() - usize::from(index.is_some());
                let to = next_status(from, StatusEvent::ReviewerRemoved { remaining })?;
                let index = index.ok_or(WorkflowError::AssignmentNotFound { reviewer_id })?;
                self.reviewers.remove(index);
                to
            }
            Command::SubmitReview {
                reviewer_id,
                remark,
                recommendation,
            } => {
                let to = next_status(from, StatusEvent::ReviewSubmitted)?;
                let entry = self
                    .reviewers
                    .iter_mut()
                    .find(|r| r.reviewer_id == reviewer_id)
                    .ok_or(WorkflowError::NotAssigned { reviewer_id })?;
                entry.remark = remark;
                entry.recommendation = Some(recommendation);
                entry.status = AssignmentStatus::Reviewed;
                to
            }
            Command::Decide { decision } => next_status(from, StatusEvent::Decided(decision))?,
        };

        self.status = to;
        Ok(Transition { from, to })
    }
}
