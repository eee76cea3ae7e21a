//! Store traits for papers and users.
//!
//! Implementations must make [`PaperStore::apply`] a single atomic
//! read-modify-write: concurrent commands on the same paper are serialized,
//! and a rejected command persists nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::Result;
use crate::identity::{ReviewerStatus, User};
use crate::review::{Command, Paper, PaperStatus, Transition};

/// Which papers a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFilter {
    All,
    AssignedTo(Uuid),
    OwnedBy(Uuid),
    Published,
}

impl PaperFilter {
    pub fn matches(&self, paper: &Paper) -> bool {
        match self {
            PaperFilter::All => true,
            PaperFilter::AssignedTo(reviewer_id) => paper.is_assigned(*reviewer_id),
            PaperFilter::OwnedBy(author_id) => paper.author_id == *author_id,
            PaperFilter::Published => paper.status() == PaperStatus::Published,
        }
    }
}

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Persist a freshly submitted paper
    async fn insert_paper(&self, paper: &Paper) -> Result<()>;

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>>;

    /// Papers matching the filter, newest submission first
    async fn list_papers(&self, filter: PaperFilter) -> Result<Vec<Paper>>;

    /// Load, apply the command, and write back under a per-paper lock.
    /// Fails with `PaperNotFound` when the paper does not exist.
    async fn apply(
        &self,
        id: Uuid,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<(Paper, Transition)>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; fails with `DuplicateUser` when the email is taken
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Remove a user; `false` if there was none
    async fn delete_user(&self, id: Uuid) -> Result<bool>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>>;

    /// Users with role reviewer in the given approval state
    async fn list_reviewers(&self, status: ReviewerStatus) -> Result<Vec<User>>;

    /// Update a reviewer's approval state; `None` if no such reviewer
    async fn set_reviewer_status(&self, id: Uuid, status: ReviewerStatus) -> Result<Option<User>>;

    async fn has_admin(&self) -> Result<bool>;
}
