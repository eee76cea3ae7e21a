//! In-memory implementation of the paper and user stores.
//!
//! All state is held in memory and lost on restart. Workflow commands run
//! under the papers write lock, which serializes them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{PaperFilter, PaperStore, UserStore};
use crate::errors::{AppError, Result};
use crate::identity::{ReviewerStatus, Role, User};
use crate::review::{Command, Paper, Transition, WorkflowError};

/// In-memory repository.
///
/// Papers are kept in submission order; users are keyed by id.
pub struct MemoryRepository {
    papers: RwLock<Vec<Paper>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            papers: RwLock::new(Vec::new()),
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperStore for MemoryRepository {
    async fn insert_paper(&self, paper: &Paper) -> Result<()> {
        let mut papers = self.papers.write().await;
        papers.push(paper.clone());
        Ok(())
    }

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
        let papers = self.papers.read().await;
        Ok(papers.iter().find(|p| p.id == id).cloned())
    }

    async fn list_papers(&self, filter: PaperFilter) -> Result<Vec<Paper>> {
        let papers = self.papers.read().await;
        let mut matching: Vec<Paper> = papers
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        // Stable sort keeps later insertions first on equal timestamps
        matching.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(matching)
    }

    async fn apply(
        &self,
        id: Uuid,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<(Paper, Transition)> {
        let mut papers = self.papers.write().await;
        let paper = papers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(WorkflowError::PaperNotFound { id })?;

        let transition = paper.apply(command, now)?;
        Ok((paper.clone(), transition))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryRepository {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::DuplicateUser {
                email: user.email.clone(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list_reviewers(&self, status: ReviewerStatus) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut reviewers: Vec<User> = users
            .values()
            .filter(|u| u.role == Role::Reviewer && u.reviewer_status == status)
            .cloned()
            .collect();
        reviewers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(reviewers)
    }

    async fn set_reviewer_status(&self, id: Uuid, status: ReviewerStatus) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.role == Role::Reviewer => {
                user.reviewer_status = status;
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn has_admin(&self) -> Result<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.role == Role::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{NewPaper, PaperStatus, StoredFile};
    use chrono::Duration;
    use std::sync::Arc;

    fn paper_at(author_id: Uuid, title: &str, submitted_at: DateTime<Utc>) -> Paper {
        Paper::submit(
            NewPaper {
                title: title.into(),
                abstract_text: "Abstract".into(),
                author_id,
                file: StoredFile {
                    url: format!("https://files.test/{}.pdf", title),
                    public_id: format!("research_papers/{}", title),
                },
            },
            submitted_at,
        )
    }

    #[tokio::test]
    async fn test_listing_is_newest_first_and_filtered() {
        let repo = MemoryRepository::new();
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t0 = Utc::now();

        repo.insert_paper(&paper_at(author, "old", t0)).await.unwrap();
        repo.insert_paper(&paper_at(other, "mid", t0 + Duration::seconds(1)))
            .await
            .unwrap();
        repo.insert_paper(&paper_at(author, "new", t0 + Duration::seconds(2)))
            .await
            .unwrap();

        let all = repo.list_papers(PaperFilter::All).await.unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);

        let owned = repo.list_papers(PaperFilter::OwnedBy(author)).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|p| p.author_id == author));

        assert!(repo
            .list_papers(PaperFilter::Published)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_apply_persists_and_reports_missing() {
        let repo = MemoryRepository::new();
        let paper = paper_at(Uuid::new_v4(), "p", Utc::now());
        repo.insert_paper(&paper).await.unwrap();
        let reviewer = Uuid::new_v4();

        let (updated, transition) = repo
            .apply(paper.id, Command::AssignReviewer { reviewer_id: reviewer }, Utc::now())
            .await
            .unwrap();
        assert_eq!(transition.to, PaperStatus::UnderReview);
        assert!(updated.is_assigned(reviewer));

        let stored = repo.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);

        let assigned = repo
            .list_papers(PaperFilter::AssignedTo(reviewer))
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);

        let missing = Uuid::new_v4();
        let err = repo
            .apply(missing, Command::AssignReviewer { reviewer_id: reviewer }, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Workflow(WorkflowError::PaperNotFound { id }) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_rejected_command_leaves_paper_untouched() {
        let repo = MemoryRepository::new();
        let paper = paper_at(Uuid::new_v4(), "p", Utc::now());
        repo.insert_paper(&paper).await.unwrap();

        let err = repo
            .apply(
                paper.id,
                Command::RemoveReviewer {
                    reviewer_id: Uuid::new_v4(),
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Workflow(WorkflowError::AssignmentNotFound { .. })
        ));
        assert_eq!(repo.find_paper(paper.id).await.unwrap().unwrap(), paper);
    }

    #[tokio::test]
    async fn test_concurrent_assignments_all_land() {
        let repo = Arc::new(MemoryRepository::new());
        let paper = paper_at(Uuid::new_v4(), "p", Utc::now());
        repo.insert_paper(&paper).await.unwrap();

        let paper_id = paper.id;
        let reviewers: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let handles: Vec<_> = reviewers
            .iter()
            .map(|&reviewer_id| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.apply(paper_id, Command::AssignReviewer { reviewer_id }, Utc::now())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = repo.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.reviewers().len(), reviewers.len());
        assert!(reviewers.iter().all(|r| stored.is_assigned(*r)));
    }

    #[tokio::test]
    async fn test_user_email_unique_and_reviewer_status() {
        let repo = MemoryRepository::new();
        let reviewer = User::new("Rev", "rev@example.com", "hash".into(), Role::Reviewer);
        repo.insert_user(&reviewer).await.unwrap();

        let dup = User::new("Other", "rev@example.com", "hash".into(), Role::Author);
        assert!(matches!(
            repo.insert_user(&dup).await,
            Err(AppError::DuplicateUser { .. })
        ));

        let pending = repo.list_reviewers(ReviewerStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);

        let updated = repo
            .set_reviewer_status(reviewer.id, ReviewerStatus::Approved)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.is_active_reviewer());

        let author = User::new("Auth", "auth@example.com", "hash".into(), Role::Author);
        repo.insert_user(&author).await.unwrap();
        assert!(repo
            .set_reviewer_status(author.id, ReviewerStatus::Approved)
            .await
            .unwrap()
            .is_none());
        assert!(!repo.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_frees_email() {
        let repo = MemoryRepository::new();
        let user = User::new("Ada", "ada@example.com", "hash".into(), Role::Author);
        repo.insert_user(&user).await.unwrap();

        assert!(repo.delete_user(user.id).await.unwrap());
        assert!(!repo.delete_user(user.id).await.unwrap());
        assert!(repo.find_user_by_email("ada@example.com").await.unwrap().is_none());

        let again = User::new("Ada", "ada@example.com", "hash".into(), Role::Author);
        repo.insert_user(&again).await.unwrap();
    }
}
