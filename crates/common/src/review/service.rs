//! Review workflow service
//!
//! Runs each workflow operation end to end: authorization, the atomic
//! store transition, metrics, and the follow-up email.

use super::{
    AssignmentStatus, Command, Decision, ErrorKind, NewPaper, Paper, PaperStatus,
    Recommendation, StoredFile, Transition, WorkflowError,
};
use crate::auth::Caller;
use crate::db::{PaperFilter, PaperStore, UserStore};
use crate::errors::{AppError, Result};
use crate::identity::{
    missing_details, resolve_author, AuthorDetails, ProvisionedAccount, Role, User, UserSummary,
};
use crate::metrics;
use crate::notify::Notifier;
use crate::storage::{BlobStore, Upload};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// A manuscript submission as received from the client
#[derive(Debug, Clone, Validate)]
pub struct SubmissionRequest {
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,

    #[validate(length(min = 1, message = "Abstract is required"))]
    pub abstract_text: String,

    /// Required when the submitter is not logged in
    pub author: Option<AuthorDetails>,

    pub upload: Option<Upload>,
}

/// A reviewer entry as shown in listings
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub reviewer_id: Uuid,
    pub reviewer: Option<UserSummary>,
    pub status: AssignmentStatus,
    pub remark: String,
    pub recommendation: Option<Recommendation>,
    pub assigned_at: DateTime<Utc>,
}

/// A paper with author and reviewer summaries resolved
#[derive(Debug, Clone, Serialize)]
pub struct PaperView {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub status: PaperStatus,
    pub file_url: String,
    pub submitted_at: DateTime<Utc>,
    pub author: Option<UserSummary>,
    pub reviewers: Vec<AssignmentView>,
}

/// Public listing entry for a published paper
#[derive(Debug, Clone, Serialize)]
pub struct PublishedPaper {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub file_url: String,
    pub submitted_at: DateTime<Utc>,
    pub author: Option<UserSummary>,
}

fn outcome(err: &AppError) -> &'static str {
    match err {
        AppError::Workflow(e) => match e.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Validation => "validation",
        },
        _ => "error",
    }
}

/// Entry point for every paper operation
#[derive(Clone)]
pub struct ReviewWorkflow {
    papers: Arc<dyn PaperStore>,
    users: Arc<dyn UserStore>,
    blobs: Arc<dyn BlobStore>,
    notifier: Notifier,
    generated_password_len: usize,
}

impl ReviewWorkflow {
    pub fn new(
        papers: Arc<dyn PaperStore>,
        users: Arc<dyn UserStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Notifier,
        generated_password_len: usize,
    ) -> Self {
        Self {
            papers,
            users,
            blobs,
            notifier,
            generated_password_len,
        }
    }

    /// Readiness of the backing store
    pub async fn ping(&self) -> Result<()> {
        self.papers.ping().await
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Store the manuscript, resolve the author, and record a SUBMITTED paper.
    ///
    /// Every input is checked before the file is stored. If the paper cannot
    /// be recorded, the stored file and any account provisioned for it are
    /// removed again.
    pub async fn submit_paper(
        &self,
        caller: Option<&Caller>,
        request: SubmissionRequest,
    ) -> Result<PaperView> {
        let request = SubmissionRequest {
            title: request.title.trim().to_string(),
            abstract_text: request.abstract_text.trim().to_string(),
            ..request
        };
        request.validate()?;

        let upload = request.upload.ok_or_else(|| AppError::MissingField {
            field: "file".to_string(),
        })?;
        let details = match (caller, request.author) {
            (Some(_), _) => None,
            (None, Some(details)) => Some(details.normalized()?),
            (None, None) => return Err(missing_details()),
        };

        let file = self.blobs.put(&upload).await?;
        tracing::debug!(public_id = %file.public_id, store = self.blobs.name(), "Manuscript stored");

        let author = match resolve_author(
            self.users.as_ref(),
            caller,
            details,
            self.generated_password_len,
        )
        .await
        {
            Ok(author) => author,
            Err(e) => {
                self.discard_submission(&file, None).await;
                return Err(e);
            }
        };

        let paper = Paper::submit(
            NewPaper {
                title: request.title,
                abstract_text: request.abstract_text,
                author_id: author.user_id,
                file: file.clone(),
            },
            Utc::now(),
        );
        if let Err(e) = self.papers.insert_paper(&paper).await {
            tracing::error!(error = %e, "Failed to record submitted paper");
            self.discard_submission(&file, author.provisioned.as_ref()).await;
            return Err(e);
        }

        metrics::record_submission(author.provisioned.is_some());
        tracing::info!(
            paper_id = %paper.id,
            author_id = %paper.author_id,
            provisioned = author.provisioned.is_some(),
            "Paper submitted"
        );

        if let Some(account) = &author.provisioned {
            self.notifier.welcome(&account.user, &account.password, &paper.title);
        }

        self.view(paper).await
    }

    /// Undo what a failed submission left behind. Cleanup failures are
    /// logged; the submission error is what the caller sees.
    async fn discard_submission(&self, file: &StoredFile, provisioned: Option<&ProvisionedAccount>) {
        if let Some(account) = provisioned {
            let user_id = account.user.id;
            // A concurrent submission may have linked a paper to the account
            let in_use = self
                .papers
                .list_papers(PaperFilter::OwnedBy(user_id))
                .await
                .map(|papers| !papers.is_empty())
                .unwrap_or(true);
            if in_use {
                tracing::warn!(user_id = %user_id, "Provisioned author kept, account is referenced");
            } else if let Err(e) = self.users.delete_user(user_id).await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to remove provisioned author");
            }
        }

        if let Err(e) = self.blobs.delete(file).await {
            tracing::warn!(public_id = %file.public_id, error = %e, "Failed to remove orphaned manuscript");
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    async fn execute(&self, paper_id: Uuid, command: Command) -> Result<(Paper, Transition)> {
        let action = command.action();

        match self.papers.apply(paper_id, command, Utc::now()).await {
            Ok((paper, transition)) => {
                metrics::record_transition(action, "ok");
                tracing::info!(
                    paper_id = %paper_id,
                    action,
                    from = %transition.from,
                    to = %transition.to,
                    "Workflow transition applied"
                );
                Ok((paper, transition))
            }
            Err(e) => {
                metrics::record_transition(action, outcome(&e));
                if e.is_server_error() {
                    tracing::error!(paper_id = %paper_id, action, error = %e, "Workflow transition failed");
                } else {
                    tracing::warn!(paper_id = %paper_id, action, error = %e, "Workflow transition rejected");
                }
                Err(e)
            }
        }
    }

    /// Add an approved reviewer to a paper (admin)
    pub async fn assign_reviewer(
        &self,
        caller: &Caller,
        paper_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<PaperView> {
        caller.require_role(&[Role::Admin])?;

        let reviewer = self
            .users
            .find_user(reviewer_id)
            .await?
            .filter(User::is_active_reviewer);
        let Some(reviewer) = reviewer else {
            // Paper existence and finality take precedence over the reviewer
            let err = AppError::from(match self.papers.find_paper(paper_id).await? {
                None => WorkflowError::PaperNotFound { id: paper_id },
                Some(paper) if paper.status().is_terminal() => WorkflowError::TerminalPaper {
                    status: paper.status(),
                },
                Some(_) => WorkflowError::ReviewerNotFound { id: reviewer_id },
            });
            metrics::record_transition("assign_reviewer", outcome(&err));
            tracing::warn!(paper_id = %paper_id, reviewer_id = %reviewer_id, error = %err, "Workflow transition rejected");
            return Err(err);
        };

        let (paper, _) = self
            .execute(paper_id, Command::AssignReviewer { reviewer_id })
            .await?;
        self.notifier.reviewer_assigned(&reviewer, &paper);

        self.view(paper).await
    }

    /// Withdraw a reviewer from a paper (admin)
    pub async fn remove_reviewer(
        &self,
        caller: &Caller,
        paper_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<PaperView> {
        caller.require_role(&[Role::Admin])?;

        let (paper, _) = self
            .execute(paper_id, Command::RemoveReviewer { reviewer_id })
            .await?;
        self.view(paper).await
    }

    /// Record the calling reviewer's remark and recommendation
    pub async fn submit_review(
        &self,
        caller: &Caller,
        paper_id: Uuid,
        remark: String,
        recommendation: &str,
    ) -> Result<PaperView> {
        caller.require_role(&[Role::Reviewer])?;
        let recommendation: Recommendation = recommendation.parse()?;

        let (paper, _) = self
            .execute(
                paper_id,
                Command::SubmitReview {
                    reviewer_id: caller.user_id,
                    remark: remark.trim().to_string(),
                    recommendation,
                },
            )
            .await?;
        self.view(paper).await
    }

    /// Publish or reject a paper (admin) and notify its author
    pub async fn final_decision(
        &self,
        caller: &Caller,
        paper_id: Uuid,
        decision: &str,
    ) -> Result<PaperView> {
        caller.require_role(&[Role::Admin])?;
        let decision: Decision = decision.parse()?;

        let (paper, _) = self.execute(paper_id, Command::Decide { decision }).await?;

        match self.users.find_user(paper.author_id).await {
            Ok(Some(author)) => {
                self.notifier.decision_made(&author, &paper, decision);
            }
            Ok(None) => {
                tracing::warn!(paper_id = %paper.id, author_id = %paper.author_id, "Author missing, decision email skipped")
            }
            Err(e) => {
                tracing::warn!(paper_id = %paper.id, error = %e, "Author lookup failed, decision email skipped")
            }
        }

        self.view(paper).await
    }

    // ========================================================================
    // Read paths
    // ========================================================================

    /// Every paper (admin)
    pub async fn list_all(&self, caller: &Caller) -> Result<Vec<PaperView>> {
        caller.require_role(&[Role::Admin])?;
        self.list(PaperFilter::All).await
    }

    /// Papers the calling reviewer is assigned to
    pub async fn list_assigned(&self, caller: &Caller) -> Result<Vec<PaperView>> {
        caller.require_role(&[Role::Reviewer])?;
        self.list(PaperFilter::AssignedTo(caller.user_id)).await
    }

    /// Papers submitted by the calling author
    pub async fn list_owned(&self, caller: &Caller) -> Result<Vec<PaperView>> {
        caller.require_role(&[Role::Author])?;
        self.list(PaperFilter::OwnedBy(caller.user_id)).await
    }

    /// Published papers, visible to anyone
    pub async fn list_published(&self) -> Result<Vec<PublishedPaper>> {
        let papers = self.papers.list_papers(PaperFilter::Published).await?;
        let users = self.summaries(&papers).await?;

        Ok(papers
            .into_iter()
            .map(|paper| PublishedPaper {
                author: users.get(&paper.author_id).cloned(),
                id: paper.id,
                title: paper.title,
                abstract_text: paper.abstract_text,
                file_url: paper.file.url,
                submitted_at: paper.submitted_at,
            })
            .collect())
    }

    /// Where the manuscript can be downloaded.
    ///
    /// Published papers are public; otherwise only admins, the author, and
    /// assigned reviewers may fetch the file.
    pub async fn file_url(&self, caller: Option<&Caller>, paper_id: Uuid) -> Result<String> {
        let paper = self
            .papers
            .find_paper(paper_id)
            .await?
            .ok_or(WorkflowError::PaperNotFound { id: paper_id })?;

        if paper.status() == PaperStatus::Published {
            return Ok(paper.file.url);
        }

        match caller {
            None => Err(AppError::Unauthorized {
                message: "Login required to access this manuscript".to_string(),
            }),
            Some(c)
                if c.role == Role::Admin
                    || c.user_id == paper.author_id
                    || (c.role == Role::Reviewer && paper.is_assigned(c.user_id)) =>
            {
                Ok(paper.file.url)
            }
            Some(_) => Err(AppError::Forbidden {
                message: "No access to this manuscript".to_string(),
            }),
        }
    }

    async fn list(&self, filter: PaperFilter) -> Result<Vec<PaperView>> {
        let papers = self.papers.list_papers(filter).await?;
        let users = self.summaries(&papers).await?;
        Ok(papers.into_iter().map(|p| build_view(p, &users)).collect())
    }

    async fn view(&self, paper: Paper) -> Result<PaperView> {
        let users = self.summaries(std::slice::from_ref(&paper)).await?;
        Ok(build_view(paper, &users))
    }

    /// Summaries for every author and reviewer referenced by the papers
    async fn summaries(&self, papers: &[Paper]) -> Result<HashMap<Uuid, UserSummary>> {
        let mut ids: Vec<Uuid> = papers
            .iter()
            .flat_map(|p| {
                std::iter::once(p.author_id).chain(p.reviewers().iter().map(|r| r.reviewer_id))
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();

        Ok(self
            .users
            .find_users(&ids)
            .await?
            .iter()
            .map(|u| (u.id, u.summary()))
            .collect())
    }
}

fn build_view(paper: Paper, users: &HashMap<Uuid, UserSummary>) -> PaperView {
    let reviewers = paper
        .reviewers()
        .iter()
        .map(|r| AssignmentView {
            reviewer_id: r.reviewer_id,
            reviewer: users.get(&r.reviewer_id).cloned(),
            status: r.status,
            remark: r.remark.clone(),
            recommendation: r.recommendation,
            assigned_at: r.assigned_at,
        })
        .collect();

    PaperView {
        id: paper.id,
        status: paper.status(),
        author: users.get(&paper.author_id).cloned(),
        reviewers,
        title: paper.title,
        abstract_text: paper.abstract_text,
        file_url: paper.file.url,
        submitted_at: paper.submitted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::identity::ReviewerStatus;
    use crate::notify::testing::{FailingMailer, RecordingMailer};
    use crate::notify::Mailer;
    use crate::storage::LocalBlobStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        repo: Arc<MemoryRepository>,
        mailer: Arc<RecordingMailer>,
        workflow: ReviewWorkflow,
        admin: Caller,
    }

    fn workflow_over(
        dir: &TempDir,
        papers: Arc<dyn PaperStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> ReviewWorkflow {
        let blobs = Arc::new(LocalBlobStore::new(
            dir.path(),
            "http://files.test",
            "research_papers",
        ));
        ReviewWorkflow::new(
            papers,
            users,
            blobs,
            Notifier::new(mailer, "http://portal.test"),
            16,
        )
    }

    fn fixture_with(mailer: Arc<dyn Mailer>) -> (TempDir, Arc<MemoryRepository>, ReviewWorkflow) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let workflow = workflow_over(&dir, repo.clone(), repo.clone(), mailer);
        (dir, repo, workflow)
    }

    /// Files left in the upload folder
    fn stored_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("research_papers"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Paper store whose next insert fails
    struct FlakyPapers {
        inner: Arc<MemoryRepository>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl PaperStore for FlakyPapers {
        async fn insert_paper(&self, paper: &Paper) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(AppError::Internal {
                    message: "insert failed".into(),
                });
            }
            self.inner.insert_paper(paper).await
        }

        async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
            self.inner.find_paper(id).await
        }

        async fn list_papers(&self, filter: PaperFilter) -> Result<Vec<Paper>> {
            self.inner.list_papers(filter).await
        }

        async fn apply(
            &self,
            id: Uuid,
            command: Command,
            now: DateTime<Utc>,
        ) -> Result<(Paper, Transition)> {
            self.inner.apply(id, command, now).await
        }

        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
    }

    async fn fixture() -> Fixture {
        let mailer = Arc::new(RecordingMailer::default());
        let (dir, repo, workflow) = fixture_with(mailer.clone());
        let admin = User::new("Admin", "admin@example.com", "h".into(), Role::Admin);
        repo.insert_user(&admin).await.unwrap();

        Fixture {
            dir,
            repo,
            mailer,
            workflow,
            admin: Caller::new(admin.id, Role::Admin),
        }
    }

    async fn add_reviewer(repo: &MemoryRepository, email: &str) -> Caller {
        let mut reviewer = User::new("Reviewer", email, "h".into(), Role::Reviewer);
        reviewer.reviewer_status = ReviewerStatus::Approved;
        repo.insert_user(&reviewer).await.unwrap();
        Caller::new(reviewer.id, Role::Reviewer)
    }

    async fn add_author(repo: &MemoryRepository, email: &str) -> Caller {
        let author = User::new("Author", email, "h".into(), Role::Author);
        repo.insert_user(&author).await.unwrap();
        Caller::new(author.id, Role::Author)
    }

    fn submission(author: Option<AuthorDetails>) -> SubmissionRequest {
        SubmissionRequest {
            title: "Ownership Types in Practice".into(),
            abstract_text: "We study borrowing.".into(),
            author,
            upload: Some(Upload {
                file_name: "paper.pdf".into(),
                content_type: Some("application/pdf".into()),
                bytes: b"%PDF-1.7".to_vec(),
            }),
        }
    }

    async fn submitted(f: &Fixture) -> PaperView {
        let author = add_author(&f.repo, &format!("{}@example.com", Uuid::new_v4())).await;
        f.workflow
            .submit_paper(Some(&author), submission(None))
            .await
            .unwrap()
    }

    fn workflow_err(err: AppError) -> WorkflowError {
        match err {
            AppError::Workflow(e) => e,
            other => panic!("expected workflow error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reject_scenario_then_terminal() {
        let f = fixture().await;
        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let r2 = add_reviewer(&f.repo, "r2@example.com").await;
        let paper = submitted(&f).await;
        assert_eq!(paper.status, PaperStatus::Submitted);

        let view = f
            .workflow
            .assign_reviewer(&f.admin, paper.id, r1.user_id)
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::UnderReview);

        let view = f
            .workflow
            .submit_review(&r1, paper.id, "Unsound proof".into(), "REJECT")
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::UnderReview);
        assert_eq!(view.reviewers[0].status, AssignmentStatus::Reviewed);
        assert_eq!(view.reviewers[0].recommendation, Some(Recommendation::Reject));

        let view = f
            .workflow
            .final_decision(&f.admin, paper.id, "REJECT")
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::Rejected);

        let err = f
            .workflow
            .assign_reviewer(&f.admin, paper.id, r2.user_id)
            .await
            .unwrap_err();
        assert_eq!(workflow_err(err).kind(), ErrorKind::InvalidState);

        let stored = f.repo.find_paper(paper.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaperStatus::Rejected);
        assert_eq!(stored.reviewers().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_reviewers_reverts_only_when_empty() {
        let f = fixture().await;
        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let r2 = add_reviewer(&f.repo, "r2@example.com").await;
        let paper = submitted(&f).await;

        f.workflow.assign_reviewer(&f.admin, paper.id, r1.user_id).await.unwrap();
        f.workflow.assign_reviewer(&f.admin, paper.id, r2.user_id).await.unwrap();

        let view = f
            .workflow
            .remove_reviewer(&f.admin, paper.id, r1.user_id)
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::UnderReview);
        assert_eq!(view.reviewers.len(), 1);

        let view = f
            .workflow
            .remove_reviewer(&f.admin, paper.id, r2.user_id)
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::Submitted);
        assert!(view.reviewers.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_submission_provisions_one_author() {
        let f = fixture().await;
        let details = AuthorDetails {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
        };

        let view = f
            .workflow
            .submit_paper(None, submission(Some(details)))
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::Submitted);

        let author = f.repo.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(author.role, Role::Author);
        assert_eq!(view.author.as_ref().map(|a| a.id), Some(author.id));
        assert!(view.file_url.starts_with("http://files.test/research_papers/"));

        let all = f.workflow.list_all(&f.admin).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].author.as_ref().map(|a| a.id), Some(author.id));

        let sent = f.mailer.wait_for(1).await;
        let welcome: Vec<_> = sent.iter().filter(|e| e.kind == "welcome").collect();
        assert_eq!(welcome.len(), 1);
        assert_eq!(welcome[0].to, "ada@example.com");
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let f = fixture().await;

        let err = f.workflow.submit_paper(None, submission(None)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let mut blank = submission(None);
        blank.title = "   ".into();
        let author = add_author(&f.repo, "a@example.com").await;
        let err = f.workflow.submit_paper(Some(&author), blank).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let mut no_file = submission(None);
        no_file.upload = None;
        let err = f.workflow.submit_paper(Some(&author), no_file).await.unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));

        assert!(f.workflow.list_all(&f.admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_author_email_stores_nothing() {
        let f = fixture().await;
        let details = AuthorDetails {
            name: "Ada Lovelace".into(),
            email: "not-an-email".into(),
        };

        let err = f
            .workflow
            .submit_paper(None, submission(Some(details)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(stored_files(&f.dir), 0);
        assert!(f.repo.find_user_by_email("not-an-email").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_insert_discards_author_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let mailer = Arc::new(RecordingMailer::default());
        let papers = Arc::new(FlakyPapers {
            inner: repo.clone(),
            fail_next: AtomicBool::new(true),
        });
        let workflow = workflow_over(&dir, papers, repo.clone(), mailer.clone());
        let details = || AuthorDetails {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
        };

        let err = workflow
            .submit_paper(None, submission(Some(details())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
        assert!(repo.find_user_by_email("ada@example.com").await.unwrap().is_none());
        assert_eq!(stored_files(&dir), 0);

        // The retry provisions the account again and delivers its password
        let view = workflow
            .submit_paper(None, submission(Some(details())))
            .await
            .unwrap();
        let author = repo.find_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(view.author.map(|a| a.id), Some(author.id));
        assert_eq!(stored_files(&dir), 1);
        assert_eq!(repo.list_papers(PaperFilter::All).await.unwrap().len(), 1);

        let sent = mailer.wait_for(1).await;
        let welcome: Vec<_> = sent.iter().filter(|e| e.kind == "welcome").collect();
        assert_eq!(welcome.len(), 1);
        assert_eq!(welcome[0].to, "ada@example.com");
    }

    #[tokio::test]
    async fn test_terminal_paper_rejects_assignment_before_reviewer_checks() {
        let f = fixture().await;
        let paper = submitted(&f).await;
        f.workflow
            .final_decision(&f.admin, paper.id, "REJECT")
            .await
            .unwrap();

        let pending = User::new("Pending", "p@example.com", "h".into(), Role::Reviewer);
        f.repo.insert_user(&pending).await.unwrap();
        for reviewer_id in [Uuid::new_v4(), pending.id] {
            let err = f
                .workflow
                .assign_reviewer(&f.admin, paper.id, reviewer_id)
                .await
                .unwrap_err();
            assert!(matches!(
                workflow_err(err),
                WorkflowError::TerminalPaper { status: PaperStatus::Rejected }
            ));
        }
    }

    #[tokio::test]
    async fn test_only_assigned_reviewer_may_review() {
        let f = fixture().await;
        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let outsider = add_reviewer(&f.repo, "r2@example.com").await;
        let paper = submitted(&f).await;
        f.workflow.assign_reviewer(&f.admin, paper.id, r1.user_id).await.unwrap();

        let err = f
            .workflow
            .submit_review(&outsider, paper.id, "Looks fine".into(), "APPROVE")
            .await
            .unwrap_err();
        let err = workflow_err(err);
        assert!(matches!(err, WorkflowError::NotAssigned { .. }));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f
            .workflow
            .submit_review(&r1, paper.id, "Looks fine".into(), "MAYBE")
            .await
            .unwrap_err();
        assert!(matches!(
            workflow_err(err),
            WorkflowError::InvalidRecommendation { .. }
        ));

        // Admins are not reviewers
        let err = f
            .workflow
            .submit_review(&f.admin, paper.id, "x".into(), "APPROVE")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_assignment_requires_approved_reviewer() {
        let f = fixture().await;
        let paper = submitted(&f).await;

        let pending = User::new("Pending", "p@example.com", "h".into(), Role::Reviewer);
        f.repo.insert_user(&pending).await.unwrap();
        let err = f
            .workflow
            .assign_reviewer(&f.admin, paper.id, pending.id)
            .await
            .unwrap_err();
        assert!(matches!(
            workflow_err(err),
            WorkflowError::ReviewerNotFound { .. }
        ));

        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let missing = Uuid::new_v4();
        let err = f
            .workflow
            .assign_reviewer(&f.admin, missing, r1.user_id)
            .await
            .unwrap_err();
        assert!(matches!(
            workflow_err(err),
            WorkflowError::PaperNotFound { id } if id == missing
        ));

        f.workflow.assign_reviewer(&f.admin, paper.id, r1.user_id).await.unwrap();
        let err = f
            .workflow
            .assign_reviewer(&f.admin, paper.id, r1.user_id)
            .await
            .unwrap_err();
        assert!(matches!(
            workflow_err(err),
            WorkflowError::AlreadyAssigned { .. }
        ));
    }

    #[tokio::test]
    async fn test_decision_values_and_finality() {
        let f = fixture().await;
        let paper = submitted(&f).await;

        let err = f
            .workflow
            .final_decision(&f.admin, paper.id, "ACCEPT")
            .await
            .unwrap_err();
        assert!(matches!(workflow_err(err), WorkflowError::InvalidDecision { .. }));

        let view = f
            .workflow
            .final_decision(&f.admin, paper.id, "PUBLISH")
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::Published);

        let err = f
            .workflow
            .final_decision(&f.admin, paper.id, "REJECT")
            .await
            .unwrap_err();
        assert!(matches!(workflow_err(err), WorkflowError::AlreadyFinal { .. }));

        let published = f.workflow.list_published().await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, paper.id);

        let sent = f.mailer.wait_for(1).await;
        assert!(sent.iter().any(|e| e.subject == "Paper PUBLISHED"));
    }

    #[tokio::test]
    async fn test_role_gates_on_listings() {
        let f = fixture().await;
        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let author = add_author(&f.repo, "a@example.com").await;
        let paper = f
            .workflow
            .submit_paper(Some(&author), submission(None))
            .await
            .unwrap();
        submitted(&f).await;
        f.workflow.assign_reviewer(&f.admin, paper.id, r1.user_id).await.unwrap();

        assert_eq!(f.workflow.list_all(&f.admin).await.unwrap().len(), 2);
        assert_eq!(f.workflow.list_owned(&author).await.unwrap().len(), 1);

        let assigned = f.workflow.list_assigned(&r1).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(
            assigned[0].reviewers[0].reviewer.as_ref().map(|r| r.email.as_str()),
            Some("r1@example.com")
        );

        assert!(matches!(
            f.workflow.list_all(&author).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            f.workflow.list_assigned(&author).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            f.workflow.list_owned(&r1).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            f.workflow.assign_reviewer(&author, paper.id, r1.user_id).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_access() {
        let f = fixture().await;
        let r1 = add_reviewer(&f.repo, "r1@example.com").await;
        let stranger = add_author(&f.repo, "s@example.com").await;
        let author = add_author(&f.repo, "a@example.com").await;
        let paper = f
            .workflow
            .submit_paper(Some(&author), submission(None))
            .await
            .unwrap();

        assert!(matches!(
            f.workflow.file_url(None, paper.id).await,
            Err(AppError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.workflow.file_url(Some(&stranger), paper.id).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            f.workflow.file_url(Some(&r1), paper.id).await,
            Err(AppError::Forbidden { .. })
        ));
        assert_eq!(
            f.workflow.file_url(Some(&author), paper.id).await.unwrap(),
            paper.file_url
        );

        f.workflow.assign_reviewer(&f.admin, paper.id, r1.user_id).await.unwrap();
        assert!(f.workflow.file_url(Some(&r1), paper.id).await.is_ok());

        f.workflow.final_decision(&f.admin, paper.id, "PUBLISH").await.unwrap();
        assert_eq!(f.workflow.file_url(None, paper.id).await.unwrap(), paper.file_url);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_transition() {
        let (_dir, repo, workflow) = fixture_with(Arc::new(FailingMailer));
        let admin = Caller::new(Uuid::new_v4(), Role::Admin);
        let r1 = add_reviewer(&repo, "r1@example.com").await;
        let author = add_author(&repo, "a@example.com").await;

        let paper = workflow
            .submit_paper(Some(&author), submission(None))
            .await
            .unwrap();
        let view = workflow
            .assign_reviewer(&admin, paper.id, r1.user_id)
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::UnderReview);

        let view = workflow
            .final_decision(&admin, paper.id, "PUBLISH")
            .await
            .unwrap();
        assert_eq!(view.status, PaperStatus::Published);
    }
}
