//! Postgres repository built on SeaORM
//!
//! Workflow transitions run inside a transaction that takes a row lock on
//! the paper (`SELECT ... FOR UPDATE`) before the command is applied, so
//! concurrent commands against one paper are serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::*;
use super::store::{PaperFilter, PaperStore, UserStore};
use super::DbPool;
use crate::errors::{AppError, Result};
use crate::identity::{ReviewerStatus, Role, User};
use crate::review::{
    Command, NewPaper, Paper, ReviewerAssignment, StoredFile, Transition, WorkflowError,
};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }
}

// ============================================================================
// Row conversions
// ============================================================================

fn corrupt(what: &str, value: &str) -> AppError {
    AppError::Internal {
        message: format!("Corrupt {} value in database: {}", what, value),
    }
}

fn assignment_from_row(row: PaperReviewerRow) -> Result<ReviewerAssignment> {
    let status = row
        .status
        .parse()
        .map_err(|_| corrupt("assignment status", &row.status))?;
    let recommendation = row
        .recommendation
        .as_deref()
        .map(|r| r.parse().map_err(|_| corrupt("recommendation", r)))
        .transpose()?;

    Ok(ReviewerAssignment {
        reviewer_id: row.reviewer_id,
        status,
        remark: row.remark,
        recommendation,
        assigned_at: row.assigned_at.with_timezone(&Utc),
    })
}

fn paper_from_rows(row: PaperRow, reviewers: Vec<PaperReviewerRow>) -> Result<Paper> {
    let status = row.status.parse().map_err(|_| corrupt("paper status", &row.status))?;
    let reviewers = reviewers
        .into_iter()
        .map(assignment_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Paper::rehydrate(
        row.id,
        NewPaper {
            title: row.title,
            abstract_text: row.abstract_text,
            author_id: row.author_id,
            file: StoredFile {
                url: row.file_url,
                public_id: row.file_public_id,
            },
        },
        row.submitted_at.with_timezone(&Utc),
        status,
        reviewers,
    ))
}

fn assignment_rows(paper: &Paper) -> Vec<PaperReviewerActiveModel> {
    paper
        .reviewers()
        .iter()
        .enumerate()
        .map(|(position, r)| PaperReviewerActiveModel {
            paper_id: Set(paper.id),
            reviewer_id: Set(r.reviewer_id),
            position: Set(position as i32),
            status: Set(r.status.as_str().to_string()),
            remark: Set(r.remark.clone()),
            recommendation: Set(r.recommendation.map(|rec| rec.as_str().to_string())),
            assigned_at: Set(r.assigned_at.into()),
        })
        .collect()
}

fn user_from_row(row: UserRow) -> Result<User> {
    Ok(User {
        id: row.id,
        role: row.role.parse().map_err(|_| corrupt("role", &row.role))?,
        reviewer_status: row
            .reviewer_status
            .parse()
            .map_err(|_| corrupt("reviewer status", &row.reviewer_status))?,
        name: row.name,
        email: row.email,
        password_hash: row.password_hash,
        qualifications: row.qualifications,
        created_at: row.created_at.with_timezone(&Utc),
    })
}

/// Load assignment rows for the given papers, grouped and ordered by position
async fn load_assignments<C: ConnectionTrait>(
    conn: &C,
    paper_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<PaperReviewerRow>>> {
    if paper_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = PaperReviewerEntity::find()
        .filter(PaperReviewerColumn::PaperId.is_in(paper_ids.iter().copied()))
        .order_by_asc(PaperReviewerColumn::Position)
        .all(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<PaperReviewerRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.paper_id).or_default().push(row);
    }
    Ok(grouped)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ============================================================================
// Paper Operations
// ============================================================================

#[async_trait]
impl PaperStore for Repository {
    async fn insert_paper(&self, paper: &Paper) -> Result<()> {
        let row = PaperActiveModel {
            id: Set(paper.id),
            author_id: Set(paper.author_id),
            title: Set(paper.title.clone()),
            abstract_text: Set(paper.abstract_text.clone()),
            file_url: Set(paper.file.url.clone()),
            file_public_id: Set(paper.file.public_id.clone()),
            status: Set(paper.status().as_str().to_string()),
            submitted_at: Set(paper.submitted_at.into()),
            updated_at: Set(paper.submitted_at.into()),
        };

        let txn = self.conn().begin().await?;
        PaperEntity::insert(row).exec(&txn).await?;
        let reviewers = assignment_rows(paper);
        if !reviewers.is_empty() {
            PaperReviewerEntity::insert_many(reviewers).exec(&txn).await?;
        }
        txn.commit().await?;

        Ok(())
    }

    async fn find_paper(&self, id: Uuid) -> Result<Option<Paper>> {
        let Some(row) = PaperEntity::find_by_id(id).one(self.conn()).await? else {
            return Ok(None);
        };

        let mut assignments = load_assignments(self.conn(), &[id]).await?;
        let reviewers = assignments.remove(&id).unwrap_or_default();
        paper_from_rows(row, reviewers).map(Some)
    }

    async fn list_papers(&self, filter: PaperFilter) -> Result<Vec<Paper>> {
        let mut query = PaperEntity::find().order_by_desc(PaperColumn::SubmittedAt);

        query = match filter {
            PaperFilter::All => query,
            PaperFilter::OwnedBy(author_id) => query.filter(PaperColumn::AuthorId.eq(author_id)),
            PaperFilter::Published => {
                query.filter(PaperColumn::Status.eq(crate::review::PaperStatus::Published.as_str()))
            }
            PaperFilter::AssignedTo(reviewer_id) => {
                let paper_ids: Vec<Uuid> = PaperReviewerEntity::find()
                    .select_only()
                    .column(PaperReviewerColumn::PaperId)
                    .filter(PaperReviewerColumn::ReviewerId.eq(reviewer_id))
                    .into_tuple()
                    .all(self.conn())
                    .await?;
                if paper_ids.is_empty() {
                    return Ok(Vec::new());
                }
                query.filter(PaperColumn::Id.is_in(paper_ids))
            }
        };

        let rows = query.all(self.conn()).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut assignments = load_assignments(self.conn(), &ids).await?;

        rows.into_iter()
            .map(|row| {
                let reviewers = assignments.remove(&row.id).unwrap_or_default();
                paper_from_rows(row, reviewers)
            })
            .collect()
    }

    async fn apply(
        &self,
        id: Uuid,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<(Paper, Transition)> {
        let txn = self.conn().begin().await?;

        let row = PaperEntity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(WorkflowError::PaperNotFound { id })?;

        let mut assignments = load_assignments(&txn, &[id]).await?;
        let mut paper = paper_from_rows(row.clone(), assignments.remove(&id).unwrap_or_default())?;

        // A rejected command drops the transaction, which rolls it back
        let transition = paper.apply(command, now)?;

        let mut active: PaperActiveModel = row.into();
        active.status = Set(paper.status().as_str().to_string());
        active.updated_at = Set(now.into());
        active.update(&txn).await?;

        PaperReviewerEntity::delete_many()
            .filter(PaperReviewerColumn::PaperId.eq(id))
            .exec(&txn)
            .await?;
        let reviewers = assignment_rows(&paper);
        if !reviewers.is_empty() {
            PaperReviewerEntity::insert_many(reviewers).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok((paper, transition))
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

// ============================================================================
// User Operations
// ============================================================================

#[async_trait]
impl UserStore for Repository {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let row = UserActiveModel {
            id: Set(user.id),
            name: Set(user.name.clone()),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            role: Set(user.role.as_str().to_string()),
            qualifications: Set(user.qualifications.clone()),
            reviewer_status: Set(user.reviewer_status.as_str().to_string()),
            created_at: Set(user.created_at.into()),
        };

        match UserEntity::insert(row).exec(self.conn()).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateUser {
                email: user.email.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .map(user_from_row)
            .transpose()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = UserEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.conn())
            .await?
            .map(user_from_row)
            .transpose()
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        UserEntity::find()
            .filter(UserColumn::Id.is_in(ids.iter().copied()))
            .all(self.conn())
            .await?
            .into_iter()
            .map(user_from_row)
            .collect()
    }

    async fn list_reviewers(&self, status: ReviewerStatus) -> Result<Vec<User>> {
        UserEntity::find()
            .filter(UserColumn::Role.eq(Role::Reviewer.as_str()))
            .filter(UserColumn::ReviewerStatus.eq(status.as_str()))
            .order_by_asc(UserColumn::CreatedAt)
            .all(self.conn())
            .await?
            .into_iter()
            .map(user_from_row)
            .collect()
    }

    async fn set_reviewer_status(&self, id: Uuid, status: ReviewerStatus) -> Result<Option<User>> {
        let result = UserEntity::update_many()
            .col_expr(UserColumn::ReviewerStatus, Expr::value(status.as_str()))
            .filter(UserColumn::Id.eq(id))
            .filter(UserColumn::Role.eq(Role::Reviewer.as_str()))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_user(id).await
    }

    async fn has_admin(&self) -> Result<bool> {
        let admins = UserEntity::find()
            .filter(UserColumn::Role.eq(Role::Admin.as_str()))
            .count(self.conn())
            .await?;
        Ok(admins > 0)
    }
}
