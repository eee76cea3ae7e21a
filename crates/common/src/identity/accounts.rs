//! Registration, login, and reviewer approval

use super::{normalize_email, ReviewerStatus, Role, User, UserProfile};
use crate::auth::{hash_password, verify_password, Caller, JwtManager};
use crate::config::AdminConfig;
use crate::db::UserStore;
use crate::errors::{AppError, Result};
use crate::notify::Notifier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Self-service registration payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "A valid email is required"))]
    pub email: String,

    #[validate(length(min = 6, max = 128, message = "Password must be at least 6 characters"))]
    pub password: String,

    /// "author" or "reviewer"; anything else registers an author
    #[serde(default)]
    pub role: Option<String>,

    /// Reviewer background, ignored for authors
    #[serde(default)]
    pub qualifications: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Account operations backed by the user store
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    jwt: Arc<JwtManager>,
    notifier: Notifier,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, jwt: Arc<JwtManager>, notifier: Notifier) -> Self {
        Self {
            users,
            jwt,
            notifier,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<RegisteredUser> {
        request.validate()?;

        let role = match request.role.as_deref() {
            Some("reviewer") => Role::Reviewer,
            _ => Role::Author,
        };

        let mut user = User::new(
            &request.name,
            &request.email,
            hash_password(&request.password)?,
            role,
        );
        if role == Role::Reviewer {
            user.qualifications = request.qualifications.unwrap_or_default().trim().to_string();
        }

        self.users.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = %role, "User registered");

        let message = match role {
            Role::Reviewer => "Registration successful. Your reviewer application is pending approval.",
            _ => "Registration successful",
        };

        Ok(RegisteredUser {
            message: message.to_string(),
            user: user.profile(),
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let user = self
            .users
            .find_user_by_email(&normalize_email(email))
            .await?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or(AppError::InvalidCredentials)?;

        if user.role == Role::Reviewer && user.reviewer_status != ReviewerStatus::Approved {
            tracing::debug!(user_id = %user.id, status = %user.reviewer_status, "Reviewer login refused");
            return Err(AppError::AccountNotApproved);
        }

        let token = self.jwt.generate_token(user.id, user.role)?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

        Ok(LoginResponse {
            token,
            user: user.profile(),
        })
    }

    pub async fn list_pending_reviewers(&self, caller: &Caller) -> Result<Vec<UserProfile>> {
        caller.require_role(&[Role::Admin])?;
        self.reviewers_with(ReviewerStatus::Pending).await
    }

    /// Approved reviewers, i.e. those eligible for assignment
    pub async fn list_reviewers(&self, caller: &Caller) -> Result<Vec<UserProfile>> {
        caller.require_role(&[Role::Admin])?;
        self.reviewers_with(ReviewerStatus::Approved).await
    }

    async fn reviewers_with(&self, status: ReviewerStatus) -> Result<Vec<UserProfile>> {
        Ok(self
            .users
            .list_reviewers(status)
            .await?
            .iter()
            .map(User::profile)
            .collect())
    }

    /// Approve or reject a reviewer application and notify the reviewer
    pub async fn set_reviewer_status(
        &self,
        caller: &Caller,
        user_id: Uuid,
        status: &str,
    ) -> Result<UserProfile> {
        caller.require_role(&[Role::Admin])?;

        let status = match status.parse::<ReviewerStatus>() {
            Ok(s @ (ReviewerStatus::Approved | ReviewerStatus::Rejected)) => s,
            _ => {
                return Err(AppError::Validation {
                    message: format!("Invalid status {:?}: expected APPROVED or REJECTED", status),
                    field: Some("status".to_string()),
                })
            }
        };

        let user = self
            .users
            .set_reviewer_status(user_id, status)
            .await?
            .ok_or_else(|| AppError::UserNotFound {
                id: user_id.to_string(),
            })?;

        tracing::info!(user_id = %user.id, status = %status, "Reviewer status updated");
        self.notifier.reviewer_status_changed(&user, status);

        Ok(user.profile())
    }

    /// Create the configured admin account when no admin exists yet.
    /// Returns whether an account was created.
    pub async fn seed_admin(&self, config: &AdminConfig) -> Result<bool> {
        let (Some(email), Some(password)) = (&config.email, &config.password) else {
            tracing::debug!("No admin credentials configured, skipping seed");
            return Ok(false);
        };

        if self.users.has_admin().await? {
            return Ok(false);
        }

        let name = config.name.as_deref().unwrap_or("Administrator");
        let admin = User::new(name, email, hash_password(password)?, Role::Admin);

        match self.users.insert_user(&admin).await {
            Ok(()) => {
                tracing::info!(user_id = %admin.id, email = %admin.email, "Admin account created");
                Ok(true)
            }
            Err(AppError::DuplicateUser { email }) => {
                tracing::warn!(email = %email, "Admin email already registered with another role");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::notify::testing::RecordingMailer;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        mailer: Arc<RecordingMailer>,
        accounts: AccountService,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let mailer = Arc::new(RecordingMailer::default());
        let accounts = AccountService::new(
            repo.clone(),
            Arc::new(JwtManager::new("test-secret", 3600)),
            Notifier::new(mailer.clone(), "http://portal.test"),
        );
        Fixture {
            repo,
            mailer,
            accounts,
        }
    }

    fn request(email: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            name: "Grace".into(),
            email: email.into(),
            password: "correct horse".into(),
            role: role.map(str::to_string),
            qualifications: Some("PhD, compilers".into()),
        }
    }

    fn admin() -> Caller {
        Caller::new(Uuid::new_v4(), Role::Admin)
    }

    #[tokio::test]
    async fn test_register_roles() {
        let f = fixture();

        let reviewer = f
            .accounts
            .register(request("rev@example.com", Some("reviewer")))
            .await
            .unwrap();
        assert_eq!(reviewer.user.role, Role::Reviewer);
        assert_eq!(reviewer.user.reviewer_status, ReviewerStatus::Pending);
        assert_eq!(reviewer.user.qualifications, "PhD, compilers");

        // Admin is not self-service
        let escalated = f
            .accounts
            .register(request("boss@example.com", Some("admin")))
            .await
            .unwrap();
        assert_eq!(escalated.user.role, Role::Author);
        assert_eq!(escalated.user.qualifications, "");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let f = fixture();
        f.accounts.register(request("a@example.com", None)).await.unwrap();

        let err = f
            .accounts
            .register(request("A@Example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateUser { .. }));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let f = fixture();
        let mut bad = request("not-an-email", None);
        assert!(matches!(
            f.accounts.register(bad.clone()).await,
            Err(AppError::Validation { .. })
        ));

        bad.email = "ok@example.com".into();
        bad.password = "123".into();
        assert!(matches!(
            f.accounts.register(bad).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_login_flow() {
        let f = fixture();
        f.accounts.register(request("a@example.com", None)).await.unwrap();

        let response = f.accounts.login("a@example.com", "correct horse").await.unwrap();
        assert!(!response.token.is_empty());
        assert_eq!(response.user.email, "a@example.com");

        assert!(matches!(
            f.accounts.login("a@example.com", "wrong").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            f.accounts.login("nobody@example.com", "correct horse").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_pending_reviewer_cannot_login_until_approved() {
        let f = fixture();
        let registered = f
            .accounts
            .register(request("rev@example.com", Some("reviewer")))
            .await
            .unwrap();

        assert!(matches!(
            f.accounts.login("rev@example.com", "correct horse").await,
            Err(AppError::AccountNotApproved)
        ));

        let pending = f.accounts.list_pending_reviewers(&admin()).await.unwrap();
        assert_eq!(pending.len(), 1);

        let profile = f
            .accounts
            .set_reviewer_status(&admin(), registered.user.id, "APPROVED")
            .await
            .unwrap();
        assert_eq!(profile.reviewer_status, ReviewerStatus::Approved);
        assert!(f.accounts.login("rev@example.com", "correct horse").await.is_ok());
        assert_eq!(f.accounts.list_reviewers(&admin()).await.unwrap().len(), 1);

        let sent = f.mailer.wait_for(1).await;
        assert!(sent.iter().any(|e| e.subject == "Reviewer Application APPROVED"));
    }

    #[tokio::test]
    async fn test_set_reviewer_status_rules() {
        let f = fixture();
        let author = f.accounts.register(request("a@example.com", None)).await.unwrap();
        let reviewer = f
            .accounts
            .register(request("r@example.com", Some("reviewer")))
            .await
            .unwrap();

        assert!(matches!(
            f.accounts
                .set_reviewer_status(&admin(), reviewer.user.id, "PENDING")
                .await,
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            f.accounts
                .set_reviewer_status(&admin(), author.user.id, "APPROVED")
                .await,
            Err(AppError::UserNotFound { .. })
        ));

        let non_admin = Caller::new(reviewer.user.id, Role::Reviewer);
        assert!(matches!(
            f.accounts
                .set_reviewer_status(&non_admin, reviewer.user.id, "APPROVED")
                .await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let f = fixture();
        let config = AdminConfig {
            name: None,
            email: Some("admin@example.com".into()),
            password: Some("admin-pass".into()),
        };

        assert!(f.accounts.seed_admin(&config).await.unwrap());
        assert!(!f.accounts.seed_admin(&config).await.unwrap());
        assert!(f.repo.has_admin().await.unwrap());

        let login = f.accounts.login("admin@example.com", "admin-pass").await.unwrap();
        assert_eq!(login.user.role, Role::Admin);

        assert!(!f.accounts.seed_admin(&AdminConfig::default()).await.unwrap());
    }
}
