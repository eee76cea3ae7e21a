//! Resolving who a submission belongs to

use super::{normalize_email, Role, User};
use crate::auth::{generate_password, hash_password, Caller};
use crate::db::UserStore;
use crate::errors::{AppError, Result};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Contact details supplied with an anonymous submission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuthorDetails {
    #[validate(length(min = 1, max = 200, message = "Author name is required"))]
    pub name: String,

    #[validate(email(message = "A valid author email is required"))]
    pub email: String,
}

impl AuthorDetails {
    /// Trim the name, normalise the email, and validate both
    pub fn normalized(self) -> Result<Self> {
        let details = AuthorDetails {
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
        };
        if details.name.is_empty() || details.email.is_empty() {
            return Err(missing_details());
        }
        details.validate()?;
        Ok(details)
    }
}

/// Anonymous submission without name and email
pub(crate) fn missing_details() -> AppError {
    AppError::Validation {
        message: "Author details required".to_string(),
        field: Some("email".to_string()),
    }
}

/// Account created on the fly for a new author
#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    pub user: User,
    /// Plain-text password, delivered once by email
    pub password: String,
}

/// The concrete author a paper will be recorded against
#[derive(Debug, Clone)]
pub struct ResolvedAuthor {
    pub user_id: Uuid,
    pub provisioned: Option<ProvisionedAccount>,
}

/// Determine the author of a submission.
///
/// An authenticated caller is the author. Otherwise name and email are
/// required: an existing account with that email is reused, and a new
/// author account with a generated password is created when there is none.
pub async fn resolve_author(
    users: &dyn UserStore,
    caller: Option<&Caller>,
    details: Option<AuthorDetails>,
    password_len: usize,
) -> Result<ResolvedAuthor> {
    if let Some(caller) = caller {
        return Ok(ResolvedAuthor {
            user_id: caller.user_id,
            provisioned: None,
        });
    }

    let details = details.ok_or_else(missing_details)?.normalized()?;

    if let Some(existing) = users.find_user_by_email(&details.email).await? {
        tracing::debug!(user_id = %existing.id, "Submission linked to existing account");
        return Ok(ResolvedAuthor {
            user_id: existing.id,
            provisioned: None,
        });
    }

    let password = generate_password(password_len);
    let user = User::new(
        &details.name,
        &details.email,
        hash_password(&password)?,
        Role::Author,
    );

    match users.insert_user(&user).await {
        Ok(()) => {
            tracing::info!(user_id = %user.id, "Provisioned author account");
            Ok(ResolvedAuthor {
                user_id: user.id,
                provisioned: Some(ProvisionedAccount { user, password }),
            })
        }
        // Lost a race with a concurrent submission for the same email
        Err(AppError::DuplicateUser { email }) => {
            let existing = users
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| AppError::Internal {
                    message: format!("Account for {} vanished after conflict", email),
                })?;
            Ok(ResolvedAuthor {
                user_id: existing.id,
                provisioned: None,
            })
        }
        Err(e) => Err(e),
    }
}
