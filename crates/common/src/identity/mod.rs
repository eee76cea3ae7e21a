//! User identities
//!
//! Provides:
//! - Roles and reviewer approval status
//! - Account registration, login, and reviewer approval
//! - Author resolution for paper submissions

mod accounts;
mod author;

pub use accounts::{AccountService, LoginResponse, RegisterRequest, RegisteredUser};
pub use author::{resolve_author, AuthorDetails, ProvisionedAccount, ResolvedAuthor};
pub(crate) use author::missing_details;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Portal role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reviewer,
    Author,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Reviewer => "reviewer",
            Role::Author => "author",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "reviewer" => Ok(Role::Reviewer),
            "author" => Ok(Role::Author),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Approval state of a reviewer application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewerStatus {
    /// Reviewers start pending; every other role is approved on creation
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Reviewer => ReviewerStatus::Pending,
            Role::Admin | Role::Author => ReviewerStatus::Approved,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerStatus::Pending => "PENDING",
            ReviewerStatus::Approved => "APPROVED",
            ReviewerStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ReviewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReviewerStatus::Pending),
            "APPROVED" => Ok(ReviewerStatus::Approved),
            "REJECTED" => Ok(ReviewerStatus::Rejected),
            other => Err(format!("unknown reviewer status: {}", other)),
        }
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub qualifications: String,
    pub reviewer_status: ReviewerStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a new user with role-appropriate defaults
    pub fn new(name: &str, email: &str, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role,
            qualifications: String::new(),
            reviewer_status: ReviewerStatus::initial_for(role),
            created_at: Utc::now(),
        }
    }

    /// Reviewers can act only once approved
    pub fn is_active_reviewer(&self) -> bool {
        self.role == Role::Reviewer && self.reviewer_status == ReviewerStatus::Approved
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            qualifications: self.qualifications.clone(),
            reviewer_status: self.reviewer_status,
            created_at: self.created_at,
        }
    }
}

/// Reference to a user embedded in paper listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Public view of a user (never includes the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub qualifications: String,
    pub reviewer_status: ReviewerStatus,
    pub created_at: DateTime<Utc>,
}

/// Emails are stored trimmed and lower-cased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reviewer_starts_pending() {
        let user = User::new("Rev", "rev@example.com", "hash".into(), Role::Reviewer);
        assert_eq!(user.reviewer_status, ReviewerStatus::Pending);
        assert!(!user.is_active_reviewer());

        let author = User::new("Auth", "auth@example.com", "hash".into(), Role::Author);
        assert_eq!(author.reviewer_status, ReviewerStatus::Approved);
    }

    #[test]
    fn test_email_normalized() {
        let user = User::new(" Ada ", "  Ada@Example.COM ", "hash".into(), Role::Author);
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.name, "Ada");
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Reviewer).unwrap(), "\"reviewer\"");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("publisher".parse::<Role>().is_err());
    }
}
