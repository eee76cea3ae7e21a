//! Outgoing email
//!
//! Provides a unified interface for mail delivery:
//! - Log-only mailer (default, for development)
//! - Transactional mail HTTP API
//!
//! Every workflow email goes through [`Notifier`], which sends on a spawned
//! task. A failed send is logged and counted; it never reaches the caller.

mod templates;

use crate::config::MailConfig;
use crate::errors::{AppError, Result};
use crate::identity::{ReviewerStatus, User};
use crate::metrics;
use crate::review::{Decision, Paper};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Template name, used in logs and metrics
    pub kind: &'static str,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Trait for mail delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a single email
    async fn send(&self, email: &Email) -> Result<()>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Mailer that only logs what it would send
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::info!(
            kind = email.kind,
            to = %email.to,
            subject = %email.subject,
            "Email (log mailer)"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Client for a JSON transactional mail API
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let request = SendRequest {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            text: &email.text,
            html: &email.html,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Mail {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mail {
                message: format!("API error {}: {}", status, body),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Create a mailer based on configuration
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.provider.as_str() {
        "http" => {
            let (Some(api_url), Some(api_key)) = (config.api_url.clone(), config.api_key.clone())
            else {
                return Err(AppError::Configuration {
                    message: "mail.api_url and mail.api_key are required for the http mailer"
                        .to_string(),
                });
            };
            Ok(Arc::new(HttpMailer::new(
                api_url,
                api_key,
                config.from.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "log" => Ok(Arc::new(LogMailer)),
        other => {
            tracing::warn!(provider = other, "Unknown mail provider, using log mailer");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Fire-and-forget dispatcher for workflow emails
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    portal_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, portal_url: impl Into<String>) -> Self {
        Self {
            mailer,
            portal_url: portal_url.into(),
        }
    }

    /// Send an email on a background task
    pub fn dispatch(&self, email: Email) -> JoinHandle<()> {
        let mailer = self.mailer.clone();

        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => tracing::debug!(
                    kind = email.kind,
                    to = %email.to,
                    mailer = mailer.name(),
                    "Email sent"
                ),
                Err(e) => {
                    tracing::warn!(
                        kind = email.kind,
                        to = %email.to,
                        error = %e,
                        "Failed to send email"
                    );
                    metrics::record_notification_failure(email.kind);
                }
            }
        })
    }

    pub fn reviewer_assigned(&self, reviewer: &User, paper: &Paper) -> JoinHandle<()> {
        self.dispatch(templates::reviewer_assigned(reviewer, paper, &self.portal_url))
    }

    pub fn decision_made(&self, author: &User, paper: &Paper, decision: Decision) -> JoinHandle<()> {
        self.dispatch(templates::decision_made(author, paper, decision))
    }

    pub fn reviewer_status_changed(&self, reviewer: &User, status: ReviewerStatus) -> JoinHandle<()> {
        self.dispatch(templates::reviewer_status_changed(reviewer, status, &self.portal_url))
    }

    pub fn welcome(&self, author: &User, password: &str, paper_title: &str) -> JoinHandle<()> {
        self.dispatch(templates::welcome(author, password, paper_title, &self.portal_url))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Mailer that keeps every email it is asked to send
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        pub async fn sent(&self) -> Vec<Email> {
            self.sent.lock().await.clone()
        }

        /// Let spawned sends run until `count` emails arrived (or give up)
        pub async fn wait_for(&self, count: usize) -> Vec<Email> {
            for _ in 0..100 {
                let sent = self.sent().await;
                if sent.len() >= count {
                    return sent;
                }
                tokio::task::yield_now().await;
            }
            self.sent().await
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &Email) -> Result<()> {
            self.sent.lock().await.push(email.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Mailer whose every send fails
    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &Email) -> Result<()> {
            Err(AppError::Mail {
                message: "smtp unavailable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }
}
