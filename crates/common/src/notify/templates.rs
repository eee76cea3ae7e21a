//! Email bodies for workflow events

use super::Email;
use crate::identity::{ReviewerStatus, User};
use crate::review::{Decision, Paper};

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn login_url(portal_url: &str) -> String {
    format!("{}/login", portal_url.trim_end_matches('/'))
}

pub(super) fn reviewer_assigned(reviewer: &User, paper: &Paper, portal_url: &str) -> Email {
    Email {
        kind: "reviewer_assigned",
        to: reviewer.email.clone(),
        subject: "New Paper Assigned".to_string(),
        text: format!(
            "Hello {}, you have been assigned to review \"{}\". Log in at {} to read it.",
            reviewer.name,
            paper.title,
            login_url(portal_url)
        ),
        html: format!(
            "<p>Hello {},</p><p>You have been assigned to review <strong>\"{}\"</strong>.</p>\
             <p><a href=\"{}\">Open your dashboard</a></p>",
            escape_html(&reviewer.name),
            escape_html(&paper.title),
            login_url(portal_url)
        ),
    }
}

pub(super) fn decision_made(author: &User, paper: &Paper, decision: Decision) -> Email {
    let outcome = match decision {
        Decision::Publish => "PUBLISHED",
        Decision::Reject => "REJECTED",
    };

    Email {
        kind: "decision_made",
        to: author.email.clone(),
        subject: format!("Paper {}", outcome),
        text: format!("Your paper \"{}\" has been {}.", paper.title, outcome),
        html: format!(
            "<p>Your paper <strong>\"{}\"</strong> has been {}.</p>",
            escape_html(&paper.title),
            outcome
        ),
    }
}

pub(super) fn reviewer_status_changed(
    reviewer: &User,
    status: ReviewerStatus,
    portal_url: &str,
) -> Email {
    let text = match status {
        ReviewerStatus::Approved => format!(
            "Your reviewer application has been APPROVED. You can now log in at {}.",
            login_url(portal_url)
        ),
        _ => format!("Your reviewer application has been {}.", status),
    };

    Email {
        kind: "reviewer_status",
        to: reviewer.email.clone(),
        subject: format!("Reviewer Application {}", status),
        html: format!(
            "<p>Your application has been <strong>{}</strong>.</p>",
            status
        ),
        text,
    }
}

pub(super) fn welcome(author: &User, password: &str, paper_title: &str, portal_url: &str) -> Email {
    let login = login_url(portal_url);

    Email {
        kind: "welcome",
        to: author.email.clone(),
        subject: "Your Research Account Created".to_string(),
        text: format!(
            "Welcome! Your paper \"{}\" has been submitted and an account was created so you \
             can track it.\nEmail: {}\nPassword: {}\nLog in at {} and change your password.",
            paper_title, author.email, password, login
        ),
        html: format!(
            "<h2>Welcome to Research Portal</h2>\
             <p>Your paper <strong>\"{}\"</strong> has been successfully submitted.</p>\
             <p>An account has been created for you to track your submission status.</p>\
             <p><strong>Email:</strong> {}<br><strong>Password:</strong> <code>{}</code></p>\
             <p>Please log in to change your password and view your dashboard.</p>\
             <p><a href=\"{}\">Login Now</a></p>",
            escape_html(paper_title),
            escape_html(&author.email),
            escape_html(password),
            login
        ),
    }
}
