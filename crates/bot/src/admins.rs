//! Admin registry: Telegram usernames allowed to run admin commands.
//!
//! Usernames are stored as `@name` and compared case-insensitively.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("'{0}' is not a valid username")]
    InvalidUsername(String),

    #[error("{0} is already an admin")]
    AlreadyAdmin(String),

    #[error("{0} is not an admin")]
    NotAdmin(String),

    #[error("you cannot remove yourself")]
    SelfRemoval,

    #[error("the last admin cannot be removed")]
    LastAdmin,
}

#[derive(Debug, Clone)]
pub struct AdminEntry {
    pub username: String,
    pub added_at: DateTime<Utc>,
    /// `None` for admins seeded from configuration
    pub added_by: Option<String>,
}

/// Canonical `@name` form, or `None` if the input is not a username.
pub fn normalize(username: &str) -> Option<String> {
    let name = username.trim().trim_start_matches('@');
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| format!("@{name}"))
}

fn same(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[derive(Debug, Default)]
pub struct AdminRegistry {
    admins: RwLock<Vec<AdminEntry>>,
}

impl AdminRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with `usernames`; invalid entries are skipped.
    pub fn seeded<S: AsRef<str>>(usernames: &[S]) -> Self {
        let now = Utc::now();
        let mut admins: Vec<AdminEntry> = Vec::new();
        for username in usernames.iter().filter_map(|u| normalize(u.as_ref())) {
            if !admins.iter().any(|a| same(&a.username, &username)) {
                admins.push(AdminEntry {
                    username,
                    added_at: now,
                    added_by: None,
                });
            }
        }
        Self {
            admins: RwLock::new(admins),
        }
    }

    pub async fn is_admin(&self, username: Option<&str>) -> bool {
        let Some(username) = username.and_then(normalize) else {
            return false;
        };
        self.admins.read().await.iter().any(|a| same(&a.username, &username))
    }

    /// Grant admin rights. Returns the normalised username.
    pub async fn add(&self, username: &str, added_by: Option<&str>) -> Result<String, AdminError> {
        let username = normalize(username).ok_or_else(|| AdminError::InvalidUsername(username.to_string()))?;

        let mut admins = self.admins.write().await;
        if admins.iter().any(|a| same(&a.username, &username)) {
            return Err(AdminError::AlreadyAdmin(username));
        }

        info!(admin = %username, added_by = ?added_by, "Admin added");
        admins.push(AdminEntry {
            username: username.clone(),
            added_at: Utc::now(),
            added_by: added_by.and_then(normalize),
        });
        Ok(username)
    }

    /// Revoke admin rights. Returns the normalised username.
    pub async fn remove(&self, username: &str, requested_by: Option<&str>) -> Result<String, AdminError> {
        let username = normalize(username).ok_or_else(|| AdminError::InvalidUsername(username.to_string()))?;
        if requested_by
            .and_then(normalize)
            .is_some_and(|me| same(&me, &username))
        {
            return Err(AdminError::SelfRemoval);
        }

        let mut admins = self.admins.write().await;
        let Some(position) = admins.iter().position(|a| same(&a.username, &username)) else {
            return Err(AdminError::NotAdmin(username));
        };
        if admins.len() == 1 {
            return Err(AdminError::LastAdmin);
        }

        admins.remove(position);
        info!(admin = %username, removed_by = ?requested_by, "Admin removed");
        Ok(username)
    }

    pub async fn list(&self) -> Vec<AdminEntry> {
        self.admins.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.admins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.admins.read().await.is_empty()
    }
}
