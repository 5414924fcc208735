//! Usage statistics, kept in memory.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// How many users `/stats` lists by question count.
pub const TOP_USERS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: String,
    pub username: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub messages: u64,
    pub questions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub total_users: usize,
    pub new_today: usize,
    pub active_today: usize,
    pub active_week: usize,
    pub total_messages: u64,
    pub total_questions: u64,
    /// Highest question count first
    pub top_users: Vec<UserStats>,
}

#[derive(Debug, Default)]
pub struct StatsRegistry {
    users: RwLock<HashMap<String, UserStats>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one inbound message, registering the user on first contact.
    pub async fn track(&self, user_id: &str, username: Option<&str>) {
        self.track_at(user_id, username, Utc::now()).await;
    }

    async fn track_at(&self, user_id: &str, username: Option<&str>, now: DateTime<Utc>) {
        let mut users = self.users.write().await;
        let entry = users.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id = %user_id, "Registering new user");
            UserStats {
                user_id: user_id.to_string(),
                username: None,
                registered_at: now,
                last_seen: now,
                messages: 0,
                questions: 0,
            }
        });
        if username.is_some() {
            entry.username = username.map(str::to_string);
        }
        entry.last_seen = now;
        entry.messages += 1;
    }

    pub async fn increment_questions(&self, user_id: &str) {
        if let Some(user) = self.users.write().await.get_mut(user_id) {
            user.questions += 1;
        }
    }

    pub async fn user(&self, user_id: &str) -> Option<UserStats> {
        self.users.read().await.get(user_id).cloned()
    }

    pub async fn summary(&self) -> StatsSummary {
        self.summary_at(Utc::now()).await
    }

    async fn summary_at(&self, now: DateTime<Utc>) -> StatsSummary {
        let users = self.users.read().await;
        let today = now.date_naive();
        let week_ago = now - Duration::days(7);

        let mut top_users: Vec<UserStats> = users.values().filter(|u| u.questions > 0).cloned().collect();
        top_users.sort_by(|a, b| b.questions.cmp(&a.questions).then_with(|| a.user_id.cmp(&b.user_id)));
        top_users.truncate(TOP_USERS);

        StatsSummary {
            total_users: users.len(),
            new_today: users.values().filter(|u| u.registered_at.date_naive() == today).count(),
            active_today: users.values().filter(|u| u.last_seen.date_naive() == today).count(),
            active_week: users.values().filter(|u| u.last_seen > week_ago).count(),
            total_messages: users.values().map(|u| u.messages).sum(),
            total_questions: users.values().map(|u| u.questions).sum(),
            top_users,
        }
    }
}

/// Render a summary for the `/stats` reply.
pub fn format_summary(summary: &StatsSummary, admin_count: usize) -> String {
    let mut out = String::from("📊 Bot statistics\n\n");
    out.push_str("👥 Users:\n");
    out.push_str(&format!("  • Total: {}\n", summary.total_users));
    out.push_str(&format!("  • New today: {}\n", summary.new_today));
    out.push_str(&format!("  • Active today: {}\n", summary.active_today));
    out.push_str(&format!("  • Active this week: {}\n\n", summary.active_week));
    out.push_str(&format!("💬 Questions: {}\n", summary.total_questions));
    out.push_str(&format!("✉️ Messages: {}\n", summary.total_messages));
    out.push_str(&format!("👤 Admins: {admin_count}\n"));

    if !summary.top_users.is_empty() {
        out.push_str("\n🏆 Top users by questions:\n");
        for (i, user) in summary.top_users.iter().enumerate() {
            let name = user
                .username
                .as_deref()
                .map_or_else(|| user.user_id.clone(), |u| format!("@{u} ({})", user.user_id));
            out.push_str(&format!("  {}. {}: {}\n", i + 1, name, user.questions));
        }
    }
    out
}
