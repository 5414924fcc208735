//! Feedback log: what users said about their last answer.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

/// A reply to the feedback prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackChoice {
    Like,
    Dislike,
    Useful,
    NotUseful,
    /// Asks for a free-text comment next
    Comment,
}

impl FromStr for FeedbackChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "like" | "👍" => Ok(Self::Like),
            "dislike" | "👎" => Ok(Self::Dislike),
            "useful" => Ok(Self::Useful),
            "not_useful" => Ok(Self::NotUseful),
            "comment" => Ok(Self::Comment),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub user_id: String,
    pub username: Option<String>,
    pub liked: Option<bool>,
    pub useful: Option<bool>,
    pub comment: Option<String>,
    /// The question the feedback refers to
    pub question: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FeedbackLog {
    entries: Mutex<Vec<Feedback>>,
    last_questions: Mutex<HashMap<String, String>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the user's latest answered question.
    pub async fn remember_question(&self, user_id: &str, question: &str) {
        self.last_questions
            .lock()
            .await
            .insert(user_id.to_string(), question.to_string());
    }

    async fn push(&self, user_id: &str, username: Option<&str>, fill: impl FnOnce(&mut Feedback)) {
        let question = self.last_questions.lock().await.get(user_id).cloned();
        let mut feedback = Feedback {
            user_id: user_id.to_string(),
            username: username.map(str::to_string),
            liked: None,
            useful: None,
            comment: None,
            question,
            created_at: Utc::now(),
        };
        fill(&mut feedback);
        info!(user_id = %user_id, liked = ?feedback.liked, useful = ?feedback.useful, "Feedback recorded");
        self.entries.lock().await.push(feedback);
    }

    /// Record a rating. [`FeedbackChoice::Comment`] records nothing; the
    /// comment arrives with [`FeedbackLog::record_comment`].
    pub async fn record(&self, user_id: &str, username: Option<&str>, choice: FeedbackChoice) {
        let (liked, useful) = match choice {
            FeedbackChoice::Like => (Some(true), None),
            FeedbackChoice::Dislike => (Some(false), None),
            FeedbackChoice::Useful => (None, Some(true)),
            FeedbackChoice::NotUseful => (None, Some(false)),
            FeedbackChoice::Comment => return,
        };
        self.push(user_id, username, |f| {
            f.liked = liked;
            f.useful = useful;
        })
        .await;
    }

    pub async fn record_comment(&self, user_id: &str, username: Option<&str>, comment: &str) {
        let comment = comment.trim().to_string();
        self.push(user_id, username, |f| f.comment = Some(comment)).await;
    }

    /// The newest `limit` entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Feedback> {
        self.entries.lock().await.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_choices() {
        assert_eq!("like".parse::<FeedbackChoice>(), Ok(FeedbackChoice::Like));
        assert_eq!(" Not useful ".parse::<FeedbackChoice>(), Ok(FeedbackChoice::NotUseful));
        assert_eq!("not-useful".parse::<FeedbackChoice>(), Ok(FeedbackChoice::NotUseful));
        assert_eq!("COMMENT".parse::<FeedbackChoice>(), Ok(FeedbackChoice::Comment));
        assert_eq!("maybe".parse::<FeedbackChoice>(), Err(()));
    }

    #[tokio::test]
    async fn ratings_refer_to_last_question() {
        let log = FeedbackLog::new();
        log.remember_question("u1", "what is rust?").await;
        log.record("u1", Some("alice"), FeedbackChoice::Useful).await;

        let entries = log.recent(10).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].useful, Some(true));
        assert_eq!(entries[0].liked, None);
        assert_eq!(entries[0].question.as_deref(), Some("what is rust?"));
    }

    #[tokio::test]
    async fn comment_choice_waits_for_text() {
        let log = FeedbackLog::new();
        log.record("u1", None, FeedbackChoice::Comment).await;
        assert!(log.is_empty().await);

        log.record_comment("u1", None, "  great bot  ").await;
        let entries = log.recent(1).await;
        assert_eq!(entries[0].comment.as_deref(), Some("great bot"));
        assert!(entries[0].question.is_none());
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let log = FeedbackLog::new();
        log.record("u1", None, FeedbackChoice::Like).await;
        log.record("u2", None, FeedbackChoice::Dislike).await;
        let recent = log.recent(1).await;
        assert_eq!(recent[0].user_id, "u2");
        assert_eq!(log.len().await, 2);
    }
}
