//! Per-user interaction state.
//!
//! Some bot commands need a follow-up message ("send me the username",
//! "write your comment"). Which follow-up is expected is tracked as an
//! explicit state machine and changed only through [`UserState::on`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    /// Plain text is a question for the model
    #[default]
    Idle,
    /// Next message is a username to grant admin rights to
    AwaitingAdminUsername,
    /// Next message is a username to revoke admin rights from
    AwaitingRemoveAdminUsername,
    /// Next message is a feedback choice
    AwaitingFeedbackRating,
    /// Next message is a free-text feedback comment
    AwaitingFeedbackComment,
}

/// Something that happened in a user's chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    AddAdminRequested,
    RemoveAdminRequested,
    FeedbackRequested,
    CommentRequested,
    /// The awaited follow-up message arrived
    InputReceived,
    Cancelled,
}

impl UserState {
    /// The state after `event`.
    pub fn on(self, event: UserEvent) -> UserState {
        use UserEvent as E;
        use UserState as S;

        match (self, event) {
            (_, E::Cancelled) => S::Idle,
            (_, E::AddAdminRequested) => S::AwaitingAdminUsername,
            (_, E::RemoveAdminRequested) => S::AwaitingRemoveAdminUsername,
            (_, E::FeedbackRequested) => S::AwaitingFeedbackRating,
            (S::AwaitingFeedbackRating, E::CommentRequested) => S::AwaitingFeedbackComment,
            (S::Idle, E::InputReceived) => S::Idle,
            (_, E::InputReceived) => S::Idle,
            (state, E::CommentRequested) => state,
        }
    }

    pub fn is_idle(self) -> bool {
        self == UserState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_flow_returns_to_idle() {
        let s = UserState::Idle.on(UserEvent::AddAdminRequested);
        assert_eq!(s, UserState::AwaitingAdminUsername);
        assert_eq!(s.on(UserEvent::InputReceived), UserState::Idle);

        let s = UserState::Idle.on(UserEvent::RemoveAdminRequested);
        assert_eq!(s, UserState::AwaitingRemoveAdminUsername);
        assert!(s.on(UserEvent::InputReceived).is_idle());
    }

    #[test]
    fn feedback_comment_flow() {
        let s = UserState::Idle
            .on(UserEvent::FeedbackRequested)
            .on(UserEvent::CommentRequested);
        assert_eq!(s, UserState::AwaitingFeedbackComment);
        assert_eq!(s.on(UserEvent::InputReceived), UserState::Idle);
    }

    #[test]
    fn comment_request_outside_feedback_is_ignored() {
        assert_eq!(UserState::Idle.on(UserEvent::CommentRequested), UserState::Idle);
        assert_eq!(
            UserState::AwaitingAdminUsername.on(UserEvent::CommentRequested),
            UserState::AwaitingAdminUsername
        );
    }

    #[test]
    fn cancel_always_resets() {
        for s in [
            UserState::AwaitingAdminUsername,
            UserState::AwaitingRemoveAdminUsername,
            UserState::AwaitingFeedbackRating,
            UserState::AwaitingFeedbackComment,
        ] {
            assert_eq!(s.on(UserEvent::Cancelled), UserState::Idle);
        }
    }

    #[test]
    fn new_command_replaces_pending_one() {
        assert_eq!(
            UserState::AwaitingFeedbackComment.on(UserEvent::AddAdminRequested),
            UserState::AwaitingAdminUsername
        );
    }
}
