//! # m1nd Bot
//!
//! The chat application around the orchestration core: command routing,
//! the per-user follow-up state machine, admin management, feedback and
//! usage statistics. All bookkeeping is in memory.

pub mod admins;
pub mod dispatcher;
pub mod feedback;
pub mod stats;

pub use admins::{AdminError, AdminRegistry};
pub use dispatcher::{Command, Dispatcher, ERROR_REPLY, PROCESSING_REPLY};
pub use feedback::{Feedback, FeedbackChoice, FeedbackLog};
pub use stats::{StatsRegistry, StatsSummary, UserStats};
