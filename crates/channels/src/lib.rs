//! Messaging channels for m1nd.
//!
//! A channel connects the bot to a chat platform. Answers longer than the
//! platform's per-message ceiling are split by the [`Segmenter`] and sent by
//! the [`DeliveryAdapter`].
//!
//! Available channels:
//! - **Telegram**: Bot API long polling
//! - **CLI**: interactive terminal chat (stdin/stdout)

pub mod cli;
pub mod delivery;
pub mod segmenter;
pub mod telegram;

pub use cli::CliChannel;
pub use delivery::DeliveryAdapter;
pub use segmenter::{MessageChunk, SegmentError, Segmenter};
pub use telegram::TelegramChannel;
