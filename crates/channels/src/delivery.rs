//! Delivery adapter: sends an answer of any length over a channel as one
//! or more messages, in order.

use std::sync::Arc;
use std::time::Duration;

use m1nd_config::DeliveryConfig;
use m1nd_core::channel::Channel;
use m1nd_core::error::ChannelError;
use tracing::debug;

use crate::segmenter::{SegmentError, Segmenter};

pub struct DeliveryAdapter {
    channel: Arc<dyn Channel>,
    segmenter: Segmenter,
    part_delay: Duration,
}

impl DeliveryAdapter {
    pub fn new(channel: Arc<dyn Channel>, segmenter: Segmenter) -> Self {
        Self {
            channel,
            segmenter,
            part_delay: Duration::from_millis(150),
        }
    }

    /// Build from the `[delivery]` section, never exceeding the channel's own
    /// ceiling.
    pub fn from_config(channel: Arc<dyn Channel>, config: &DeliveryConfig) -> Result<Self, SegmentError> {
        let max = config.max_part_length.min(channel.max_message_length());
        let segmenter = Segmenter::new(max, config.prefix_reserve)?;
        Ok(Self::new(channel, segmenter).with_part_delay(Duration::from_millis(config.part_delay_ms)))
    }

    /// Pause between consecutive parts.
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Send `text` to `chat_id`. Returns how many messages went out.
    ///
    /// Blank text sends nothing. The first failed send stops delivery.
    pub async fn deliver(&self, chat_id: &str, text: &str) -> Result<usize, ChannelError> {
        if text.trim().is_empty() {
            debug!(chat_id = %chat_id, "Skipping empty delivery");
            return Ok(0);
        }

        let chunks = self
            .segmenter
            .split(text)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        let total = chunks.len();
        for chunk in &chunks {
            if chunk.index > 1 && !self.part_delay.is_zero() {
                tokio::time::sleep(self.part_delay).await;
            }
            self.channel.send(chat_id, &chunk.text()).await?;
            debug!(
                channel = %self.channel.name(),
                chat_id = %chat_id,
                part = chunk.index,
                total,
                "Delivered message part"
            );
        }

        Ok(total)
    }
}
