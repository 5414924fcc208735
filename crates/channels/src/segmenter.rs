//! Segmenter: splits an outbound text into ordered parts that each fit a
//! channel's per-message ceiling.
//!
//! Text that fits is returned as one unnumbered part. Longer text is cut
//! into windows of `max_part_length - prefix_reserve` units, preferring
//! a paragraph break, then a line break, then a space within the last 300
//! units of each window. Separators stay with the part they end, so the
//! part bodies concatenate back to the exact input. Every part of a split
//! text is labelled `(i/total)`.
//!
//! Lengths are counted in UTF-16 code units, the way Telegram measures its
//! 4096 ceiling. Cuts only fall on character boundaries.

use thiserror::Error;

/// Per-message ceiling of the Telegram Bot API.
pub const DEFAULT_MAX_PART_LENGTH: usize = 4096;

/// Characters set aside for the `(i/total)` label.
pub const DEFAULT_PREFIX_RESERVE: usize = 30;

/// How far back from a window's end a break is searched for.
const BREAK_SEARCH: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("prefix reserve {prefix_reserve} leaves no room in parts of {max_part_length} characters")]
    InvalidLimits {
        max_part_length: usize,
        prefix_reserve: usize,
    },

    #[error("label {label:?} does not fit in parts of {max_part_length} characters")]
    LabelTooLong { label: String, max_part_length: usize },
}

/// One part of a segmented text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    /// 1-based position
    pub index: usize,
    pub total: usize,
    /// The slice of the original text, without the label
    pub body: String,
}

impl MessageChunk {
    /// The text to send: the body, labelled when the text was split.
    pub fn text(&self) -> String {
        if self.total > 1 {
            format!("{}{}", label(self.index, self.total), self.body)
        } else {
            self.body.clone()
        }
    }
}

/// Length as the transport counts it.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

fn label(index: usize, total: usize) -> String {
    format!("({index}/{total})\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    max_part_length: usize,
    prefix_reserve: usize,
}

impl Segmenter {
    pub fn new(max_part_length: usize, prefix_reserve: usize) -> Result<Self, SegmentError> {
        if prefix_reserve >= max_part_length {
            return Err(SegmentError::InvalidLimits {
                max_part_length,
                prefix_reserve,
            });
        }
        Ok(Self {
            max_part_length,
            prefix_reserve,
        })
    }

    pub fn max_part_length(&self) -> usize {
        self.max_part_length
    }

    /// Window size used once a text has to be split.
    pub fn effective_max(&self) -> usize {
        self.max_part_length - self.prefix_reserve
    }

    pub fn split(&self, text: &str) -> Result<Vec<MessageChunk>, SegmentError> {
        let length = utf16_len(text);
        if length <= self.max_part_length {
            return Ok(vec![MessageChunk {
                index: 1,
                total: 1,
                body: text.to_string(),
            }]);
        }

        // A longer label can shrink the room per part and add parts, so the
        // total is raised until the cut agrees with it.
        let chars: Vec<char> = text.chars().collect();
        let mut total = length.div_ceil(self.effective_max());
        loop {
            let bodies = self.cut(&chars, total)?;
            if bodies.len() > total {
                total = bodies.len();
                continue;
            }

            // Fewer parts than assumed only shortens the labels.
            let total = bodies.len();
            return Ok(bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| MessageChunk {
                    index: i + 1,
                    total,
                    body,
                })
                .collect());
        }
    }

    fn cut(&self, chars: &[char], total: usize) -> Result<Vec<String>, SegmentError> {
        let mut bodies = Vec::with_capacity(total);
        let mut start = 0;

        while start < chars.len() {
            let label = label(bodies.len() + 1, total);
            let label_len = utf16_len(&label);
            let capacity = self
                .effective_max()
                .min(self.max_part_length.saturating_sub(label_len));

            // Zero when not even one character fits next to the label.
            let fit = fitting(&chars[start..], capacity);
            if fit == 0 {
                return Err(SegmentError::LabelTooLong {
                    label,
                    max_part_length: self.max_part_length,
                });
            }

            let end = if start + fit == chars.len() {
                chars.len()
            } else {
                start + break_point(&chars[start..start + fit])
            };

            bodies.push(chars[start..end].iter().collect());
            start = end;
        }

        Ok(bodies)
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            max_part_length: DEFAULT_MAX_PART_LENGTH,
            prefix_reserve: DEFAULT_PREFIX_RESERVE,
        }
    }
}

/// How many leading characters of `chars` fit in `capacity` UTF-16 units.
fn fitting(chars: &[char], capacity: usize) -> usize {
    let mut used = 0;
    chars
        .iter()
        .take_while(|c| {
            used += c.len_utf16();
            used <= capacity
        })
        .count()
}

/// Length of the part to cut from `window`, separator included.
fn break_point(window: &[char]) -> usize {
    let searched = window
        .iter()
        .rev()
        .scan(0, |used, c| {
            *used += c.len_utf16();
            (*used <= BREAK_SEARCH).then_some(())
        })
        .count();
    let from = window.len() - searched;
    let tail = &window[from..];

    let paragraph = tail
        .windows(2)
        .rposition(|pair| pair == ['\n', '\n'])
        .map(|i| i + 2);
    let line = || tail.iter().rposition(|&c| c == '\n').map(|i| i + 1);
    let space = || tail.iter().rposition(|&c| c == ' ').map(|i| i + 1);

    paragraph
        .or_else(line)
        .or_else(space)
        .map_or(window.len(), |cut| from + cut)
}
