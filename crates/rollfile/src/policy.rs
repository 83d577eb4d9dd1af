//! Rotation trigger evaluation for size and date thresholds.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

/// What caused a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    /// The size threshold was crossed.
    Size,
    /// The date token changed across a pattern boundary.
    Date,
    /// Rotation was forced via [`rotate`](crate::RollingFileWriteStream::rotate).
    Manual,
}

/// Decides whether a rotation is due before the next write is accepted.
///
/// Size is checked before date; the two triggers are otherwise an
/// independent boolean OR.
#[derive(Debug, Clone)]
pub struct RollingPolicy {
    max_size: Option<u64>,
    pattern: Option<String>,
}

impl RollingPolicy {
    /// Creates a policy from the configured thresholds.
    pub fn new(max_size: Option<u64>, pattern: Option<String>) -> Self {
        Self { max_size, pattern }
    }

    /// Formats the date token for `now`, truncated to the pattern's
    /// resolution. `None` when no pattern is configured.
    pub fn date_token(&self, now: DateTime<Local>) -> Option<String> {
        self.pattern
            .as_deref()
            .map(|pattern| now.format(pattern).to_string())
    }

    /// Returns the trigger that fires for a write of `incoming` bytes, if
    /// any.
    ///
    /// A payload that alone exceeds `max_size` never rotates an empty
    /// file: it is written to the fresh file in full, so an oversized
    /// record cannot start an infinite rotation loop. The date trigger
    /// compares against `last_token` and stays quiet until the stream has
    /// established one.
    pub fn should_rotate(
        &self,
        current_size: u64,
        incoming: u64,
        now: DateTime<Local>,
        last_token: Option<&str>,
    ) -> Option<RotationTrigger> {
        if let Some(max_size) = self.max_size {
            if current_size > 0 && current_size + incoming > max_size {
                return Some(RotationTrigger::Size);
            }
        }

        if self.pattern.is_some() {
            if let Some(last) = last_token {
                let token = self.date_token(now);
                if token.as_deref() != Some(last) {
                    return Some(RotationTrigger::Date);
                }
            }
        }

        None
    }
}

/// Returns true when `pattern` is a well-formed strftime format string.
pub(crate) fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}
