//! Human-paced input injection.

use std::time::Duration;

use rand::Rng;

use crate::transport::ShellChannel;
use crate::Result;

/// Default lower bound of the inter-character delay.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(50);
/// Default upper bound of the inter-character delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(150);

/// Writes text one character at a time with a random pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingPacer {
    min: Duration,
    max: Duration,
}

impl TypingPacer {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// No pauses at all; characters are still written one by one.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw one delay uniformly from the window.
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    /// Type `text` into `channel`.
    pub async fn type_into(&self, channel: &dyn ShellChannel, text: &str) -> Result<()> {
        let mut chars = text.chars().peekable();
        let mut utf8 = [0u8; 4];
        while let Some(c) = chars.next() {
            channel.write(c.encode_utf8(&mut utf8).as_bytes()).await?;
            if chars.peek().is_some() {
                let delay = self.next_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Ok(())
    }
}

impl Default for TypingPacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY)
    }
}
