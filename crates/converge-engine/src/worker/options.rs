//! Worker tuning knobs and their defaults

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Window in which a redelivered message whose operation already finished is skipped
pub const DEFAULT_DEDUPLICATION_DURATION: Duration = Duration::from_secs(30);

/// Deliveries allowed before an operation is failed outright
pub const DEFAULT_MAX_OPERATION_RETRY_COUNT: u32 = 3;

/// Slack left before lock expiry when renewing
pub const DEFAULT_MESSAGE_EXTEND_MARGIN: Duration = Duration::from_secs(30);

/// Floor on the interval between lock renewals
pub const DEFAULT_MIN_MESSAGE_LOCK_DURATION: Duration = Duration::from_secs(5);

/// In-flight messages per worker
pub const DEFAULT_MAX_OPERATION_CONCURRENCY: usize = 3;

/// Visibility requested on lease and on every extend
pub const DEFAULT_MESSAGE_LOCK_DURATION: Duration = Duration::from_secs(60);

/// Sleep between lease attempts when the queue is empty or failing
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Worker options; zero values fall back to the defaults above
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkerOptions {
    pub deduplication_duration: Duration,
    pub max_operation_retry_count: u32,
    pub message_extend_margin: Duration,
    pub min_message_lock_duration: Duration,
    pub max_operation_concurrency: usize,
    pub message_lock_duration: Duration,
    pub poll_interval: Duration,
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() {
        default
    } else {
        value
    }
}

impl WorkerOptions {
    /// Copy with every unset field replaced by its default
    #[must_use]
    pub fn resolved(self) -> Self {
        Self {
            deduplication_duration: or_default(
                self.deduplication_duration,
                DEFAULT_DEDUPLICATION_DURATION,
            ),
            max_operation_retry_count: or_default(
                self.max_operation_retry_count,
                DEFAULT_MAX_OPERATION_RETRY_COUNT,
            ),
            message_extend_margin: or_default(
                self.message_extend_margin,
                DEFAULT_MESSAGE_EXTEND_MARGIN,
            ),
            min_message_lock_duration: or_default(
                self.min_message_lock_duration,
                DEFAULT_MIN_MESSAGE_LOCK_DURATION,
            ),
            max_operation_concurrency: or_default(
                self.max_operation_concurrency,
                DEFAULT_MAX_OPERATION_CONCURRENCY,
            ),
            message_lock_duration: or_default(
                self.message_lock_duration,
                DEFAULT_MESSAGE_LOCK_DURATION,
            ),
            poll_interval: or_default(self.poll_interval, DEFAULT_POLL_INTERVAL),
        }
    }
}

/// How long to wait before the next lock renewal
///
/// Renews `margin` before the lock lapses; once the lock is already inside
/// the margin, waits `min_lock` instead.
pub fn extend_duration(
    visible_until: DateTime<Utc>,
    now: DateTime<Utc>,
    margin: Duration,
    min_lock: Duration,
) -> Duration {
    let Ok(margin) = chrono::Duration::from_std(margin) else {
        return min_lock;
    };
    let Some(deadline) = now.checked_add_signed(margin) else {
        return min_lock;
    };
    if visible_until <= deadline {
        return min_lock;
    }
    (visible_until - deadline).to_std().unwrap_or(min_lock)
}
