#![allow(clippy::unwrap_used, clippy::expect_used)]

// Lock renewal arithmetic

use std::time::Duration;

use chrono::Utc;
use converge_engine::worker::{
    extend_duration, DEFAULT_MESSAGE_EXTEND_MARGIN, DEFAULT_MIN_MESSAGE_LOCK_DURATION,
};
use proptest::prelude::*;

#[test]
fn test_three_minute_lock_renews_margin_early() {
    let now = Utc::now();
    for margin_secs in [0u64, 10, 30, 90] {
        let margin = Duration::from_secs(margin_secs);
        let got = extend_duration(
            now + chrono::Duration::seconds(180),
            now,
            margin,
            DEFAULT_MIN_MESSAGE_LOCK_DURATION,
        );
        assert_eq!(got, Duration::from_secs(180) - margin);
    }
}

proptest! {
    #[test]
    fn prop_inside_margin_waits_min_lock(
        offset_ms in -600_000i64..=30_000,
        min_ms in 1u64..60_000,
    ) {
        let now = Utc::now();
        let min = Duration::from_millis(min_ms);
        let got = extend_duration(
            now + chrono::Duration::milliseconds(offset_ms),
            now,
            DEFAULT_MESSAGE_EXTEND_MARGIN,
            min,
        );
        prop_assert_eq!(got, min);
    }

    #[test]
    fn prop_outside_margin_leaves_exactly_margin(
        remaining_ms in 1i64..3_600_000,
        margin_ms in 0u64..120_000,
    ) {
        let now = Utc::now();
        let margin = Duration::from_millis(margin_ms);
        let visible_until = now + chrono::Duration::milliseconds(margin_ms as i64 + remaining_ms);
        let got = extend_duration(visible_until, now, margin, DEFAULT_MIN_MESSAGE_LOCK_DURATION);
        prop_assert_eq!(got, Duration::from_millis(remaining_ms as u64));
    }
}
