// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 with microseconds and a `Z` suffix.
///
/// Fixed width, so stored strings sort chronologically.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time, formatted for storage.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_sortable() {
        let earlier = DateTime::from_timestamp(1_704_103_200, 5_000).unwrap();
        let later = DateTime::from_timestamp(1_704_103_200, 120_000_000).unwrap();

        let a = format_utc_rfc3339(earlier);
        let b = format_utc_rfc3339(later);

        assert_eq!(a, "2024-01-01T10:00:00.000005Z");
        assert!(a < b);
    }
}
