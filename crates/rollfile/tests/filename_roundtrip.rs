//! Property-based tests for rotated-name formatting and parsing.
//!
//! Uses proptest to verify that every name the formatter can produce is
//! parsed back to the exact index and date token it was built from, for
//! both extension placements and arbitrary calendar dates.

use chrono::NaiveDate;
use proptest::prelude::*;
use rollfile::{FileNameOptions, FileNamePattern};
use std::path::Path;

/// Strategy for calendar dates rendered with `%Y-%m-%d`. Day is capped at
/// 28 so every (year, month) combination is valid.
fn date_token_strategy() -> impl Strategy<Value = String> {
    (1970i32..2100, 1u32..13, 1u32..29).prop_map(|(y, m, d)| {
        NaiveDate::from_ymd_opt(y, m, d)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    })
}

fn pattern(keep_file_ext: bool) -> FileNamePattern {
    FileNamePattern::new(
        Path::new("/var/log/app.log"),
        FileNameOptions {
            keep_file_ext,
            date_pattern: Some("%Y-%m-%d".to_string()),
            ..FileNameOptions::default()
        },
    )
    .unwrap()
}

proptest! {
    /// Every formatted name parses back to the same index and token.
    #[test]
    fn test_format_parse_roundtrip(
        index in 0u64..100_000,
        token in date_token_strategy(),
        keep_file_ext in any::<bool>(),
    ) {
        let p = pattern(keep_file_ext);
        let path = p.format(index, Some(&token));
        let name = path.file_name().unwrap().to_str().unwrap();

        let parsed = p.parse(name).unwrap();
        prop_assert_eq!(parsed.index, index);
        if index > 0 {
            prop_assert_eq!(parsed.date_token.as_deref(), Some(token.as_str()));
        }
        prop_assert!(!parsed.compressed);
    }

    /// Index-only names round-trip without a date pattern in play.
    #[test]
    fn test_index_only_roundtrip(index in 0u64..100_000, keep_file_ext in any::<bool>()) {
        let p = pattern(keep_file_ext);
        let path = p.format(index, None);
        let name = path.file_name().unwrap().to_str().unwrap();

        let parsed = p.parse(name).unwrap();
        prop_assert_eq!(parsed.index, index);
        prop_assert_eq!(parsed.date_token, None);
    }

    /// The `.gz` suffix the compression worker appends never disturbs the
    /// recovered components.
    #[test]
    fn test_gz_suffix_is_transparent(
        index in 1u64..100_000,
        token in date_token_strategy(),
    ) {
        let p = pattern(false);
        let path = p.format(index, Some(&token));
        let name = format!("{}.gz", path.file_name().unwrap().to_str().unwrap());

        let parsed = p.parse(&name).unwrap();
        prop_assert_eq!(parsed.index, index);
        prop_assert_eq!(parsed.date_token.as_deref(), Some(token.as_str()));
        prop_assert!(parsed.compressed);
    }

    /// Names of a different base file are never claimed.
    #[test]
    fn test_foreign_base_never_parses(index in 0u64..100_000) {
        let p = pattern(false);
        let foreign = format!("other.log.{index}");
        prop_assert!(p.parse(&foreign).is_none());
    }
}
