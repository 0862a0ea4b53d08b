//! Property-based tests for rating value and comment validation.
//!
//! The rating scale is [1.0, 5.0] in 0.5 increments and the comment window
//! is 10 to 500 characters; these invariants gate every rating submission,
//! so they are exercised across generated inputs rather than hand-picked
//! cases.

use proptest::prelude::*;
use swapvid_core::error::ExchangeError;
use swapvid_core::rating::{
    MAX_COMMENT_CHARS, MIN_COMMENT_CHARS, RatingValue, normalize_comment,
};

/// Strategy for values exactly on the half-step grid.
fn on_grid_value_strategy() -> impl Strategy<Value = f32> {
    (2u8..=10).prop_map(|half_steps| f32::from(half_steps) / 2.0)
}

/// Strategy for in-range values that miss the half-step grid.
fn off_grid_value_strategy() -> impl Strategy<Value = f32> {
    (1.0f32..5.0).prop_filter("value must miss the 0.5 grid", |v| {
        let doubled = v * 2.0;
        doubled.trunc() != doubled
    })
}

/// Strategy for values outside [1.0, 5.0] entirely.
fn out_of_range_value_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![-100.0f32..0.99, 5.01f32..100.0]
}

proptest! {
    /// Every value on the half-step grid is accepted and survives the
    /// round-trip through the half-step representation.
    #[test]
    fn prop_grid_values_accepted(value in on_grid_value_strategy()) {
        let rating = RatingValue::new(value).unwrap();
        prop_assert_eq!(rating.as_f32(), value);
        prop_assert!((2..=10).contains(&rating.half_steps()));
    }

    /// Values inside the range but off the grid always fail validation.
    #[test]
    fn prop_off_grid_values_rejected(value in off_grid_value_strategy()) {
        prop_assert!(matches!(
            RatingValue::new(value),
            Err(ExchangeError::Validation(_))
        ));
    }

    /// Values outside the range always fail validation.
    #[test]
    fn prop_out_of_range_values_rejected(value in out_of_range_value_strategy()) {
        prop_assert!(matches!(
            RatingValue::new(value),
            Err(ExchangeError::Validation(_))
        ));
    }

    /// A comment passes exactly when it is empty (treated as absent) or its
    /// character count lies in the allowed window.
    #[test]
    fn prop_comment_window(comment in "[a-zA-Z0-9 ]{0,600}") {
        let chars = comment.chars().count();
        let result = normalize_comment(Some(&comment));

        if chars == 0 {
            prop_assert_eq!(result.unwrap(), None);
        } else if (MIN_COMMENT_CHARS..=MAX_COMMENT_CHARS).contains(&chars) {
            prop_assert_eq!(result.unwrap(), Some(comment));
        } else {
            prop_assert!(matches!(result, Err(ExchangeError::Validation(_))));
        }
    }

    /// Multi-byte characters are counted as characters, not bytes.
    #[test]
    fn prop_comment_counts_chars_not_bytes(len in 1usize..=40) {
        let comment: String = std::iter::repeat('ü').take(len).collect();
        let result = normalize_comment(Some(&comment));

        if (MIN_COMMENT_CHARS..=MAX_COMMENT_CHARS).contains(&len) {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}

#[test]
fn absent_comment_is_accepted() {
    assert_eq!(normalize_comment(None).unwrap(), None);
}
