//! Property-based tests for title promotion invariants
//!
//! The evaluator is a pure function, so these run against generated ladders
//! with strictly increasing thresholds, the same shape the catalog enforces.

use market_core::Title;
use order_engine::titles::qualifying_title;
use proptest::prelude::*;

fn title(level: u8, required: u32) -> Title {
    Title {
        level,
        name: format!("Tier {}", level),
        required_provinces: required,
    }
}

/// Ladders of 1 to 6 titles with strictly increasing thresholds
fn ladder_strategy() -> impl Strategy<Value = Vec<Title>> {
    prop::collection::btree_set(1u32..200, 1..6).prop_map(|thresholds| {
        thresholds
            .into_iter()
            .enumerate()
            .map(|(i, required)| title(i as u8 + 1, required))
            .collect()
    })
}

proptest! {
    /// More provinces never yields a lower title
    #[test]
    fn prop_qualifying_title_is_monotone(
        ladder in ladder_strategy(),
        count in 0u32..250,
    ) {
        let lower = qualifying_title(&ladder, count).map(|t| t.level).unwrap_or(0);
        let higher = qualifying_title(&ladder, count + 1).map(|t| t.level).unwrap_or(0);
        prop_assert!(higher >= lower);
    }

    /// The chosen title's threshold is met and every higher title's is not
    #[test]
    fn prop_qualifying_title_is_highest_met(
        ladder in ladder_strategy(),
        count in 0u32..250,
    ) {
        match qualifying_title(&ladder, count) {
            Some(chosen) => {
                prop_assert!(chosen.required_provinces <= count);
                for title in &ladder {
                    if title.level > chosen.level {
                        prop_assert!(title.required_provinces > count);
                    }
                }
            }
            None => {
                for title in &ladder {
                    prop_assert!(title.required_provinces > count);
                }
            }
        }
    }

    /// Folding the promotion rule over any reward sequence never demotes
    #[test]
    fn prop_promotion_never_demotes(
        ladder in ladder_strategy(),
        increments in prop::collection::vec(0u32..3, 1..40),
    ) {
        let mut provinces = 0u32;
        let mut level = 1u8;
        for increment in increments {
            provinces += increment;
            let previous = level;
            if let Some(title) = qualifying_title(&ladder, provinces) {
                if title.level > level {
                    level = title.level;
                }
            }
            prop_assert!(level >= previous);
        }
    }
}
