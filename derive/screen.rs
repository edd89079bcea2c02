//! The three-level clinical screen.

use super::raw::ScreenItems;
use serde::{Deserialize, Serialize};

/// Minimum frequency code for the screen gate to open.
pub const FREQUENCY_CUTOFF: i64 = 2;
const FREQUENCY_MAX: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenResult {
    NoConcern,
    PrimaryConcernA,
    PrimaryConcernB,
}

impl ScreenResult {
    /// Level codes used in the wide table, in reference-first order.
    pub const LEVELS: [u8; 3] = [0, 1, 2];

    pub fn code(self) -> u8 {
        match self {
            ScreenResult::NoConcern => 0,
            ScreenResult::PrimaryConcernA => 1,
            ScreenResult::PrimaryConcernB => 2,
        }
    }
}

/// Applies the screen rules in priority order; the first matching rule wins.
/// `None` means no rule matched and the result is indeterminate.
pub fn classify(items: &ScreenItems) -> Option<ScreenResult> {
    let root = items.root;
    if root == Some(0) {
        return Some(ScreenResult::NoConcern);
    }
    // Yes/no items outside {0, 1} are unmapped codes.
    let unmapped = |code: Option<i64>| code.is_some_and(|c| c != 0 && c != 1);
    if unmapped(root) || items.follow_ups.iter().any(|&f| unmapped(f)) {
        return None;
    }
    if root == Some(1) && items.follow_ups.iter().all(|&f| f == Some(0)) {
        return Some(ScreenResult::NoConcern);
    }
    if let Some(frequency) = items.frequency {
        if (0..FREQUENCY_CUTOFF).contains(&frequency) {
            return Some(ScreenResult::NoConcern);
        }
    }

    let gate = root == Some(1)
        && items.follow_ups.contains(&Some(1))
        && items
            .frequency
            .is_some_and(|f| (FREQUENCY_CUTOFF..=FREQUENCY_MAX).contains(&f));
    if !gate {
        return None;
    }
    match (items.qualifier, items.specificity) {
        (Some(1), Some(2 | 3)) => Some(ScreenResult::PrimaryConcernB),
        (Some(1), Some(1)) | (Some(0), _) => Some(ScreenResult::PrimaryConcernA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn positive_items() -> ScreenItems {
        ScreenItems {
            root: Some(1),
            follow_ups: [Some(1), Some(0), Some(0), Some(1)],
            frequency: Some(FREQUENCY_CUTOFF),
            qualifier: Some(1),
            specificity: Some(2),
        }
    }

    #[test]
    fn qualifier_and_specificity_select_concern_level() {
        let items = positive_items();
        assert_eq!(classify(&items), Some(ScreenResult::PrimaryConcernB));

        let unqualified = ScreenItems {
            qualifier: Some(0),
            ..items.clone()
        };
        assert_eq!(classify(&unqualified), Some(ScreenResult::PrimaryConcernA));

        let specific_one = ScreenItems {
            specificity: Some(1),
            ..items
        };
        assert_eq!(classify(&specific_one), Some(ScreenResult::PrimaryConcernA));
    }

    #[test]
    fn negative_branches_win_before_the_gate() {
        let all_follow_ups_negative = ScreenItems {
            follow_ups: [Some(0); 4],
            ..positive_items()
        };
        assert_eq!(classify(&all_follow_ups_negative), Some(ScreenResult::NoConcern));

        let infrequent = ScreenItems {
            frequency: Some(1),
            specificity: None,
            ..positive_items()
        };
        assert_eq!(classify(&infrequent), Some(ScreenResult::NoConcern));
    }

    #[test]
    fn missing_inputs_stay_indeterminate() {
        let missing_qualifier = ScreenItems {
            qualifier: None,
            ..positive_items()
        };
        assert_eq!(classify(&missing_qualifier), None);

        let missing_frequency = ScreenItems {
            frequency: None,
            ..positive_items()
        };
        assert_eq!(classify(&missing_frequency), None);

        let out_of_range_specificity = ScreenItems {
            specificity: Some(7),
            ..positive_items()
        };
        assert_eq!(classify(&out_of_range_specificity), None);
        assert_eq!(classify(&ScreenItems::default()), None);
    }

    #[test]
    fn worked_wave_one_example() {
        // root 1, follow-ups [1, 0, 0, 1], threshold met, qualifier 1, specificity 2
        let items = ScreenItems {
            root: Some(1),
            follow_ups: [Some(1), Some(0), Some(0), Some(1)],
            frequency: Some(FREQUENCY_CUTOFF),
            qualifier: Some(1),
            specificity: Some(2),
        };
        assert_eq!(classify(&items), Some(ScreenResult::PrimaryConcernB));
        let qualifier_zero = ScreenItems {
            qualifier: Some(0),
            ..items
        };
        assert_eq!(classify(&qualifier_zero), Some(ScreenResult::PrimaryConcernA));
    }

    #[test]
    fn unmapped_yes_no_codes_are_indeterminate() {
        for root in [2, 5] {
            let items = ScreenItems {
                root: Some(root),
                frequency: Some(0),
                ..positive_items()
            };
            assert_eq!(classify(&items), None, "root {root}");
        }
        let odd_follow_up = ScreenItems {
            follow_ups: [Some(1), Some(3), Some(0), Some(0)],
            ..positive_items()
        };
        assert_eq!(classify(&odd_follow_up), None);
    }

    fn code() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![Just(None), (0i64..5).prop_map(Some)]
    }

    proptest! {
        #[test]
        fn negative_root_is_always_no_concern(
            follow_ups in prop::array::uniform4(code()),
            frequency in code(),
            qualifier in code(),
            specificity in code(),
        ) {
            let items = ScreenItems { root: Some(0), follow_ups, frequency, qualifier, specificity };
            prop_assert_eq!(classify(&items), Some(ScreenResult::NoConcern));
        }
    }
}
