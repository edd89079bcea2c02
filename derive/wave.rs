use super::raw::RawWave;
use super::screen::{self, ScreenResult};
use super::subscale::{SubscaleDefinition, SubscaleScore};
use crate::shared::table::WaveId;
use std::collections::BTreeMap;

/// Derived indicators of one subject at one wave.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedWave {
    pub wave: WaveId,
    pub present: bool,
    pub age: Option<f64>,
    pub screen: Option<ScreenResult>,
    /// Keyed by subscale stem.
    pub subscales: BTreeMap<String, Option<SubscaleScore>>,
}

impl DerivedWave {
    /// A present wave whose screen could not be classified.
    pub fn screen_indeterminate(&self) -> bool {
        self.present && self.screen.is_none()
    }
}

/// Applies the same rules to any wave; nothing here depends on which wave
/// it is beyond the label carried on the result.
pub fn derive_wave(wave: WaveId, raw: &RawWave, subscales: &[SubscaleDefinition]) -> DerivedWave {
    let screen = screen::classify(&raw.screen);
    if raw.is_present() && screen.is_none() {
        log::trace!("Screen indeterminate at {wave}: {:?}", raw.screen);
    }
    DerivedWave {
        wave,
        present: raw.is_present(),
        age: raw.age,
        screen,
        subscales: subscales
            .iter()
            .map(|def| (def.stem.clone(), def.score(&raw.items)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::raw::ScreenItems;

    #[test]
    fn each_wave_is_derived_identically() {
        let defs = vec![SubscaleDefinition::numbered("lon", 3, 2)];
        let raw = RawWave {
            present: Some(1),
            age: Some(15.0),
            screen: ScreenItems {
                root: Some(0),
                ..ScreenItems::default()
            },
            items: [("lon_1", Some(2)), ("lon_2", Some(0)), ("lon_3", Some(1))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        let w1 = derive_wave(WaveId(1), &raw, &defs);
        let w3 = derive_wave(WaveId(3), &raw, &defs);
        assert_eq!(w1.screen, Some(ScreenResult::NoConcern));
        assert_eq!(w1.subscales, w3.subscales);
        assert_eq!(w1.screen, w3.screen);
        let lon = w1.subscales["lon"].unwrap();
        assert_eq!(lon.sum, 3.0);
        assert!(!w1.screen_indeterminate());
    }
}
