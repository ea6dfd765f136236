// ace.rs: Affective-state vector supplied by telemetry.
//
// Three readings in [0, 1]. The core trusts telemetry for correctness but
// still refuses to build a vector from out-of-range or NaN values.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// The user's momentary physical, emotional, and cognitive state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AceStateVector {
    /// 0 = exhausted, 1 = fully rested.
    pub physical_energy: f64,
    /// 0 = negative, 1 = positive. Recorded but not used by the threshold.
    pub emotional_valence: f64,
    /// 0 = idle, 1 = overloaded.
    pub cognitive_load: f64,
}

impl AceStateVector {
    /// Build a vector, checking each component lies in [0, 1].
    pub fn new(
        physical_energy: f64,
        emotional_valence: f64,
        cognitive_load: f64,
    ) -> Result<Self, PolicyError> {
        let state = Self {
            physical_energy,
            emotional_valence,
            cognitive_load,
        };
        state.validate()?;
        Ok(state)
    }

    /// Rested, neutral, unloaded.
    pub fn nominal() -> Self {
        Self {
            physical_energy: 1.0,
            emotional_valence: 0.5,
            cognitive_load: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for (component, value) in [
            ("physicalEnergy", self.physical_energy),
            ("emotionalValence", self.emotional_valence),
            ("cognitiveLoad", self.cognitive_load),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::AceOutOfRange { component, value });
            }
        }
        Ok(())
    }
}

impl Default for AceStateVector {
    fn default() -> Self {
        Self::nominal()
    }
}
