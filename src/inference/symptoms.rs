//! Symptom-based probability adjustment
//!
//! Each reported symptom adds a fixed per-class bias to the softmax output;
//! the result is renormalized to a probability distribution. The weight
//! table is indexed by the canonical class order in [`CLASS_NAMES`].
//!
//! [`CLASS_NAMES`]: crate::dataset::CLASS_NAMES

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{ClassLabels, NUM_CLASSES};
use crate::utils::error::{Result, SkinLesionError};
use crate::utils::round_to;

/// Symptoms accepted alongside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    Itching,
    Bleeding,
    ScalySkin,
    WhitePatches,
    SuddenOnset,
}

/// Per-class bias of each symptom, rows in `Symptom::ALL` order
pub const SYMPTOM_WEIGHTS: [[f32; NUM_CLASSES]; 5] = [
    // itching
    [0.1, 0.0, 0.3, 0.2, 0.3, 0.1, 0.0, 0.0, 0.0],
    // bleeding
    [0.0, 0.2, 0.0, 0.2, 0.1, 0.3, 0.2, 0.0, 0.0],
    // scaly_skin
    [0.0, 0.0, 0.2, 0.0, 0.2, 0.4, 0.1, 0.0, 0.0],
    // white_patches
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    // sudden_onset
    [0.1, 0.2, 0.0, 0.3, 0.1, 0.1, 0.0, 0.0, 0.2],
];

impl Symptom {
    pub const ALL: [Symptom; 5] = [
        Symptom::Itching,
        Symptom::Bleeding,
        Symptom::ScalySkin,
        Symptom::WhitePatches,
        Symptom::SuddenOnset,
    ];

    /// Form field name
    pub fn key(&self) -> &'static str {
        match self {
            Symptom::Itching => "itching",
            Symptom::Bleeding => "bleeding",
            Symptom::ScalySkin => "scaly_skin",
            Symptom::WhitePatches => "white_patches",
            Symptom::SuddenOnset => "sudden_onset",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    fn index(&self) -> usize {
        *self as usize
    }

    pub fn weights(&self) -> &'static [f32; NUM_CLASSES] {
        &SYMPTOM_WEIGHTS[self.index()]
    }
}

impl FromStr for Symptom {
    type Err = SkinLesionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s)
            .ok_or_else(|| SkinLesionError::InvalidInput(format!("unknown symptom '{}'", s)))
    }
}

impl fmt::Display for Symptom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Integer value per symptom; absent symptoms are 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomFlags {
    values: [i64; 5],
}

impl SymptomFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symptom: Symptom, value: i64) -> Self {
        self.set(symptom, value);
        self
    }

    pub fn set(&mut self, symptom: Symptom, value: i64) {
        self.values[symptom.index()] = value;
    }

    pub fn get(&self, symptom: Symptom) -> i64 {
        self.values[symptom.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&v| v == 0)
    }

    /// Record a form field. Unknown keys are ignored and return `Ok(false)`;
    /// a recognized key with a non-integer value is an `InvalidInput` error.
    pub fn parse_value(&mut self, key: &str, text: &str) -> Result<bool> {
        let Some(symptom) = Symptom::from_key(key) else {
            return Ok(false);
        };

        let value = text.trim().parse::<i64>().map_err(|_| {
            SkinLesionError::InvalidInput(format!(
                "invalid value for '{}': expected an integer, got '{}'",
                key, text
            ))
        })?;
        self.set(symptom, value);
        Ok(true)
    }

    /// Weighted sum of the symptom rows
    pub fn bias(&self) -> [f32; NUM_CLASSES] {
        let mut bias = [0.0f32; NUM_CLASSES];
        for symptom in Symptom::ALL {
            let value = self.get(symptom) as f32;
            if value == 0.0 {
                continue;
            }
            for (b, w) in bias.iter_mut().zip(symptom.weights()) {
                *b += value * w;
            }
        }
        bias
    }
}

/// `(p + scale * bias) / sum`
///
/// Fails when `base` is not a distribution over the canonical classes or
/// when the adjusted values no longer sum to a positive number (possible
/// with negative flag values).
pub fn adjust_probabilities(base: &[f32], flags: &SymptomFlags, scale: f32) -> Result<Vec<f32>> {
    if base.len() != NUM_CLASSES {
        return Err(SkinLesionError::Inference(format!(
            "expected {} class probabilities, got {}",
            NUM_CLASSES,
            base.len()
        )));
    }

    if flags.is_empty() {
        return Ok(base.to_vec());
    }

    let bias = flags.bias();
    let adjusted: Vec<f32> = base
        .iter()
        .zip(bias.iter())
        .map(|(p, b)| p + scale * b)
        .collect();

    let sum: f32 = adjusted.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Err(SkinLesionError::Inference(format!(
            "adjusted probabilities sum to {}; symptom values are out of range",
            sum
        )));
    }

    Ok(adjusted.into_iter().map(|p| p / sum).collect())
}

/// One entry of the ranked response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPrediction {
    pub name: String,
    pub prob: f64,
}

/// Round, then stable-sort descending and keep the first `k`.
/// Ties keep class order.
pub fn rank_predictions(
    probs: &[f32],
    labels: &ClassLabels,
    k: usize,
    decimals: u32,
) -> Vec<RankedPrediction> {
    let mut ranked: Vec<RankedPrediction> = probs
        .iter()
        .zip(labels.classes.iter())
        .map(|(&p, name)| RankedPrediction {
            name: name.clone(),
            prob: round_to(p as f64, decimals),
        })
        .collect();

    ranked.sort_by(|a, b| b.prob.total_cmp(&a.prob));
    ranked.truncate(k);
    ranked
}
