//! Analysis configuration passed explicitly into every engine call.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::thresholds::{ThresholdEntry, ThresholdMode, ThresholdSet};

/// Default "top tier" rank cutoff for class summaries.
pub const DEFAULT_TOP_CUTOFF: u32 = 50;
/// Default "broader bench" rank cutoff for class summaries.
pub const DEFAULT_BENCH_CUTOFF: u32 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    #[serde(default)]
    pub mode: ThresholdMode,

    /// Admission categories, tightest first.
    #[serde(default)]
    pub thresholds: Vec<ThresholdEntry>,

    /// Rank lines used for class comparisons; the first two drive the
    /// leaderboard's top and bench counts.
    #[serde(default = "default_comparison_thresholds")]
    pub comparison_thresholds: Vec<u32>,

    /// Explicit full score per subject, overriding the inferred one.
    #[serde(default)]
    pub full_scores: BTreeMap<String, f64>,
}

fn default_comparison_thresholds() -> Vec<u32> {
    vec![DEFAULT_TOP_CUTOFF, DEFAULT_BENCH_CUTOFF]
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::default(),
            thresholds: Vec::new(),
            comparison_thresholds: default_comparison_thresholds(),
            full_scores: BTreeMap::new(),
        }
    }
}

impl AnalysisSettings {
    pub fn threshold_set(&self) -> ThresholdSet {
        ThresholdSet::new(self.mode, self.thresholds.clone())
    }

    /// Top and bench rank cutoffs for class summaries.
    pub fn leaderboard_cutoffs(&self) -> (u32, u32) {
        let top = self
            .comparison_thresholds
            .first()
            .copied()
            .unwrap_or(DEFAULT_TOP_CUTOFF);
        let bench = self
            .comparison_thresholds
            .get(1)
            .copied()
            .unwrap_or(DEFAULT_BENCH_CUTOFF);
        (top, bench)
    }

    pub fn full_score_for(&self, subject: &str) -> Option<f64> {
        self.full_scores
            .get(subject)
            .copied()
            .filter(|value| *value > 0.0)
    }
}

/// Parses a `Subject=value` full-score override.
pub fn parse_full_score(input: &str) -> Result<(String, f64), SettingsError> {
    let invalid = || SettingsError::InvalidFullScore(input.to_string());
    let (subject, value) = input.split_once('=').ok_or_else(invalid)?;
    let subject = subject.trim();
    let value = f64::from_str(value.trim()).map_err(|_| invalid())?;
    if subject.is_empty() || !value.is_finite() || value <= 0.0 {
        return Err(invalid());
    }
    Ok((subject.to_string(), value))
}
