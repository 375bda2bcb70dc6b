use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::models::{normalized_status, round_to, PeriodRow};
use crate::settings::AnalysisSettings;
use crate::snapshot::effective_population;

/// Label for students outside every configured category.
pub const NOT_ADMITTED: &str = "Not admitted";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Cutoffs are absolute ranks.
    #[default]
    Rank,
    /// Cutoffs are percentages of the effective population.
    Percent,
}

impl FromStr for ThresholdMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rank" => Ok(ThresholdMode::Rank),
            "percent" => Ok(ThresholdMode::Percent),
            _ => Err(SettingsError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdMode::Rank => write!(f, "rank"),
            ThresholdMode::Percent => write!(f, "percent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub key: String,
    pub value: f64,
}

impl ThresholdEntry {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl FromStr for ThresholdEntry {
    type Err = SettingsError;

    /// Parses `Label=value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::InvalidThreshold(s.to_string());
        let (key, value) = s.rsplit_once('=').ok_or_else(invalid)?;
        let key = key.trim();
        let value: f64 = value.trim().parse().map_err(|_| invalid())?;
        if key.is_empty() || !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        Ok(Self::new(key, value))
    }
}

/// Ordered category cutoffs in one mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ThresholdSet {
    pub mode: ThresholdMode,
    pub entries: Vec<ThresholdEntry>,
}

impl ThresholdSet {
    pub fn new(mode: ThresholdMode, entries: Vec<ThresholdEntry>) -> Self {
        Self { mode, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Converts one configured value to an absolute rank.
    pub fn absolute_cutoff(&self, value: f64, population: u32) -> u32 {
        let cutoff = match self.mode {
            ThresholdMode::Rank => value.round(),
            ThresholdMode::Percent => (value / 100.0 * f64::from(population)).round(),
        };
        cutoff.max(0.0) as u32
    }

    /// `(key, absolute cutoff)` pairs, ascending by cutoff. Equal cutoffs
    /// keep their configured order.
    pub fn absolute_cutoffs(&self, population: u32) -> Vec<(&str, u32)> {
        let mut cutoffs: Vec<(&str, u32)> = self
            .entries
            .iter()
            .map(|entry| (entry.key.as_str(), self.absolute_cutoff(entry.value, population)))
            .collect();
        cutoffs.sort_by_key(|(_, cutoff)| *cutoff);
        cutoffs
    }

    /// The loosest cutoff: students ranked beyond it are below the line.
    pub fn pass_line(&self, population: u32) -> Option<u32> {
        self.absolute_cutoffs(population)
            .last()
            .map(|(_, cutoff)| *cutoff)
    }
}

/// Index of the tightest cutoff that still admits `rank`.
pub(crate) fn category_index(rank: u32, cutoffs: &[(&str, u32)]) -> Option<usize> {
    cutoffs.iter().position(|(_, cutoff)| *cutoff >= rank)
}

pub(crate) fn status_matches(status: &str, label: &str) -> bool {
    status == label || status.contains(label)
}

/// Derives percent cutoffs from self-reported admission statuses.
///
/// Each label's cutoff is the worst rank among participants whose status
/// names it, as a percentage of the effective population (4 decimals).
/// Labels nobody reports get a cutoff of 0.
pub fn derive_thresholds_from_metadata(rows: &[PeriodRow], labels: &[&str]) -> ThresholdSet {
    let population = effective_population(rows);

    let entries = labels
        .iter()
        .map(|label| {
            let worst_rank = rows
                .iter()
                .filter(|row| row.present && row.is_ranked())
                .filter(|row| {
                    row.imported_status()
                        .is_some_and(|status| status_matches(status, label))
                })
                .map(|row| row.school_rank)
                .max();

            let value = match worst_rank {
                Some(rank) if population > 0 => {
                    round_to(f64::from(rank) / f64::from(population) * 100.0, 4)
                }
                _ => 0.0,
            };
            ThresholdEntry::new(*label, value)
        })
        .collect();

    ThresholdSet::new(ThresholdMode::Percent, entries)
}

/// Picks the thresholds for a period: derived from imported statuses when
/// any participant carries one, else the configured ones.
pub fn resolve_thresholds(rows: &[PeriodRow], settings: &AnalysisSettings) -> ThresholdSet {
    let configured = settings.threshold_set();
    let has_imported_status = rows
        .iter()
        .any(|row| row.present && row.imported_status().is_some());

    if configured.is_empty() || !has_imported_status {
        return configured;
    }

    let labels: Vec<&str> = configured.keys().collect();
    derive_thresholds_from_metadata(rows, &labels)
}

/// Admission category for one rank. An imported status wins verbatim.
pub fn admission_category(
    rank: u32,
    thresholds: &ThresholdSet,
    total_students: u32,
    imported_status: Option<&str>,
) -> String {
    if let Some(status) = normalized_status(imported_status) {
        return status.to_string();
    }

    let cutoffs = thresholds.absolute_cutoffs(total_students);
    match category_index(rank, &cutoffs) {
        Some(index) => cutoffs[index].0.to_string(),
        None => NOT_ADMITTED.to_string(),
    }
}

/// Fixed styling categories for a single subject rank, tightest first.
///
/// Categories follow the position of the satisfied cutoff among the
/// non-zero cutoffs, so labels nobody reported (cutoff 0 after derivation)
/// do not take the `Excellent` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankCategory {
    Excellent,
    Good,
    Average,
    Pass,
    Fail,
}

impl RankCategory {
    fn from_index(index: usize) -> Self {
        match index {
            0 => RankCategory::Excellent,
            1 => RankCategory::Good,
            2 => RankCategory::Average,
            _ => RankCategory::Pass,
        }
    }
}

/// Classifies a subject rank against the thresholds using the subject's own
/// participant count. Evaluation order matches [`admission_category`].
pub fn subject_rank_category(rank: u32, thresholds: &ThresholdSet, participants: u32) -> RankCategory {
    let cutoffs: Vec<(&str, u32)> = thresholds
        .absolute_cutoffs(participants)
        .into_iter()
        .filter(|(_, cutoff)| *cutoff > 0)
        .collect();
    category_index(rank, &cutoffs)
        .map(RankCategory::from_index)
        .unwrap_or(RankCategory::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScoreSnapshot, StudentRecord};
    use crate::ranks::historical_ranks;
    use crate::snapshot::period_snapshot;
    use std::collections::BTreeMap;

    fn tiers(mode: ThresholdMode) -> ThresholdSet {
        ThresholdSet::new(
            mode,
            vec![
                ThresholdEntry::new("Tier A", 10.0),
                ThresholdEntry::new("Tier B", 30.0),
                ThresholdEntry::new("Tier C", 60.0),
            ],
        )
    }

    fn roster(entries: &[(&str, f64, Option<&str>)]) -> Vec<PeriodRow> {
        let students: Vec<StudentRecord> = entries
            .iter()
            .map(|(name, total, status)| {
                let scores: BTreeMap<String, f64> = [("math".to_string(), *total)].into();
                let mut snapshot = ScoreSnapshot::new("P1", scores);
                snapshot.status = status.map(str::to_string);
                StudentRecord::new(*name, "10A").with_snapshot(snapshot)
            })
            .collect();
        let ranks = historical_ranks(&students);
        period_snapshot(&students, "P1", &ranks)
    }

    #[test]
    fn parses_threshold_entries() {
        let entry: ThresholdEntry = "Tier A=12.5".parse().unwrap();
        assert_eq!(entry, ThresholdEntry::new("Tier A", 12.5));
        assert!("Tier A".parse::<ThresholdEntry>().is_err());
        assert!("Tier A=abc".parse::<ThresholdEntry>().is_err());
        assert!("=4".parse::<ThresholdEntry>().is_err());
        assert!("Tier A=NaN".parse::<ThresholdEntry>().is_err());
        assert!("Tier A=inf".parse::<ThresholdEntry>().is_err());
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Percent".parse::<ThresholdMode>().unwrap(), ThresholdMode::Percent);
        assert!("ratio".parse::<ThresholdMode>().is_err());
    }

    #[test]
    fn percent_cutoffs_round_against_population() {
        let set = ThresholdSet::new(ThresholdMode::Percent, vec![ThresholdEntry::new("A", 50.0)]);
        assert_eq!(set.absolute_cutoff(50.0, 3), 2);
        assert_eq!(set.pass_line(200), Some(100));
    }

    #[test]
    fn imported_status_wins_over_thresholds() {
        let set = tiers(ThresholdMode::Rank);
        assert_eq!(admission_category(1, &set, 100, Some("Provincial")), "Provincial");
        assert_eq!(admission_category(1, &set, 100, Some("unassigned")), "Tier A");
        assert_eq!(admission_category(1, &set, 100, Some("")), "Tier A");
    }

    #[test]
    fn first_satisfied_category_is_returned() {
        let set = tiers(ThresholdMode::Rank);
        assert_eq!(admission_category(10, &set, 100, None), "Tier A");
        assert_eq!(admission_category(11, &set, 100, None), "Tier B");
        assert_eq!(admission_category(60, &set, 100, None), "Tier C");
        assert_eq!(admission_category(61, &set, 100, None), NOT_ADMITTED);
    }

    #[test]
    fn percent_mode_scales_with_total_students() {
        let set = tiers(ThresholdMode::Percent);
        assert_eq!(admission_category(20, &set, 200, None), "Tier A");
        assert_eq!(admission_category(21, &set, 200, None), "Tier B");
    }

    #[test]
    fn categories_are_monotonic_in_rank() {
        let set = ThresholdSet::new(
            ThresholdMode::Rank,
            vec![
                ThresholdEntry::new("Tier C", 60.0),
                ThresholdEntry::new("Tier A", 10.0),
                ThresholdEntry::new("Tier B", 30.0),
            ],
        );
        let order = ["Tier A", "Tier B", "Tier C", NOT_ADMITTED];
        let position = |rank: u32| {
            let label = admission_category(rank, &set, 100, None);
            order.iter().position(|l| *l == label).unwrap()
        };
        for rank in 1..100 {
            assert!(position(rank) <= position(rank + 1));
        }
    }

    #[test]
    fn subject_category_mirrors_admission_order() {
        let set = tiers(ThresholdMode::Percent);
        assert_eq!(subject_rank_category(5, &set, 50), RankCategory::Excellent);
        assert_eq!(subject_rank_category(15, &set, 50), RankCategory::Good);
        assert_eq!(subject_rank_category(30, &set, 50), RankCategory::Average);
        assert_eq!(subject_rank_category(31, &set, 50), RankCategory::Fail);

        let mut wide = tiers(ThresholdMode::Percent);
        wide.entries.push(ThresholdEntry::new("Tier D", 80.0));
        wide.entries.push(ThresholdEntry::new("Tier E", 90.0));
        assert_eq!(subject_rank_category(31, &wide, 50), RankCategory::Pass);
        assert_eq!(subject_rank_category(45, &wide, 50), RankCategory::Pass);
        assert_eq!(subject_rank_category(46, &wide, 50), RankCategory::Fail);
    }

    #[test]
    fn unreported_labels_do_not_shift_subject_categories() {
        let rows = roster(&[
            ("A", 500.0, Some("Tier B")),
            ("B", 490.0, Some("Tier C")),
            ("C", 480.0, None),
            ("D", 470.0, None),
        ]);
        let derived = derive_thresholds_from_metadata(&rows, &["Tier A", "Tier B", "Tier C"]);
        assert_eq!(derived.entries[0].value, 0.0);

        assert_eq!(subject_rank_category(1, &derived, 4), RankCategory::Excellent);
        assert_eq!(subject_rank_category(2, &derived, 4), RankCategory::Good);
        assert_eq!(subject_rank_category(3, &derived, 4), RankCategory::Fail);
    }

    #[test]
    fn derives_percent_cutoffs_from_statuses() {
        let rows = roster(&[
            ("A", 500.0, Some("Tier A")),
            ("B", 490.0, Some("Tier A admitted")),
            ("C", 480.0, Some("Tier B")),
            ("D", 470.0, None),
        ]);
        let derived = derive_thresholds_from_metadata(&rows, &["Tier A", "Tier B", "Tier C"]);

        assert_eq!(derived.mode, ThresholdMode::Percent);
        assert_eq!(derived.entries[0], ThresholdEntry::new("Tier A", 50.0));
        assert_eq!(derived.entries[1], ThresholdEntry::new("Tier B", 75.0));
        assert_eq!(derived.entries[2], ThresholdEntry::new("Tier C", 0.0));
    }

    #[test]
    fn derived_cutoffs_round_to_four_decimals() {
        let rows = roster(&[
            ("A", 500.0, Some("Tier A")),
            ("B", 490.0, None),
            ("C", 480.0, None),
        ]);
        let derived = derive_thresholds_from_metadata(&rows, &["Tier A"]);
        assert_eq!(derived.entries[0].value, 33.3333);
    }

    #[test]
    fn resolve_prefers_imported_statuses() {
        let settings = AnalysisSettings {
            thresholds: vec![ThresholdEntry::new("Tier A", 1.0)],
            ..AnalysisSettings::default()
        };
        let plain = roster(&[("A", 500.0, None), ("B", 490.0, None)]);
        assert_eq!(resolve_thresholds(&plain, &settings), settings.threshold_set());

        let labelled = roster(&[("A", 500.0, Some("Tier A")), ("B", 490.0, Some("Tier A"))]);
        let resolved = resolve_thresholds(&labelled, &settings);
        assert_eq!(resolved.mode, ThresholdMode::Percent);
        assert_eq!(resolved.entries[0].value, 100.0);
    }
}
