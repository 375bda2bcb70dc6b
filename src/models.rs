use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rank assigned to students with no resolved rank so they sort last.
pub const UNRANKED: u32 = 999_999;

/// Student name -> rank for one period and one scope.
pub type RankMap = HashMap<String, u32>;

/// Period -> rank map.
pub type HistoricalRanks = HashMap<String, RankMap>;

/// Period -> subject -> rank map.
pub type SubjectHistoricalRanks = HashMap<String, HashMap<String, RankMap>>;

/// One exam period's results for one student.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub period: String,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub subject_ranks: BTreeMap<String, u32>,
    #[serde(default)]
    pub school_rank: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub complete: Option<bool>,
}

impl ScoreSnapshot {
    pub fn new(period: impl Into<String>, scores: BTreeMap<String, f64>) -> Self {
        let mut snapshot = Self {
            period: period.into(),
            scores,
            ..Self::default()
        };
        snapshot.derive_totals();
        snapshot
    }

    fn derive_totals(&mut self) {
        self.total = self.scores.values().sum();
        self.average = if self.scores.is_empty() {
            0.0
        } else {
            self.total / self.scores.len() as f64
        };
    }

    /// Recomputes total and average from the subject scores when an export
    /// left them out. Exports carrying their own totals are kept as is.
    pub fn fill_missing_totals(&mut self) {
        if self.scores.is_empty() {
            return;
        }
        let average = self.average;
        if self.total == 0.0 {
            self.derive_totals();
            if average != 0.0 {
                self.average = average;
            }
        } else if self.average == 0.0 {
            self.average = self.total / self.scores.len() as f64;
        }
    }

    pub fn score(&self, subject: &str) -> Option<f64> {
        self.scores.get(subject).copied()
    }

    /// Imported school rank, ignoring zero placeholders.
    pub fn imported_rank(&self) -> Option<u32> {
        self.school_rank.filter(|rank| *rank > 0)
    }

    pub fn imported_subject_rank(&self, subject: &str) -> Option<u32> {
        self.subject_ranks.get(subject).copied().filter(|rank| *rank > 0)
    }

    /// Imported admission status, if it carries a real label.
    pub fn imported_status(&self) -> Option<&str> {
        normalized_status(self.status.as_deref())
    }
}

/// Treats blank and `unassigned` statuses as absent.
pub fn normalized_status(status: Option<&str>) -> Option<&str> {
    let value = status?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unassigned") {
        None
    } else {
        Some(value)
    }
}

/// A student with their chronological exam history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: Uuid,
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub history: Vec<ScoreSnapshot>,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub average: f64,
}

impl StudentRecord {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            class_name: class_name.into(),
            history: Vec::new(),
            scores: BTreeMap::new(),
            total: 0.0,
            average: 0.0,
        }
    }

    /// Appends a snapshot, replacing any existing one for the same period,
    /// and refreshes the latest-score cache.
    pub fn push_snapshot(&mut self, snapshot: ScoreSnapshot) {
        match self
            .history
            .iter_mut()
            .find(|existing| existing.period == snapshot.period)
        {
            Some(existing) => *existing = snapshot,
            None => self.history.push(snapshot),
        }
        self.refresh_latest();
    }

    pub fn with_snapshot(mut self, snapshot: ScoreSnapshot) -> Self {
        self.push_snapshot(snapshot);
        self
    }

    pub fn snapshot_for(&self, period: &str) -> Option<&ScoreSnapshot> {
        self.history.iter().find(|snapshot| snapshot.period == period)
    }

    /// Fills missing snapshot totals and rebuilds the latest-score cache.
    /// Records read from an export go through this before use.
    pub fn normalize(&mut self) {
        for snapshot in &mut self.history {
            snapshot.fill_missing_totals();
        }
        self.refresh_latest();
    }

    fn refresh_latest(&mut self) {
        if let Some(latest) = self.history.last() {
            self.scores = latest.scores.clone();
            self.total = latest.total;
            self.average = latest.average;
        }
    }
}

/// Ordered, de-duplicated subject names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSet(Vec<String>);

impl SubjectSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut subjects = Vec::new();
        for name in names {
            let name = name.into();
            if !subjects.contains(&name) {
                subjects.push(name);
            }
        }
        Self(subjects)
    }

    /// Subjects in first-seen order across every snapshot of the roster.
    pub fn from_students(students: &[StudentRecord]) -> Self {
        Self::new(
            students
                .iter()
                .flat_map(|student| student.history.iter())
                .flat_map(|snapshot| snapshot.scores.keys().cloned()),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.0.iter().any(|name| name == subject)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Distinct periods across the roster in first-seen order.
pub fn collect_periods(students: &[StudentRecord]) -> Vec<String> {
    let mut periods: Vec<String> = Vec::new();
    for snapshot in students.iter().flat_map(|student| student.history.iter()) {
        if !periods.contains(&snapshot.period) {
            periods.push(snapshot.period.clone());
        }
    }
    periods
}

/// Distinct class labels in first-seen order.
pub fn collect_classes(students: &[StudentRecord]) -> Vec<String> {
    let mut classes: Vec<String> = Vec::new();
    for student in students {
        if !classes.contains(&student.class_name) {
            classes.push(student.class_name.clone());
        }
    }
    classes
}

/// One student's view of a single period, with the resolved school rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRow {
    pub id: Uuid,
    pub name: String,
    pub class_name: String,
    pub present: bool,
    pub scores: BTreeMap<String, f64>,
    pub total: f64,
    pub average: f64,
    pub status: Option<String>,
    pub school_rank: u32,
}

impl PeriodRow {
    pub fn is_ranked(&self) -> bool {
        self.school_rank != UNRANKED
    }

    pub fn imported_status(&self) -> Option<&str> {
        normalized_status(self.status.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BelowLineStudent {
    pub name: String,
    pub class_name: String,
    pub rank: u32,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
    pub participants: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_name: String,
    pub student_count: usize,
    pub average_total: f64,
    pub top_count: usize,
    pub bench_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLeaderboard {
    pub best_average: String,
    pub most_top: String,
    pub most_bench: String,
}

/// One heatmap row: a metric label with a value per class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapRow {
    pub label: String,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "values")]
pub enum ModeSummary {
    /// Every score is distinct.
    NoMode,
    Values { scores: Vec<f64>, truncated: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectParameters {
    pub subject: String,
    pub participants: usize,
    pub full_score: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub mode: ModeSummary,
    /// Population variance, unrounded.
    pub variance: f64,
    pub std_dev: f64,
    pub difficulty: f64,
    pub discrimination: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamParameters {
    pub subjects: Vec<SubjectParameters>,
    pub reliability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreakDirection {
    Improvement,
    Decline,
    Stable,
}

/// A run of consecutive rank moves in one direction, ending at the last
/// period considered. Deltas are rank-distance magnitudes, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub count: usize,
    pub direction: StreakDirection,
    pub total_change: u32,
    pub steps: Vec<u32>,
}

impl StreakRecord {
    /// Run length, positive for improvement and negative for decline.
    pub fn signed_count(&self) -> i64 {
        let count = self.count as i64;
        match self.direction {
            StreakDirection::Improvement => count,
            StreakDirection::Decline => -count,
            StreakDirection::Stable => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRow {
    pub name: String,
    pub class_name: String,
    pub rank_from: u32,
    pub rank_to: u32,
    pub rank_change: i64,
    pub coefficient: f64,
    pub streak: i64,
}

/// Rounds to the given number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
