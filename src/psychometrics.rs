use std::cmp::Ordering;

use crate::models::{round_to, ExamParameters, ModeSummary, PeriodRow, SubjectParameters, SubjectSet};
use crate::settings::AnalysisSettings;

/// Share of scorers in each of the top and bottom discrimination groups.
const DISCRIMINATION_GROUP_SHARE: f64 = 0.27;
const MAX_REPORTED_MODES: usize = 3;

/// Guesses the maximum possible score from the best observed one.
pub fn infer_full_score(max_score: f64) -> f64 {
    if max_score > 150.0 {
        (max_score / 10.0).ceil() * 10.0
    } else if max_score > 120.0 {
        150.0
    } else if max_score > 100.0 {
        120.0
    } else {
        100.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Median of ascending-sorted values.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Most frequent values of ascending-sorted scores.
fn mode(sorted: &[f64]) -> ModeSummary {
    let mut runs: Vec<(f64, usize)> = Vec::new();
    for &value in sorted {
        match runs.last_mut() {
            Some((last, count)) if *last == value => *count += 1,
            _ => runs.push((value, 1)),
        }
    }

    let highest = runs.iter().map(|(_, count)| *count).max().unwrap_or(0);
    if highest == 0 || (highest == 1 && sorted.len() > 1) {
        return ModeSummary::NoMode;
    }

    let modes: Vec<f64> = runs
        .iter()
        .filter(|(_, count)| *count == highest)
        .map(|(value, _)| *value)
        .collect();
    ModeSummary::Values {
        truncated: modes.len() > MAX_REPORTED_MODES,
        scores: modes.into_iter().take(MAX_REPORTED_MODES).collect(),
    }
}

/// Top-minus-bottom group mean over the full score.
fn discrimination(sorted: &[f64], full_score: f64) -> f64 {
    let group = (sorted.len() as f64 * DISCRIMINATION_GROUP_SHARE).round() as usize;
    if group == 0 || full_score <= 0.0 {
        return 0.0;
    }
    let bottom = mean(&sorted[..group]);
    let top = mean(&sorted[sorted.len() - group..]);
    (top - bottom) / full_score
}

fn subject_parameters(subject: &str, mut scores: Vec<f64>, full_score: Option<f64>) -> SubjectParameters {
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let max = scores.last().copied().unwrap_or(0.0);
    let full_score = full_score.unwrap_or_else(|| infer_full_score(max));
    let mean = mean(&scores);
    let variance = population_variance(&scores, mean);

    SubjectParameters {
        subject: subject.to_string(),
        participants: scores.len(),
        full_score,
        max: round_to(max, 2),
        mean: round_to(mean, 2),
        median: round_to(median(&scores), 2),
        mode: mode(&scores),
        variance,
        std_dev: round_to(variance.sqrt(), 2),
        difficulty: round_to(mean / full_score, 2),
        discrimination: round_to(discrimination(&scores, full_score), 2),
    }
}

/// Cronbach's alpha over `k` items. A single item is reported as 1.
fn reliability(item_variances: &[f64], totals: &[f64]) -> f64 {
    let k = item_variances.len();
    if k <= 1 {
        return 1.0;
    }
    let total_variance = population_variance(totals, mean(totals));
    if total_variance == 0.0 {
        return 0.0;
    }
    let k = k as f64;
    let item_sum: f64 = item_variances.iter().sum();
    round_to(k / (k - 1.0) * (1.0 - item_sum / total_variance), 2)
}

/// Descriptive and psychometric statistics for a period's participants.
///
/// A participant without a score in a subject counts as 0 there. Explicit
/// full scores from the settings take precedence over the inferred ones.
pub fn exam_parameters(
    rows: &[PeriodRow],
    subjects: &SubjectSet,
    settings: &AnalysisSettings,
) -> ExamParameters {
    let participants: Vec<&PeriodRow> = rows.iter().filter(|row| row.present).collect();

    let per_subject: Vec<SubjectParameters> = subjects
        .iter()
        .map(|subject| {
            let scores = participants
                .iter()
                .map(|row| row.scores.get(subject).copied().unwrap_or(0.0))
                .collect();
            subject_parameters(subject, scores, settings.full_score_for(subject))
        })
        .collect();

    let totals: Vec<f64> = participants
        .iter()
        .map(|row| {
            subjects
                .iter()
                .map(|subject| row.scores.get(subject).copied().unwrap_or(0.0))
                .sum::<f64>()
        })
        .collect();
    let item_variances: Vec<f64> = per_subject.iter().map(|p| p.variance).collect();

    ExamParameters {
        reliability: reliability(&item_variances, &totals),
        subjects: per_subject,
    }
}
