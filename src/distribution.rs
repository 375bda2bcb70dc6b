use std::collections::BTreeMap;

use crate::models::{
    round_to, BelowLineStudent, ClassLeaderboard, ClassSummary, DistributionBucket, HeatmapRow,
    PeriodRow, RankMap, SubjectAverage, SubjectSet,
};
use crate::snapshot::effective_population;
use crate::thresholds::{category_index, status_matches, ThresholdSet, NOT_ADMITTED};

fn in_classes(row: &PeriodRow, selected_classes: &[String]) -> bool {
    selected_classes.iter().any(|class| *class == row.class_name)
}

/// Counts ranks into the bands between consecutive cutoffs. Empty bands are
/// left out.
fn band_ranks<I>(ranks: I, cutoffs: &[(&str, u32)]) -> Vec<DistributionBucket>
where
    I: IntoIterator<Item = u32>,
{
    let mut counts = vec![0usize; cutoffs.len() + 1];
    for rank in ranks {
        let index = category_index(rank, cutoffs).unwrap_or(cutoffs.len());
        counts[index] += 1;
    }

    cutoffs
        .iter()
        .map(|(label, _)| *label)
        .chain(std::iter::once(NOT_ADMITTED))
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| DistributionBucket {
            label: label.to_string(),
            count,
        })
        .collect()
}

/// Admission distribution of a period's participants.
///
/// If any participant carries an imported status the tally follows the
/// statuses and ignores the numeric cutoffs.
pub fn admission_distribution(rows: &[PeriodRow], thresholds: &ThresholdSet) -> Vec<DistributionBucket> {
    let participants: Vec<&PeriodRow> = rows.iter().filter(|row| row.present).collect();

    if participants.iter().any(|row| row.imported_status().is_some()) {
        let labels: Vec<&str> = thresholds.keys().collect();
        let mut counts = vec![0usize; labels.len() + 1];
        for row in &participants {
            let index = row
                .imported_status()
                .and_then(|status| labels.iter().position(|label| status_matches(status, label)))
                .unwrap_or(labels.len());
            counts[index] += 1;
        }
        return labels
            .into_iter()
            .chain(std::iter::once(NOT_ADMITTED))
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| DistributionBucket {
                label: label.to_string(),
                count,
            })
            .collect();
    }

    let cutoffs = thresholds.absolute_cutoffs(effective_population(rows));
    band_ranks(participants.iter().map(|row| row.school_rank), &cutoffs)
}

/// Population a subject's percent cutoffs are measured against: the largest
/// rank in its rank map, else the roster size.
fn subject_population(subject_ranks: &RankMap, roster_size: usize) -> u32 {
    subject_ranks
        .values()
        .copied()
        .max()
        .unwrap_or(roster_size as u32)
}

/// Banded distribution of one subject's ranks within the selected classes.
pub fn subject_distribution(
    rows: &[PeriodRow],
    subject_ranks: &RankMap,
    thresholds: &ThresholdSet,
    selected_classes: &[String],
) -> Vec<DistributionBucket> {
    let population = subject_population(subject_ranks, rows.len());
    let cutoffs = thresholds.absolute_cutoffs(population);

    let ranks = rows
        .iter()
        .filter(|row| in_classes(row, selected_classes))
        .filter_map(|row| subject_ranks.get(&row.name).copied());
    band_ranks(ranks, &cutoffs)
}

/// Students in the selected classes ranked beyond the loosest cutoff in one
/// subject, best rank first.
pub fn below_line_students(
    rows: &[PeriodRow],
    subject: &str,
    subject_ranks: &RankMap,
    thresholds: &ThresholdSet,
    selected_classes: &[String],
) -> Vec<BelowLineStudent> {
    let population = subject_population(subject_ranks, rows.len());
    let Some(pass_line) = thresholds.pass_line(population) else {
        return Vec::new();
    };

    let mut students: Vec<BelowLineStudent> = rows
        .iter()
        .filter(|row| in_classes(row, selected_classes))
        .filter_map(|row| {
            let rank = subject_ranks.get(&row.name).copied()?;
            (rank > pass_line).then(|| BelowLineStudent {
                name: row.name.clone(),
                class_name: row.class_name.clone(),
                rank,
                score: row.scores.get(subject).copied(),
            })
        })
        .collect();

    students.sort_by_key(|student| student.rank);
    students
}

/// Mean score per subject over participants in the selected classes that
/// have a score for it.
pub fn subject_averages(
    rows: &[PeriodRow],
    subjects: &SubjectSet,
    selected_classes: &[String],
) -> Vec<SubjectAverage> {
    subjects
        .iter()
        .map(|subject| {
            let scores: Vec<f64> = rows
                .iter()
                .filter(|row| row.present && in_classes(row, selected_classes))
                .filter_map(|row| row.scores.get(subject).copied())
                .collect();
            let average = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            SubjectAverage {
                subject: subject.to_string(),
                average: round_to(average, 2),
                participants: scores.len(),
            }
        })
        .collect()
}

/// Average total and cutoff counts per selected class.
pub fn class_summaries(
    rows: &[PeriodRow],
    selected_classes: &[String],
    top_cutoff: u32,
    bench_cutoff: u32,
) -> Vec<ClassSummary> {
    selected_classes
        .iter()
        .map(|class_name| {
            let members: Vec<&PeriodRow> = rows
                .iter()
                .filter(|row| row.present && row.class_name == *class_name)
                .collect();
            let average_total = if members.is_empty() {
                0.0
            } else {
                members.iter().map(|row| row.total).sum::<f64>() / members.len() as f64
            };
            ClassSummary {
                class_name: class_name.clone(),
                student_count: members.len(),
                average_total: round_to(average_total, 2),
                top_count: members
                    .iter()
                    .filter(|row| row.school_rank <= top_cutoff)
                    .count(),
                bench_count: members
                    .iter()
                    .filter(|row| row.school_rank <= bench_cutoff)
                    .count(),
            }
        })
        .collect()
}

fn leader_by<F>(summaries: &[ClassSummary], key: F) -> Option<String>
where
    F: Fn(&ClassSummary) -> f64,
{
    let mut best: Option<&ClassSummary> = None;
    for summary in summaries {
        if best.map_or(true, |current| key(summary) > key(current)) {
            best = Some(summary);
        }
    }
    best.map(|summary| summary.class_name.clone())
}

/// Independent leaders for average total, top-cutoff count and
/// bench-cutoff count. Ties keep the earlier class.
pub fn class_leaderboard(summaries: &[ClassSummary]) -> Option<ClassLeaderboard> {
    Some(ClassLeaderboard {
        best_average: leader_by(summaries, |s| s.average_total)?,
        most_top: leader_by(summaries, |s| s.top_count as f64)?,
        most_bench: leader_by(summaries, |s| s.bench_count as f64)?,
    })
}

/// Best value per heatmap row across the selected classes. Rows with no
/// selected values are left out.
pub fn heatmap_row_maxima(rows: &[HeatmapRow], selected_classes: &[String]) -> BTreeMap<String, f64> {
    rows.iter()
        .filter_map(|row| {
            let max = row
                .values
                .iter()
                .filter(|(class, _)| selected_classes.contains(class))
                .map(|(_, value)| *value)
                .max_by(f64::total_cmp)?;
            Some((row.label.clone(), max))
        })
        .collect()
}
