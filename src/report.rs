use std::fmt::Write;

use chrono::NaiveDate;

use crate::distribution::{
    admission_distribution, class_leaderboard, class_summaries, subject_averages,
};
use crate::models::{
    collect_classes, HistoricalRanks, ModeSummary, StreakDirection, StreakRecord, StudentRecord,
    SubjectSet,
};
use crate::psychometrics::exam_parameters;
use crate::progress::streak_info;
use crate::ranks::historical_ranks;
use crate::settings::AnalysisSettings;
use crate::snapshot::period_snapshot;
use crate::thresholds::resolve_thresholds;

/// Students on an improvement streak, longest first.
pub fn improvement_streaks(
    students: &[StudentRecord],
    ranks: &HistoricalRanks,
) -> Vec<(String, StreakRecord)> {
    let mut streaks: Vec<(String, StreakRecord)> = students
        .iter()
        .filter_map(|student| {
            let record = streak_info(student, ranks)?;
            (record.direction == StreakDirection::Improvement && record.count > 0)
                .then(|| (student.name.clone(), record))
        })
        .collect();

    streaks.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then_with(|| b.1.total_change.cmp(&a.1.total_change))
            .then_with(|| a.0.cmp(&b.0))
    });
    streaks
}

fn format_mode(mode: &ModeSummary) -> String {
    match mode {
        ModeSummary::NoMode => "none".to_string(),
        ModeSummary::Values { scores, truncated } => {
            let mut text = scores
                .iter()
                .map(|score| score.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if *truncated {
                text.push_str(", ...");
            }
            text
        }
    }
}

pub fn build_report(
    students: &[StudentRecord],
    period: &str,
    selected_classes: Option<&[String]>,
    settings: &AnalysisSettings,
    generated_on: NaiveDate,
) -> String {
    let ranks = historical_ranks(students);
    let rows = period_snapshot(students, period, &ranks);
    let subjects = SubjectSet::from_students(students);
    let all_classes = collect_classes(students);
    let classes = selected_classes.unwrap_or(&all_classes);
    let participants = rows.iter().filter(|row| row.present).count();

    let mut output = String::new();

    let _ = writeln!(output, "# Exam Analytics Report");
    let _ = writeln!(
        output,
        "Generated on {} for {} ({} of {} students took part)",
        generated_on,
        period,
        participants,
        rows.len()
    );

    if participants == 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "No results recorded for this period.");
        return output;
    }

    let thresholds = resolve_thresholds(&rows, settings);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Admission Distribution");
    let distribution = admission_distribution(&rows, &thresholds);
    if thresholds.is_empty() {
        let _ = writeln!(output, "No admission thresholds configured.");
    }
    for bucket in &distribution {
        let _ = writeln!(output, "- {}: {} students", bucket.label, bucket.count);
    }

    let (top_cutoff, bench_cutoff) = settings.leaderboard_cutoffs();
    let summaries = class_summaries(&rows, classes, top_cutoff, bench_cutoff);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Classes");
    match class_leaderboard(&summaries) {
        Some(leaders) => {
            let _ = writeln!(
                output,
                "Best average: {}. Most in top {}: {}. Most in top {}: {}.",
                leaders.best_average, top_cutoff, leaders.most_top, bench_cutoff, leaders.most_bench
            );
        }
        None => {
            let _ = writeln!(output, "No classes selected.");
        }
    }
    for summary in &summaries {
        let _ = writeln!(
            output,
            "- {}: {} students, average total {:.2}, {} in top {}, {} in top {}",
            summary.class_name,
            summary.student_count,
            summary.average_total,
            summary.top_count,
            top_cutoff,
            summary.bench_count,
            bench_cutoff
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Averages");
    for average in subject_averages(&rows, &subjects, classes) {
        let _ = writeln!(
            output,
            "- {}: {:.2} across {} students",
            average.subject, average.average, average.participants
        );
    }

    let parameters = exam_parameters(&rows, &subjects, settings);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Exam Parameters");
    for subject in &parameters.subjects {
        let _ = writeln!(
            output,
            "- {} (out of {}): mean {:.2}, median {:.2}, mode {}, sd {:.2}, difficulty {:.2}, discrimination {:.2}",
            subject.subject,
            subject.full_score,
            subject.mean,
            subject.median,
            format_mode(&subject.mode),
            subject.std_dev,
            subject.difficulty,
            subject.discrimination
        );
    }
    let _ = writeln!(output, "Reliability: {:.2}", parameters.reliability);

    let streaks = improvement_streaks(students, &ranks);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Longest Improvement Streaks");
    if streaks.is_empty() {
        let _ = writeln!(output, "No students are on an improvement streak.");
    } else {
        for (name, streak) in streaks.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {} periods, up {} places",
                name, streak.count, streak.total_change
            );
        }
    }

    output
}
