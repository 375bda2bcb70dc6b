use crate::models::{
    round_to, HistoricalRanks, ProgressRow, StreakDirection, StreakRecord, StudentRecord,
};
use crate::snapshot::resolved_rank;

/// Symmetric, scale-normalised rank change from `rank_from` to `rank_to`.
/// Positive means the student moved up. Non-positive ranks yield 0.
pub fn progress_coefficient(rank_from: i64, rank_to: i64) -> f64 {
    if rank_from <= 0 || rank_to <= 0 {
        return 0.0;
    }
    let (from, to) = (rank_from as f64, rank_to as f64);
    round_to(2.0 * (from - to) / (from + to), 2)
}

/// Walks back from the end of `ranks` while consecutive moves keep the
/// direction of the last move.
fn streak_from_ranks(ranks: &[u32]) -> Option<StreakRecord> {
    if ranks.len() < 2 {
        return None;
    }

    let last = ranks[ranks.len() - 1];
    let previous = ranks[ranks.len() - 2];
    if last == previous {
        return Some(StreakRecord {
            count: 0,
            direction: StreakDirection::Stable,
            total_change: 0,
            steps: Vec::new(),
        });
    }

    let improving = last < previous;
    let mut steps = Vec::new();
    for pair in ranks.windows(2).rev() {
        let (before, after) = (pair[0], pair[1]);
        let continues = if improving { after < before } else { after > before };
        if !continues {
            break;
        }
        steps.push(before.abs_diff(after));
    }
    steps.reverse();

    Some(StreakRecord {
        count: steps.len(),
        direction: if improving {
            StreakDirection::Improvement
        } else {
            StreakDirection::Decline
        },
        total_change: steps.iter().sum(),
        steps,
    })
}

fn resolved_history<'a, I>(student: &StudentRecord, periods: I, historical_ranks: &HistoricalRanks) -> Vec<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    periods
        .into_iter()
        .filter_map(|period| resolved_rank(student, period, historical_ranks))
        .collect()
}

/// Streak ending at the student's most recent ranked period. Periods without
/// a resolved rank are skipped.
pub fn streak_info(student: &StudentRecord, historical_ranks: &HistoricalRanks) -> Option<StreakRecord> {
    let periods = student.history.iter().map(|snapshot| snapshot.period.as_str());
    streak_from_ranks(&resolved_history(student, periods, historical_ranks))
}

/// Streak over the student's history between `start` (inclusive, or the
/// beginning when `None`) and `end` (inclusive).
pub fn streak_info_within(
    student: &StudentRecord,
    historical_ranks: &HistoricalRanks,
    start: Option<&str>,
    end: &str,
) -> Option<StreakRecord> {
    let end_index = student
        .history
        .iter()
        .position(|snapshot| snapshot.period == end)?;
    let start_index = match start {
        Some(start) => student
            .history
            .iter()
            .position(|snapshot| snapshot.period == start)?,
        None => 0,
    };
    if start_index > end_index {
        return None;
    }

    let periods = student.history[start_index..=end_index]
        .iter()
        .map(|snapshot| snapshot.period.as_str());
    streak_from_ranks(&resolved_history(student, periods, historical_ranks))
}

/// Rank movement between two periods for every student ranked in both.
/// Rows are ordered by rank change, biggest climb first.
pub fn progress_analysis(
    students: &[StudentRecord],
    period_from: &str,
    period_to: &str,
    historical_ranks: &HistoricalRanks,
) -> Vec<ProgressRow> {
    let mut rows: Vec<ProgressRow> = students
        .iter()
        .filter_map(|student| {
            let rank_from = resolved_rank(student, period_from, historical_ranks)?;
            let rank_to = resolved_rank(student, period_to, historical_ranks)?;
            let streak = streak_info(student, historical_ranks)
                .map(|record| record.signed_count())
                .unwrap_or(0);
            Some(ProgressRow {
                name: student.name.clone(),
                class_name: student.class_name.clone(),
                rank_from,
                rank_to,
                rank_change: i64::from(rank_from) - i64::from(rank_to),
                coefficient: progress_coefficient(i64::from(rank_from), i64::from(rank_to)),
                streak,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.rank_change
            .cmp(&a.rank_change)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}
