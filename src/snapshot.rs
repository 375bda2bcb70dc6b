use crate::models::{HistoricalRanks, PeriodRow, StudentRecord, UNRANKED};

/// Rank for a student in a period: the rank map first, then the snapshot's
/// own imported rank.
pub fn resolved_rank(
    student: &StudentRecord,
    period: &str,
    historical_ranks: &HistoricalRanks,
) -> Option<u32> {
    historical_ranks
        .get(period)
        .and_then(|ranks| ranks.get(&student.name).copied())
        .or_else(|| {
            student
                .snapshot_for(period)
                .and_then(|snapshot| snapshot.imported_rank())
        })
}

/// Projects every student onto one period, sorted by resolved rank.
///
/// The output always has one row per student; students without a snapshot
/// get empty scores and students without a rank sort last with `UNRANKED`.
pub fn period_snapshot(
    students: &[StudentRecord],
    period: &str,
    historical_ranks: &HistoricalRanks,
) -> Vec<PeriodRow> {
    let mut rows: Vec<PeriodRow> = students
        .iter()
        .map(|student| {
            let snapshot = student.snapshot_for(period);
            PeriodRow {
                id: student.id,
                name: student.name.clone(),
                class_name: student.class_name.clone(),
                present: snapshot.is_some(),
                scores: snapshot.map(|s| s.scores.clone()).unwrap_or_default(),
                total: snapshot.map_or(0.0, |s| s.total),
                average: snapshot.map_or(0.0, |s| s.average),
                status: snapshot.and_then(|s| s.status.clone()),
                school_rank: resolved_rank(student, period, historical_ranks).unwrap_or(UNRANKED),
            }
        })
        .collect();

    rows.sort_by_key(|row| row.school_rank);
    rows
}

/// Largest rank among ranked participants, or the participant count when
/// that is larger. Partial-data periods are measured against this rather
/// than the roster size.
pub fn effective_population(rows: &[PeriodRow]) -> u32 {
    let participants = rows.iter().filter(|row| row.present).count() as u32;
    let max_rank = rows
        .iter()
        .filter(|row| row.present && row.is_ranked())
        .map(|row| row.school_rank)
        .max()
        .unwrap_or(0);
    max_rank.max(participants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreSnapshot;
    use crate::ranks::historical_ranks;
    use std::collections::BTreeMap;

    fn student(name: &str, period: &str, total: f64) -> StudentRecord {
        let scores: BTreeMap<String, f64> = [("math".to_string(), total)].into();
        StudentRecord::new(name, "10A").with_snapshot(ScoreSnapshot::new(period, scores))
    }

    #[test]
    fn snapshot_keeps_every_student_and_sorts_unranked_last() {
        let students = vec![
            student("Absent", "P0", 300.0),
            student("Second", "P1", 480.0),
            student("First", "P1", 500.0),
        ];
        let ranks = historical_ranks(&students);
        let rows = period_snapshot(&students, "P1", &ranks);

        assert_eq!(rows.len(), students.len());
        assert_eq!(rows[0].name, "First");
        assert_eq!(rows[0].school_rank, 1);
        assert_eq!(rows[1].school_rank, 2);
        assert_eq!(rows[2].name, "Absent");
        assert_eq!(rows[2].school_rank, UNRANKED);
        assert!(!rows[2].present);
        assert_eq!(rows[2].total, 0.0);
        assert!(rows[2].scores.is_empty());
    }

    #[test]
    fn snapshot_falls_back_to_imported_rank() {
        let mut record = student("Imported", "P1", 100.0);
        record.history[0].school_rank = Some(42);
        let rows = period_snapshot(&[record], "P1", &HistoricalRanks::new());

        assert_eq!(rows[0].school_rank, 42);
    }

    #[test]
    fn effective_population_ignores_unranked_sentinel() {
        let students = vec![
            student("A", "P1", 500.0),
            student("B", "P1", 490.0),
            student("Absent", "P2", 1.0),
        ];
        let ranks = historical_ranks(&students);
        let rows = period_snapshot(&students, "P1", &ranks);

        assert_eq!(effective_population(&rows), 2);
    }

    #[test]
    fn effective_population_uses_max_imported_rank() {
        let mut a = student("A", "P1", 500.0);
        a.history[0].school_rank = Some(120);
        let mut b = student("B", "P1", 400.0);
        b.history[0].school_rank = Some(340);
        let ranks = historical_ranks(&[a.clone(), b.clone()]);
        let rows = period_snapshot(&[a, b], "P1", &ranks);

        assert_eq!(effective_population(&rows), 340);
    }
}
