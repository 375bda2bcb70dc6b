use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{
    collect_periods, HistoricalRanks, RankMap, ScoreSnapshot, StudentRecord,
    SubjectHistoricalRanks, SubjectSet,
};

/// Builds one rank map from the participants of a single period.
///
/// When any participant carries an imported rank the map is taken from the
/// imported values alone and participants without one are left out.
/// Otherwise participants with a score are sorted by descending score and
/// numbered 1..n in stable order, so ties still get distinct ranks.
fn rank_participants<'a, I, S, R>(participants: I, score_of: S, imported_of: R) -> RankMap
where
    I: IntoIterator<Item = (&'a str, &'a ScoreSnapshot)>,
    S: Fn(&ScoreSnapshot) -> Option<f64>,
    R: Fn(&ScoreSnapshot) -> Option<u32>,
{
    let participants: Vec<(&str, &ScoreSnapshot)> = participants.into_iter().collect();

    if participants
        .iter()
        .any(|(_, snapshot)| imported_of(*snapshot).is_some())
    {
        return participants
            .iter()
            .filter_map(|(name, snapshot)| {
                imported_of(*snapshot).map(|rank| (name.to_string(), rank))
            })
            .collect();
    }

    let mut scored: Vec<(&str, f64)> = participants
        .iter()
        .filter_map(|(name, snapshot)| score_of(*snapshot).map(|score| (*name, score)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    scored
        .into_iter()
        .enumerate()
        .map(|(index, (name, _))| (name.to_string(), index as u32 + 1))
        .collect()
}

fn participants_in<'a>(
    students: &'a [StudentRecord],
    period: &'a str,
) -> impl Iterator<Item = (&'a str, &'a ScoreSnapshot)> + 'a {
    students.iter().filter_map(move |student| {
        student
            .snapshot_for(period)
            .map(|snapshot| (student.name.as_str(), snapshot))
    })
}

/// School-wide total-score ranks for every period.
pub fn historical_ranks(students: &[StudentRecord]) -> HistoricalRanks {
    collect_periods(students)
        .into_iter()
        .map(|period| {
            let ranks = rank_participants(
                participants_in(students, &period),
                |snapshot| Some(snapshot.total),
                ScoreSnapshot::imported_rank,
            );
            (period, ranks)
        })
        .collect()
}

/// Class-wide total-score ranks for every period.
///
/// Always recomputed from scores; each class is numbered independently and
/// the results are merged into one map per period.
pub fn class_historical_ranks(students: &[StudentRecord]) -> HistoricalRanks {
    let mut by_class: HashMap<&str, Vec<&StudentRecord>> = HashMap::new();
    for student in students {
        by_class.entry(student.class_name.as_str()).or_default().push(student);
    }

    collect_periods(students)
        .into_iter()
        .map(|period| {
            let ranks = by_class
                .values()
                .flat_map(|members| {
                    let participants = members.iter().filter_map(|student| {
                        student
                            .snapshot_for(&period)
                            .map(|snapshot| (student.name.as_str(), snapshot))
                    });
                    rank_participants(participants, |snapshot| Some(snapshot.total), |_| None)
                })
                .collect::<RankMap>();
            (period, ranks)
        })
        .collect()
}

/// School-wide per-subject ranks for every period.
pub fn subject_historical_ranks(
    students: &[StudentRecord],
    subjects: &SubjectSet,
) -> SubjectHistoricalRanks {
    collect_periods(students)
        .into_iter()
        .map(|period| {
            let per_subject = subjects
                .iter()
                .map(|subject| {
                    let ranks = rank_participants(
                        participants_in(students, &period),
                        |snapshot| snapshot.score(subject),
                        |snapshot| snapshot.imported_subject_rank(subject),
                    );
                    (subject.to_string(), ranks)
                })
                .collect();
            (period, per_subject)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn student(name: &str, class_name: &str, period: &str, scores: &[(&str, f64)]) -> StudentRecord {
        let scores: BTreeMap<String, f64> =
            scores.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        StudentRecord::new(name, class_name).with_snapshot(ScoreSnapshot::new(period, scores))
    }

    fn with_imported_rank(mut record: StudentRecord, rank: u32) -> StudentRecord {
        if let Some(snapshot) = record.history.last_mut() {
            snapshot.school_rank = Some(rank);
        }
        record
    }

    #[test]
    fn computed_ranks_are_dense_even_with_ties() {
        let students = vec![
            student("A", "1", "P1", &[("math", 80.0)]),
            student("B", "1", "P1", &[("math", 90.0)]),
            student("C", "2", "P1", &[("math", 80.0)]),
            student("D", "2", "P1", &[("math", 70.0)]),
        ];
        let ranks = historical_ranks(&students);
        let p1 = &ranks["P1"];

        let mut values: Vec<u32> = p1.values().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(p1["B"], 1);
        assert_eq!(p1["A"], 2);
        assert_eq!(p1["C"], 3);
        assert_eq!(p1["D"], 4);
    }

    #[test]
    fn imported_ranks_take_precedence_without_fallback() {
        let students = vec![
            with_imported_rank(student("A", "1", "P1", &[("math", 10.0)]), 5),
            student("B", "1", "P1", &[("math", 99.0)]),
        ];
        let ranks = historical_ranks(&students);

        assert_eq!(ranks["P1"].get("A"), Some(&5));
        assert!(!ranks["P1"].contains_key("B"));
    }

    #[test]
    fn periods_are_ranked_independently() {
        let mut a = student("A", "1", "P1", &[("math", 50.0)]);
        a.push_snapshot(ScoreSnapshot::new("P2", [("math".to_string(), 95.0)].into()));
        let b = student("B", "1", "P1", &[("math", 60.0)]);
        let ranks = historical_ranks(&[a, b]);

        assert_eq!(ranks["P1"]["A"], 2);
        assert_eq!(ranks["P2"]["A"], 1);
        assert_eq!(ranks["P2"].len(), 1);
    }

    #[test]
    fn class_ranks_restart_per_class_and_ignore_imports() {
        let students = vec![
            with_imported_rank(student("A", "1", "P1", &[("math", 90.0)]), 7),
            student("B", "1", "P1", &[("math", 95.0)]),
            student("C", "2", "P1", &[("math", 10.0)]),
        ];
        let ranks = class_historical_ranks(&students);

        assert_eq!(ranks["P1"]["B"], 1);
        assert_eq!(ranks["P1"]["A"], 2);
        assert_eq!(ranks["P1"]["C"], 1);
    }

    #[test]
    fn subject_ranks_skip_students_without_a_score() {
        let students = vec![
            student("A", "1", "P1", &[("math", 70.0), ("art", 90.0)]),
            student("B", "1", "P1", &[("math", 80.0)]),
        ];
        let subjects = SubjectSet::new(["math", "art"]);
        let ranks = subject_historical_ranks(&students, &subjects);

        assert_eq!(ranks["P1"]["math"]["B"], 1);
        assert_eq!(ranks["P1"]["math"]["A"], 2);
        assert_eq!(ranks["P1"]["art"].len(), 1);
        assert_eq!(ranks["P1"]["art"]["A"], 1);
    }

    #[test]
    fn imported_subject_ranks_apply_per_subject() {
        let mut a = student("A", "1", "P1", &[("math", 70.0), ("art", 60.0)]);
        a.history[0].subject_ranks.insert("math".to_string(), 12);
        let b = student("B", "1", "P1", &[("math", 80.0), ("art", 65.0)]);
        let subjects = SubjectSet::new(["math", "art"]);
        let ranks = subject_historical_ranks(&[a, b], &subjects);

        assert_eq!(ranks["P1"]["math"].len(), 1);
        assert_eq!(ranks["P1"]["math"]["A"], 12);
        assert_eq!(ranks["P1"]["art"]["B"], 1);
        assert_eq!(ranks["P1"]["art"]["A"], 2);
    }

    #[test]
    fn empty_roster_yields_no_periods() {
        assert!(historical_ranks(&[]).is_empty());
    }
}
