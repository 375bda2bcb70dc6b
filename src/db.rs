use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::ImportError;
use crate::models::{ScoreSnapshot, StudentRecord};
use crate::settings::AnalysisSettings;
use crate::thresholds::{ThresholdEntry, ThresholdMode};

/// Identifier of the single stored workspace.
pub const WORKSPACE_ID: &str = "default";

/// Everything the engine needs from storage.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub students: Vec<StudentRecord>,
    pub settings: AnalysisSettings,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_workspace(pool: &PgPool) -> anyhow::Result<Workspace> {
    let row = sqlx::query(
        "SELECT students, settings FROM exam_analytics.workspaces WHERE id = $1",
    )
    .bind(WORKSPACE_ID)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        debug!("no stored workspace, using an empty one");
        return Ok(Workspace::default());
    };

    let Json(students): Json<Vec<StudentRecord>> = row
        .try_get("students")
        .context("stored students are not valid records")?;
    let Json(settings): Json<AnalysisSettings> = row
        .try_get("settings")
        .context("stored settings are not valid")?;

    info!(students = students.len(), "loaded workspace");
    Ok(Workspace { students, settings })
}

pub async fn save_students(pool: &PgPool, students: &[StudentRecord]) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO exam_analytics.workspaces (id, students, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (id) DO UPDATE
        SET students = EXCLUDED.students, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(WORKSPACE_ID)
    .bind(Json(students))
    .execute(pool)
    .await?;

    info!(students = students.len(), "saved students");
    Ok(())
}

pub async fn save_settings(pool: &PgPool, settings: &AnalysisSettings) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO exam_analytics.workspaces (id, settings, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (id) DO UPDATE
        SET settings = EXCLUDED.settings, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(WORKSPACE_ID)
    .bind(Json(settings))
    .execute(pool)
    .await?;

    info!(mode = %settings.mode, thresholds = settings.thresholds.len(), "saved settings");
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    save_students(pool, &demo_roster()).await?;
    save_settings(pool, &demo_settings()).await?;
    Ok(())
}

/// Reads a JSON array of student records prepared by the import wizard.
pub fn read_import(path: &Path) -> Result<Vec<StudentRecord>, ImportError> {
    let contents = std::fs::read_to_string(path)?;
    let mut students: Vec<StudentRecord> = serde_json::from_str(&contents)?;
    validate_records(&students, &path.display().to_string())?;
    for student in &mut students {
        student.normalize();
    }
    Ok(students)
}

/// Rejects empty imports and histories with a repeated period.
pub fn validate_records(students: &[StudentRecord], source: &str) -> Result<(), ImportError> {
    if students.iter().all(|student| student.history.is_empty()) {
        return Err(ImportError::NoRecords(source.to_string()));
    }

    for student in students {
        let mut seen = HashSet::new();
        for snapshot in &student.history {
            if !seen.insert(snapshot.period.as_str()) {
                return Err(ImportError::DuplicatePeriod {
                    student: student.name.clone(),
                    period: snapshot.period.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Folds imported records into the roster. A student is matched by id, then
/// by name and class; their snapshots replace any stored snapshot for the
/// same period. Unmatched students are appended.
pub fn merge_roster(roster: &mut Vec<StudentRecord>, imported: Vec<StudentRecord>) {
    for incoming in imported {
        let existing = roster
            .iter()
            .position(|student| student.id == incoming.id)
            .or_else(|| {
                roster.iter().position(|student| {
                    student.name == incoming.name && student.class_name == incoming.class_name
                })
            });

        match existing {
            Some(index) => {
                let student = &mut roster[index];
                for snapshot in incoming.history {
                    student.push_snapshot(snapshot);
                }
            }
            None => roster.push(incoming),
        }
    }
}

/// Merges a JSON export into the stored roster and returns the number of
/// imported students.
pub async fn import_json(pool: &PgPool, path: &Path) -> anyhow::Result<usize> {
    let imported = read_import(path)
        .with_context(|| format!("failed to import {}", path.display()))?;
    let count = imported.len();

    let mut roster = load_workspace(pool).await?.students;
    let before = roster.len();
    merge_roster(&mut roster, imported);
    debug!(added = roster.len() - before, "merged import into roster");

    save_students(pool, &roster).await?;
    Ok(count)
}

fn demo_snapshot(period: &str, scores: [(&str, f64); 3]) -> ScoreSnapshot {
    let scores: BTreeMap<String, f64> = scores
        .into_iter()
        .map(|(subject, score)| (subject.to_string(), score))
        .collect();
    ScoreSnapshot::new(period, scores)
}

/// A small two-class roster across three exam periods.
pub fn demo_roster() -> Vec<StudentRecord> {
    let roster = [
        ("Avery Lee", "10A", [[88.0, 92.0, 79.0], [91.0, 95.0, 84.0], [96.0, 97.0, 90.0]]),
        ("Jules Moreno", "10A", [[72.0, 65.0, 80.0], [70.0, 61.0, 77.0], [66.0, 58.0, 71.0]]),
        ("Kiara Patel", "10B", [[95.0, 88.0, 92.0], [93.0, 90.0, 89.0], [94.0, 86.0, 93.0]]),
        ("Noah Brooks", "10B", [[60.0, 70.0, 55.0], [72.0, 76.0, 66.0], [85.0, 88.0, 80.0]]),
        ("Mina Okafor", "10A", [[81.0, 77.0, 85.0], [84.0, 80.0, 83.0], [82.0, 79.0, 88.0]]),
    ];
    let periods = ["2026 Midterm", "2026 Final", "2027 Midterm"];

    roster
        .into_iter()
        .map(|(name, class_name, results)| {
            let mut student = StudentRecord::new(name, class_name);
            for (period, [math, english, science]) in periods.iter().zip(results) {
                student.push_snapshot(demo_snapshot(
                    period,
                    [("math", math), ("english", english), ("science", science)],
                ));
            }
            student
        })
        .collect()
}

pub fn demo_settings() -> AnalysisSettings {
    AnalysisSettings {
        mode: ThresholdMode::Percent,
        thresholds: vec![
            ThresholdEntry::new("Tier A", 20.0),
            ThresholdEntry::new("Tier B", 60.0),
        ],
        comparison_thresholds: vec![1, 3],
        ..AnalysisSettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collect_periods;

    #[test]
    fn demo_roster_is_a_valid_import() {
        let roster = demo_roster();
        assert!(validate_records(&roster, "demo").is_ok());
        assert_eq!(collect_periods(&roster).len(), 3);
        assert!(roster.iter().all(|student| student.history.len() == 3));
    }

    #[test]
    fn empty_import_reports_no_records() {
        let err = validate_records(&[StudentRecord::new("A", "10A")], "exam.json").unwrap_err();
        assert!(matches!(err, ImportError::NoRecords(_)));
        assert_eq!(err.to_string(), "no records found in exam.json");
    }

    #[test]
    fn duplicate_periods_are_rejected() {
        let mut student = StudentRecord::new("A", "10A");
        student.history.push(ScoreSnapshot::new("P1", BTreeMap::new()));
        student.history.push(ScoreSnapshot::new("P1", BTreeMap::new()));

        let err = validate_records(&[student], "exam.json").unwrap_err();
        assert!(matches!(err, ImportError::DuplicatePeriod { .. }));
    }

    fn write_import(name: &str, json: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn import_without_totals_ranks_by_subject_sum() {
        let path = write_import(
            "no-totals",
            r#"[
                {"id": "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "name": "High", "className": "10A",
                 "history": [{"period": "P1", "scores": {"math": 99, "art": 98}}]},
                {"id": "9a1c3e55-0f0e-4c55-9d4b-5b1f2f0e8c11", "name": "Low", "className": "10A",
                 "history": [{"period": "P1", "scores": {"math": 5, "art": 5}, "total": 10}]}
            ]"#,
        );
        let students = read_import(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(students[0].history[0].total, 197.0);
        assert_eq!(students[0].total, 197.0);
        assert_eq!(students[0].average, 98.5);
        assert_eq!(students[1].total, 10.0);

        let ranks = crate::ranks::historical_ranks(&students);
        assert_eq!(ranks["P1"]["High"], 1);
        assert_eq!(ranks["P1"]["Low"], 2);
    }

    #[test]
    fn merge_appends_new_periods_to_matching_students() {
        let mut roster = demo_roster();
        let avery_id = roster[0].id;

        let mut by_id = StudentRecord::new("Avery Lee", "10A");
        by_id.id = avery_id;
        by_id.push_snapshot(demo_snapshot(
            "2027 Final",
            [("math", 99.0), ("english", 98.0), ("science", 97.0)],
        ));
        let by_name = StudentRecord::new("Jules Moreno", "10A").with_snapshot(demo_snapshot(
            "2027 Final",
            [("math", 70.0), ("english", 60.0), ("science", 65.0)],
        ));
        let newcomer = StudentRecord::new("Rosa Diaz", "10B").with_snapshot(demo_snapshot(
            "2027 Final",
            [("math", 80.0), ("english", 80.0), ("science", 80.0)],
        ));

        merge_roster(&mut roster, vec![by_id, by_name, newcomer]);

        assert_eq!(roster.len(), 6);
        assert_eq!(roster[0].history.len(), 4);
        assert_eq!(roster[0].total, 294.0);
        assert_eq!(roster[1].history.len(), 4);
        assert_eq!(roster[5].name, "Rosa Diaz");
        assert_eq!(collect_periods(&roster).len(), 4);
    }

    #[test]
    fn merge_replaces_a_reimported_period() {
        let mut roster = demo_roster();
        let mut again = StudentRecord::new("Kiara Patel", "10B");
        again.id = roster[2].id;
        again.push_snapshot(demo_snapshot(
            "2026 Final",
            [("math", 50.0), ("english", 50.0), ("science", 50.0)],
        ));

        merge_roster(&mut roster, vec![again]);

        assert_eq!(roster[2].history.len(), 3);
        assert_eq!(roster[2].snapshot_for("2026 Final").map(|s| s.total), Some(150.0));
    }

    #[test]
    fn import_records_parse_from_camel_case_json() {
        let json = r#"[{
            "id": "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2",
            "name": "Avery Lee",
            "className": "10A",
            "history": [{
                "period": "P1",
                "scores": {"math": 90},
                "total": 90,
                "average": 90,
                "schoolRank": 4,
                "subjectRanks": {"math": 2},
                "status": "Tier A"
            }]
        }]"#;
        let students: Vec<StudentRecord> = serde_json::from_str(json).unwrap();
        let snapshot = &students[0].history[0];

        assert_eq!(snapshot.imported_rank(), Some(4));
        assert_eq!(snapshot.imported_subject_rank("math"), Some(2));
        assert_eq!(snapshot.imported_status(), Some("Tier A"));
        assert!(validate_records(&students, "inline").is_ok());
    }
}
