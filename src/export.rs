use std::io;

use crate::models::{PeriodRow, ProgressRow, SubjectSet, UNRANKED};

pub fn write_progress_csv<W: io::Write>(writer: W, rows: &[ProgressRow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a period snapshot with one column per subject. Unranked students
/// get an empty rank cell.
pub fn write_period_csv<W: io::Write>(
    writer: W,
    rows: &[PeriodRow],
    subjects: &SubjectSet,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = vec!["rank", "name", "class", "total", "average", "status"];
    header.extend(subjects.iter());
    writer.write_record(&header)?;

    for row in rows.iter().filter(|row| row.present) {
        let rank = if row.school_rank == UNRANKED {
            String::new()
        } else {
            row.school_rank.to_string()
        };
        let mut record = vec![
            rank,
            row.name.clone(),
            row.class_name.clone(),
            row.total.to_string(),
            row.average.to_string(),
            row.status.clone().unwrap_or_default(),
        ];
        record.extend(
            subjects
                .iter()
                .map(|subject| row.scores.get(subject).map(f64::to_string).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
