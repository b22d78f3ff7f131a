use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::{ResponseRecord, ResponseStatus, SurveyNumber, UploadSource};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl RosterEntry {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            first_name: None,
            last_name: None,
        }
    }
}

/// Reads a roster upload. A file with a `student_id` header is read as CSV
/// with optional `first_name`/`last_name` columns; anything else is treated
/// as a bare list with the id in the first column of every line.
pub fn read_roster<R: Read>(reader: R) -> anyhow::Result<Vec<RosterEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().context("failed to read roster header")?.clone();
    let has_header = headers
        .iter()
        .any(|header| header.eq_ignore_ascii_case("student_id"));

    let mut entries = Vec::new();
    if has_header {
        // Serde field names are lowercase; accept `Student_ID` and friends.
        let lowered: csv::StringRecord = headers
            .iter()
            .map(|header| header.to_ascii_lowercase())
            .collect();
        reader.set_headers(lowered);

        for result in reader.deserialize::<RosterEntry>() {
            entries.push(result.context("invalid roster row")?);
        }
    } else {
        if let Some(first) = headers.get(0) {
            entries.push(RosterEntry::new(first));
        }
        for result in reader.records() {
            let record = result.context("invalid roster row")?;
            if let Some(id) = record.get(0) {
                entries.push(RosterEntry::new(id));
            }
        }
    }

    Ok(normalize_roster(entries))
}

/// Trims ids and names, drops blank ids and keeps the first entry for each id.
pub fn normalize_roster(entries: Vec<RosterEntry>) -> Vec<RosterEntry> {
    let mut seen = HashSet::new();
    let clean = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let student_id = entry.student_id.trim().to_string();
            if student_id.is_empty() || !seen.insert(student_id.clone()) {
                return None;
            }
            Some(RosterEntry {
                student_id,
                first_name: clean(entry.first_name),
                last_name: clean(entry.last_name),
            })
        })
        .collect()
}

/// Placeholder rows for every student on every survey, so untouched
/// students show up as not started.
pub fn roster_rows(entries: &[RosterEntry]) -> Vec<ResponseRecord> {
    SurveyNumber::ALL
        .iter()
        .flat_map(|survey| {
            entries.iter().map(move |entry| {
                ResponseRecord::new(
                    entry.student_id.clone(),
                    *survey,
                    ResponseStatus::NotStarted,
                    None,
                )
                .with_name(entry.first_name.clone(), entry.last_name.clone())
                .with_source(UploadSource::Instructor)
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedStudent {
    pub student_id: String,
    /// Every row for this student was uploaded by the instructor.
    pub can_delete: bool,
}

pub fn tracked_students(records: &[ResponseRecord]) -> Vec<TrackedStudent> {
    let mut students: BTreeMap<&str, bool> = BTreeMap::new();

    for record in records {
        let instructor_row = record.source == Some(UploadSource::Instructor);
        students
            .entry(record.participant_id.as_str())
            .and_modify(|can_delete| *can_delete &= instructor_row)
            .or_insert(instructor_row);
    }

    students
        .into_iter()
        .map(|(student_id, can_delete)| TrackedStudent {
            student_id: student_id.to_string(),
            can_delete,
        })
        .collect()
}
