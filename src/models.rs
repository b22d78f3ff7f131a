use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Which of the two course surveys a window or response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SurveyNumber(u8);

impl SurveyNumber {
    pub const FIRST: SurveyNumber = SurveyNumber(1);
    pub const SECOND: SurveyNumber = SurveyNumber(2);
    pub const ALL: [SurveyNumber; 2] = [Self::FIRST, Self::SECOND];

    pub fn new(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::FIRST),
            2 => Some(Self::SECOND),
            _ => None,
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SurveyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResponseStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Unknown,
}

impl ResponseStatus {
    /// Lenient parse of the status text stored by the survey platform.
    /// Anything unrecognised becomes `Unknown`.
    pub fn parse(value: &str) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "notstarted" => Self::NotStarted,
            "inprogress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Unknown,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::NotStarted => 1,
            Self::InProgress => 2,
            Self::Completed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a student response row came from. Only instructor-uploaded rows
/// may be removed from a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UploadSource {
    Instructor,
    Student,
}

impl UploadSource {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("instructor") {
            Self::Instructor
        } else {
            Self::Student
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => "Instructor",
            Self::Student => "Student",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyWindow {
    pub survey_number: SurveyNumber,
    pub open_at: Option<DateTime<Utc>>,
    pub close_at: Option<DateTime<Utc>>,
}

impl SurveyWindow {
    pub fn new(
        survey_number: SurveyNumber,
        open_at: Option<DateTime<Utc>>,
        close_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            survey_number,
            open_at,
            close_at,
        }
    }

    /// True when both ends are set and the close precedes the open.
    pub fn is_inverted(&self) -> bool {
        matches!((self.open_at, self.close_at), (Some(open), Some(close)) if close < open)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseRecord {
    pub participant_id: String,
    pub survey_number: SurveyNumber,
    pub status: ResponseStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub source: Option<UploadSource>,
}

impl ResponseRecord {
    pub fn new(
        participant_id: impl Into<String>,
        survey_number: SurveyNumber,
        status: ResponseStatus,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            survey_number,
            status,
            updated_at,
            first_name: None,
            last_name: None,
            source: None,
        }
    }

    pub fn with_name(mut self, first_name: Option<String>, last_name: Option<String>) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }

    pub fn with_source(mut self, source: UploadSource) -> Self {
        self.source = Some(source);
        self
    }

    /// `first last`, trimmed; empty when neither name is known.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub user_id: Uuid,
    pub short_id: String,
    pub title: String,
    pub department: String,
    pub number_code: String,
}

impl Course {
    pub fn label(&self) -> String {
        format!("{} ({} {})", self.title, self.department, self.number_code)
    }
}

/// Row of the `surveys` table: the external survey form and its base link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyForm {
    pub id: Uuid,
    pub link: String,
}

/// Parses the timestamp formats that reach us from forms and imports.
/// Returns `None` for anything unparsable so callers can treat it as absent.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

pub fn display_date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}


/// Generators for property tests over response records. Small pools of ids,
/// names and timestamps make duplicate participants and exact ties common.
#[cfg(test)]
pub(crate) mod strategies {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    pub fn arb_status() -> impl Strategy<Value = ResponseStatus> {
        prop_oneof![
            Just(ResponseStatus::NotStarted),
            Just(ResponseStatus::InProgress),
            Just(ResponseStatus::Completed),
            Just(ResponseStatus::Unknown),
        ]
    }

    pub fn arb_record() -> impl Strategy<Value = ResponseRecord> {
        let base = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        (
            0u8..6,
            prop::bool::ANY,
            arb_status(),
            prop::option::of(0i64..4),
            prop::option::of(prop::sample::select(vec!["Avery", "Jules"])),
            prop::option::of(prop::sample::select(vec!["Lee", "Moreno"])),
            prop::option::of(prop_oneof![
                Just(UploadSource::Instructor),
                Just(UploadSource::Student)
            ]),
        )
            .prop_map(move |(id, second, status, hours, first, last, source)| {
                let survey = if second {
                    SurveyNumber::SECOND
                } else {
                    SurveyNumber::FIRST
                };
                ResponseRecord {
                    participant_id: format!("S{id}"),
                    survey_number: survey,
                    status,
                    updated_at: hours.map(|hours| base + Duration::hours(hours)),
                    first_name: first.map(str::to_string),
                    last_name: last.map(str::to_string),
                    source,
                }
            })
    }

    pub fn arb_records(max_count: usize) -> impl Strategy<Value = Vec<ResponseRecord>> {
        prop::collection::vec(arb_record(), 0..=max_count)
    }
}
