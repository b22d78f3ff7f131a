use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ResponseRecord, ResponseStatus, SurveyNumber, SurveyWindow};
use crate::reducer;
use crate::window::{self, WindowAction, WindowState};

/// Completed student responses needed before a course's survey step counts
/// as satisfied.
pub const DEFAULT_MINIMUM_COMPLETED: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Live,
    /// The survey has not opened; show the open date rather than numbers.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationSummary {
    pub not_started: Vec<ResponseRecord>,
    pub in_progress: Vec<ResponseRecord>,
    pub completed: Vec<ResponseRecord>,
    pub completed_count: usize,
    pub minimum_completed: usize,
    pub meets_threshold: bool,
    pub window_state: WindowState,
    pub display_mode: DisplayMode,
}

impl ParticipationSummary {
    pub fn total(&self) -> usize {
        self.not_started.len() + self.in_progress.len() + self.completed.len()
    }
}

pub fn summarize(
    reduced: &BTreeMap<String, ResponseRecord>,
    minimum_completed: usize,
    window_state: WindowState,
) -> ParticipationSummary {
    let mut not_started = Vec::new();
    let mut in_progress = Vec::new();
    let mut completed = Vec::new();

    for record in reduced.values() {
        match record.status {
            ResponseStatus::Completed => completed.push(record.clone()),
            ResponseStatus::InProgress => in_progress.push(record.clone()),
            ResponseStatus::NotStarted | ResponseStatus::Unknown => {
                not_started.push(record.clone())
            }
        }
    }

    for bucket in [&mut not_started, &mut in_progress, &mut completed] {
        bucket.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
    }

    let completed_count = completed.len();
    let display_mode = if window_state.permits(WindowAction::ViewCounts) {
        DisplayMode::Live
    } else {
        DisplayMode::Pending
    };

    ParticipationSummary {
        not_started,
        in_progress,
        completed,
        completed_count,
        minimum_completed,
        meets_threshold: completed_count >= minimum_completed,
        window_state,
        display_mode,
    }
}

/// One row of the instructor's course dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyOverview {
    pub survey_number: SurveyNumber,
    pub window_state: WindowState,
    pub display_mode: DisplayMode,
    pub instructor_completed: bool,
    pub instructor_completed_at: Option<DateTime<Utc>>,
    pub students_completed: usize,
    pub minimum_completed: usize,
    pub meets_threshold: bool,
}

pub fn survey_overview(
    survey: SurveyNumber,
    window: Option<&SurveyWindow>,
    instructor_records: &[ResponseRecord],
    student_records: &[ResponseRecord],
    minimum_completed: usize,
    now: DateTime<Utc>,
) -> SurveyOverview {
    let window_state = window::evaluate(window, now);

    let instructor = reducer::reduce(
        instructor_records
            .iter()
            .filter(|record| record.survey_number == survey)
            .cloned(),
    );
    let instructor_completion = instructor
        .values()
        .find(|record| record.status == ResponseStatus::Completed);

    let students = reducer::reduce(
        student_records
            .iter()
            .filter(|record| record.survey_number == survey)
            .cloned(),
    );
    let summary = summarize(&students, minimum_completed, window_state);

    SurveyOverview {
        survey_number: survey,
        window_state,
        display_mode: summary.display_mode,
        instructor_completed: instructor_completion.is_some(),
        instructor_completed_at: instructor_completion.and_then(|record| record.updated_at),
        students_completed: summary.completed_count,
        minimum_completed,
        meets_threshold: summary.meets_threshold,
    }
}

/// Participants whose id or display name contains `query`, ignoring case.
/// A blank query matches everyone.
pub fn search(reduced: &BTreeMap<String, ResponseRecord>, query: &str) -> Vec<ResponseRecord> {
    let needle = query.trim().to_lowercase();

    reduced
        .values()
        .filter(|record| {
            needle.is_empty()
                || record.participant_id.to_lowercase().contains(&needle)
                || record.display_name().to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::strategies::arb_records;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, day, 0, 0, 0).unwrap()
    }

    fn record(id: &str, status: ResponseStatus) -> ResponseRecord {
        ResponseRecord::new(id, SurveyNumber::FIRST, status, Some(t(2)))
    }

    fn open() -> WindowState {
        WindowState::Open { closes_at: None }
    }

    fn fifteen_participants() -> BTreeMap<String, ResponseRecord> {
        let mut records = Vec::new();
        for index in 0..13 {
            records.push(record(&format!("S{index:02}"), ResponseStatus::Completed));
        }
        records.push(record("S13", ResponseStatus::InProgress));
        records.push(record("S14", ResponseStatus::NotStarted));
        reducer::reduce(records)
    }

    #[test]
    fn thirteen_of_fifteen_completed_meets_threshold() {
        let summary = summarize(&fifteen_participants(), 12, open());
        assert_eq!(summary.completed_count, 13);
        assert!(summary.meets_threshold);
        assert_eq!(summary.not_started.len(), 1);
        assert_eq!(summary.in_progress.len(), 1);
        assert_eq!(summary.completed.len(), 13);
        assert_eq!(summary.display_mode, DisplayMode::Live);
    }

    #[test]
    fn empty_input_has_zero_counts() {
        let summary = summarize(&BTreeMap::new(), DEFAULT_MINIMUM_COMPLETED, open());
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.completed_count, 0);
        assert!(!summary.meets_threshold);
        assert!(summarize(&BTreeMap::new(), 0, open()).meets_threshold);
    }

    #[test]
    fn buckets_partition_every_participant_once() {
        let mut records = vec![
            record("C", ResponseStatus::Completed),
            record("A", ResponseStatus::Unknown),
            record("B", ResponseStatus::InProgress),
            record("D", ResponseStatus::NotStarted),
        ];
        records.push(record("A", ResponseStatus::Unknown));
        let reduced = reducer::reduce(records);
        let summary = summarize(&reduced, 1, open());

        assert_eq!(summary.total(), reduced.len());
        let mut seen: Vec<&str> = summary
            .not_started
            .iter()
            .chain(&summary.in_progress)
            .chain(&summary.completed)
            .map(|record| record.participant_id.as_str())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn buckets_sort_by_participant_id() {
        let reduced = reducer::reduce(vec![
            record("S9", ResponseStatus::Completed),
            record("S10", ResponseStatus::Completed),
            record("S1", ResponseStatus::Completed),
        ]);
        let summary = summarize(&reduced, 12, open());
        let ids: Vec<&str> = summary
            .completed
            .iter()
            .map(|record| record.participant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["S1", "S10", "S9"]);
    }

    #[test]
    fn pending_windows_still_count() {
        let state = WindowState::NotYetOpen { opens_at: t(20) };
        let summary = summarize(&fifteen_participants(), 12, state);
        assert_eq!(summary.display_mode, DisplayMode::Pending);
        assert_eq!(summary.completed_count, 13);
        assert_eq!(summary.window_state, state);

        let unconfigured = summarize(&fifteen_participants(), 12, WindowState::Unconfigured);
        assert_eq!(unconfigured.display_mode, DisplayMode::Pending);
    }

    #[test]
    fn overview_reduces_each_survey_separately() {
        let window = SurveyWindow::new(SurveyNumber::FIRST, Some(t(1)), Some(t(30)));
        let students = vec![
            record("S1", ResponseStatus::NotStarted),
            record("S1", ResponseStatus::Completed),
            record("S2", ResponseStatus::Completed),
            ResponseRecord::new("S3", SurveyNumber::SECOND, ResponseStatus::Completed, None),
        ];
        let instructor = vec![ResponseRecord::new(
            "instructor-1",
            SurveyNumber::FIRST,
            ResponseStatus::Completed,
            Some(t(4)),
        )];

        let overview = survey_overview(
            SurveyNumber::FIRST,
            Some(&window),
            &instructor,
            &students,
            2,
            t(10),
        );
        assert_eq!(overview.students_completed, 2);
        assert!(overview.meets_threshold);
        assert!(overview.instructor_completed);
        assert_eq!(overview.instructor_completed_at, Some(t(4)));
        assert_eq!(overview.display_mode, DisplayMode::Live);

        let second = survey_overview(SurveyNumber::SECOND, None, &instructor, &students, 2, t(10));
        assert_eq!(second.window_state, WindowState::Unconfigured);
        assert_eq!(second.display_mode, DisplayMode::Pending);
        assert_eq!(second.students_completed, 1);
        assert!(!second.instructor_completed);
    }

    #[test]
    fn instructor_in_progress_is_not_completed() {
        let instructor = vec![ResponseRecord::new(
            "instructor-1",
            SurveyNumber::FIRST,
            ResponseStatus::InProgress,
            Some(t(4)),
        )];
        let overview = survey_overview(
            SurveyNumber::FIRST,
            None,
            &instructor,
            &[],
            DEFAULT_MINIMUM_COMPLETED,
            t(4) + Duration::days(1),
        );
        assert!(!overview.instructor_completed);
        assert_eq!(overview.instructor_completed_at, None);
    }

    #[test]
    fn search_matches_id_or_name_case_insensitively() {
        let reduced = reducer::reduce(vec![
            record("ab123", ResponseStatus::Completed)
                .with_name(Some("Avery".to_string()), Some("Lee".to_string())),
            record("cd456", ResponseStatus::InProgress)
                .with_name(Some("Jules".to_string()), Some("Moreno".to_string())),
            record("ef789", ResponseStatus::NotStarted),
        ]);

        let by_id: Vec<String> = search(&reduced, "AB1")
            .into_iter()
            .map(|record| record.participant_id)
            .collect();
        assert_eq!(by_id, vec!["ab123"]);

        let by_name: Vec<String> = search(&reduced, "jules mor")
            .into_iter()
            .map(|record| record.participant_id)
            .collect();
        assert_eq!(by_name, vec!["cd456"]);

        assert_eq!(search(&reduced, "  ").len(), 3);
        assert!(search(&reduced, "zz").is_empty());
    }

    proptest! {
        #[test]
        fn threshold_matches_completed_count(
            records in arb_records(40),
            minimum in 0usize..30,
        ) {
            let reduced = reducer::reduce(records);
            let completed = reduced
                .values()
                .filter(|record| record.status == ResponseStatus::Completed)
                .count();
            let summary = summarize(&reduced, minimum, open());
            prop_assert_eq!(summary.completed_count, completed);
            prop_assert_eq!(summary.meets_threshold, completed >= minimum);
        }

        #[test]
        fn buckets_partition_the_reduced_participants(records in arb_records(40)) {
            let reduced = reducer::reduce(records);
            let summary = summarize(&reduced, DEFAULT_MINIMUM_COMPLETED, open());
            prop_assert_eq!(summary.total(), reduced.len());

            let mut seen: Vec<&str> = summary
                .not_started
                .iter()
                .chain(&summary.in_progress)
                .chain(&summary.completed)
                .map(|record| record.participant_id.as_str())
                .collect();
            seen.sort_unstable();
            let expected: Vec<&str> = reduced.keys().map(String::as_str).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
