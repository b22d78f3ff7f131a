use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{ResponseRecord, SurveyNumber, UploadSource};

type Precedence<'a> = (
    u8,
    Option<DateTime<Utc>>,
    SurveyNumber,
    Option<UploadSource>,
    Option<&'a str>,
    Option<&'a str>,
);

/// Furthest progress first, then most recent write. An absent `updated_at`
/// sorts before any timestamp. The remaining fields only separate rows that
/// tie on both, so the winner never depends on input order.
fn precedence(record: &ResponseRecord) -> Precedence<'_> {
    (
        record.status.rank(),
        record.updated_at,
        record.survey_number,
        record.source,
        record.last_name.as_deref(),
        record.first_name.as_deref(),
    )
}

pub fn supersedes(candidate: &ResponseRecord, current: &ResponseRecord) -> bool {
    precedence(candidate) > precedence(current)
}

fn keep_best<K, I, F>(records: I, key: F) -> BTreeMap<K, ResponseRecord>
where
    K: Ord,
    I: IntoIterator<Item = ResponseRecord>,
    F: Fn(&ResponseRecord) -> K,
{
    let mut best: BTreeMap<K, ResponseRecord> = BTreeMap::new();

    for record in records {
        let slot = key(&record);
        let replace = best
            .get(&slot)
            .map_or(true, |existing| supersedes(&record, existing));
        if replace {
            best.insert(slot, record);
        }
    }

    best
}

/// One authoritative record per participant. Callers that need a
/// per-survey view filter by survey number first or use
/// [`reduce_per_survey`].
pub fn reduce<I>(records: I) -> BTreeMap<String, ResponseRecord>
where
    I: IntoIterator<Item = ResponseRecord>,
{
    keep_best(records, |record| record.participant_id.clone())
}

pub fn reduce_per_survey<I>(records: I) -> BTreeMap<(String, SurveyNumber), ResponseRecord>
where
    I: IntoIterator<Item = ResponseRecord>,
{
    keep_best(records, |record| {
        (record.participant_id.clone(), record.survey_number)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::strategies::arb_records;
    use crate::models::ResponseStatus;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(offset_hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap() + Duration::hours(offset_hours)
    }

    fn record(id: &str, status: ResponseStatus, updated_at: Option<DateTime<Utc>>) -> ResponseRecord {
        ResponseRecord::new(id, SurveyNumber::FIRST, status, updated_at)
    }

    #[test]
    fn completed_beats_earlier_not_started() {
        let records = vec![
            record("S1", ResponseStatus::NotStarted, Some(t(0))),
            record("S1", ResponseStatus::Completed, Some(t(5))),
        ];
        let reduced = reduce(records);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced["S1"].status, ResponseStatus::Completed);
    }

    #[test]
    fn higher_status_wins_even_when_older() {
        let records = vec![
            record("S1", ResponseStatus::Completed, Some(t(0))),
            record("S1", ResponseStatus::NotStarted, Some(t(10))),
        ];
        assert_eq!(reduce(records)["S1"].status, ResponseStatus::Completed);
    }

    #[test]
    fn equal_status_prefers_latest_update() {
        let records = vec![
            record("S2", ResponseStatus::InProgress, Some(t(0))),
            record("S2", ResponseStatus::InProgress, Some(t(1))),
        ];
        assert_eq!(reduce(records)["S2"].updated_at, Some(t(1)));
    }

    #[test]
    fn missing_timestamp_loses_ties() {
        let records = vec![
            record("S3", ResponseStatus::InProgress, Some(t(0))),
            record("S3", ResponseStatus::InProgress, None),
        ];
        assert_eq!(reduce(records)["S3"].updated_at, Some(t(0)));
    }

    #[test]
    fn unknown_status_ranks_below_not_started() {
        let records = vec![
            record("S4", ResponseStatus::Unknown, Some(t(9))),
            record("S4", ResponseStatus::NotStarted, Some(t(0))),
        ];
        assert_eq!(reduce(records)["S4"].status, ResponseStatus::NotStarted);
    }

    #[test]
    fn empty_input_reduces_to_empty_map() {
        assert!(reduce(Vec::new()).is_empty());
        assert!(reduce_per_survey(Vec::new()).is_empty());
    }

    #[test]
    fn per_survey_reduction_keeps_each_survey() {
        let records = vec![
            record("S1", ResponseStatus::Completed, Some(t(0))),
            ResponseRecord::new("S1", SurveyNumber::SECOND, ResponseStatus::NotStarted, Some(t(1))),
            ResponseRecord::new("S1", SurveyNumber::SECOND, ResponseStatus::InProgress, Some(t(2))),
        ];
        let reduced = reduce_per_survey(records);
        assert_eq!(reduced.len(), 2);
        assert_eq!(
            reduced[&("S1".to_string(), SurveyNumber::FIRST)].status,
            ResponseStatus::Completed
        );
        assert_eq!(
            reduced[&("S1".to_string(), SurveyNumber::SECOND)].status,
            ResponseStatus::InProgress
        );
    }

    #[test]
    fn supersedes_is_strict() {
        let a = record("S1", ResponseStatus::InProgress, Some(t(1)));
        assert!(!supersedes(&a, &a.clone()));
        let b = record("S1", ResponseStatus::InProgress, Some(t(2)));
        assert!(supersedes(&b, &a));
        assert!(!supersedes(&a, &b));
    }

    #[test]
    fn exact_ties_resolve_on_source_and_name() {
        let records = vec![
            record("S2", ResponseStatus::Completed, Some(t(1)))
                .with_source(UploadSource::Instructor),
            record("S2", ResponseStatus::Completed, Some(t(1)))
                .with_source(UploadSource::Student),
        ];
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(reduce(records)["S2"].source, Some(UploadSource::Student));
        assert_eq!(reduce(reversed)["S2"].source, Some(UploadSource::Student));
    }

    proptest! {
        #[test]
        fn result_is_independent_of_input_order(
            (records, shuffled) in arb_records(24)
                .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
        ) {
            prop_assert_eq!(reduce(shuffled.clone()), reduce(records.clone()));
            prop_assert_eq!(reduce_per_survey(shuffled), reduce_per_survey(records));
        }

        #[test]
        fn reducing_twice_changes_nothing(records in arb_records(24)) {
            let once = reduce(records);
            let twice = reduce(once.clone().into_values());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn winner_is_never_superseded(records in arb_records(24)) {
            let reduced = reduce(records.clone());
            for record in &records {
                let winner = &reduced[&record.participant_id];
                prop_assert!(!supersedes(record, winner));
            }
        }
    }
}
