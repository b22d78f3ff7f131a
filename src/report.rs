use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{display_date, Course, ResponseRecord, ResponseStatus, SurveyNumber, SurveyWindow};
use crate::participation::{DisplayMode, ParticipationSummary, SurveyOverview};
use crate::reducer;
use crate::roster::TrackedStudent;
use crate::window::{self, WindowAction, WindowState};

/// Links for one survey of one course; `None` when the survey form is not
/// registered.
#[derive(Debug, Clone, Default)]
pub struct SurveyLinks {
    pub instructor: Option<String>,
    pub student: Option<String>,
}

pub fn build_course_overview(courses: &[(Course, Vec<SurveyOverview>)]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# My Courses and Surveys");

    if courses.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No courses registered yet.");
        return output;
    }

    for (course, overviews) in courses {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {} [{}]", course.label(), course.short_id);
        let _ = writeln!(output, "| Survey | Instructor Completed? | Students Completed |");
        let _ = writeln!(output, "|---|---|---|");

        for overview in overviews {
            let (instructor, students) = match overview.display_mode {
                DisplayMode::Pending => {
                    let message = overview.window_state.message();
                    (message.clone(), message)
                }
                DisplayMode::Live => (
                    if overview.instructor_completed { "Yes" } else { "No" }.to_string(),
                    threshold_cell(overview),
                ),
            };
            let _ = writeln!(
                output,
                "| Survey {} | {} | {} |",
                overview.survey_number, instructor, students
            );
        }
    }

    output
}

fn threshold_cell(overview: &SurveyOverview) -> String {
    if overview.meets_threshold {
        format!("{} (target met)", overview.students_completed)
    } else {
        format!(
            "{} (below {})",
            overview.students_completed, overview.minimum_completed
        )
    }
}

pub fn instructor_survey_line(
    state: WindowState,
    completion: Option<&ResponseRecord>,
    link: Option<&str>,
) -> String {
    if let WindowState::NotYetOpen { opens_at } = state {
        return format!(
            "Please come back on {} to complete your survey",
            display_date(opens_at)
        );
    }

    if let Some(record) = completion {
        return match record.updated_at {
            Some(at) => format!("You have already completed this survey on {}", display_date(at)),
            None => "You have already completed this survey".to_string(),
        };
    }

    match state {
        WindowState::Closed { closed_at } => {
            format!("Survey closed on {}", display_date(closed_at))
        }
        WindowState::Unconfigured => "Survey dates not set".to_string(),
        _ if state.permits(WindowAction::TakeSurvey) => link
            .map(|link| format!("Take the instructor survey: {link}"))
            .unwrap_or_else(|| "Not available".to_string()),
        _ => "Not available".to_string(),
    }
}

/// Everything the course page shows for one survey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyDetail {
    pub survey_n: SurveyNumber,
    pub window: Option<SurveyWindow>,
    pub schedule: String,
    pub state: WindowState,
    pub inverted: bool,
    pub instructor_completed: bool,
    pub instructor_completed_at: Option<DateTime<Utc>>,
    pub instructor_survey: String,
    pub instructor_link: Option<String>,
    pub student_link: Option<String>,
}

pub fn survey_details(
    windows: &[SurveyWindow],
    instructor_records: &[ResponseRecord],
    links: &[(SurveyNumber, SurveyLinks)],
    now: DateTime<Utc>,
) -> Vec<SurveyDetail> {
    let instructor = reducer::reduce_per_survey(instructor_records.iter().cloned());

    SurveyNumber::ALL
        .into_iter()
        .map(|survey| {
            let configured = window::window_for(windows, survey);
            let state = window::evaluate(configured, now);
            let completion = instructor.values().find(|record| {
                record.survey_number == survey && record.status == ResponseStatus::Completed
            });
            let survey_links = links
                .iter()
                .find(|(number, _)| *number == survey)
                .map(|(_, links)| links.clone())
                .unwrap_or_default();

            SurveyDetail {
                survey_n: survey,
                window: configured.cloned(),
                schedule: window::schedule_text(configured),
                state,
                inverted: configured.is_some_and(SurveyWindow::is_inverted),
                instructor_completed: completion.is_some(),
                instructor_completed_at: completion.and_then(|record| record.updated_at),
                instructor_survey: instructor_survey_line(
                    state,
                    completion,
                    survey_links.instructor.as_deref(),
                ),
                instructor_link: survey_links.instructor,
                student_link: survey_links.student,
            }
        })
        .collect()
}

pub fn build_course_detail(course: &Course, details: &[SurveyDetail]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", course.label());
    let _ = writeln!(output, "Short id: {}", course.short_id);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Survey Dates & Links");

    for detail in details {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Survey {}", detail.survey_n);
        let _ = writeln!(output, "- Scheduled: {}", detail.schedule);
        let _ = writeln!(output, "- Status: {}", detail.state.message());
        if detail.inverted {
            let _ = writeln!(output, "- Warning: close date is before open date");
        }
        let _ = writeln!(output, "- Instructor survey: {}", detail.instructor_survey);
        let _ = writeln!(
            output,
            "- Student survey link: {}",
            detail.student_link.as_deref().unwrap_or("Not available")
        );
    }

    output
}

fn record_line(record: &ResponseRecord, with_date: bool) -> String {
    let name = record.display_name();
    let mut line = if name.is_empty() {
        format!("- {}", record.participant_id)
    } else {
        format!("- {} ({})", record.participant_id, name)
    };
    if with_date {
        let date = record
            .updated_at
            .map(display_date)
            .unwrap_or_else(|| "N/A".to_string());
        let _ = write!(line, " on {date}");
    }
    line
}

pub fn build_participation_report(
    course: &Course,
    survey: SurveyNumber,
    summary: &ParticipationSummary,
) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Participation Report for {}: Survey {}",
        course.label(),
        survey
    );
    let _ = writeln!(output, "Window: {}", summary.window_state.message());

    if summary.display_mode == DisplayMode::Pending {
        let _ = writeln!(
            output,
            "Responses are not being collected yet; {} participants on the roster.",
            summary.total()
        );
        return output;
    }

    let verdict = if summary.meets_threshold { "met" } else { "not met" };
    let _ = writeln!(
        output,
        "Completed {} of {} participants (target {} {}).",
        summary.completed_count,
        summary.total(),
        summary.minimum_completed,
        verdict
    );

    let sections: [(&str, &[ResponseRecord], bool); 3] = [
        ("Completed", &summary.completed, true),
        ("In Progress", &summary.in_progress, true),
        ("Not Started", &summary.not_started, false),
    ];

    for (title, records, with_date) in sections {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {} ({})", title, records.len());
        if records.is_empty() {
            let _ = writeln!(output, "No student responses with status \"{title}\".");
            continue;
        }
        for record in records {
            let _ = writeln!(output, "{}", record_line(record, with_date));
        }
    }

    output
}

pub fn build_search_results(course: &Course, query: &str, results: &[ResponseRecord]) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "# Search Results for \"{}\" in {} (All Surveys)",
        query.trim(),
        course.label()
    );

    if results.is_empty() {
        let _ = writeln!(output, "No students matched.");
        return output;
    }

    for record in results {
        let _ = writeln!(
            output,
            "{} [Survey {}: {}]",
            record_line(record, true),
            record.survey_number,
            record.status
        );
    }

    output
}

pub fn build_roster(course: &Course, tracked: &[TrackedStudent]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Tracked Students for {} ({})", course.label(), tracked.len());

    for student in tracked {
        let marker = if student.can_delete {
            "removable"
        } else {
            "has student responses"
        };
        let _ = writeln!(output, "- {} ({})", student.student_id, marker);
    }

    output
}
