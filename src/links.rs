use uuid::Uuid;

use crate::models::SurveyNumber;

/// Builds the participant-facing link for a survey form. The survey
/// platform reads the identifiers back out of the query string.
pub fn survey_link(
    base: &str,
    survey_id: Uuid,
    survey: SurveyNumber,
    instructor_id: Option<Uuid>,
    course_id: Option<Uuid>,
) -> String {
    let instructor = instructor_id
        .map(|id| format!("instructor_id={id}&"))
        .unwrap_or_default();
    let course = course_id
        .map(|id| format!("&course_id={id}"))
        .unwrap_or_default();

    format!("{base}?{instructor}survey_id={survey_id}{course}&survey_n={survey}")
}
