use uuid::Uuid;

use crate::models::{Course, SurveyWindow};

/// A new course as entered by its instructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDraft {
    pub title: String,
    pub department: String,
    pub number_code: String,
    pub n_sections: i32,
    pub n_students: i32,
}

impl CourseDraft {
    /// Trims the text fields and rejects blank ones, zero sections or an
    /// empty class.
    pub fn validate(self) -> anyhow::Result<Self> {
        let draft = Self {
            title: required("title", &self.title)?,
            department: required("department", &self.department)?,
            number_code: required("number code", &self.number_code)?,
            n_sections: self.n_sections,
            n_students: self.n_students,
        };
        check_counts(Some(draft.n_sections), Some(draft.n_students))?;
        Ok(draft)
    }
}

/// Changes to an existing course; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseEdit {
    pub title: Option<String>,
    pub department: Option<String>,
    pub number_code: Option<String>,
    pub n_sections: Option<i32>,
    pub n_students: Option<i32>,
}

impl CourseEdit {
    pub fn validate(self) -> anyhow::Result<Self> {
        if self == Self::default() {
            anyhow::bail!("nothing to change");
        }

        let optional = |field: &str, value: Option<String>| {
            value.map(|value| required(field, &value)).transpose()
        };
        let edit = Self {
            title: optional("title", self.title)?,
            department: optional("department", self.department)?,
            number_code: optional("number code", self.number_code)?,
            n_sections: self.n_sections,
            n_students: self.n_students,
        };
        check_counts(edit.n_sections, edit.n_students)?;
        Ok(edit)
    }
}

fn required(field: &str, value: &str) -> anyhow::Result<String> {
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("course {field} must not be blank");
    }
    Ok(value.to_string())
}

fn check_counts(n_sections: Option<i32>, n_students: Option<i32>) -> anyhow::Result<()> {
    if let Some(sections) = n_sections.filter(|sections| *sections < 1) {
        anyhow::bail!("a course needs at least one section, got {sections}");
    }
    if let Some(students) = n_students.filter(|students| *students < 1) {
        anyhow::bail!("a course needs at least one student, got {students}");
    }
    Ok(())
}

/// New survey dates are accepted in any window state, so a closed survey
/// can be reopened or extended. Only a close before the open is refused.
pub fn validate_schedule(window: &SurveyWindow) -> anyhow::Result<()> {
    if window.is_inverted() {
        anyhow::bail!("close date must not be before the open date");
    }
    Ok(())
}

/// Courses may only be changed by the instructor who registered them.
pub fn ensure_owner(course: &Course, instructor_id: Uuid) -> anyhow::Result<()> {
    if course.user_id != instructor_id {
        anyhow::bail!(
            "course '{}' belongs to another instructor",
            course.short_id
        );
    }
    Ok(())
}
