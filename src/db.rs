use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::course::{self, CourseDraft, CourseEdit};
use crate::models::{
    Course, ResponseRecord, ResponseStatus, SurveyForm, SurveyNumber, SurveyWindow, UploadSource,
};

/// Decodes a nullable timestamp column, treating undecodable values as absent.
fn timestamp_column(row: &PgRow, column: &str) -> Option<DateTime<Utc>> {
    match row.try_get::<Option<DateTime<Utc>>, _>(column) {
        Ok(value) => value,
        Err(err) => {
            warn!(column, error = %err, "undecodable timestamp treated as absent");
            None
        }
    }
}

fn survey_number_column(row: &PgRow) -> Option<SurveyNumber> {
    let raw: i32 = row.try_get("survey_n").ok()?;
    let survey = SurveyNumber::new(i64::from(raw));
    if survey.is_none() {
        warn!(survey_n = raw, "skipping row with unknown survey number");
    }
    survey
}

fn response_from_row(row: &PgRow, participant_column: &str) -> Option<ResponseRecord> {
    let survey = survey_number_column(row)?;
    let participant_id: String = match row.try_get::<String, _>(participant_column) {
        Ok(value) => value,
        Err(err) => {
            warn!(participant_column, error = %err, "skipping row without participant id");
            return None;
        }
    };

    let status_text = row.try_get::<Option<String>, _>("status").ok().flatten();
    let status = status_text
        .as_deref()
        .map(ResponseStatus::parse)
        .unwrap_or(ResponseStatus::Unknown);
    if status == ResponseStatus::Unknown {
        debug!(%participant_id, status = ?status_text, "unrecognised response status");
    }

    let mut record = ResponseRecord::new(
        participant_id,
        survey,
        status,
        timestamp_column(row, "updated_at"),
    )
    .with_name(
        row.try_get::<Option<String>, _>("first_name").ok().flatten(),
        row.try_get::<Option<String>, _>("last_name").ok().flatten(),
    );

    if let Ok(Some(source)) = row.try_get::<Option<String>, _>("upload_source") {
        record = record.with_source(UploadSource::parse(&source));
    }

    Some(record)
}

fn course_from_row(row: &PgRow) -> Course {
    Course {
        id: row.get("id"),
        user_id: row.get("user_id"),
        short_id: row.get("short_id"),
        title: row.get("title"),
        department: row
            .try_get::<Option<String>, _>("department")
            .ok()
            .flatten()
            .unwrap_or_default(),
        number_code: row
            .try_get::<Option<String>, _>("number_code")
            .ok()
            .flatten()
            .unwrap_or_default(),
    }
}

const COURSE_COLUMNS: &str = "id, user_id, short_id, title, department, number_code";

pub async fn fetch_courses(pool: &PgPool, instructor_id: Uuid) -> anyhow::Result<Vec<Course>> {
    let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = $1 ORDER BY title");
    let rows = sqlx::query(&query)
        .bind(instructor_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch courses")?;

    debug!(%instructor_id, count = rows.len(), "fetched courses");
    Ok(rows.iter().map(course_from_row).collect())
}

pub async fn fetch_course(pool: &PgPool, short_id: &str) -> anyhow::Result<Course> {
    let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE short_id = $1");
    let row = sqlx::query(&query)
        .bind(short_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch course")?;

    match row {
        Some(row) => Ok(course_from_row(&row)),
        None => anyhow::bail!("course '{short_id}' not found"),
    }
}

pub async fn fetch_windows(pool: &PgPool, course_id: Uuid) -> anyhow::Result<Vec<SurveyWindow>> {
    let rows = sqlx::query(
        "SELECT survey_n, open_at, close_at FROM course_survey_windows WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch survey windows")?;

    let mut windows = Vec::new();
    for row in rows {
        let Some(survey) = survey_number_column(&row) else {
            continue;
        };
        let window = SurveyWindow::new(
            survey,
            timestamp_column(&row, "open_at"),
            timestamp_column(&row, "close_at"),
        );
        if window.is_inverted() {
            warn!(%course_id, survey_n = %survey, "survey window closes before it opens");
        }
        windows.push(window);
    }

    Ok(windows)
}

pub async fn upsert_window(
    pool: &PgPool,
    course_id: Uuid,
    survey_id: Option<Uuid>,
    window: &SurveyWindow,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_survey_windows (course_id, survey_n, open_at, close_at, survey_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (course_id, survey_n) DO UPDATE
        SET open_at = EXCLUDED.open_at, close_at = EXCLUDED.close_at
        "#,
    )
    .bind(course_id)
    .bind(i32::from(window.survey_number.get()))
    .bind(window.open_at)
    .bind(window.close_at)
    .bind(survey_id)
    .execute(pool)
    .await
    .context("failed to save survey window")?;

    info!(%course_id, survey_n = %window.survey_number, "survey window saved");
    Ok(())
}

/// Student rows for a course, optionally limited to one survey.
pub async fn fetch_student_responses(
    pool: &PgPool,
    course_id: Uuid,
    survey: Option<SurveyNumber>,
) -> anyhow::Result<Vec<ResponseRecord>> {
    let mut query = String::from(
        "SELECT student_id, survey_n, status, first_name, last_name, upload_source, updated_at \
         FROM student_course_survey_responses \
         WHERE course_id = $1",
    );
    if survey.is_some() {
        query.push_str(" AND survey_n = $2");
    }

    let mut rows = sqlx::query(&query).bind(course_id);
    if let Some(survey) = survey {
        rows = rows.bind(i32::from(survey.get()));
    }

    let records: Vec<ResponseRecord> = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch student responses")?
        .iter()
        .filter_map(|row| response_from_row(row, "student_id"))
        .collect();

    debug!(%course_id, count = records.len(), "fetched student responses");
    Ok(records)
}

pub async fn fetch_instructor_responses(
    pool: &PgPool,
    course_id: Uuid,
) -> anyhow::Result<Vec<ResponseRecord>> {
    let rows = sqlx::query(
        "SELECT instructor_id::text AS instructor_id, survey_n, status, updated_at \
         FROM instructor_course_survey_responses \
         WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch instructor responses")?;

    Ok(rows
        .iter()
        .filter_map(|row| response_from_row(row, "instructor_id"))
        .collect())
}

pub async fn fetch_survey_form(pool: &PgPool, name: &str) -> anyhow::Result<Option<SurveyForm>> {
    let row = sqlx::query("SELECT id, link FROM surveys WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch survey '{name}'"))?;

    if row.is_none() {
        warn!(survey = name, "survey form not registered");
    }

    Ok(row.map(|row| SurveyForm {
        id: row.get("id"),
        link: row.get("link"),
    }))
}

/// Inserts roster placeholder rows in one transaction.
pub async fn insert_roster(
    pool: &PgPool,
    course_id: Uuid,
    survey_id: Uuid,
    rows: &[ResponseRecord],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;
    let mut inserted = 0u64;

    for row in rows {
        let result = sqlx::query(
            r#"
            INSERT INTO student_course_survey_responses
            (student_id, course_id, survey_id, survey_n, status, first_name, last_name, upload_source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&row.participant_id)
        .bind(course_id)
        .bind(survey_id)
        .bind(i32::from(row.survey_number.get()))
        .bind(row.status.as_str())
        .bind(row.first_name.as_deref())
        .bind(row.last_name.as_deref())
        .bind(row.source.map(UploadSource::as_str))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert roster row for {}", row.participant_id))?;

        inserted += result.rows_affected();
    }

    tx.commit().await.context("failed to commit roster upload")?;
    info!(%course_id, inserted, "roster uploaded");
    Ok(inserted)
}

/// Deletes instructor-uploaded rows for the given students. Rows the
/// students created themselves are never touched.
pub async fn delete_instructor_students(
    pool: &PgPool,
    course_id: Uuid,
    student_ids: &[String],
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM student_course_survey_responses
        WHERE course_id = $1 AND upload_source = $2 AND student_id = ANY($3)
        "#,
    )
    .bind(course_id)
    .bind(UploadSource::Instructor.as_str())
    .bind(student_ids)
    .execute(pool)
    .await
    .context("failed to delete students")?;

    info!(%course_id, deleted = result.rows_affected(), "removed roster rows");
    Ok(result.rows_affected())
}

/// Registers a course. The backend generates its `short_id`.
pub async fn insert_course(
    pool: &PgPool,
    instructor_id: Uuid,
    draft: &CourseDraft,
) -> anyhow::Result<Course> {
    let query = format!(
        "INSERT INTO courses (id, user_id, title, department, number_code, n_sections, n_students) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {COURSE_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(instructor_id)
        .bind(&draft.title)
        .bind(&draft.department)
        .bind(&draft.number_code)
        .bind(draft.n_sections)
        .bind(draft.n_students)
        .fetch_one(pool)
        .await
        .context("failed to add course")?;

    let course = course_from_row(&row);
    info!(%instructor_id, short_id = %course.short_id, "course added");
    Ok(course)
}

pub async fn update_course(
    pool: &PgPool,
    course_id: Uuid,
    edit: &CourseEdit,
) -> anyhow::Result<Course> {
    let query = format!(
        "UPDATE courses SET \
         title = COALESCE($2, title), \
         department = COALESCE($3, department), \
         number_code = COALESCE($4, number_code), \
         n_sections = COALESCE($5, n_sections), \
         n_students = COALESCE($6, n_students) \
         WHERE id = $1 \
         RETURNING {COURSE_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(course_id)
        .bind(edit.title.as_deref())
        .bind(edit.department.as_deref())
        .bind(edit.number_code.as_deref())
        .bind(edit.n_sections)
        .bind(edit.n_students)
        .fetch_one(pool)
        .await
        .context("failed to update course")?;

    let course = course_from_row(&row);
    info!(%course_id, short_id = %course.short_id, "course updated");
    Ok(course)
}

pub async fn delete_course(pool: &PgPool, course_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(course_id)
        .execute(pool)
        .await
        .context("failed to delete course")?;

    info!(%course_id, "course deleted");
    Ok(result.rows_affected())
}

/// Demo course for `instructor_id` with one open and one upcoming survey,
/// a preloaded roster and a mix of submissions over it.
pub async fn seed(pool: &PgPool, instructor_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Course> {
    let short_id = "psy301-demo";
    let row = sqlx::query(
        r#"
        INSERT INTO courses (id, user_id, short_id, title, department, number_code)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (short_id) DO UPDATE
        SET title = EXCLUDED.title
        RETURNING id, user_id, short_id, title, department, number_code
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(instructor_id)
    .bind(short_id)
    .bind("Introduction to Psychology")
    .bind("PSY")
    .bind("301")
    .fetch_one(pool)
    .await
    .context("failed to seed course")?;
    let course = course_from_row(&row);
    course::ensure_owner(&course, instructor_id)?;

    sqlx::query("DELETE FROM student_course_survey_responses WHERE course_id = $1")
        .bind(course.id)
        .execute(pool)
        .await
        .context("failed to clear seeded responses")?;

    let windows = [
        SurveyWindow::new(
            SurveyNumber::FIRST,
            Some(now - Duration::days(14)),
            Some(now + Duration::days(14)),
        ),
        SurveyWindow::new(
            SurveyNumber::SECOND,
            Some(now + Duration::days(60)),
            Some(now + Duration::days(90)),
        ),
    ];
    for window in &windows {
        upsert_window(pool, course.id, None, window).await?;
    }

    let roster: Vec<ResponseRecord> = (1..=15)
        .flat_map(|index| {
            SurveyNumber::ALL.into_iter().map(move |survey| {
                ResponseRecord::new(
                    format!("eid{index:03}"),
                    survey,
                    ResponseStatus::NotStarted,
                    None,
                )
                .with_source(UploadSource::Instructor)
            })
        })
        .collect();

    let submissions: Vec<(String, &str, i64)> = (1..=13)
        .map(|index| (format!("eid{index:03}"), "Completed", index))
        .chain([("eid014".to_string(), "In Progress", 2)])
        .chain([("eid099".to_string(), "Completed", 1)])
        .collect();

    for record in &roster {
        sqlx::query(
            r#"
            INSERT INTO student_course_survey_responses
            (student_id, course_id, survey_n, status, upload_source, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.participant_id)
        .bind(course.id)
        .bind(i32::from(record.survey_number.get()))
        .bind(record.status.as_str())
        .bind(UploadSource::Instructor.as_str())
        .bind(now - Duration::days(20))
        .execute(pool)
        .await
        .context("failed to seed roster")?;
    }

    for (student_id, status, days_ago) in submissions {
        sqlx::query(
            r#"
            INSERT INTO student_course_survey_responses
            (student_id, course_id, survey_n, status, upload_source, updated_at)
            VALUES ($1, $2, 1, $3, $4, $5)
            "#,
        )
        .bind(&student_id)
        .bind(course.id)
        .bind(status)
        .bind(UploadSource::Student.as_str())
        .bind(now - Duration::days(days_ago))
        .execute(pool)
        .await
        .context("failed to seed submissions")?;
    }

    info!(short_id, "seed data inserted");
    Ok(course)
}
