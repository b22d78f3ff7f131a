use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

mod clock;
mod config;
mod course;
mod db;
mod links;
mod models;
mod participation;
mod reducer;
mod report;
mod roster;
mod telemetry;
mod window;

use clock::{Clock, FixedClock, SystemClock};
use config::AppConfig;
use course::{CourseDraft, CourseEdit};
use models::{parse_timestamp, Course, SurveyNumber, SurveyWindow};
use report::SurveyLinks;
use window::WindowState;

#[derive(Parser)]
#[command(name = "course-survey-tracker")]
#[command(about = "Course survey scheduling and participation tracking for instructors", long_about = None)]
struct Cli {
    /// Evaluate survey windows as of this instant instead of now (RFC 3339)
    #[arg(long, global = true, value_parser = parse_instant)]
    at: Option<chrono::DateTime<chrono::Utc>>,
    /// Completed responses required to meet the participation target
    #[arg(long, global = true)]
    min_completed: Option<usize>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a demo course with survey windows and responses
    Seed {
        #[arg(long)]
        instructor: Uuid,
    },
    /// Register a new course
    AddCourse {
        #[arg(long)]
        instructor: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        number_code: String,
        #[arg(long, default_value_t = 1)]
        sections: i32,
        #[arg(long)]
        students: i32,
    },
    /// Change the details of a registered course
    EditCourse {
        #[arg(long)]
        short_id: String,
        #[arg(long)]
        instructor: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        number_code: Option<String>,
        #[arg(long)]
        sections: Option<i32>,
        #[arg(long)]
        students: Option<i32>,
    },
    /// Show survey progress for every course an instructor owns
    Courses {
        #[arg(long)]
        instructor: Uuid,
    },
    /// Show survey dates and links for one course
    Course {
        #[arg(long)]
        short_id: String,
    },
    /// Schedule the open and close dates of a survey
    SetDates {
        #[arg(long)]
        short_id: String,
        #[arg(long, value_parser = parse_survey)]
        survey: SurveyNumber,
        #[arg(long, value_parser = parse_instant)]
        open: chrono::DateTime<chrono::Utc>,
        /// Leave unset for an open-ended survey
        #[arg(long, value_parser = parse_instant)]
        close: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Preload student ids so untouched students show as not started
    UploadRoster {
        #[arg(long)]
        short_id: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// List tracked students and whether they can be removed
    Roster {
        #[arg(long)]
        short_id: String,
    },
    /// Remove instructor-uploaded students
    #[command(group(
        ArgGroup::new("target")
            .args(["student_id", "all"])
            .required(true)
            .multiple(false)
    ))]
    RemoveStudents {
        #[arg(long)]
        short_id: String,
        #[arg(long)]
        student_id: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Participation report for one survey
    Participation {
        #[arg(long)]
        short_id: String,
        #[arg(long, value_parser = parse_survey)]
        survey: SurveyNumber,
    },
    /// Find students by id or name across both surveys
    Search {
        #[arg(long)]
        short_id: String,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Write a markdown participation report
    Report {
        #[arg(long)]
        short_id: String,
        #[arg(long, value_parser = parse_survey)]
        survey: SurveyNumber,
        #[arg(long, default_value = "participation.md")]
        out: PathBuf,
    },
    /// Delete a course and everything recorded for it
    DeleteCourse {
        #[arg(long)]
        short_id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn parse_instant(value: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    parse_timestamp(value).ok_or_else(|| format!("unrecognised timestamp '{value}'"))
}

fn parse_survey(value: &str) -> Result<SurveyNumber, String> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(SurveyNumber::new)
        .ok_or_else(|| format!("survey must be 1 or 2, got '{value}'"))
}

/// What every command needs besides its own arguments.
struct App<'a> {
    pool: &'a PgPool,
    config: &'a AppConfig,
    clock: &'a dyn Clock,
    minimum_completed: usize,
    json: bool,
}

impl App<'_> {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let clock: Box<dyn Clock> = match cli.at {
        Some(instant) => Box::new(FixedClock(instant)),
        None => Box::new(SystemClock),
    };
    let app = App {
        pool: &pool,
        config: &config,
        clock: clock.as_ref(),
        minimum_completed: cli.min_completed.unwrap_or(config.minimum_completed),
        json: cli.json,
    };

    match cli.command {
        Commands::Seed { instructor } => {
            let course = db::seed(app.pool, instructor, app.clock.now()).await?;
            println!("Seed data inserted for {} [{}].", course.label(), course.short_id);
        }
        Commands::AddCourse {
            instructor,
            title,
            department,
            number_code,
            sections,
            students,
        } => {
            let draft = CourseDraft {
                title,
                department,
                number_code,
                n_sections: sections,
                n_students: students,
            }
            .validate()?;
            let course = db::insert_course(app.pool, instructor, &draft).await?;
            app.emit(&course, || {
                format!(
                    "Added {} [{}]. Next: set-dates --short-id {}\n",
                    course.label(),
                    course.short_id,
                    course.short_id
                )
            })?;
        }
        Commands::EditCourse {
            short_id,
            instructor,
            title,
            department,
            number_code,
            sections,
            students,
        } => {
            let edit = CourseEdit {
                title,
                department,
                number_code,
                n_sections: sections,
                n_students: students,
            }
            .validate()?;
            let course = db::fetch_course(app.pool, &short_id).await?;
            course::ensure_owner(&course, instructor)?;
            let course = db::update_course(app.pool, course.id, &edit).await?;
            app.emit(&course, || format!("Updated {} [{}].\n", course.label(), course.short_id))?;
        }
        Commands::Courses { instructor } => show_courses(&app, instructor).await?,
        Commands::Course { short_id } => show_course(&app, &short_id).await?,
        Commands::SetDates {
            short_id,
            survey,
            open,
            close,
        } => set_dates(&app, &short_id, SurveyWindow::new(survey, Some(open), close)).await?,
        Commands::UploadRoster { short_id, csv } => upload_roster(&app, &short_id, &csv).await?,
        Commands::Roster { short_id } => {
            let course = db::fetch_course(app.pool, &short_id).await?;
            let rows = db::fetch_student_responses(app.pool, course.id, None).await?;
            let tracked = roster::tracked_students(&rows);
            app.emit(&tracked, || report::build_roster(&course, &tracked))?;
        }
        Commands::RemoveStudents {
            short_id,
            student_id,
            all,
        } => remove_students(&app, &short_id, student_id, all).await?,
        Commands::Participation { short_id, survey } => {
            let (course, summary) = participation_for(&app, &short_id, survey).await?;
            app.emit(&summary, || {
                report::build_participation_report(&course, survey, &summary)
            })?;
        }
        Commands::Search { short_id, query } => {
            let course = db::fetch_course(app.pool, &short_id).await?;
            let rows = db::fetch_student_responses(app.pool, course.id, None).await?;
            let results = participation::search(&reducer::reduce(rows), &query);
            app.emit(&results, || {
                report::build_search_results(&course, &query, &results)
            })?;
        }
        Commands::Report {
            short_id,
            survey,
            out,
        } => {
            let (course, summary) = participation_for(&app, &short_id, survey).await?;
            let report = report::build_participation_report(&course, survey, &summary);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::DeleteCourse { short_id, yes } => {
            if !yes {
                anyhow::bail!(
                    "deleting '{short_id}' removes all course and student data; pass --yes to confirm"
                );
            }
            let course = db::fetch_course(app.pool, &short_id).await?;
            db::delete_course(app.pool, course.id).await?;
            println!("Deleted {}.", course.label());
        }
    }

    Ok(())
}

async fn show_courses(app: &App<'_>, instructor: Uuid) -> anyhow::Result<()> {
    let now = app.clock.now();
    let courses = db::fetch_courses(app.pool, instructor).await?;
    let mut rows: Vec<(Course, Vec<participation::SurveyOverview>)> = Vec::new();

    for course in courses {
        let windows = db::fetch_windows(app.pool, course.id).await?;
        let instructor_rows = db::fetch_instructor_responses(app.pool, course.id).await?;
        let student_rows = db::fetch_student_responses(app.pool, course.id, None).await?;

        let overviews = SurveyNumber::ALL
            .into_iter()
            .map(|survey| {
                participation::survey_overview(
                    survey,
                    window::window_for(&windows, survey),
                    &instructor_rows,
                    &student_rows,
                    app.minimum_completed,
                    now,
                )
            })
            .collect();
        rows.push((course, overviews));
    }

    app.emit(&rows, || report::build_course_overview(&rows))
}

async fn show_course(app: &App<'_>, short_id: &str) -> anyhow::Result<()> {
    let course = db::fetch_course(app.pool, short_id).await?;
    let windows = db::fetch_windows(app.pool, course.id).await?;
    let instructor_rows = db::fetch_instructor_responses(app.pool, course.id).await?;
    let student_form = db::fetch_survey_form(app.pool, &app.config.student_survey_name).await?;
    let instructor_form =
        db::fetch_survey_form(app.pool, &app.config.instructor_survey_name).await?;

    let links: Vec<(SurveyNumber, SurveyLinks)> = SurveyNumber::ALL
        .into_iter()
        .map(|survey| {
            let survey_links = SurveyLinks {
                instructor: instructor_form.as_ref().map(|form| {
                    links::survey_link(
                        &form.link,
                        form.id,
                        survey,
                        Some(course.user_id),
                        Some(course.id),
                    )
                }),
                student: student_form.as_ref().map(|form| {
                    links::survey_link(&form.link, form.id, survey, None, Some(course.id))
                }),
            };
            (survey, survey_links)
        })
        .collect();

    let details = report::survey_details(&windows, &instructor_rows, &links, app.clock.now());
    app.emit(
        &serde_json::json!({ "course": course, "surveys": details }),
        || report::build_course_detail(&course, &details),
    )
}

async fn set_dates(app: &App<'_>, short_id: &str, window: SurveyWindow) -> anyhow::Result<()> {
    course::validate_schedule(&window)?;

    let course = db::fetch_course(app.pool, short_id).await?;
    let windows = db::fetch_windows(app.pool, course.id).await?;
    let current = window::evaluate(
        window::window_for(&windows, window.survey_number),
        app.clock.now(),
    );
    if let WindowState::Closed { closed_at } = current {
        warn!(
            short_id,
            survey_n = %window.survey_number,
            %closed_at,
            "rescheduling a survey that has already closed"
        );
    }

    let form = db::fetch_survey_form(app.pool, &app.config.student_survey_name).await?;
    db::upsert_window(app.pool, course.id, form.map(|form| form.id), &window).await?;
    println!(
        "Survey {} for {} scheduled: {}.",
        window.survey_number,
        course.label(),
        window::schedule_text(Some(&window))
    );
    Ok(())
}

async fn upload_roster(app: &App<'_>, short_id: &str, csv: &std::path::Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(csv).with_context(|| format!("failed to open {}", csv.display()))?;
    let entries = roster::read_roster(file)?;
    if entries.is_empty() {
        anyhow::bail!("{} contains no student ids", csv.display());
    }

    let course = db::fetch_course(app.pool, short_id).await?;
    let form = db::fetch_survey_form(app.pool, &app.config.student_survey_name)
        .await?
        .with_context(|| format!("survey '{}' is not registered", app.config.student_survey_name))?;

    let rows = roster::roster_rows(&entries);
    let inserted = db::insert_roster(app.pool, course.id, form.id, &rows).await?;
    info!(short_id, students = entries.len(), inserted, "roster upload complete");
    println!(
        "Uploaded {} students ({} rows) to {}.",
        entries.len(),
        inserted,
        course.label()
    );
    Ok(())
}

async fn remove_students(
    app: &App<'_>,
    short_id: &str,
    student_id: Option<String>,
    all: bool,
) -> anyhow::Result<()> {
    let course = db::fetch_course(app.pool, short_id).await?;
    let rows = db::fetch_student_responses(app.pool, course.id, None).await?;
    let tracked = roster::tracked_students(&rows);

    let targets: Vec<String> = match student_id {
        Some(id) if !all => {
            let id = id.trim().to_string();
            match tracked.iter().find(|student| student.student_id == id) {
                Some(student) if student.can_delete => vec![id],
                Some(_) => anyhow::bail!("{id} has submitted responses and cannot be removed"),
                None => anyhow::bail!("{id} is not tracked for {}", course.label()),
            }
        }
        _ => tracked
            .into_iter()
            .filter(|student| student.can_delete)
            .map(|student| student.student_id)
            .collect(),
    };

    if targets.is_empty() {
        println!("No eligible manually added students available for deletion.");
        return Ok(());
    }

    let deleted = db::delete_instructor_students(app.pool, course.id, &targets).await?;
    println!("Removed {} students ({} rows).", targets.len(), deleted);
    Ok(())
}

async fn participation_for(
    app: &App<'_>,
    short_id: &str,
    survey: SurveyNumber,
) -> anyhow::Result<(Course, participation::ParticipationSummary)> {
    let course = db::fetch_course(app.pool, short_id).await?;
    let windows = db::fetch_windows(app.pool, course.id).await?;
    let rows = db::fetch_student_responses(app.pool, course.id, Some(survey)).await?;

    let state = window::evaluate(window::window_for(&windows, survey), app.clock.now());
    let summary = participation::summarize(&reducer::reduce(rows), app.minimum_completed, state);
    Ok((course, summary))
}
