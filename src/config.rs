use std::str::FromStr;

use anyhow::Context;

use crate::participation::DEFAULT_MINIMUM_COMPLETED;

/// Settings read from the environment (and an optional `.env` file).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
    pub minimum_completed: usize,
    pub student_survey_name: String,
    pub instructor_survey_name: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to the hosted Postgres instance")?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            log_level: lookup("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            minimum_completed: parse_or(
                &lookup,
                "MIN_COMPLETED_RESPONSES",
                DEFAULT_MINIMUM_COMPLETED,
            )?,
            student_survey_name: lookup("STUDENT_SURVEY_NAME")
                .unwrap_or_else(|| "Student Course Survey 2025".to_string()),
            instructor_survey_name: lookup("INSTRUCTOR_SURVEY_NAME")
                .unwrap_or_else(|| "Instructor Course Survey 2025".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value '{value}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/app")]))
            .expect("config loads");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.minimum_completed, 12);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.student_survey_name, "Student Course Survey 2025");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("MIN_COMPLETED_RESPONSES", " 20 "),
            ("DATABASE_MAX_CONNECTIONS", "2"),
        ]))
        .expect("config loads");
        assert_eq!(config.minimum_completed, 20);
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn invalid_threshold_is_an_error() {
        let error = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("MIN_COMPLETED_RESPONSES", "twelve"),
        ]))
        .expect_err("threshold must be numeric");
        assert!(error.to_string().contains("MIN_COMPLETED_RESPONSES"));
    }
}
