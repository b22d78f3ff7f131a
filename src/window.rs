use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{display_date, SurveyNumber, SurveyWindow};

/// Where "now" falls relative to a survey's configured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WindowState {
    /// No window row, no open date, or a close date before the open date.
    Unconfigured,
    NotYetOpen { opens_at: DateTime<Utc> },
    Open { closes_at: Option<DateTime<Utc>> },
    Closed { closed_at: DateTime<Utc> },
}

/// Things the presentation layer asks permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    TakeSurvey,
    ViewCounts,
}

pub fn evaluate(window: Option<&SurveyWindow>, now: DateTime<Utc>) -> WindowState {
    let Some(window) = window else {
        return WindowState::Unconfigured;
    };
    let Some(opens_at) = window.open_at else {
        return WindowState::Unconfigured;
    };
    if window.is_inverted() {
        return WindowState::Unconfigured;
    }

    if now < opens_at {
        return WindowState::NotYetOpen { opens_at };
    }

    match window.close_at {
        Some(closed_at) if now > closed_at => WindowState::Closed { closed_at },
        closes_at => WindowState::Open { closes_at },
    }
}

pub fn window_for(windows: &[SurveyWindow], survey: SurveyNumber) -> Option<&SurveyWindow> {
    windows.iter().find(|window| window.survey_number == survey)
}

impl WindowState {
    pub fn permits(self, action: WindowAction) -> bool {
        match action {
            WindowAction::TakeSurvey => matches!(self, Self::Open { .. }),
            WindowAction::ViewCounts => matches!(self, Self::Open { .. } | Self::Closed { .. }),
        }
    }

    pub fn message(self) -> String {
        match self {
            Self::Unconfigured => "Survey dates not set".to_string(),
            Self::NotYetOpen { opens_at } => format!("Opens {}", display_date(opens_at)),
            Self::Open {
                closes_at: Some(closes_at),
            } => format!("Open until {}", display_date(closes_at)),
            Self::Open { closes_at: None } => "Open".to_string(),
            Self::Closed { closed_at } => format!("Closed {}", display_date(closed_at)),
        }
    }
}

/// Human schedule line for a window as configured, independent of now.
pub fn schedule_text(window: Option<&SurveyWindow>) -> String {
    match window.map(|window| (window.open_at, window.close_at)) {
        Some((Some(open_at), Some(close_at))) => {
            format!("{} to {}", display_date(open_at), display_date(close_at))
        }
        Some((Some(open_at), None)) => format!("{} onward (open-ended)", display_date(open_at)),
        _ => "Not set".to_string(),
    }
}
