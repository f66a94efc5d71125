use std::{
    io::Write,
    sync::{Mutex, PoisonError},
};

use chrono::Utc;
use terminal_hyperlink::Hyperlink;

use crate::build_status::{Build, BuildStatus};

/// Shows the status of the checked-out commit.
pub trait StatusIndicator: Send + Sync {
    fn update(&self, status: BuildStatus);
    fn set_hint(&self, hint: &str);
    /// A fetch is in flight.
    fn set_checking(&self, checking: bool);
}

/// Shows the builds of the checked-out commit on demand.
pub trait BuildListPresenter: Send + Sync {
    fn set_list(&self, builds: Vec<Build>);
    fn show(&self);
}

const STATUS_GREEN: char = '✅';
const STATUS_RED: char = '❌';
const STATUS_RUNNING: char = '🔄';
const STATUS_UNKNOWN: char = '❔';
const STATUS_ERROR: char = '⚠';
const CHECKING: &str = "checking…";

fn status_to_char(status: &BuildStatus) -> char {
    match status {
        BuildStatus::Successful => STATUS_GREEN,
        BuildStatus::Failed => STATUS_RED,
        BuildStatus::InProgress => STATUS_RUNNING,
        BuildStatus::Unknown => STATUS_UNKNOWN,
        BuildStatus::Error => STATUS_ERROR,
    }
}

#[derive(Default)]
struct IndicatorState {
    status: BuildStatus,
    hint: String,
    checking: bool,
}

impl IndicatorState {
    fn line(&self) -> String {
        let status = status_to_char(&self.status);
        let label = self.status.label();
        let mut line = format!("{status} {label}");
        if !self.hint.is_empty() {
            line.push_str(" | ");
            line.push_str(&self.hint);
        }
        if self.checking {
            line.push_str(" (");
            line.push_str(CHECKING);
            line.push(')');
        }
        line
    }
}

/// Single status line, redrawn in place on stdout.
#[derive(Default)]
pub struct TerminalStatusIndicator {
    state: Mutex<IndicatorState>,
}

impl TerminalStatusIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(&self, change: impl FnOnce(&mut IndicatorState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut state);
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[2K{}", state.line());
        let _ = out.flush();
    }
}

impl StatusIndicator for TerminalStatusIndicator {
    fn update(&self, status: BuildStatus) {
        self.redraw(|s| s.status = status);
    }

    fn set_hint(&self, hint: &str) {
        self.redraw(|s| s.hint = hint.to_string());
    }

    fn set_checking(&self, checking: bool) {
        self.redraw(|s| s.checking = checking);
    }
}

struct RowData {
    status: char,
    title: String,
    url: String,
    key: String,
    added_at: String,
    age: String,
}

fn pad_str(s: &str, i: usize) -> String {
    format!("{:width$}", s, width = i)
}

fn to_rows(builds: &[Build]) -> Vec<RowData> {
    let now = Utc::now();
    let mut rows: Vec<RowData> = builds
        .iter()
        .map(|build| {
            let (added_at, age) = build
                .date_added
                .map(|date| {
                    let added_at = date.format("%Y-%m-%d %H:%M:%S").to_string();
                    let age = now
                        .signed_duration_since(date)
                        .to_std()
                        .map(|d| pretty_duration::pretty_duration(&d, None))
                        .unwrap_or_default();
                    (added_at, age)
                })
                .unwrap_or_default();
            RowData {
                status: status_to_char(&build.state),
                title: build.name.clone(),
                url: build.url.clone(),
                key: build.key.clone(),
                added_at,
                age,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.title.cmp(&b.title));
    rows
}

pub fn render_rows(builds: &[Build]) -> Vec<String> {
    let rows = to_rows(builds);
    let max_title = rows.iter().map(|r| r.title.chars().count()).max().unwrap_or(0);
    let max_key = rows.iter().map(|r| r.key.len()).max().unwrap_or(0);
    let max_added_at = rows.iter().map(|r| r.added_at.len()).max().unwrap_or(0);

    rows.into_iter()
        .map(|row| {
            let status = row.status;
            let title = pad_str(&row.title, max_title);
            let clickable_title = title.hyperlink(&row.url);
            let key = pad_str(&row.key, max_key);
            let added_at = pad_str(&row.added_at, max_added_at);
            let age = row.age;
            format!("{status} {clickable_title} | {key} | {added_at} | {age}")
        })
        .collect()
}

/// Table of the last fetched builds, printed when asked for.
#[derive(Default)]
pub struct TerminalBuildList {
    builds: Mutex<Vec<Build>>,
}

impl TerminalBuildList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> Vec<Build> {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BuildListPresenter for TerminalBuildList {
    fn set_list(&self, builds: Vec<Build>) {
        *self.builds.lock().unwrap_or_else(PoisonError::into_inner) = builds;
    }

    fn show(&self) {
        let builds = self.builds();
        println!();
        if builds.is_empty() {
            println!("No builds available");
            return;
        }
        for row in render_rows(&builds) {
            println!("{row}");
        }
    }
}

#[cfg(test)]
mod rendering_tests {
    use super::*;
    use chrono::TimeZone;

    fn build(name: &str, state: BuildStatus) -> Build {
        Build {
            key: format!("KEY-{name}"),
            name: name.to_string(),
            state,
            url: format!("https://ci.example/{name}"),
            description: None,
            date_added: Some(Utc.with_ymd_and_hms(2025, 11, 7, 9, 19, 46).unwrap()),
        }
    }

    #[test]
    fn rows_sorted_by_title() {
        let rows = to_rows(&[
            build("zeta", BuildStatus::Failed),
            build("alpha", BuildStatus::Successful),
        ]);
        assert_eq!(rows[0].title, "alpha");
        assert_eq!(rows[0].status, STATUS_GREEN);
        assert_eq!(rows[1].status, STATUS_RED);
        assert_eq!(rows[1].added_at, "2025-11-07 09:19:46");
        assert!(!rows[1].age.is_empty());
    }

    #[test]
    fn rows_without_date() {
        let mut b = build("nightly", BuildStatus::InProgress);
        b.date_added = None;
        let rows = render_rows(&[b]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with(STATUS_RUNNING));
        assert!(rows[0].contains("KEY-nightly"));
    }

    #[test]
    fn status_line() {
        let state = IndicatorState {
            status: BuildStatus::Failed,
            hint: String::from("See available builds"),
            checking: true,
        };
        assert_eq!(state.line(), "❌ failed | See available builds (checking…)");
    }

    #[test]
    fn set_list_replaces() {
        let list = TerminalBuildList::new();
        list.set_list(vec![build("a", BuildStatus::Successful)]);
        list.set_list(Vec::new());
        assert!(list.builds().is_empty());
    }
}
