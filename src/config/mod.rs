//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on malformed values. Every field
//! has a default, so an empty environment is a valid configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_DATA_FILE: &str = "lab.data";
pub const DEFAULT_LINE_LIMIT: usize = 1000;
pub const DEFAULT_VISIT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_file: PathBuf,
    /// Worker threads. `None` = one per available core, `Some(0)` = synchronous.
    pub threads: Option<usize>,
    pub limits: Limits,
    pub log_level: String,
}

/// Output truncation defaults for `view` and `report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub view_lines: usize,
    pub view_visits: usize,
    pub report_lines: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            view_lines: DEFAULT_LINE_LIMIT,
            view_visits: DEFAULT_VISIT_LIMIT,
            report_lines: DEFAULT_LINE_LIMIT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            threads: None,
            limits: Limits::default(),
            log_level: "info".to_string(),
        }
    }
}

/// On-disk shape of the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_file: Option<PathBuf>,
    threads: Option<i64>,
    view_line_limit: Option<usize>,
    view_visit_limit: Option<usize>,
    report_line_limit: Option<usize>,
    log_level: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            data_file: std::env::var("COLLECTOR_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            threads: match std::env::var("COLLECTOR_THREADS") {
                Ok(value) => parse_threads(&value)?,
                Err(_) => defaults.threads,
            },
            limits: Limits {
                view_lines: parsed_var("COLLECTOR_VIEW_LINE_LIMIT")?
                    .unwrap_or(defaults.limits.view_lines),
                view_visits: parsed_var("COLLECTOR_VIEW_VISIT_LIMIT")?
                    .unwrap_or(defaults.limits.view_visits),
                report_lines: parsed_var("COLLECTOR_REPORT_LINE_LIMIT")?
                    .unwrap_or(defaults.limits.report_lines),
            },
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config {}: {e}", path.display())))?;

        let defaults = Self::default();
        Ok(Self {
            data_file: file.data_file.unwrap_or(defaults.data_file),
            threads: file.threads.map_or(defaults.threads, threads_from_hint),
            limits: Limits {
                view_lines: file.view_line_limit.unwrap_or(defaults.limits.view_lines),
                view_visits: file.view_visit_limit.unwrap_or(defaults.limits.view_visits),
                report_lines: file
                    .report_line_limit
                    .unwrap_or(defaults.limits.report_lines),
            },
            log_level: file.log_level.unwrap_or(defaults.log_level),
        })
    }
}

/// Map a signed thread count to a pool size: negative means "auto".
pub fn threads_from_hint(hint: i64) -> Option<usize> {
    usize::try_from(hint).ok()
}

/// Parse `COLLECTOR_THREADS`: "auto", a negative number, or a count.
fn parse_threads(value: &str) -> Result<Option<usize>> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(threads_from_hint)
        .map_err(|e| Error::Config(format!("COLLECTOR_THREADS={value:?}: {e}")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={value:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
