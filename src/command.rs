//! Command vocabulary: parsing tokens into a [`Command`] and applying it to
//! the collection.
//!
//! Every command either succeeds with zero or more output lines or fails
//! with a [`CommandError`] whose text is the single error line shown to the
//! user. A failed command never mutates the store.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Limits;
use crate::error::Error;
use crate::model::{Person, Visit};
use crate::storage::{CollectionStore, Index};

/// Errors local to one command. Contained within the task that raised them.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("wrong number of arguments for {command}: expected {expected}, got {got}")]
    Arity {
        command: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("{command}: invalid {what} '{value}'")]
    InvalidArgument {
        command: &'static str,
        what: &'static str,
        value: String,
    },

    #[error("{command}: {reason}")]
    InvalidRecord {
        command: &'static str,
        reason: String,
    },

    #[error("{command}: no entry at index {index}")]
    NoSuchIndex { command: &'static str, index: Index },

    #[error("{command} of '{path}' failed: {source}")]
    Persistence {
        command: &'static str,
        path: String,
        source: Error,
    },
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Count,
    Add { alias: String },
    AddVisit { index: Index, visit: Visit },
    Remove { index: Index },
    Update { index: Index, alias: String },
    View {
        line_limit: Option<usize>,
        visit_limit: Option<usize>,
    },
    Report { line_limit: Option<usize> },
    Load { file: Option<PathBuf> },
    Save { file: Option<PathBuf> },
}

impl Command {
    /// Parse whitespace-split tokens. The first token names the command.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CommandError> {
        let Some((name, args)) = tokens.split_first() else {
            return Err(CommandError::Empty);
        };
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();

        match name.as_ref() {
            "c" | "count" => {
                arity("count", &args, 0, 0)?;
                Ok(Command::Count)
            }
            "a" | "add" => {
                arity("add", &args, 1, 1)?;
                Ok(Command::Add {
                    alias: args[0].to_string(),
                })
            }
            "av" | "add_visit" => {
                arity("add_visit", &args, 4, 4)?;
                let index = number("add_visit", "index", args[0])?;
                let year = number("add_visit", "year", args[1])?;
                let month = number("add_visit", "month", args[2])?;
                let day = number("add_visit", "day", args[3])?;
                let visit = Visit::new(year, month, day).map_err(|e| invalid("add_visit", e))?;
                Ok(Command::AddVisit { index, visit })
            }
            "r" | "remove" => {
                arity("remove", &args, 1, 1)?;
                Ok(Command::Remove {
                    index: number("remove", "index", args[0])?,
                })
            }
            "u" | "update" => {
                arity("update", &args, 2, 2)?;
                Ok(Command::Update {
                    index: number("update", "index", args[0])?,
                    alias: args[1].to_string(),
                })
            }
            "v" | "view" => {
                arity("view", &args, 0, 2)?;
                Ok(Command::View {
                    line_limit: optional_number("view", "line limit", args.first())?,
                    visit_limit: optional_number("view", "visit limit", args.get(1))?,
                })
            }
            "rp" | "report" => {
                arity("report", &args, 0, 1)?;
                Ok(Command::Report {
                    line_limit: optional_number("report", "line limit", args.first())?,
                })
            }
            "l" | "load" => {
                arity("load", &args, 0, 1)?;
                Ok(Command::Load {
                    file: args.first().map(PathBuf::from),
                })
            }
            "s" | "save" => {
                arity("save", &args, 0, 1)?;
                Ok(Command::Save {
                    file: args.first().map(PathBuf::from),
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Canonical long name, used in messages and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Count => "count",
            Command::Add { .. } => "add",
            Command::AddVisit { .. } => "add_visit",
            Command::Remove { .. } => "remove",
            Command::Update { .. } => "update",
            Command::View { .. } => "view",
            Command::Report { .. } => "report",
            Command::Load { .. } => "load",
            Command::Save { .. } => "save",
        }
    }

    /// Apply the command to `store` and return its output lines.
    pub fn execute(
        &self,
        store: &CollectionStore<Person>,
        limits: &Limits,
    ) -> Result<Vec<String>, CommandError> {
        match self {
            Command::Count => Ok(vec![store.size().to_string()]),

            Command::Add { alias } => {
                let person = Person::new(alias.as_str()).map_err(|e| invalid("add", e))?;
                store.add(person);
                Ok(Vec::new())
            }

            Command::AddVisit { index, visit } => {
                if !store.modify(*index, |person| person.add_visit(*visit)) {
                    return Err(no_such_index("add_visit", *index));
                }
                Ok(Vec::new())
            }

            Command::Remove { index } => {
                if !store.remove(*index) {
                    return Err(no_such_index("remove", *index));
                }
                Ok(Vec::new())
            }

            Command::Update { index, alias } => {
                let person = Person::new(alias.as_str()).map_err(|e| invalid("update", e))?;
                if !store.update(*index, person) {
                    return Err(no_such_index("update", *index));
                }
                Ok(Vec::new())
            }

            Command::View {
                line_limit,
                visit_limit,
            } => Ok(view(
                store,
                line_limit.unwrap_or(limits.view_lines),
                visit_limit.unwrap_or(limits.view_visits),
            )),

            Command::Report { line_limit } => {
                Ok(report(store, line_limit.unwrap_or(limits.report_lines)))
            }

            Command::Load { file } => {
                let path = file.clone().unwrap_or_else(|| store.file_name());
                store.load(&path).map_err(|source| CommandError::Persistence {
                    command: "load",
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Vec::new())
            }

            Command::Save { file } => {
                let (path, result) = match file {
                    Some(path) => (path.clone(), store.save_as(path)),
                    None => (store.file_name(), store.save()),
                };
                result.map_err(|source| CommandError::Persistence {
                    command: "save",
                    path: path.display().to_string(),
                    source,
                })?;
                Ok(Vec::new())
            }
        }
    }
}

/// Live entries with their visits, then the live count.
fn view(store: &CollectionStore<Person>, line_limit: usize, visit_limit: usize) -> Vec<String> {
    store.scan(|entries| {
        let mut lines = Vec::new();
        let mut live = 0usize;

        for (index, entry) in entries.filter(|(_, entry)| !entry.is_removed()) {
            live += 1;
            if live > line_limit {
                continue;
            }

            let person = entry.item();
            lines.push(format!("[{index}] {}", person.alias()));

            let visits = person.visits();
            lines.extend(visits.iter().take(visit_limit).map(|v| format!("\t{v}")));
            if visits.len() > visit_limit {
                lines.push(format!(
                    "\t... first {visit_limit} of {} visits shown",
                    visits.len()
                ));
            }
        }

        if live > line_limit {
            lines.push(format!("... first {line_limit} of {live} items shown"));
        }
        lines.push(format!("Items in collection: {live}"));
        lines
    })
}

/// Live entries with at least one visit, most visits first.
fn report(store: &CollectionStore<Person>, line_limit: usize) -> Vec<String> {
    let mut ranked: Vec<(usize, String)> = store.scan(|entries| {
        entries
            .filter(|(_, entry)| !entry.is_removed() && !entry.item().visits().is_empty())
            .map(|(_, entry)| (entry.item().visits().len(), entry.item().alias().to_string()))
            .collect()
    });

    // Stable: ties keep index order.
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let total = ranked.len();
    let mut lines: Vec<String> = ranked
        .into_iter()
        .take(line_limit)
        .map(|(count, alias)| format!("{alias} {count}"))
        .collect();
    if total > line_limit {
        lines.push(format!("... first {line_limit} of {total} shown"));
    }
    lines
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn arity(command: &'static str, args: &[&str], min: usize, max: usize) -> Result<(), CommandError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = match (min, max) {
        (0, 0) => "no arguments",
        (1, 1) => "1 argument",
        (2, 2) => "2 arguments",
        (4, 4) => "4 arguments",
        (0, 1) => "at most 1 argument",
        (0, 2) => "at most 2 arguments",
        _ => "a different number of arguments",
    };
    Err(CommandError::Arity {
        command,
        expected,
        got: args.len(),
    })
}

fn number<T: std::str::FromStr>(
    command: &'static str,
    what: &'static str,
    value: &str,
) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidArgument {
        command,
        what,
        value: value.to_string(),
    })
}

fn optional_number<T: std::str::FromStr>(
    command: &'static str,
    what: &'static str,
    value: Option<&&str>,
) -> Result<Option<T>, CommandError> {
    value.map(|v| number(command, what, v)).transpose()
}

fn invalid(command: &'static str, err: Error) -> CommandError {
    let reason = match err {
        Error::InvalidRecord(reason) => reason,
        other => other.to_string(),
    };
    CommandError::InvalidRecord { command, reason }
}

fn no_such_index(command: &'static str, index: Index) -> CommandError {
    CommandError::NoSuchIndex { command, index }
}
