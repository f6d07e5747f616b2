//! Core data model.
//!
//! A person is the payload stored in the collection: an alias plus an
//! ordered list of dated visits. It implements [`Record`] so the store can
//! persist it without knowing its shape.

use std::io::{Read, Write};

use chrono::NaiveDate;

use crate::codec::{self, Record};
use crate::error::{Error, Result};

/// Longest alias, in bytes, that may be stored or decoded.
pub const MAX_ALIAS_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Visit
// ---------------------------------------------------------------------------

/// A single dated visit.
///
/// Fields are stored as raw `i32`s, exactly as they appear in the data file.
/// [`Visit::new`] validates the calendar date; decoding does not, so older
/// files load unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub year: i32,
    pub month: i32,
    pub day: i32,
}

impl Visit {
    /// Create a visit, rejecting dates that do not exist on the calendar.
    pub fn new(year: i32, month: i32, day: i32) -> Result<Self> {
        let valid = u32::try_from(month)
            .ok()
            .zip(u32::try_from(day).ok())
            .and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d))
            .is_some();

        if !valid {
            return Err(Error::InvalidRecord(format!(
                "{day}.{month}.{year} is not a valid date"
            )));
        }
        Ok(Self { year, month, day })
    }
}

impl std::fmt::Display for Visit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.day, self.month, self.year)
    }
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// A named entity with its visit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    alias: String,
    visits: Vec<Visit>,
}

impl Person {
    /// Create a person with no visits.
    pub fn new(alias: impl Into<String>) -> Result<Self> {
        Self::with_visits(alias, Vec::new())
    }

    pub fn with_visits(alias: impl Into<String>, visits: Vec<Visit>) -> Result<Self> {
        let alias = alias.into();
        validate_alias(&alias)?;
        Ok(Self { alias, visits })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn add_visit(&mut self, visit: Visit) {
        self.visits.push(visit);
    }
}

fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(Error::InvalidRecord("alias must not be empty".to_string()));
    }
    if alias.len() > MAX_ALIAS_LEN {
        return Err(Error::InvalidRecord(format!(
            "alias is {} bytes, maximum is {MAX_ALIAS_LEN}",
            alias.len()
        )));
    }
    Ok(())
}

impl Record for Person {
    fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        codec::write_string(w, &self.alias)?;
        codec::write_u64(w, self.visits.len() as u64)?;
        for visit in &self.visits {
            codec::write_i32(w, visit.year)?;
            codec::write_i32(w, visit.month)?;
            codec::write_i32(w, visit.day)?;
        }
        Ok(())
    }

    fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let alias = codec::read_string(r, MAX_ALIAS_LEN)?;
        if alias.is_empty() {
            return Err(Error::Decode("empty alias".to_string()));
        }

        let count = codec::read_u64(r)?;
        // Visits are read one by one; a bogus count fails on EOF instead of
        // reserving an absurd allocation up front.
        let mut visits = Vec::new();
        for _ in 0..count {
            visits.push(Visit {
                year: codec::read_i32(r)?,
                month: codec::read_i32(r)?,
                day: codec::read_i32(r)?,
            });
        }

        Ok(Self { alias, visits })
    }
}
