//! Core archive data types: [`LogEvent`], [`EventId`], [`Ymd`], [`FileInfo`].
//!
//! These are pure domain types with no I/O — the codec, writer, index, and
//! formatter modules all operate on them.

use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;

/// Which direction a [`LogEvent`] traveled: received from the network, or
/// sent by the bot itself (self-echo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Received,
    Sent,
}

/// Canonical identity of an event once it has been tee'd to the live pipe:
/// which target, which day, and its line ordinal within that day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId {
    pub target: String,
    pub day: i64,
    pub line: u64,
}

/// A single recorded chat event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub prefix: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub direction: Direction,
    /// Microseconds since the start of the containing day file. Assigned by
    /// the writer; immutable afterwards.
    pub time_us: u64,
    /// Populated only when the event was tee'd to the pipe.
    pub event_id: Option<EventId>,
}

impl LogEvent {
    pub fn new(prefix: Option<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            prefix,
            command: command.into(),
            args,
            direction: Direction::Received,
            time_us: 0,
            event_id: None,
        }
    }

    pub fn sent(mut self) -> Self {
        self.direction = Direction::Sent;
        self
    }

    /// Nick up to the first `!` in the prefix, or `None` if there's no prefix
    /// or no `!` separator.
    pub fn prefix_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split('!').next().filter(|n| !n.is_empty())
    }
}

/// Calendar date triple with the two special forms the archive queries use:
/// `month == 0` means "the whole year", `day == 0` means "the whole month".
///
/// Ordering is lexicographic on `(year, month, day)`, which is exactly what
/// the index needs for its sorted day vector and `lower_bound`-style lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ymd {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Ymd {
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub const fn year(year: i32) -> Self {
        Self::new(year, 0, 0)
    }

    pub const fn month(year: i32, month: u32) -> Self {
        Self::new(year, month, 0)
    }

    pub fn is_month_query(&self) -> bool {
        self.day == 0
    }

    /// Fixed civil epoch: 1970-01-01 UTC. A concrete (non-month, non-year)
    /// date's signed day number since that epoch.
    ///
    /// Panics if this isn't a concrete calendar day (`month == 0 || day == 0`)
    /// or if the triple isn't a valid date — callers only call this on dates
    /// that passed through [`Ymd::from_day_number`] or came from the writer's
    /// own `floor_days` split, both of which are always valid.
    pub fn day_number(&self) -> i64 {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .expect("Ymd::day_number called on a non-concrete or invalid date");
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        (date - epoch).num_days()
    }

    /// Inverse of [`Ymd::day_number`]: reconstruct the calendar date from a
    /// signed day count since the 1970-01-01 civil epoch.
    pub fn from_day_number(day_number: i64) -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let date = epoch + chrono::Duration::days(day_number);
        Self::new(date.year(), date.month(), date.day())
    }

    /// The last day of this month (or year, for a year query — Dec 31).
    /// Used by [`FileInfo`] freeze-window computation.
    pub fn last_of_month(&self) -> Ymd {
        if self.month == 0 {
            return Ymd::new(self.year, 12, 31);
        }
        let days_in_month = days_in_month(self.year, self.month);
        Ymd::new(self.year, self.month, days_in_month)
    }
}

/// Days in a given (year, month), accounting for leap years.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid month");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    (first_of_next - first_of_this).num_days() as u32
}

impl PartialEq<(i32, u32, u32)> for Ymd {
    fn eq(&self, other: &(i32, u32, u32)) -> bool {
        (self.year, self.month, self.day) == *other
    }
}

/// Cacheable info about a day or month range, used to synthesize `ETag` /
/// `Last-Modified` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInfo {
    /// The range is fully in the past (end + 24h + 5min grace has elapsed):
    /// contents are guaranteed not to change.
    Frozen { last_write_unix: i64 },
    /// The range may still receive writes.
    Liquid {
        last_write_unix: i64,
        /// Which concrete day the `size` refers to (for a month query, the
        /// latest day with content, or a synthetic past-the-end marker).
        size_day: u32,
        size: u64,
    },
}

impl FileInfo {
    pub fn is_frozen(&self) -> bool {
        matches!(self, FileInfo::Frozen { .. })
    }

    pub fn last_write_unix(&self) -> i64 {
        match self {
            FileInfo::Frozen { last_write_unix } => *last_write_unix,
            FileInfo::Liquid { last_write_unix, .. } => *last_write_unix,
        }
    }

    /// The `ETag` value (already quoted) for this info.
    pub fn etag(&self) -> String {
        match self {
            FileInfo::Frozen { .. } => "\"frozen\"".to_string(),
            FileInfo::Liquid { size_day, size, .. } => format!("\"{size_day}-{size}\""),
        }
    }
}

/// Strict ordering helper for `(day, line)` resume cursors — used by the
/// stalker ring and the websocket client's `has_event` test.
pub fn cursor_cmp(a: (i64, u64), b: (i64, u64)) -> Ordering {
    a.cmp(&b)
}
