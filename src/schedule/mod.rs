//! # Schedule Model
//!
//! Core vocabulary shared by the extraction and reconciliation stages: the fixed
//! weekday and time-block tables, raw grid cells, rooms and the final sessions.
//!
//! ## Stages
//!
//! - [`grid`]: recovers (day, time block, room) cells from document tables
//! - [`rooms`]: names the room columns and builds position-derived aliases
//! - [`slots`]: groups primary and supplementary cells per (day, time block)
//! - [`outline`]: reads the duration-annotated cell text grammar
//! - [`reconcile`]: turns a time slot into timed sessions per room
//! - [`categories`]: collapses category labels into a small canonical set
use chrono::NaiveTime;
use chrono::Timelike;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::sync::OnceLock;

pub mod categories;
pub mod grid;
pub mod outline;
pub mod reconcile;
pub mod rooms;
pub mod slots;

/// Meeting weekdays in output order
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [Day::Monday, Day::Tuesday, Day::Wednesday, Day::Thursday, Day::Friday];

    pub fn name(&self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
        }
    }

    /// First weekday whose name occurs in `text`, ignoring case
    pub fn find_in(text: &str) -> Option<Day> {
        let text = text.to_lowercase();
        Day::ALL
            .into_iter()
            .find(|day| text.contains(&day.name().to_lowercase()))
    }
}

impl Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the fixed working periods of a meeting day
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeBlock {
    pub index: usize,
    pub start: &'static str,
    pub end: &'static str,
    pub duration: u32,
}

pub const TIME_BLOCKS: [TimeBlock; 4] = [
    TimeBlock { index: 0, start: "08:30", end: "10:30", duration: 120 },
    TimeBlock { index: 1, start: "11:00", end: "13:00", duration: 120 },
    TimeBlock { index: 2, start: "14:30", end: "16:30", duration: 120 },
    TimeBlock { index: 3, start: "17:00", end: "19:30", duration: 150 },
];

/// Fixed break between two time blocks
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Break {
    pub name: &'static str,
    pub start: &'static str,
    pub end: &'static str,
}

pub const BREAKS: [Break; 3] = [
    Break { name: "Morning Coffee Break", start: "10:30", end: "11:00" },
    Break { name: "Lunch Break", start: "13:00", end: "14:30" },
    Break { name: "Afternoon Coffee Break", start: "16:30", end: "17:00" },
];

impl TimeBlock {
    pub fn get(index: usize) -> Option<&'static TimeBlock> {
        TIME_BLOCKS.get(index)
    }

    /// Matches a time label cell such as `"8:30\n~\n10:30\n(120 min)"` against the block starts.
    /// Only the first `H:MM` substring counts.
    pub fn from_label(text: &str) -> Option<&'static TimeBlock> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("time pattern"));
        let captures = pattern.captures(text)?;
        let start = format!("{:0>2}:{}", &captures[1], &captures[2]);
        TIME_BLOCKS.iter().find(|block| block.start == start)
    }

    pub fn start_minutes(&self) -> u32 {
        to_minutes(self.start).unwrap_or_default()
    }

    pub fn end_minutes(&self) -> u32 {
        to_minutes(self.end).unwrap_or_default()
    }
}

/// Minutes since midnight for an `HH:MM` clock value
pub fn to_minutes(clock: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(clock.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Formats minutes since midnight as `HH:MM`
pub fn format_minutes(minutes: u32) -> String {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_else(|| format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

/// Text found at one (table, day, time block, room positions) location of a schedule grid
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCell {
    pub text: String,
    pub day: Day,
    /// Index into [`TIME_BLOCKS`]
    pub block: usize,
    /// 0-based positions within the table's room list for this day
    pub rooms: Vec<usize>,
    /// Index among the selected schedule tables
    pub table: usize,
}

/// One room column of a day
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub name: String,
    pub table_index: usize,
    pub room_index_in_table: usize,
}

/// A timed entry in one room (or several adjacent rooms)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub duration_minutes: u32,
    pub start_time: String,
    pub end_time: String,
    pub day: Day,
    /// First grid column, 1-indexed; column 1 holds the time labels
    pub room_col_start: usize,
    /// Exclusive end column
    pub room_col_end: usize,
    pub chair: Option<String>,
    pub agenda_item: Option<String>,
    /// Category label, possibly empty
    pub group_header: String,
}
