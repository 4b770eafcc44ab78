// src/scheduling/calendar.rs

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::Serialize;

use crate::error::SchedulingError;
use crate::scheduling::conflict::DayBookingSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayState {
    /// No summary was supplied for this date.
    Unknown,
    NonWorking,
    Open,
    FullyBooked,
    /// The day's reservations contradict each other; see the availability
    /// endpoint for the offending slot.
    Inconsistent,
}

impl From<&DayBookingSummary> for DayState {
    fn from(s: &DayBookingSummary) -> Self {
        if !s.working_day {
            DayState::NonWorking
        } else if s.fully_booked {
            DayState::FullyBooked
        } else {
            DayState::Open
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub state: DayState,
    pub summary: Option<DayBookingSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<DayCell>>,
}

pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), SchedulingError> {
    let invalid = || SchedulingError::Validation(format!("{year:04}-{month:02} is not a valid month"));

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;

    Ok((first, next - TimeDelta::days(1)))
}

/// Lays the month out as Sunday-first weeks, padded with the neighbouring
/// months' days so every row has seven cells. Dates in `inconsistent` are
/// marked [`DayState::Inconsistent`] and carry no summary.
pub fn build_month(
    year: i32,
    month: u32,
    summaries: &HashMap<NaiveDate, DayBookingSummary>,
    inconsistent: &HashSet<NaiveDate>,
) -> Result<MonthGrid, SchedulingError> {
    let (first, last) = month_bounds(year, month)?;

    let lead = i64::from(first.weekday().num_days_from_sunday());
    let trail = 6 - i64::from(last.weekday().num_days_from_sunday());
    let grid_start = first - TimeDelta::days(lead);
    let grid_end = last + TimeDelta::days(trail);

    let mut weeks = Vec::new();
    let mut week = Vec::with_capacity(7);
    for date in grid_start.iter_days().take_while(|d| *d <= grid_end) {
        let (state, summary) = if inconsistent.contains(&date) {
            (DayState::Inconsistent, None)
        } else {
            let summary = summaries.get(&date).copied();
            (summary.as_ref().map(DayState::from).unwrap_or(DayState::Unknown), summary)
        };
        week.push(DayCell {
            date,
            in_month: date.month() == month && date.year() == year,
            state,
            summary,
        });
        if week.len() == 7 {
            weeks.push(std::mem::replace(&mut week, Vec::with_capacity(7)));
        }
    }

    Ok(MonthGrid { year, month, weeks })
}

/// Parses `YYYY-MM`.
pub fn parse_month(raw: &str) -> Option<(i32, u32)> {
    let (y, m) = raw.trim().split_once('-')?;
    let year = y.parse::<i32>().ok()?;
    let month = m.parse::<u32>().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}
