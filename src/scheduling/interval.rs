// src/scheduling/interval.rs

use std::fmt;

use chrono::{NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` window of time-of-day on a single date.
///
/// Every overlap decision in the scheduler goes through [`TimeWindow::overlaps`],
/// so two windows that only touch (`a.end == b.start`) never conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct TimeWindow {
    #[serde(serialize_with = "hhmm::serialize")]
    pub start: NaiveTime,
    #[serde(serialize_with = "hhmm::serialize")]
    pub end: NaiveTime,
}

#[derive(Deserialize)]
struct RawWindow {
    #[serde(with = "hhmm")]
    start: NaiveTime,
    #[serde(with = "hhmm")]
    end: NaiveTime,
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = String;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        TimeWindow::new(raw.start, raw.end).ok_or_else(|| "end must be after start".to_string())
    }
}

impl TimeWindow {
    /// Returns `None` when `end` is not strictly after `start`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn starting_at(start: NaiveTime, minutes: u32) -> Option<Self> {
        let (end, wrapped) = start.overflowing_add_signed(TimeDelta::minutes(i64::from(minutes)));
        if wrapped != 0 {
            return None;
        }
        Self::new(start, end)
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Serde adapter for `HH:MM` time-of-day strings. Seconds are accepted on input.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom("time must be HH:MM"))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

#[cfg(test)]
pub(crate) fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[cfg(test)]
pub(crate) fn w(sh: u32, sm: u32, eh: u32, em: u32) -> TimeWindow {
    TimeWindow::new(t(sh, sm), t(eh, em)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_and_inverted_windows_are_rejected() {
        assert!(TimeWindow::new(t(10, 0), t(10, 0)).is_none());
        assert!(TimeWindow::new(t(11, 0), t(10, 0)).is_none());
        assert!(TimeWindow::starting_at(t(23, 45), 30).is_none());
        assert_eq!(TimeWindow::starting_at(t(9, 0), 30), Some(w(9, 0, 9, 30)));
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        assert!(!w(9, 0, 10, 0).overlaps(&w(10, 0, 11, 0)));
        assert!(!w(10, 0, 11, 0).overlaps(&w(9, 0, 10, 0)));
        assert!(w(9, 0, 10, 0).overlaps(&w(9, 30, 10, 30)));
        assert!(w(9, 0, 12, 0).overlaps(&w(10, 0, 10, 30)));
    }

    #[test]
    fn serializes_as_hh_mm() {
        let json = serde_json::to_value(w(9, 5, 9, 35)).unwrap();
        assert_eq!(json, serde_json::json!({ "start": "09:05", "end": "09:35" }));

        let back: TimeWindow =
            serde_json::from_value(serde_json::json!({ "start": "14:00:00", "end": "14:30" })).unwrap();
        assert_eq!(back, w(14, 0, 14, 30));

        let inverted = serde_json::from_value::<TimeWindow>(serde_json::json!({ "start": "11:00", "end": "10:00" }));
        assert!(inverted.is_err());
    }

    fn window() -> impl Strategy<Value = TimeWindow> {
        (0u32..24 * 60, 1u32..240).prop_filter_map("window must end before midnight", |(start, len)| {
            let start = NaiveTime::from_hms_opt(start / 60, start % 60, 0)?;
            TimeWindow::starting_at(start, len)
        })
    }

    fn occupied_minutes(win: &TimeWindow) -> std::ops::Range<i64> {
        let midnight = t(0, 0);
        (win.start - midnight).num_minutes()..(win.end - midnight).num_minutes()
    }

    proptest! {
        #[test]
        fn prop_overlap_matches_shared_minutes(a in window(), b in window()) {
            let ra = occupied_minutes(&a);
            let rb = occupied_minutes(&b);
            let shares_a_minute = ra.clone().any(|m| rb.contains(&m));
            prop_assert_eq!(a.overlaps(&b), shares_a_minute);
        }

        #[test]
        fn prop_overlap_is_symmetric(a in window(), b in window()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn prop_back_to_back_never_overlap(a in window(), len in 1u32..240) {
            if let Some(next) = TimeWindow::starting_at(a.end, len) {
                prop_assert!(!a.overlaps(&next));
                prop_assert!(!next.overlaps(&a));
            }
        }
    }
}
