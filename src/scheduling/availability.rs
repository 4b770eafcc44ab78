// src/scheduling/availability.rs

use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::Provider;
use crate::scheduling::interval::TimeWindow;

/// One bookable unit: a duration-sized window of a provider's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
}

/// Expands the provider's working hours on `date` into consecutive slots,
/// earliest first. Non-working weekdays yield no slots; a trailing remainder
/// shorter than one slot is dropped.
pub fn candidate_slots(provider: &Provider, date: NaiveDate) -> Result<Vec<TimeSlot>, SchedulingError> {
    let Some(hours) = TimeWindow::new(provider.day_start, provider.day_end) else {
        return Err(SchedulingError::Validation(format!(
            "provider {} working hours end before they start",
            provider.provider_id
        )));
    };
    if provider.slot_minutes == 0 {
        return Err(SchedulingError::Validation(format!(
            "provider {} has a zero-minute appointment duration",
            provider.provider_id
        )));
    }

    if !provider.working_days.contains(date.weekday()) {
        return Ok(vec![]);
    }

    let step = i64::from(provider.slot_minutes);
    let count = hours.minutes() / step;

    let slots = (0..count)
        .filter_map(|i| {
            let start = hours.start + TimeDelta::minutes(i * step);
            TimeWindow::starting_at(start, provider.slot_minutes)
        })
        .map(|window| TimeSlot {
            provider_id: provider.provider_id,
            date,
            window,
        })
        .collect();

    Ok(slots)
}

#[cfg(test)]
pub(crate) fn provider(day_start: (u32, u32), day_end: (u32, u32), slot_minutes: u32) -> Provider {
    use crate::models::WorkingDays;
    use crate::scheduling::interval::t;

    Provider {
        provider_id: Uuid::new_v4(),
        display_name: "Dr. Test".into(),
        working_days: WorkingDays::MONDAY_TO_FRIDAY,
        day_start: t(day_start.0, day_start.1),
        day_end: t(day_end.0, day_end.1),
        slot_minutes,
    }
}
