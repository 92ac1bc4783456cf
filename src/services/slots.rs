use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::services::bookings::{at, overlaps_lunch, CLOSING, OPENING};

const SLOT_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available: bool,
    pub label: String,
}

fn label(start: NaiveTime, end: NaiveTime) -> String {
    format!("{} - {}", start.format("%-I:%M %p"), end.format("%-I:%M %p"))
}

/// Hour-long slots between opening and closing, minus any touching lunch.
fn day_slots() -> Vec<(NaiveTime, NaiveTime)> {
    let step = Duration::minutes(SLOT_MINUTES);
    let closing = at(CLOSING);

    let mut slots = vec![];
    let mut start = at(OPENING);
    while start + step <= closing {
        let end = start + step;
        if !overlaps_lunch(start, end) {
            slots.push((start, end));
        }
        start = end;
    }
    slots
}

/// Every slot of `date` on `resource_id`, marked taken when a booking still
/// holds an overlapping range or, for today, when it has already started.
pub fn slots(
    conn: &Connection,
    resource_id: &str,
    date: NaiveDate,
    now: NaiveDateTime,
) -> AppResult<Vec<TimeSlot>> {
    let resource_id = resource_id.trim();
    if resource_id.is_empty() {
        return Err(AppError::Validation("resourceId is required".to_string()));
    }
    if date < now.date() {
        return Err(AppError::Conflict("cannot book for past dates".to_string()));
    }

    let held = queries::get_held_slots(conn, resource_id, &date)?;
    let today = date == now.date();

    Ok(day_slots()
        .into_iter()
        .map(|(start, end)| {
            let taken = held.iter().any(|(s, e)| start < *e && *s < end);
            let started = today && start < now.time();
            TimeSlot {
                start_time: start,
                end_time: end,
                available: !taken && !started,
                label: label(start, end),
            }
        })
        .collect())
}
