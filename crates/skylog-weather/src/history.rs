//! Per-city views over the stored readings.
//!
//! The store interleaves every city; these helpers do the filtering the
//! display side needs.

use chrono::NaiveDateTime;

use crate::types::Reading;

/// Most recent successful reading for `city`, by insertion order.
pub fn latest_for_city<'a>(readings: &'a [Reading], city: &str) -> Option<&'a Reading> {
    readings
        .iter()
        .rev()
        .find(|r| r.is_success() && r.city() == city)
}

/// Readings for `city` captured at or after `since`, in insertion order.
pub fn for_city_since<'a>(
    readings: &'a [Reading],
    city: &str,
    since: NaiveDateTime,
) -> Vec<&'a Reading> {
    readings
        .iter()
        .filter(|r| r.city() == city && r.datetime >= since)
        .collect()
}

pub fn has_city(readings: &[Reading], city: &str) -> bool {
    readings.iter().any(|r| r.city() == city)
}

/// Multi-line summary of a reading for console output.
pub fn describe(reading: &Reading) -> String {
    format!(
        "City: {}\nTemperature: {:.2} °F\nPressure: {} hPa\nHumidity: {}%\nDescription: {}\nTime: {}",
        reading.city(),
        reading.temperature(),
        reading.pressure(),
        reading.humidity(),
        reading.description().unwrap_or("n/a"),
        reading.datetime.format("%Y-%m-%d %H:%M:%S"),
    )
}
