//! Background polling loop.
//!
//! Each cycle fetches the selected city, stores a successful reading, prunes
//! old readings and then sleeps until one interval after the newest stored
//! reading.

use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use skylog_core::{AppError, Settings};
use skylog_weather::{FetchOutcome, Reading, WeatherProvider};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::store_worker::StoreHandle;

/// Notifications for whoever displays readings.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A reading was fetched and stored
    NewReading(Reading),
    /// Fetch produced nothing for `city`
    FetchFailed { city: String, reason: String },
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Reading stored this cycle, if any
    pub stored: Option<Reading>,
    pub pruned: usize,
    /// Wait before the next cycle, derived from the newest stored reading
    pub delay: Duration,
}

impl CycleReport {
    /// How long the loop actually sleeps after this cycle.
    ///
    /// Usually `delay`. When nothing was stored and `delay` is zero (empty or
    /// stale store), an immediate retry would hammer a failing API, so the
    /// loop waits one `interval` even though `next_wake_delay` said "now".
    pub fn pause(&self, interval: Duration) -> Duration {
        if self.stored.is_none() && self.delay.is_zero() {
            interval
        } else {
            self.delay
        }
    }
}

/// Time until `last.datetime + interval`, or zero when that has passed or
/// nothing is stored.
pub fn next_wake_delay(last: Option<&Reading>, now: NaiveDateTime, interval: Duration) -> Duration {
    let Some(last) = last else {
        return Duration::ZERO;
    };

    let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
    let Some(wake_at) = last.datetime.checked_add_signed(interval) else {
        return interval.to_std().unwrap_or(Duration::ZERO);
    };

    // Negative deltas fail to convert
    (wake_at - now).to_std().unwrap_or(Duration::ZERO)
}

pub struct PollScheduler {
    provider: WeatherProvider,
    store: StoreHandle,
    interval: Duration,
    retention: TimeDelta,
    events: mpsc::UnboundedSender<PollEvent>,
}

impl PollScheduler {
    pub fn new(
        provider: WeatherProvider,
        store: StoreHandle,
        interval: Duration,
        retention: TimeDelta,
        events: mpsc::UnboundedSender<PollEvent>,
    ) -> Self {
        Self {
            provider,
            store,
            interval,
            retention,
            events,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        provider: WeatherProvider,
        store: StoreHandle,
        events: mpsc::UnboundedSender<PollEvent>,
    ) -> Self {
        Self::new(
            provider,
            store,
            settings.poll_interval(),
            TimeDelta::days(i64::from(settings.retention_days)),
            events,
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch `city` once and store the result if the API reported success.
    ///
    /// Emits a [`PollEvent`] either way. Only store failures are errors.
    pub async fn fetch_and_store(&self, city: &str) -> Result<Option<Reading>, AppError> {
        let payload = match self.provider.fetch(city).await {
            FetchOutcome::Received(payload) if payload.is_success() => payload,
            FetchOutcome::Received(payload) => {
                tracing::warn!(
                    "Weather payload for {} reported status {}, not storing",
                    city,
                    payload.cod
                );
                self.notify(PollEvent::FetchFailed {
                    city: city.to_string(),
                    reason: format!("weather API reported status {}", payload.cod),
                });
                return Ok(None);
            }
            FetchOutcome::NoData(reason) => {
                self.notify(PollEvent::FetchFailed {
                    city: city.to_string(),
                    reason: reason.to_string(),
                });
                return Ok(None);
            }
        };

        let reading = payload.into_reading(Local::now().naive_local());
        self.store.append(reading.clone()).await?;
        tracing::info!(
            "Stored reading for {}: {:.2} °F",
            reading.city(),
            reading.temperature()
        );

        self.notify(PollEvent::NewReading(reading.clone()));
        Ok(Some(reading))
    }

    /// One full cycle for `city`: fetch, store, prune, compute the next wake.
    pub async fn run_cycle(&self, city: &str) -> Result<CycleReport, AppError> {
        let stored = self.fetch_and_store(city).await?;

        let pruned = self
            .store
            .prune(self.retention, Local::now().naive_local())
            .await?;

        let readings = self.store.load_all().await?;
        let delay = next_wake_delay(readings.last(), Local::now().naive_local(), self.interval);

        Ok(CycleReport {
            stored,
            pruned,
            delay,
        })
    }

    /// Poll until `cancel` fires, always using the city currently in `city`.
    ///
    /// A city change takes effect on the next cycle.
    pub async fn run(&self, mut city: watch::Receiver<String>, cancel: CancellationToken) {
        tracing::info!("Poll scheduler started");

        loop {
            let current = city.borrow_and_update().clone();

            let cycle = tokio::select! {
                _ = cancel.cancelled() => break,
                cycle = self.run_cycle(&current) => cycle,
            };

            let delay = match cycle {
                Ok(report) => report.pause(self.interval),
                Err(e) => {
                    tracing::error!("Poll cycle for {} failed: {}", current, e);
                    self.interval
                }
            };
            tracing::debug!("Next poll in {:?}", delay);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Poll scheduler stopped");
    }

    fn notify(&self, event: PollEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No listener for poll events");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn reading_at(datetime: NaiveDateTime) -> Reading {
        let payload = serde_json::json!({
            "cod": 200,
            "name": "Omaha",
            "main": {"temp": 280.0, "pressure": 1000, "humidity": 40}
        });
        serde_json::from_value::<skylog_weather::WeatherPayload>(payload)
            .unwrap()
            .into_reading(datetime)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_failed_cycle_on_empty_store_waits_one_interval() {
        let report = CycleReport {
            stored: None,
            pruned: 0,
            delay: next_wake_delay(None, at(12, 0, 0), MINUTE),
        };
        assert_eq!(report.delay, Duration::ZERO);
        assert_eq!(report.pause(MINUTE), MINUTE);
    }

    #[test]
    fn test_stored_cycle_sleeps_computed_delay() {
        let last = reading_at(at(12, 0, 0));
        let report = CycleReport {
            stored: Some(last.clone()),
            pruned: 0,
            delay: next_wake_delay(Some(&last), at(12, 0, 15), MINUTE),
        };
        assert_eq!(report.pause(MINUTE), Duration::from_secs(45));

        // Overdue after a successful store still retries at once
        let overdue = CycleReport {
            delay: Duration::ZERO,
            ..report
        };
        assert_eq!(overdue.pause(MINUTE), Duration::ZERO);
    }

    #[test]
    fn test_empty_store_wakes_immediately() {
        assert_eq!(next_wake_delay(None, at(12, 0, 0), MINUTE), Duration::ZERO);
    }

    #[test]
    fn test_wakes_one_interval_after_last_reading() {
        let last = reading_at(at(12, 0, 0));
        assert_eq!(
            next_wake_delay(Some(&last), at(12, 0, 30), MINUTE),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_overdue_wake_is_zero() {
        let last = reading_at(at(12, 0, 0));
        assert_eq!(
            next_wake_delay(Some(&last), at(12, 5, 0), MINUTE),
            Duration::ZERO
        );
        assert_eq!(
            next_wake_delay(Some(&last), at(12, 1, 0), MINUTE),
            Duration::ZERO
        );
    }

    #[test]
    fn test_reading_in_future_waits_longer() {
        // Clock went backwards since the reading was stored
        let last = reading_at(at(12, 0, 0));
        assert_eq!(
            next_wake_delay(Some(&last), at(11, 59, 0), MINUTE),
            Duration::from_secs(120)
        );
    }
}
