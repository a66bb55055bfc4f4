//! Session context tying the scheduler, the store worker and the city list
//! together.
//!
//! A `Session` is created once at startup and handed to whatever drives the
//! user interaction. The selected city lives in a watch channel the scheduler
//! reads from, so there is no shared global.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeDelta};
use parking_lot::Mutex;
use skylog_core::{AppError, ConfigError, Settings};
use skylog_weather::cities::DEFAULT_CITIES;
use skylog_weather::{
    forecast_message, history, predict_next_day, CityList, Reading, ReadingStore, WeatherProvider,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::poller::{PollEvent, PollScheduler};
use crate::store_worker::{self, StoreHandle, StoreWorker};

pub struct Session {
    store: StoreHandle,
    scheduler: Arc<PollScheduler>,
    cities: Arc<Mutex<CityList>>,
    city_tx: watch::Sender<String>,
    cancel: CancellationToken,
    poller: JoinHandle<()>,
    store_worker: StoreWorker,
}

impl Session {
    /// Load the city list, start the store worker and the poll scheduler.
    ///
    /// Polling starts right away with the first listed city. Must be called
    /// inside a Tokio runtime. Stored and failed fetches are reported on the
    /// returned receiver.
    pub fn start(settings: &Settings) -> Result<(Self, mpsc::UnboundedReceiver<PollEvent>), AppError> {
        let validation = settings.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        let cities = CityList::load(&settings.cities_file_name)?;
        let initial = cities.first().unwrap_or(DEFAULT_CITIES[0]).to_string();
        let provider = WeatherProvider::from_settings(settings)?;

        let (store, store_worker) =
            store_worker::spawn(ReadingStore::new(&settings.json_file_name));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (city_tx, city_rx) = watch::channel(initial.clone());
        let cancel = CancellationToken::new();

        let scheduler = Arc::new(PollScheduler::from_settings(
            settings,
            provider,
            store.clone(),
            events_tx,
        ));

        let poller = tokio::spawn({
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            async move { scheduler.run(city_rx, cancel).await }
        });

        tracing::info!(
            "Session started for {} (polling every {:?})",
            initial,
            scheduler.interval()
        );

        Ok((
            Self {
                store,
                scheduler,
                cities: Arc::new(Mutex::new(cities)),
                city_tx,
                cancel,
                poller,
                store_worker,
            },
            events_rx,
        ))
    }

    pub fn current_city(&self) -> String {
        self.city_tx.borrow().clone()
    }

    pub fn cities(&self) -> Vec<String> {
        self.cities.lock().names().to_vec()
    }

    /// Switch polling to `name`.
    ///
    /// New names are added to the saved city list. When the store has never
    /// seen the city, one reading is fetched right away instead of waiting for
    /// the next cycle.
    pub async fn select_city(&self, name: &str) -> Result<Option<Reading>, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidCity(name.to_string()));
        }

        let cities = self.cities.clone();
        let added = name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut cities = cities.lock();
            if cities.add(&added) {
                cities.save()?;
                tracing::info!("Added {} to {}", added, cities.path().display());
            }
            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Service(format!("city list update panicked: {}", e)))??;

        self.city_tx.send_replace(name.to_string());
        tracing::info!("Selected city {}", name);

        let readings = self.store.load_all().await?;
        if history::has_city(&readings, name) {
            return Ok(None);
        }

        self.scheduler.fetch_and_store(name).await
    }

    /// Latest stored reading for the selected city.
    pub async fn current_conditions(&self) -> Result<Option<Reading>, AppError> {
        let city = self.current_city();
        let readings = self.store.load_all().await?;
        Ok(history::latest_for_city(&readings, &city).cloned())
    }

    /// Readings for the selected city from the last `window`.
    pub async fn history(&self, window: Duration) -> Result<Vec<Reading>, AppError> {
        let city = self.current_city();
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let since = Local::now()
            .naive_local()
            .checked_sub_signed(window)
            .unwrap_or(chrono::NaiveDateTime::MIN);

        let readings = self.store.load_all().await?;
        Ok(history::for_city_since(&readings, &city, since)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Forecast for the selected city 24 hours from now, as display text.
    ///
    /// Never fails: errors are folded into the message.
    pub async fn predict_next_day(&self) -> String {
        let city = self.current_city();
        let result = match self.store.load_all().await {
            Ok(readings) => predict_next_day(&readings, Some(&city), Local::now().naive_local()),
            Err(e) => {
                tracing::error!("Could not load readings for forecast: {}", e);
                return format!("An error occurred while predicting tomorrow's temperature: {e}");
            }
        };

        if let Err(e) = &result {
            tracing::warn!("Forecast for {} failed: {}", city, e);
        }
        forecast_message(&result)
    }

    /// Stop the scheduler, then let the store worker drain and exit.
    pub async fn shutdown(self) -> Result<(), AppError> {
        let Session {
            store,
            scheduler,
            cancel,
            poller,
            store_worker,
            ..
        } = self;

        cancel.cancel();
        poller
            .await
            .map_err(|e| AppError::Service(format!("poll scheduler panicked: {}", e)))?;

        // The worker exits once the last handle is gone
        drop(scheduler);
        drop(store);
        store_worker.join().await?;

        tracing::info!("Session shut down");
        Ok(())
    }
}
