//! Single-writer access to the reading store.
//!
//! One blocking thread owns the [`ReadingStore`] and applies commands in the
//! order they arrive. Everything else talks to it through a cloneable
//! [`StoreHandle`], so the scheduler and the session never race on the file.

use chrono::{NaiveDateTime, TimeDelta};
use skylog_core::{AppError, StorageError};
use skylog_weather::{Reading, ReadingStore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Commands queued ahead of the worker before senders wait
const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, StorageError>>;

enum StoreCommand {
    Append { reading: Reading, reply: Reply<()> },
    LoadAll { reply: Reply<Vec<Reading>> },
    Prune {
        retention: TimeDelta,
        now: NaiveDateTime,
        reply: Reply<usize>,
    },
}

/// Cloneable front end for the store worker.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl std::fmt::Debug for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreCommand::Append { reading, .. } => write!(f, "Append({})", reading.city()),
            StoreCommand::LoadAll { .. } => write!(f, "LoadAll"),
            StoreCommand::Prune { now, .. } => write!(f, "Prune({})", now),
        }
    }
}

/// Owner of the worker thread. Resolves once every [`StoreHandle`] is gone.
#[derive(Debug)]
pub struct StoreWorker {
    handle: JoinHandle<()>,
}

/// Start the worker for `store`. Must be called inside a Tokio runtime.
pub fn spawn(store: ReadingStore) -> (StoreHandle, StoreWorker) {
    let (tx, mut rx) = mpsc::channel::<StoreCommand>(COMMAND_BUFFER);

    let handle = tokio::task::spawn_blocking(move || {
        tracing::debug!("Store worker started for {}", store.path().display());

        while let Some(command) = rx.blocking_recv() {
            tracing::trace!("Store command: {:?}", command);
            // A dropped reply means the caller gave up; the write still happened
            match command {
                StoreCommand::Append { reading, reply } => {
                    let _ = reply.send(store.append(reading));
                }
                StoreCommand::LoadAll { reply } => {
                    let _ = reply.send(store.load_all());
                }
                StoreCommand::Prune {
                    retention,
                    now,
                    reply,
                } => {
                    let _ = reply.send(store.prune(retention, now));
                }
            }
        }

        tracing::debug!("Store worker stopped");
    });

    (StoreHandle { tx }, StoreWorker { handle })
}

impl StoreHandle {
    pub async fn append(&self, reading: Reading) -> Result<(), AppError> {
        self.request(|reply| StoreCommand::Append { reading, reply })
            .await
    }

    pub async fn load_all(&self) -> Result<Vec<Reading>, AppError> {
        self.request(|reply| StoreCommand::LoadAll { reply }).await
    }

    /// Drop readings older than `now - retention`. Returns how many went.
    pub async fn prune(&self, retention: TimeDelta, now: NaiveDateTime) -> Result<usize, AppError> {
        self.request(|reply| StoreCommand::Prune {
            retention,
            now,
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> StoreCommand,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| worker_gone())?;

        let result = response.await.map_err(|_| worker_gone())?;
        Ok(result?)
    }
}

impl StoreWorker {
    /// Wait for the worker thread to finish its queue and exit.
    pub async fn join(self) -> Result<(), AppError> {
        self.handle
            .await
            .map_err(|e| AppError::Service(format!("store worker panicked: {}", e)))
    }
}

fn worker_gone() -> AppError {
    AppError::Service("store worker is not running".to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn reading(city: &str, datetime: NaiveDateTime) -> Reading {
        let payload = serde_json::json!({
            "cod": 200,
            "name": city,
            "main": {"temp": 290.0, "pressure": 1010, "humidity": 50},
            "weather": [{"description": "mist"}]
        });
        serde_json::from_value::<skylog_weather::WeatherPayload>(payload)
            .unwrap()
            .into_reading(datetime)
    }

    #[tokio::test]
    async fn test_commands_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (store, worker) = spawn(ReadingStore::new(dir.path().join("data.json")));

        store.append(reading("Omaha", at(1))).await.unwrap();
        store.append(reading("Paris", at(2))).await.unwrap();

        let all = store.load_all().await.unwrap();
        let cities: Vec<_> = all.iter().map(|r| r.city().to_string()).collect();
        assert_eq!(cities, ["Omaha", "Paris"]);

        drop(store);
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (store, worker) = spawn(ReadingStore::new(dir.path().join("data.json")));

        let tasks: Vec<_> = (0..10)
            .map(|hour| {
                let store = store.clone();
                tokio::spawn(async move { store.append(reading("Omaha", at(hour))).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.load_all().await.unwrap().len(), 10);

        drop(store);
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (store, worker) = spawn(ReadingStore::new(dir.path().join("data.json")));

        store.append(reading("Omaha", at(1))).await.unwrap();
        store.append(reading("Omaha", at(10))).await.unwrap();

        let removed = store.prune(TimeDelta::hours(3), at(11)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        drop(store);
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_error_reaches_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "not json").unwrap();
        let (store, worker) = spawn(ReadingStore::new(&path));

        let err = store.load_all().await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Corrupt { .. })));

        drop(store);
        worker.join().await.unwrap();
    }
}
