//! Background services: the single-writer store worker, the poll scheduler
//! and the session that owns them.

pub mod poller;
pub mod session;
pub mod store_worker;

pub use poller::{next_wake_delay, CycleReport, PollEvent, PollScheduler};
pub use session::Session;
pub use store_worker::{StoreHandle, StoreWorker};
