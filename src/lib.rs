//! pacer - time-distributed request scheduler
//!
//! Spreads a fixed number of requests over a time window following a
//! temporal pattern, dispatching them one at a time with pause/resume and
//! crash recovery.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scheduler`] - Delay computation and the distribution state machine
//! - [`storage`] - Durable state backends (JSON file, SQLite, memory)
//! - [`config`] - Configuration management and settings
//!
//! # Example
//!
//! ```no_run
//! use pacer::config::Config;
//! use pacer::scheduler::{LoggingExecutor, SchedulerHandle, DEFAULT_EVENT_CAPACITY};
//! use pacer::storage::open_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = open_store(&config.storage)?;
//!     let handle = SchedulerHandle::spawn(store, LoggingExecutor, DEFAULT_EVENT_CAPACITY);
//!
//!     if !handle.recover().await {
//!         handle.configure(config.schedule.to_spec()?).await?;
//!         handle.start().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::scheduler::{
        DistributionEvent, DistributionListener, DistributionPattern, DistributionScheduler,
        DistributionState, DistributionStatus, PeakWindow, PersistenceAdapter, RequestExecutor,
        ScheduleSpec, SchedulerError, SchedulerHandle, SchedulerPhase, SchedulerResult,
        TimerService,
    };
    pub use crate::storage::{FileStateStore, MemoryStateStore, SqliteStateStore};
}
