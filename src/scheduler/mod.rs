//! Traffic distribution scheduling
//!
//! This module spreads a fixed number of requests over a time window and
//! dispatches them one at a time, surviving pauses and process restarts
//! without losing its place.
//!
//! # Overview
//!
//! A [`ScheduleSpec`] describes *what* to send: how many requests, over how
//! long, and with which temporal [`DistributionPattern`]. The
//! [`calculator`] turns it into a [`DelaySequence`] of waits between
//! consecutive requests. The [`DistributionScheduler`] walks that sequence,
//! calling a [`RequestExecutor`] once per request and mirroring its
//! [`DistributionState`] to a [`PersistenceAdapter`] after every transition.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   commands   ┌──────────────────────────────────┐
//! │ Scheduler    │ ───────────► │        scheduling task           │
//! │ Handle (N)   │ ◄─────────── │  ┌────────────────────────────┐  │
//! └──────────────┘   replies    │  │  DistributionScheduler     │  │
//!        ▲                      │  │  Idle ─► Running ⇄ Paused  │  │
//!        │ events               │  └──┬─────────┬─────────┬─────┘  │
//!        │ (broadcast)          │     │         │         │        │
//!        └──────────────────────┼─ Listeners  Executor  Persistence│
//!                               │     ▲                            │
//!                               │  TimerFired(handle)              │
//!                               └─────┼────────────────────────────┘
//!                                     │
//!                               ┌─────┴──────┐
//!                               │ TokioTimer │
//!                               └────────────┘
//! ```
//!
//! # Modules
//!
//! - [`spec`] - Schedule description and validation
//! - [`calculator`] - Delay sequence computation (uniform, peak-weighted, jitter)
//! - [`state`] - Persisted run state and status snapshots
//! - [`engine`] - The synchronous state machine
//! - [`runtime`] - Tokio scheduling task and async handle
//! - [`timer`] - Timer and clock seams
//! - [`executor`] - Request executors
//! - [`listener`] - Progress observers and event broadcasting
//! - [`persistence`] - Durable state adapter trait
//!
//! # Quick Start
//!
//! ```ignore
//! use pacer::scheduler::{LoggingExecutor, ScheduleSpec, SchedulerHandle};
//! use pacer::storage::FileStateStore;
//! use std::time::Duration;
//!
//! let store = FileStateStore::new("pacer-state.json");
//! let handle = SchedulerHandle::spawn(store, LoggingExecutor, 256);
//!
//! if !handle.recover().await {
//!     handle.configure(ScheduleSpec::uniform(100, Duration::from_secs(3600))?).await?;
//!     handle.start().await;
//! }
//! ```

pub mod calculator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod listener;
pub mod persistence;
pub mod runtime;
pub mod spec;
pub mod state;
pub mod timer;

pub use calculator::{compute, DelaySequence};
pub use engine::DistributionScheduler;
pub use error::{SchedulerError, SchedulerResult};
pub use executor::{ChannelExecutor, DispatchRequest, LoggingExecutor, RequestExecutor};
pub use listener::{
    BroadcastListener, DistributionEvent, DistributionListener, ListenerId, ListenerRegistry,
};
pub use persistence::PersistenceAdapter;
pub use runtime::{SchedulerHandle, DEFAULT_EVENT_CAPACITY};
pub use spec::{
    DistributionPattern, Jitter, PeakWindow, ScheduleSpec, ScheduleSpecBuilder, MAX_DURATION_WINDOW,
};
pub use state::{progress_percent, DistributionState, DistributionStatus, SchedulerPhase};
pub use timer::{ArmedTimer, Clock, FixedClock, ManualTimer, SystemClock, TimerHandle, TimerService};
