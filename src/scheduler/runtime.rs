//! Tokio scheduling context
//!
//! [`SchedulerHandle`] runs a [`DistributionScheduler`] on its own task and
//! marshals every call onto it over a command channel, so the state machine
//! has exactly one writer no matter how many tasks hold a handle. Timer
//! firings come back to the same task through [`TokioTimer`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::engine::DistributionScheduler;
use super::error::{SchedulerError, SchedulerResult};
use super::executor::RequestExecutor;
use super::listener::{BroadcastListener, DistributionEvent, DistributionListener, ListenerId};
use super::persistence::PersistenceAdapter;
use super::spec::ScheduleSpec;
use super::state::{DistributionStatus, SchedulerPhase};
use super::timer::{TimerHandle, TimerService};

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ============================================================================
// Tokio Timer
// ============================================================================

/// Timer backed by tokio sleep tasks
///
/// Each armed delay is a task that sleeps and then posts its handle back to
/// the scheduling task. Cancelling aborts the task.
struct TokioTimer {
    next_id: u64,
    fired_tx: mpsc::UnboundedSender<TimerHandle>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioTimer {
    fn new(fired_tx: mpsc::UnboundedSender<TimerHandle>) -> Self {
        Self {
            next_id: 0,
            fired_tx,
            tasks: HashMap::new(),
        }
    }
}

impl TimerService for TokioTimer {
    fn post_delayed(&mut self, delay: Duration) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let handle = TimerHandle::new(self.next_id);
        let fired_tx = self.fired_tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired_tx.send(handle);
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Configure(ScheduleSpec, Reply<SchedulerResult<()>>),
    Start(Reply<SchedulerResult<()>>),
    Pause(Reply<SchedulerResult<()>>),
    Resume(Reply<SchedulerResult<()>>),
    Stop(Reply<SchedulerResult<()>>),
    Recover(Reply<SchedulerResult<bool>>),
    Status(Reply<DistributionStatus>),
    EstimatedCompletion(Reply<DateTime<Utc>>),
    AddListener(Arc<dyn DistributionListener>, Reply<ListenerId>),
    RemoveListener(ListenerId),
    Shutdown(Reply<()>),
}

// ============================================================================
// Scheduler Handle
// ============================================================================

/// Cloneable handle to a scheduler running on its own tokio task
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<DistributionEvent>,
}

impl SchedulerHandle {
    /// Spawn the scheduling task
    ///
    /// Must be called from within a tokio runtime. The task runs until every
    /// handle is dropped or [`shutdown`](Self::shutdown) is called; pending
    /// timers are aborted when it exits.
    pub fn spawn(
        persistence: impl PersistenceAdapter + 'static,
        executor: impl RequestExecutor + 'static,
        event_capacity: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_capacity.max(1));

        let mut scheduler =
            DistributionScheduler::new(persistence, executor, TokioTimer::new(fired_tx));
        scheduler.add_listener(Arc::new(BroadcastListener::new(events.clone())));

        tokio::spawn(run_loop(scheduler, command_rx, fired_rx));

        Self {
            commands: command_tx,
            events,
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DistributionEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(make(tx)).is_err() {
            tracing::warn!("Scheduler task has exited");
            return None;
        }
        rx.await.ok()
    }

    async fn transition(&self, make: impl FnOnce(Reply<SchedulerResult<()>>) -> Command) -> bool {
        match self.request(make).await {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                // Rejected transitions are already logged by the scheduler
                if !e.is_transition_rejected() {
                    tracing::warn!(error = %e, "Scheduler command failed");
                }
                false
            }
            None => false,
        }
    }

    /// Install a schedule
    pub async fn configure(&self, spec: ScheduleSpec) -> SchedulerResult<()> {
        self.request(|reply| Command::Configure(spec, reply))
            .await
            .unwrap_or(Err(SchedulerError::invalid_state("configure", "shut down")))
    }

    /// Start a fresh run; false if rejected
    pub async fn start(&self) -> bool {
        self.transition(Command::Start).await
    }

    /// Pause the run; false if rejected
    pub async fn pause(&self) -> bool {
        self.transition(Command::Pause).await
    }

    /// Resume a paused run; false if rejected
    pub async fn resume(&self) -> bool {
        self.transition(Command::Resume).await
    }

    /// Stop the run; false if rejected
    pub async fn stop(&self) -> bool {
        self.transition(Command::Stop).await
    }

    /// Restore a persisted run; false if there was nothing to restore
    pub async fn recover(&self) -> bool {
        match self.request(Command::Recover).await {
            Some(Ok(restored)) => restored,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Recovery rejected");
                false
            }
            None => false,
        }
    }

    /// Point-in-time snapshot, `None` once the task has exited
    pub async fn status(&self) -> Option<DistributionStatus> {
        self.request(Command::Status).await
    }

    pub async fn is_running(&self) -> bool {
        self.phase().await == SchedulerPhase::Running
    }

    pub async fn is_paused(&self) -> bool {
        self.phase().await == SchedulerPhase::Paused
    }

    async fn phase(&self) -> SchedulerPhase {
        self.status().await.map(|s| s.phase).unwrap_or_default()
    }

    /// Progress of the current or most recent run (0-100)
    pub async fn progress(&self) -> u8 {
        self.status().await.map_or(0, |s| s.progress)
    }

    pub async fn estimated_remaining(&self) -> Duration {
        self.status().await.map_or(Duration::ZERO, |s| s.remaining)
    }

    pub async fn estimated_completion_time(&self) -> DateTime<Utc> {
        self.request(Command::EstimatedCompletion)
            .await
            .unwrap_or_else(Utc::now)
    }

    /// Register a callback listener on the scheduling task
    pub async fn add_listener(
        &self,
        listener: Arc<dyn DistributionListener>,
    ) -> Option<ListenerId> {
        self.request(|reply| Command::AddListener(listener, reply)).await
    }

    /// Unregister a callback listener
    pub fn remove_listener(&self, id: ListenerId) {
        let _ = self.commands.send(Command::RemoveListener(id));
    }

    /// Stop the scheduling task; the persisted run is left untouched
    pub async fn shutdown(&self) {
        let _ = self.request(Command::Shutdown).await;
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("closed", &self.commands.is_closed())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

async fn run_loop(
    mut scheduler: DistributionScheduler,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut fired: mpsc::UnboundedReceiver<TimerHandle>,
) {
    tracing::debug!("Scheduler task started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !handle_command(&mut scheduler, command) {
                    break;
                }
            }
            Some(handle) = fired.recv() => {
                scheduler.on_timer_fired(handle);
            }
        }
    }

    tracing::debug!(phase = %scheduler.phase(), "Scheduler task exiting");
}

/// Apply one command; false when the loop should exit
fn handle_command(scheduler: &mut DistributionScheduler, command: Command) -> bool {
    match command {
        Command::Configure(spec, reply) => {
            let _ = reply.send(scheduler.configure(spec));
        }
        Command::Start(reply) => {
            let _ = reply.send(scheduler.start());
        }
        Command::Pause(reply) => {
            let _ = reply.send(scheduler.pause());
        }
        Command::Resume(reply) => {
            let _ = reply.send(scheduler.resume());
        }
        Command::Stop(reply) => {
            let _ = reply.send(scheduler.stop());
        }
        Command::Recover(reply) => {
            let _ = reply.send(scheduler.recover());
        }
        Command::Status(reply) => {
            let _ = reply.send(scheduler.status());
        }
        Command::EstimatedCompletion(reply) => {
            let _ = reply.send(scheduler.estimated_completion_time());
        }
        Command::AddListener(listener, reply) => {
            let _ = reply.send(scheduler.add_listener(listener));
        }
        Command::RemoveListener(id) => {
            scheduler.remove_listener(id);
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(());
            return false;
        }
    }
    true
}
