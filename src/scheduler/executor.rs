//! Request executors
//!
//! A [`RequestExecutor`] performs one logical request per tick. The scheduler
//! calls it exactly once per index, in increasing order, never concurrently,
//! and advances regardless of what the request did.
//!
//! # Contract for implementers
//!
//! `execute` runs on the scheduling context and must return promptly; long
//! work belongs on the executor's own task or thread (see
//! [`ChannelExecutor`]). Failures must be handled inside the executor: the
//! scheduler has no success/failure channel and does not catch panics, so a
//! panic escaping `execute` takes down the scheduling context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Performs one logical request
pub trait RequestExecutor: Send {
    fn execute(&mut self, index: usize, total: usize);
}

impl<F> RequestExecutor for F
where
    F: FnMut(usize, usize) + Send,
{
    fn execute(&mut self, index: usize, total: usize) {
        self(index, total)
    }
}

/// Executor that only records the dispatch in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExecutor;

impl RequestExecutor for LoggingExecutor {
    fn execute(&mut self, index: usize, total: usize) {
        tracing::info!(index, total, "Dispatched request {}/{}", index + 1, total);
    }
}

/// One dispatch handed off to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub index: usize,
    pub total: usize,
    pub dispatched_at: DateTime<Utc>,
}

/// Executor that forwards each dispatch to a worker over a channel
///
/// `execute` never blocks; the receiving side performs the actual request in
/// its own concurrency domain.
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    tx: mpsc::UnboundedSender<DispatchRequest>,
}

impl ChannelExecutor {
    /// Create an executor and the receiver its dispatches arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RequestExecutor for ChannelExecutor {
    fn execute(&mut self, index: usize, total: usize) {
        let request = DispatchRequest {
            index,
            total,
            dispatched_at: Utc::now(),
        };

        if self.tx.send(request).is_err() {
            tracing::warn!(index, total, "Dispatch worker is gone, request dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_executor() {
        let mut seen = Vec::new();
        {
            let mut exec = |index: usize, total: usize| seen.push((index, total));
            exec.execute(0, 3);
            exec.execute(1, 3);
        }
        assert_eq!(seen, vec![(0, 3), (1, 3)]);
    }

    #[test]
    fn test_channel_executor_forwards() {
        let (mut exec, mut rx) = ChannelExecutor::new();
        exec.execute(2, 10);

        let request = rx.try_recv().unwrap();
        assert_eq!(request.index, 2);
        assert_eq!(request.total, 10);
    }

    #[test]
    fn test_channel_executor_survives_closed_worker() {
        let (mut exec, rx) = ChannelExecutor::new();
        drop(rx);
        exec.execute(0, 1);
    }
}
