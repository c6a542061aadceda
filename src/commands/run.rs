use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};

use pacer::config::{format_duration, Config};
use pacer::scheduler::{
    ChannelExecutor, DispatchRequest, DistributionEvent, PersistenceAdapter, SchedulerHandle,
    DEFAULT_EVENT_CAPACITY,
};
use pacer::storage::open_store;

/// Recover or start a run and drive it until it finishes
///
/// Ctrl-C pauses the run; the next `run` picks it up where it stopped.
pub async fn run(config: &Config, exec: Option<String>, fresh: bool) -> Result<()> {
    let spec = config.schedule.to_spec().context("Invalid schedule")?;
    let store = open_store(&config.storage)?;

    if fresh {
        store.clear().context("Failed to discard saved state")?;
        tracing::info!("Discarded saved distribution state");
    }

    let (executor, dispatches) = ChannelExecutor::new();
    let worker = tokio::spawn(dispatch_worker(dispatches, exec));

    let handle = SchedulerHandle::spawn(store, executor, DEFAULT_EVENT_CAPACITY);
    let mut events = handle.subscribe();

    if handle.recover().await {
        if handle.is_paused().await {
            println!("Resuming paused distribution");
            handle.resume().await;
        } else {
            println!("Continuing interrupted distribution");
        }
    } else {
        handle
            .configure(spec)
            .await
            .context("Failed to configure schedule")?;
        if !handle.start().await {
            anyhow::bail!("Failed to start distribution");
        }
        println!(
            "Started {} requests over {}",
            config.schedule.total_requests,
            format_duration(config.schedule.window()?)
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DistributionEvent::StatusChanged { running: false, progress }) => {
                    if handle.is_running().await {
                        continue;
                    }
                    println!("Distribution finished at {progress}%");
                    break;
                }
                Ok(DistributionEvent::StatusChanged { running: true, progress }) => {
                    println!("Running ({progress}%)");
                }
                Ok(DistributionEvent::RequestScheduled { delay, index, total }) => {
                    println!(
                        "Request {}/{} in {:.1}s",
                        index + 1,
                        total,
                        delay.as_secs_f64()
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                println!("Interrupted, pausing distribution");
                handle.pause().await;
                break;
            }
        }
    }

    let status = handle.status().await;
    handle.shutdown().await;
    drop(handle);

    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Dispatch worker failed");
    }

    if let Some(status) = status {
        print!("{}", status.display());
    }
    Ok(())
}

/// Perform dispatches handed off by the scheduler
///
/// Runs until the scheduler (and with it the executor) is dropped. Commands
/// run one at a time; a slow command delays later dispatches but never the
/// schedule itself.
async fn dispatch_worker(
    mut dispatches: mpsc::UnboundedReceiver<DispatchRequest>,
    exec: Option<String>,
) {
    while let Some(request) = dispatches.recv().await {
        match exec.as_deref() {
            Some(command) => run_command(command, &request).await,
            None => println!("-> request {}/{}", request.index + 1, request.total),
        }
    }
    tracing::debug!("Dispatch worker exiting");
}

async fn run_command(command: &str, request: &DispatchRequest) {
    let result = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("PACER_INDEX", request.index.to_string())
        .env("PACER_TOTAL", request.total.to_string())
        .status()
        .await;

    match result {
        Ok(status) if status.success() => {
            tracing::debug!(index = request.index, "Command succeeded");
        }
        Ok(status) => {
            tracing::warn!(index = request.index, code = ?status.code(), "Command failed");
        }
        Err(e) => {
            tracing::warn!(index = request.index, error = %e, "Failed to spawn command");
        }
    }
}
