//! Retry actor: an isolated Tokio task that owns the pending flush queue.
//!
//! Callers talk to it through a [`FlushRetryHandle`] over an mpsc
//! channel; nothing else touches the pending map.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_protocol::UserId;
use gatehouse_store::GameStateService;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::{RetryConfig, RetryError, RetryStats};

enum RetryCommand {
    Enqueue(UserId),
    Stats(oneshot::Sender<RetryStats>),
    Shutdown,
}

/// Handle to a running retry worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FlushRetryHandle {
    sender: mpsc::Sender<RetryCommand>,
}

impl FlushRetryHandle {
    /// Schedules a flush retry for `user`.
    ///
    /// Never waits: teardown paths call this and must not block on a
    /// busy worker. A user that is already pending is not queued twice.
    pub fn enqueue(&self, user: UserId) -> Result<(), RetryError> {
        self.sender
            .try_send(RetryCommand::Enqueue(user))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(RetryCommand::Enqueue(user)) => {
                    RetryError::QueueFull(user)
                }
                _ => RetryError::Closed,
            })
    }

    /// Returns the worker's counters.
    pub async fn stats(&self) -> Result<RetryStats, RetryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RetryCommand::Stats(reply_tx))
            .await
            .map_err(|_| RetryError::Closed)?;
        reply_rx.await.map_err(|_| RetryError::Closed)
    }

    /// Stops the worker. Pending retries are dropped with a warning.
    pub async fn shutdown(&self) -> Result<(), RetryError> {
        self.sender
            .send(RetryCommand::Shutdown)
            .await
            .map_err(|_| RetryError::Closed)
    }
}

/// Spawns the retry worker on the current Tokio runtime.
pub fn spawn_flush_worker<S: GameStateService>(
    service: Arc<S>,
    config: RetryConfig,
) -> FlushRetryHandle {
    let config = config.validated();
    let (sender, receiver) = mpsc::channel(config.queue_capacity);
    let worker = RetryWorker {
        service,
        config,
        pending: HashMap::new(),
        stats: RetryStats::default(),
        receiver,
    };
    tokio::spawn(worker.run());
    FlushRetryHandle { sender }
}

struct PendingFlush {
    /// Attempts already made by the worker.
    attempts: u32,
    due: Instant,
}

struct RetryWorker<S: GameStateService> {
    service: Arc<S>,
    config: RetryConfig,
    pending: HashMap<UserId, PendingFlush>,
    stats: RetryStats,
    receiver: mpsc::Receiver<RetryCommand>,
}

impl<S: GameStateService> RetryWorker<S> {
    async fn run(mut self) {
        debug!(
            max_attempts = self.config.max_attempts,
            "flush retry worker started"
        );

        loop {
            let next_due = self.pending.values().map(|p| p.due).min();
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RetryCommand::Enqueue(user)) => self.schedule(user),
                    Some(RetryCommand::Stats(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(RetryCommand::Shutdown) | None => break,
                },
                _ = wait_until(next_due) => self.run_due().await,
            }
        }

        if !self.pending.is_empty() {
            warn!(
                pending = self.pending.len(),
                "flush retry worker stopped with retries outstanding"
            );
        }
        debug!("flush retry worker stopped");
    }

    fn schedule(&mut self, user: UserId) {
        if self.pending.contains_key(&user) {
            debug!(%user, "flush retry already pending");
            return;
        }
        let due = Instant::now() + self.config.backoff_with_jitter(1);
        debug!(%user, "flush retry scheduled");
        self.pending.insert(user, PendingFlush { attempts: 0, due });
    }

    async fn run_due(&mut self) {
        let now = Instant::now();
        let due: Vec<UserId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(user, _)| user.clone())
            .collect();

        for user in due {
            let result = match time::timeout(
                self.config.attempt_timeout,
                self.service.persist_for_identity(&user),
            )
            .await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", self.config.attempt_timeout)),
            };
            let Some(entry) = self.pending.get_mut(&user) else {
                continue;
            };
            entry.attempts += 1;
            let attempts = entry.attempts;

            match result {
                Ok(()) => {
                    self.pending.remove(&user);
                    self.stats.succeeded += 1;
                    info!(%user, attempts, "game state flushed on retry");
                }
                Err(e) if attempts >= self.config.max_attempts => {
                    self.pending.remove(&user);
                    self.stats.failed += 1;
                    self.stats.abandoned += 1;
                    error!(%user, attempts, error = %e, "giving up on game state flush");
                }
                Err(e) => {
                    self.stats.failed += 1;
                    entry.due =
                        Instant::now() + self.config.backoff_with_jitter(attempts + 1);
                    warn!(%user, attempts, error = %e, "game state flush retry failed");
                }
            }
        }
    }

    fn snapshot(&self) -> RetryStats {
        RetryStats {
            pending: self.pending.len(),
            ..self.stats.clone()
        }
    }
}

/// Sleeps until `due`, or forever when nothing is scheduled so that
/// `select!` only wakes for commands.
async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => time::sleep_until(due).await,
        None => std::future::pending::<()>().await,
    }
}
