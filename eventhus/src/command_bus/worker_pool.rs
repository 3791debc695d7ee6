use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::CommandBus;
use crate::command::CommandEnvelope;
use crate::command_register::CommandRegister;
use crate::config::{CommandBusConfig, OverflowPolicy};
use crate::errors::{CommandError, CommandResult};

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Between commands.
    Idle = 0,
    /// Waiting on the shared queue.
    Dequeuing = 1,
    /// Running a handler.
    Handling = 2,
    /// Exited after shutdown.
    Stopped = 3,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Dequeuing,
            2 => Self::Handling,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
struct WorkerSlot(AtomicU8);

impl WorkerSlot {
    const fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Idle as u8))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Counters for the async bus.
///
/// The async bus cannot hand handler results back to submitters, so these
/// counters (together with the log) are how outcomes are observed.
#[derive(Debug, Default)]
pub struct DispatchStats {
    accepted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    conflicts: AtomicU64,
    domain_rejections: AtomicU64,
}

impl DispatchStats {
    /// Commands accepted into the queue.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Commands whose handler succeeded.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Acquire)
    }

    /// Commands whose handler failed, for any reason.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Failed commands that lost an optimistic-concurrency race.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Failed commands rejected by a business rule.
    pub fn domain_rejections(&self) -> u64 {
        self.domain_rejections.load(Ordering::Relaxed)
    }

    /// Commands handled so far, successfully or not.
    ///
    /// Acceptance is counted before a command enters the queue, so this never
    /// exceeds [`accepted`](Self::accepted) read afterwards.
    pub fn completed(&self) -> u64 {
        self.succeeded() + self.failed()
    }

    fn record(&self, result: &CommandResult<()>) {
        match result {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::Release);
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::Release);
                if error.is_concurrency_conflict() {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                } else if error.is_domain_rule_violation() {
                    self.domain_rejections.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<CommandEnvelope>>>;

/// Queues commands for a fixed pool of workers.
///
/// Submission returns once the command is accepted. Workers pull from one
/// shared queue, so commands for the same aggregate may run concurrently and
/// race on the expected version; the loser's conflict is logged and counted,
/// never retried. Callers needing per-aggregate ordering must wait for each
/// command's effect before submitting the next, or use the sync bus.
///
/// Construction spawns the workers and must happen inside a tokio runtime.
pub struct AsyncCommandBus {
    sender: Mutex<Option<mpsc::Sender<CommandEnvelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    slots: Arc<[WorkerSlot]>,
    stats: Arc<DispatchStats>,
    overflow: OverflowPolicy,
}

impl std::fmt::Debug for AsyncCommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCommandBus")
            .field("workers", &self.slots.len())
            .field("overflow", &self.overflow)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl AsyncCommandBus {
    /// Creates the queue and spawns the workers.
    pub fn new(register: Arc<CommandRegister>, config: CommandBusConfig) -> Self {
        let worker_count: usize = config.workers.into();
        let (sender, receiver) = mpsc::channel(config.queue_capacity.into());
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let slots: Arc<[WorkerSlot]> = (0..worker_count).map(|_| WorkerSlot::new()).collect();
        let stats = Arc::new(DispatchStats::default());

        let workers = (0..worker_count)
            .map(|index| {
                tokio::spawn(run_worker(
                    index,
                    Arc::clone(&receiver),
                    Arc::clone(&register),
                    Arc::clone(&slots),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = %config.queue_capacity,
            overflow = ?config.overflow,
            "async command bus started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            slots,
            stats,
            overflow: config.overflow,
        }
    }

    /// Outcome counters.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// A snapshot of every worker's state.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.slots.iter().map(WorkerSlot::get).collect()
    }

    /// Commands accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    /// Whether the bus still accepts commands.
    pub fn is_accepting(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Submits a command without ever waiting for queue capacity.
    ///
    /// # Errors
    /// * `CommandError::QueueFull` - the queue is at capacity
    /// * `CommandError::BusClosed` - the bus has been shut down
    pub fn try_handle_command(&self, command: CommandEnvelope) -> CommandResult<()> {
        let sender = self.current_sender()?;
        let result = match sender.try_reserve() {
            Ok(permit) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                permit.send(command);
                Ok(())
            }
            Err(TrySendError::Full(())) => {
                warn!(
                    command_type = command.command_type(),
                    aggregate_id = %command.aggregate_id(),
                    "command queue full, rejecting command"
                );
                Err(CommandError::QueueFull)
            }
            Err(TrySendError::Closed(())) => Err(CommandError::BusClosed),
        };
        result
    }

    /// Stops accepting commands, lets the workers drain everything already
    /// accepted, and waits for them to exit.
    ///
    /// Handlers in progress run to completion. Calling this twice is harmless.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            debug!("async command bus already shut down");
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(join_error) = worker.await {
                error!(error = %join_error, "command bus worker terminated abnormally");
            }
        }

        info!(
            accepted = self.stats.accepted(),
            succeeded = self.stats.succeeded(),
            failed = self.stats.failed(),
            "async command bus stopped"
        );
    }

    fn current_sender(&self) -> CommandResult<mpsc::Sender<CommandEnvelope>> {
        self.sender.lock().clone().ok_or(CommandError::BusClosed)
    }
}

#[async_trait]
impl CommandBus for AsyncCommandBus {
    async fn handle_command(&self, command: CommandEnvelope) -> CommandResult<()> {
        match self.overflow {
            OverflowPolicy::Reject => self.try_handle_command(command),
            OverflowPolicy::Block => {
                let sender = self.current_sender()?;
                let permit = sender.reserve().await.map_err(|_| CommandError::BusClosed)?;
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                permit.send(command);
                Ok(())
            }
        }
    }

    async fn shutdown(&self) {
        Self::shutdown(self).await;
    }
}

async fn run_worker(
    index: usize,
    receiver: SharedReceiver,
    register: Arc<CommandRegister>,
    slots: Arc<[WorkerSlot]>,
    stats: Arc<DispatchStats>,
) {
    let slot = &slots[index];
    debug!(worker = index, "command bus worker started");

    loop {
        slot.set(WorkerState::Dequeuing);
        let next = receiver.lock().await.recv().await;
        let Some(command) = next else {
            break;
        };

        slot.set(WorkerState::Handling);
        let command_type = command.command_type();
        let aggregate_id = command.aggregate_id();
        let version = command.version();

        let result = match register.get(command_type) {
            Ok(handler) => AssertUnwindSafe(handler.handle(command))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(handler_panicked(&*panic))),
            Err(error) => Err(error),
        };
        stats.record(&result);

        match &result {
            Ok(()) => {
                debug!(worker = index, command_type, aggregate_id = %aggregate_id, "command handled");
            }
            Err(error) if error.is_concurrency_conflict() || error.is_domain_rule_violation() => {
                warn!(
                    worker = index,
                    command_type,
                    aggregate_id = %aggregate_id,
                    version = %version,
                    error = %error,
                    "command rejected"
                );
            }
            Err(error) => {
                error!(
                    worker = index,
                    command_type,
                    aggregate_id = %aggregate_id,
                    version = %version,
                    error = %error,
                    "command failed"
                );
            }
        }

        slot.set(WorkerState::Idle);
    }

    slot.set(WorkerState::Stopped);
    debug!(worker = index, "command bus worker stopped");
}

fn handler_panicked(panic: &(dyn Any + Send)) -> CommandError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    CommandError::Internal(format!("handler panicked: {message}"))
}
