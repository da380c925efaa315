// THEORY:
// The `ExtractionScheduler` spreads CPU-bound signature extraction over a fixed
// pool of workers. It is built from actors that only talk through channels:
//
// 1.  **Control actor**: a single task that owns *all* mutable bookkeeping: the
//     idle set, the FIFO wait queue, the in-flight map and the completion
//     callback. Submissions, callback changes, status queries and worker reports
//     all arrive as messages and are handled one at a time, so "is a worker
//     idle?" and "take it" can never race and a task can never be dispatched
//     twice.
// 2.  **Workers**: one task per pool slot, each with its own inbox. A worker runs
//     exactly one extraction at a time on tokio's blocking pool and reports the
//     outcome back. Workers are stateless and share nothing but read-only `Arc`s
//     of the image and configuration.
// 3.  **Handle**: `ExtractionScheduler` itself only assigns task ids and forwards
//     messages. `submit` never awaits and never blocks on extraction.
//
// Worker lifecycle: Idle -> Busy on dispatch. On completion, a Busy worker stays
// Busy and immediately takes the head of the wait queue if there is one
// (affinity over round-robin), otherwise it goes back to Idle. At every instant
// `idle + busy == pool_size`, and a task is either queued or owned by exactly
// one busy worker.
//
// Completion is reported once per task: first to the global completion callback,
// then to the task's ticket if it was submitted with one. Order follows actual
// completion, not submission. There are no retries, priorities or cancellation:
// a failed extraction is delivered as a failure and the worker moves on.

use crate::config::ExtractionConfiguration;
use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::signature_builder::{SignatureBuilder, SignatureExtractor};
use crate::error::{ConfigurationError, ExtractionError};
use crate::record::{ExtractionOutcome, ExtractionRecord, TaskId, WorkerId};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

pub const MIN_POOL_SIZE: usize = 1;
pub const MAX_POOL_SIZE: usize = 64;

/// Invoked on the control actor once per finished task.
pub type CompletionCallback = Box<dyn Fn(&ExtractionRecord) + Send + 'static>;

/// Boxes a closure as a `CompletionCallback`.
pub fn completion_callback<F>(callback: F) -> CompletionCallback
where
    F: Fn(&ExtractionRecord) + Send + 'static,
{
    Box::new(callback)
}

/// One worker per logical CPU, within the allowed pool range.
pub fn default_pool_size() -> usize {
    num_cpus::get().clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

/// A snapshot of the pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub idle: usize,
    pub busy: usize,
    pub queued: usize,
}

/// A unit of scheduled work, from submission until a worker takes it.
struct ExtractionTask {
    id: TaskId,
    label: Option<String>,
    image: Arc<PixelBuffer>,
    config: Arc<ExtractionConfiguration>,
    enqueued_at: Instant,
    reply: Option<oneshot::Sender<ExtractionRecord>>,
}

/// What a worker receives: only the read-only inputs.
struct WorkerJob {
    task_id: TaskId,
    image: Arc<PixelBuffer>,
    config: Arc<ExtractionConfiguration>,
}

/// What the control actor keeps about a dispatched task.
struct InFlight {
    worker_id: WorkerId,
    label: Option<String>,
    enqueued_at: Instant,
    reply: Option<oneshot::Sender<ExtractionRecord>>,
}

struct WorkerReport {
    task_id: TaskId,
    worker_id: WorkerId,
    outcome: ExtractionOutcome,
    elapsed: Duration,
}

enum Command {
    Submit(ExtractionTask),
    SetCallback(Option<CompletionCallback>),
    Status(oneshot::Sender<PoolStatus>),
}

/// Resolves to the task's `ExtractionRecord` once a worker finishes it.
#[derive(Debug)]
pub struct ExtractionTicket {
    task_id: TaskId,
    receiver: oneshot::Receiver<ExtractionRecord>,
}

impl ExtractionTicket {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl Future for ExtractionTicket {
    type Output = Result<ExtractionRecord, ConfigurationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| ConfigurationError::ShutDown))
    }
}

struct RunningPool {
    commands: mpsc::UnboundedSender<Command>,
    next_task_id: TaskId,
    pool_size: usize,
    control: JoinHandle<()>,
}

enum Lifecycle {
    Uninitialized { callback: Option<CompletionCallback> },
    Running(RunningPool),
    ShutDown,
}

/// Schedules signature extraction over a fixed pool of workers.
pub struct ExtractionScheduler<E: SignatureExtractor = SignatureBuilder> {
    extractor: Arc<E>,
    lifecycle: Mutex<Lifecycle>,
}

impl ExtractionScheduler<SignatureBuilder> {
    pub fn new() -> Self {
        Self::with_extractor(SignatureBuilder)
    }
}

impl Default for ExtractionScheduler<SignatureBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SignatureExtractor> ExtractionScheduler<E> {
    /// A scheduler whose workers run `extractor` instead of the default builder.
    pub fn with_extractor(extractor: E) -> Self {
        Self {
            extractor: Arc::new(extractor),
            lifecycle: Mutex::new(Lifecycle::Uninitialized { callback: None }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // The bookkeeping under this lock is replaced wholesale, never left half-updated.
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts `pool_size` idle workers. Must be called from within a tokio runtime.
    ///
    /// A second call fails with `AlreadyInitialized` and leaves the running pool
    /// untouched. If `on_complete` is `None`, a callback set earlier through
    /// `set_completion_callback` is kept.
    pub fn initialize(
        &self,
        pool_size: usize,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), ConfigurationError> {
        let mut lifecycle = self.lifecycle();
        let pending_callback = match &mut *lifecycle {
            Lifecycle::Uninitialized { callback } => callback,
            Lifecycle::Running(_) | Lifecycle::ShutDown => {
                return Err(ConfigurationError::AlreadyInitialized);
            }
        };
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&pool_size) {
            return Err(ConfigurationError::InvalidPoolSize(pool_size));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;
        let callback = on_complete.or_else(|| pending_callback.take());

        let (report_sender, report_receiver) = mpsc::unbounded_channel();
        let workers = (0..pool_size)
            .map(|worker_id| {
                let (job_sender, job_receiver) = mpsc::unbounded_channel();
                runtime.spawn(run_worker(
                    worker_id,
                    Arc::clone(&self.extractor),
                    job_receiver,
                    report_sender.clone(),
                ));
                job_sender
            })
            .collect();
        drop(report_sender);

        let actor = ControlActor {
            pool_size,
            workers,
            // Reversed so that a fresh pool hands out worker 0 first.
            idle: (0..pool_size).rev().collect(),
            waiting: VecDeque::new(),
            in_flight: HashMap::new(),
            undelivered: VecDeque::new(),
            callback,
        };
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let control = runtime.spawn(actor.run(command_receiver, report_receiver));

        *lifecycle = Lifecycle::Running(RunningPool {
            commands: command_sender,
            next_task_id: 0,
            pool_size,
            control,
        });
        info!("initialized {pool_size} extraction workers");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running(_))
    }

    /// The pool size, once initialized.
    pub fn pool_size(&self) -> Option<usize> {
        match &*self.lifecycle() {
            Lifecycle::Running(pool) => Some(pool.pool_size),
            _ => None,
        }
    }

    fn enqueue(
        &self,
        label: Option<String>,
        image: Arc<PixelBuffer>,
        config: Arc<ExtractionConfiguration>,
        reply: Option<oneshot::Sender<ExtractionRecord>>,
    ) -> Result<TaskId, ConfigurationError> {
        config.validate()?;

        let mut lifecycle = self.lifecycle();
        let pool = match &mut *lifecycle {
            Lifecycle::Running(pool) => pool,
            Lifecycle::Uninitialized { .. } => return Err(ConfigurationError::NotInitialized),
            Lifecycle::ShutDown => return Err(ConfigurationError::ShutDown),
        };

        // Id assignment and the send happen under one lock, so queue order is id order.
        let id = pool.next_task_id;
        let task = ExtractionTask {
            id,
            label,
            image,
            config,
            enqueued_at: Instant::now(),
            reply,
        };
        pool.commands
            .send(Command::Submit(task))
            .map_err(|_| ConfigurationError::ShutDown)?;
        pool.next_task_id += 1;
        Ok(id)
    }

    /// Enqueues `image` for extraction and returns its task id immediately.
    pub fn submit(
        &self,
        image: impl Into<Arc<PixelBuffer>>,
        config: impl Into<Arc<ExtractionConfiguration>>,
    ) -> Result<TaskId, ConfigurationError> {
        self.enqueue(None, image.into(), config.into(), None)
    }

    /// Like `submit`, carrying `label` into the record.
    pub fn submit_labeled(
        &self,
        label: impl Into<String>,
        image: impl Into<Arc<PixelBuffer>>,
        config: impl Into<Arc<ExtractionConfiguration>>,
    ) -> Result<TaskId, ConfigurationError> {
        self.enqueue(Some(label.into()), image.into(), config.into(), None)
    }

    /// Enqueues `image` and returns a ticket that resolves to its record.
    ///
    /// The global completion callback still fires for this task.
    pub fn submit_with_ticket(
        &self,
        label: Option<String>,
        image: impl Into<Arc<PixelBuffer>>,
        config: impl Into<Arc<ExtractionConfiguration>>,
    ) -> Result<ExtractionTicket, ConfigurationError> {
        let (reply, receiver) = oneshot::channel();
        let task_id = self.enqueue(label, image.into(), config.into(), Some(reply))?;
        Ok(ExtractionTicket { task_id, receiver })
    }

    fn send_command(&self, command: Command) -> Result<(), ConfigurationError> {
        match &*self.lifecycle() {
            Lifecycle::Running(pool) => pool
                .commands
                .send(command)
                .map_err(|_| ConfigurationError::ShutDown),
            Lifecycle::Uninitialized { .. } => Err(ConfigurationError::NotInitialized),
            Lifecycle::ShutDown => Err(ConfigurationError::ShutDown),
        }
    }

    /// Replaces the global completion callback; `None` removes it.
    pub fn set_completion_callback(&self, callback: Option<CompletionCallback>) -> Result<(), ConfigurationError> {
        let mut lifecycle = self.lifecycle();
        match &mut *lifecycle {
            Lifecycle::Uninitialized { callback: pending } => {
                *pending = callback;
                Ok(())
            }
            Lifecycle::Running(pool) => pool
                .commands
                .send(Command::SetCallback(callback))
                .map_err(|_| ConfigurationError::ShutDown),
            Lifecycle::ShutDown => Err(ConfigurationError::ShutDown),
        }
    }

    /// Current idle/busy/queued counts, as seen by the control actor.
    pub async fn pool_status(&self) -> Result<PoolStatus, ConfigurationError> {
        let (reply, receiver) = oneshot::channel();
        self.send_command(Command::Status(reply))?;
        receiver.await.map_err(|_| ConfigurationError::ShutDown)
    }

    /// Stops accepting work and waits until every queued and in-flight task has
    /// been delivered. Workers exit afterwards.
    pub async fn shutdown(&self) {
        let control = match std::mem::replace(&mut *self.lifecycle(), Lifecycle::ShutDown) {
            Lifecycle::Running(pool) => Some(pool.control),
            Lifecycle::Uninitialized { .. } | Lifecycle::ShutDown => None,
        };
        if let Some(control) = control {
            if let Err(error) = control.await {
                warn!("extraction scheduler control task ended abnormally: {error}");
            }
        }
    }
}

/// Owns every piece of mutable scheduling state.
struct ControlActor {
    pool_size: usize,
    workers: Vec<mpsc::UnboundedSender<WorkerJob>>,
    /// Stack of idle workers; the most recently freed one is reused first.
    idle: Vec<WorkerId>,
    waiting: VecDeque<ExtractionTask>,
    in_flight: HashMap<TaskId, InFlight>,
    /// Reports synthesized for jobs that could not be handed to their worker.
    undelivered: VecDeque<WorkerReport>,
    callback: Option<CompletionCallback>,
}

impl ControlActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<WorkerReport>,
    ) {
        let mut accepting = true;
        loop {
            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(Command::Submit(task)) => self.submit(task),
                    Some(Command::SetCallback(callback)) => self.callback = callback,
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    None => {
                        accepting = false;
                        debug!(
                            "scheduler closed, draining {} in flight and {} queued",
                            self.in_flight.len(),
                            self.waiting.len()
                        );
                    }
                },
                Some(report) = reports.recv() => self.complete(report),
                else => break,
            }

            while let Some(report) = self.undelivered.pop_front() {
                self.complete(report);
            }

            if !accepting && self.in_flight.is_empty() && self.waiting.is_empty() {
                break;
            }
        }
        info!("extraction scheduler stopped");
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            pool_size: self.pool_size,
            idle: self.idle.len(),
            busy: self.in_flight.len(),
            queued: self.waiting.len(),
        }
    }

    fn submit(&mut self, task: ExtractionTask) {
        match self.idle.pop() {
            Some(worker_id) => self.dispatch(task, worker_id),
            None => {
                debug!("task {} queued behind {} others", task.id, self.waiting.len());
                self.waiting.push_back(task);
            }
        }
        debug_assert_eq!(self.idle.len() + self.in_flight.len(), self.pool_size);
    }

    fn dispatch(&mut self, task: ExtractionTask, worker_id: WorkerId) {
        let ExtractionTask {
            id,
            label,
            image,
            config,
            enqueued_at,
            reply,
        } = task;
        debug!("dispatching task {id} to worker {worker_id}");

        self.in_flight.insert(
            id,
            InFlight {
                worker_id,
                label,
                enqueued_at,
                reply,
            },
        );
        let job = WorkerJob {
            task_id: id,
            image,
            config,
        };
        if self.workers[worker_id].send(job).is_err() {
            warn!("worker {worker_id} is no longer running, failing task {id}");
            self.undelivered.push_back(WorkerReport {
                task_id: id,
                worker_id,
                outcome: ExtractionOutcome::Failure(ExtractionError::WorkerPanicked(format!(
                    "worker {worker_id} is no longer running"
                ))),
                elapsed: Duration::ZERO,
            });
        }
    }

    fn complete(&mut self, report: WorkerReport) {
        let Some(in_flight) = self.in_flight.remove(&report.task_id) else {
            warn!("report for unknown task {} from worker {}", report.task_id, report.worker_id);
            return;
        };

        let record = ExtractionRecord {
            task_id: report.task_id,
            worker_id: in_flight.worker_id,
            label: in_flight.label,
            outcome: report.outcome,
            elapsed: report.elapsed,
            enqueued_at: in_flight.enqueued_at,
            completed_at: Instant::now(),
        };
        match record.error() {
            Some(error) => warn!(
                "task {} failed on worker {}: {error}",
                record.task_id, record.worker_id
            ),
            None => debug!(
                "task {} finished on worker {} in {} ms",
                record.task_id,
                record.worker_id,
                record.elapsed_ms()
            ),
        }

        match self.waiting.pop_front() {
            Some(next) => self.dispatch(next, in_flight.worker_id),
            None => self.idle.push(in_flight.worker_id),
        }
        debug_assert_eq!(self.idle.len() + self.in_flight.len(), self.pool_size);

        if let Some(callback) = &self.callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&record))).is_err() {
                warn!("completion callback panicked on task {}", record.task_id);
            }
        }
        if let Some(reply) = in_flight.reply {
            let _ = reply.send(record);
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_worker<E: SignatureExtractor>(
    worker_id: WorkerId,
    extractor: Arc<E>,
    mut jobs: mpsc::UnboundedReceiver<WorkerJob>,
    reports: mpsc::UnboundedSender<WorkerReport>,
) {
    while let Some(WorkerJob { task_id, image, config }) = jobs.recv().await {
        let started = Instant::now();
        let extractor = Arc::clone(&extractor);
        let result = tokio::task::spawn_blocking(move || extractor.extract(&image, &config)).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(result) => ExtractionOutcome::from(result),
            Err(error) => {
                let message = panic_message(error);
                warn!("worker {worker_id} recovered from a panic in task {task_id}: {message}");
                ExtractionOutcome::Failure(ExtractionError::WorkerPanicked(message))
            }
        };

        let report = WorkerReport {
            task_id,
            worker_id,
            outcome,
            elapsed,
        };
        if reports.send(report).is_err() {
            break;
        }
    }
    debug!("worker {worker_id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_size_is_within_range() {
        assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&default_pool_size()));
    }

    #[tokio::test]
    async fn abandoned_tickets_report_shutdown() {
        let (reply, receiver) = oneshot::channel::<ExtractionRecord>();
        let ticket = ExtractionTicket { task_id: 3, receiver };
        drop(reply);
        assert!(matches!(ticket.await, Err(ConfigurationError::ShutDown)));
    }

    #[tokio::test]
    async fn worker_panics_become_messages() {
        let failing = 7;
        let error = tokio::spawn(async move {
            if failing > 0 {
                panic!("boom {failing}");
            }
        })
        .await
        .unwrap_err();
        assert_eq!(panic_message(error), "boom 7");
    }

    #[tokio::test]
    async fn shutdown_before_initialize_is_final() {
        let scheduler = ExtractionScheduler::new();
        scheduler.shutdown().await;
        assert!(matches!(
            scheduler.set_completion_callback(None),
            Err(ConfigurationError::ShutDown)
        ));
    }
}
