// THEORY:
// An `ExtractionRecord` is what a caller gets back for every submitted image,
// whether extraction succeeded or not. It replaces an ad-hoc payload carrying
// "maybe a signature, maybe an error" with a tagged `ExtractionOutcome`, and it
// keeps the timing bookkeeping callers use to judge throughput: how long the
// worker spent extracting, and how long the image waited in the queue.

use crate::core_modules::feature_point::Signature;
use crate::core_modules::svf;
use crate::error::{ExtractionError, SerializationError};
use std::time::{Duration, Instant};

/// Monotonically assigned at submit time.
pub type TaskId = u64;
/// Index of a worker in the pool, `0..pool_size`.
pub type WorkerId = usize;

/// The result of one extraction task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success(Signature),
    Failure(ExtractionError),
}

impl From<Result<Signature, ExtractionError>> for ExtractionOutcome {
    fn from(result: Result<Signature, ExtractionError>) -> Self {
        match result {
            Ok(signature) => ExtractionOutcome::Success(signature),
            Err(error) => ExtractionOutcome::Failure(error),
        }
    }
}

/// Completion state of a finished task, delivered to the completion callback
/// and to the task's ticket.
#[derive(Debug, Clone)]
pub struct ExtractionRecord {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    /// Caller-supplied label, typically the source file name.
    pub label: Option<String>,
    pub outcome: ExtractionOutcome,
    /// Time the worker spent inside the extractor.
    pub elapsed: Duration,
    pub enqueued_at: Instant,
    pub completed_at: Instant,
}

impl ExtractionRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Success(_))
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.outcome {
            ExtractionOutcome::Success(signature) => Some(signature),
            ExtractionOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        match &self.outcome {
            ExtractionOutcome::Success(_) => None,
            ExtractionOutcome::Failure(error) => Some(error),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Time between submission and completion not spent extracting.
    pub fn waiting_time(&self) -> Duration {
        self.total_time().saturating_sub(self.elapsed)
    }

    /// Time between submission and completion.
    pub fn total_time(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.enqueued_at)
    }

    /// The label, or `task-<id>` when none was given.
    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("task-{}", self.task_id))
    }

    /// The signature as an SVF line labelled with `display_label`.
    pub fn signature_as_svf(&self) -> Result<String, SerializationError> {
        match &self.outcome {
            ExtractionOutcome::Success(signature) => Ok(svf::to_svf(signature, &self.display_label())),
            ExtractionOutcome::Failure(error) => Err(SerializationError::NotExtracted(error.to_string())),
        }
    }
}
