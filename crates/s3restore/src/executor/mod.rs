//! Background job execution: the trait the submission guard dispatches
//! through, and a thread pool implementing it.

pub mod job;
pub mod pool;

pub use job::{DispatchError, JobCompletion, JobId, JobPayload};
pub use pool::WorkerPool;

use crate::request::RequestId;

/// Accepts restore jobs for asynchronous execution.
pub trait JobExecutor: Send + Sync {
    /// Queues a job and returns its id, or fails without queuing anything.
    fn enqueue(&self, payload: JobPayload) -> Result<JobId, DispatchError>;
}

/// Runs one restore job. Implementations record their own outcome.
pub trait JobHandler: Send + Sync {
    fn run(&self, request_id: RequestId);
}
