use thiserror::Error;

use crate::request::RequestId;

pub type JobId = String;

/// What a queued job needs to find its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPayload {
    pub request_id: RequestId,
}

impl JobPayload {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub id: JobId,
    pub payload: JobPayload,
}

/// Reported by the pool once a job has left a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub job_id: JobId,
    pub request_id: RequestId,
    pub worker_id: usize,
    /// The handler panicked; its request may still be active.
    pub panicked: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Executor is shut down")]
    ShutDown,

    #[error("Job queue is full")]
    QueueFull,
}
