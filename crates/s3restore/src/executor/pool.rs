use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::WorkerError;
use crate::executor::job::{DispatchError, JobCompletion, JobId, JobPayload, QueuedJob};
use crate::executor::{JobExecutor, JobHandler};

const QUEUE_SLOTS_PER_WORKER: usize = 16;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed set of worker threads pulling restore jobs from a bounded queue.
pub struct WorkerPool {
    job_sender: Sender<QueuedJob>,
    completion_receiver: Receiver<JobCompletion>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(handler: Arc<dyn JobHandler>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::NoWorkers);
        }

        let (job_sender, job_receiver) =
            bounded::<QueuedJob>(worker_count * QUEUE_SLOTS_PER_WORKER);
        let (completion_sender, completion_receiver) = unbounded::<JobCompletion>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let completion_tx = completion_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_handler = Arc::clone(&handler);

            let spawned = thread::Builder::new()
                .name(format!("restore-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, completion_tx, shutdown_flag, worker_handler);
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Stop whatever already started before bailing out.
                    shutdown.store(true, Ordering::Relaxed);
                    drop(job_sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} restore workers", worker_count);

        Ok(Self {
            job_sender,
            completion_receiver,
            workers,
            shutdown,
        })
    }

    pub fn submit(&self, payload: JobPayload) -> Result<JobId, DispatchError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(DispatchError::ShutDown);
        }

        let job = QueuedJob {
            id: Uuid::new_v4().to_string(),
            payload,
        };
        let id = job.id.clone();

        match self.job_sender.try_send(job) {
            Ok(()) => {
                debug!("Queued job {} for request {}", id, payload.request_id);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::ShutDown),
        }
    }

    /// Number of jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.job_sender.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn try_recv_completion(&self) -> Option<JobCompletion> {
        self.completion_receiver.try_recv().ok()
    }

    pub fn recv_completion(&self) -> Option<JobCompletion> {
        self.completion_receiver.recv().ok()
    }

    pub fn recv_completion_timeout(&self, timeout: Duration) -> Option<JobCompletion> {
        self.completion_receiver.recv_timeout(timeout).ok()
    }

    /// Stops accepting jobs. Workers exit after their current job; anything
    /// still queued stays unprocessed and can be redispatched.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl JobExecutor for WorkerPool {
    fn enqueue(&self, payload: JobPayload) -> Result<JobId, DispatchError> {
        self.submit(payload)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<QueuedJob>,
    completion_sender: Sender<JobCompletion>,
    shutdown: Arc<AtomicBool>,
    handler: Arc<dyn JobHandler>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                let request_id = job.payload.request_id;
                debug!("Worker {} running job {} (request {})", worker_id, job.id, request_id);

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.run(request_id)));
                let panicked = outcome.is_err();
                if panicked {
                    warn!("Job {} for request {} panicked", job.id, request_id);
                }

                let completion = JobCompletion {
                    job_id: job.id,
                    request_id,
                    worker_id,
                    panicked,
                };
                // Nobody listening for completions is fine.
                let _ = completion_sender.send(completion);
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
