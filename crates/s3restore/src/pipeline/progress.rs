use std::sync::Mutex;

use crate::db::{request_repo, Database};
use crate::request::RequestId;

/// Receives fractional progress (0.0 to 1.0) from the apply engine.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, fraction: f64);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _fraction: f64) {}
}

/// Writes progress onto one restore request.
///
/// Writes closer than `min_step` to the last written value are dropped,
/// except a final 1.0. Database failures are logged and never propagate.
pub struct DbProgressReporter {
    db: Database,
    request_id: RequestId,
    min_step: f64,
    last_written: Mutex<Option<f64>>,
}

impl DbProgressReporter {
    pub fn new(db: Database, request_id: RequestId, min_step: f64) -> Self {
        Self {
            db,
            request_id,
            min_step,
            last_written: Mutex::new(None),
        }
    }

    pub fn last_written(&self) -> Option<f64> {
        match self.last_written.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl ProgressReporter for DbProgressReporter {
    fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let mut last = match self.last_written.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let finishing = fraction >= 1.0 && previous < 1.0;
            if !finishing && fraction - previous < self.min_step {
                return;
            }
        }

        match request_repo::update_progress(&self.db, self.request_id, fraction) {
            Ok(true) => *last = Some(fraction),
            Ok(false) => {
                log::debug!(
                    "Progress {:.3} not recorded for request {} (not restoring or stale)",
                    fraction,
                    self.request_id
                );
            }
            Err(e) => {
                log::warn!(
                    "Failed to record progress for request {}: {}",
                    self.request_id,
                    e
                );
            }
        }
    }
}
