use crate::request::{RequestId, RestoreRequest};
use crate::storage::ScratchDir;

use super::error::PipelineWarning;

/// Per-run state threaded through the pipeline steps.
pub struct JobContext {
    pub request_id: RequestId,

    // In-memory copy of the request, written back between steps.
    pub request: RestoreRequest,

    // Highest default sub-resource id before apply. `Some(None)` when the
    // target had none and `None` when the lookup failed; both skip cleanup.
    pub high_water_mark: Option<Option<i64>>,

    // Scratch directories, removed when the context is dropped
    pub download_dir: Option<ScratchDir>,
    pub work_dir: Option<ScratchDir>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl JobContext {
    pub fn new(request_id: RequestId, request: RestoreRequest) -> Self {
        Self {
            request_id,
            request,
            high_water_mark: None,
            download_dir: None,
            work_dir: None,
            warnings: Vec::new(),
        }
    }
}
