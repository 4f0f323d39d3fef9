//! Training jobs and their lifecycle.
//!
//! - `model`: the job record and the inputs that create and patch it
//! - `state`: the status state machine
//! - `manager`: submission, dispatch compensation, and scoped access

mod manager;
mod model;
pub mod state;

pub use manager::{DISPATCH_FAILURE_MESSAGE, JobManager};
pub use model::{
    DEFAULT_MODEL_TYPE, DispatchMessage, DispatchPayload, Hyperparameters, Job, JobPatch,
    JobScope, JobSubmission, JobSummary, NewJob,
};
pub use state::JobStatus;
