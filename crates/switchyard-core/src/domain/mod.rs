//! Domain model (ids, task descriptions, handles, statuses, errors, events).
//!
//! Every other module speaks this vocabulary. Nothing here knows about a
//! concrete backend.

pub mod errors;
pub mod events;
pub mod handle;
pub mod ids;
pub mod outcome;
pub mod record;
pub mod status;
pub mod task;

pub use errors::{ErrorKind, RouterError, StatusQueryError, SubmissionError, TaskValidationError};
pub use events::RouterEvent;
pub use handle::{BackendKind, TaskHandle};
pub use ids::{NativeId, TaskId};
pub use outcome::{Artifact, ExecutionResult};
pub use record::RegistryRecord;
pub use status::{ErrorInfo, RawBackendStatus, TaskState, TaskStatus};
pub use task::{Backoff, BackoffKind, RetryPolicy, TaskDescription, TaskType};
