//! Domain types shared by every backend, the cache, and the sync manager:
//! tasks, lists, status/priority vocabulary, the error taxonomy, and the
//! cancellation context threaded through all I/O.

mod backend_id;
mod context;
mod error;
mod list;
mod status;
mod tags;
mod task;

pub use backend_id::BackendId;
pub use context::Context;
pub use error::{TaskError, TaskResult};
pub use list::{TaskList, TaskListDraft};
pub use status::{Priority, PriorityBucket, TaskStatus};
pub use tags::TagSet;
pub use task::{Task, TaskDraft};

/// Generates a backend-local id for providers (the embedded cache, the
/// filesystem demo provider) that don't get one assigned by a remote
/// service.
pub fn new_local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
