//! The backend contract: the `TaskManager` capability set every provider
//! implements, the optional `Detectable` capability used by auto-detection,
//! and the configuration schema components consume.

mod backend;
pub mod config;
mod registry;

pub use backend::{Detectable, TaskManager};
pub use config::{BackendConfig, Config, ConflictResolution, OfflineMode, OutputFormat, SyncConfig};
pub use registry::{BackendRegistry, DetectionResult};

pub use tasktool_domain as domain;
