use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tasktool_domain::BackendId;

/// Write-path policy consumed by the sync-aware wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineMode {
    Auto,
    Online,
    Offline,
}

/// Conflict policy consumed by the sync manager's pull loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Local,
    Remote,
    Manual,
}

/// Presentation channel for the (out-of-scope) result renderer; kept here
/// because backends report capability-gap errors whose suggestion text is
/// format-aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Per-backend configuration, i.e. the value side of `backends.<name>`.
/// Loading this from `config.yaml` is out of scope here; this struct is the
/// interface the loader is expected to produce.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: BackendId,
    pub backend_type: String,
    pub enabled: bool,
    pub path: Option<PathBuf>,
    /// Provider-specific knobs (host, credentials reference, etc.) that
    /// don't warrant a dedicated field.
    pub extra: HashMap<String, String>,
}

impl BackendConfig {
    pub fn new(name: BackendId, backend_type: impl Into<String>) -> Self {
        BackendConfig {
            name,
            backend_type: backend_type.into(),
            enabled: true,
            path: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub local_backend: BackendId,
    pub conflict_resolution: ConflictResolution,
    pub offline_mode: OfflineMode,
    pub connectivity_timeout: Duration,
    pub auto_sync_after_operation: bool,
}

impl SyncConfig {
    pub fn new(local_backend: BackendId) -> Self {
        SyncConfig {
            enabled: true,
            local_backend,
            conflict_resolution: ConflictResolution::Remote,
            offline_mode: OfflineMode::Auto,
            connectivity_timeout: Duration::from_secs(5),
            auto_sync_after_operation: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub default_backend: BackendId,
    pub auto_detect_backend: bool,
    pub backends: HashMap<BackendId, BackendConfig>,
    pub sync: Option<SyncConfig>,
    pub output_format: OutputFormat,
    pub no_prompt: bool,
}
