use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tasktool_domain::{BackendId, Context, TaskError, TaskResult};

use crate::backend::{Detectable, TaskManager};
use crate::config::BackendConfig;

type Constructor = Arc<dyn Fn(&BackendConfig) -> TaskResult<Arc<dyn TaskManager>> + Send + Sync>;
type DetectableConstructor =
    Arc<dyn Fn(&BackendConfig) -> TaskResult<Arc<dyn Detectable>> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    priority: u32,
    constructor: Constructor,
    detectable: Option<DetectableConstructor>,
}

/// A process-wide map of backend name to constructor, with a priority used
/// to order auto-detection. Registration is idempotent: registering the
/// same name twice simply replaces the prior entry rather than erroring, so
/// call sites don't need to guard against double-init.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: Arc<RwLock<HashMap<BackendId, Registration>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend that does not support auto-detection (most cloud
    /// providers: there's no way to "detect" a Nextcloud account without
    /// credentials already on hand).
    pub fn register<F>(&self, name: BackendId, priority: u32, constructor: F)
    where
        F: Fn(&BackendConfig) -> TaskResult<Arc<dyn TaskManager>> + Send + Sync + 'static,
    {
        self.entries.write().unwrap().insert(
            name,
            Registration {
                priority,
                constructor: Arc::new(constructor),
                detectable: None,
            },
        );
    }

    /// Registers a backend that additionally implements `Detectable`, making
    /// it eligible for `detect_all`/`select_detected`.
    pub fn register_detectable<F>(&self, name: BackendId, priority: u32, constructor: F)
    where
        F: Fn(&BackendConfig) -> TaskResult<Arc<dyn Detectable>> + Send + Sync + 'static,
    {
        let detectable: DetectableConstructor = Arc::new(constructor);
        let plain = detectable.clone();
        self.entries.write().unwrap().insert(
            name,
            Registration {
                priority,
                constructor: Arc::new(move |cfg| plain(cfg).map(|b| b as Arc<dyn TaskManager>)),
                detectable: Some(detectable),
            },
        );
    }

    pub fn names(&self) -> Vec<BackendId> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    pub fn is_registered(&self, name: &BackendId) -> bool {
        self.entries.read().unwrap().contains_key(name)
    }

    pub fn priority_of(&self, name: &BackendId) -> Option<u32> {
        self.entries.read().unwrap().get(name).map(|r| r.priority)
    }

    /// Constructs a backend instance by name via its registered factory.
    pub fn construct(&self, name: &BackendId, config: &BackendConfig) -> TaskResult<Arc<dyn TaskManager>> {
        let registration = self
            .entries
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| TaskError::not_found(format!("no backend registered under {name}")))?;
        (registration.constructor)(config)
    }

    /// Runs every registered `Detectable` constructor against `configs`,
    /// calling `CanDetect` on each. Results are returned unsorted by
    /// priority; `select_detected` does the ordering and cleanup.
    pub async fn detect_all(
        &self,
        configs: &HashMap<BackendId, BackendConfig>,
        ctx: &Context,
    ) -> Vec<DetectionResult> {
        let detectable_entries: Vec<(BackendId, u32, DetectableConstructor)> = self
            .entries
            .read()
            .unwrap()
            .iter()
            .filter_map(|(name, reg)| {
                reg.detectable
                    .clone()
                    .map(|ctor| (name.clone(), reg.priority, ctor))
            })
            .collect();

        let mut results = Vec::with_capacity(detectable_entries.len());
        for (name, priority, constructor) in detectable_entries {
            let config = configs.get(&name).cloned().unwrap_or_else(|| {
                BackendConfig::new(name.clone(), name.as_str().to_string())
            });
            let result = match constructor(&config) {
                Ok(backend) => match backend.can_detect(ctx).await {
                    Ok(available) => DetectionResult {
                        name,
                        available,
                        info: backend.detection_info(),
                        priority,
                        backend: available.then_some(backend),
                    },
                    Err(err) => DetectionResult {
                        name,
                        available: false,
                        info: format!("detection failed: {err}"),
                        priority,
                        backend: None,
                    },
                },
                Err(err) => DetectionResult {
                    name,
                    available: false,
                    info: format!("construction failed: {err}"),
                    priority,
                    backend: None,
                },
            };
            results.push(result);
        }
        results.sort_by_key(|r| r.priority);
        results
    }

    /// Picks the first available backend by ascending priority, closing
    /// every other constructed-but-unused backend along the way.
    pub async fn select_detected(
        &self,
        configs: &HashMap<BackendId, BackendConfig>,
        ctx: &Context,
    ) -> TaskResult<Option<Arc<dyn Detectable>>> {
        let mut results = self.detect_all(configs, ctx).await;
        let mut chosen = None;
        for result in results.drain(..) {
            match (chosen.is_none(), result.backend) {
                (true, Some(backend)) => chosen = Some(backend),
                (_, Some(backend)) => backend.close().await?,
                (_, None) => {}
            }
        }
        Ok(chosen)
    }
}

#[derive(Clone)]
pub struct DetectionResult {
    pub name: BackendId,
    pub available: bool,
    pub info: String,
    pub priority: u32,
    pub backend: Option<Arc<dyn Detectable>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tasktool_domain::{Task, TaskDraft, TaskList, TaskListDraft};

    struct StubBackend {
        id: BackendId,
        available: bool,
        priority: u32,
    }

    #[async_trait]
    impl TaskManager for StubBackend {
        fn backend_id(&self) -> &BackendId {
            &self.id
        }
        async fn get_lists(&self, _ctx: &Context) -> TaskResult<Vec<TaskList>> {
            Ok(vec![])
        }
        async fn get_list(&self, _ctx: &Context, _id: &str) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn get_list_by_name(&self, _ctx: &Context, _name: &str) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn create_list(&self, _ctx: &Context, _draft: TaskListDraft) -> TaskResult<TaskList> {
            Err(TaskError::not_supported("stub"))
        }
        async fn update_list(&self, _ctx: &Context, list: TaskList) -> TaskResult<TaskList> {
            Ok(list)
        }
        async fn delete_list(&self, _ctx: &Context, _id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn get_deleted_lists(&self, _ctx: &Context) -> TaskResult<Vec<TaskList>> {
            Ok(vec![])
        }
        async fn get_deleted_list_by_name(
            &self,
            _ctx: &Context,
            _name: &str,
        ) -> TaskResult<Option<TaskList>> {
            Ok(None)
        }
        async fn restore_list(&self, _ctx: &Context, _id: &str) -> TaskResult<TaskList> {
            Err(TaskError::not_supported("stub"))
        }
        async fn purge_list(&self, _ctx: &Context, _id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn get_tasks(&self, _ctx: &Context, _list_id: &str) -> TaskResult<Vec<Task>> {
            Ok(vec![])
        }
        async fn get_task(&self, _ctx: &Context, _list_id: &str, _task_id: &str) -> TaskResult<Option<Task>> {
            Ok(None)
        }
        async fn create_task(&self, _ctx: &Context, _list_id: &str, _draft: TaskDraft) -> TaskResult<Task> {
            Err(TaskError::not_supported("stub"))
        }
        async fn update_task(&self, _ctx: &Context, _list_id: &str, task: Task) -> TaskResult<Task> {
            Ok(task)
        }
        async fn delete_task(&self, _ctx: &Context, _list_id: &str, _task_id: &str) -> TaskResult<()> {
            Ok(())
        }
        async fn close(&self) -> TaskResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Detectable for StubBackend {
        async fn can_detect(&self, _ctx: &Context) -> TaskResult<bool> {
            Ok(self.available)
        }
        fn detection_info(&self) -> String {
            format!("stub({})", self.id)
        }
        fn detection_priority(&self) -> u32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn select_detected_picks_lowest_priority_available() {
        let registry = BackendRegistry::new();
        registry.register_detectable(BackendId::new("cache").unwrap(), 100, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: true,
                priority: 100,
            }) as Arc<dyn Detectable>)
        });
        registry.register_detectable(BackendId::new("fs-markdown").unwrap(), 10, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: true,
                priority: 10,
            }) as Arc<dyn Detectable>)
        });

        let configs = HashMap::new();
        let chosen = registry
            .select_detected(&configs, &Context::background())
            .await
            .unwrap()
            .expect("one backend should be chosen");
        assert_eq!(chosen.backend_id().as_str(), "fs-markdown");
    }

    #[tokio::test]
    async fn select_detected_skips_unavailable_backends() {
        let registry = BackendRegistry::new();
        registry.register_detectable(BackendId::new("fs-markdown").unwrap(), 10, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: false,
                priority: 10,
            }) as Arc<dyn Detectable>)
        });
        registry.register_detectable(BackendId::new("cache").unwrap(), 100, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: true,
                priority: 100,
            }) as Arc<dyn Detectable>)
        });

        let chosen = registry
            .select_detected(&HashMap::new(), &Context::background())
            .await
            .unwrap()
            .expect("cache should win as fallback");
        assert_eq!(chosen.backend_id().as_str(), "cache");
    }

    #[test]
    fn registration_is_idempotent_per_name() {
        let registry = BackendRegistry::new();
        let name = BackendId::new("sqlite").unwrap();
        registry.register(name.clone(), 100, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: true,
                priority: 100,
            }) as Arc<dyn TaskManager>)
        });
        registry.register(name.clone(), 100, |cfg| {
            Ok(Arc::new(StubBackend {
                id: cfg.name.clone(),
                available: true,
                priority: 100,
            }) as Arc<dyn TaskManager>)
        });
        assert_eq!(registry.names().len(), 1);
    }
}
