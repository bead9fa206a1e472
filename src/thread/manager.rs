//! Spawning and tracking sub-threads.
//!
//! A reasoning thread can delegate work by calling the `rica.thread` package:
//! `/spawn` creates a new [`ReasoningThread`] through a [`ThreadFactory`] and
//! seeds it with a task, `/kill` destroys one by id, `/list` enumerates the
//! live set. Sub-threads share the parent's [`AppRegistry`], so they see the
//! same installed tools.
//!
//! Route handlers report failures as JSON error objects rather than errors so
//! the model can read and recover from them.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::app::{App, AppRegistry, FnHandler, Route};
use crate::config::GenerationConfig;
use crate::connector::Backend;
use crate::error::RicaResult;

use super::ReasoningThread;

/// Creates new reasoning threads on demand.
#[async_trait]
pub trait ThreadFactory: Send + Sync {
    async fn create(
        &self,
        model: Option<String>,
        generation: Option<GenerationConfig>,
    ) -> RicaResult<ReasoningThread>;
}

/// Factory that clones a shared backend and registry into every new thread.
///
/// The `model` hint is ignored here because the wrapped backend is already
/// bound to one model.
pub struct BackendThreadFactory {
    backend: Arc<dyn Backend>,
    registry: Arc<AppRegistry>,
    generation: GenerationConfig,
}

impl BackendThreadFactory {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<AppRegistry>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            generation,
        }
    }
}

#[async_trait]
impl ThreadFactory for BackendThreadFactory {
    async fn create(
        &self,
        _model: Option<String>,
        generation: Option<GenerationConfig>,
    ) -> RicaResult<ReasoningThread> {
        Ok(ReasoningThread::new(
            self.backend.clone(),
            self.registry.clone(),
            generation.unwrap_or_else(|| self.generation.clone()),
        ))
    }
}

/// Tracks live reasoning threads by id.
pub struct ThreadManager {
    threads: DashMap<String, ReasoningThread>,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self {
            threads: DashMap::new(),
        }
    }

    pub fn register(&self, id: impl Into<String>, thread: ReasoningThread) {
        self.threads.insert(id.into(), thread);
    }

    pub fn unregister(&self, id: &str) -> Option<ReasoningThread> {
        self.threads.remove(id).map(|(_, thread)| thread)
    }

    pub fn get(&self, id: &str) -> Option<ReasoningThread> {
        self.threads.get(id).map(|entry| entry.value().clone())
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.threads.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Spawn a new thread seeded with `task` and start it.
    pub async fn spawn(&self, factory: &dyn ThreadFactory, input: &Value) -> Value {
        let Some(task) = input.get("task").and_then(|v| v.as_str()) else {
            return json!({"error": "Missing 'task' parameter"});
        };
        let model = input
            .get("model")
            .and_then(|v| v.as_str())
            .map(String::from);

        let thread = match factory.create(model, None).await {
            Ok(thread) => thread,
            Err(e) => return json!({"error": format!("Failed to create thread: {e}")}),
        };
        if let Err(e) = thread.initialize().await {
            return json!({"error": format!("Failed to initialize thread: {e}")});
        }

        let id = Uuid::new_v4().to_string();
        thread.insert(task).await;
        self.register(id.clone(), thread);
        info!(thread_id = %id, "thread spawned");

        json!({
            "status": "success",
            "thread_id": id,
            "message": "Thread spawned",
        })
    }

    /// Destroy a thread by id.
    pub async fn kill(&self, input: &Value) -> Value {
        let Some(id) = input.get("thread_id").and_then(|v| v.as_str()) else {
            return json!({"error": "Missing 'thread_id' parameter"});
        };

        match self.unregister(id) {
            Some(thread) => {
                thread.destroy().await;
                info!(thread_id = %id, "thread killed");
                json!({
                    "status": "success",
                    "message": format!("Thread '{id}' killed"),
                })
            }
            None => json!({"error": format!("Thread '{id}' not found")}),
        }
    }

    /// List live threads and the backend each one runs on.
    pub fn list(&self) -> Value {
        let threads: serde_json::Map<String, Value> = self
            .threads
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    Value::String(entry.value().backend_name().to_string()),
                )
            })
            .collect();
        json!({ "threads": threads })
    }
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `rica.thread` app exposing the manager over tool routes.
pub fn thread_app(
    manager: Arc<ThreadManager>,
    factory: Arc<dyn ThreadFactory>,
) -> RicaResult<App> {
    let mut app = App::new("rica.thread")?
        .with_description("Spawn, kill, and list reasoning threads.");

    let spawn_manager = manager.clone();
    let spawn_factory = factory.clone();
    app.add_route(
        Route::new(
            "/spawn",
            Arc::new(FnHandler(move |input: Value| {
                let manager = spawn_manager.clone();
                let factory = spawn_factory.clone();
                async move { Ok(manager.spawn(factory.as_ref(), &input).await) }
            })),
        )
        .foreground()
        .with_description("Spawn a sub-thread. input: {\"task\": \"...\"}")
        .with_schema(json!({
            "type": "object",
            "properties": {"task": {"type": "string"}},
            "required": ["task"],
        })),
    )?;

    let kill_manager = manager.clone();
    app.add_route(
        Route::new(
            "/kill",
            Arc::new(FnHandler(move |input: Value| {
                let manager = kill_manager.clone();
                async move { Ok(manager.kill(&input).await) }
            })),
        )
        .foreground()
        .with_description("Kill a sub-thread. input: {\"thread_id\": \"...\"}")
        .with_schema(json!({
            "type": "object",
            "properties": {"thread_id": {"type": "string"}},
            "required": ["thread_id"],
        })),
    )?;

    let list_manager = manager;
    app.add_route(
        Route::new(
            "/list",
            Arc::new(FnHandler(move |_input: Value| {
                let manager = list_manager.clone();
                async move { Ok(manager.list()) }
            })),
        )
        .foreground()
        .with_description("List live sub-threads. input: {}"),
    )?;

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ScriptedBackend;

    fn factory() -> (Arc<BackendThreadFactory>, Arc<AppRegistry>) {
        let registry = Arc::new(AppRegistry::new());
        let factory = Arc::new(BackendThreadFactory::new(
            Arc::new(ScriptedBackend::empty()),
            registry.clone(),
            GenerationConfig::default(),
        ));
        (factory, registry)
    }

    #[tokio::test]
    async fn spawn_requires_task() {
        let manager = ThreadManager::new();
        let (factory, _) = factory();

        let result = manager.spawn(factory.as_ref(), &json!({})).await;
        assert_eq!(result["error"], "Missing 'task' parameter");
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn spawn_registers_and_seeds_thread() {
        let manager = ThreadManager::new();
        let (factory, _) = factory();

        let result = manager
            .spawn(factory.as_ref(), &json!({"task": "count the stars"}))
            .await;
        assert_eq!(result["status"], "success");
        assert_eq!(manager.len(), 1);

        let id = result["thread_id"].as_str().unwrap();
        let thread = manager.get(id).unwrap();
        // The task text is inserted verbatim, with no added framing.
        assert_eq!(thread.context().await, "count the stars");

        manager.kill(&json!({"thread_id": id})).await;
    }

    #[tokio::test]
    async fn kill_removes_thread() {
        let manager = ThreadManager::new();
        let (factory, _) = factory();

        let spawned = manager
            .spawn(factory.as_ref(), &json!({"task": "t"}))
            .await;
        let id = spawned["thread_id"].as_str().unwrap();

        let result = manager.kill(&json!({"thread_id": id})).await;
        assert_eq!(result["status"], "success");
        assert!(manager.is_empty());

        let again = manager.kill(&json!({"thread_id": id})).await;
        assert!(again["error"].as_str().unwrap().contains("not found"));

        let missing = manager.kill(&json!({})).await;
        assert_eq!(missing["error"], "Missing 'thread_id' parameter");
    }

    #[tokio::test]
    async fn list_names_backends() {
        let manager = ThreadManager::new();
        let (factory, _) = factory();

        let spawned = manager
            .spawn(factory.as_ref(), &json!({"task": "t"}))
            .await;
        let id = spawned["thread_id"].as_str().unwrap();

        let listing = manager.list();
        assert_eq!(listing["threads"][id], "scripted");

        manager.kill(&json!({"thread_id": id})).await;
    }

    #[tokio::test]
    async fn sub_threads_share_registry() {
        let (factory, registry) = factory();
        registry.install(crate::app::system_app()).unwrap();

        let thread = factory.create(None, None).await.unwrap();
        assert!(thread.registry().contains("rica"));
        thread.destroy().await;
    }

    #[tokio::test]
    async fn thread_app_routes_work() {
        let manager = Arc::new(ThreadManager::new());
        let (factory, _) = factory();
        let app = thread_app(manager.clone(), factory).unwrap();
        assert_eq!(app.package(), "rica.thread");

        let spawn = app.find_route("/spawn").unwrap();
        let result = spawn
            .handler
            .call(json!({"task": "do a thing"}))
            .await
            .unwrap();
        assert_eq!(result["status"], "success");
        let id = result["thread_id"].as_str().unwrap().to_string();

        let list = app.find_route("/list").unwrap();
        let listing = list.handler.call(json!({})).await.unwrap();
        assert!(listing["threads"].get(&id).is_some());

        let kill = app.find_route("/kill").unwrap();
        let killed = kill
            .handler
            .call(json!({"thread_id": id}))
            .await
            .unwrap();
        assert_eq!(killed["status"], "success");
        assert!(manager.is_empty());
    }
}
