//! The reasoning thread — the concurrency core of the runtime.
//!
//! A [`ReasoningThread`] drives a [`Backend`] over a growing text context.
//! Each cycle snapshots the context, streams the backend's continuation token
//! by token, and watches the tail for a complete `<rica>` tag. When one
//! appears, generation is aborted, every newly generated tag is dispatched
//! concurrently, the results are appended, and generation resumes from the
//! enlarged context. Background results arrive on an internal channel at any
//! time and are injected as `<rica-callback>` blocks, restarting generation
//! so the model can react to them.
//!
//! External text can be inserted while generation is in flight: the current
//! cycle is abandoned and the next one starts from the updated context.

pub mod manager;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::{system_app, App, AppRegistry};
use crate::config::GenerationConfig;
use crate::connector::Backend;
use crate::error::{RicaError, RicaResult};
use crate::router::Router;
use crate::tag;
use crate::types::{CallBack, CallOutcome, ThreadEvent};

pub use manager::{thread_app, BackendThreadFactory, ThreadFactory, ThreadManager};

/// Lifecycle phase, observable through [`ReasoningThread::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPhase {
    Idle,
    Generating,
    Stopped,
}

/// Why a generation cycle ended.
enum CycleEnd {
    /// A complete tag appeared at the context tail.
    Tag,
    /// The backend finished with nothing further to say.
    Natural,
    /// A background callback arrived mid-generation.
    Callback(CallBack),
    /// Paused externally, or the context changed and a restart was requested.
    Interrupted,
    Stopped,
}

struct ContextState {
    text: String,
    /// Everything before this offset has already been scanned for tags.
    scanned: usize,
}

struct ThreadInner {
    backend: Arc<dyn Backend>,
    registry: Arc<AppRegistry>,
    router: Router,
    generation: GenerationConfig,
    context: Mutex<ContextState>,
    subscribers: std::sync::Mutex<Vec<mpsc::UnboundedSender<ThreadEvent>>>,
    callback_tx: mpsc::UnboundedSender<CallBack>,
    callback_rx: Mutex<Option<mpsc::UnboundedReceiver<CallBack>>>,
    pause_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
    phase_tx: watch::Sender<ThreadPhase>,
    /// Counts calls to `insert`, so a finishing cycle can tell whether new
    /// text arrived while it was deciding to pause.
    inserts: AtomicU64,
    running: AtomicBool,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct ReasoningThread {
    inner: Arc<ThreadInner>,
}

impl ReasoningThread {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<AppRegistry>,
        generation: GenerationConfig,
    ) -> Self {
        Self::with_context(backend, registry, generation, "")
    }

    pub fn with_context(
        backend: Arc<dyn Backend>,
        registry: Arc<AppRegistry>,
        generation: GenerationConfig,
        context: impl Into<String>,
    ) -> Self {
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let (pause_tx, _) = watch::channel(true);
        let (stop_tx, _) = watch::channel(false);
        let (phase_tx, _) = watch::channel(ThreadPhase::Idle);

        Self {
            inner: Arc::new(ThreadInner {
                backend,
                registry: registry.clone(),
                router: Router::new(registry),
                generation,
                context: Mutex::new(ContextState {
                    text: context.into(),
                    scanned: 0,
                }),
                subscribers: std::sync::Mutex::new(Vec::new()),
                callback_tx,
                callback_rx: Mutex::new(Some(callback_rx)),
                pause_tx,
                stop_tx,
                phase_tx,
                inserts: AtomicU64::new(0),
                running: AtomicBool::new(false),
                task: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Install the virtual `rica` system app. Safe to call more than once.
    pub async fn initialize(&self) -> RicaResult<()> {
        match self.inner.registry.install(system_app()) {
            Ok(()) | Err(RicaError::PackageExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn install(&self, app: App) -> RicaResult<()> {
        self.inner.registry.install(app)
    }

    pub fn uninstall(&self, package: &str) -> RicaResult<()> {
        self.inner.registry.uninstall(package)
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.inner.registry
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Receive every [`ThreadEvent`] this thread emits from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ThreadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .push(tx);
        rx
    }

    /// Snapshot of the current context buffer.
    pub async fn context(&self) -> String {
        self.inner.context.lock().await.text.clone()
    }

    /// Insert external text into the context. Any in-flight generation is
    /// abandoned and the next cycle sees the inserted text.
    pub async fn insert(&self, text: impl Into<String>) {
        let text = text.into();
        // Bump the pause version so a running cycle restarts with fresh
        // context. send_replace bumps even before the loop has subscribed.
        self.inner.pause_tx.send_replace(true);
        {
            let mut state = self.inner.context.lock().await;
            state.text.push_str(&text);
        }
        self.inner.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.emit(ThreadEvent::Inserted { text });
        self.run();
    }

    /// Start or resume the reasoning loop.
    pub fn run(&self) {
        self.inner.pause_tx.send_replace(false);
        self.inner.phase_tx.send_replace(ThreadPhase::Generating);

        if !self.inner.running.swap(true, Ordering::SeqCst) {
            let inner = self.inner.clone();
            let handle = tokio::spawn(run_loop(inner));
            *self.inner.task.lock().expect("task mutex poisoned") = Some(handle);
        }
    }

    /// Pause the loop before (or during) the next generation cycle.
    pub fn pause(&self) {
        self.inner.pause_tx.send_replace(true);
    }

    /// Wait until the thread is no longer generating.
    pub async fn wait(&self) {
        let mut phase_rx = self.inner.phase_tx.subscribe();
        loop {
            if *phase_rx.borrow() != ThreadPhase::Generating {
                return;
            }
            if phase_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop the loop and release resources.
    pub async fn destroy(&self) {
        self.inner.stop_tx.send_replace(true);
        self.inner.pause_tx.send_replace(false);

        let handle = self.inner.task.lock().expect("task mutex poisoned").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("reasoning loop did not stop in time");
            }
        }
        self.inner.phase_tx.send_replace(ThreadPhase::Stopped);
    }
}

impl ThreadInner {
    fn emit(&self, event: ThreadEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscriber mutex poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Append a background result to the context as a callback block.
    async fn inject_callback(&self, callback: CallBack) {
        let block = tag::callback_block(&callback);
        {
            let mut state = self.context.lock().await;
            // Only advance the watermark over the injected block when nothing
            // unscanned precedes it; a tag streamed just before the callback
            // arrived must still be found by the next scan.
            let at_end = state.scanned == state.text.len();
            state.text.push_str(&block);
            if at_end {
                state.scanned = state.text.len();
            }
        }
        debug!(call_id = %callback.call_id, status = ?callback.status, "callback injected");
        self.emit(ThreadEvent::CallbackInjected {
            call_id: callback.call_id,
        });
        self.emit(ThreadEvent::TokenGenerated { text: block });
    }

    /// Parse and execute a single tag, returning the text to append.
    async fn dispatch_one(&self, tag_text: &str) -> String {
        let call = match tag::parse_tag(tag_text) {
            Ok(call) => call,
            Err(e) => {
                self.emit(ThreadEvent::Error {
                    message: e.to_string(),
                });
                return format!("[tool-error]{e}");
            }
        };

        // Final responses go to observers, never back into the context. The
        // route must still be installed for the call to count.
        if call.package == "rica" && call.route == "/response" {
            if let Err(e) = self.router.registry().resolve(&call.package, &call.route) {
                self.emit(ThreadEvent::Error {
                    message: e.to_string(),
                });
                return format!("[tool-error]{e}");
            }
            self.emit(ThreadEvent::Response { payload: call.body });
            return String::new();
        }

        self.emit(ThreadEvent::ToolCallStarted {
            package: call.package.clone(),
            route: call.route.clone(),
        });

        match self.router.dispatch(&call, self.callback_tx.clone()).await {
            Ok(CallOutcome::Completed(callback)) => {
                let appended = match &callback.payload {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.emit(ThreadEvent::ToolCallCompleted { callback });
                appended
            }
            Ok(CallOutcome::Background(call_id)) => {
                self.emit(ThreadEvent::BackgroundScheduled {
                    package: call.package.clone(),
                    route: call.route.clone(),
                    call_id,
                });
                serde_json::json!({ "call_id": call_id }).to_string()
            }
            Err(e) => {
                self.emit(ThreadEvent::Error {
                    message: e.to_string(),
                });
                format!("[tool-error]{e}")
            }
        }
    }
}

/// Dispatch every tag generated since the last scan, all at once, and append
/// their results. Returns whether any tag was processed.
async fn execute_pending(inner: &Arc<ThreadInner>) -> bool {
    let tags = {
        let state = inner.context.lock().await;
        tag::find_tags(&state.text, state.scanned)
    };
    if tags.is_empty() {
        return false;
    }

    let mut handles = Vec::with_capacity(tags.len());
    for t in tags {
        let inner = inner.clone();
        handles.push(tokio::spawn(
            async move { inner.dispatch_one(&t.text).await },
        ));
    }

    let mut appended = String::new();
    for handle in handles {
        match handle.await {
            Ok(result) => appended.push_str(&result),
            Err(e) => appended.push_str(&format!("[tool-error]join failed: {e}")),
        }
    }

    {
        let mut state = inner.context.lock().await;
        state.text.push_str(&appended);
        state.scanned = state.text.len();
    }
    if !appended.is_empty() {
        inner.emit(ThreadEvent::TokenGenerated { text: appended });
    }
    true
}

async fn run_loop(inner: Arc<ThreadInner>) {
    let mut callback_rx = match inner.callback_rx.lock().await.take() {
        Some(rx) => rx,
        None => {
            // A previous loop already consumed the receiver; nothing to do.
            inner.running.store(false, Ordering::SeqCst);
            return;
        }
    };

    let mut pause_rx = inner.pause_tx.subscribe();
    let mut stop_rx = inner.stop_tx.subscribe();

    'outer: loop {
        if *stop_rx.borrow() {
            break;
        }

        // Paused: wait for resume, stop, or a background callback.
        // borrow_and_update marks the pause version seen, so a pause/resume
        // toggle that already happened cannot wake the next cycle's select.
        while *pause_rx.borrow_and_update() && !*stop_rx.borrow() {
            inner.phase_tx.send_replace(ThreadPhase::Idle);
            tokio::select! {
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                }
                Some(callback) = callback_rx.recv() => {
                    inner.inject_callback(callback).await;
                    inner.pause_tx.send_replace(false);
                }
            }
        }
        if *stop_rx.borrow() {
            break;
        }
        inner.phase_tx.send_replace(ThreadPhase::Generating);

        // Snapshot the context and start an abortable generation task.
        let cycle_inserts = inner.inserts.load(Ordering::SeqCst);
        let prompt = { inner.context.lock().await.text.clone() };
        let (token_tx, mut token_rx) = mpsc::unbounded_channel();
        let backend = inner.backend.clone();
        let config = inner.generation.clone();
        let generation = tokio::spawn(async move {
            backend.stream(&prompt, &config, token_tx).await
        });

        let mut cycle = CycleEnd::Natural;
        loop {
            tokio::select! {
                maybe = token_rx.recv() => match maybe {
                    Some(piece) => {
                        let tail_complete = {
                            let mut state = inner.context.lock().await;
                            state.text.push_str(&piece);
                            tag::complete_tag_at_tail(&state.text)
                        };
                        inner.emit(ThreadEvent::TokenGenerated { text: piece });
                        if tail_complete {
                            cycle = CycleEnd::Tag;
                            generation.abort();
                            break;
                        }
                    }
                    None => break,
                },
                Some(callback) = callback_rx.recv() => {
                    cycle = CycleEnd::Callback(callback);
                    generation.abort();
                    break;
                }
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        cycle = CycleEnd::Stopped;
                        generation.abort();
                        break;
                    }
                    // Either paused, or the context changed under us (insert);
                    // both abandon this cycle. The outer loop re-reads the flag.
                    cycle = CycleEnd::Interrupted;
                    generation.abort();
                    break;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        cycle = CycleEnd::Stopped;
                        generation.abort();
                        break;
                    }
                }
            }
        }

        match generation.await {
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "backend generation failed");
                inner.emit(ThreadEvent::Error {
                    message: format!("[backend-error]{e}"),
                });
                inner.pause_tx.send_replace(true);
            }
        }

        match cycle {
            CycleEnd::Tag => {
                execute_pending(&inner).await;
            }
            CycleEnd::Callback(callback) => {
                inner.inject_callback(callback).await;
                // A complete tag may have streamed in just before the
                // callback interrupted; dispatch it now rather than after
                // the next natural end.
                execute_pending(&inner).await;
            }
            CycleEnd::Natural => {
                // A tag may still be pending if text followed it in the same
                // completion; otherwise pause until new input arrives.
                if !execute_pending(&inner).await {
                    inner.pause_tx.send_replace(true);
                    // An insert that raced this pause must not be lost: it
                    // bumps the counter before resuming, so re-checking here
                    // catches it no matter how the two interleave.
                    if inner.inserts.load(Ordering::SeqCst) != cycle_inserts {
                        inner.pause_tx.send_replace(false);
                    }
                }
            }
            CycleEnd::Interrupted => {}
            CycleEnd::Stopped => break,
        }
    }

    inner.phase_tx.send_replace(ThreadPhase::Stopped);
    inner.running.store(false, Ordering::SeqCst);
}
