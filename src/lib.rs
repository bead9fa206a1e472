//! # rica-core
//!
//! Async runtime for multi-threaded LLM reasoning — the engine that lets a
//! model call tools from inside its token stream, keep thinking while
//! background work runs, and react to results as they arrive.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rica_core::app::{App, AppRegistry, FnHandler, Route};
//! use rica_core::config::{GenerationConfig, RuntimeConfig};
//! use rica_core::connector::OpenAiCompatBackend;
//! use rica_core::thread::ReasoningThread;
//! use rica_core::types::ThreadEvent;
//!
//! # async fn demo() -> rica_core::RicaResult<()> {
//! let config = RuntimeConfig::default();
//! let backend = Arc::new(OpenAiCompatBackend::new(
//!     "http://localhost:8000",
//!     config.model.clone(),
//! ));
//!
//! let registry = Arc::new(AppRegistry::new());
//! let thread = ReasoningThread::new(backend, registry, config.generation);
//! thread.initialize().await?;
//!
//! // Install a tool the model can call as <rica package="demo.echo" route="/echo">
//! let mut app = App::new("demo.echo")?;
//! app.add_route(
//!     Route::new("/echo", Arc::new(FnHandler(|input| async move { Ok(input) })))
//!         .foreground(),
//! )?;
//! thread.install(app)?;
//!
//! let mut events = thread.subscribe();
//! thread.insert("User: what's 2+2?\n").await;
//!
//! while let Some(event) = events.recv().await {
//!     if let ThreadEvent::Response { payload } = event {
//!         println!("{payload}");
//!         break;
//!     }
//! }
//! thread.destroy().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Core types: `ToolCall`, `CallBack`, `ExecutionMode`, `ThreadEvent` |
//! | [`app`] | Tool apps: validated packages, routes, async handlers, concurrent registry |
//! | [`tag`] | `<rica>` tag grammar: tail detection, parsing, callback blocks |
//! | [`router`] | Dispatch: mode and timeout resolution, foreground await, background spawn |
//! | [`connector`] | Backend adapters: OpenAI-compatible streaming HTTP, scripted replay |
//! | [`thread`] | The reasoning loop, plus spawning and tracking sub-threads |
//! | [`whiteboard`] | Shared named text boards for cross-thread state |
//! | [`prompt`] | System prompt assembly with a `<tool>` inventory |
//! | [`validation`] | JSON-schema subset checks and code sanitization |
//! | [`loader`] | YAML manifests that bind routes to shell commands |
//! | [`config`] | Model selection and generation parameters |
//! | [`error`] | Error types with thiserror: `PackageNotFound`, `InvalidTag`, `Backend`, etc. |
//!
//! ## The reasoning loop
//!
//! A [`thread::ReasoningThread`] owns a growing text context. Each cycle it
//! streams the backend's continuation and watches the tail for a complete
//! `<rica package="..." route="...">body</rica>` tag. When one appears,
//! generation stops, the call is dispatched, and the loop resumes from the
//! enlarged context:
//!
//! - **Foreground** routes block the cycle and append their result inline.
//! - **Background** routes append `{"call_id": ...}` immediately; the result
//!   is injected later as a `<rica-callback callid="...">` block, waking the
//!   thread if it had gone idle.
//! - The reserved `rica` `/response` route delivers payloads to subscribers
//!   instead of the context, so user-visible output and private reasoning
//!   stay separate.

pub mod app;
pub mod config;
pub mod connector;
pub mod error;
pub mod loader;
pub mod prompt;
pub mod router;
pub mod tag;
pub mod thread;
pub mod types;
pub mod validation;
pub mod whiteboard;

pub use error::{RicaError, RicaResult};
pub use types::{
    CallBack, CallOutcome, CallStatus, ExecutionMode, ResponseItem, ThreadEvent, ToolCall,
};
