//! Dispatching parsed tool calls to registered handlers.
//!
//! Foreground calls are awaited (with an optional timeout) and produce a
//! [`CallBack`] right away. Background calls are spawned onto the runtime and
//! return a call id; the finished [`CallBack`] is delivered through the
//! channel supplied by the owning reasoning thread, which injects it into the
//! context as a `<rica-callback>` block.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::AppRegistry;
use crate::error::{RicaError, RicaResult};
use crate::types::{CallBack, CallOutcome, ExecutionMode, ToolCall};

pub struct Router {
    registry: Arc<AppRegistry>,
}

impl Router {
    pub fn new(registry: Arc<AppRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    /// Dispatch a call. Tag attributes override the route's registered mode
    /// and timeout.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        callback_tx: mpsc::UnboundedSender<CallBack>,
    ) -> RicaResult<CallOutcome> {
        let route = self.registry.resolve(&call.package, &call.route)?;

        let background = match call.background {
            Some(flag) => flag,
            None => route.mode == ExecutionMode::Background,
        };
        let timeout_ms = call.timeout_ms.or(route.timeout_ms);

        if background {
            let call_id = Uuid::new_v4();
            let package = call.package.clone();
            let route_path = call.route.clone();
            let body = call.body.clone();
            let handler = route.handler.clone();

            debug!(package = %package, route = %route_path, %call_id, "scheduling background call");

            tokio::spawn(async move {
                let start = Instant::now();
                let callback = match run_with_timeout(timeout_ms, handler.call(body)).await {
                    Ok(Ok(payload)) => {
                        CallBack::success(&package, &route_path, call_id, payload)
                            .with_duration(start.elapsed().as_secs_f64() * 1000.0)
                    }
                    Ok(Err(e)) => {
                        warn!(package = %package, route = %route_path, %call_id, error = %e, "background call failed");
                        CallBack::error(&package, &route_path, call_id, e.to_string())
                    }
                    Err(timeout_ms) => {
                        warn!(package = %package, route = %route_path, %call_id, timeout_ms, "background call timed out");
                        CallBack::timeout(&package, &route_path, call_id, timeout_ms)
                    }
                };
                if callback_tx.send(callback).is_err() {
                    debug!(%call_id, "callback receiver dropped, result discarded");
                }
            });

            Ok(CallOutcome::Background(call_id))
        } else {
            let start = Instant::now();
            match run_with_timeout(timeout_ms, route.handler.call(call.body.clone())).await {
                Ok(Ok(payload)) => {
                    let callback = CallBack::success(
                        &call.package,
                        &call.route,
                        Uuid::new_v4(),
                        payload,
                    )
                    .with_duration(start.elapsed().as_secs_f64() * 1000.0);
                    Ok(CallOutcome::Completed(callback))
                }
                Ok(Err(e)) => Err(RicaError::ToolExecution {
                    package: call.package.clone(),
                    route: call.route.clone(),
                    message: e.to_string(),
                }),
                Err(timeout_ms) => Err(RicaError::ExecutionTimedOut {
                    package: call.package.clone(),
                    route: call.route.clone(),
                    timeout_ms,
                }),
            }
        }
    }
}

/// Await a handler future, bounded by `timeout_ms` when set. `Err` carries the
/// timeout that fired.
async fn run_with_timeout<F>(
    timeout_ms: Option<u64>,
    fut: F,
) -> Result<RicaResult<serde_json::Value>, u64>
where
    F: std::future::Future<Output = RicaResult<serde_json::Value>>,
{
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| ms),
        None => Ok(fut.await),
    }
}
