use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Execution Mode ─────────────────────────────────────────────────────────

/// How a route runs when the model calls it.
///
/// Foreground calls block the reasoning loop until the result is available and
/// append it inline. Background calls return a call id immediately; the result
/// arrives later as a `<rica-callback>` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Foreground,
    Background,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Background
    }
}

// ─── Tool Calls ─────────────────────────────────────────────────────────────

/// A parsed `<rica ...>body</rica>` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub package: String,
    pub route: String,
    /// Per-call override of the route's execution mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    /// Per-call timeout override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Call id echoed back by the runtime for background calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,
    /// JSON body of the tag. An empty body parses as `{}`.
    pub body: serde_json::Value,
}

/// Terminal status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
    Timeout,
}

/// The result of a completed tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallBack {
    pub package: String,
    pub route: String,
    pub call_id: Uuid,
    pub payload: serde_json::Value,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

impl CallBack {
    pub fn success(
        package: impl Into<String>,
        route: impl Into<String>,
        call_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            package: package.into(),
            route: route.into(),
            call_id,
            payload,
            status: CallStatus::Success,
            error: None,
            duration_ms: None,
            completed_at: Utc::now(),
        }
    }

    pub fn error(
        package: impl Into<String>,
        route: impl Into<String>,
        call_id: Uuid,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            package: package.into(),
            route: route.into(),
            call_id,
            payload: serde_json::json!({"status": "error", "error": message}),
            status: CallStatus::Error,
            error: Some(message),
            duration_ms: None,
            completed_at: Utc::now(),
        }
    }

    pub fn timeout(
        package: impl Into<String>,
        route: impl Into<String>,
        call_id: Uuid,
        timeout_ms: u64,
    ) -> Self {
        Self {
            package: package.into(),
            route: route.into(),
            call_id,
            payload: serde_json::json!({"status": "timeout", "timeout_ms": timeout_ms}),
            status: CallStatus::Timeout,
            error: Some(format!("timed out after {timeout_ms}ms")),
            duration_ms: Some(timeout_ms as f64),
            completed_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// What the router hands back for a dispatched call.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// Foreground call finished; result available now.
    Completed(CallBack),
    /// Background call scheduled; the callback arrives on the thread's channel.
    Background(Uuid),
}

// ─── User-Visible Responses ─────────────────────────────────────────────────

/// A typed payload item delivered through `rica` `/response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Text { content: String },
}

// ─── Thread Events ──────────────────────────────────────────────────────────

/// Events emitted by a reasoning thread as it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEvent {
    /// A raw piece of text generated by the backend or appended by the runtime.
    TokenGenerated { text: String },
    /// External text inserted into the context.
    Inserted { text: String },
    ToolCallStarted { package: String, route: String },
    ToolCallCompleted { callback: CallBack },
    /// A background call was scheduled; its result arrives later.
    BackgroundScheduled {
        package: String,
        route: String,
        call_id: Uuid,
    },
    /// A background result was injected into the context as a callback block.
    CallbackInjected { call_id: Uuid },
    /// Final user-visible payload from the `rica` `/response` route.
    Response { payload: serde_json::Value },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_success_carries_payload() {
        let id = Uuid::new_v4();
        let cb = CallBack::success("test.pkg", "/echo", id, json!({"ok": true}));
        assert_eq!(cb.status, CallStatus::Success);
        assert_eq!(cb.call_id, id);
        assert_eq!(cb.payload["ok"], true);
        assert!(cb.error.is_none());
    }

    #[test]
    fn callback_error_shapes_payload() {
        let cb = CallBack::error("test.pkg", "/echo", Uuid::new_v4(), "boom");
        assert_eq!(cb.status, CallStatus::Error);
        assert_eq!(cb.payload["status"], "error");
        assert_eq!(cb.payload["error"], "boom");
    }

    #[test]
    fn callback_timeout_records_duration() {
        let cb = CallBack::timeout("test.pkg", "/slow", Uuid::new_v4(), 250);
        assert_eq!(cb.status, CallStatus::Timeout);
        assert_eq!(cb.duration_ms, Some(250.0));
        assert_eq!(cb.payload["timeout_ms"], 250);
    }

    #[test]
    fn tool_call_roundtrips() {
        let call = ToolCall {
            package: "weather.lookup".into(),
            route: "/current".into(),
            background: Some(true),
            timeout_ms: Some(10_000),
            call_id: None,
            body: json!({"city": "Tokyo"}),
        };
        let text = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&text).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn response_item_tagged_serde() {
        let item = ResponseItem::Text {
            content: "Hello, world!".into(),
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v, json!({"type": "text", "content": "Hello, world!"}));
    }

    #[test]
    fn thread_event_serializes_tagged() {
        let event = ThreadEvent::TokenGenerated {
            text: "thinking".into(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "token_generated");
    }

    #[test]
    fn execution_mode_default_is_background() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Background);
    }
}
