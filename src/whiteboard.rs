//! Shared whiteboard for cross-thread state.
//!
//! Threads coordinate through named whiteboards: one thread writes findings,
//! another reads them. Operations are expressed as a single JSON action so the
//! whole surface fits one tool route (`rica.whiteboard` `/whiteboard`).
//! Failures are reported as JSON error objects the model can read.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};

use crate::app::{App, FnHandler, Route};
use crate::error::RicaResult;

#[derive(Clone, Default)]
struct Board {
    content: String,
    description: String,
}

/// Concurrent map of named text boards.
pub struct Whiteboard {
    boards: DashMap<String, Board>,
}

impl Whiteboard {
    pub fn new() -> Self {
        Self {
            boards: DashMap::new(),
        }
    }

    /// Dispatch one whiteboard action.
    ///
    /// Input shape:
    /// `{"action": "read"|"write"|"append"|"clear"|"list",
    ///   "whiteboard_id": "...", "content": "...", "description": "..."}`
    pub fn handle(&self, input: &Value) -> Value {
        let Some(action) = input.get("action").and_then(|v| v.as_str()) else {
            return json!({"error": "Missing 'action' parameter"});
        };
        let id = input
            .get("whiteboard_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let content = input
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let description = input.get("description").and_then(|v| v.as_str());

        match action {
            "read" => {
                let board = self
                    .boards
                    .get(id)
                    .map(|entry| entry.value().clone())
                    .unwrap_or_default();
                json!({
                    "content": board.content,
                    "description": board.description,
                })
            }
            "write" => {
                let mut board = self.boards.entry(id.to_string()).or_default();
                board.content = content.to_string();
                if let Some(description) = description {
                    board.description = description.to_string();
                }
                json!({
                    "status": "success",
                    "message": format!("Whiteboard '{id}' updated"),
                })
            }
            "append" => {
                let mut board = self.boards.entry(id.to_string()).or_default();
                board.content.push('\n');
                board.content.push_str(content);
                if let Some(description) = description {
                    board.description = description.to_string();
                }
                json!({
                    "status": "success",
                    "message": format!("Appended to whiteboard '{id}'"),
                })
            }
            "clear" => {
                self.boards.remove(id);
                json!({
                    "status": "success",
                    "message": format!("Whiteboard '{id}' cleared"),
                })
            }
            "list" => {
                let boards: Vec<Value> = self
                    .boards
                    .iter()
                    .map(|entry| {
                        json!({
                            "id": entry.key(),
                            "description": entry.value().description,
                        })
                    })
                    .collect();
                json!({ "whiteboards": boards })
            }
            other => json!({"error": format!("Unknown action: {other}")}),
        }
    }
}

impl Default for Whiteboard {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `rica.whiteboard` app around a shared [`Whiteboard`].
pub fn whiteboard_app(whiteboard: Arc<Whiteboard>) -> RicaResult<App> {
    let mut app = App::new("rica.whiteboard")?
        .with_description("Shared whiteboards for passing state between threads.");

    app.add_route(
        Route::new(
            "/whiteboard",
            Arc::new(FnHandler(move |input: Value| {
                let whiteboard = whiteboard.clone();
                async move { Ok(whiteboard.handle(&input)) }
            })),
        )
        .foreground()
        .with_description(
            "Read, write, append, clear, or list whiteboards. \
             input: {\"action\": \"read\", \"whiteboard_id\": \"default\"}",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "action": {"type": "string"},
                "whiteboard_id": {"type": "string"},
                "content": {"type": "string"},
                "description": {"type": "string"},
            },
            "required": ["action"],
        })),
    )?;

    Ok(app)
}
