//! Loading tool apps from YAML manifests.
//!
//! An app manifest declares a package and its routes; each route binds either
//! a shell command template or a static echo payload. Command templates use
//! `{{key}}` placeholders filled from the call body after validation, so a
//! manifest like:
//!
//! ```yaml
//! package: sys.shell
//! description: Run shell commands.
//! routes:
//!   - path: /exec
//!     mode: foreground
//!     timeout_ms: 10000
//!     kind: shell
//!     command: "{{command}}"
//!     schema:
//!       type: object
//!       required: [command]
//! ```
//!
//! installs a working shell tool without any host code.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::app::{App, Route, ToolHandler};
use crate::error::{RicaError, RicaResult};
use crate::types::ExecutionMode;
use crate::validation::{sanitize_code, validate_input};

const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize)]
pub struct AppManifest {
    pub package: String,
    #[serde(default)]
    pub description: String,
    pub routes: Vec<RouteManifest>,
}

#[derive(Debug, Deserialize)]
pub struct RouteManifest {
    pub path: String,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(flatten)]
    pub binding: RouteBinding,
}

/// What a manifest route does when called.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteBinding {
    /// Run a shell command template, substituting `{{key}}` from the input.
    Shell {
        command: String,
        #[serde(default)]
        sanitize: bool,
    },
    /// Return a fixed payload, useful for smoke tests and stubs.
    Echo {
        #[serde(default)]
        payload: Option<Value>,
    },
}

/// Fill `{{key}}` placeholders in a command template from a JSON object.
fn render_template(template: &str, input: &Value) -> RicaResult<String> {
    let mut rendered = template.to_string();
    if let Some(object) = input.as_object() {
        for (key, value) in object {
            let placeholder = format!("{{{{{key}}}}}");
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &text);
        }
    }
    if rendered.contains("{{") {
        return Err(RicaError::Validation(format!(
            "unfilled placeholder in command template: {rendered}"
        )));
    }
    Ok(rendered)
}

/// Handler that runs a rendered shell command with a timeout.
pub struct ShellRouteHandler {
    template: String,
    sanitize: bool,
    schema: Option<Value>,
    timeout_ms: u64,
}

impl ShellRouteHandler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            sanitize: false,
            schema: None,
            timeout_ms: DEFAULT_SHELL_TIMEOUT_MS,
        }
    }

    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn with_schema(mut self, schema: Option<Value>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[async_trait]
impl ToolHandler for ShellRouteHandler {
    async fn call(&self, input: Value) -> RicaResult<Value> {
        if let Some(schema) = &self.schema {
            if !validate_input(schema, &input) {
                return Err(RicaError::Validation(
                    "input does not match route schema".into(),
                ));
            }
        }

        let mut command_line = render_template(&self.template, &input)?;
        if self.sanitize {
            command_line = sanitize_code(&command_line, None)?;
        }
        debug!(command = %command_line, "running shell route");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let waited = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            child.wait_with_output(),
        )
        .await;
        let output = match waited {
            Ok(result) => result?,
            Err(_) => {
                return Ok(json!({
                    "status": "timeout",
                    "timeout_ms": self.timeout_ms,
                }));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        Ok(json!({
            "status": if output.status.success() { "success" } else { "error" },
            "exit_code": output.status.code(),
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

/// Handler that returns its manifest payload, or echoes the input.
pub struct EchoHandler {
    payload: Option<Value>,
}

impl EchoHandler {
    pub fn new(payload: Option<Value>) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, input: Value) -> RicaResult<Value> {
        Ok(self.payload.clone().unwrap_or(input))
    }
}

/// Turn a parsed manifest into an installable [`App`].
pub fn build_app(manifest: AppManifest) -> RicaResult<App> {
    if manifest.routes.is_empty() {
        return Err(RicaError::Manifest(format!(
            "manifest for '{}' declares no routes",
            manifest.package
        )));
    }

    let mut app = App::new(manifest.package)?.with_description(manifest.description);

    for route_manifest in manifest.routes {
        let handler: Arc<dyn ToolHandler> = match route_manifest.binding {
            RouteBinding::Shell { command, sanitize } => Arc::new(
                ShellRouteHandler::new(command)
                    .with_sanitize(sanitize)
                    .with_schema(route_manifest.schema.clone())
                    .with_timeout_ms(
                        route_manifest.timeout_ms.unwrap_or(DEFAULT_SHELL_TIMEOUT_MS),
                    ),
            ),
            RouteBinding::Echo { payload } => Arc::new(EchoHandler::new(payload)),
        };

        let mut route = Route::new(route_manifest.path, handler)
            .with_description(route_manifest.description);
        route.mode = route_manifest.mode;
        route.timeout_ms = route_manifest.timeout_ms;
        route.schema = route_manifest.schema;

        app.add_route(route)?;
    }

    Ok(app)
}

/// Parse a YAML manifest string into an [`App`].
pub fn parse_manifest(yaml: &str) -> RicaResult<App> {
    let manifest: AppManifest = serde_yaml::from_str(yaml)?;
    build_app(manifest)
}

/// Load and build an app from a manifest file on disk.
pub async fn load_manifest(path: impl AsRef<Path>) -> RicaResult<App> {
    let yaml = tokio::fs::read_to_string(path).await?;
    parse_manifest(&yaml)
}
