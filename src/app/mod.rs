//! Tool applications — named packages exposing callable routes.
//!
//! An [`App`] groups routes under a validated dotted package name
//! (`weather.lookup`). Each [`Route`] carries an execution mode, an optional
//! timeout, and an async [`ToolHandler`]. The virtual `rica` package built by
//! [`system_app`] reserves `/response` (user-visible output) and `/userinput`
//! (marker for inserted user text).

pub mod registry;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RicaError, RicaResult};
use crate::types::ExecutionMode;

pub use registry::AppRegistry;

/// An async tool endpoint.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the JSON body of the calling tag.
    async fn call(&self, input: serde_json::Value) -> RicaResult<serde_json::Value>;
}

/// Adapter so plain async closures can be registered as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = RicaResult<serde_json::Value>> + Send,
{
    async fn call(&self, input: serde_json::Value) -> RicaResult<serde_json::Value> {
        (self.0)(input).await
    }
}

/// A registered endpoint within an app.
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub mode: ExecutionMode,
    /// Timeout in milliseconds. `None` means unlimited.
    pub timeout_ms: Option<u64>,
    pub description: String,
    /// Optional JSON-schema subset describing the expected input.
    pub schema: Option<serde_json::Value>,
    pub handler: Arc<dyn ToolHandler>,
}

impl Route {
    pub fn new(path: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            path: path.into(),
            mode: ExecutionMode::default(),
            timeout_ms: None,
            description: String::new(),
            schema: None,
            handler,
        }
    }

    pub fn foreground(mut self) -> Self {
        self.mode = ExecutionMode::Foreground;
        self
    }

    pub fn background(mut self) -> Self {
        self.mode = ExecutionMode::Background;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Check whether a package name is syntactically valid.
///
/// Dotted segments, each starting alphabetic with an alnum/underscore tail, at
/// least two segments, at most 256 chars. Bare `rica` is reserved for the
/// virtual system app.
pub fn package_is_valid(package: &str) -> bool {
    if package.is_empty() || package.len() > 256 {
        return false;
    }

    if package == "rica" {
        return true;
    }

    let segments: Vec<&str> = package.split('.').collect();
    if segments.len() < 2 {
        return false;
    }

    segments.iter().all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

/// A tool application: a validated package name plus its routes.
pub struct App {
    package: String,
    description: String,
    routes: Vec<Route>,
}

impl App {
    pub fn new(package: impl Into<String>) -> RicaResult<Self> {
        let package = package.into();
        if !package_is_valid(&package) {
            return Err(RicaError::PackageInvalid(package));
        }
        Ok(Self {
            package,
            description: String::new(),
            routes: Vec::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Register a route, rejecting duplicate paths.
    pub fn add_route(&mut self, route: Route) -> RicaResult<()> {
        if self.find_route(&route.path).is_some() {
            return Err(RicaError::RouteExists {
                package: self.package.clone(),
                route: route.path,
            });
        }
        self.routes.push(route);
        Ok(())
    }

    /// Builder-style registration for chained setup.
    pub fn route(mut self, route: Route) -> RicaResult<Self> {
        self.add_route(route)?;
        Ok(self)
    }

    pub fn find_route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.path == path)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("package", &self.package)
            .field("routes", &self.routes)
            .finish()
    }
}

/// Build the virtual `rica` system app.
///
/// `/response` delivers final payloads to response observers — the reasoning
/// thread short-circuits it before dispatch, so the handler here only covers
/// direct router use. `/userinput` marks inserted user text and rejects calls.
pub fn system_app() -> App {
    let mut app = App::new("rica").expect("reserved package name is valid");
    app.add_route(
        Route::new(
            "/response",
            Arc::new(FnHandler(|_input: serde_json::Value| async move {
                Ok(serde_json::json!({"status": "success"}))
            })),
        )
        .foreground()
        .with_description(
            "Respond to the user with formatted content. \
             input: [{\"type\": \"text\", \"content\": \"...\"}]",
        ),
    )
    .expect("system routes are unique");

    app.add_route(
        Route::new(
            "/userinput",
            Arc::new(FnHandler(|_input: serde_json::Value| async move {
                Err::<serde_json::Value, _>(RicaError::ToolExecution {
                    package: "rica".into(),
                    route: "/userinput".into(),
                    message: "reserved for inserted user input, cannot be called".into(),
                })
            })),
        )
        .with_description("Reserved marker for inserted user input. Cannot be called."),
    )
    .expect("system routes are unique");

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn package_checker_accepts_dotted_names() {
        assert!(package_is_valid("test.package"));
        assert!(package_is_valid("sys.python.exec"));
        assert!(package_is_valid("a.b_c1"));
        assert!(package_is_valid("rica"));
    }

    #[test]
    fn package_checker_rejects_bad_names() {
        assert!(!package_is_valid(""));
        assert!(!package_is_valid("single"));
        assert!(!package_is_valid("invalid-package"));
        assert!(!package_is_valid("1starts.digit"));
        assert!(!package_is_valid("double..dot"));
        assert!(!package_is_valid(".leading.dot"));
        assert!(!package_is_valid(&"x.".repeat(200)));
    }

    #[test]
    fn app_rejects_invalid_package() {
        assert!(matches!(
            App::new("invalid-package"),
            Err(RicaError::PackageInvalid(_))
        ));
    }

    #[test]
    fn route_registration_and_lookup() {
        let mut app = App::new("test.package").unwrap();
        app.add_route(Route::new(
            "/test_route",
            Arc::new(FnHandler(|input| async move { Ok(input) })),
        ))
        .unwrap();

        assert_eq!(app.routes().len(), 1);
        let route = app.find_route("/test_route").unwrap();
        assert_eq!(route.path, "/test_route");
        assert_eq!(route.mode, ExecutionMode::Background);
        assert!(app.find_route("/missing").is_none());
    }

    #[test]
    fn duplicate_route_rejected() {
        let mut app = App::new("test.package").unwrap();
        let handler = Arc::new(FnHandler(|input| async move { Ok(input) }));
        app.add_route(Route::new("/duplicate", handler.clone()))
            .unwrap();

        let err = app
            .add_route(Route::new("/duplicate", handler))
            .unwrap_err();
        assert!(matches!(err, RicaError::RouteExists { .. }));
    }

    #[tokio::test]
    async fn fn_handler_calls_closure() {
        let handler = FnHandler(|input: serde_json::Value| async move {
            Ok(json!({"echo": input}))
        });
        let result = handler.call(json!({"msg": "hi"})).await.unwrap();
        assert_eq!(result["echo"]["msg"], "hi");
    }

    #[tokio::test]
    async fn system_app_routes() {
        let app = system_app();
        assert_eq!(app.package(), "rica");

        let response = app.find_route("/response").unwrap();
        assert_eq!(response.mode, ExecutionMode::Foreground);
        let result = response.handler.call(json!([])).await.unwrap();
        assert_eq!(result["status"], "success");

        let userinput = app.find_route("/userinput").unwrap();
        let err = userinput.handler.call(json!({})).await.unwrap_err();
        assert!(matches!(err, RicaError::ToolExecution { .. }));
    }

    #[test]
    fn route_builder_options() {
        let route = Route::new(
            "/slow",
            Arc::new(FnHandler(|input| async move { Ok(input) })),
        )
        .foreground()
        .with_timeout_ms(5000)
        .with_description("a slow tool")
        .with_schema(json!({"type": "object"}));

        assert_eq!(route.mode, ExecutionMode::Foreground);
        assert_eq!(route.timeout_ms, Some(5000));
        assert_eq!(route.description, "a slow tool");
        assert!(route.schema.is_some());
    }
}
