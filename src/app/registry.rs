use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{RicaError, RicaResult};

use super::{App, Route};

/// Concurrent registry of installed apps, keyed by package name.
pub struct AppRegistry {
    apps: DashMap<String, Arc<App>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self {
            apps: DashMap::new(),
        }
    }

    /// Install an app, rejecting duplicate packages.
    pub fn install(&self, app: App) -> RicaResult<()> {
        let package = app.package().to_string();
        if self.apps.contains_key(&package) {
            return Err(RicaError::PackageExists(package));
        }
        self.apps.insert(package, Arc::new(app));
        Ok(())
    }

    /// Install several apps atomically: duplicates anywhere reject the batch.
    pub fn install_all(&self, apps: Vec<App>) -> RicaResult<()> {
        let mut seen: Vec<&str> = Vec::with_capacity(apps.len());
        for app in &apps {
            if self.apps.contains_key(app.package()) || seen.contains(&app.package()) {
                return Err(RicaError::PackageExists(app.package().to_string()));
            }
            seen.push(app.package());
        }
        for app in apps {
            self.apps.insert(app.package().to_string(), Arc::new(app));
        }
        Ok(())
    }

    pub fn uninstall(&self, package: &str) -> RicaResult<()> {
        self.apps
            .remove(package)
            .map(|_| ())
            .ok_or_else(|| RicaError::PackageNotFound(package.to_string()))
    }

    pub fn get(&self, package: &str) -> Option<Arc<App>> {
        self.apps.get(package).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, package: &str) -> bool {
        self.apps.contains_key(package)
    }

    pub fn packages(&self) -> Vec<String> {
        self.apps.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all installed apps, for prompt assembly.
    pub fn apps(&self) -> Vec<Arc<App>> {
        self.apps.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Resolve a package/route pair to its registered route.
    pub fn resolve(&self, package: &str, route: &str) -> RicaResult<Route> {
        let app = self
            .get(package)
            .ok_or_else(|| RicaError::PackageNotFound(package.to_string()))?;
        app.find_route(route)
            .cloned()
            .ok_or_else(|| RicaError::RouteNotFound {
                package: package.to_string(),
                route: route.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{system_app, FnHandler};
    use std::sync::Arc as StdArc;

    fn sample_app(package: &str) -> App {
        let mut app = App::new(package).unwrap();
        app.add_route(Route::new(
            "/echo",
            StdArc::new(FnHandler(|input| async move { Ok(input) })),
        ))
        .unwrap();
        app
    }

    #[test]
    fn install_and_uninstall() {
        let registry = AppRegistry::new();
        registry.install(sample_app("test.pkg")).unwrap();
        assert!(registry.contains("test.pkg"));
        assert_eq!(registry.len(), 1);

        registry.uninstall("test.pkg").unwrap();
        assert!(!registry.contains("test.pkg"));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_install_rejected() {
        let registry = AppRegistry::new();
        registry.install(sample_app("test.pkg")).unwrap();
        let err = registry.install(sample_app("test.pkg")).unwrap_err();
        assert!(matches!(err, RicaError::PackageExists(_)));
    }

    #[test]
    fn uninstall_missing_errors() {
        let registry = AppRegistry::new();
        let err = registry.uninstall("ghost.pkg").unwrap_err();
        assert!(matches!(err, RicaError::PackageNotFound(_)));
    }

    #[test]
    fn install_all_rejects_batch_on_duplicate() {
        let registry = AppRegistry::new();
        registry.install(sample_app("first.pkg")).unwrap();

        let err = registry
            .install_all(vec![sample_app("second.pkg"), sample_app("first.pkg")])
            .unwrap_err();
        assert!(matches!(err, RicaError::PackageExists(_)));
        // The whole batch was rejected.
        assert!(!registry.contains("second.pkg"));
    }

    #[test]
    fn install_all_rejects_internal_duplicate() {
        let registry = AppRegistry::new();
        let err = registry
            .install_all(vec![sample_app("dup.pkg"), sample_app("dup.pkg")])
            .unwrap_err();
        assert!(matches!(err, RicaError::PackageExists(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_finds_route() {
        let registry = AppRegistry::new();
        registry.install(sample_app("test.pkg")).unwrap();

        let route = registry.resolve("test.pkg", "/echo").unwrap();
        assert_eq!(route.path, "/echo");

        assert!(matches!(
            registry.resolve("test.pkg", "/missing"),
            Err(RicaError::RouteNotFound { .. })
        ));
        assert!(matches!(
            registry.resolve("ghost.pkg", "/echo"),
            Err(RicaError::PackageNotFound(_))
        ));
    }

    #[test]
    fn system_app_installs() {
        let registry = AppRegistry::new();
        registry.install(system_app()).unwrap();
        assert!(registry.resolve("rica", "/response").is_ok());
    }
}
