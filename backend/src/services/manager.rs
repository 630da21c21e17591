//! Global services manager for long-running services.
//!
//! Services register with the manager and are started/stopped together.
//! Start order respects [dependencies](Service::dependencies); a service is only
//! started after all of its dependencies. Stop runs in reverse order, so the
//! HTTP listener goes away before the stream service purges its directory.
//!
//! **HTTP route registration:** main registers `/api/*` route builders via
//! [add_api_routes](ServicesManagerBuilder::add_api_routes). The
//! [HttpServerService](crate::services::http_server::HttpServerService) builds
//! the app by calling [build_api_router](ServicesManager::build_api_router),
//! which merges all registered route builders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use parking_lot::RwLock as ParkingRwLock;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::app::AppState;
use crate::services::database::{DatabaseService, DatabaseServiceConfig};
use crate::services::http_server::{HttpServerConfig, HttpServerService};
use crate::services::stream::{StreamServiceConfig, StreamSupervisor};

/// Health status of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of a service health check.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// A service that can be started, stopped and health-checked by the manager.
///
/// Use the [tracing] crate for lifecycle logging and include the service name
/// as a field (e.g. `tracing::info!(service = "stream", "Started")`).
///
/// Stateless utilities (e.g. the ffmpeg wrapper) do not implement `Service`;
/// they are constructed and passed where needed.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique name for logging and lookup (e.g. "database", "stream", "http").
    fn name(&self) -> &str;

    /// Names of services that must be started before this one. Start order is
    /// computed from this; cycles are an error.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Start background tasks or connections.
    async fn start(&self) -> Result<()>;

    /// Stop background tasks and release resources. Idempotent.
    async fn stop(&self) -> Result<()>;

    /// Report current health. Used by the readiness endpoint.
    async fn health(&self) -> Result<ServiceHealth> {
        Ok(ServiceHealth::healthy())
    }
}

/// Pending registration for the builder.
pub enum ServiceRegistration {
    Database(DatabaseServiceConfig),
    Stream(StreamServiceConfig),
    Http(HttpServerConfig),
    Service(Arc<dyn Service>),
}

/// Types that can be added to a [ServicesManagerBuilder] via [add_service](ServicesManagerBuilder::add_service).
pub trait IntoServiceRegistration {
    #[doc(hidden)]
    fn into_registration(self) -> ServiceRegistration;
}

impl IntoServiceRegistration for DatabaseServiceConfig {
    fn into_registration(self) -> ServiceRegistration {
        ServiceRegistration::Database(self)
    }
}

impl IntoServiceRegistration for StreamServiceConfig {
    fn into_registration(self) -> ServiceRegistration {
        ServiceRegistration::Stream(self)
    }
}

impl IntoServiceRegistration for HttpServerConfig {
    fn into_registration(self) -> ServiceRegistration {
        ServiceRegistration::Http(self)
    }
}

impl IntoServiceRegistration for Arc<dyn Service> {
    fn into_registration(self) -> ServiceRegistration {
        ServiceRegistration::Service(self)
    }
}

type ApiRouteBuilder = Box<dyn Fn(AppState) -> Router<AppState> + Send + Sync>;

/// Builder for [ServicesManager]: add services with configs, then [build](ServicesManagerBuilder::build) or [start](ServicesManagerBuilder::start).
///
/// # Example
///
/// ```ignore
/// let services = ServicesManager::builder()
///     .add_service(DatabaseServiceConfig::from_url(&config.database_url))
///     .add_service(StreamServiceConfig::from_config(&config))
///     .add_service(HttpServerConfig { config: config.clone() })
///     .add_api_routes("stream", |_| api::stream::router())
///     .start()
///     .await?;
/// ```
pub struct ServicesManagerBuilder {
    registrations: Vec<ServiceRegistration>,
    /// Route builders for /api/*; merged in order when the HTTP app is built.
    api_route_registrations: Vec<(String, ApiRouteBuilder)>,
}

impl ServicesManagerBuilder {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            api_route_registrations: Vec::new(),
        }
    }

    /// Register a route builder for `/api/*`. `name` is for logging; `builder`
    /// receives [AppState](crate::app::AppState) and returns a [Router] to
    /// merge under `/api`.
    pub fn add_api_routes<N, F>(mut self, name: N, builder: F) -> Self
    where
        N: Into<String>,
        F: Fn(AppState) -> Router<AppState> + Send + Sync + 'static,
    {
        self.api_route_registrations
            .push((name.into(), Box::new(builder)));
        self
    }

    /// Add a service config or a pre-built [Arc]\[[dyn](Service)\].
    /// Config-based services are instantiated when [build](Self::build) or
    /// [start](Self::start) is called.
    pub fn add_service<T: IntoServiceRegistration>(mut self, t: T) -> Self {
        self.registrations.push(t.into_registration());
        self
    }

    /// Build the manager and register all services. Does not start them.
    pub async fn build(self) -> Result<Arc<ServicesManager>> {
        let manager = Arc::new(ServicesManager::new());
        for (name, builder) in self.api_route_registrations {
            manager.register_api_routes(name, builder);
        }
        for reg in self.registrations {
            match reg {
                ServiceRegistration::Database(config) => {
                    let db_svc = Arc::new(
                        DatabaseService::from_config(config)
                            .await
                            .context("Failed to create database service from config")?,
                    );
                    manager.register_database(db_svc).await;
                }
                ServiceRegistration::Stream(config) => {
                    let stream_svc = Arc::new(StreamSupervisor::new(config));
                    manager.register_stream(stream_svc).await;
                }
                ServiceRegistration::Http(config) => {
                    let http_svc =
                        Arc::new(HttpServerService::new(manager.clone(), config.config));
                    manager.register(http_svc).await;
                }
                ServiceRegistration::Service(svc) => {
                    manager.register(svc).await;
                }
            }
        }
        Ok(manager)
    }

    /// Build the manager, register all services, and start them in dependency order.
    pub async fn start(self) -> Result<Arc<ServicesManager>> {
        let manager = self.build().await?;
        manager.start_all().await?;
        Ok(manager)
    }
}

impl Default for ServicesManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry and lifecycle controller for services.
pub struct ServicesManager {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    started: RwLock<HashSet<String>>,
    database: RwLock<Option<Arc<DatabaseService>>>,
    stream: RwLock<Option<Arc<StreamSupervisor>>>,
    /// Route builders for /api/*; ParkingRwLock so registration and build are sync.
    api_route_builders: ParkingRwLock<Vec<(String, ApiRouteBuilder)>>,
}

impl Default for ServicesManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServicesManager {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            started: RwLock::new(HashSet::new()),
            database: RwLock::new(None),
            stream: RwLock::new(None),
            api_route_builders: ParkingRwLock::new(Vec::new()),
        }
    }

    pub fn builder() -> ServicesManagerBuilder {
        ServicesManagerBuilder::new()
    }

    /// Register a route builder for `/api/*`.
    pub fn register_api_routes(&self, name: String, builder: ApiRouteBuilder) {
        self.api_route_builders.write().push((name, builder));
    }

    /// Build the merged `/api` router from all registered route builders.
    pub fn build_api_router(&self, state: AppState) -> Router<AppState> {
        let builders = self.api_route_builders.read();
        let mut api = Router::new();
        for (name, f) in builders.iter() {
            api = api.merge(f(state.clone()));
            tracing::debug!(api_routes = %name, "Merged API route builder");
        }
        api
    }

    /// Compute start order from dependencies (topological order). Returns an error on unknown deps or cycles.
    async fn start_order(&self) -> Result<Vec<String>> {
        let guard = self.services.read().await;
        let names: HashSet<String> = guard.keys().cloned().collect();
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (name, svc) in guard.iter() {
            let d = svc.dependencies();
            for dep in &d {
                if !names.contains(dep) {
                    anyhow::bail!(
                        "Service {} depends on {} which is not registered",
                        name,
                        dep
                    );
                }
            }
            deps.insert(name.clone(), d);
        }
        drop(guard);

        // Kahn's algorithm: dependencies first. Ties are broken by name so
        // the order is stable across runs.
        let mut in_degree: HashMap<String, usize> = deps
            .iter()
            .map(|(name, d)| (name.clone(), d.len()))
            .collect();
        let mut dependent_on: HashMap<String, Vec<String>> =
            names.iter().map(|n| (n.clone(), Vec::new())).collect();
        for (name, d) in &deps {
            for dep in d {
                if let Some(dependents) = dependent_on.get_mut(dep) {
                    dependents.push(name.clone());
                }
            }
        }
        let mut queue: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| n.clone())
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(names.len());
        while let Some(n) = queue.pop() {
            order.push(n.clone());
            let mut ready = Vec::new();
            for s in dependent_on.get(&n).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(s) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(s.clone());
                    }
                }
            }
            queue.extend(ready);
            queue.sort_by(|a, b| b.cmp(a));
        }
        if order.len() != names.len() {
            anyhow::bail!("Service dependency cycle detected");
        }
        Ok(order)
    }

    /// Register a service. Does not start it. If a service with the same name
    /// exists, it is replaced (the previous instance is not stopped).
    pub async fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        let mut guard = self.services.write().await;
        if guard.insert(name.clone(), service).is_some() {
            warn!(service = %name, "Service '{}' reregistered, overwriting previous", name);
        } else {
            info!(service = %name, "Service '{}' registered", name);
        }
    }

    /// Register the database service so [get_database](ServicesManager::get_database) works.
    pub async fn register_database(&self, service: Arc<DatabaseService>) {
        *self.database.write().await = Some(service.clone());
        self.register(service).await;
    }

    /// Register the stream supervisor so [get_stream](ServicesManager::get_stream) works.
    pub async fn register_stream(&self, service: Arc<StreamSupervisor>) {
        *self.stream.write().await = Some(service.clone());
        self.register(service).await;
    }

    /// Return the database service if it is registered and currently **started**.
    /// Returns [None] when the database is not registered or stopped, so callers
    /// can return 503 instead of using a closed pool.
    pub async fn get_database(&self) -> Option<Arc<DatabaseService>> {
        if !self.started.read().await.contains("database") {
            return None;
        }
        self.database.read().await.clone()
    }

    /// Return the stream supervisor if it is registered and currently **started**.
    pub async fn get_stream(&self) -> Option<Arc<StreamSupervisor>> {
        if !self.started.read().await.contains("stream") {
            return None;
        }
        self.stream.read().await.clone()
    }

    /// Start all registered services in dependency order (dependencies first).
    pub async fn start_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in &order {
            let svc = {
                let g = self.services.read().await;
                g.get(name).cloned()
            };
            if let Some(s) = svc {
                if let Err(e) = s.start().await {
                    warn!(service = %name, error = %e, "Service '{}' start failed", name);
                    return Err(e).context(format!("failed to start service {}", name));
                }
                self.started.write().await.insert(name.clone());
                info!(service = %name, "Service '{}' started", name);
            }
        }
        Ok(())
    }

    /// Stop all registered services in reverse dependency order (dependents first).
    pub async fn stop_all(&self) -> Result<()> {
        let order = self.start_order().await?;
        for name in order.into_iter().rev() {
            let svc = {
                let g = self.services.read().await;
                g.get(&name).cloned()
            };
            if let Some(s) = svc {
                if let Err(e) = s.stop().await {
                    warn!(service = %name, error = %e, "Service '{}' stop failed", name);
                } else {
                    info!(service = %name, "Service '{}' stopped", name);
                }
                self.started.write().await.remove(&name);
            }
        }
        Ok(())
    }

    /// Health check for all registered services. Services that return an error
    /// from [health](Service::health) are reported as [Unhealthy](HealthStatus::Unhealthy).
    pub async fn health_all(&self) -> HashMap<String, ServiceHealth> {
        let services: Vec<(String, Arc<dyn Service>)> = {
            let guard = self.services.read().await;
            guard.iter().map(|(n, s)| (n.clone(), s.clone())).collect()
        };
        let mut out = HashMap::new();
        for (name, svc) in services {
            let h = match svc.health().await {
                Ok(h) => h,
                Err(e) => ServiceHealth::unhealthy(e.to_string()),
            };
            out.insert(name, h);
        }
        out
    }

    /// Return whether the given service is currently started.
    pub async fn is_started(&self, name: &str) -> bool {
        self.started.read().await.contains(name)
    }
}
