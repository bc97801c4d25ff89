//! axum host: discovers compiled endpoints and serves them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on, MethodFilter, MethodRouter};
use axum::{Json, Router};
use http::Method;
use http_body_util::LengthLimitError;
use utoipa::openapi::OpenApi;

use crate::compiler::CompiledEndpoint;
use crate::config::HostConfig;
use crate::error::{BindingError, HostError};
use crate::route::{normalize_to_axum_path, route_shape};
use crate::services::ServiceProvider;

mod binder;
pub mod openapi;
mod response;
pub mod view;

pub use openapi::{OpenApiRegistry, OperationSpec, ParamLocation, ParamSpec, RequestBodySpec, ResponseSpec};
pub use response::{Problem, APPLICATION_PROBLEM_JSON};
pub use view::{FnViews, NoViews, ViewEngine};

use binder::{bind, RequestHost, RequestInput};
use response::outcome_response;

/// Catalog of compiled endpoints served through one router.
pub struct ActionHost {
    config: HostConfig,
    services: ServiceProvider,
    views: Arc<dyn ViewEngine>,
    endpoints: Vec<CompiledEndpoint>,
    /// `(method, shape)` → endpoint name
    routes: HashMap<(Method, String), String>,
    /// shape → first axum path registered for it
    paths: HashMap<String, String>,
    openapi: OpenApiRegistry,
}

impl ActionHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            services: ServiceProvider::new(),
            views: Arc::new(NoViews),
            endpoints: Vec::new(),
            routes: HashMap::new(),
            paths: HashMap::new(),
            openapi: OpenApiRegistry::new(),
        }
    }

    pub fn with_services(mut self, services: ServiceProvider) -> Self {
        self.services = services;
        self
    }

    pub fn with_views(mut self, views: Arc<dyn ViewEngine>) -> Self {
        self.views = views;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn add(&mut self, endpoint: CompiledEndpoint) -> Result<(), HostError> {
        let method = endpoint.definition.method.clone();
        MethodFilter::try_from(method.clone())
            .map_err(|_| HostError::UnsupportedMethod {
                method: method.clone(),
            })?;

        let path = normalize_to_axum_path(&endpoint.definition.route_template);
        let shape = route_shape(&path);
        if let Some(existing) = self.routes.get(&(method.clone(), shape.clone())) {
            return Err(HostError::DuplicateRoute {
                method,
                path,
                existing: existing.clone(),
            });
        }
        if let Some(existing) = self.paths.get(&shape) {
            if *existing != path {
                return Err(HostError::ConflictingRoute {
                    path,
                    existing: existing.clone(),
                });
            }
        }

        self.paths.entry(shape.clone()).or_insert_with(|| path.clone());
        self.routes.insert((method, shape), endpoint.name.clone());
        if let Some(spec) = OperationSpec::from_endpoint(&endpoint) {
            self.openapi.register_operation(spec);
        }
        tracing::info!(
            endpoint = %endpoint.name,
            unit = %endpoint.unit.type_name(),
            params = endpoint.unit.parameters().len(),
            "registered action endpoint"
        );
        self.endpoints.push(endpoint);
        Ok(())
    }

    pub fn add_all<I>(&mut self, endpoints: I) -> Result<(), HostError>
    where
        I: IntoIterator<Item = CompiledEndpoint>,
    {
        endpoints.into_iter().try_for_each(|e| self.add(e))
    }

    pub fn endpoints(&self) -> &[CompiledEndpoint] {
        &self.endpoints
    }

    pub fn operation_specs(&self) -> Vec<OperationSpec> {
        self.openapi.operation_specs()
    }

    pub fn openapi(&self) -> OpenApi {
        self.openapi.build_openapi(&self.config)
    }

    pub fn into_router(self) -> Result<Router, HostError> {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

        for endpoint in &self.endpoints {
            let method = endpoint.definition.method.clone();
            let filter = MethodFilter::try_from(method.clone())
                .map_err(|_| HostError::UnsupportedMethod { method })?;
            let path = normalize_to_axum_path(&endpoint.definition.route_template);

            let state = Arc::new(EndpointState {
                endpoint: endpoint.clone(),
                services: self.services.clone(),
                views: self.views.clone(),
                body_limit: self.config.body_limit_bytes,
            });
            let handler = move |req: Request| {
                let state = state.clone();
                async move { dispatch(state, req).await }
            };

            let router = match by_path.remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => on(filter, handler),
            };
            by_path.insert(path, router);
        }

        let mut router = Router::new();
        for (path, method_router) in by_path {
            router = router.route(&path, method_router);
        }

        if self.config.enable_openapi {
            let doc = Arc::new(self.openapi());
            router = router.route(
                &self.config.openapi_path,
                get(move || {
                    let doc = doc.clone();
                    async move { Json(doc.as_ref().clone()) }
                }),
            );
        }

        Ok(router)
    }
}

struct EndpointState {
    endpoint: CompiledEndpoint,
    services: ServiceProvider,
    views: Arc<dyn ViewEngine>,
    body_limit: usize,
}

async fn dispatch(state: Arc<EndpointState>, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();
    let instance = parts.uri.path().to_string();
    let route_values = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
        Ok(Path(values)) => values,
        Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
        Err(rejection) => {
            return Problem::from(BindingError::Invalid {
                source_kind: "route",
                name: instance.clone(),
                reason: rejection.body_text(),
            })
            .with_instance(instance)
            .into_response()
        }
    };

    let body = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = if exceeds_limit(&e) {
                BindingError::PayloadTooLarge {
                    limit: state.body_limit,
                }
            } else {
                BindingError::BodyRead {
                    reason: e.to_string(),
                }
            };
            return Problem::from(err).with_instance(instance).into_response();
        }
    };

    let input = RequestInput {
        parts,
        route_values,
        body,
    };
    let unit = &state.endpoint.unit;

    let args = match bind(unit.parameters(), &input, &state.services).await {
        Ok(args) => args,
        Err(e) => {
            tracing::debug!(endpoint = %state.endpoint.name, error = %e, "request binding failed");
            return Problem::from(e).with_instance(instance).into_response();
        }
    };

    let host = RequestHost {
        input: &input,
        services: &state.services,
        views: state.views.as_ref(),
    };
    match unit.invoke(args, &host).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            tracing::error!(endpoint = %state.endpoint.name, error = %e, "action dispatch failed");
            Problem::from(e).with_instance(instance).into_response()
        }
    }
}

/// `to_bytes` reports an exceeded limit as a `LengthLimitError` somewhere in the source chain.
fn exceeds_limit(e: &axum::Error) -> bool {
    std::iter::successors(Some(e as &(dyn std::error::Error + 'static)), |e| e.source())
        .any(|e| e.is::<LengthLimitError>())
}
