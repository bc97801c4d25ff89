//! Model binder: turns request input into the action method's arguments by
//! reading each parameter's [`BindingMarker`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use http::request::Parts;

use crate::binding::{AmbientKind, Decoder, RequestContext, ResolveContext};
use crate::error::{BindingError, DispatchError};
use crate::host::view::ViewEngine;
use crate::services::ServiceProvider;
use crate::unit::{Arguments, BindingMarker, HostContext, ParameterInfo, RenderRequest, Rendered};
use crate::value::Value;

/// Everything the binder reads from one request.
pub(crate) struct RequestInput {
    pub parts: Parts,
    pub route_values: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestInput {
    fn route_value(&self, name: &str) -> Option<&str> {
        self.route_values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn query_value(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.into_owned())
    }

    fn header_value(&self, name: &str) -> Result<Option<&str>, BindingError> {
        match self.parts.headers.get(name) {
            None => Ok(None),
            Some(v) => v.to_str().map(Some).map_err(|e| BindingError::Invalid {
                source_kind: "header",
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn form_value(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.into_owned())
    }
}

pub(crate) async fn bind(
    params: &[ParameterInfo],
    input: &RequestInput,
    services: &ServiceProvider,
) -> Result<Arguments, BindingError> {
    let mut args = Arguments::with_len(params.len());
    for param in params {
        if let Some(value) = bind_one(param, input, services).await? {
            args.set(param.position, value);
        }
    }
    Ok(args)
}

async fn bind_one(
    param: &ParameterInfo,
    input: &RequestInput,
    services: &ServiceProvider,
) -> Result<Option<Value>, BindingError> {
    let decoder = param.binding.decoder;
    let raw = match &param.marker {
        BindingMarker::FromRoute { name } => {
            text(decoder, "route", name, input.route_value(name))?
        }
        BindingMarker::FromQuery { name } => {
            text(decoder, "query", name, input.query_value(name).as_deref())?
        }
        BindingMarker::FromHeader { name } => {
            text(decoder, "header", name, input.header_value(name)?)?
        }
        BindingMarker::FromFormKey { key } => {
            text(decoder, "form field", key, input.form_value(key).as_deref())?
        }
        BindingMarker::FromBody | BindingMarker::FromForm => {
            if input.body.is_empty() {
                None
            } else {
                match decoder {
                    Decoder::Bytes(decode) => Some(
                        decode(&input.body).map_err(|reason| BindingError::Body { reason })?,
                    ),
                    _ => None,
                }
            }
        }
        BindingMarker::FromServices => match decoder {
            Decoder::Service(lookup) => Some(lookup(services).ok_or(
                BindingError::ServiceUnavailable {
                    service: param.value_type.name(),
                },
            )?),
            _ => None,
        },
        BindingMarker::ModelBinder { resolver } => {
            let ctx = ResolveContext {
                parts: &input.parts,
                route_values: &input.route_values,
                services,
            };
            let value = resolver
                .resolve(&ctx)
                .await
                .map_err(|reason| BindingError::Resolver {
                    resolver: resolver.type_name(),
                    reason,
                })?;
            Some(value)
        }
    };

    match raw {
        Some(value) => Ok(Some(value)),
        None if param.optional => Ok(param.default.clone()),
        None => Err(BindingError::Missing {
            source_kind: source_kind(&param.marker),
            name: param.name.clone(),
        }),
    }
}

fn text(
    decoder: Decoder,
    source_kind: &'static str,
    name: &str,
    raw: Option<&str>,
) -> Result<Option<Value>, BindingError> {
    let (Some(raw), Decoder::Text(decode)) = (raw, decoder) else {
        return Ok(None);
    };
    decode(raw).map(Some).map_err(|reason| BindingError::Invalid {
        source_kind,
        name: name.to_string(),
        reason,
    })
}

fn source_kind(marker: &BindingMarker) -> &'static str {
    match marker {
        BindingMarker::FromServices => "service",
        BindingMarker::FromRoute { .. } => "route",
        BindingMarker::FromQuery { .. } => "query",
        BindingMarker::FromHeader { .. } => "header",
        BindingMarker::FromBody => "body",
        BindingMarker::FromForm => "form",
        BindingMarker::FromFormKey { .. } => "form field",
        BindingMarker::ModelBinder { .. } => "resolver",
    }
}

/// [`HostContext`] for one in-flight request.
pub(crate) struct RequestHost<'a> {
    pub input: &'a RequestInput,
    pub services: &'a ServiceProvider,
    pub views: &'a dyn ViewEngine,
}

impl HostContext for RequestHost<'_> {
    fn ambient(&self, kind: AmbientKind) -> Option<Value> {
        let parts = &self.input.parts;
        Some(match kind {
            AmbientKind::Method => Arc::new(parts.method.clone()),
            AmbientKind::Uri => Arc::new(parts.uri.clone()),
            AmbientKind::Headers => Arc::new(parts.headers.clone()),
            AmbientKind::Request => Arc::new(RequestContext {
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                headers: parts.headers.clone(),
                route_values: self.input.route_values.clone(),
            }),
            AmbientKind::Services => Arc::new(self.services.clone()),
        })
    }

    fn render(&self, request: RenderRequest) -> Result<Rendered, DispatchError> {
        Ok(self.views.render(&request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::builder::ActionBuilder;
    use crate::compiler::ActionCompiler;
    use crate::registry::HandlerRegistry;

    fn input(uri: &str, routes: &[(&str, &str)], body: &'static [u8]) -> RequestInput {
        let (parts, _) = http::Request::builder()
            .uri(uri)
            .header("x-tenant", "acme")
            .body(())
            .unwrap()
            .into_parts();
        RequestInput {
            parts,
            route_values: routes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Bytes::from_static(body),
        }
    }

    fn params_of(def: crate::model::ActionDefinition) -> Vec<ParameterInfo> {
        ActionCompiler::new()
            .with_registry(Arc::new(HandlerRegistry::new()))
            .compile(def, None)
            .unwrap()
            .unit
            .parameters()
            .to_vec()
    }

    #[tokio::test]
    async fn binds_route_query_and_header() {
        let params = params_of(
            ActionBuilder::get("/users/{userId}")
                .using(BindingSpec::route::<i32>("userId"))
                .using(BindingSpec::query::<u32>("Page"))
                .using(BindingSpec::header::<String>("x-tenant"))
                .to(|id: i32, page: u32, tenant: String| format!("{tenant}/{id}/{page}"))
                .build(),
        );
        let input = input("/users/7?page=3", &[("userid", "7")], b"");
        let args = bind(&params, &input, &ServiceProvider::new()).await.unwrap();
        assert_eq!(args.get(1).and_then(|v| v.downcast_ref::<i32>()), Some(&7));
        assert_eq!(args.get(2).and_then(|v| v.downcast_ref::<u32>()), Some(&3));
        assert_eq!(
            args.get(3).and_then(|v| v.downcast_ref::<String>()).map(String::as_str),
            Some("acme")
        );
    }

    #[tokio::test]
    async fn missing_and_invalid_values() {
        let params = params_of(
            ActionBuilder::get("/x")
                .using(BindingSpec::query::<u32>("page"))
                .using(BindingSpec::query::<u32>("size").with_default(20u32))
                .to(|p: u32, s: u32| p * s)
                .build(),
        );
        let services = ServiceProvider::new();

        let err = bind(&params, &input("/x", &[], b""), &services)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::Missing {
                source_kind: "query",
                name: "page".into()
            }
        );

        let err = bind(&params, &input("/x?page=abc", &[], b""), &services)
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::Invalid { .. }));

        let args = bind(&params, &input("/x?page=2", &[], b""), &services)
            .await
            .unwrap();
        assert_eq!(args.get(2).and_then(|v| v.downcast_ref::<u32>()), Some(&20));
    }

    #[tokio::test]
    async fn form_fields_and_bodies() {
        let params = params_of(
            ActionBuilder::post("/x")
                .using(BindingSpec::form_value::<String>("name"))
                .to(|n: String| n)
                .build(),
        );
        let args = bind(
            &params,
            &input("/x", &[], b"name=Ada+Lovelace&x=1"),
            &ServiceProvider::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            args.get(1).and_then(|v| v.downcast_ref::<String>()).map(String::as_str),
            Some("Ada Lovelace")
        );

        let params = params_of(
            ActionBuilder::post("/x")
                .using(BindingSpec::body::<Vec<u32>>())
                .to(|v: Vec<u32>| v.len())
                .build(),
        );
        let err = bind(&params, &input("/x", &[], b"{oops"), &ServiceProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::Body { .. }));
    }

    #[tokio::test]
    async fn services_must_be_registered() {
        struct Clock;
        let params = params_of(
            ActionBuilder::get("/x")
                .using(BindingSpec::service::<Clock>())
                .to(|_c: Arc<Clock>| 1u8)
                .build(),
        );
        let err = bind(&params, &input("/x", &[], b""), &ServiceProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::ServiceUnavailable { .. }));

        let services = ServiceProvider::new().with(Arc::new(Clock));
        let args = bind(&params, &input("/x", &[], b""), &services).await.unwrap();
        assert!(args.get(1).unwrap().downcast_ref::<Arc<Clock>>().is_some());
    }
}
