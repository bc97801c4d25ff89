//! OpenAPI description of compiled endpoints.

use std::collections::BTreeMap;

use dashmap::DashMap;
use http::Method;
use utoipa::openapi::{
    content::ContentBuilder,
    extensions::Extensions,
    info::InfoBuilder,
    path::{
        HttpMethod, OperationBuilder as UOperationBuilder, ParameterBuilder, ParameterIn,
        PathItemBuilder, PathsBuilder,
    },
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{ObjectBuilder, Schema, SchemaType, Type},
    OpenApi, OpenApiBuilder, Required,
};

use crate::compiler::CompiledEndpoint;
use crate::config::HostConfig;
use crate::host::response::APPLICATION_PROBLEM_JSON;
use crate::model::Annotation;
use crate::route::{axum_to_openapi_path, normalize_to_axum_path};
use crate::unit::BindingMarker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    /// JSON Schema primitive (`string`, `integer`, ...).
    pub param_type: String,
}

#[derive(Clone, Debug)]
pub struct RequestBodySpec {
    pub content_type: &'static str,
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Clone, Debug)]
pub struct ResponseSpec {
    pub status: u16,
    pub content_type: &'static str,
    pub description: String,
}

/// One documented operation, derived from a compiled endpoint.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub method: Method,
    /// axum-style path.
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub request_body: Option<RequestBodySpec>,
    pub responses: Vec<ResponseSpec>,
    /// Generated unit name.
    pub handler_id: String,
    /// `x-` vendor extensions from custom annotations.
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl OperationSpec {
    /// `None` when the endpoint is hidden from API documentation.
    pub fn from_endpoint(endpoint: &CompiledEndpoint) -> Option<Self> {
        let def = &endpoint.definition;
        let unit = &endpoint.unit;
        let annotations = || unit.shape.annotations.iter().chain(&unit.method.annotations);

        // An explicit ApiExplorer annotation overrides the definition flags.
        let (group, ignore) = annotations()
            .find_map(|a| match a {
                Annotation::ApiExplorer { group_name, ignore } => Some((group_name.clone(), *ignore)),
                _ => None,
            })
            .unwrap_or_else(|| (def.group_name.clone(), def.ignore_api));
        if ignore {
            return None;
        }

        let tags = group.into_iter().collect();

        let mut params = Vec::new();
        let mut request_body = None;
        for p in unit.parameters() {
            let location = match &p.marker {
                BindingMarker::FromRoute { .. } => Some(ParamLocation::Path),
                BindingMarker::FromQuery { .. } => Some(ParamLocation::Query),
                BindingMarker::FromHeader { .. } => Some(ParamLocation::Header),
                BindingMarker::FromBody => {
                    request_body = Some(RequestBodySpec {
                        content_type: "application/json",
                        description: None,
                        required: !p.optional,
                    });
                    None
                }
                BindingMarker::FromForm | BindingMarker::FromFormKey { .. } => {
                    if request_body.is_none() {
                        request_body = Some(RequestBodySpec {
                            content_type: "application/x-www-form-urlencoded",
                            description: None,
                            required: !p.optional,
                        });
                    }
                    None
                }
                BindingMarker::FromServices | BindingMarker::ModelBinder { .. } => None,
            };
            if let Some(location) = location {
                params.push(ParamSpec {
                    name: p.name.clone(),
                    required: location == ParamLocation::Path || !p.optional,
                    location,
                    description: None,
                    param_type: p.value_type.json_type().to_string(),
                });
            }
        }

        let success = if def.final_render_target().is_some() {
            ResponseSpec {
                status: 200,
                content_type: "text/html",
                description: "Rendered view".to_string(),
            }
        } else {
            let returns = unit.method.body.last().and_then(|c| c.returns);
            let content_type = match returns.map(|t| t.json_type()) {
                Some("string") => "text/plain",
                _ => "application/json",
            };
            ResponseSpec {
                status: 200,
                content_type,
                description: "Success".to_string(),
            }
        };
        let responses = vec![
            success,
            ResponseSpec {
                status: 400,
                content_type: APPLICATION_PROBLEM_JSON,
                description: "Bad Request".to_string(),
            },
            ResponseSpec {
                status: 500,
                content_type: APPLICATION_PROBLEM_JSON,
                description: "Internal Server Error".to_string(),
            },
        ];

        let extensions = annotations()
            .filter_map(|a| match a {
                Annotation::Custom { name, properties } => Some((
                    format!("x-{name}"),
                    serde_json::to_value(properties).unwrap_or_default(),
                )),
                _ => None,
            })
            .collect();

        Some(OperationSpec {
            method: def.method.clone(),
            path: normalize_to_axum_path(&def.route_template),
            operation_id: Some(endpoint.id.clone()),
            summary: def.title.clone(),
            description: def.description.clone(),
            tags,
            params,
            request_body,
            responses,
            handler_id: unit.type_name().to_string(),
            extensions,
        })
    }
}

/// Collects operation specs and emits a single OpenAPI document.
#[derive(Default)]
pub struct OpenApiRegistry {
    operation_specs: DashMap<String, OperationSpec>,
}

impl OpenApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_operation(&self, spec: OperationSpec) {
        self.operation_specs.insert(spec.handler_id.clone(), spec);
    }

    /// Registered specs ordered by path, then method.
    pub fn operation_specs(&self) -> Vec<OperationSpec> {
        let mut specs: Vec<_> = self
            .operation_specs
            .iter()
            .map(|e| e.value().clone())
            .collect();
        specs.sort_by(|a, b| {
            (a.path.as_str(), a.method.as_str()).cmp(&(b.path.as_str(), b.method.as_str()))
        });
        specs
    }

    pub fn build_openapi(&self, config: &HostConfig) -> OpenApi {
        let specs = self.operation_specs();
        tracing::info!("Building OpenAPI: found {} registered operations", specs.len());

        let mut paths = PathsBuilder::new();
        for spec in specs {
            let mut op = UOperationBuilder::new()
                .operation_id(spec.operation_id.clone().or(Some(spec.handler_id.clone())))
                .summary(spec.summary.clone())
                .description(spec.description.clone());

            for tag in &spec.tags {
                op = op.tag(tag.clone());
            }

            if !spec.extensions.is_empty() {
                let mut ext = Extensions::default();
                for (k, v) in &spec.extensions {
                    ext.insert(k.clone(), v.clone());
                }
                op = op.extensions(Some(ext));
            }

            for p in &spec.params {
                let in_ = match p.location {
                    ParamLocation::Path => ParameterIn::Path,
                    ParamLocation::Query => ParameterIn::Query,
                    ParamLocation::Header => ParameterIn::Header,
                };
                let required = if p.required {
                    Required::True
                } else {
                    Required::False
                };
                let schema = Schema::Object(
                    ObjectBuilder::new()
                        .schema_type(schema_type(&p.param_type))
                        .build(),
                );
                let param = ParameterBuilder::new()
                    .name(&p.name)
                    .parameter_in(in_)
                    .required(required)
                    .description(p.description.clone())
                    .schema(Some(schema))
                    .build();
                op = op.parameter(param);
            }

            if let Some(rb) = &spec.request_body {
                let content = ContentBuilder::new()
                    .schema(Some(Schema::Object(ObjectBuilder::new().build())))
                    .build();
                let mut rbld = RequestBodyBuilder::new()
                    .description(rb.description.clone())
                    .content(rb.content_type.to_string(), content);
                if rb.required {
                    rbld = rbld.required(Some(Required::True));
                }
                op = op.request_body(Some(rbld.build()));
            }

            let mut responses = ResponsesBuilder::new();
            for r in &spec.responses {
                let schema = if r.content_type.starts_with("text/") {
                    Schema::Object(
                        ObjectBuilder::new()
                            .schema_type(SchemaType::Type(Type::String))
                            .build(),
                    )
                } else {
                    Schema::Object(ObjectBuilder::new().build())
                };
                let content = ContentBuilder::new().schema(Some(schema)).build();
                let resp = ResponseBuilder::new()
                    .description(&r.description)
                    .content(r.content_type, content)
                    .build();
                responses = responses.response(r.status.to_string(), resp);
            }
            op = op.responses(responses.build());

            let method = match spec.method {
                Method::GET => HttpMethod::Get,
                Method::POST => HttpMethod::Post,
                Method::PUT => HttpMethod::Put,
                Method::DELETE => HttpMethod::Delete,
                Method::PATCH => HttpMethod::Patch,
                Method::HEAD => HttpMethod::Head,
                Method::OPTIONS => HttpMethod::Options,
                _ => HttpMethod::Get,
            };

            let item = PathItemBuilder::new().operation(method, op.build()).build();
            paths = paths.path(axum_to_openapi_path(&spec.path), item);
        }

        let info = InfoBuilder::new()
            .title(config.openapi_title.clone())
            .version(config.openapi_version.clone())
            .build();

        OpenApiBuilder::new().info(info).paths(paths.build()).build()
    }
}

fn schema_type(param_type: &str) -> SchemaType {
    match param_type {
        "integer" => SchemaType::Type(Type::Integer),
        "number" => SchemaType::Type(Type::Number),
        "boolean" => SchemaType::Type(Type::Boolean),
        _ => SchemaType::Type(Type::String),
    }
}
