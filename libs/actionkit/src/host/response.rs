//! RFC 7807 problem responses and outcome encoding.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{BindingError, DispatchError};
use crate::unit::ActionOutcome;

pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    pub fn new(status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_vec(&self).unwrap_or_default();
        (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
            )],
            body,
        )
            .into_response()
    }
}

impl From<BindingError> for Problem {
    fn from(e: BindingError) -> Self {
        match &e {
            BindingError::Body { .. } => Problem::new(422, "Unprocessable Entity", e.to_string()),
            BindingError::PayloadTooLarge { .. } => {
                Problem::new(413, "Payload Too Large", e.to_string())
            }
            BindingError::ServiceUnavailable { .. } => {
                Problem::new(500, "Internal Server Error", e.to_string())
            }
            _ => Problem::new(400, "Bad Request", e.to_string()),
        }
    }
}

impl From<DispatchError> for Problem {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Binding(b) => b.into(),
            other => Problem::new(500, "Internal Server Error", other.to_string()),
        }
    }
}

/// Encodes a unit's outcome as an HTTP response.
///
/// Strings are served as `text/plain`, unit results as `204`, everything else as JSON.
pub(crate) fn outcome_response(outcome: ActionOutcome) -> Response {
    match outcome {
        ActionOutcome::Rendered(rendered) => {
            let content_type = HeaderValue::from_str(&rendered.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("text/html"));
            ([(header::CONTENT_TYPE, content_type)], rendered.body).into_response()
        }
        ActionOutcome::Value(value) => match value.to_json() {
            Ok(serde_json::Value::String(s)) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                s,
            )
                .into_response(),
            Ok(serde_json::Value::Null) => StatusCode::NO_CONTENT.into_response(),
            Ok(json) => axum::Json(json).into_response(),
            Err(e) => Problem::from(DispatchError::from(e)).into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Rendered;
    use crate::value::{TypedValue, ValueType};
    use std::sync::Arc;

    #[test]
    fn binding_errors_map_to_client_statuses() {
        let p: Problem = BindingError::Missing {
            source_kind: "query",
            name: "page".into(),
        }
        .into();
        assert_eq!(p.status, 400);
        let p: Problem = BindingError::Body {
            reason: "eof".into(),
        }
        .into();
        assert_eq!(p.status, 422);
        let p: Problem = DispatchError::WouldSuspend.into();
        assert_eq!(p.status, 500);
    }

    #[test]
    fn problem_response_has_problem_content_type() {
        let resp = Problem::new(404, "Not Found", "nope").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            APPLICATION_PROBLEM_JSON
        );
    }

    #[test]
    fn outcome_content_types() {
        let text = outcome_response(ActionOutcome::Value(TypedValue::new(
            Arc::new("42".to_string()),
            ValueType::serializable::<String>(),
        )));
        assert!(text.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let json = outcome_response(ActionOutcome::Value(TypedValue::new(
            Arc::new(vec![1u8, 2]),
            ValueType::serializable::<Vec<u8>>(),
        )));
        assert_eq!(json.headers()[header::CONTENT_TYPE], "application/json");

        let unit = outcome_response(ActionOutcome::Value(TypedValue::new(
            Arc::new(()),
            ValueType::serializable::<()>(),
        )));
        assert_eq!(unit.status(), StatusCode::NO_CONTENT);

        let html = outcome_response(ActionOutcome::Rendered(Rendered::html("<b>x</b>")));
        assert!(html.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }
}
