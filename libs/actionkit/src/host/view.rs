use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ViewError;
use crate::unit::{RenderRequest, Rendered};

/// The host's render operation.
pub trait ViewEngine: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<Rendered, ViewError>;
}

/// Engine without any views; every render fails with `NotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoViews;

impl ViewEngine for NoViews {
    fn render(&self, request: &RenderRequest) -> Result<Rendered, ViewError> {
        Err(ViewError::NotFound {
            target: request.target.clone(),
        })
    }
}

type ViewFn = Arc<dyn Fn(&serde_json::Value) -> Result<String, String> + Send + Sync>;

/// Views, partials and components backed by closures over the JSON-encoded model.
#[derive(Default, Clone)]
pub struct FnViews {
    views: HashMap<String, ViewFn>,
}

impl FnViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view<F>(mut self, target: impl Into<String>, f: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.views.insert(target.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, target: &str) -> bool {
        self.views.contains_key(target)
    }
}

impl ViewEngine for FnViews {
    fn render(&self, request: &RenderRequest) -> Result<Rendered, ViewError> {
        let view = self
            .views
            .get(&request.target)
            .ok_or_else(|| ViewError::NotFound {
                target: request.target.clone(),
            })?;
        let model = request.model.to_json()?;
        let body = view(&model).map_err(|reason| ViewError::Render {
            target: request.target.clone(),
            reason,
        })?;
        tracing::debug!(target_view = %request.target, kind = ?request.kind, "rendered view");
        Ok(Rendered::html(body))
    }
}

impl std::fmt::Debug for FnViews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.views.keys().collect();
        names.sort();
        f.debug_struct("FnViews").field("views", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RenderKind;
    use crate::value::{TypedValue, ValueType};

    fn request(target: &str) -> RenderRequest {
        RenderRequest {
            kind: RenderKind::View,
            target: target.to_string(),
            model: TypedValue::new(
                Arc::new("Ada".to_string()),
                ValueType::serializable::<String>(),
            ),
        }
    }

    #[test]
    fn renders_with_json_model() {
        let views = FnViews::new().view("Hello", |m| {
            Ok(format!("<p>{}</p>", m.as_str().unwrap_or_default()))
        });
        let out = views.render(&request("Hello")).unwrap();
        assert_eq!(out.body, "<p>Ada</p>");
        assert!(out.content_type.starts_with("text/html"));
    }

    #[test]
    fn unknown_and_failing_views() {
        let views = FnViews::new().view("Broken", |_| Err("boom".to_string()));
        assert!(matches!(
            views.render(&request("Missing")),
            Err(ViewError::NotFound { .. })
        ));
        assert!(matches!(
            views.render(&request("Broken")),
            Err(ViewError::Render { .. })
        ));
        assert!(matches!(
            NoViews.render(&request("Hello")),
            Err(ViewError::NotFound { .. })
        ));
    }
}
