//! Route template parsing.
//!
//! Templates use brace placeholders: `{name}`, `{name:constraint}`,
//! `{name?}`, `{*name}` and `{**name}` (catch-all). Parameter names are
//! compared case-insensitively.

use std::sync::OnceLock;

use regex::Regex;

use crate::binding::BindingSource;
use crate::error::RouteParameterMismatchError;
use crate::model::ActionDefinition;

/// One placeholder of a route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSegment {
    pub name: String,
    pub optional: bool,
    pub catch_all: bool,
    pub constraint: Option<String>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{(\*{1,2})?([A-Za-z_][A-Za-z0-9_]*)(?::([^}?]*))?(\?)?\}").unwrap()
    })
}

/// Placeholders of `template` in order of appearance.
pub fn route_parameters(template: &str) -> Vec<RouteSegment> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| RouteSegment {
            name: caps[2].to_string(),
            catch_all: caps.get(1).is_some(),
            constraint: caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .filter(|c| !c.is_empty()),
            optional: caps.get(4).is_some(),
        })
        .collect()
}

/// True when `template` declares `{name}` (any casing).
pub fn has_parameter(template: &str, name: &str) -> bool {
    route_parameters(template)
        .iter()
        .any(|seg| seg.name.eq_ignore_ascii_case(name))
}

/// Fails on the first `RouteParameter` binding whose name is not a placeholder of the route.
pub fn check_route_parameters(def: &ActionDefinition) -> Result<(), RouteParameterMismatchError> {
    let segments = route_parameters(&def.route_template);
    for (_, binding) in def.all_bindings() {
        if let BindingSource::RouteParameter { name } = binding.source() {
            if !segments.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                return Err(RouteParameterMismatchError {
                    endpoint: def.display(),
                    parameter: name.clone(),
                    template: def.route_template.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Convert a route template to axum 0.8 path syntax.
///
/// Constraints and optional markers are dropped; catch-alls become `{*name}`.
///
/// ```
/// # use actionkit::route::normalize_to_axum_path;
/// assert_eq!(normalize_to_axum_path("users/{id:int}"), "/users/{id}");
/// assert_eq!(normalize_to_axum_path("/files/{**path}"), "/files/{*path}");
/// ```
pub fn normalize_to_axum_path(template: &str) -> String {
    let replaced = placeholder_regex().replace_all(template, |caps: &regex::Captures<'_>| {
        if caps.get(1).is_some() {
            format!("{{*{}}}", &caps[2])
        } else {
            format!("{{{}}}", &caps[2])
        }
    });
    if replaced.starts_with('/') {
        replaced.into_owned()
    } else {
        format!("/{replaced}")
    }
}

/// Template with placeholder names erased, so `/u/{id}` and `/u/{userId}` share a shape.
pub fn route_shape(template: &str) -> String {
    normalize_to_axum_path(template)
        .split('/')
        .map(|seg| match seg.strip_prefix("{*") {
            Some(_) => "{*}",
            None if seg.starts_with('{') => "{}",
            None => seg,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert axum-style path parameters to OpenAPI placeholders.
///
/// ```
/// # use actionkit::route::axum_to_openapi_path;
/// assert_eq!(axum_to_openapi_path("/users/{id}"), "/users/{id}");
/// assert_eq!(axum_to_openapi_path("/static/{*path}"), "/static/{path}");
/// ```
pub fn axum_to_openapi_path(path: &str) -> String {
    path.replace("{*", "{")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingSpec;
    use crate::builder::ActionBuilder;

    #[test]
    fn parses_all_placeholder_forms() {
        let segs = route_parameters("/a/{id}/{slug:alpha}/{page?}/{**rest}");
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].name, "id");
        assert_eq!(segs[1].constraint.as_deref(), Some("alpha"));
        assert!(segs[2].optional);
        assert!(segs[3].catch_all);
        assert!(has_parameter("/users/{UserId}", "userid"));
    }

    #[test]
    fn route_check_is_case_insensitive() {
        let def = ActionBuilder::get("/users/{userId}")
            .using(BindingSpec::route::<i32>("USERID"))
            .to(|id: i32| id)
            .build();
        assert!(check_route_parameters(&def).is_ok());
    }

    #[test]
    fn route_check_reports_missing_name() {
        let def = ActionBuilder::get("/users/{id}")
            .using(BindingSpec::route::<i32>("userId"))
            .to(|id: i32| id)
            .build();
        let err = check_route_parameters(&def).unwrap_err();
        assert_eq!(err.parameter, "userId");
        assert_eq!(err.endpoint, "[GET]/users/{id}");
        assert_eq!(err.template, "/users/{id}");
    }

    #[test]
    fn normalizes_for_axum() {
        assert_eq!(
            normalize_to_axum_path("/a/{id:int}/{page?}/{*rest}"),
            "/a/{id}/{page}/{*rest}"
        );
        assert_eq!(axum_to_openapi_path("/a/{*rest}"), "/a/{rest}");
    }

    #[test]
    fn shape_ignores_parameter_names() {
        assert_eq!(route_shape("/users/{id}"), route_shape("users/{userId:int}"));
        assert_eq!(route_shape("/files/{**path}"), "/files/{*}");
        assert_ne!(route_shape("/users/{id}"), route_shape("/users/me"));
    }
}
