use serde::{Deserialize, Serialize};

/// Settings for endpoint compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Prefix of generated unit type names.
    #[serde(default = "default_unit_name_prefix")]
    pub unit_name_prefix: String,
    /// Stop a batch at the first failing endpoint.
    #[serde(default)]
    pub fail_fast: bool,
    /// Emit the parameter plan of every compiled endpoint as a diagnostic.
    #[serde(default = "default_true")]
    pub log_plans: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            unit_name_prefix: default_unit_name_prefix(),
            fail_fast: false,
            log_plans: default_true(),
        }
    }
}

/// Settings for serving compiled endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default = "default_true")]
    pub enable_openapi: bool,
    #[serde(default = "default_openapi_path")]
    pub openapi_path: String,
    #[serde(default = "default_openapi_title")]
    pub openapi_title: String,
    #[serde(default = "default_openapi_version")]
    pub openapi_version: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: default_body_limit_bytes(),
            enable_openapi: default_true(),
            openapi_path: default_openapi_path(),
            openapi_title: default_openapi_title(),
            openapi_version: default_openapi_version(),
        }
    }
}

/// The `actions` section of the application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ActionsConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub host: HostConfig,
}

fn default_unit_name_prefix() -> String {
    "ActionUnit".to_string()
}

fn default_true() -> bool {
    true
}

fn default_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_openapi_path() -> String {
    "/openapi.json".to_string()
}

fn default_openapi_title() -> String {
    "Action API".to_string()
}

fn default_openapi_version() -> String {
    "0.1.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let cfg: ActionsConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg, ActionsConfig::default());
        assert_eq!(cfg.compiler.unit_name_prefix, "ActionUnit");
        assert!(cfg.host.enable_openapi);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let res: Result<CompilerConfig, _> =
            serde_json::from_value(serde_json::json!({ "fail_fats": true }));
        assert!(res.is_err());
    }

    #[test]
    fn partial_override() {
        let cfg: ActionsConfig = serde_json::from_value(serde_json::json!({
            "compiler": { "fail_fast": true },
            "host": { "openapi_path": "/docs/openapi.json" }
        }))
        .unwrap();
        assert!(cfg.compiler.fail_fast);
        assert!(cfg.compiler.log_plans);
        assert_eq!(cfg.host.openapi_path, "/docs/openapi.json");
        assert_eq!(cfg.host.body_limit_bytes, 2 * 1024 * 1024);
    }
}
