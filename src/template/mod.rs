//! # Template Renderer
//!
//! Renders the configuration file of a component from a Jinja template and a
//! desired-state context. The rendered bytes become the single payload of the
//! component's ConfigMap.
//!
//! The template for component `<uid>` is looked up in the configuration store
//! under `<uid>-template-content` (populated and hot-reloaded from
//! `<uid>-template-path`); when absent, the built-in default is used.
//!
//! Rendering is reproducible: the same template, context and helpers always
//! produce the same bytes. Any template failure is a configuration bug and is
//! reported as non-retryable.

mod filters;

use crate::config::{ConfigStore, SharedConfigStore};
use crate::constants::keys;
use crate::controller::ControllerUid;
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use thiserror::Error;

/// Template failures; all of them are non-retryable
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no template configured for {uid}")]
    Missing { uid: ControllerUid },

    #[error("failed to render {uid} template: {source}")]
    Render {
        uid: ControllerUid,
        #[source]
        source: minijinja::Error,
    },
}

/// Component-specific helper functions registered by a planner
pub type TemplateFunctions = Vec<(&'static str, Value)>;

/// Where the template text of a render came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    Configured,
    BuiltIn,
}

/// Renders component templates looked up from the configuration store
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    store: SharedConfigStore,
}

impl TemplateRenderer {
    pub fn new(store: SharedConfigStore) -> Self {
        Self { store }
    }

    /// Current template text for `uid`
    pub fn template(&self, uid: ControllerUid) -> Result<(String, TemplateSource), TemplateError> {
        lookup_template(&self.store, uid)
    }

    /// Render the template of `uid` against `context`
    ///
    /// `functions` are exposed as global callables next to the common
    /// filters.
    pub fn render<S: Serialize>(
        &self,
        uid: ControllerUid,
        context: &S,
        functions: TemplateFunctions,
    ) -> Result<String, TemplateError> {
        let (template, source) = self.template(uid)?;
        tracing::trace!(controller = %uid, ?source, "rendering template");
        render_str(uid, &template, context, functions)
    }
}

fn lookup_template(
    store: &ConfigStore,
    uid: ControllerUid,
) -> Result<(String, TemplateSource), TemplateError> {
    if let Ok(content) = store.get_string(&keys::template_content(uid.as_str())) {
        return Ok((content, TemplateSource::Configured));
    }
    builtin_template(uid)
        .map(|content| (content.to_string(), TemplateSource::BuiltIn))
        .ok_or(TemplateError::Missing { uid })
}

/// Built-in default template, if the component has a config file
pub fn builtin_template(uid: ControllerUid) -> Option<&'static str> {
    match uid {
        ControllerUid::ChartMuseum => Some(include_str!("defaults/chartmuseum.yaml.tmpl")),
        ControllerUid::Core => Some(include_str!("defaults/core.conf.tmpl")),
        ControllerUid::JobService => Some(include_str!("defaults/jobservice.yaml.tmpl")),
        ControllerUid::NotaryServer => Some(include_str!("defaults/notaryserver.json.tmpl")),
        ControllerUid::NotarySigner => Some(include_str!("defaults/notarysigner.json.tmpl")),
        ControllerUid::Portal => Some(include_str!("defaults/portal.conf.tmpl")),
        ControllerUid::Registry => Some(include_str!("defaults/registry.yml.tmpl")),
        ControllerUid::RegistryController => Some(include_str!("defaults/registryctl.yml.tmpl")),
        ControllerUid::Trivy => None,
    }
}

fn environment(functions: TemplateFunctions) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);

    env.add_filter("b64enc", filters::b64enc);
    env.add_filter("b64dec", filters::b64dec);
    env.add_filter("quote", filters::quote);
    env.add_filter("trim_suffix", filters::trim_suffix);
    env.add_filter("to_yaml", filters::to_yaml);
    env.add_filter("to_json", filters::to_json);
    env.add_function("path_join", filters::path_join);

    for (name, function) in functions {
        env.add_global(name, function);
    }
    env
}

fn render_str<S: Serialize>(
    uid: ControllerUid,
    template: &str,
    context: &S,
    functions: TemplateFunctions,
) -> Result<String, TemplateError> {
    environment(functions)
        .render_str(template, Value::from_serialize(context))
        .map_err(|source| TemplateError::Render { uid, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, InMemoryProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn renderer_with(items: Vec<(String, String)>) -> TemplateRenderer {
        let store = Arc::new(ConfigStore::new());
        store.register(0, Arc::new(InMemoryProvider::with_items("test", items)));
        TemplateRenderer::new(store)
    }

    #[test]
    fn test_configured_template_overrides_builtin() {
        let renderer = renderer_with(vec![(
            "portal-template-content".to_string(),
            "listen {{ port }};".to_string(),
        )]);
        let (_, source) = renderer.template(ControllerUid::Portal).unwrap();
        assert_eq!(source, TemplateSource::Configured);
        let out = renderer
            .render(ControllerUid::Portal, &json!({ "port": 8080 }), Vec::new())
            .unwrap();
        assert_eq!(out, "listen 8080;");
    }

    #[test]
    fn test_builtin_template_is_used_when_unconfigured() {
        let renderer = renderer_with(Vec::new());
        let (_, source) = renderer.template(ControllerUid::Registry).unwrap();
        assert_eq!(source, TemplateSource::BuiltIn);
        assert!(matches!(
            renderer.template(ControllerUid::Trivy),
            Err(TemplateError::Missing { .. })
        ));
    }

    #[test]
    fn test_component_functions_and_filters() {
        let renderer = renderer_with(vec![(
            "core-template-content".to_string(),
            "{{ secret_mount() }}|{{ url | trim_suffix('/') }}|{{ 'x' | b64enc }}|{{ path_join('/etc', 'core') }}".to_string(),
        )]);
        let functions: TemplateFunctions = vec![(
            "secret_mount",
            Value::from_function(|| "/etc/core/token".to_string()),
        )];
        let out = renderer
            .render(ControllerUid::Core, &json!({ "url": "http://core/" }), functions)
            .unwrap();
        assert_eq!(out, "/etc/core/token|http://core|eA==|/etc/core");
    }

    #[test]
    fn test_render_is_reproducible() {
        let renderer = renderer_with(Vec::new());
        let context = json!({
            "name": "cm1",
            "spec": { "chart": { "url": "http://the.chartserver.url" } }
        });
        let first = renderer
            .render(ControllerUid::ChartMuseum, &context, Vec::new())
            .unwrap();
        let second = renderer
            .render(ControllerUid::ChartMuseum, &context, Vec::new())
            .unwrap();
        assert_eq!(first, second);
        assert!(first.contains("http://the.chartserver.url"));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let renderer = renderer_with(vec![(
            "portal-template-content".to_string(),
            "{% if %}".to_string(),
        )]);
        let err = renderer
            .render(ControllerUid::Portal, &json!({}), Vec::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Render { uid: ControllerUid::Portal, .. }));
    }
}
