//! Payload transforms applied to inbound state messages.
//!
//! A [`ValueTransform`] is an opaque `&str -> String` function. The
//! [`ValueTemplate`] implementation renders a template with the raw payload
//! bound to `value` and, when the payload is JSON, the decoded document bound
//! to `value_json`.

use std::fmt;
use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior, Value, context};
use thiserror::Error;

const TEMPLATE_NAME: &str = "value_template";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Payload rejected: {0}")]
pub struct TransformError(pub String);

type TransformFn = dyn Fn(&str) -> Result<String, TransformError> + Send + Sync;

#[derive(Clone)]
pub struct ValueTransform(Arc<TransformFn>);

impl ValueTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String, TransformError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, payload: &str) -> Result<String, TransformError> {
        (self.0)(payload)
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueTransform")
    }
}

/// A compiled value template.
#[derive(Clone)]
pub struct ValueTemplate {
    source: String,
    env: Arc<Environment<'static>>,
}

impl ValueTemplate {
    /// Compiles `source`. Syntax errors are reported here, not at render time.
    pub fn new(source: impl Into<String>) -> Result<Self, minijinja::Error> {
        let source = source.into();
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template_owned(TEMPLATE_NAME, source.clone())?;
        Ok(Self {
            source,
            env: Arc::new(env),
        })
    }

    pub fn render(&self, payload: &str) -> Result<String, TransformError> {
        let value_json = serde_json::from_str::<serde_json::Value>(payload)
            .map(|json| Value::from_serialize(&json))
            .unwrap_or(Value::UNDEFINED);
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| TransformError(e.to_string()))?;
        let rendered = template
            .render(context! {
                value => payload,
                value_json => value_json,
            })
            .map_err(|e| TransformError(e.to_string()))?;
        Ok(rendered.trim().to_string())
    }
}

impl fmt::Debug for ValueTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTemplate")
            .field("source", &self.source)
            .finish()
    }
}

impl From<ValueTemplate> for ValueTransform {
    fn from(template: ValueTemplate) -> Self {
        ValueTransform::new(move |payload| template.render(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_value() {
        let template = ValueTemplate::new("{{ value | upper }}").unwrap();
        assert_eq!(template.render("on").unwrap(), "ON");
    }

    #[test]
    fn test_render_json_value() {
        let template = ValueTemplate::new("{{ value_json.state }}").unwrap();
        assert_eq!(
            template.render(r#"{"state":"ON","power":12.5}"#).unwrap(),
            "ON"
        );
    }

    #[test]
    fn test_render_trims_output() {
        let template = ValueTemplate::new("  {{ value }}\n").unwrap();
        assert_eq!(template.render("OFF").unwrap(), "OFF");
    }

    #[test]
    fn test_json_access_on_plain_payload_fails() {
        let template = ValueTemplate::new("{{ value_json.state }}").unwrap();
        assert!(template.render("not json").is_err());
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        assert!(ValueTemplate::new("{{ value ").is_err());
    }

    #[test]
    fn test_closure_transform() {
        let transform = ValueTransform::new(|payload| {
            payload
                .strip_prefix("state=")
                .map(str::to_string)
                .ok_or_else(|| TransformError(format!("unexpected payload {payload}")))
        });
        assert_eq!(transform.apply("state=ON").unwrap(), "ON");
        assert!(transform.apply("ON").is_err());
    }

    #[test]
    fn test_template_into_transform() {
        let transform = ValueTransform::from(ValueTemplate::new("{{ value_json.v }}").unwrap());
        assert_eq!(transform.apply(r#"{"v":"OFF"}"#).unwrap(), "OFF");
    }
}
