//! Template rendering over a layered variable context.
//!
//! Expression spans are delimited `{{ … }}` inside otherwise literal
//! strings. Rendering is pure and idempotent: a value without markers is
//! returned verbatim, and rendered output contains no markers.

mod context;
mod eval;
mod parser;
mod value;

use std::sync::LazyLock;

use regex::Regex;

pub use context::{
    VarContext, LAYER_BATCH, LAYER_BUILTIN, LAYER_CLI, LAYER_PIPELINE, LAYER_PROJECT,
};
pub use value::TemplateValue;

static EXPR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid expression span regex"));

/// A template evaluation failure, carrying the offending expression.
#[derive(Debug, thiserror::Error)]
#[error("template error in '{{{{ {expression} }}}}': {message}")]
pub struct TemplateError {
    pub expression: String,
    pub message: String,
}

/// Stateless renderer borrowing one context snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    ctx: &'a VarContext,
}

impl<'a> Renderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a VarContext) -> Self {
        Self { ctx }
    }

    /// Render one string: evaluate each `{{ … }}` span and splice the
    /// results into the surrounding literal text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for unknown variables or functions, bad
    /// expressions, and missing environment variables without a default.
    pub fn render(&self, input: &str) -> Result<String, TemplateError> {
        if !input.contains("{{") {
            return Ok(input.to_string());
        }

        let mut output = String::with_capacity(input.len());
        let mut last_end = 0;
        for caps in EXPR_RE.captures_iter(input) {
            let span = caps.get(0).expect("whole match");
            let expression = caps[1].trim().to_string();
            output.push_str(&input[last_end..span.start()]);

            let expr = parser::parse(&expression).map_err(|message| TemplateError {
                expression: expression.clone(),
                message,
            })?;
            let value = eval::eval(&expr, self.ctx).map_err(|message| TemplateError {
                expression: expression.clone(),
                message,
            })?;
            output.push_str(&value.to_string());
            last_end = span.end();
        }
        output.push_str(&input[last_end..]);
        Ok(output)
    }

    /// Render the string leaves of a YAML value; everything else passes
    /// through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when any leaf fails to render.
    pub fn render_yaml(
        &self,
        value: &serde_yaml::Value,
    ) -> Result<serde_yaml::Value, TemplateError> {
        match value {
            serde_yaml::Value::String(s) => Ok(serde_yaml::Value::String(self.render(s)?)),
            serde_yaml::Value::Sequence(seq) => Ok(serde_yaml::Value::Sequence(
                seq.iter()
                    .map(|v| self.render_yaml(v))
                    .collect::<Result<_, _>>()?,
            )),
            serde_yaml::Value::Mapping(map) => {
                let mut rendered = serde_yaml::Mapping::new();
                for (k, v) in map {
                    rendered.insert(k.clone(), self.render_yaml(v)?);
                }
                Ok(serde_yaml::Value::Mapping(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use dft_types::time::parse_timestamp;

    use super::*;

    fn base_ctx() -> VarContext {
        let mut ctx = VarContext::new(parse_timestamp("2024-06-15T10:30:00").unwrap());
        ctx.push_layer(
            LAYER_PROJECT,
            BTreeMap::from([
                ("schema".to_string(), TemplateValue::Str("raw".into())),
                ("retries".to_string(), TemplateValue::Int(3)),
            ]),
        );
        ctx
    }

    #[test]
    fn test_literal_passthrough() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        assert_eq!(renderer.render("plain text").unwrap(), "plain text");
    }

    #[test]
    fn test_var_reference() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        assert_eq!(
            renderer.render(r#"{{ var("schema") }}.orders"#).unwrap(),
            "raw.orders"
        );
    }

    #[test]
    fn test_multiple_spans() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        assert_eq!(
            renderer
                .render(r#"{{ var("schema") }}.{{ var("retries") }}"#)
                .unwrap(),
            "raw.3"
        );
    }

    #[test]
    fn test_unknown_var_reports_searched_keys() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        let err = renderer.render(r#"{{ var("missing") }}"#).unwrap_err();
        assert!(err.message.contains("unknown variable 'missing'"));
        assert!(err.message.contains("project:schema"), "got: {}", err.message);
        assert_eq!(err.expression, r#"var("missing")"#);
    }

    #[test]
    fn test_date_helpers_use_frozen_now() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        assert_eq!(renderer.render("{{ now() }}").unwrap(), "2024-06-15T10:30:00");
        assert_eq!(renderer.render("{{ today() }}").unwrap(), "2024-06-15T00:00:00");
        assert_eq!(
            renderer.render("{{ yesterday() }}").unwrap(),
            "2024-06-14T00:00:00"
        );
        assert_eq!(
            renderer.render("{{ days_ago(7) }}").unwrap(),
            "2024-06-08T00:00:00"
        );
    }

    #[test]
    fn test_timestamp_arithmetic_and_strftime() {
        let mut ctx = base_ctx();
        ctx.push_layer(
            LAYER_BATCH,
            BTreeMap::from([(
                "batch_start".to_string(),
                TemplateValue::Timestamp(parse_timestamp("2024-01-02T00:00:00").unwrap()),
            )]),
        );
        let renderer = Renderer::new(&ctx);
        assert_eq!(
            renderer
                .render("{{ (batch_start) - timedelta(hours=2) }}")
                .unwrap(),
            "2024-01-01T22:00:00"
        );
        assert_eq!(
            renderer
                .render(r#"{{ batch_start.strftime("%Y/%m/%d") }}"#)
                .unwrap(),
            "2024/01/02"
        );
        assert_eq!(
            renderer.render("{{ batch_start.isoformat() }}").unwrap(),
            "2024-01-02T00:00:00"
        );
    }

    #[test]
    fn test_env_var_with_default() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        std::env::remove_var("DFT_TEST_UNSET_VAR");
        assert_eq!(
            renderer
                .render(r#"{{ env_var("DFT_TEST_UNSET_VAR", "fallback") }}"#)
                .unwrap(),
            "fallback"
        );
        let err = renderer
            .render(r#"{{ env_var("DFT_TEST_UNSET_VAR") }}"#)
            .unwrap_err();
        assert!(err.message.contains("not set"));

        std::env::set_var("DFT_TEST_SET_VAR", "present");
        assert_eq!(
            renderer.render(r#"{{ env_var("DFT_TEST_SET_VAR") }}"#).unwrap(),
            "present"
        );
        std::env::remove_var("DFT_TEST_SET_VAR");
    }

    #[test]
    fn test_state_get() {
        let mut ctx = base_ctx();
        ctx.set_state(dft_types::StateMap::from([(
            "last_processed_date".to_string(),
            serde_json::Value::from("2024-06-14"),
        )]));
        let renderer = Renderer::new(&ctx);
        assert_eq!(
            renderer
                .render(r#"{{ state.get("last_processed_date") }}"#)
                .unwrap(),
            "2024-06-14"
        );
        assert_eq!(
            renderer
                .render(r#"{{ state.get("missing", "2020-01-01") }}"#)
                .unwrap(),
            "2020-01-01"
        );
        let err = renderer.render(r#"{{ state.get("missing") }}"#).unwrap_err();
        assert!(err.message.contains("no key 'missing'"));
    }

    #[test]
    fn test_render_is_idempotent_and_pure() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        let input = r#"select * from {{ var("schema") }}.t where d < '{{ today() }}'"#;
        let once = renderer.render(input).unwrap();
        let twice = renderer.render(&once).unwrap();
        assert_eq!(once, twice);
        // Same input renders identically afterwards: no context mutation.
        assert_eq!(renderer.render(input).unwrap(), once);
    }

    #[test]
    fn test_render_yaml_only_touches_strings() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        let value: serde_yaml::Value = serde_yaml::from_str(
            r#"
table: "{{ var(\"schema\") }}.orders"
count: 7
nested:
  - "{{ var(\"retries\") }}"
  - true
"#,
        )
        .unwrap();
        let rendered = renderer.render_yaml(&value).unwrap();
        assert_eq!(rendered["table"], serde_yaml::Value::from("raw.orders"));
        assert_eq!(rendered["count"], serde_yaml::Value::from(7));
        assert_eq!(rendered["nested"][0], serde_yaml::Value::from("3"));
        assert_eq!(rendered["nested"][1], serde_yaml::Value::from(true));
    }

    #[test]
    fn test_malformed_expression_fails() {
        let ctx = base_ctx();
        let renderer = Renderer::new(&ctx);
        let err = renderer.render("{{ var( }}").unwrap_err();
        assert_eq!(err.expression, "var(");
        let err = renderer.render("{{ frobnicate() }}").unwrap_err();
        assert!(err.message.contains("unknown function"));
    }
}
