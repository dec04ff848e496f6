//! Component instantiation.
//!
//! The factory renders the string leaves of a step's config and of its
//! referenced connection at the moment of instantiation, merges the
//! rendered connection under the reserved `connection` sub-key, and hands
//! the result to the registered constructor. Instances are never cached
//! across invocations.

use std::collections::BTreeMap;

use dft_types::{ConnectionConfig, Step};

use crate::error::{EngineError, Result};
use crate::template::Renderer;

use super::registry::ComponentRegistry;
use super::{ComponentSpec, Endpoint, Processor, Source};

/// Reserved config sub-key the rendered connection fields are merged
/// under.
pub const CONNECTION_KEY: &str = "connection";

/// Builds component instances for one pipeline invocation.
pub struct ComponentFactory<'a> {
    registry: &'a ComponentRegistry,
    connections: &'a BTreeMap<String, ConnectionConfig>,
}

impl<'a> ComponentFactory<'a> {
    #[must_use]
    pub fn new(
        registry: &'a ComponentRegistry,
        connections: &'a BTreeMap<String, ConnectionConfig>,
    ) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// Instantiate a source step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Dependency`] for unknown tags or unresolved
    /// connections, [`EngineError::Template`] for render failures, and
    /// [`EngineError::Component`] when the constructor itself fails.
    pub fn build_source(
        &self,
        pipeline: &str,
        step: &Step,
        renderer: &Renderer<'_>,
    ) -> Result<Box<dyn Source>> {
        let ctor = self.registry.source(&step.component_type).ok_or_else(|| {
            unknown_component(pipeline, step)
        })?;
        let spec = self.rendered_spec(pipeline, step, renderer)?;
        ctor(&spec).map_err(|cause| EngineError::Component {
            pipeline: pipeline.to_string(),
            step: step.id.clone(),
            cause,
        })
    }

    /// Instantiate a processor step. Errors as [`Self::build_source`].
    ///
    /// # Errors
    ///
    /// See [`Self::build_source`].
    pub fn build_processor(
        &self,
        pipeline: &str,
        step: &Step,
        renderer: &Renderer<'_>,
    ) -> Result<Box<dyn Processor>> {
        let ctor = self
            .registry
            .processor(&step.component_type)
            .ok_or_else(|| unknown_component(pipeline, step))?;
        let spec = self.rendered_spec(pipeline, step, renderer)?;
        ctor(&spec).map_err(|cause| EngineError::Component {
            pipeline: pipeline.to_string(),
            step: step.id.clone(),
            cause,
        })
    }

    /// Instantiate an endpoint step. Errors as [`Self::build_source`].
    ///
    /// # Errors
    ///
    /// See [`Self::build_source`].
    pub fn build_endpoint(
        &self,
        pipeline: &str,
        step: &Step,
        renderer: &Renderer<'_>,
    ) -> Result<Box<dyn Endpoint>> {
        let ctor = self
            .registry
            .endpoint(&step.component_type)
            .ok_or_else(|| unknown_component(pipeline, step))?;
        let spec = self.rendered_spec(pipeline, step, renderer)?;
        ctor(&spec).map_err(|cause| EngineError::Component {
            pipeline: pipeline.to_string(),
            step: step.id.clone(),
            cause,
        })
    }

    fn rendered_spec(
        &self,
        pipeline: &str,
        step: &Step,
        renderer: &Renderer<'_>,
    ) -> Result<ComponentSpec> {
        let mut config = serde_yaml::Mapping::new();
        for (key, value) in &step.config {
            config.insert(
                serde_yaml::Value::from(key.clone()),
                renderer.render_yaml(value)?,
            );
        }

        if let Some(connection_id) = &step.connection {
            let connection = self.connections.get(connection_id).ok_or_else(|| {
                EngineError::Dependency(format!(
                    "step '{pipeline}.{}' references unknown connection '{connection_id}'",
                    step.id
                ))
            })?;
            let mut merged = serde_yaml::Mapping::new();
            merged.insert(
                serde_yaml::Value::from("type"),
                serde_yaml::Value::from(connection.kind.clone()),
            );
            for (key, value) in &connection.fields {
                merged.insert(
                    serde_yaml::Value::from(key.clone()),
                    renderer.render_yaml(value)?,
                );
            }
            config.insert(
                serde_yaml::Value::from(CONNECTION_KEY),
                serde_yaml::Value::Mapping(merged),
            );
        }

        let config = serde_json::to_value(serde_yaml::Value::Mapping(config)).map_err(|e| {
            EngineError::Dependency(format!(
                "config of step '{pipeline}.{}' is not representable: {e}",
                step.id
            ))
        })?;

        Ok(ComponentSpec {
            pipeline: pipeline.to_string(),
            step_id: step.id.clone(),
            config,
        })
    }
}

fn unknown_component(pipeline: &str, step: &Step) -> EngineError {
    EngineError::Dependency(format!(
        "step '{pipeline}.{}' uses unknown {} '{}'",
        step.id,
        step.kind.type_key(),
        step.component_type
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use dft_types::time::parse_timestamp;

    use crate::template::{TemplateValue, VarContext, LAYER_PROJECT};

    use super::*;

    fn step(yaml: &str) -> Step {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn ctx() -> VarContext {
        let mut ctx = VarContext::new(parse_timestamp("2024-06-01T00:00:00").unwrap());
        ctx.push_layer(
            LAYER_PROJECT,
            BTreeMap::from([(
                "data_dir".to_string(),
                TemplateValue::Str("/tmp/data".into()),
            )]),
        );
        ctx
    }

    fn connections() -> BTreeMap<String, ConnectionConfig> {
        serde_yaml::from_str(
            r#"
warehouse:
  type: postgresql
  host: "{{ var('data_dir') }}"
  port: 5432
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_component_type_fails() {
        let registry = ComponentRegistry::with_builtins();
        let connections = BTreeMap::new();
        let factory = ComponentFactory::new(&registry, &connections);
        let ctx = ctx();
        let renderer = Renderer::new(&ctx);

        let step = step("id: s\ntype: source\nsource_type: mystery\n");
        let err = factory.build_source("p", &step, &renderer).unwrap_err();
        assert!(matches!(err, EngineError::Dependency(_)));
        assert!(err.to_string().contains("mystery"));
        assert!(err.to_string().contains("source_type"));
    }

    #[test]
    fn test_config_rendered_and_connection_merged() {
        let mut registry = ComponentRegistry::new();
        registry.register_source("probe", |spec| {
            assert_eq!(
                spec.config["file_path"],
                serde_json::Value::from("/tmp/data/in.csv")
            );
            assert_eq!(
                spec.config["connection"]["type"],
                serde_json::Value::from("postgresql")
            );
            assert_eq!(
                spec.config["connection"]["host"],
                serde_json::Value::from("/tmp/data")
            );
            assert_eq!(spec.config["connection"]["port"], serde_json::Value::from(5432));
            anyhow::bail!("stop here")
        });
        let connections = connections();
        let factory = ComponentFactory::new(&registry, &connections);
        let ctx = ctx();
        let renderer = Renderer::new(&ctx);

        let step = step(
            r#"
id: s
type: source
source_type: probe
connection: warehouse
config:
  file_path: "{{ var('data_dir') }}/in.csv"
"#,
        );
        // The probe constructor runs the assertions, then fails on purpose;
        // the factory must wrap that failure with step context.
        let err = factory.build_source("p", &step, &renderer).unwrap_err();
        match err {
            EngineError::Component {
                pipeline, step, ..
            } => {
                assert_eq!(pipeline, "p");
                assert_eq!(step, "s");
            }
            other => panic!("expected component error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_connection_fails() {
        let registry = ComponentRegistry::with_builtins();
        let connections = BTreeMap::new();
        let factory = ComponentFactory::new(&registry, &connections);
        let ctx = ctx();
        let renderer = Renderer::new(&ctx);

        let step = step(
            "id: s\ntype: endpoint\nendpoint_type: csv\nconnection: nowhere\nconfig:\n  file_path: out.csv\n",
        );
        let err = factory.build_endpoint("p", &step, &renderer).unwrap_err();
        assert!(err.to_string().contains("unknown connection 'nowhere'"));
    }
}
