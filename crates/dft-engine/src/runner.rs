//! Single-pipeline execution: one plan entry, one walk of the step DAG.
//!
//! Steps run sequentially in topological order. Each step's config is
//! rendered against the entry's context at the moment its component is
//! instantiated; packets flow through an in-memory map owned by the
//! invocation and dropped at its end.

use std::collections::BTreeMap;

use dft_types::{DataPacket, Pipeline, Step, StepKind};

use crate::component::{ComponentFactory, Vars};
use crate::dag::Graph;
use crate::error::{EngineError, Result};
use crate::template::{Renderer, VarContext};

/// Build the intra-pipeline step graph.
#[must_use]
pub fn step_graph(pipeline: &Pipeline) -> Graph {
    let mut graph = Graph::new();
    for step in &pipeline.steps {
        graph.add_node(&step.id);
        for dep in &step.depends_on {
            graph.add_dependency(&step.id, dep);
        }
    }
    graph
}

/// Execute one plan entry of one pipeline.
///
/// # Errors
///
/// Propagates the first failing step as [`EngineError::Component`]
/// (wrapping the component's own error with pipeline/step context), or a
/// graph/template/dependency error from the walk itself.
pub fn run_entry(
    pipeline: &Pipeline,
    ctx: &VarContext,
    factory: &ComponentFactory<'_>,
) -> Result<()> {
    let order = step_graph(pipeline).topological_order()?;
    let position: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let renderer = Renderer::new(ctx);
    let vars: Vars = ctx.flatten();
    let mut packets: BTreeMap<String, DataPacket> = BTreeMap::new();

    for id in &order {
        let step = pipeline.step(id).ok_or_else(|| {
            EngineError::Dependency(format!(
                "step '{}' in pipeline '{}' depends on unknown step '{id}'",
                dependent_of(pipeline, id),
                pipeline.name
            ))
        })?;

        tracing::debug!(
            pipeline = pipeline.name,
            step = step.id,
            kind = %step.kind,
            component = step.component_type,
            "Executing step"
        );

        match step.kind {
            StepKind::Source => {
                let mut source = factory.build_source(&pipeline.name, step, &renderer)?;
                let packet = source
                    .extract(&vars)
                    .map_err(|cause| component_error(pipeline, step, cause))?;
                packets.insert(step.id.clone(), packet);
            }
            StepKind::Processor => {
                let input = select_input(pipeline, step, &packets, &position)?;
                let mut processor = factory.build_processor(&pipeline.name, step, &renderer)?;
                let packet = processor
                    .process(input, &vars)
                    .map_err(|cause| component_error(pipeline, step, cause))?;
                packets.insert(step.id.clone(), packet);
            }
            StepKind::Endpoint => {
                let input = select_input(pipeline, step, &packets, &position)?;
                let mut endpoint = factory.build_endpoint(&pipeline.name, step, &renderer)?;
                endpoint
                    .load(input, &vars)
                    .map_err(|cause| component_error(pipeline, step, cause))?;
            }
        }
    }
    Ok(())
}

/// Pick the single input packet for a processor or endpoint: the
/// packet-producing upstream latest in topological order, ties broken by
/// `depends_on` list position (first listed wins).
fn select_input(
    pipeline: &Pipeline,
    step: &Step,
    packets: &BTreeMap<String, DataPacket>,
    position: &BTreeMap<&str, usize>,
) -> Result<DataPacket> {
    let mut best: Option<(usize, &DataPacket)> = None;
    for dep in &step.depends_on {
        let Some(packet) = packets.get(dep) else {
            // Endpoints produce no packets; such upstreams order only.
            continue;
        };
        let pos = position.get(dep.as_str()).copied().unwrap_or(0);
        if best.map_or(true, |(best_pos, _)| pos > best_pos) {
            best = Some((pos, packet));
        }
    }
    best.map(|(_, packet)| packet.clone()).ok_or_else(|| {
        EngineError::Dependency(format!(
            "step '{}.{}' has no upstream packet",
            pipeline.name, step.id
        ))
    })
}

fn component_error(pipeline: &Pipeline, step: &Step, cause: anyhow::Error) -> EngineError {
    EngineError::Component {
        pipeline: pipeline.name.clone(),
        step: step.id.clone(),
        cause,
    }
}

fn dependent_of<'a>(pipeline: &'a Pipeline, dep: &str) -> &'a str {
    pipeline
        .steps
        .iter()
        .find(|s| s.depends_on.iter().any(|d| d == dep))
        .map_or("?", |s| s.id.as_str())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use dft_types::time::parse_timestamp;
    use dft_types::Table;
    use serde_json::Value;

    use crate::component::{ComponentRegistry, ComponentSpec, Endpoint, Processor, Source, Vars};

    use super::*;

    struct RowsSource {
        values: Vec<Value>,
    }

    impl Source for RowsSource {
        fn extract(&mut self, _vars: &Vars) -> anyhow::Result<DataPacket> {
            let rows = self.values.iter().map(|v| vec![v.clone()]).collect();
            Ok(DataPacket::new(Table::from_rows(vec!["v".into()], rows).unwrap()))
        }

        fn test_connection(&self) -> bool {
            true
        }
    }

    struct TagProcessor {
        tag: String,
    }

    impl Processor for TagProcessor {
        fn process(&mut self, packet: DataPacket, _vars: &Vars) -> anyhow::Result<DataPacket> {
            Ok(packet.with_metadata("tag", self.tag.clone()))
        }
    }

    struct CaptureEndpoint {
        sink: Arc<Mutex<Vec<DataPacket>>>,
    }

    impl Endpoint for CaptureEndpoint {
        fn load(&mut self, packet: DataPacket, _vars: &Vars) -> anyhow::Result<()> {
            self.sink.lock().unwrap().push(packet);
            Ok(())
        }
    }

    fn registry(sink: &Arc<Mutex<Vec<DataPacket>>>) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register_source("rows", |spec: &ComponentSpec| {
            let values = spec.config["values"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            Ok(Box::new(RowsSource { values }))
        });
        registry.register_processor("tag", |spec: &ComponentSpec| {
            Ok(Box::new(TagProcessor {
                tag: spec.require_str("tag")?,
            }))
        });
        registry.register_processor("boom", |_spec: &ComponentSpec| {
            Ok(Box::new(BoomProcessor))
        });
        let sink = sink.clone();
        registry.register_endpoint("capture", move |_spec: &ComponentSpec| {
            Ok(Box::new(CaptureEndpoint { sink: sink.clone() }))
        });
        registry
    }

    struct BoomProcessor;

    impl Processor for BoomProcessor {
        fn process(&mut self, _packet: DataPacket, _vars: &Vars) -> anyhow::Result<DataPacket> {
            anyhow::bail!("synthetic failure")
        }
    }

    fn pipeline(yaml: &str) -> Pipeline {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn run(yaml: &str) -> (Result<()>, Vec<DataPacket>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&sink);
        let connections = BTreeMap::new();
        let factory = ComponentFactory::new(&registry, &connections);
        let ctx = VarContext::new(parse_timestamp("2024-01-01T00:00:00").unwrap());
        let result = run_entry(&pipeline(yaml), &ctx, &factory);
        let captured = sink.lock().unwrap().clone();
        (result, captured)
    }

    #[test]
    fn test_linear_chain_wires_packets() {
        let (result, captured) = run(
            r#"
pipeline_name: p
steps:
  - id: extract
    type: source
    source_type: rows
    config:
      values: [1, 2, 3]
  - id: mark
    type: processor
    processor_type: tag
    depends_on: [extract]
    config:
      tag: seen
  - id: publish
    type: endpoint
    endpoint_type: capture
    depends_on: [mark]
"#,
        );
        result.unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].data.num_rows(), 3);
        assert_eq!(captured[0].get_metadata("tag"), Some("seen"));
    }

    #[test]
    fn test_multi_upstream_selects_latest_in_topo_order() {
        // `late` depends on `early`, so it is later in topological order;
        // the endpoint listing both must receive late's packet.
        let (result, captured) = run(
            r#"
pipeline_name: p
steps:
  - id: early
    type: source
    source_type: rows
    config:
      values: [1]
  - id: late
    type: processor
    processor_type: tag
    depends_on: [early]
    config:
      tag: late-packet
  - id: publish
    type: endpoint
    endpoint_type: capture
    depends_on: [early, late]
"#,
        );
        result.unwrap();
        assert_eq!(captured[0].get_metadata("tag"), Some("late-packet"));
    }

    #[test]
    fn test_failure_carries_pipeline_and_step() {
        let (result, captured) = run(
            r#"
pipeline_name: p
steps:
  - id: extract
    type: source
    source_type: rows
    config:
      values: [1]
  - id: explode
    type: processor
    processor_type: boom
    depends_on: [extract]
  - id: publish
    type: endpoint
    endpoint_type: capture
    depends_on: [explode]
"#,
        );
        let err = result.unwrap_err();
        match err {
            EngineError::Component {
                pipeline,
                step,
                cause,
            } => {
                assert_eq!(pipeline, "p");
                assert_eq!(step, "explode");
                assert!(cause.to_string().contains("synthetic failure"));
            }
            other => panic!("expected component error, got {other}"),
        }
        // The endpoint downstream of the failure never ran.
        assert!(captured.is_empty());
    }

    #[test]
    fn test_step_cycle_fails() {
        let (result, _) = run(
            r#"
pipeline_name: p
steps:
  - id: a
    type: source
    source_type: rows
    depends_on: [b]
  - id: b
    type: processor
    processor_type: tag
    depends_on: [a]
    config:
      tag: t
"#,
        );
        assert!(matches!(result.unwrap_err(), EngineError::Cycle { .. }));
    }

    #[test]
    fn test_processor_without_input_fails() {
        let (result, _) = run(
            r#"
pipeline_name: p
steps:
  - id: lonely
    type: processor
    processor_type: tag
    config:
      tag: t
"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("no upstream packet"), "got: {err}");
    }

    #[test]
    fn test_fan_out_clones_packet_per_consumer() {
        let (result, captured) = run(
            r#"
pipeline_name: p
steps:
  - id: extract
    type: source
    source_type: rows
    config:
      values: [7]
  - id: sink_a
    type: endpoint
    endpoint_type: capture
    depends_on: [extract]
  - id: sink_b
    type: endpoint
    endpoint_type: capture
    depends_on: [extract]
"#,
        );
        result.unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].data.rows(), captured[1].data.rows());
    }

    #[test]
    fn test_rendered_config_reaches_component() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&sink);
        let connections = BTreeMap::new();
        let factory = ComponentFactory::new(&registry, &connections);
        let mut ctx = VarContext::new(parse_timestamp("2024-01-01T00:00:00").unwrap());
        ctx.push_layer(
            crate::template::LAYER_PIPELINE,
            BTreeMap::from([(
                "label".to_string(),
                crate::template::TemplateValue::Str("rendered-label".into()),
            )]),
        );

        let p = pipeline(
            r#"
pipeline_name: p
steps:
  - id: extract
    type: source
    source_type: rows
    config:
      values: [1]
  - id: mark
    type: processor
    processor_type: tag
    depends_on: [extract]
    config:
      tag: "{{ var('label') }}"
  - id: publish
    type: endpoint
    endpoint_type: capture
    depends_on: [mark]
"#,
        );
        run_entry(&p, &ctx, &factory).unwrap();
        let captured = sink.lock().unwrap();
        assert_eq!(captured[0].get_metadata("tag"), Some("rendered-label"));
    }
}
