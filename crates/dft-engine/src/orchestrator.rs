//! Top-level control loop.
//!
//! Validate, select, order, run. Each selected pipeline runs its plan
//! entries sequentially; a failure fails that pipeline, skips its selected
//! dependents, and leaves independent pipelines running. State is written
//! after successful entries only; terminal status keys are recorded for
//! every outcome.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use dft_state::StateStore;
use dft_types::state::{
    LAST_PROCESSED_DATE, LAST_PROCESSED_TIMESTAMP, LAST_RUN_AT, LAST_STATUS,
};
use dft_types::time::{format_date, format_timestamp, parse_timestamp};
use dft_types::{BatchWindow, Pipeline, PipelineStatus, StateMap};

use crate::component::{ComponentFactory, ComponentRegistry};
use crate::dag::Graph;
use crate::error::{EngineError, Result};
use crate::project::Project;
use crate::runner;
use crate::selector;
use crate::strategy::{self, ExecutionPlan};
use crate::template::{
    TemplateValue, VarContext, LAYER_BATCH, LAYER_CLI, LAYER_PIPELINE, LAYER_PROJECT,
};

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub select: Vec<String>,
    pub exclude: Vec<String>,
    /// Command-line variable overrides, the highest-precedence layer.
    pub vars: BTreeMap<String, String>,
    pub full_refresh: bool,
    /// Frozen wall clock for this invocation.
    pub now: NaiveDateTime,
    /// Cooperative cancellation: no new pipelines or windows start once
    /// set.
    pub cancel: Arc<AtomicBool>,
}

impl RunOptions {
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            select: Vec::new(),
            exclude: Vec::new(),
            vars: BTreeMap::new(),
            full_refresh: false,
            now,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Per-pipeline outcome of one invocation, in execution order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub order: Vec<String>,
    pub statuses: BTreeMap<String, PipelineStatus>,
}

impl RunReport {
    /// `(success, failure, skipped)` counts.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for status in self.statuses.values() {
            match status {
                PipelineStatus::Success => counts.0 += 1,
                PipelineStatus::Failure => counts.1 += 1,
                PipelineStatus::Skipped => counts.2 += 1,
            }
        }
        counts
    }

    /// True when every selected pipeline succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.statuses
            .values()
            .all(|s| *s == PipelineStatus::Success)
    }

    /// Process exit code: skips due to upstream failure count as
    /// failures.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.succeeded())
    }
}

/// The engine entry point: owns the loaded project, the component
/// registry, and the state store.
pub struct Orchestrator {
    project: Project,
    registry: ComponentRegistry,
    store: StateStore,
}

impl Orchestrator {
    #[must_use]
    pub fn new(project: Project, registry: ComponentRegistry) -> Self {
        let store = StateStore::new(&project.root);
        Self {
            project,
            registry,
            store,
        }
    }

    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The inter-pipeline graph. Edges are added for resolvable
    /// `depends_on` entries only; unresolved entries are validation
    /// issues.
    #[must_use]
    pub fn pipeline_graph(&self) -> Graph {
        let mut graph = Graph::new();
        for pipeline in self.project.pipelines.values() {
            graph.add_node(&pipeline.name);
            for dep in &pipeline.depends_on {
                if self.project.pipelines.contains_key(dep) {
                    graph.add_dependency(&pipeline.name, dep);
                }
            }
        }
        graph
    }

    /// Validate the whole project, aggregating every issue found.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing all issues.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        for pipeline in self.project.pipelines.values() {
            for dep in &pipeline.depends_on {
                if !self.project.pipelines.contains_key(dep) {
                    issues.push(format!(
                        "pipeline '{}' depends on unknown pipeline '{dep}'",
                        pipeline.name
                    ));
                }
            }
            self.validate_pipeline(pipeline, &mut issues);
        }

        if let Err(EngineError::Cycle { participants }) = self.pipeline_graph().cycle_check() {
            issues.push(format!(
                "pipeline dependency cycle: {}",
                participants.join(" -> ")
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation { issues })
        }
    }

    fn validate_pipeline(&self, pipeline: &Pipeline, issues: &mut Vec<String>) {
        let mut seen = std::collections::BTreeSet::new();
        for step in &pipeline.steps {
            if !seen.insert(step.id.as_str()) {
                issues.push(format!(
                    "pipeline '{}' declares step '{}' more than once",
                    pipeline.name, step.id
                ));
            }
        }

        for step in &pipeline.steps {
            for dep in &step.depends_on {
                if pipeline.step(dep).is_none() {
                    issues.push(format!(
                        "step '{}.{}' depends on unknown step '{dep}'",
                        pipeline.name, step.id
                    ));
                }
            }
            if step.kind != dft_types::StepKind::Source && step.depends_on.is_empty() {
                issues.push(format!(
                    "step '{}.{}' is a {} and needs at least one depends_on",
                    pipeline.name, step.id, step.kind
                ));
            }
            if let Some(connection) = &step.connection {
                if !self.project.config.connections.contains_key(connection) {
                    issues.push(format!(
                        "step '{}.{}' references unknown connection '{connection}'",
                        pipeline.name, step.id
                    ));
                }
            }
            if !self.registry.contains(step.kind, &step.component_type) {
                issues.push(format!(
                    "step '{}.{}' uses unknown {} '{}'",
                    pipeline.name,
                    step.id,
                    step.kind.type_key(),
                    step.component_type
                ));
            }
        }

        if let Err(EngineError::Cycle { participants }) =
            runner::step_graph(pipeline).cycle_check()
        {
            issues.push(format!(
                "step cycle in pipeline '{}': {}",
                pipeline.name,
                participants.join(" -> ")
            ));
        }

        if let Err(detail) = pipeline.microbatch() {
            issues.push(format!(
                "pipeline '{}' has an invalid microbatch record: {detail}",
                pipeline.name
            ));
        }
    }

    /// Resolve the selection to the ordered pipeline list without running
    /// anything. Used by `deps` and dry validation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Selector`] or [`EngineError::Cycle`].
    pub fn resolve_selection(&self, select: &[String], exclude: &[String]) -> Result<Vec<String>> {
        selector::select(select, exclude, &self.project.pipelines, &self.pipeline_graph())
    }

    /// Validate, select, and execute.
    ///
    /// # Errors
    ///
    /// Returns validation and selector errors; runtime pipeline failures
    /// are captured in the report instead.
    pub fn run(&self, options: &RunOptions) -> Result<RunReport> {
        self.validate()?;
        let graph = self.pipeline_graph();
        let order = selector::select(
            &options.select,
            &options.exclude,
            &self.project.pipelines,
            &graph,
        )?;

        tracing::info!(
            project = self.project.config.project_name,
            selected = order.len(),
            "Starting run"
        );

        let mut statuses: BTreeMap<String, PipelineStatus> = BTreeMap::new();
        for name in &order {
            let upstream_blocked = graph.dependencies(name).iter().any(|dep| {
                matches!(
                    statuses.get(dep),
                    Some(PipelineStatus::Failure | PipelineStatus::Skipped)
                )
            });
            let cancelled = options.cancel.load(Ordering::SeqCst);
            if upstream_blocked || cancelled {
                if cancelled {
                    tracing::warn!(pipeline = name, "Cancelled before start");
                } else {
                    tracing::warn!(pipeline = name, "Skipped: upstream failed");
                }
                statuses.insert(name.clone(), PipelineStatus::Skipped);
                self.record_status(name, PipelineStatus::Skipped, options.now);
                continue;
            }

            let pipeline = &self.project.pipelines[name];
            let status = self.run_pipeline(pipeline, options);
            statuses.insert(name.clone(), status);
            self.record_status(name, status, options.now);
        }

        let report = RunReport {
            order,
            statuses,
        };
        let (success, failure, skipped) = report.counts();
        tracing::info!(success, failure, skipped, "Run finished");
        Ok(report)
    }

    fn run_pipeline(&self, pipeline: &Pipeline, options: &RunOptions) -> PipelineStatus {
        let state = match self.store.load(&pipeline.name) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(pipeline = pipeline.name, "Cannot load state: {e}");
                return PipelineStatus::Failure;
            }
        };

        let plan = match strategy::build_plan(pipeline, &state, options.now, options.full_refresh)
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(pipeline = pipeline.name, "Cannot build plan: {e}");
                return PipelineStatus::Failure;
            }
        };

        tracing::info!(
            pipeline = pipeline.name,
            entries = plan.entry_count(),
            "Running pipeline"
        );

        let factory = ComponentFactory::new(&self.registry, &self.project.config.connections);
        match plan {
            ExecutionPlan::Full => {
                let ctx = self.build_context(pipeline, &state, options, None);
                match runner::run_entry(pipeline, &ctx, &factory) {
                    Ok(()) => {
                        let update = [(
                            LAST_PROCESSED_DATE.to_string(),
                            serde_json::Value::from(format_date(options.now)),
                        )];
                        if let Err(e) = self.store.update(&pipeline.name, update) {
                            tracing::error!(pipeline = pipeline.name, "Cannot save state: {e}");
                            return PipelineStatus::Failure;
                        }
                        PipelineStatus::Success
                    }
                    Err(e) => {
                        tracing::error!("{e}");
                        PipelineStatus::Failure
                    }
                }
            }
            ExecutionPlan::Microbatch { windows } => {
                self.run_windows(pipeline, windows, state, options, &factory)
            }
        }
    }

    fn run_windows(
        &self,
        pipeline: &Pipeline,
        windows: Vec<BatchWindow>,
        mut state: StateMap,
        options: &RunOptions,
        factory: &ComponentFactory<'_>,
    ) -> PipelineStatus {
        for window in windows {
            if options.cancel.load(Ordering::SeqCst) {
                tracing::warn!(
                    pipeline = pipeline.name,
                    "Cancelled; remaining windows not started"
                );
                return PipelineStatus::Skipped;
            }

            tracing::info!(
                pipeline = pipeline.name,
                batch_start = %window.start,
                batch_end = %window.end,
                period = %window.period,
                "Processing window"
            );

            let ctx = self.build_context(pipeline, &state, options, Some(&window));
            if let Err(e) = runner::run_entry(pipeline, &ctx, factory) {
                tracing::error!("{e}");
                return PipelineStatus::Failure;
            }

            // The cursor only moves forward; a lookback window must not
            // drag it back.
            let cursor = state
                .get(LAST_PROCESSED_TIMESTAMP)
                .and_then(serde_json::Value::as_str)
                .and_then(parse_timestamp)
                .map_or(window.end, |current| current.max(window.end));
            state.insert(
                LAST_PROCESSED_TIMESTAMP.to_string(),
                serde_json::Value::from(format_timestamp(cursor)),
            );
            state.insert(
                LAST_PROCESSED_DATE.to_string(),
                serde_json::Value::from(format_date(cursor)),
            );
            if let Err(e) = self.store.save(&pipeline.name, &state) {
                tracing::error!(pipeline = pipeline.name, "Cannot save state: {e}");
                return PipelineStatus::Failure;
            }
        }
        PipelineStatus::Success
    }

    /// Record terminal status keys. Cursor keys are never touched here, so
    /// failures leave incremental progress intact.
    fn record_status(&self, pipeline: &str, status: PipelineStatus, now: NaiveDateTime) {
        let update = [
            (
                LAST_STATUS.to_string(),
                serde_json::Value::from(status.as_str()),
            ),
            (
                LAST_RUN_AT.to_string(),
                serde_json::Value::from(format_timestamp(now)),
            ),
        ];
        if let Err(e) = self.store.update(pipeline, update) {
            tracing::error!(pipeline, "Cannot record run status: {e}");
        }
    }

    /// Assemble the layered context for one plan entry. Pipeline variables
    /// are rendered against the surrounding layers first, so they may
    /// reference project variables, batch variables, and helpers.
    fn build_context(
        &self,
        pipeline: &Pipeline,
        state: &StateMap,
        options: &RunOptions,
        window: Option<&BatchWindow>,
    ) -> VarContext {
        let batch_layer = window.map(|w| {
            BTreeMap::from([
                (
                    "batch_start".to_string(),
                    TemplateValue::Timestamp(w.start),
                ),
                ("batch_end".to_string(), TemplateValue::Timestamp(w.end)),
                (
                    "batch_period".to_string(),
                    TemplateValue::Str(w.period.as_str().to_string()),
                ),
                (
                    "event_time_column".to_string(),
                    TemplateValue::Str(w.event_time_column.clone()),
                ),
            ])
        });
        let cli_layer: BTreeMap<String, TemplateValue> = options
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::Str(v.clone())))
            .collect();

        let mut outer = VarContext::new(options.now);
        outer.push_yaml_layer(LAYER_PROJECT, &self.project.config.variables);
        if let Some(batch) = &batch_layer {
            outer.push_layer(LAYER_BATCH, batch.clone());
        }
        outer.push_layer(LAYER_CLI, cli_layer.clone());
        outer.set_state(state.clone());

        let renderer = crate::template::Renderer::new(&outer);
        let pipeline_layer: BTreeMap<String, TemplateValue> = pipeline
            .plain_variables()
            .map(|(k, v)| {
                let rendered = match v {
                    serde_yaml::Value::String(s) => match renderer.render(s) {
                        Ok(out) => TemplateValue::Str(out),
                        // Leave the expression text; step rendering will
                        // surface the error with context.
                        Err(_) => TemplateValue::Str(s.clone()),
                    },
                    other => TemplateValue::from_yaml(other),
                };
                (k.clone(), rendered)
            })
            .collect();

        let mut ctx = VarContext::new(options.now);
        ctx.push_yaml_layer(LAYER_PROJECT, &self.project.config.variables);
        ctx.push_layer(LAYER_PIPELINE, pipeline_layer);
        if let Some(batch) = batch_layer {
            ctx.push_layer(LAYER_BATCH, batch);
        }
        ctx.push_layer(LAYER_CLI, cli_layer);
        ctx.set_state(state.clone());
        ctx
    }
}
