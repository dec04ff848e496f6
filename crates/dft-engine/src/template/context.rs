//! Layered variable context.
//!
//! One immutable snapshot per plan entry. Layers from lowest to highest
//! precedence: builtins, project variables, pipeline variables, batch
//! variables, command-line overrides. Lookup walks top to bottom.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use dft_types::StateMap;

use crate::template::value::TemplateValue;

/// Well-known layer names, in precedence order.
pub const LAYER_BUILTIN: &str = "builtin";
pub const LAYER_PROJECT: &str = "project";
pub const LAYER_PIPELINE: &str = "pipeline";
pub const LAYER_BATCH: &str = "batch";
pub const LAYER_CLI: &str = "cli";

#[derive(Debug, Clone)]
struct Layer {
    name: &'static str,
    vars: BTreeMap<String, TemplateValue>,
}

/// The variable context a renderer evaluates against. Also carries the
/// frozen `now` for date helpers and a snapshot of the pipeline's state
/// for `state.get(...)`.
#[derive(Debug, Clone)]
pub struct VarContext {
    layers: Vec<Layer>,
    state: StateMap,
    now: NaiveDateTime,
}

impl VarContext {
    /// An empty context with a frozen wall clock.
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            layers: vec![Layer {
                name: LAYER_BUILTIN,
                vars: BTreeMap::new(),
            }],
            state: StateMap::new(),
            now,
        }
    }

    /// Push a layer above all existing ones.
    pub fn push_layer(
        &mut self,
        name: &'static str,
        vars: BTreeMap<String, TemplateValue>,
    ) {
        self.layers.push(Layer { name, vars });
    }

    /// Push a layer converted from YAML variable declarations.
    pub fn push_yaml_layer<'a, I>(&mut self, name: &'static str, vars: I)
    where
        I: IntoIterator<Item = (&'a String, &'a serde_yaml::Value)>,
    {
        let converted = vars
            .into_iter()
            .map(|(k, v)| (k.clone(), TemplateValue::from_yaml(v)))
            .collect();
        self.push_layer(name, converted);
    }

    /// Replace the state snapshot visible to `state.get(...)`.
    pub fn set_state(&mut self, state: StateMap) {
        self.state = state;
    }

    #[must_use]
    pub fn state(&self) -> &StateMap {
        &self.state
    }

    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Resolve a name, searching from the highest-precedence layer down.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&TemplateValue> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.vars.get(name))
    }

    /// Every key that a failed lookup searched, as `layer:key` pairs.
    /// Reported inside `TemplateError` messages.
    #[must_use]
    pub fn searched_keys(&self) -> Vec<String> {
        self.layers
            .iter()
            .rev()
            .flat_map(|layer| {
                layer
                    .vars
                    .keys()
                    .map(move |k| format!("{}:{}", layer.name, k))
            })
            .collect()
    }

    /// Flatten the layers into the JSON map handed to components, highest
    /// precedence winning.
    #[must_use]
    pub fn flatten(&self) -> BTreeMap<String, serde_json::Value> {
        let mut flat = BTreeMap::new();
        for layer in &self.layers {
            for (k, v) in &layer.vars {
                flat.insert(k.clone(), v.to_json());
            }
        }
        flat
    }
}
