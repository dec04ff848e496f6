//! Component contract, registry, and factory.
//!
//! The engine consumes sources, processors, and endpoints through the
//! narrow traits here and treats them as opaque. Built-in components live
//! in [`builtins`]; user components register through
//! [`ComponentRegistry`].

mod builtins;
mod factory;
mod registry;

use std::collections::BTreeMap;

use dft_types::DataPacket;

pub use factory::ComponentFactory;
pub use registry::ComponentRegistry;

/// Variables handed to a component operation: the flattened layered
/// context, highest precedence winning. Batch variables are present only
/// inside a microbatch window.
pub type Vars = BTreeMap<String, serde_json::Value>;

/// Everything a component constructor receives: rendered config (with the
/// rendered connection fields merged under the reserved `connection`
/// sub-key) plus pipeline/step identity for error messages.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub pipeline: String,
    pub step_id: String,
    pub config: serde_json::Value,
}

impl ComponentSpec {
    /// A string-valued config key, if present.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(serde_json::Value::as_str)
    }

    /// A required string-valued config key.
    ///
    /// # Errors
    ///
    /// Fails when the key is missing or not a string.
    pub fn require_str(&self, key: &str) -> anyhow::Result<String> {
        self.get_str(key).map(str::to_string).ok_or_else(|| {
            anyhow::anyhow!(
                "step '{}' requires config key '{key}'",
                self.step_id
            )
        })
    }
}

/// Extracts data from somewhere and produces one packet per invocation.
pub trait Source: Send {
    /// Produce this invocation's packet.
    ///
    /// # Errors
    ///
    /// Any failure; the runner wraps it with pipeline/step context.
    fn extract(&mut self, vars: &Vars) -> anyhow::Result<DataPacket>;

    /// Cheap reachability probe used by validation tooling.
    fn test_connection(&self) -> bool;
}

/// Transforms one packet into another.
pub trait Processor: Send {
    /// Consume the input packet and produce the output packet.
    ///
    /// # Errors
    ///
    /// Any failure; the runner wraps it with pipeline/step context.
    fn process(&mut self, packet: DataPacket, vars: &Vars) -> anyhow::Result<DataPacket>;
}

/// Loads one packet into a destination. Endpoints that declare
/// `event_time_column` must honor the window-replace contract: delete
/// destination rows inside `[batch_start, batch_end)` before writing.
pub trait Endpoint: Send {
    /// Write the packet.
    ///
    /// # Errors
    ///
    /// Any failure; the runner wraps it with pipeline/step context.
    fn load(&mut self, packet: DataPacket, vars: &Vars) -> anyhow::Result<()>;
}

impl std::fmt::Debug for dyn Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Source")
    }
}

impl std::fmt::Debug for dyn Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Endpoint")
    }
}
