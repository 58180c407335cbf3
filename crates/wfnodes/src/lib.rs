//! Standard node library
//!
//! Collection of built-in nodes for common operations

mod debug;
mod echo;
mod file;
mod http;
mod shell;
mod time;
mod transform;

pub use debug::DebugNode;
pub use echo::EchoNode;
pub use file::{FileReadNode, FileWriteNode};
pub use http::HttpRequestNode;
pub use shell::ShellNode;
pub use time::DelayNode;
pub use transform::JsonParseNode;

use std::collections::HashMap;
use std::sync::Arc;
use wfcore::{NodeInterface, PortDefinition, Value};
use wfruntime::NodeRegistry;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(echo::EchoNodeFactory));
    registry.register(Arc::new(debug::DebugNodeFactory));
    registry.register(Arc::new(file::FileReadNodeFactory));
    registry.register(Arc::new(file::FileWriteNodeFactory));
    registry.register(Arc::new(shell::ShellNodeFactory));
    registry.register(Arc::new(http::HttpRequestNodeFactory));
    registry.register(Arc::new(time::DelayNodeFactory));
    registry.register(Arc::new(transform::JsonParseNodeFactory));
}

/// Registry with the runtime built-ins plus every standard node
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    register_all(&mut registry);
    registry
}

const OUTPUT_KEY: &str = "output_key";

/// Store key a node writes its result under: the `output_key` param if it is
/// a string, otherwise the node type's default.
pub(crate) fn output_key<'a>(params: &'a HashMap<String, Value>, default: &'a str) -> &'a str {
    params
        .get(OUTPUT_KEY)
        .and_then(Value::as_str)
        .unwrap_or(default)
}

pub(crate) fn output_key_param(default: &str) -> PortDefinition {
    PortDefinition::new(OUTPUT_KEY, format!("Store key for the result (default '{}')", default))
        .optional()
}

/// Replace a fixed interface's single output with the configured key
pub(crate) fn with_output_key(
    mut interface: NodeInterface,
    params: &HashMap<String, Value>,
    default: &str,
) -> NodeInterface {
    let key = output_key(params, default);
    if let Some(port) = interface.outputs.first_mut() {
        port.name = key.to_string();
    }
    interface
}
