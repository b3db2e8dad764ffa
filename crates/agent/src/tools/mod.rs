//! Capability Registry: the named operations the model may invoke.

mod args;
mod capability;
mod registry;

pub use capability::Capability;
pub use registry::{error_payload, render_tool_result, ToolRegistry};
