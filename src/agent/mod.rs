pub mod registry;
pub mod runtime;

pub use registry::ToolRegistry;
pub use runtime::{Agent, AgentSettings};
