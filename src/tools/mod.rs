pub mod builtin;
pub mod executor;

pub use executor::ToolExecutor;
