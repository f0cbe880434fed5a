pub mod error;
pub mod interpreter;
pub mod jit;
pub mod registry;

pub use error::EngineError;
pub use interpreter::{ExecutionContext, Interpreter};
pub use jit::{Execution, ExecutionPath, FunctionTier, TieredConfig, TieredEngine};
pub use registry::{FunctionRegistry, Registration};
