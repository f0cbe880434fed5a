// Tiered execution: profiling, promotion and the compiled-code cache
pub mod cache;
pub mod config;
pub mod engine;
pub mod profiler;

pub use cache::{CacheStats, CompiledEntry, FunctionCache};
pub use config::TieredConfig;
pub use engine::{EngineStats, Execution, ExecutionPath, FunctionTier, TieredEngine};
pub use profiler::{CallProfiler, FunctionMetrics, HotFunction};
