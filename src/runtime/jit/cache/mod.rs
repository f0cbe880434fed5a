// Compiled-code cache
pub mod function_cache;
pub mod metadata;

pub use function_cache::{CacheStats, FunctionCache};
pub use metadata::CacheMetadata;

use crate::codegen::NativeRoutine;

/// Cache entry for a compiled function
#[derive(Debug)]
pub struct CompiledEntry {
    pub routine: NativeRoutine,
    pub metadata: CacheMetadata,
}

impl CompiledEntry {
    pub fn new(routine: NativeRoutine, metadata: CacheMetadata) -> Self {
        Self { routine, metadata }
    }

    pub fn name(&self) -> &str {
        self.routine.name()
    }

    /// Whether `function` was compiled into this entry's unit.
    pub fn links(&self, function: &str) -> bool {
        self.routine.linked().iter().any(|name| name == function)
    }

    pub fn invoke(&self) -> f64 {
        self.routine.invoke()
    }
}
