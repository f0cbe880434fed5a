use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::cache::{CacheMetadata, CacheStats, CompiledEntry, FunctionCache};
use super::config::TieredConfig;
use super::profiler::{CallProfiler, FunctionMetrics};
use crate::ast::FunctionDefinition;
use crate::codegen::{self, CodegenBackend, CompilationContext};
use crate::runtime::error::EngineError;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::registry::{FunctionRegistry, Registration};

/// How a single request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Interpreted,
    /// Compiled during this request, then invoked.
    Compiled,
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Execution {
    pub value: f64,
    pub path: ExecutionPath,
}

/// Where a function currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionTier {
    Unseen,
    Warm { calls: u64 },
    Compiled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub interpreted_calls: u64,
    pub compilations: u64,
    pub cache_hits: u64,
    pub compile_failures: u64,
    pub total_compile_time: Duration,
}

/// Runs registered functions, promoting hot ones from the interpreter to
/// native code.
///
/// Every request counts as a call, including one for a name that is not
/// registered yet. Cached native code wins over everything else; otherwise the
/// call that reaches `hot_threshold` compiles the function and runs the fresh
/// code, and every colder call is interpreted. A failed promotion is reported to the caller
/// and is not retried through the interpreter.
pub struct TieredEngine {
    config: TieredConfig,
    registry: FunctionRegistry,
    profiler: CallProfiler,
    function_cache: FunctionCache,
    backend: Box<dyn CodegenBackend>,
    stats: EngineStats,
}

impl TieredEngine {
    pub fn new(config: TieredConfig) -> Self {
        Self::with_backend(config, codegen::default_backend())
    }

    pub fn with_backend(config: TieredConfig, backend: Box<dyn CodegenBackend>) -> Self {
        debug!(
            backend = backend.name(),
            enabled = config.enabled,
            hot_threshold = config.hot_threshold,
            "tiered engine created"
        );
        Self {
            config,
            registry: FunctionRegistry::new(),
            profiler: CallProfiler::new(),
            function_cache: FunctionCache::new(),
            backend,
            stats: EngineStats::default(),
        }
    }

    /// Adds or replaces a definition.
    ///
    /// Replacing a body forgets the function's call count and drops every
    /// compiled entry that had the old body linked in. Re-registering an
    /// identical definition changes nothing.
    pub fn register_function(&mut self, definition: FunctionDefinition) -> Registration {
        let name = definition.name().to_string();
        let outcome = self.registry.register(definition);
        if outcome == Registration::Replaced {
            self.profiler.reset(&name);
            let dropped = self.function_cache.invalidate_dependents(&name);
            if dropped.is_empty() {
                debug!(function = %name, "definition replaced");
            } else {
                info!(function = %name, ?dropped, "definition replaced; compiled code invalidated");
            }
        }
        outcome
    }

    pub fn execute(&mut self, name: &str) -> Result<f64, EngineError> {
        self.execute_traced(name).map(|execution| execution.value)
    }

    pub fn execute_traced(&mut self, name: &str) -> Result<Execution, EngineError> {
        // Every request is observed, even one for a name nobody registered yet.
        let calls = self.profiler.record_call(name);
        if !self.registry.contains(name) {
            debug!(function = name, calls, "unknown function requested");
            return Err(EngineError::UnknownFunction(name.to_string()));
        }

        let start = Instant::now();
        let result = self.dispatch(name, calls);
        self.profiler.record_time(name, start.elapsed());
        result
    }

    fn dispatch(&mut self, name: &str, calls: u64) -> Result<Execution, EngineError> {
        if let Some(entry) = self.function_cache.lookup(name) {
            let value = entry.invoke();
            self.stats.cache_hits += 1;
            debug!(function = name, calls, "cached native call");
            return Ok(Execution {
                value,
                path: ExecutionPath::Cached,
            });
        }

        if self.config.enabled && calls >= self.config.hot_threshold {
            let value = self.compile_and_invoke(name, calls)?;
            return Ok(Execution {
                value,
                path: ExecutionPath::Compiled,
            });
        }

        debug!(function = name, calls, "interpreted call");
        self.stats.interpreted_calls += 1;
        let value = Interpreter::new(&self.registry).interpret(name)?;
        Ok(Execution {
            value,
            path: ExecutionPath::Interpreted,
        })
    }

    fn compile_and_invoke(&mut self, name: &str, calls: u64) -> Result<f64, EngineError> {
        let definition = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        let ctx = CompilationContext::new(definition, &self.registry, self.config.codegen_options());

        let start = Instant::now();
        let routine = match self.backend.compile(&ctx) {
            Ok(routine) => routine,
            Err(err) => {
                self.stats.compile_failures += 1;
                warn!(function = name, backend = self.backend.name(), error = %err, "compilation failed");
                return Err(EngineError::from_codegen(name, err));
            }
        };
        let elapsed = start.elapsed();

        self.stats.compilations += 1;
        self.stats.total_compile_time += elapsed;
        info!(
            function = name,
            calls,
            backend = self.backend.name(),
            compile_us = elapsed.as_micros() as u64,
            "promoted to native code"
        );

        let metadata = CacheMetadata::new(elapsed, self.backend.name());
        let entry = self
            .function_cache
            .insert(CompiledEntry::new(routine, metadata));
        Ok(entry.invoke())
    }

    /// Runs `name` in the interpreter without touching the profiler or cache.
    pub fn interpret(&self, name: &str) -> Result<f64, EngineError> {
        Interpreter::new(&self.registry).interpret(name)
    }

    pub fn tier_of(&self, name: &str) -> FunctionTier {
        if self.function_cache.contains(name) {
            return FunctionTier::Compiled;
        }
        match self.profiler.call_count(name) {
            0 => FunctionTier::Unseen,
            calls => FunctionTier::Warm { calls },
        }
    }

    pub fn config(&self) -> &TieredConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn profiler(&self) -> &CallProfiler {
        &self.profiler
    }

    pub fn function_cache(&self) -> &FunctionCache {
        &self.function_cache
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Get profiler statistics
    pub fn get_profiler_stats(&self) -> Vec<FunctionMetrics> {
        self.profiler.all_metrics()
    }

    /// Get cache statistics
    pub fn get_cache_stats(&self) -> CacheStats {
        self.function_cache.stats()
    }
}
