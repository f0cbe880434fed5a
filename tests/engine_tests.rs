use std::cell::Cell;
use std::rc::Rc;

use tierjit::ast::{BinaryOp, Expr, FunctionDefinition};
use tierjit::codegen::{CodegenBackend, CodegenError, CompilationContext, NativeRoutine};
use tierjit::runtime::{
    EngineError, ExecutionPath, FunctionTier, Registration, TieredConfig, TieredEngine,
};

extern "C" fn five() -> f64 {
    5.0
}

extern "C" fn ten() -> f64 {
    10.0
}

/// Stands in for a real code generator: counts requests and hands back a
/// fixed host function.
struct MockBackend {
    compiles: Rc<Cell<usize>>,
    entry: extern "C" fn() -> f64,
    failure: Option<CodegenError>,
}

impl CodegenBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn compile(&mut self, ctx: &CompilationContext<'_>) -> Result<NativeRoutine, CodegenError> {
        self.compiles.set(self.compiles.get() + 1);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let unit = ctx.compilation_unit()?;
        let linked = unit.iter().map(|f| f.name().to_string()).collect();
        let address = self.entry as *const u8;
        unsafe { NativeRoutine::from_raw(ctx.function().name(), address, linked, Box::new(())) }
    }
}

fn engine_with(
    config: TieredConfig,
    entry: extern "C" fn() -> f64,
    failure: Option<CodegenError>,
) -> (TieredEngine, Rc<Cell<usize>>) {
    let compiles = Rc::new(Cell::new(0));
    let backend = MockBackend {
        compiles: Rc::clone(&compiles),
        entry,
        failure,
    };
    (TieredEngine::with_backend(config, Box::new(backend)), compiles)
}

fn two_plus_three(name: &str) -> FunctionDefinition {
    FunctionDefinition::new(
        name,
        Vec::new(),
        Expr::binary(BinaryOp::Add, Expr::Number(2.0), Expr::Number(3.0)),
    )
}

fn call(callee: &str) -> Expr {
    Expr::Call {
        callee: callee.to_string(),
        args: Vec::new(),
    }
}

#[test]
fn hot_function_is_promoted_on_the_threshold_call() {
    let (mut engine, compiles) = engine_with(TieredConfig::default(), five, None);
    engine.register_function(two_plus_three("f"));

    for calls in 1..=4 {
        let execution = engine.execute_traced("f").expect("executes");
        assert_eq!(execution.value, 5.0);
        assert_eq!(execution.path, ExecutionPath::Interpreted);
        assert_eq!(engine.tier_of("f"), FunctionTier::Warm { calls });
    }
    assert_eq!(compiles.get(), 0);

    let execution = engine.execute_traced("f").expect("executes");
    assert_eq!(execution.value, 5.0);
    assert_eq!(execution.path, ExecutionPath::Compiled);
    assert_eq!(compiles.get(), 1);
    assert_eq!(engine.tier_of("f"), FunctionTier::Compiled);

    for _ in 0..3 {
        let execution = engine.execute_traced("f").expect("executes");
        assert_eq!(execution.value, 5.0);
        assert_eq!(execution.path, ExecutionPath::Cached);
    }
    assert_eq!(compiles.get(), 1);
    assert_eq!(engine.profiler().call_count("f"), 8);

    let stats = engine.stats();
    assert_eq!(stats.interpreted_calls, 4);
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.cache_hits, 3);
    assert_eq!(stats.compile_failures, 0);
    assert_eq!(engine.get_cache_stats().total_functions, 1);
}

#[test]
fn unknown_function_is_observed_but_never_runs() {
    let (mut engine, compiles) = engine_with(TieredConfig::default(), five, None);

    let err = engine.execute("undefined_fn").unwrap_err();
    assert_eq!(err, EngineError::UnknownFunction("undefined_fn".into()));
    assert_eq!(engine.profiler().call_count("undefined_fn"), 1);
    assert_eq!(engine.tier_of("undefined_fn"), FunctionTier::Warm { calls: 1 });
    assert_eq!(engine.stats().interpreted_calls, 0);
    assert_eq!(compiles.get(), 0);
}

#[test]
fn requests_before_registration_count_toward_promotion() {
    let config = TieredConfig::default().with_threshold(3);
    let (mut engine, compiles) = engine_with(config, five, None);

    for _ in 0..2 {
        assert!(matches!(engine.execute("late"), Err(EngineError::UnknownFunction(_))));
    }
    assert_eq!(engine.profiler().call_count("late"), 2);

    engine.register_function(two_plus_three("late"));
    let execution = engine.execute_traced("late").expect("compiles");
    assert_eq!(execution.path, ExecutionPath::Compiled);
    assert_eq!(compiles.get(), 1);
}

#[test]
fn uninterpretable_body_still_counts_and_compiles() {
    let (mut engine, compiles) = engine_with(TieredConfig::default(), ten, None);
    engine.register_function(FunctionDefinition::new(
        "g",
        Vec::new(),
        Expr::If {
            cond: Expr::binary(BinaryOp::Lt, Expr::Number(1.0), Expr::Number(2.0)).into(),
            then_branch: Expr::Number(10.0).into(),
            else_branch: Some(Expr::Number(20.0).into()),
        },
    ));

    for _ in 0..4 {
        let err = engine.execute("g").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedExpression { kind: "conditional", .. }));
    }
    assert_eq!(engine.profiler().call_count("g"), 4);

    let execution = engine.execute_traced("g").expect("compiled");
    assert_eq!(execution.path, ExecutionPath::Compiled);
    assert_eq!(execution.value, 10.0);

    for _ in 0..5 {
        assert_eq!(engine.execute("g").expect("cached"), 10.0);
    }
    assert_eq!(compiles.get(), 1);
}

#[test]
fn backend_failure_is_reported_without_fallback() {
    let config = TieredConfig::default().with_threshold(2);
    let failure = CodegenError::Backend("boom".into());
    let (mut engine, compiles) = engine_with(config, five, Some(failure.clone()));
    engine.register_function(two_plus_three("f"));

    assert_eq!(engine.execute("f").expect("interpreted"), 5.0);

    for _ in 0..2 {
        let err = engine.execute("f").unwrap_err();
        assert_eq!(
            err,
            EngineError::CodeGenerationFailure {
                function: "f".into(),
                source: failure.clone(),
            }
        );
    }
    assert_eq!(compiles.get(), 2);
    assert_eq!(engine.stats().compile_failures, 2);
    assert_eq!(engine.stats().interpreted_calls, 1);
    assert!(engine.function_cache().is_empty());
    assert_eq!(engine.tier_of("f"), FunctionTier::Warm { calls: 3 });
}

#[test]
fn symbol_lookup_failures_are_classified() {
    let config = TieredConfig::default().with_threshold(1);
    let failure = CodegenError::SymbolLookup("f".into());
    let (mut engine, _) = engine_with(config, five, Some(failure));
    engine.register_function(two_plus_three("f"));

    assert_eq!(
        engine.execute("f").unwrap_err(),
        EngineError::SymbolResolutionFailure {
            function: "f".into(),
            symbol: "f".into(),
        }
    );
}

#[test]
fn parameterised_entry_is_refused() {
    let config = TieredConfig::default().with_threshold(1);
    let (mut engine, _) = engine_with(config, five, None);
    engine.register_function(FunctionDefinition::new(
        "id",
        vec!["x".into()],
        Expr::Variable("x".into()),
    ));

    match engine.execute("id").unwrap_err() {
        EngineError::CodeGenerationFailure { function, source } => {
            assert_eq!(function, "id");
            assert_eq!(
                source,
                CodegenError::UnsupportedEntry {
                    function: "id".into(),
                    arity: 1,
                }
            );
        }
        other => panic!("expected codegen failure, got {other:?}"),
    }
}

#[test]
fn identical_redefinition_keeps_compiled_code() {
    let config = TieredConfig::default().with_threshold(2);
    let (mut engine, compiles) = engine_with(config, five, None);
    assert_eq!(engine.register_function(two_plus_three("f")), Registration::Inserted);

    engine.execute("f").unwrap();
    engine.execute("f").unwrap();
    assert_eq!(engine.register_function(two_plus_three("f")), Registration::Unchanged);

    let execution = engine.execute_traced("f").unwrap();
    assert_eq!(execution.path, ExecutionPath::Cached);
    assert_eq!(engine.profiler().call_count("f"), 3);
    assert_eq!(compiles.get(), 1);
}

#[test]
fn changed_redefinition_resets_count_and_drops_dependents() {
    let config = TieredConfig::default().with_threshold(1);
    let (mut engine, compiles) = engine_with(config, five, None);
    engine.register_function(two_plus_three("h"));
    engine.register_function(FunctionDefinition::new("caller", Vec::new(), call("h")));
    engine.register_function(two_plus_three("other"));

    for name in ["caller", "h", "other"] {
        assert_eq!(engine.execute_traced(name).unwrap().path, ExecutionPath::Compiled);
    }
    assert_eq!(engine.function_cache().len(), 3);
    assert_eq!(
        engine.function_cache().lookup("caller").unwrap().routine.linked(),
        ["caller".to_string(), "h".to_string()]
    );

    let replaced = engine.register_function(FunctionDefinition::new(
        "h",
        Vec::new(),
        Expr::Number(7.0),
    ));
    assert_eq!(replaced, Registration::Replaced);

    assert!(!engine.function_cache().contains("h"));
    assert!(!engine.function_cache().contains("caller"));
    assert!(engine.function_cache().contains("other"));
    assert_eq!(engine.tier_of("h"), FunctionTier::Unseen);
    assert_eq!(engine.tier_of("caller"), FunctionTier::Warm { calls: 1 });

    assert_eq!(engine.execute_traced("caller").unwrap().path, ExecutionPath::Compiled);
    assert_eq!(compiles.get(), 4);
}

#[test]
fn disabled_tiering_always_interprets() {
    let config = TieredConfig::default().with_enabled(false).with_threshold(1);
    let (mut engine, compiles) = engine_with(config, five, None);
    engine.register_function(two_plus_three("f"));

    for _ in 0..10 {
        let execution = engine.execute_traced("f").unwrap();
        assert_eq!(execution.path, ExecutionPath::Interpreted);
        assert_eq!(execution.value, 5.0);
    }
    assert_eq!(compiles.get(), 0);
    assert_eq!(engine.profiler().call_count("f"), 10);
}

#[test]
fn direct_interpretation_bypasses_profiling() {
    let (mut engine, _) = engine_with(TieredConfig::default(), five, None);
    engine.register_function(two_plus_three("f"));

    assert_eq!(engine.interpret("f").unwrap(), 5.0);
    assert_eq!(engine.profiler().call_count("f"), 0);
    assert_eq!(
        engine.interpret("missing").unwrap_err(),
        EngineError::UnknownFunction("missing".into())
    );
}

#[test]
fn profiler_stats_are_sorted_by_calls() {
    let (mut engine, _) = engine_with(TieredConfig::default().with_threshold(100), five, None);
    engine.register_function(two_plus_three("a"));
    engine.register_function(two_plus_three("b"));

    engine.execute("a").unwrap();
    for _ in 0..3 {
        engine.execute("b").unwrap();
    }

    let stats = engine.get_profiler_stats();
    let summary: Vec<(&str, u64)> = stats
        .iter()
        .map(|m| (m.name.as_str(), m.call_count))
        .collect();
    assert_eq!(summary, [("b", 3_u64), ("a", 1_u64)]);
}
