use tierjit::ast::{BinaryOp, Expr, FunctionDefinition};
use tierjit::runtime::{EngineError, ExecutionContext, FunctionRegistry, Interpreter};

fn registry_with(functions: Vec<FunctionDefinition>) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for function in functions {
        registry.register(function);
    }
    registry
}

fn nullary(name: &str, body: Expr) -> FunctionDefinition {
    FunctionDefinition::new(name, Vec::new(), body)
}

#[test]
fn evaluates_arithmetic() {
    let body = Expr::binary(
        BinaryOp::Sub,
        Expr::binary(
            BinaryOp::Mul,
            Expr::Number(4.0),
            Expr::binary(BinaryOp::Add, Expr::Number(2.0), Expr::Number(3.0)),
        ),
        Expr::binary(BinaryOp::Div, Expr::Number(9.0), Expr::Number(2.0)),
    );
    let registry = registry_with(vec![nullary("f", body)]);

    let value = Interpreter::new(&registry).interpret("f").expect("interprets");
    assert_eq!(value, 15.5);
}

#[test]
fn comparisons_yield_one_or_zero() {
    let registry = registry_with(vec![
        nullary("lt", Expr::binary(BinaryOp::Lt, Expr::Number(1.0), Expr::Number(2.0))),
        nullary("gt", Expr::binary(BinaryOp::Gt, Expr::Number(1.0), Expr::Number(2.0))),
        nullary(
            "nan",
            Expr::binary(
                BinaryOp::Lt,
                Expr::binary(BinaryOp::Div, Expr::Number(0.0), Expr::Number(0.0)),
                Expr::Number(1.0),
            ),
        ),
    ]);
    let interpreter = Interpreter::new(&registry);

    assert_eq!(interpreter.interpret("lt").unwrap(), 1.0);
    assert_eq!(interpreter.interpret("gt").unwrap(), 0.0);
    assert_eq!(interpreter.interpret("nan").unwrap(), 0.0);
}

#[test]
fn division_follows_ieee_754() {
    let registry = registry_with(vec![
        nullary("inf", Expr::binary(BinaryOp::Div, Expr::Number(1.0), Expr::Number(0.0))),
        nullary("nan", Expr::binary(BinaryOp::Div, Expr::Number(0.0), Expr::Number(0.0))),
    ]);
    let interpreter = Interpreter::new(&registry);

    assert_eq!(interpreter.interpret("inf").unwrap(), f64::INFINITY);
    assert!(interpreter.interpret("nan").unwrap().is_nan());
}

#[test]
fn conditional_body_is_unsupported() {
    let body = Expr::If {
        cond: Expr::binary(BinaryOp::Lt, Expr::Number(1.0), Expr::Number(2.0)).into(),
        then_branch: Expr::Number(10.0).into(),
        else_branch: Some(Expr::Number(20.0).into()),
    };
    let registry = registry_with(vec![nullary("g", body)]);

    let err = Interpreter::new(&registry).interpret("g").unwrap_err();
    assert_eq!(
        err,
        EngineError::UnsupportedExpression {
            function: "g".into(),
            kind: "conditional",
        }
    );
}

#[test]
fn calls_and_variables_are_unsupported() {
    let registry = registry_with(vec![
        nullary("one", Expr::Number(1.0)),
        nullary(
            "caller",
            Expr::Call {
                callee: "one".into(),
                args: Vec::new(),
            },
        ),
        FunctionDefinition::new("id", vec!["x".into()], Expr::Variable("x".into())),
    ]);
    let interpreter = Interpreter::new(&registry);

    assert!(matches!(
        interpreter.interpret("caller"),
        Err(EngineError::UnsupportedExpression { kind: "function call", .. })
    ));
    assert!(matches!(
        interpreter.interpret("id"),
        Err(EngineError::UnsupportedExpression { kind: "variable reference", .. })
    ));
}

#[test]
fn unsupported_right_operand_is_still_reported() {
    let registry = FunctionRegistry::new();
    let interpreter = Interpreter::new(&registry);
    let expr = Expr::binary(BinaryOp::Add, Expr::Number(1.0), Expr::Variable("y".into()));

    let err = interpreter
        .interpret_expr("anon", &expr, &mut ExecutionContext::default())
        .unwrap_err();
    assert_eq!(err.function(), "anon");
}

#[test]
fn unknown_function() {
    let registry = FunctionRegistry::new();
    let err = Interpreter::new(&registry).interpret("undefined_fn").unwrap_err();
    assert_eq!(err, EngineError::UnknownFunction("undefined_fn".into()));
}
