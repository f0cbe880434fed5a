//! Tree-walking evaluator for the baseline tier.
//!
//! Only numeric literals and binary operators are evaluated. Variables, calls
//! and conditionals are reported as unsupported; those bodies only run once
//! they have been promoted to native code.

use ahash::AHashMap;

use super::error::EngineError;
use super::registry::FunctionRegistry;
use crate::ast::{BinaryOp, Expr};

/// Variable bindings for a single interpreted call.
pub type ExecutionContext = AHashMap<String, f64>;

pub struct Interpreter<'a> {
    registry: &'a FunctionRegistry,
}

impl<'a> Interpreter<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self { registry }
    }

    pub fn interpret(&self, name: &str) -> Result<f64, EngineError> {
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;

        let mut context = ExecutionContext::default();
        self.interpret_expr(name, &function.body, &mut context)
    }

    /// Evaluates `expr` as part of `function`'s body.
    pub fn interpret_expr(
        &self,
        function: &str,
        expr: &Expr,
        context: &mut ExecutionContext,
    ) -> Result<f64, EngineError> {
        match expr {
            Expr::Number(value) => Ok(*value),
            Expr::Binary { op, left, right } => {
                let lhs = self.interpret_expr(function, left, context)?;
                let rhs = self.interpret_expr(function, right, context)?;
                Ok(apply_binary(*op, lhs, rhs))
            }
            Expr::Variable(_) | Expr::Call { .. } | Expr::If { .. } => {
                Err(EngineError::UnsupportedExpression {
                    function: function.to_string(),
                    kind: expr.kind_name(),
                })
            }
        }
    }
}

pub fn apply_binary(op: BinaryOp, lhs: f64, rhs: f64) -> f64 {
    match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => lhs / rhs,
        BinaryOp::Lt => f64::from(u8::from(lhs < rhs)),
        BinaryOp::Gt => f64::from(u8::from(lhs > rhs)),
    }
}
