//! LLVM backend built on inkwell's MCJIT execution engine.

use std::time::Instant;

use ahash::AHashMap;
use inkwell::FloatPredicate;
use inkwell::OptimizationLevel;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context as LlvmContext;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{InitializationConfig, Target};
use inkwell::types::{BasicMetadataTypeEnum, FloatType};
use inkwell::values::{BasicMetadataValueEnum, FloatValue, FunctionValue};
use tracing::debug;

use super::{CodegenBackend, CodegenError, CodegenOptLevel, CompilationContext, NativeRoutine};
use crate::ast::{BinaryOp, Expr, FunctionDefinition};

impl From<CodegenOptLevel> for OptimizationLevel {
    fn from(value: CodegenOptLevel) -> Self {
        match value {
            CodegenOptLevel::None => OptimizationLevel::None,
            CodegenOptLevel::Default => OptimizationLevel::Default,
            CodegenOptLevel::Aggressive => OptimizationLevel::Aggressive,
        }
    }
}

impl From<BuilderError> for CodegenError {
    fn from(value: BuilderError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Keeps the execution engine (and with it the module's code) alive.
struct LlvmCode {
    _engine: ExecutionEngine<'static>,
    _module: Module<'static>,
}

pub struct LlvmBackend {
    // One context per backend; every compilation gets its own module in it.
    context: &'static LlvmContext,
}

impl LlvmBackend {
    pub fn new() -> Self {
        Self {
            context: Box::leak(Box::new(LlvmContext::create())),
        }
    }
}

impl Default for LlvmBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LlvmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlvmBackend").finish_non_exhaustive()
    }
}

impl CodegenBackend for LlvmBackend {
    fn name(&self) -> &'static str {
        "llvm"
    }

    fn compile(&mut self, ctx: &CompilationContext<'_>) -> Result<NativeRoutine, CodegenError> {
        let start = Instant::now();
        let unit = ctx.compilation_unit()?;
        let entry_name = ctx.function().name();

        Target::initialize_native(&InitializationConfig::default())
            .map_err(|e| CodegenError::Backend(format!("failed to initialise native target: {e}")))?;

        let context = self.context;
        let module = context.create_module(entry_name);
        let f64_type = context.f64_type();

        let mut functions = AHashMap::with_capacity(unit.len());
        for function in &unit {
            let params: Vec<BasicMetadataTypeEnum> =
                vec![f64_type.into(); function.params().len()];
            let fn_type = f64_type.fn_type(&params, false);
            let linkage = if function.name() == entry_name {
                Linkage::External
            } else {
                Linkage::Private
            };
            let value = module.add_function(function.name(), fn_type, Some(linkage));
            functions.insert(function.name(), value);
        }

        let builder = context.create_builder();
        for function in &unit {
            let value = functions[function.name()];
            let mut lowering = FunctionLowering {
                context,
                builder: &builder,
                f64_type,
                functions: &functions,
                function_value: value,
                params: AHashMap::new(),
                function,
            };
            lowering.define()?;
            if !value.verify(false) {
                return Err(CodegenError::Backend(format!(
                    "LLVM rejected the generated body of `{}`",
                    function.name()
                )));
            }
        }

        let engine = module
            .create_jit_execution_engine(ctx.options().opt_level.into())
            .map_err(|e| CodegenError::ModuleRegistration(e.to_string()))?;
        let address = engine
            .get_function_address(entry_name)
            .map_err(|_| CodegenError::SymbolLookup(entry_name.to_string()))?;
        let linked = unit
            .iter()
            .map(|function| function.name().to_string())
            .collect();

        debug!(
            function = entry_name,
            linked = unit.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "llvm compilation finished"
        );

        let code = LlvmCode {
            _engine: engine,
            _module: module,
        };
        // SAFETY: the entry was declared as `double()` with the C calling
        // convention and `code` keeps the engine that owns it alive.
        unsafe { NativeRoutine::from_raw(entry_name, address as *const u8, linked, Box::new(code)) }
    }
}

struct FunctionLowering<'a> {
    context: &'static LlvmContext,
    builder: &'a Builder<'static>,
    f64_type: FloatType<'static>,
    functions: &'a AHashMap<&'a str, FunctionValue<'static>>,
    function_value: FunctionValue<'static>,
    params: AHashMap<&'a str, FloatValue<'static>>,
    function: &'a FunctionDefinition,
}

impl<'a> FunctionLowering<'a> {
    fn define(&mut self) -> Result<(), CodegenError> {
        let entry = self.context.append_basic_block(self.function_value, "entry");
        self.builder.position_at_end(entry);

        let function = self.function;
        for (index, name) in function.params().iter().enumerate() {
            let param = self
                .function_value
                .get_nth_param(index as u32)
                .ok_or_else(|| CodegenError::Backend(format!("missing parameter `{name}`")))?
                .into_float_value();
            param.set_name(name);
            self.params.insert(name.as_str(), param);
        }

        let result = self.lower_expr(&function.body)?;
        self.builder.build_return(Some(&result))?;
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<FloatValue<'static>, CodegenError> {
        match expr {
            Expr::Number(value) => Ok(self.f64_type.const_float(*value)),
            Expr::Variable(name) => self.params.get(name.as_str()).copied().ok_or_else(|| {
                CodegenError::UnknownVariable {
                    function: self.function.name().to_string(),
                    name: name.clone(),
                }
            }),
            Expr::Binary { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;
                self.lower_binary(*op, lhs, rhs)
            }
            Expr::Call { callee, args } => {
                let target = *self.functions.get(callee.as_str()).ok_or_else(|| {
                    CodegenError::UnknownCallee {
                        caller: self.function.name().to_string(),
                        callee: callee.clone(),
                    }
                })?;
                let mut lowered: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(arg)?.into());
                }
                let call = self.builder.build_call(target, &lowered, "calltmp")?;
                call.try_as_basic_value()
                    .left()
                    .map(|value| value.into_float_value())
                    .ok_or_else(|| {
                        CodegenError::Backend(format!("call to `{callee}` produced no value"))
                    })
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_expr(cond)?;
                let zero = self.f64_type.const_float(0.0);
                let truthy =
                    self.builder
                        .build_float_compare(FloatPredicate::ONE, cond, zero, "ifcond")?;

                let then_bb = self.context.append_basic_block(self.function_value, "then");
                let else_bb = self.context.append_basic_block(self.function_value, "else");
                let merge_bb = self.context.append_basic_block(self.function_value, "ifcont");
                self.builder
                    .build_conditional_branch(truthy, then_bb, else_bb)?;

                self.builder.position_at_end(then_bb);
                let then_value = self.lower_expr(then_branch)?;
                self.builder.build_unconditional_branch(merge_bb)?;
                let then_end = self.current_block()?;

                self.builder.position_at_end(else_bb);
                let else_value = match else_branch {
                    Some(else_branch) => self.lower_expr(else_branch)?,
                    None => zero,
                };
                self.builder.build_unconditional_branch(merge_bb)?;
                let else_end = self.current_block()?;

                self.builder.position_at_end(merge_bb);
                let phi = self.builder.build_phi(self.f64_type, "iftmp")?;
                phi.add_incoming(&[(&then_value, then_end), (&else_value, else_end)]);
                Ok(phi.as_basic_value().into_float_value())
            }
        }
    }

    fn lower_binary(
        &self,
        op: BinaryOp,
        lhs: FloatValue<'static>,
        rhs: FloatValue<'static>,
    ) -> Result<FloatValue<'static>, CodegenError> {
        let value = match op {
            BinaryOp::Add => self.builder.build_float_add(lhs, rhs, "addtmp")?,
            BinaryOp::Sub => self.builder.build_float_sub(lhs, rhs, "subtmp")?,
            BinaryOp::Mul => self.builder.build_float_mul(lhs, rhs, "multmp")?,
            BinaryOp::Div => self.builder.build_float_div(lhs, rhs, "divtmp")?,
            BinaryOp::Lt | BinaryOp::Gt => {
                let predicate = if op == BinaryOp::Lt {
                    FloatPredicate::OLT
                } else {
                    FloatPredicate::OGT
                };
                let flag = self
                    .builder
                    .build_float_compare(predicate, lhs, rhs, "cmptmp")?;
                self.builder
                    .build_unsigned_int_to_float(flag, self.f64_type, "booltmp")?
            }
        };
        Ok(value)
    }

    fn current_block(&self) -> Result<inkwell::basic_block::BasicBlock<'static>, CodegenError> {
        self.builder
            .get_insert_block()
            .ok_or_else(|| CodegenError::Backend("builder lost its insertion point".to_string()))
    }
}
