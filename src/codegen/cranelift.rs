//! Cranelift JIT backend.
//!
//! Every compilation builds its own `JITModule`: the entry function and all
//! functions it can reach are declared first, then defined, then finalized.
//! The module is moved into the resulting [`NativeRoutine`] so the code pages
//! live exactly as long as the cache entry holding it.

use std::time::Instant;

use ahash::AHashMap;
use cranelift_codegen::ir::condcodes::FloatCC;
use cranelift_codegen::ir::{AbiParam, InstBuilder, Signature, Value, types};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use tracing::debug;

use super::{
    CodegenBackend, CodegenError, CodegenOptLevel, CompilationContext, NativeRoutine,
};
use crate::ast::{BinaryOp, Expr, FunctionDefinition};

#[derive(Debug, Default)]
pub struct CraneliftBackend;

impl CraneliftBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CodegenBackend for CraneliftBackend {
    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn compile(&mut self, ctx: &CompilationContext<'_>) -> Result<NativeRoutine, CodegenError> {
        let start = Instant::now();
        let unit = ctx.compilation_unit()?;
        let entry_name = ctx.function().name();
        let mut module = new_jit_module(ctx.options().opt_level)?;

        // Phase 1: declare everything so calls can be resolved in any order.
        let mut func_ids: AHashMap<&str, FuncId> = AHashMap::with_capacity(unit.len());
        for function in &unit {
            let signature = build_signature(&module, function.params().len());
            let linkage = if function.name() == entry_name {
                Linkage::Export
            } else {
                Linkage::Local
            };
            let id = module
                .declare_function(function.name(), linkage, &signature)
                .map_err(|e| CodegenError::ModuleRegistration(e.to_string()))?;
            func_ids.insert(function.name(), id);
        }

        // Phase 2: lower and define each body.
        let mut fb_ctx = FunctionBuilderContext::new();
        let mut cl_ctx = module.make_context();
        for function in &unit {
            cl_ctx.func.signature = build_signature(&module, function.params().len());
            {
                let mut builder = FunctionBuilder::new(&mut cl_ctx.func, &mut fb_ctx);
                let entry_block = builder.create_block();
                builder.append_block_params_for_function_params(entry_block);
                builder.switch_to_block(entry_block);
                builder.seal_block(entry_block);

                let params: AHashMap<&str, Value> = function
                    .params()
                    .iter()
                    .map(String::as_str)
                    .zip(builder.block_params(entry_block).iter().copied())
                    .collect();

                let mut lowering = FunctionLowering {
                    builder,
                    module: &mut module,
                    func_ids: &func_ids,
                    params,
                    function,
                };
                let result = lowering.lower_expr(&function.body)?;
                lowering.builder.ins().return_(&[result]);
                lowering.builder.finalize();
            }

            module
                .define_function(func_ids[function.name()], &mut cl_ctx)
                .map_err(|e| {
                    CodegenError::Backend(format!(
                        "failed to define `{}`: {e}",
                        function.name()
                    ))
                })?;
            module.clear_context(&mut cl_ctx);
        }

        // Phase 3: finalize and hand the code pages to the routine.
        module
            .finalize_definitions()
            .map_err(|e| CodegenError::ModuleRegistration(e.to_string()))?;
        let address = module.get_finalized_function(func_ids[entry_name]);
        let linked = unit
            .iter()
            .map(|function| function.name().to_string())
            .collect();

        debug!(
            function = entry_name,
            linked = unit.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "cranelift compilation finished"
        );

        // SAFETY: `address` comes from the finalized entry of `module`, which
        // was declared with no parameters and a single f64 return using the
        // ISA's default (C) calling convention; `module` owns the code pages.
        unsafe { NativeRoutine::from_raw(entry_name, address, linked, Box::new(module)) }
    }
}

fn new_jit_module(opt_level: CodegenOptLevel) -> Result<JITModule, CodegenError> {
    let mut flag_builder = settings::builder();
    let level = match opt_level {
        CodegenOptLevel::None => "none",
        CodegenOptLevel::Default => "speed",
        CodegenOptLevel::Aggressive => "speed_and_size",
    };
    for (flag, value) in [
        ("opt_level", level),
        ("use_colocated_libcalls", "false"),
        ("is_pic", "false"),
    ] {
        flag_builder
            .set(flag, value)
            .map_err(|e| CodegenError::Backend(format!("invalid setting {flag}={value}: {e}")))?;
    }

    let isa_builder = cranelift_native::builder()
        .map_err(|e| CodegenError::Backend(format!("native ISA not available: {e}")))?;
    let isa = isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| CodegenError::Backend(e.to_string()))?;

    let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    Ok(JITModule::new(builder))
}

fn build_signature(module: &JITModule, arity: usize) -> Signature {
    let mut signature = module.make_signature();
    for _ in 0..arity {
        signature.params.push(AbiParam::new(types::F64));
    }
    signature.returns.push(AbiParam::new(types::F64));
    signature
}

struct FunctionLowering<'a, 'b> {
    builder: FunctionBuilder<'b>,
    module: &'a mut JITModule,
    func_ids: &'a AHashMap<&'a str, FuncId>,
    params: AHashMap<&'a str, Value>,
    function: &'a FunctionDefinition,
}

impl FunctionLowering<'_, '_> {
    fn lower_expr(&mut self, expr: &Expr) -> Result<Value, CodegenError> {
        match expr {
            Expr::Number(value) => Ok(self.builder.ins().f64const(*value)),
            Expr::Variable(name) => {
                self.params
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| CodegenError::UnknownVariable {
                        function: self.function.name().to_string(),
                        name: name.clone(),
                    })
            }
            Expr::Binary { op, left, right } => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;
                Ok(self.lower_binary(*op, lhs, rhs))
            }
            Expr::Call { callee, args } => {
                let func_id = *self.func_ids.get(callee.as_str()).ok_or_else(|| {
                    CodegenError::UnknownCallee {
                        caller: self.function.name().to_string(),
                        callee: callee.clone(),
                    }
                })?;
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(arg)?);
                }
                let func_ref = self.module.declare_func_in_func(func_id, self.builder.func);
                let call = self.builder.ins().call(func_ref, &lowered);
                Ok(self.builder.inst_results(call)[0])
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_expr(cond)?;
                let zero = self.builder.ins().f64const(0.0);
                let truthy = self
                    .builder
                    .ins()
                    .fcmp(FloatCC::OrderedNotEqual, cond, zero);

                let then_block = self.builder.create_block();
                let else_block = self.builder.create_block();
                let merge_block = self.builder.create_block();
                self.builder.append_block_param(merge_block, types::F64);

                self.builder
                    .ins()
                    .brif(truthy, then_block, &[], else_block, &[]);

                self.builder.switch_to_block(then_block);
                self.builder.seal_block(then_block);
                let then_value = self.lower_expr(then_branch)?;
                self.builder.ins().jump(merge_block, &[then_value]);

                self.builder.switch_to_block(else_block);
                self.builder.seal_block(else_block);
                let else_value = match else_branch {
                    Some(else_branch) => self.lower_expr(else_branch)?,
                    None => self.builder.ins().f64const(0.0),
                };
                self.builder.ins().jump(merge_block, &[else_value]);

                self.builder.switch_to_block(merge_block);
                self.builder.seal_block(merge_block);
                Ok(self.builder.block_params(merge_block)[0])
            }
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        match op {
            BinaryOp::Add => self.builder.ins().fadd(lhs, rhs),
            BinaryOp::Sub => self.builder.ins().fsub(lhs, rhs),
            BinaryOp::Mul => self.builder.ins().fmul(lhs, rhs),
            BinaryOp::Div => self.builder.ins().fdiv(lhs, rhs),
            BinaryOp::Lt => {
                let flag = self.builder.ins().fcmp(FloatCC::LessThan, lhs, rhs);
                self.flag_to_f64(flag)
            }
            BinaryOp::Gt => {
                let flag = self.builder.ins().fcmp(FloatCC::GreaterThan, lhs, rhs);
                self.flag_to_f64(flag)
            }
        }
    }

    fn flag_to_f64(&mut self, flag: Value) -> Value {
        let one = self.builder.ins().f64const(1.0);
        let zero = self.builder.ins().f64const(0.0);
        self.builder.ins().select(flag, one, zero)
    }
}
