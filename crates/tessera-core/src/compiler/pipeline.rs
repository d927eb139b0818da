//! Compilation pipeline: predicate tree to callable native function.
//!
//! [`compile_predicate`] runs the phases in order, timing each:
//!
//! 1. fold constants and build a fresh `(ptr) -> i8` function shell,
//! 2. emit IR for the tree ([`CodeEmitter`]); on an unsupported construct the
//!    function is discarded and the unit's builder state reset,
//! 3. return the root value,
//! 4. verify the function structurally ([`VerifierPolicy`] decides whether a
//!    failure panics or falls back),
//! 5. optimize ([`passes::optimize`]),
//! 6. declare, define and finalize it in the module, yielding the entry point.
//!
//! Nothing is declared in the module before step 6, so a failure in the
//! earlier steps leaves no trace in the compilation unit. If definition fails
//! in step 6 the Cranelift context is cleared all the same; the declared name
//! stays behind unused, since names are never reused within a unit.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cranelift_codegen::ir::types::I8;
use cranelift_codegen::ir::{AbiParam, Function, InstBuilder, UserFuncName};
use cranelift_codegen::{verify_function, Context};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{FuncId, Linkage, Module};
use tracing::Level;

use super::config::{CodegenConfig, VerifierPolicy};
use super::context::CodegenContext;
use super::emit::CodeEmitter;
use super::error::{CompileError, PredicateFn};
use super::fold::fold_constants;
use super::jit::JitContext;
use super::passes;
use crate::expr::Expr;
use crate::params::ParamSlots;
use crate::tuple::{Tuple, TupleSchema};
use crate::types::{LogicalType, TriBool};

/// Wall-clock time spent in each pipeline phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Folding, function shell and IR emission.
    pub emit: Duration,
    /// Structural verification.
    pub verify: Duration,
    /// Optimization passes (zero when disabled).
    pub optimize: Duration,
    /// Module definition, native code generation and finalization.
    pub finalize: Duration,
}

impl PhaseTimings {
    /// Returns the sum of all phases.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.emit + self.verify + self.optimize + self.finalize
    }
}

/// Output of a successful pipeline run.
pub(crate) struct PredicateCode {
    pub(crate) func: PredicateFn,
    pub(crate) name: String,
    pub(crate) timings: PhaseTimings,
}

/// Compiles one predicate into `jit`.
///
/// # Errors
///
/// Returns an unsupported [`CompileError`] for constructs with no native
/// lowering, [`CompileError::Verification`] under
/// [`VerifierPolicy::Fallback`], or a Cranelift error.
///
/// # Panics
///
/// Panics on a verification failure under [`VerifierPolicy::Panic`].
pub(crate) fn compile_predicate(
    jit: &mut JitContext,
    config: &CodegenConfig,
    schema: &TupleSchema,
    expr: &Expr,
) -> Result<PredicateCode, CompileError> {
    let name = jit.next_func_name("predicate");
    let started = Instant::now();
    let folded = fold_constants(schema, expr);
    let func = build_function(jit, &name, schema, &folded)?;
    finish_function(jit, config, &name, func, started.elapsed())
}

/// Builds the IR for `expr` in a fresh function.
pub(crate) fn build_function(
    jit: &mut JitContext,
    name: &str,
    schema: &TupleSchema,
    expr: &Expr,
) -> Result<Function, CompileError> {
    let ptr_type = jit.pointer_type();
    let mut sig = jit.module().make_signature();
    sig.params.push(AbiParam::new(ptr_type));
    sig.returns.push(AbiParam::new(I8));
    let mut func = Function::with_name_signature(UserFuncName::testcase(name), sig);

    let emitted = {
        let mut builder = FunctionBuilder::new(&mut func, jit.builder_ctx());
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let tuple_ptr = builder.block_params(entry)[0];

        match CodeEmitter::new(&mut builder, schema, tuple_ptr, ptr_type).emit(expr) {
            Ok(root) if root.logical_type == LogicalType::Boolean => {
                builder.ins().return_(&[root.value]);
                builder.finalize();
                Ok(())
            }
            Ok(root) => Err(CompileError::UnsupportedType(root.logical_type)),
            Err(e) => Err(e),
        }
    };

    if let Err(e) = emitted {
        jit.reset_builder_ctx();
        return Err(e);
    }
    Ok(func)
}

/// Verifies, optimizes and links a built function.
pub(crate) fn finish_function(
    jit: &mut JitContext,
    config: &CodegenConfig,
    name: &str,
    func: Function,
    emit: Duration,
) -> Result<PredicateCode, CompileError> {
    let mut timings = PhaseTimings {
        emit,
        ..PhaseTimings::default()
    };
    let dump = config.dump_ir && tracing::enabled!(Level::TRACE);
    if dump {
        tracing::trace!(predicate = name, ir = %func.display(), "emitted IR");
    }

    let started = Instant::now();
    if let Err(errors) = verify_function(&func, jit.isa()) {
        let errors = errors.to_string();
        tracing::error!(predicate = name, %errors, "generated predicate failed verification");
        if config.verifier == VerifierPolicy::Panic {
            panic!("predicate {name} failed IR verification:\n{errors}");
        }
        return Err(CompileError::Verification(errors));
    }
    timings.verify = started.elapsed();

    let mut ctx = Context::for_function(func);
    if config.optimize {
        let started = Instant::now();
        passes::optimize(&mut ctx, jit.isa())?;
        timings.optimize = started.elapsed();
        if dump {
            tracing::trace!(predicate = name, ir = %ctx.func.display(), "optimized IR");
        }
    }

    let started = Instant::now();
    let func_id = define(jit, name, &mut ctx)?;
    jit.module().finalize_definitions()?;
    let code = jit.module().get_finalized_function(func_id);
    timings.finalize = started.elapsed();

    // SAFETY: the function was declared as `(ptr) -> i8` with the module's
    // default (host C) calling convention.
    let func = unsafe { std::mem::transmute::<*const u8, PredicateFn>(code) };
    Ok(PredicateCode {
        func,
        name: name.to_owned(),
        timings,
    })
}

/// Declares and defines `ctx`'s function, clearing `ctx` whether or not
/// definition succeeds.
fn define(jit: &mut JitContext, name: &str, ctx: &mut Context) -> Result<FuncId, CompileError> {
    let sig = ctx.func.signature.clone();
    let func_id = jit.module().declare_function(name, Linkage::Export, &sig)?;
    let defined = jit.module().define_function(func_id, ctx);
    jit.module().clear_context(ctx);
    defined?;
    Ok(func_id)
}

/// A native predicate, valid while its [`CodegenContext`] is alive.
///
/// Holds the parameter slot arrays the generated code reads by address.
#[derive(Clone)]
pub struct CompiledPredicate<'ctx> {
    func: PredicateFn,
    name: String,
    tuple_length: usize,
    _params: Vec<Arc<ParamSlots>>,
    timings: PhaseTimings,
    _context: PhantomData<&'ctx CodegenContext>,
}

impl CompiledPredicate<'_> {
    pub(crate) fn new(code: PredicateCode, tuple_length: usize, params: Vec<Arc<ParamSlots>>) -> Self {
        Self {
            func: code.func,
            name: code.name,
            tuple_length,
            _params: params,
            timings: code.timings,
            _context: PhantomData,
        }
    }

    /// Evaluates the predicate against one tuple.
    ///
    /// # Panics
    ///
    /// Panics if the tuple buffer is shorter than the schema the predicate
    /// was compiled for.
    #[inline]
    #[must_use]
    pub fn evaluate(&self, tuple: &Tuple<'_>) -> TriBool {
        let data = tuple.data();
        assert!(
            data.len() >= self.tuple_length,
            "tuple of {} bytes passed to predicate {} compiled for {} bytes",
            data.len(),
            self.name,
            self.tuple_length
        );
        // SAFETY: the buffer covers every field offset the code loads, the
        // parameter slots are held by `self`, and the code lives for `'ctx`.
        let raw = unsafe { (self.func)(data.as_ptr()) };
        TriBool::from_raw(raw)
    }

    /// Calls the native function on a raw tuple pointer.
    ///
    /// # Safety
    ///
    /// `tuple` must point to at least [`tuple_length`](Self::tuple_length)
    /// readable bytes laid out by the compiled schema.
    #[inline]
    pub unsafe fn call(&self, tuple: *const u8) -> i8 {
        // SAFETY: upheld by the caller.
        unsafe { (self.func)(tuple) }
    }

    /// Returns the compiled function pointer.
    #[must_use]
    pub fn as_raw(&self) -> PredicateFn {
        self.func
    }

    /// Returns the module symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the minimum tuple buffer length.
    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    /// Returns per-phase compilation times.
    #[must_use]
    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }
}

impl fmt::Debug for CompiledPredicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPredicate")
            .field("name", &self.name)
            .field("tuple_length", &self.tuple_length)
            .field("func", &"<native fn>")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use cranelift_codegen::ir::types::I32;
    use cranelift_codegen::ir::Signature;
    use cranelift_frontend::FunctionBuilderContext;

    use super::*;
    use crate::compiler::backend::Backend;
    use crate::expr::{col, lit};
    use crate::tuple::MutableTuple;
    use crate::types::Value;

    fn jit() -> JitContext {
        JitContext::new(Backend::host().unwrap())
    }

    fn schema() -> TupleSchema {
        TupleSchema::packed([(LogicalType::Integer, true), (LogicalType::BigInt, false)])
    }

    fn call(code: &PredicateCode, schema: &TupleSchema, a: Value, b: Value) -> TriBool {
        let arena = Bump::new();
        let mut t = MutableTuple::new_in(&arena, schema);
        t.set(0, a).unwrap();
        t.set(1, b).unwrap();
        let t = t.freeze();
        TriBool::from_raw(unsafe { (code.func)(t.data().as_ptr()) })
    }

    /// A function whose return value is `i32` but whose signature says `i8`.
    fn ill_typed(jit: &mut JitContext, name: &str) -> Function {
        let mut sig: Signature = jit.module().make_signature();
        sig.params.push(AbiParam::new(jit.pointer_type()));
        sig.returns.push(AbiParam::new(I8));
        let mut func = Function::with_name_signature(UserFuncName::testcase(name), sig);
        let mut fctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut func, &mut fctx);
        let entry = b.create_block();
        b.append_block_params_for_function_params(entry);
        b.switch_to_block(entry);
        b.seal_block(entry);
        let v = b.ins().iconst(I32, 0);
        b.ins().return_(&[v]);
        b.finalize();
        func
    }

    #[test]
    fn compiles_and_runs() {
        let mut jit = jit();
        let s = schema();
        let config = CodegenConfig::default();
        let code = compile_predicate(&mut jit, &config, &s, &col(1).gt(lit(10_i64))).unwrap();
        assert_eq!(code.name, "predicate_0");
        let n = Value::Null(LogicalType::Integer);
        assert_eq!(call(&code, &s, n, Value::BigInt(11)), TriBool::True);
        assert_eq!(call(&code, &s, n, Value::BigInt(10)), TriBool::False);
    }

    #[test]
    fn unoptimized_pipeline_agrees() {
        let mut jit = jit();
        let s = schema();
        let e = col(0).lt(lit(0_i32)).or(col(1).eq(lit(7_i64)));
        let fast = compile_predicate(&mut jit, &CodegenConfig::default(), &s, &e).unwrap();
        let plain = compile_predicate(
            &mut jit,
            &CodegenConfig::default().with_optimize(false),
            &s,
            &e,
        )
        .unwrap();
        assert_eq!(plain.timings.optimize, Duration::ZERO);
        for a in [Value::Null(LogicalType::Integer), Value::Integer(-1), Value::Integer(1)] {
            for b in [Value::BigInt(7), Value::BigInt(8)] {
                assert_eq!(call(&fast, &s, a, b), call(&plain, &s, a, b));
            }
        }
    }

    #[test]
    fn unsupported_leaves_unit_clean() {
        let mut jit = jit();
        let s = schema();
        let config = CodegenConfig::default();
        let err = compile_predicate(&mut jit, &config, &s, &col(1).like(lit(1_i64)))
            .err()
            .unwrap();
        assert!(err.is_unsupported());
        assert_eq!(jit.module().declarations().get_functions().count(), 0);

        // The builder context was reset, so the next compile succeeds.
        let code = compile_predicate(&mut jit, &config, &s, &col(0).is_null()).unwrap();
        assert_eq!(
            call(&code, &s, Value::Null(LogicalType::Integer), Value::BigInt(0)),
            TriBool::True
        );
        assert_eq!(jit.module().declarations().get_functions().count(), 1);
    }

    #[test]
    fn non_boolean_root_is_unsupported() {
        let mut jit = jit();
        let err = compile_predicate(&mut jit, &CodegenConfig::default(), &schema(), &col(1))
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::UnsupportedType(LogicalType::BigInt)));
    }

    #[test]
    fn verification_failure_falls_back() {
        let mut jit = jit();
        let config = CodegenConfig::default().with_verifier(VerifierPolicy::Fallback);
        let func = ill_typed(&mut jit, "bad");
        let err = finish_function(&mut jit, &config, "bad", func, Duration::ZERO)
            .err()
            .unwrap();
        assert!(matches!(err, CompileError::Verification(_)));
        assert!(!err.is_unsupported());
        assert_eq!(jit.module().declarations().get_functions().count(), 0);
    }

    #[test]
    fn failed_definition_clears_context() {
        let mut jit = jit();
        let s = schema();
        let func = build_function(&mut jit, "twice", &s, &col(0).is_null()).unwrap();
        let mut ctx = Context::for_function(func.clone());
        define(&mut jit, "twice", &mut ctx).unwrap();

        let mut ctx = Context::for_function(func);
        let err = define(&mut jit, "twice", &mut ctx).unwrap_err();
        assert!(matches!(err, CompileError::Cranelift(_)));
        assert!(ctx.func.layout.entry_block().is_none());
        assert!(ctx.compiled_code().is_none());

        // The unit is still usable after the failed definition.
        let config = CodegenConfig::default();
        let code = compile_predicate(&mut jit, &config, &s, &col(1).eq(lit(3_i64))).unwrap();
        assert_eq!(
            call(&code, &s, Value::Integer(0), Value::BigInt(3)),
            TriBool::True
        );
    }

    #[test]
    #[should_panic(expected = "failed IR verification")]
    fn verification_failure_panics_by_policy() {
        let mut jit = jit();
        let config = CodegenConfig::default().with_verifier(VerifierPolicy::Panic);
        let func = ill_typed(&mut jit, "bad");
        let _ = finish_function(&mut jit, &config, "bad", func, Duration::ZERO);
    }

    #[test]
    fn timings_sum() {
        let t = PhaseTimings {
            emit: Duration::from_micros(1),
            verify: Duration::from_micros(2),
            optimize: Duration::from_micros(3),
            finalize: Duration::from_micros(4),
        };
        assert_eq!(t.total(), Duration::from_micros(10));
    }
}
