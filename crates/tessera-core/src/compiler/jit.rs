//! Cranelift JIT compilation unit.
//!
//! [`JitContext`] owns the Cranelift [`JITModule`] that holds every predicate
//! compiled through one [`CodegenContext`](super::CodegenContext), plus the
//! reusable [`FunctionBuilderContext`]. Dropping it frees the generated code.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use cranelift_codegen::ir::{types, Type};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::Module;

use super::backend::Backend;
use super::error::CompileError;
use crate::types::LogicalType;

/// Owns the JIT module and builder context for one code generation context.
///
/// Only the crate constructs or mutates a unit: replacing one that still
/// backs live predicates would free their code. Each compiled function gets
/// a unique name from a per-unit counter.
pub struct JitContext {
    module: ManuallyDrop<JITModule>,
    builder_ctx: FunctionBuilderContext,
    func_counter: u32,
    backend: Arc<Backend>,
}

// SAFETY: the module's code and data pages are owned exclusively by this
// context and only touched through `&mut self`; nothing in it is tied to the
// creating thread.
unsafe impl Send for JitContext {}

impl JitContext {
    /// Creates a compilation unit targeting `backend`'s ISA.
    pub(crate) fn new(backend: Arc<Backend>) -> Self {
        let builder = JITBuilder::with_isa(
            backend.owned_isa(),
            cranelift_module::default_libcall_names(),
        );
        Self {
            module: ManuallyDrop::new(JITModule::new(builder)),
            builder_ctx: FunctionBuilderContext::new(),
            func_counter: 0,
            backend,
        }
    }

    /// Returns a mutable reference to the underlying [`JITModule`].
    pub(crate) fn module(&mut self) -> &mut JITModule {
        &mut self.module
    }

    /// Returns a mutable reference to the shared [`FunctionBuilderContext`].
    pub(crate) fn builder_ctx(&mut self) -> &mut FunctionBuilderContext {
        &mut self.builder_ctx
    }

    /// Discards builder state left behind by an abandoned function.
    ///
    /// A `FunctionBuilder` dropped before `finalize` leaves its block and
    /// variable tables in the context; the next builder requires them empty.
    pub(crate) fn reset_builder_ctx(&mut self) {
        self.builder_ctx = FunctionBuilderContext::new();
    }

    /// Returns the target ISA.
    pub fn isa(&self) -> &dyn TargetIsa {
        self.module.isa()
    }

    /// Returns the backend this unit generates code for.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Returns the native pointer type of the target.
    pub fn pointer_type(&self) -> Type {
        self.module.target_config().pointer_type()
    }

    /// Maps a logical type to its Cranelift value type.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnsupportedExpr`] for a width with no
    /// Cranelift integer type.
    pub fn native_type(ty: LogicalType) -> Result<Type, CompileError> {
        let native = ty.native_type();
        if !native.is_integer {
            return Ok(types::F64);
        }
        u16::try_from(native.bits)
            .ok()
            .and_then(Type::int)
            .ok_or_else(|| CompileError::UnsupportedExpr(format!("{}-bit integer", native.bits)))
    }

    /// Generates a unique function name with the given prefix.
    pub(crate) fn next_func_name(&mut self, prefix: &str) -> String {
        let id = self.func_counter;
        self.func_counter += 1;
        format!("{prefix}_{id}")
    }

    /// Returns the number of functions named so far.
    pub fn function_count(&self) -> u32 {
        self.func_counter
    }
}

impl Drop for JitContext {
    fn drop(&mut self) {
        // SAFETY: the module is taken exactly once, here. Every
        // `CompiledPredicate` borrows the owning `CodegenContext`, so no
        // function pointer into this memory outlives it.
        unsafe {
            let module = ManuallyDrop::take(&mut self.module);
            module.free_memory();
        }
    }
}

impl std::fmt::Debug for JitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitContext")
            .field("backend", &self.backend)
            .field("functions", &self.func_counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> JitContext {
        JitContext::new(Backend::host().unwrap())
    }

    #[test]
    fn jit_context_targets_backend_isa() {
        let ctx = ctx();
        assert_eq!(ctx.isa().triple().to_string(), ctx.backend().triple());
    }

    #[test]
    fn unique_func_names() {
        let mut ctx = ctx();
        assert_eq!(ctx.next_func_name("predicate"), "predicate_0");
        assert_eq!(ctx.next_func_name("predicate"), "predicate_1");
        assert_eq!(ctx.next_func_name("scan"), "scan_2");
        assert_eq!(ctx.function_count(), 3);
    }

    #[test]
    fn native_types_follow_logical_widths() {
        assert_eq!(JitContext::native_type(LogicalType::TinyInt).unwrap(), types::I8);
        assert_eq!(JitContext::native_type(LogicalType::Boolean).unwrap(), types::I8);
        assert_eq!(JitContext::native_type(LogicalType::SmallInt).unwrap(), types::I16);
        assert_eq!(JitContext::native_type(LogicalType::Integer).unwrap(), types::I32);
        assert_eq!(JitContext::native_type(LogicalType::BigInt).unwrap(), types::I64);
        assert_eq!(JitContext::native_type(LogicalType::Timestamp).unwrap(), types::I64);
        assert_eq!(JitContext::native_type(LogicalType::Double).unwrap(), types::F64);
    }

    #[test]
    fn pointer_type_matches_host() {
        let ctx = ctx();
        assert_eq!(ctx.pointer_type().bytes() as usize, std::mem::size_of::<usize>());
    }

    #[test]
    fn empty_context_drops_cleanly() {
        let mut ctx = ctx();
        let _ = ctx.module();
        let _ = ctx.builder_ctx();
        drop(ctx);
    }
}
