//! Optimization pass sequence run on every verified predicate.
//!
//! The order is fixed, and mirrors the mid-end of Cranelift's own
//! `Context::optimize`:
//!
//! 1. CFG simplification: unreachable blocks and constant block parameters
//!    are removed,
//! 2. alias analysis: redundant tuple and parameter loads are replaced by the
//!    first load of the same address,
//! 3. e-graph rewriting: instruction combining, reassociation and global
//!    value numbering in one saturation pass. Elaboration only re-emits pure
//!    values something still uses, so dead instructions go here too.

use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::Context;

use super::error::CompileError;

/// Runs the pass sequence over `ctx.func` in place.
///
/// # Errors
///
/// Returns [`CompileError::Codegen`] if a pass reports an internal error.
pub(crate) fn optimize(ctx: &mut Context, isa: &dyn TargetIsa) -> Result<(), CompileError> {
    ctx.compute_cfg();
    ctx.compute_domtree();
    ctx.eliminate_unreachable_code(isa)?;
    ctx.remove_constant_phis(isa)?;
    ctx.func.dfg.resolve_all_aliases();

    ctx.compute_domtree();
    ctx.replace_redundant_loads()?;
    ctx.func.dfg.resolve_all_aliases();

    ctx.egraph_pass(isa, &mut ControlPlane::default())?;
    Ok(())
}
