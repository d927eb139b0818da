//! Lowering of predicate trees to Cranelift IR.
//!
//! [`CodeEmitter`] walks an [`Expr`] bottom-up and emits straight-line IR per
//! node into the function being built, returning a [`CgValue`] for each.
//! Generated code reads tuple fields with loads at the offsets precomputed by
//! [`TupleLayout`](crate::tuple::TupleLayout); there are no calls.
//!
//! # Null Handling
//!
//! NULL is in-band: every integer width reserves its minimum value (see
//! [`crate::types`]). Each [`CgValue`] carries a compile-time `may_be_null`
//! flag, so sentinel tests are only emitted for values that can actually
//! hold one. Boolean results are `i8` in {0, 1, `i8::MIN`}; boolean bytes
//! loaded from memory are canonicalized first, any nonzero byte other than
//! the sentinel being TRUE.
//!
//! - Comparison: each nullable side branches to a merge block carrying NULL;
//!   otherwise both sides are sign-extended to the wider width, compared
//!   signed, and the result jumps to the same merge block.
//! - `AND` / `OR`: both operands are evaluated, then a decision tree picks the
//!   decisive value (FALSE for `AND`, TRUE for `OR`) if either operand holds
//!   it, else NULL if either is NULL, else the non-decisive value.
//! - `IS NULL`: constant FALSE for non-nullable operands.
//!
//! # Not Lowered
//!
//! `LIKE`, `IN` and `DOUBLE` operands return an unsupported [`CompileError`];
//! the caller interprets those predicates instead.

use std::cmp::Ordering;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types::I8;
use cranelift_codegen::ir::{BlockArg, InstBuilder, MemFlags, Type, Value};
use cranelift_frontend::FunctionBuilder;

use super::error::CompileError;
use super::jit::JitContext;
use crate::expr::{CompareOp, ConjunctionKind, Expr, ParamRef};
use crate::tuple::TupleSchema;
use crate::types::{LogicalType, Value as Scalar, BOOL_FALSE, BOOL_NULL, BOOL_TRUE};

/// An emitted SSA value plus what the compiler knows about it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CgValue {
    /// The SSA value in Cranelift IR.
    pub(crate) value: Value,
    /// Whether the value can hold its type's null sentinel at run time.
    pub(crate) may_be_null: bool,
    /// The value's logical type.
    pub(crate) logical_type: LogicalType,
}

/// Emits IR for predicate trees into one function.
pub(crate) struct CodeEmitter<'a, 'f> {
    builder: &'a mut FunctionBuilder<'f>,
    schema: &'a TupleSchema,
    tuple_ptr: Value,
    ptr_type: Type,
}

impl<'a, 'f> CodeEmitter<'a, 'f> {
    /// Creates an emitter writing at the builder's current block.
    ///
    /// `tuple_ptr` is the SSA value holding the tuple base address.
    pub(crate) fn new(
        builder: &'a mut FunctionBuilder<'f>,
        schema: &'a TupleSchema,
        tuple_ptr: Value,
        ptr_type: Type,
    ) -> Self {
        Self {
            builder,
            schema,
            tuple_ptr,
            ptr_type,
        }
    }

    /// Emits IR computing `expr`.
    ///
    /// On return the builder is positioned in the block where the result is
    /// available.
    ///
    /// # Errors
    ///
    /// Returns an unsupported [`CompileError`] for constructs with no
    /// lowering. The partially built function must then be discarded.
    pub(crate) fn emit(&mut self, expr: &Expr) -> Result<CgValue, CompileError> {
        match expr {
            Expr::Column(c) => self.emit_column(c.index),
            Expr::Param(p) => self.emit_param(p),
            Expr::Constant(v) => self.emit_constant(*v),
            Expr::IsNull(inner) => self.emit_is_null(inner),
            Expr::Not(inner) => self.emit_not(inner),
            Expr::Comparison { op, left, right } => {
                self.emit_comparison(expr, *op, left, right)
            }
            Expr::Conjunction { kind, left, right } => {
                self.emit_conjunction(*kind, left, right)
            }
        }
    }

    fn emit_column(&mut self, index: usize) -> Result<CgValue, CompileError> {
        let (info, offset) = match (
            self.schema.column(index),
            self.schema.layout().field_offset(index),
        ) {
            (Some(info), Some(offset)) => (*info, offset),
            _ => {
                return Err(CompileError::ColumnOutOfRange {
                    index,
                    count: self.schema.column_count(),
                })
            }
        };
        let ty = integer_type(info.logical_type)?;
        let offset = i32::try_from(offset)
            .map_err(|_| CompileError::UnsupportedExpr(format!("field offset {offset}")))?;
        let value = self
            .builder
            .ins()
            .load(ty, tuple_flags(), self.tuple_ptr, offset);
        self.loaded(value, info.allow_null, info.logical_type)
    }

    fn emit_param(&mut self, param: &ParamRef) -> Result<CgValue, CompileError> {
        let address = param
            .address()
            .ok_or_else(|| CompileError::ParamOutOfRange {
                index: param.index(),
                count: param.slots().len(),
            })?;
        let ty = integer_type(param.logical_type())?;
        #[allow(clippy::cast_possible_wrap)]
        let base = self.iconst(self.ptr_type, address as i64);
        let mut flags = MemFlags::new();
        flags.set_notrap();
        let value = self.builder.ins().load(ty, flags, base, 0);
        self.loaded(value, true, param.logical_type())
    }

    /// Wraps a value loaded from memory. Boolean bytes are canonicalized to
    /// 0 / 1 (any nonzero byte is TRUE), keeping the sentinel if nullable.
    fn loaded(
        &mut self,
        raw: Value,
        may_be_null: bool,
        logical_type: LogicalType,
    ) -> Result<CgValue, CompileError> {
        let value = if logical_type == LogicalType::Boolean {
            let zero = self.iconst(I8, i64::from(BOOL_FALSE));
            let truth = self.builder.ins().icmp(IntCC::NotEqual, raw, zero);
            if may_be_null {
                let is_null = self.null_flag(&boolean(raw, true))?;
                self.builder.ins().select(is_null, raw, truth)
            } else {
                truth
            }
        } else {
            raw
        };
        Ok(CgValue {
            value,
            may_be_null,
            logical_type,
        })
    }

    fn emit_constant(&mut self, constant: Scalar) -> Result<CgValue, CompileError> {
        let logical_type = constant.logical_type();
        let ty = integer_type(logical_type)?;
        let raw = constant.to_native_int()?;
        Ok(CgValue {
            value: self.iconst(ty, raw),
            may_be_null: constant.is_null(),
            logical_type,
        })
    }

    fn emit_is_null(&mut self, inner: &Expr) -> Result<CgValue, CompileError> {
        let operand = self.emit(inner)?;
        let value = if operand.may_be_null {
            self.null_flag(&operand)?
        } else {
            self.iconst(I8, i64::from(BOOL_FALSE))
        };
        Ok(boolean(value, false))
    }

    fn emit_not(&mut self, inner: &Expr) -> Result<CgValue, CompileError> {
        let operand = expect_boolean(self.emit(inner)?)?;
        let one = self.iconst(I8, i64::from(BOOL_TRUE));
        let flipped = self.builder.ins().bxor(operand.value, one);
        let value = if operand.may_be_null {
            let is_null = self.null_flag(&operand)?;
            self.builder.ins().select(is_null, operand.value, flipped)
        } else {
            flipped
        };
        Ok(boolean(value, operand.may_be_null))
    }

    fn emit_comparison(
        &mut self,
        expr: &Expr,
        op: CompareOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<CgValue, CompileError> {
        let Some(cc) = int_cc(op) else {
            return Err(CompileError::UnsupportedExpr(expr.to_string()));
        };
        let lhs = self.emit(left)?;
        let rhs = self.emit(right)?;
        let may_be_null = lhs.may_be_null || rhs.may_be_null;

        let merge = if may_be_null {
            let merge = self.builder.create_block();
            self.builder.append_block_param(merge, I8);
            let null = self.iconst(I8, i64::from(BOOL_NULL));
            for side in [&lhs, &rhs] {
                if !side.may_be_null {
                    continue;
                }
                let is_null = self.null_flag(side)?;
                let next = self.builder.create_block();
                self.builder
                    .ins()
                    .brif(is_null, merge, &[BlockArg::Value(null)], next, &[]);
                self.builder.switch_to_block(next);
                self.builder.seal_block(next);
            }
            Some(merge)
        } else {
            None
        };

        let (l, r) = self.widen(&lhs, &rhs);
        let result = self.builder.ins().icmp(cc, l, r);

        let value = match merge {
            Some(merge) => {
                self.builder
                    .ins()
                    .jump(merge, &[BlockArg::Value(result)]);
                self.builder.switch_to_block(merge);
                self.builder.seal_block(merge);
                self.builder.block_params(merge)[0]
            }
            None => result,
        };
        Ok(boolean(value, may_be_null))
    }

    fn emit_conjunction(
        &mut self,
        kind: ConjunctionKind,
        left: &Expr,
        right: &Expr,
    ) -> Result<CgValue, CompileError> {
        let lhs = expect_boolean(self.emit(left)?)?;
        let rhs = expect_boolean(self.emit(right)?)?;
        let may_be_null = lhs.may_be_null || rhs.may_be_null;

        if !may_be_null {
            let value = match kind {
                ConjunctionKind::And => self.builder.ins().band(lhs.value, rhs.value),
                ConjunctionKind::Or => self.builder.ins().bor(lhs.value, rhs.value),
            };
            return Ok(boolean(value, false));
        }

        let (decisive, otherwise) = match kind {
            ConjunctionKind::And => (BOOL_FALSE, BOOL_TRUE),
            ConjunctionKind::Or => (BOOL_TRUE, BOOL_FALSE),
        };
        let merge = self.builder.create_block();
        self.builder.append_block_param(merge, I8);
        let check_rhs = self.builder.create_block();
        let undecided = self.builder.create_block();

        let decisive = self.iconst(I8, i64::from(decisive));
        let lhs_decides = self.builder.ins().icmp(IntCC::Equal, lhs.value, decisive);
        self.builder.ins().brif(
            lhs_decides,
            merge,
            &[BlockArg::Value(decisive)],
            check_rhs,
            &[],
        );

        self.builder.switch_to_block(check_rhs);
        self.builder.seal_block(check_rhs);
        let rhs_decides = self.builder.ins().icmp(IntCC::Equal, rhs.value, decisive);
        self.builder.ins().brif(
            rhs_decides,
            merge,
            &[BlockArg::Value(decisive)],
            undecided,
            &[],
        );

        self.builder.switch_to_block(undecided);
        self.builder.seal_block(undecided);
        let mut either_null: Option<Value> = None;
        for side in [&lhs, &rhs] {
            if !side.may_be_null {
                continue;
            }
            let flag = self.null_flag(side)?;
            either_null = Some(match either_null {
                Some(acc) => self.builder.ins().bor(acc, flag),
                None => flag,
            });
        }
        let otherwise = self.iconst(I8, i64::from(otherwise));
        let value = match either_null {
            Some(is_null) => {
                let null = self.iconst(I8, i64::from(BOOL_NULL));
                self.builder.ins().select(is_null, null, otherwise)
            }
            None => otherwise,
        };
        self.builder.ins().jump(merge, &[BlockArg::Value(value)]);

        self.builder.switch_to_block(merge);
        self.builder.seal_block(merge);
        Ok(boolean(self.builder.block_params(merge)[0], true))
    }

    /// Emits `operand == null_sentinel(operand)` as an `i8` 0/1.
    fn null_flag(&mut self, operand: &CgValue) -> Result<Value, CompileError> {
        let sentinel = operand.logical_type.null_sentinel()?;
        let ty = self.builder.func.dfg.value_type(operand.value);
        let sentinel = self.iconst(ty, sentinel);
        Ok(self
            .builder
            .ins()
            .icmp(IntCC::Equal, operand.value, sentinel))
    }

    /// Sign-extends the narrower operand to the wider operand's width.
    fn widen(&mut self, lhs: &CgValue, rhs: &CgValue) -> (Value, Value) {
        let lt = self.builder.func.dfg.value_type(lhs.value);
        let rt = self.builder.func.dfg.value_type(rhs.value);
        match lt.bits().cmp(&rt.bits()) {
            Ordering::Less => (self.builder.ins().sextend(rt, lhs.value), rhs.value),
            Ordering::Greater => (lhs.value, self.builder.ins().sextend(lt, rhs.value)),
            Ordering::Equal => (lhs.value, rhs.value),
        }
    }

    /// Emits an integer constant from its signed value.
    fn iconst(&mut self, ty: Type, raw: i64) -> Value {
        // Narrow immediates are zero-extended bit patterns.
        let bits = ty.bits();
        let imm = if bits >= 64 {
            raw
        } else {
            raw & ((1_i64 << bits) - 1)
        };
        self.builder.ins().iconst(ty, imm)
    }
}

fn boolean(value: Value, may_be_null: bool) -> CgValue {
    CgValue {
        value,
        may_be_null,
        logical_type: LogicalType::Boolean,
    }
}

fn expect_boolean(value: CgValue) -> Result<CgValue, CompileError> {
    if value.logical_type == LogicalType::Boolean {
        Ok(value)
    } else {
        Err(CompileError::UnsupportedType(value.logical_type))
    }
}

fn integer_type(ty: LogicalType) -> Result<Type, CompileError> {
    if !ty.is_integer() {
        return Err(CompileError::UnsupportedType(ty));
    }
    JitContext::native_type(ty)
}

fn int_cc(op: CompareOp) -> Option<IntCC> {
    match op {
        CompareOp::Eq => Some(IntCC::Equal),
        CompareOp::Ne => Some(IntCC::NotEqual),
        CompareOp::Lt => Some(IntCC::SignedLessThan),
        CompareOp::Gt => Some(IntCC::SignedGreaterThan),
        CompareOp::Le => Some(IntCC::SignedLessThanOrEqual),
        CompareOp::Ge => Some(IntCC::SignedGreaterThanOrEqual),
        CompareOp::Like | CompareOp::In => None,
    }
}

/// Flags for tuple loads: the buffer is valid and unchanged for the call.
fn tuple_flags() -> MemFlags {
    let mut flags = MemFlags::new();
    flags.set_notrap();
    flags.set_readonly();
    flags
}
