//! The five runtime safety assertions: bounds, slice-bounds, channel-make
//! size, nil, and negative-shift checks.
//!
//! Every check here is built on `FunctionBuilder::create_runtime_assert`,
//! the shared block-splitting primitive that is the only writer of
//! `block_exits`. None of these functions ever touch `block_exits`
//! directly.

use inkwell::values::IntValue;
use inkwell::IntPredicate;

use crate::builder::FunctionBuilder;
use crate::context::CompileContext;
use crate::error::{ChanElementTooBig, CodegenError, SourcePos};
use crate::runtime::call_runtime;
use crate::ssa::{TypedValue, ValueOrigin};

/// Widens the narrower of two integer values to the other's bit width,
/// sign-extending if `signed` else zero-extending. Widening always follows
/// the *index*'s signedness, never the length's — arrays, slices, and
/// strings always carry an unsigned length.
fn widen_to_common_width<'ctx>(
    ctx: &CompileContext<'ctx>,
    a: IntValue<'ctx>,
    b: IntValue<'ctx>,
    signed: bool,
) -> (IntValue<'ctx>, IntValue<'ctx>) {
    let a_width = a.get_type().get_bit_width();
    let b_width = b.get_type().get_bit_width();
    if a_width == b_width {
        return (a, b);
    }
    let wider = if a_width > b_width { a.get_type() } else { b.get_type() };
    let widen = |v: IntValue<'ctx>| -> IntValue<'ctx> {
        if v.get_type().get_bit_width() == wider.get_bit_width() {
            return v;
        }
        if signed {
            ctx.builder
                .build_int_s_extend(v, wider, "assert.sext")
                .expect("sign-extend insertion failed")
        } else {
            ctx.builder
                .build_int_z_extend(v, wider, "assert.zext")
                .expect("zero-extend insertion failed")
        }
    };
    (widen(a), widen(b))
}

/// Indexed lookup bounds check. Panics via `runtime.lookupPanic` when
/// `index >= length` under the index's own signedness: a negative signed
/// index compares as "huge" once zero/sign-extended consistently, so a
/// single unsigned `>=` after widening catches both the negative-index and
/// the too-large-index cases at once, with no separate sign check needed.
pub fn create_lookup_bounds_check<'ctx>(
    fb: &mut FunctionBuilder<'ctx>,
    ctx: &CompileContext<'ctx>,
    index: IntValue<'ctx>,
    index_signed: bool,
    length: IntValue<'ctx>,
) {
    if fb.nobounds {
        return;
    }
    let (index, length) = widen_to_common_width(ctx, index, length, index_signed);
    let out_of_bounds = ctx
        .builder
        .build_int_compare(IntPredicate::UGE, index, length, "bounds.cmp")
        .expect("compare insertion failed");
    fb.create_runtime_assert(ctx, "lookup.bounds", out_of_bounds, |ctx, builder| {
        call_runtime(builder, ctx.ptr_type(), ctx.runtime.lookup_panic, &[]);
    });
}

/// Slice-bounds check, used for both sub-slicing and slice construction.
/// Panics via `runtime.slicePanic` when any of `low > high`, `high > max`,
/// or `max > capacity` holds: three unsigned-greater-than comparisons OR'd
/// into a single combined branch rather than three separate ones. `low`,
/// `high`, and `max` are widened sign- or zero-extending per their own
/// source type's signedness; `capacity` is always zero-extended — a slice
/// or array length is never negative.
pub fn create_slice_bounds_check<'ctx>(
    fb: &mut FunctionBuilder<'ctx>,
    ctx: &CompileContext<'ctx>,
    low: IntValue<'ctx>,
    low_signed: bool,
    high: IntValue<'ctx>,
    high_signed: bool,
    max: IntValue<'ctx>,
    max_signed: bool,
    capacity: IntValue<'ctx>,
) {
    if fb.nobounds {
        return;
    }
    let widest = [low, high, max, capacity]
        .iter()
        .map(|v| v.get_type().get_bit_width())
        .max()
        .expect("four values always yield a max width");
    let wide_type = ctx.context.custom_width_int_type(widest);
    let widen = |v: IntValue<'ctx>, signed: bool| -> IntValue<'ctx> {
        if v.get_type().get_bit_width() == widest {
            v
        } else if signed {
            ctx.builder
                .build_int_s_extend(v, wide_type, "slice.sext")
                .expect("sign-extend insertion failed")
        } else {
            ctx.builder
                .build_int_z_extend(v, wide_type, "slice.zext")
                .expect("zero-extend insertion failed")
        }
    };
    let (low_w, high_w, max_w, capacity_w) = (
        widen(low, low_signed),
        widen(high, high_signed),
        widen(max, max_signed),
        widen(capacity, false),
    );

    let low_gt_high = ctx
        .builder
        .build_int_compare(IntPredicate::UGT, low_w, high_w, "slice.cmp.low_high")
        .expect("compare insertion failed");
    let high_gt_max = ctx
        .builder
        .build_int_compare(IntPredicate::UGT, high_w, max_w, "slice.cmp.high_max")
        .expect("compare insertion failed");
    let max_gt_cap = ctx
        .builder
        .build_int_compare(IntPredicate::UGT, max_w, capacity_w, "slice.cmp.max_cap")
        .expect("compare insertion failed");

    let a_or_b = ctx
        .builder
        .build_or(low_gt_high, high_gt_max, "slice.cmp.or1")
        .expect("or insertion failed");
    let out_of_bounds = ctx
        .builder
        .build_or(a_or_b, max_gt_cap, "slice.cmp.or2")
        .expect("or insertion failed");

    fb.create_runtime_assert(ctx, "slice.bounds", out_of_bounds, |ctx, builder| {
        call_runtime(builder, ctx.ptr_type(), ctx.runtime.slice_panic, &[]);
    });
}

/// Channel-make size check. Computes
/// `max_buf_size = (!0u64 >> 1) / max(element_size, 1)` in pointer-width
/// unsigned arithmetic — `max(E, 1)` avoids a division by zero for a
/// zero-sized element without special-casing it away. If `element_size` is
/// large enough that `max_buf_size` would be zero, that's the one
/// user-visible diagnostic this crate raises rather than emitting an
/// assertion that could never pass. Otherwise widens `buf_size` to
/// pointer-word width — sign-extending iff `buf_size_signed`, exactly like
/// every other widening in this module — and emits a branch on
/// `buf_size >= max_buf_size`, panicking via `runtime.chanMakePanic`.
pub fn create_chan_bounds_check<'ctx>(
    fb: &mut FunctionBuilder<'ctx>,
    ctx: &CompileContext<'ctx>,
    element_size: u64,
    buf_size: IntValue<'ctx>,
    buf_size_signed: bool,
    pos: SourcePos,
) -> Result<(), CodegenError> {
    if fb.nobounds {
        return Ok(());
    }
    let max_buf_size = (u64::MAX >> 1) / element_size.max(1);
    if max_buf_size == 0 {
        return Err(CodegenError::ChanElementTooBig(ChanElementTooBig {
            pos,
            element_size,
        }));
    }

    let isize_type = ctx.isize_type();
    let max_buf_size_const = isize_type.const_int(max_buf_size, false);
    let buf_size = if buf_size.get_type().get_bit_width() != isize_type.get_bit_width() {
        if buf_size_signed {
            ctx.builder
                .build_int_s_extend(buf_size, isize_type, "chan.bufsize.sext")
                .expect("sign-extend insertion failed")
        } else {
            ctx.builder
                .build_int_z_extend(buf_size, isize_type, "chan.bufsize.zext")
                .expect("zero-extend insertion failed")
        }
    } else {
        buf_size
    };

    let too_big = ctx
        .builder
        .build_int_compare(IntPredicate::UGE, buf_size, max_buf_size_const, "chan.cmp")
        .expect("compare insertion failed");

    fb.create_runtime_assert(ctx, "chan.bounds", too_big, |ctx, builder| {
        call_runtime(builder, ctx.ptr_type(), ctx.runtime.chan_make_panic, &[]);
    });
    Ok(())
}

/// Nil-pointer check. Elided entirely for values whose `ValueOrigin` proves
/// non-nil — module-level globals, address-of-element results on an
/// array/slice, and conversions from a raw/untyped pointer are all known
/// non-nil by construction; otherwise compares the pointer against the null
/// pointer and panics via `runtime.nilPanic`.
pub fn create_nil_check<'ctx>(
    fb: &mut FunctionBuilder<'ctx>,
    ctx: &CompileContext<'ctx>,
    pointer: TypedValue<'ctx>,
) {
    if pointer.origin.elides_nil_check() {
        return;
    }
    let ptr_value = pointer
        .value
        .into_pointer_value();
    let is_null = ctx
        .builder
        .build_is_null(ptr_value, "nil.cmp")
        .expect("is_null insertion failed");
    fb.create_runtime_assert(ctx, "nil", is_null, |ctx, builder| {
        call_runtime(builder, ctx.ptr_type(), ctx.runtime.nil_panic, &[]);
    });
}

/// Negative-shift check: panics via `runtime.negativeShiftPanic` when a
/// signed shift amount is less than zero. Elided under `fb.nobounds`, same
/// as the other checks in this family except the nil check, which the
/// no-bounds flag never suppresses.
pub fn create_negative_shift_check<'ctx>(
    fb: &mut FunctionBuilder<'ctx>,
    ctx: &CompileContext<'ctx>,
    shift_amount: IntValue<'ctx>,
) {
    if fb.nobounds {
        return;
    }
    let zero = shift_amount.get_type().const_zero();
    let is_negative = ctx
        .builder
        .build_int_compare(IntPredicate::SLT, shift_amount, zero, "shift.cmp")
        .expect("compare insertion failed");
    fb.create_runtime_assert(ctx, "shift.negative", is_negative, |ctx, builder| {
        call_runtime(builder, ctx.ptr_type(), ctx.runtime.negative_shift_panic, &[]);
    });
}
