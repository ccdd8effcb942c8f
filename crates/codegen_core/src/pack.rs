//! Pointer packing/unpacking codec for closure environments and
//! goroutine argument bundles.
//!
//! The representation chosen for a bundle of values depends only on
//! `(value types, target data layout)`, never on an explicit tag stored
//! alongside the pointer. Both directions make the same five-way decision;
//! `pack` and `unpack` must always be called with the same `types` slice
//! for a given bundle, or the decision trees diverge.

use inkwell::types::{BasicType, StructType};
use inkwell::values::{BasicValueEnum, PointerValue};

use crate::context::CompileContext;
use crate::runtime::call_runtime;
use crate::ssa::TypedValue;
use crate::types::{PointerKind, SourceType};
use crate::util::to_llvm_basic_type;

fn combined_struct_type<'ctx>(ctx: &CompileContext<'ctx>, types: &[SourceType]) -> StructType<'ctx> {
    let fields: Vec<_> = types.iter().map(|ty| to_llvm_basic_type(ctx, ty)).collect();
    ctx.context.struct_type(&fields, false)
}

fn size_of_combined<'ctx>(ctx: &CompileContext<'ctx>, types: &[SourceType]) -> u64 {
    if types.is_empty() {
        return 0;
    }
    ctx.target_data.get_store_size(&combined_struct_type(ctx, types))
}

fn zero_value_for<'ctx>(ctx: &CompileContext<'ctx>, ty: &SourceType) -> BasicValueEnum<'ctx> {
    let llvm_type = to_llvm_basic_type(ctx, ty);
    match llvm_type {
        inkwell::types::BasicTypeEnum::PointerType(pt) => pt.const_null().into(),
        inkwell::types::BasicTypeEnum::IntType(it) => it.const_zero().into(),
        inkwell::types::BasicTypeEnum::FloatType(ft) => ft.const_zero().into(),
        inkwell::types::BasicTypeEnum::StructType(st) => st.const_zero().into(),
        inkwell::types::BasicTypeEnum::ArrayType(at) => at.const_zero().into(),
        inkwell::types::BasicTypeEnum::VectorType(vt) => vt.const_zero().into(),
        inkwell::types::BasicTypeEnum::ScalableVectorType(_) => {
            panic!("scalable vector types are not produced by this source language")
        }
    }
}

/// Declares (once per module) and calls `llvm.lifetime.end.p0`, marking a
/// stack slot's storage dead immediately after its one-shot roundtrip
/// through the pack/unpack stack path.
fn emit_lifetime_end<'ctx>(ctx: &CompileContext<'ctx>, slot: PointerValue<'ctx>, size: u64) {
    let intrinsic_name = "llvm.lifetime.end.p0";
    let lifetime_end = ctx.module.get_function(intrinsic_name).unwrap_or_else(|| {
        let fn_type = ctx
            .context
            .void_type()
            .fn_type(&[ctx.context.i64_type().into(), ctx.ptr_type().into()], false);
        ctx.module.add_function(intrinsic_name, fn_type, None)
    });
    let size_const = ctx.context.i64_type().const_int(size, false);
    ctx.builder
        .build_call(lifetime_end, &[size_const.into(), slot.into()], "pack.lifetime.end")
        .expect("lifetime.end call insertion failed");
}

fn store_all_values<'ctx>(
    ctx: &CompileContext<'ctx>,
    base: PointerValue<'ctx>,
    struct_type: StructType<'ctx>,
    values: &[TypedValue<'ctx>],
) {
    for (index, value) in values.iter().enumerate() {
        let field_ptr = ctx
            .builder
            .build_struct_gep(struct_type, base, index as u32, "pack.field")
            .expect("struct_gep insertion failed");
        ctx.builder
            .build_store(field_ptr, value.value)
            .expect("store insertion failed");
    }
}

fn load_all_values<'ctx>(
    ctx: &CompileContext<'ctx>,
    base: PointerValue<'ctx>,
    struct_type: StructType<'ctx>,
    types: &[SourceType],
) -> Vec<BasicValueEnum<'ctx>> {
    types
        .iter()
        .enumerate()
        .map(|(index, ty)| {
            let field_ptr = ctx
                .builder
                .build_struct_gep(struct_type, base, index as u32, "unpack.field")
                .expect("struct_gep insertion failed");
            let field_type = to_llvm_basic_type(ctx, ty);
            ctx.builder
                .build_load(field_type, field_ptr, "unpack.load")
                .expect("load insertion failed")
        })
        .collect()
}

/// Packs `values` into a single pointer-sized (or heap-allocated) bundle.
/// Chooses among five strategies purely from `values`' types and the
/// target's pointer width:
///
/// 1. Zero values, or a combined size of zero → the null pointer.
/// 2. A single typed pointer value → returned verbatim (under LLVM's
///    opaque-pointer model there is no bitcast to perform).
/// 3. A single integer value that fits in a pointer word → `int_to_ptr`,
///    kept in SSA form (no memory traffic at all).
/// 4. Combined size fits in one pointer word but isn't already one of the
///    above → an alloca, zero-initialized, every field stored into it,
///    then loaded back out as a single pointer value; the alloca's
///    lifetime ends immediately after the load.
/// 5. Combined size exceeds one pointer word → `runtime.alloc` for the
///    storage (plus `runtime.trackPointer` when
///    `CompileConfig::needs_stack_objects` is set), fields stored into the
///    heap allocation, the heap pointer returned.
pub fn pack<'ctx>(ctx: &CompileContext<'ctx>, values: &[TypedValue<'ctx>]) -> BasicValueEnum<'ctx> {
    if values.is_empty() {
        log::trace!("pack: zero values, returning null");
        return ctx.ptr_type().const_null().into();
    }

    if values.len() == 1 {
        let only = &values[0];
        if matches!(only.ty, SourceType::Pointer { kind: PointerKind::Typed | PointerKind::Raw | PointerKind::SliceData, .. }) {
            log::trace!("pack: single pointer value, returning verbatim");
            return only.value;
        }
        if let SourceType::Integer { width, .. } = only.ty {
            if u64::from(width) <= ctx.pointer_size_bytes() * 8 {
                log::trace!("pack: single {width}-bit integer, int_to_ptr");
                let int_value = only.value.into_int_value();
                let ptr_value = ctx
                    .builder
                    .build_int_to_ptr(int_value, ctx.ptr_type(), "pack.inttoptr")
                    .expect("int_to_ptr insertion failed");
                return ptr_value.into();
            }
        }
    }

    let types: Vec<SourceType> = values.iter().map(|v| v.ty.clone()).collect();
    let total_size = size_of_combined(ctx, &types);
    if total_size == 0 {
        log::trace!("pack: combined size is zero, returning null");
        return ctx.ptr_type().const_null().into();
    }

    let struct_type = combined_struct_type(ctx, &types);

    if total_size <= ctx.pointer_size_bytes() {
        log::debug!("pack: {total_size} bytes fits in one pointer word, stack roundtrip");
        let slot = ctx
            .builder
            .build_alloca(struct_type, "pack.slot")
            .expect("alloca insertion failed");
        ctx.builder
            .build_store(slot, struct_type.const_zero())
            .expect("zero-init store insertion failed");
        store_all_values(ctx, slot, struct_type, values);
        let loaded = ctx
            .builder
            .build_load(ctx.ptr_type(), slot, "pack.load")
            .expect("load insertion failed");
        emit_lifetime_end(ctx, slot, total_size);
        loaded
    } else {
        log::debug!("pack: {total_size} bytes exceeds one pointer word, heap-allocating");
        let size_const = ctx.isize_type().const_int(total_size, false);
        let call = call_runtime(&ctx.builder, ctx.ptr_type(), ctx.runtime.alloc, &[size_const.into()]);
        let heap_ptr = call
            .try_as_basic_value()
            .left()
            .expect("runtime.alloc must return a value")
            .into_pointer_value();
        if ctx.config.needs_stack_objects {
            call_runtime(&ctx.builder, ctx.ptr_type(), ctx.runtime.track_pointer, &[heap_ptr.into()]);
        }
        store_all_values(ctx, heap_ptr, struct_type, values);
        heap_ptr.into()
    }
}

/// Inverse of `pack`: given the packed pointer `packed` and the same
/// `types` slice the original `pack` call used, reconstructs the original
/// values. The strategy is re-derived from `types` alone, exactly mirroring
/// `pack`'s own decision tree — there is no tag to dispatch on.
pub fn unpack<'ctx>(ctx: &CompileContext<'ctx>, packed: PointerValue<'ctx>, types: &[SourceType]) -> Vec<BasicValueEnum<'ctx>> {
    if types.is_empty() {
        return Vec::new();
    }

    if types.len() == 1 {
        match &types[0] {
            SourceType::Pointer { .. } => return vec![packed.into()],
            SourceType::Integer { width, .. } => {
                if u64::from(*width) <= ctx.pointer_size_bytes() * 8 {
                    let int_type = ctx.context.custom_width_int_type(*width);
                    let as_isize = ctx
                        .builder
                        .build_ptr_to_int(packed, ctx.isize_type(), "unpack.ptrtoint")
                        .expect("ptr_to_int insertion failed");
                    // Recovering the packed integer is always a narrowing (or
                    // no-op) truncation back from the pointer-word-sized
                    // `ptrtoint` result — the original value's signedness
                    // only matters when *widening*, as `pack` itself never
                    // does here, since packing sign/zero-extends the value
                    // up to pointer width by construction.
                    let truncated = ctx
                        .builder
                        .build_int_truncate_or_bit_cast(as_isize, int_type, "unpack.trunc")
                        .expect("truncate insertion failed");
                    return vec![truncated.into()];
                }
            }
            _ => {}
        }
    }

    let total_size = size_of_combined(ctx, types);
    if total_size == 0 {
        return types.iter().map(|ty| zero_value_for(ctx, ty)).collect();
    }

    let struct_type = combined_struct_type(ctx, types);

    if total_size <= ctx.pointer_size_bytes() {
        let slot = ctx
            .builder
            .build_alloca(struct_type, "unpack.slot")
            .expect("alloca insertion failed");
        ctx.builder
            .build_store(slot, packed)
            .expect("store insertion failed");
        let values = load_all_values(ctx, slot, struct_type, types);
        emit_lifetime_end(ctx, slot, total_size);
        values
    } else {
        load_all_values(ctx, packed, struct_type, types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use inkwell::context::Context;
    use inkwell::targets::TargetData;
    use inkwell::AddressSpace;

    fn fresh_context(context: &Context) -> (CompileContext, inkwell::values::FunctionValue) {
        let module = context.create_module("test");
        let ptr = context.ptr_type(AddressSpace::default());
        let i64_ty = context.i64_type();
        let void_fn = context.void_type().fn_type(&[ptr.into(), ptr.into()], false);
        for name in [
            "runtime.lookupPanic",
            "runtime.slicePanic",
            "runtime.nilPanic",
            "runtime.chanMakePanic",
            "runtime.negativeShiftPanic",
        ] {
            module.add_function(name, void_fn, None);
        }
        module.add_function("runtime.alloc", ptr.fn_type(&[i64_ty.into(), ptr.into(), ptr.into()], false), None);
        module.add_function("runtime.trackPointer", void_fn, None);
        module.add_function(
            "runtime.getFuncPtr",
            ptr.fn_type(&[i64_ty.into(), i64_ty.into(), ptr.into(), ptr.into()], false),
            None,
        );
        let target_data = TargetData::create("e-p:64:64:64");
        let ctx = CompileContext::new(context, module, target_data, CompileConfig::default());
        let fn_type = ctx.context.void_type().fn_type(&[], false);
        let function = ctx.module.add_function("f", fn_type, None);
        let entry = ctx.context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);
        (ctx, function)
    }

    #[test]
    fn packing_nothing_yields_null() {
        let context = Context::create();
        let (ctx, _) = fresh_context(&context);
        let packed = pack(&ctx, &[]);
        assert!(packed.into_pointer_value().is_null());
    }

    #[test]
    fn packing_a_single_small_integer_uses_int_to_ptr_with_no_memory_traffic() {
        let context = Context::create();
        let (ctx, function) = fresh_context(&context);
        let value = TypedValue::new(
            ctx.context.i32_type().const_int(42, false).into(),
            SourceType::Integer { width: 32, signed: false },
        );
        pack(&ctx, &[value]);
        // int_to_ptr is one instruction; no alloca/call should have been emitted.
        let entry = function.get_first_basic_block().unwrap();
        assert_eq!(entry.get_instructions().count(), 1);
    }

    #[test]
    fn unpacking_a_single_signed_integer_narrower_than_pointer_width_truncates_not_sign_extends() {
        let context = Context::create();
        let (ctx, function) = fresh_context(&context);
        let value = TypedValue::new(
            ctx.context.i32_type().const_int((-1i32) as u64, true).into(),
            SourceType::Integer { width: 32, signed: true },
        );
        let types = vec![SourceType::Integer { width: 32, signed: true }];
        let packed = pack(&ctx, &[value]);
        let unpacked = unpack(&ctx, packed.into_pointer_value(), &types);
        assert_eq!(unpacked.len(), 1);
        assert_eq!(unpacked[0].into_int_value().get_type().get_bit_width(), 32);
        // A malformed `sext` to a *narrower* type would fail to build (or
        // produce an ill-typed value); this only asserts cleanly if unpack
        // took the truncate path.
        let entry = function.get_first_basic_block().unwrap();
        assert!(entry.get_instructions().any(|inst| inst.to_string().contains("trunc")));
    }

    #[test]
    fn packing_a_single_typed_pointer_returns_it_unchanged() {
        let context = Context::create();
        let (ctx, _) = fresh_context(&context);
        let original_ptr = ctx.ptr_type().const_null();
        let value = TypedValue::new(
            original_ptr.into(),
            SourceType::Pointer {
                to: Box::new(SourceType::Void),
                kind: PointerKind::Typed,
            },
        );
        let packed = pack(&ctx, &[value]);
        assert_eq!(packed.into_pointer_value(), original_ptr);
    }

    #[test]
    fn packing_two_small_fields_round_trips_through_unpack() {
        let context = Context::create();
        let (ctx, _) = fresh_context(&context);
        let values = vec![
            TypedValue::new(ctx.context.bool_type().const_int(1, false).into(), SourceType::Boolean),
            TypedValue::new(ctx.context.i8_type().const_int(7, false).into(), SourceType::Character),
        ];
        let types: Vec<SourceType> = values.iter().map(|v| v.ty.clone()).collect();
        let packed = pack(&ctx, &values);
        let unpacked = unpack(&ctx, packed.into_pointer_value(), &types);
        assert_eq!(unpacked.len(), 2);
    }

    #[test]
    fn packing_an_oversized_bundle_allocates_on_the_heap() {
        let context = Context::create();
        let (ctx, function) = fresh_context(&context);
        let values = vec![
            TypedValue::new(ctx.context.i64_type().const_int(1, false).into(), SourceType::Integer { width: 64, signed: true }),
            TypedValue::new(ctx.context.i64_type().const_int(2, false).into(), SourceType::Integer { width: 64, signed: true }),
            TypedValue::new(ctx.context.i64_type().const_int(3, false).into(), SourceType::Integer { width: 64, signed: true }),
        ];
        pack(&ctx, &values);
        let has_alloc_call = function
            .get_first_basic_block()
            .unwrap()
            .get_instructions()
            .any(|inst| inst.to_string().contains("runtime.alloc"));
        assert!(has_alloc_call);
    }
}
