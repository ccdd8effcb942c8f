//! `SourceType` → LLVM type conversion.
//!
//! Builds an LLVM type for any `SourceType`, recursively for composite
//! types. Results are cached on `CompileContext` so the same source type
//! is never lowered twice.

use inkwell::types::BasicTypeEnum;

use crate::config::FuncImplementation;
use crate::context::CompileContext;
use crate::types::SourceType;

/// Converts `ty` to its LLVM representation, consulting and populating
/// `ctx`'s type cache. Panics for `Void`/`Unknown` reaching a position that
/// demands a concrete value type, since both indicate an upstream compiler
/// bug (a void value has no representation to build; an unresolved type
/// should never have survived type-checking).
pub fn to_llvm_basic_type<'ctx>(ctx: &CompileContext<'ctx>, ty: &SourceType) -> BasicTypeEnum<'ctx> {
    if let Some(cached) = ctx.cached_llvm_type(ty) {
        return cached;
    }
    let built = build(ctx, ty);
    ctx.cache_llvm_type(ty.clone(), built);
    built
}

fn build<'ctx>(ctx: &CompileContext<'ctx>, ty: &SourceType) -> BasicTypeEnum<'ctx> {
    match ty {
        SourceType::Integer { width, .. } => ctx.context.custom_width_int_type(*width).into(),
        SourceType::FloatingPoint => ctx.context.f64_type().into(),
        SourceType::Boolean => ctx.context.bool_type().into(),
        // A Unicode scalar value needs the full 32 bits, not just a byte.
        SourceType::Character => ctx.context.i32_type().into(),
        SourceType::String => ctx.ptr_type().into(),
        SourceType::Void => panic!("Void has no LLVM value representation"),
        SourceType::Unknown => panic!("Unknown type reached code generation"),
        SourceType::Pointer { .. } => ctx.ptr_type().into(),
        SourceType::Tuple(items) => {
            let fields: Vec<_> = items.iter().map(|item| to_llvm_basic_type(ctx, item)).collect();
            ctx.context.struct_type(&fields, false).into()
        }
        SourceType::Array { element, len } => {
            let element_type = to_llvm_basic_type(ctx, element);
            element_type.array_type(*len as u32).into()
        }
        // `{ data: ptr, len: isize, cap: isize }`.
        SourceType::Slice(_) => {
            let isize_type = ctx.isize_type();
            ctx.context
                .struct_type(&[ctx.ptr_type().into(), isize_type.into(), isize_type.into()], false)
                .into()
        }
        // Opaque runtime-owned handles; their internals are the runtime's
        // concern, not this crate's.
        SourceType::Chan { .. } | SourceType::Map { .. } => ctx.ptr_type().into(),
        // `{ vtable: ptr, data: ptr }`.
        SourceType::Interface(_) => ctx
            .context
            .struct_type(&[ctx.ptr_type().into(), ctx.ptr_type().into()], false)
            .into(),
        SourceType::Struct(_, fields) => {
            let llvm_fields: Vec<_> = fields
                .iter()
                .map(|(_, field_ty)| to_llvm_basic_type(ctx, field_ty))
                .collect();
            ctx.context.struct_type(&llvm_fields, false).into()
        }
        SourceType::Function(_) => func_value_struct_type(ctx).into(),
    }
}

/// The function-value representation's own struct shape:
/// `{ context: ptr, code: ptr }` for the doubleword variant, or
/// `{ context: ptr, code_key: isize }` for the signature-switch variant.
pub fn func_value_struct_type<'ctx>(ctx: &CompileContext<'ctx>) -> inkwell::types::StructType<'ctx> {
    match ctx.config.func_implementation {
        FuncImplementation::Doubleword => {
            ctx.context.struct_type(&[ctx.ptr_type().into(), ctx.ptr_type().into()], false)
        }
        FuncImplementation::Switch => {
            ctx.context
                .struct_type(&[ctx.ptr_type().into(), ctx.isize_type().into()], false)
        }
    }
}
