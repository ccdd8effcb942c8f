//! Aggregate-parameter flattening and collapsing for the calling
//! convention.
//!
//! Struct fields are flattened recursively field by field — never by raw
//! byte layout — and arrays are always treated as leaves regardless of how
//! many scalar fields they could decompose into. This is a deliberately
//! conservative choice, kept for ABI stability across array-length
//! changes.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, CallSiteValue, FunctionValue, PointerValue};

use crate::context::CompileContext;
use crate::types::SourceType;

/// The maximum number of individually-flattened scalar fields a struct
/// parameter may expand into before the calling convention falls back to
/// passing the whole aggregate by value.
pub const MAX_FIELDS_PER_PARAM: usize = 3;

bitflags::bitflags! {
    /// Parameter attribute bits attached per flattened leaf.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u8 {
        /// `dereferenceable_or_null` — attached when the leaf's source type
        /// is a typed pointer, channel handle, or map handle; never for raw
        /// pointers or slice data pointers.
        const DEREFERENCEABLE_OR_NULL = 0b0000_0001;
    }
}

fn flags_for(ty: &SourceType) -> ParamFlags {
    if ty.wants_dereferenceable() {
        ParamFlags::DEREFERENCEABLE_OR_NULL
    } else {
        ParamFlags::empty()
    }
}

/// Recursively flattens `ty` into its leaf fields, in declaration order.
/// A `Struct` descends into each field and ORs the struct's own flags (none,
/// today) into each leaf's flags as it goes back up. Every other variant —
/// including `Array`, `Tuple`, `Slice`, `Chan`, `Map`, pointers, and all
/// scalars — is a leaf.
pub fn flatten_aggregate_type(ty: &SourceType) -> Vec<(SourceType, ParamFlags)> {
    match ty {
        SourceType::Struct(_, fields) => fields
            .iter()
            .flat_map(|(_, field_ty)| flatten_aggregate_type(field_ty))
            .collect(),
        leaf => vec![(leaf.clone(), flags_for(leaf))],
    }
}

/// One formal parameter's ABI-visible shape: either several individually
/// passed scalar leaves, or the whole aggregate passed as a single value
/// because flattening it would exceed `MAX_FIELDS_PER_PARAM`.
pub enum ExpandedParam {
    Fields(Vec<(SourceType, ParamFlags)>),
    Whole(SourceType, ParamFlags),
}

/// Decides how a single source-level parameter of type `ty` should appear
/// in the LLVM function's formal parameter list.
pub fn expand_formal_param(ty: &SourceType) -> ExpandedParam {
    let fields = flatten_aggregate_type(ty);
    if fields.len() <= MAX_FIELDS_PER_PARAM {
        ExpandedParam::Fields(fields)
    } else {
        ExpandedParam::Whole(ty.clone(), flags_for(ty))
    }
}

/// Recursive struct-field flattening that additionally tracks each leaf's
/// byte offset from the start of `ty`, for debug-info generation only — the
/// calling convention itself (`flatten_aggregate_type`) never needs
/// offsets, since each leaf becomes its own formal parameter rather than a
/// byte range of one.
pub fn flatten_aggregate_type_offsets<'ctx>(
    ctx: &CompileContext<'ctx>,
    ty: &SourceType,
) -> Vec<(SourceType, u64)> {
    fn go<'ctx>(ctx: &CompileContext<'ctx>, ty: &SourceType, base_offset: u64, out: &mut Vec<(SourceType, u64)>) {
        match ty {
            SourceType::Struct(name, fields) => {
                let llvm_fields: Vec<_> = fields
                    .iter()
                    .map(|(_, field_ty)| crate::util::to_llvm_basic_type(ctx, field_ty))
                    .collect();
                let struct_type = ctx.context.struct_type(&llvm_fields, false);
                for (index, (_, field_ty)) in fields.iter().enumerate() {
                    let offset = ctx.target_data.offset_of_element(&struct_type, index as u32).unwrap_or(0);
                    go(ctx, field_ty, base_offset + offset, out);
                }
                let _ = name;
            }
            leaf => out.push((leaf.clone(), base_offset)),
        }
    }
    let mut out = Vec::new();
    go(ctx, ty, 0, &mut out);
    out
}

/// The inverse of `expand_formal_param`. Consumes
/// `fragments` left to right, rebuilding a single aggregate value of type
/// `target_type` via `insert_value`. Panics (compiler bug, not a user
/// error) if the fragment count doesn't exactly match what
/// `flatten_aggregate_type` would have produced — a caller that expanded
/// and collapsed against mismatched types is broken upstream of this
/// crate.
pub fn collapse_formal_param<'ctx>(
    ctx: &CompileContext<'ctx>,
    target_type: &SourceType,
    fragments: &[BasicValueEnum<'ctx>],
) -> BasicValueEnum<'ctx> {
    let mut cursor = 0usize;
    let value = collapse_internal(ctx, target_type, fragments, &mut cursor);
    if cursor != fragments.len() {
        log::error!(
            "collapse_formal_param: {} leftover fragment(s) for {target_type:?}",
            fragments.len() - cursor
        );
    }
    assert_eq!(
        cursor,
        fragments.len(),
        "collapse_formal_param: {} leftover fragment(s) for {target_type:?}",
        fragments.len() - cursor
    );
    value
}

/// `expand_formal_param`'s value-level counterpart: recursively extracts
/// `value`'s leaf fields to match `flatten_aggregate_type`'s leaf list for
/// the same `ty`. The two decisions must stay in lock-step: if flattening
/// `ty` would exceed `MAX_FIELDS_PER_PARAM`, this returns `value` unsplit
/// rather than recursing — the same whole-value fallback
/// `expand_formal_param` takes, derived from `expand_formal_param` itself
/// so the two can never diverge.
pub fn split_actual_argument<'ctx>(
    ctx: &CompileContext<'ctx>,
    ty: &SourceType,
    value: BasicValueEnum<'ctx>,
) -> Vec<BasicValueEnum<'ctx>> {
    match expand_formal_param(ty) {
        ExpandedParam::Whole(..) => vec![value],
        ExpandedParam::Fields(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            split_internal(ctx, ty, value, &mut out);
            out
        }
    }
}

fn split_internal<'ctx>(
    ctx: &CompileContext<'ctx>,
    ty: &SourceType,
    value: BasicValueEnum<'ctx>,
    out: &mut Vec<BasicValueEnum<'ctx>>,
) {
    match ty {
        SourceType::Struct(_, fields) => {
            let struct_value = value.into_struct_value();
            for (index, (_, field_ty)) in fields.iter().enumerate() {
                let field_value = ctx
                    .builder
                    .build_extract_value(struct_value, index as u32, "abi.split")
                    .expect("extract_value insertion failed");
                split_internal(ctx, field_ty, field_value, out);
            }
        }
        _ => out.push(value),
    }
}

/// Call emission: expands each actual argument per its declared type via
/// `split_actual_argument`, appends the two trailing scalar arguments every
/// emitted call carries — a context pointer and a parent-coroutine handle,
/// null when absent — then emits the call. The callee's formal parameter
/// list must already have been computed by this same `expand_formal_param`
/// procedure; there is no out-of-band signature to cross-check against.
pub fn emit_call<'ctx>(
    ctx: &CompileContext<'ctx>,
    callee: FunctionValue<'ctx>,
    args: &[(SourceType, BasicValueEnum<'ctx>)],
    context_ptr: PointerValue<'ctx>,
    coroutine_ptr: PointerValue<'ctx>,
) -> CallSiteValue<'ctx> {
    let mut expanded: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len() + 2);
    for (ty, value) in args {
        for fragment in split_actual_argument(ctx, ty, *value) {
            expanded.push(fragment.into());
        }
    }
    expanded.push(context_ptr.into());
    expanded.push(coroutine_ptr.into());
    ctx.builder
        .build_call(callee, &expanded, "call")
        .expect("call insertion failed")
}

fn collapse_internal<'ctx>(
    ctx: &CompileContext<'ctx>,
    target_type: &SourceType,
    fragments: &[BasicValueEnum<'ctx>],
    cursor: &mut usize,
) -> BasicValueEnum<'ctx> {
    match target_type {
        SourceType::Struct(_, fields) => {
            let llvm_fields: Vec<_> = fields
                .iter()
                .map(|(_, field_ty)| crate::util::to_llvm_basic_type(ctx, field_ty))
                .collect();
            let struct_type = ctx.context.struct_type(&llvm_fields, false);
            let mut aggregate = struct_type.get_undef();
            for (index, (_, field_ty)) in fields.iter().enumerate() {
                let field_value = collapse_internal(ctx, field_ty, fragments, cursor);
                aggregate = ctx
                    .builder
                    .build_insert_value(aggregate, field_value, index as u32, "abi.collapse")
                    .expect("insert_value insertion failed")
                    .into_struct_value();
            }
            aggregate.into()
        }
        _ => {
            let fragment = fragments
                .get(*cursor)
                .copied()
                .unwrap_or_else(|| panic!("collapse_formal_param: ran out of fragments for {target_type:?}"));
            *cursor += 1;
            fragment
        }
    }
}
