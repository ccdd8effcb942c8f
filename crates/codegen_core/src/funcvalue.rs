//! Function-value construction, decoding, and closure building.
//!
//! Presents a single closure-valued type to the rest of the backend while
//! hiding the choice between two representations, selected once per build
//! via `CompileConfig::func_implementation`.

use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue, StructValue};
use inkwell::{AddressSpace, GlobalVisibility, Linkage};

use crate::config::FuncImplementation;
use crate::context::CompileContext;
use crate::pack;
use crate::ssa::{CaptureBinding, TypedValue};
use crate::types::{Signature, SourceType};
use crate::util::func_value_struct_type;

/// Interns (looking up before creating — never twice for the same key)
/// the `funcValueWithSignature` global for `code_fn` under `signature`:
/// `{ code: isize, sig_code: i32 }`, named `<code_fn's name>$withSignature`,
/// internal linkage. Only used by the signature-switch variant.
fn intern_with_signature_global<'ctx>(
    ctx: &CompileContext<'ctx>,
    code_fn: FunctionValue<'ctx>,
    signature: &Signature,
) -> PointerValue<'ctx> {
    let name = format!(
        "{}$withSignature",
        code_fn.get_name().to_str().expect("function names are valid UTF-8")
    );
    if let Some(existing) = ctx.module.get_global(&name) {
        log::trace!("intern_with_signature_global: reusing existing global `{name}`");
        return existing.as_pointer_value();
    }
    log::debug!("intern_with_signature_global: interning new global `{name}`");

    let record_type = ctx
        .context
        .struct_type(&[ctx.isize_type().into(), ctx.context.i32_type().into()], false);
    let global = ctx.module.add_global(record_type, Some(AddressSpace::default()), &name);
    global.set_linkage(Linkage::Internal);
    global.set_visibility(GlobalVisibility::Default);
    global.set_constant(true);

    let code_as_isize = code_fn.as_global_value().as_pointer_value().const_to_int(ctx.isize_type());
    let sig_code = ctx.context.i32_type().const_int(ctx.type_code_for(signature) as u64, false);
    global.set_initializer(&record_type.const_named_struct(&[code_as_isize.into(), sig_code.into()]));

    global.as_pointer_value()
}

/// Builds `{ context, scalar }` where `scalar` is either the code pointer
/// itself (doubleword) or a `const_ptr_to_int`-encoded pointer to the
/// interned `$withSignature` global (signature-switch).
pub fn create_func_value<'ctx>(
    ctx: &CompileContext<'ctx>,
    context_ptr: PointerValue<'ctx>,
    code_fn: FunctionValue<'ctx>,
    signature: &Signature,
) -> StructValue<'ctx> {
    let struct_type = func_value_struct_type(ctx);
    log::trace!(
        "create_func_value({:?}): {:?} variant",
        code_fn.get_name(),
        ctx.config.func_implementation
    );
    let scalar: BasicValueEnum = match ctx.config.func_implementation {
        FuncImplementation::Doubleword => code_fn.as_global_value().as_pointer_value().into(),
        FuncImplementation::Switch => {
            let global_ptr = intern_with_signature_global(ctx, code_fn, signature);
            global_ptr.const_to_int(ctx.isize_type()).into()
        }
    };

    let aggregate = struct_type.get_undef();
    let aggregate = ctx
        .builder
        .build_insert_value(aggregate, context_ptr, 0, "funcvalue.context")
        .expect("insert_value insertion failed")
        .into_struct_value();
    ctx.builder
        .build_insert_value(aggregate, scalar, 1, "funcvalue.scalar")
        .expect("insert_value insertion failed")
        .into_struct_value()
}

/// Field 0, always cheap (no runtime call in either variant).
pub fn extract_func_context<'ctx>(ctx: &CompileContext<'ctx>, func_value: StructValue<'ctx>) -> BasicValueEnum<'ctx> {
    ctx.builder
        .build_extract_value(func_value, 0, "funcvalue.extract_context")
        .expect("extract_value insertion failed")
}

/// Field 1, the raw scalar with no decoding applied — a code pointer under
/// doubleword, an encoded `code_key` under signature-switch.
pub fn extract_func_scalar<'ctx>(ctx: &CompileContext<'ctx>, func_value: StructValue<'ctx>) -> BasicValueEnum<'ctx> {
    ctx.builder
        .build_extract_value(func_value, 1, "funcvalue.extract_scalar")
        .expect("extract_value insertion failed")
}

/// Resolves `func_value`'s scalar into a callable code pointer. Doubleword
/// returns the scalar field as-is (already a pointer);
/// signature-switch calls `runtime.getFuncPtr(code_key, sig_code)`, paying
/// one runtime call per decode in exchange for the smaller at-rest
/// representation.
pub fn decode_func_value<'ctx>(
    ctx: &CompileContext<'ctx>,
    func_value: StructValue<'ctx>,
    signature: &Signature,
) -> PointerValue<'ctx> {
    let scalar = extract_func_scalar(ctx, func_value);
    match ctx.config.func_implementation {
        FuncImplementation::Doubleword => scalar.into_pointer_value(),
        FuncImplementation::Switch => {
            let sig_code = ctx.context.i32_type().const_int(ctx.type_code_for(signature) as u64, false);
            let call = crate::runtime::call_runtime(
                &ctx.builder,
                ctx.ptr_type(),
                ctx.runtime.get_func_ptr,
                &[scalar, sig_code.into()],
            );
            call.try_as_basic_value()
                .left()
                .expect("runtime.getFuncPtr must return a value")
                .into_pointer_value()
        }
    }
}

/// The late-materialisation hook closure construction needs for synthesized
/// bound-method thunks: the SSA producer may hand `build_closure` a target
/// function whose IR body hasn't been emitted yet because it isn't a real
/// source-level function the producer's own top-level emission pass would
/// reach. Implementations must be idempotent — emitting the same thunk's
/// body twice is a bug, not just wasted work, since the second emission
/// would try to append a second entry block to an already-terminated
/// function.
pub trait ThunkEmitter {
    fn ensure_emitted<'ctx>(&self, ctx: &CompileContext<'ctx>, thunk: FunctionValue<'ctx>);
}

/// First gives `thunk_emitter` (if any) a chance to materialise
/// `code_fn`'s body when it is still empty, then packs `captures` into a
/// context pointer and wraps `code_fn` and that context into a function
/// value. A non-capturing lambda should call this with an empty `captures`
/// slice, which `pack::pack` resolves to the null context pointer.
pub fn build_closure<'ctx>(
    ctx: &CompileContext<'ctx>,
    code_fn: FunctionValue<'ctx>,
    captures: &[CaptureBinding<'ctx>],
    signature: &Signature,
    thunk_emitter: Option<&dyn ThunkEmitter>,
) -> StructValue<'ctx> {
    if code_fn.get_first_basic_block().is_none() {
        if let Some(emitter) = thunk_emitter {
            // `CompileContext` shares one repositionable `Builder` across
            // the whole module, so save and restore its insertion point
            // around the callback rather than disturbing the caller's
            // in-flight block.
            let resume_at = ctx.builder.get_insert_block();
            emitter.ensure_emitted(ctx, code_fn);
            if let Some(block) = resume_at {
                ctx.builder.position_at_end(block);
            }
        }
    }

    let typed_values: Vec<TypedValue<'ctx>> = captures
        .iter()
        .map(|capture| TypedValue::new(capture.value, capture.ty.clone()))
        .collect();
    let context_ptr = pack::pack(ctx, &typed_values).into_pointer_value();
    create_func_value(ctx, context_ptr, code_fn, signature)
}

/// Returns the `SourceType` this function value's environment pointer
/// should be treated as when unpacking it back into captures — callers
/// that need to read captures back out of a closure (rather than just
/// calling through it) use this with `pack::unpack`.
pub fn capture_types(captures: &[CaptureBinding]) -> Vec<SourceType> {
    captures.iter().map(|c| c.ty.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use inkwell::context::Context;
    use inkwell::targets::TargetData;

    fn fresh_context_with_config(context: &Context, config: CompileConfig) -> (CompileContext, FunctionValue) {
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
        let ctx = CompileContext::new(context, module, target_data, config);

        let callee_fn_type = ctx.context.void_type().fn_type(&[], false);
        let callee = ctx.module.add_function("callee", callee_fn_type, None);

        let fn_type = ctx.context.void_type().fn_type(&[], false);
        let function = ctx.module.add_function("f", fn_type, None);
        let entry = ctx.context.append_basic_block(function, "entry");
        ctx.builder.position_at_end(entry);
        (ctx, callee)
    }

    #[test]
    fn doubleword_func_value_uses_the_code_pointer_directly() {
        let context = Context::create();
        let (ctx, callee) = fresh_context_with_config(&context, CompileConfig::default());
        let signature = Signature::new(vec![], SourceType::Void);
        let context_ptr = ctx.ptr_type().const_null();
        let func_value = create_func_value(&ctx, context_ptr, callee, &signature);
        let decoded = decode_func_value(&ctx, func_value, &signature);
        assert_eq!(decoded, callee.as_global_value().as_pointer_value());
    }

    #[test]
    fn switch_func_value_interns_the_with_signature_global_once() {
        let context = Context::create();
        let config = CompileConfig {
            func_implementation: FuncImplementation::Switch,
            ..CompileConfig::default()
        };
        let (ctx, callee) = fresh_context_with_config(&context, config);
        let signature = Signature::new(vec![], SourceType::Void);
        let context_ptr = ctx.ptr_type().const_null();

        create_func_value(&ctx, context_ptr, callee, &signature);
        create_func_value(&ctx, context_ptr, callee, &signature);

        assert!(ctx.module.get_global("callee$withSignature").is_some());
        let globals_named: usize = ctx
            .module
            .get_globals()
            .filter(|g| g.get_name().to_str().unwrap() == "callee$withSignature")
            .count();
        assert_eq!(globals_named, 1);
    }

    #[test]
    fn build_closure_with_no_captures_yields_a_null_context() {
        let context = Context::create();
        let (ctx, callee) = fresh_context_with_config(&context, CompileConfig::default());
        let signature = Signature::new(vec![], SourceType::Void);
        let func_value = build_closure(&ctx, callee, &[], &signature, None);
        let context_value = extract_func_context(&ctx, func_value);
        assert!(context_value.into_pointer_value().is_null());
    }

    #[test]
    fn build_closure_materialises_an_empty_thunk_exactly_once() {
        use std::cell::Cell;

        struct CountingEmitter<'a> {
            calls: &'a Cell<u32>,
        }
        impl ThunkEmitter for CountingEmitter<'_> {
            fn ensure_emitted<'ctx>(&self, ctx: &CompileContext<'ctx>, thunk: FunctionValue<'ctx>) {
                self.calls.set(self.calls.get() + 1);
                let block = ctx.context.append_basic_block(thunk, "entry");
                ctx.builder.position_at_end(block);
                ctx.builder.build_return(None).expect("return insertion failed");
            }
        }

        let context = Context::create();
        let (ctx, callee) = fresh_context_with_config(&context, CompileConfig::default());
        let signature = Signature::new(vec![], SourceType::Void);
        let calls = Cell::new(0u32);
        let emitter = CountingEmitter { calls: &calls };

        assert!(callee.get_first_basic_block().is_none());
        build_closure(&ctx, callee, &[], &signature, Some(&emitter));
        assert_eq!(calls.get(), 1);
        assert!(callee.get_first_basic_block().is_some());

        build_closure(&ctx, callee, &[], &signature, Some(&emitter));
        assert_eq!(calls.get(), 1, "ensure_emitted must not re-run for an already-materialised thunk");
    }
}
