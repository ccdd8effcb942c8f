//! Per-function codegen state and the shared assertion-emission primitive.
//!
//! `FunctionBuilder` tracks the function and block currently being built,
//! the `block_exits` table every assertion rewrites, and the one
//! `nobounds` flag that can suppress the bounds-check family outright for a
//! function marked unsafe.

use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::values::FunctionValue;

use crate::context::CompileContext;

/// Per-function codegen state.
pub struct FunctionBuilder<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub current_block: BasicBlock<'ctx>,
    /// Maps a block to the block control flow actually continues into
    /// after it, when that differs from the block itself — written only by
    /// `create_runtime_assert` each time it splits a block for an inserted
    /// check. Phi-node construction in the SSA producer consults this
    /// table to find the real predecessor of a block whose tail was
    /// rewritten.
    pub block_exits: HashMap<BasicBlock<'ctx>, BasicBlock<'ctx>>,
    /// Copied once from the function's SSA metadata at construction: when
    /// set, every call into the `safety` bounds-check family on this
    /// function becomes a no-op passthrough (the source function was
    /// declared to skip bounds checks).
    pub nobounds: bool,
}

impl<'ctx> FunctionBuilder<'ctx> {
    pub fn new(function: FunctionValue<'ctx>, entry_block: BasicBlock<'ctx>, nobounds: bool) -> Self {
        FunctionBuilder {
            function,
            current_block: entry_block,
            block_exits: HashMap::new(),
            nobounds,
        }
    }

    /// Follows `block_exits` until it reaches a block with no further
    /// recorded rewrite — the actual block control flow ends up in after
    /// however many checks have split the one `block` started as.
    pub fn resolve_exit(&self, block: BasicBlock<'ctx>) -> BasicBlock<'ctx> {
        let mut current = block;
        while let Some(next) = self.block_exits.get(&current) {
            if *next == current {
                break;
            }
            current = *next;
        }
        current
    }

    /// The shared runtime-assertion protocol every check in `safety`
    /// builds on:
    ///
    /// 1. If `condition` is a compile-time-constant `false` (the check can
    ///    never fire), skip emitting anything and return immediately — a
    ///    statically-proven-safe access needs no guard at all.
    /// 2. Otherwise create `<prefix>.throw` and `<prefix>.next` blocks,
    ///    record `block_exits[current_block] = next_block`, and emit a
    ///    conditional branch on `condition` (true → throw, false → next).
    /// 3. In the throw block: call `panic_fn` (a runtime symbol expected
    ///    never to return) then an `unreachable` terminator.
    /// 4. Position the builder at `next_block` and update `current_block`
    ///    so subsequent codegen continues there.
    pub fn create_runtime_assert(
        &mut self,
        ctx: &CompileContext<'ctx>,
        prefix: &str,
        condition: inkwell::values::IntValue<'ctx>,
        emit_panic_call: impl FnOnce(&CompileContext<'ctx>, &inkwell::builder::Builder<'ctx>),
    ) {
        if let Some(constant) = condition.get_zero_extended_constant() {
            if constant == 0 {
                log::trace!("create_runtime_assert({prefix}): condition is statically false, eliding");
                return;
            }
        }

        log::debug!(
            "create_runtime_assert({prefix}): splitting {:?} into {prefix}.throw/{prefix}.next",
            self.current_block.get_name()
        );

        let throw_block = ctx
            .context
            .insert_basic_block_after(self.current_block, &format!("{prefix}.throw"));
        let next_block = ctx
            .context
            .insert_basic_block_after(throw_block, &format!("{prefix}.next"));

        self.block_exits.insert(self.current_block, next_block);

        ctx.builder
            .build_conditional_branch(condition, throw_block, next_block)
            .expect("conditional branch insertion failed");

        ctx.builder.position_at_end(throw_block);
        emit_panic_call(ctx, &ctx.builder);
        ctx.builder
            .build_unreachable()
            .expect("unreachable insertion failed");

        ctx.builder.position_at_end(next_block);
        self.current_block = next_block;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::runtime::RuntimeSymbols;
    use inkwell::context::Context;
    use inkwell::targets::TargetData;
    use inkwell::AddressSpace;

    fn declare_runtime_symbols(module: &inkwell::module::Module) {
        let context = module.get_context();
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
        module.add_function(
            "runtime.alloc",
            ptr.fn_type(&[i64_ty.into(), ptr.into(), ptr.into()], false),
            None,
        );
        module.add_function("runtime.trackPointer", void_fn, None);
        module.add_function(
            "runtime.getFuncPtr",
            ptr.fn_type(&[i64_ty.into(), i64_ty.into(), ptr.into(), ptr.into()], false),
            None,
        );
    }

    #[test]
    fn runtime_assert_splits_current_block_and_records_the_exit() {
        let context = Context::create();
        let module = context.create_module("test");
        declare_runtime_symbols(&module);
        let target_data = TargetData::create("e-p:64:64:64");
        let compile_ctx = CompileContext::new(&context, module, target_data, CompileConfig::default());

        let fn_type = compile_ctx.context.void_type().fn_type(&[], false);
        let function = compile_ctx.module.add_function("f", fn_type, None);
        let entry = compile_ctx.context.append_basic_block(function, "entry");
        compile_ctx.builder.position_at_end(entry);

        let mut builder = FunctionBuilder::new(function, entry, false);
        let always_true = compile_ctx.context.bool_type().const_int(1, false);

        builder.create_runtime_assert(&compile_ctx, "bounds", always_true, |ctx, b| {
            crate::runtime::call_runtime(b, ctx.ptr_type(), ctx.runtime.lookup_panic, &[]);
        });

        assert_ne!(builder.current_block, entry);
        assert_eq!(builder.resolve_exit(entry), builder.current_block);
        assert_eq!(function.count_basic_blocks(), 3);
    }

    #[test]
    fn runtime_assert_skips_emission_for_statically_false_condition() {
        let context = Context::create();
        let module = context.create_module("test");
        declare_runtime_symbols(&module);
        let target_data = TargetData::create("e-p:64:64:64");
        let compile_ctx = CompileContext::new(&context, module, target_data, CompileConfig::default());

        let fn_type = compile_ctx.context.void_type().fn_type(&[], false);
        let function = compile_ctx.module.add_function("f", fn_type, None);
        let entry = compile_ctx.context.append_basic_block(function, "entry");
        compile_ctx.builder.position_at_end(entry);

        let mut builder = FunctionBuilder::new(function, entry, false);
        let always_false = compile_ctx.context.bool_type().const_int(0, false);

        builder.create_runtime_assert(&compile_ctx, "bounds", always_false, |_, _| {
            panic!("should never be called for a statically-false condition");
        });

        assert_eq!(builder.current_block, entry);
        assert_eq!(function.count_basic_blocks(), 1);
    }
}
