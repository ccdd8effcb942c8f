//! Resolution and invocation of the runtime library's entry points.
//!
//! The runtime library itself is out of scope — this module only models
//! the contract this crate consumes from it: the eight symbols every other
//! module in this crate calls by name, plus the shared calling convention
//! used for all of them: every runtime call gets two trailing scalar
//! arguments appended after its declared parameters, an `undef` context
//! pointer and a `null` coroutine handle, because the runtime ABI is the
//! same shape as ordinary function calls.

use inkwell::module::Module;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, CallSiteValue, FunctionValue, PointerValue};

/// The runtime symbols this crate calls by name. Resolved once per
/// `CompileContext` and cached; looking one up and not finding it is a
/// fatal compiler bug — the runtime library is assumed linked and declared
/// into the module before codegen starts, so a miss here always means an
/// upstream configuration bug, never a user error.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSymbols<'ctx> {
    /// Panics with an out-of-bounds lookup/index message (S1).
    pub lookup_panic: FunctionValue<'ctx>,
    /// Panics with an out-of-bounds slice-expression message (S2).
    pub slice_panic: FunctionValue<'ctx>,
    /// Panics on a nil pointer dereference (S4/S5).
    pub nil_panic: FunctionValue<'ctx>,
    /// Panics when `make(chan T, n)` overflows the safe buffer-size limit (S3).
    pub chan_make_panic: FunctionValue<'ctx>,
    /// Panics on a negative shift amount.
    pub negative_shift_panic: FunctionValue<'ctx>,
    /// Allocates `n` bytes on the GC heap, returning an opaque pointer.
    pub alloc: FunctionValue<'ctx>,
    /// Registers a heap pointer with the stack-object tracking GC so a
    /// conservative scan can find it; only called when
    /// `CompileConfig::needs_stack_objects` is set.
    pub track_pointer: FunctionValue<'ctx>,
    /// Resolves a signature-switch function value's `code_key` back to a
    /// callable code pointer (signature-switch variant only).
    pub get_func_ptr: FunctionValue<'ctx>,
}

/// Names the eight symbols are expected to be declared under in the
/// module. Kept as a function rather than a `const` array so each lookup
/// site can report precisely which name was missing.
const SYMBOL_NAMES: [&str; 8] = [
    "runtime.lookupPanic",
    "runtime.slicePanic",
    "runtime.nilPanic",
    "runtime.chanMakePanic",
    "runtime.negativeShiftPanic",
    "runtime.alloc",
    "runtime.trackPointer",
    "runtime.getFuncPtr",
];

impl<'ctx> RuntimeSymbols<'ctx> {
    /// Looks up all eight runtime symbols in `module` by name. Panics
    /// (fatal compiler bug) naming the first missing symbol if the runtime
    /// library was not declared into the module.
    pub fn resolve(module: &Module<'ctx>) -> Self {
        let get = |name: &str| {
            module.get_function(name).unwrap_or_else(|| {
                log::error!("RuntimeSymbols::resolve: `{name}` is not declared in this module");
                panic!("runtime symbol `{name}` is not declared in this module")
            })
        };
        RuntimeSymbols {
            lookup_panic: get(SYMBOL_NAMES[0]),
            slice_panic: get(SYMBOL_NAMES[1]),
            nil_panic: get(SYMBOL_NAMES[2]),
            chan_make_panic: get(SYMBOL_NAMES[3]),
            negative_shift_panic: get(SYMBOL_NAMES[4]),
            alloc: get(SYMBOL_NAMES[5]),
            track_pointer: get(SYMBOL_NAMES[6]),
            get_func_ptr: get(SYMBOL_NAMES[7]),
        }
    }
}

/// Emits a call to a runtime function, appending the two trailing scalar
/// arguments every runtime call carries: an `undef` context pointer and a
/// `null` coroutine-handle pointer, in that order, after the caller's own
/// arguments.
pub fn call_runtime<'ctx>(
    builder: &inkwell::builder::Builder<'ctx>,
    ptr_type: inkwell::types::PointerType<'ctx>,
    target: FunctionValue<'ctx>,
    args: &[BasicValueEnum<'ctx>],
) -> CallSiteValue<'ctx> {
    let mut full_args: Vec<BasicMetadataValueEnum<'ctx>> =
        Vec::with_capacity(args.len() + 2);
    full_args.extend(args.iter().map(|value| (*value).into()));
    let undef_context: PointerValue<'ctx> = ptr_type.get_undef();
    let null_coroutine: PointerValue<'ctx> = ptr_type.const_null();
    full_args.push(undef_context.into());
    full_args.push(null_coroutine.into());
    builder
        .build_call(target, &full_args, "runtime.call")
        .expect("runtime call builder insertion failed")
}
