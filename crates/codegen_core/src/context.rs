//! Module-scoped compile state.
//!
//! `CompileContext` owns the `inkwell` `Context`/`Module`, the target
//! data-layout query surface, the `CompileConfig`, the resolved
//! `RuntimeSymbols`, and the name-resolution/type-code caches every other
//! module consults. Mutable shared state lives behind `RefCell`, not
//! `Mutex` — this crate is single-threaded by construction.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::TargetData;
use inkwell::types::{IntType, PointerType};
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;
use sha2::{Digest, Sha256};

use crate::config::CompileConfig;
use crate::runtime::RuntimeSymbols;
use crate::types::Signature;

/// Module-scoped state threaded through every codegen call. Constructed
/// once per LLVM module.
pub struct CompileContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub target_data: TargetData,
    pub config: CompileConfig,
    pub runtime: RuntimeSymbols<'ctx>,

    /// Opaque pointer type at the target's default address space. Under
    /// LLVM 18's opaque-pointer model every pointer — byte pointer or
    /// function pointer — is this same `PointerType`; there is no separate
    /// `i8*` to cache alongside it.
    ptr_type: PointerType<'ctx>,
    /// Integer type matching the target's pointer width, used for
    /// `uintptr`-shaped values: int-to-ptr packed scalars, type codes,
    /// `code_key` fields.
    isize_type: IntType<'ctx>,

    /// Source function name → declared `FunctionValue`, populated in a
    /// two-pass declare-then-define scheme.
    functions: RefCell<HashMap<String, FunctionValue<'ctx>>>,
    /// `Signature` → interned stable type code, used by the
    /// signature-switch function-value variant both to pick a
    /// `funcValueWithSignature` global's name and to fill its `code`
    /// field.
    type_codes: RefCell<HashMap<Signature, i32>>,
    /// `SourceType` → already-built LLVM type, a cache-or-create table so
    /// the same source type is never lowered to LLVM IR twice.
    llvm_types: RefCell<HashMap<crate::types::SourceType, inkwell::types::BasicTypeEnum<'ctx>>>,
}

impl<'ctx> CompileContext<'ctx> {
    pub fn new(
        context: &'ctx Context,
        module: Module<'ctx>,
        target_data: TargetData,
        config: CompileConfig,
    ) -> Self {
        let runtime = RuntimeSymbols::resolve(&module);
        let ptr_type = context.ptr_type(AddressSpace::default());
        let isize_bits = target_data.get_pointer_byte_size(None) * 8;
        let isize_type = context.custom_width_int_type(isize_bits);
        let builder = context.create_builder();
        CompileContext {
            context,
            module,
            builder,
            target_data,
            config,
            runtime,
            ptr_type,
            isize_type,
            functions: RefCell::new(HashMap::new()),
            type_codes: RefCell::new(HashMap::new()),
            llvm_types: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the cached LLVM type for `ty`, if `util::to_llvm_basic_type`
    /// has already built one.
    pub fn cached_llvm_type(&self, ty: &crate::types::SourceType) -> Option<inkwell::types::BasicTypeEnum<'ctx>> {
        self.llvm_types.borrow().get(ty).copied()
    }

    /// Inserts `llvm_type` into the cache under `ty`. Idempotent: building
    /// the same `SourceType` twice before this is called simply overwrites
    /// the entry with an equal value.
    pub fn cache_llvm_type(&self, ty: crate::types::SourceType, llvm_type: inkwell::types::BasicTypeEnum<'ctx>) {
        self.llvm_types.borrow_mut().insert(ty, llvm_type);
    }

    pub fn ptr_type(&self) -> PointerType<'ctx> {
        self.ptr_type
    }

    pub fn isize_type(&self) -> IntType<'ctx> {
        self.isize_type
    }

    /// Size in bytes of one pointer on the compilation target. Every size
    /// threshold the pack codec and the ABI flattener compare against
    /// reads this value, never a hardcoded `8`.
    pub fn pointer_size_bytes(&self) -> u64 {
        self.target_data.get_pointer_byte_size(None) as u64
    }

    pub fn store_function(&self, name: impl Into<String>, value: FunctionValue<'ctx>) {
        self.functions.borrow_mut().insert(name.into(), value);
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.functions.borrow().get(name).copied()
    }

    /// Resolves a function previously stored under `name`, panicking if it
    /// was never declared — reaching a call site for an undeclared function
    /// is a compiler bug in the SSA producer, not a user error.
    pub fn resolve_function(&self, name: &str) -> FunctionValue<'ctx> {
        self.find_function(name).unwrap_or_else(|| {
            log::error!("resolve_function: `{name}` was never declared before being called");
            panic!("function `{name}` was never declared before being called")
        })
    }

    /// Interns and returns a stable `i32` type code for `signature`,
    /// deriving it from a SHA-256 digest of the signature's mangled form.
    /// Two structurally-equal signatures always get the same code;
    /// interning means the digest is only computed once per distinct
    /// signature.
    pub fn type_code_for(&self, signature: &Signature) -> i32 {
        if let Some(code) = self.type_codes.borrow().get(signature) {
            return *code;
        }
        let digest = Sha256::digest(signature.mangled().as_bytes());
        let code = i32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        log::trace!("type_code_for({:?}) interned as {code}", signature.mangled());
        self.type_codes.borrow_mut().insert(signature.clone(), code);
        code
    }
}
