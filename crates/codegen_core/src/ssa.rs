//! The contract this crate consumes from the SSA producer.
//!
//! The SSA producer itself — the front end that lowers source syntax to a
//! typed, single-assignment intermediate form — is out of scope. What it
//! must hand this crate, at each call site, is modeled here as plain data
//! rather than as an invented trait-object hierarchy: a value paired with
//! its `SourceType`, and (where the safety layer's nil-check elision needs
//! it) a fact about where that value came from.

use inkwell::values::BasicValueEnum;

use crate::types::SourceType;

/// Where a pointer value was produced, as far as nil-check elision needs to
/// know. The check is elided for three producer shapes: a module-level
/// global, an address-of-element result (bounds-checked already, so known
/// non-nil unless the parent was nil — which was itself already checked),
/// and a conversion whose source is a raw/untyped pointer (the programmer
/// is on their own for that one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    /// Address of a module-level global. Never null.
    Global,
    /// Result of indexing into an array/slice/struct field address
    /// computation. Never null given its parent survived its own checks.
    IndexAddrResult,
    /// Result of converting from a raw (`unsafe.Pointer`-equivalent) source.
    RawPointerConvert,
    /// Anything else: load result, call result, phi, parameter, etc. — must
    /// be nil-checked unless the static type proves otherwise.
    Other,
}

impl ValueOrigin {
    /// True when `create_nil_check` should skip emitting the branch/panic
    /// entirely and return the value unchanged.
    pub fn elides_nil_check(self) -> bool {
        matches!(
            self,
            ValueOrigin::Global | ValueOrigin::IndexAddrResult | ValueOrigin::RawPointerConvert
        )
    }
}

/// An SSA value together with the source-language type and origin fact the
/// codegen core needs alongside the raw `inkwell` value. The SSA producer
/// constructs one of these at every call boundary into this crate; none of
/// its fields are ever synthesized internally from the LLVM value alone.
#[derive(Debug, Clone)]
pub struct TypedValue<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub ty: SourceType,
    pub origin: ValueOrigin,
}

impl<'ctx> TypedValue<'ctx> {
    pub fn new(value: BasicValueEnum<'ctx>, ty: SourceType) -> Self {
        TypedValue {
            value,
            ty,
            origin: ValueOrigin::Other,
        }
    }

    pub fn with_origin(value: BasicValueEnum<'ctx>, ty: SourceType, origin: ValueOrigin) -> Self {
        TypedValue { value, ty, origin }
    }
}

/// A single variable captured into a closure environment, as the SSA
/// producer's free-variable analysis hands it to `funcvalue::build_closure`:
/// the captured value plus the type needed to compute the environment
/// struct's layout for `pack::pack`.
#[derive(Debug, Clone)]
pub struct CaptureBinding<'ctx> {
    pub name: &'static str,
    pub value: BasicValueEnum<'ctx>,
    pub ty: SourceType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_index_addr_and_raw_convert_elide_the_nil_check() {
        assert!(ValueOrigin::Global.elides_nil_check());
        assert!(ValueOrigin::IndexAddrResult.elides_nil_check());
        assert!(ValueOrigin::RawPointerConvert.elides_nil_check());
    }

    #[test]
    fn other_origin_requires_the_nil_check() {
        assert!(!ValueOrigin::Other.elides_nil_check());
    }
}
