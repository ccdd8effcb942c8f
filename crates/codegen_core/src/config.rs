//! Configuration surface recognised by the code-generation core.

/// Selects which of the two function-value representations this build
/// uses. Chosen once per build and never mixed within a module: every
/// closure, every `funcValue` runtime type, and every `decode_func_value`
/// call site must agree on the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncImplementation {
    /// `{ context: ptr, code: ptr }` — two words, no runtime dispatch on call.
    Doubleword,
    /// `{ context: ptr, code_key: uintptr }` where `code_key` addresses an
    /// interned `funcValueWithSignature` record. One pointer-word smaller at
    /// rest, costs a `getFuncPtr` runtime call to decode.
    Switch,
}

/// Module-global configuration threaded through every codegen call.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Which function-value representation this build emits.
    pub func_implementation: FuncImplementation,
    /// Whether the garbage collector requires every heap pointer handed out
    /// by the pack codec to additionally be registered via
    /// `runtime.trackPointer` (stack-object tracking GCs only).
    pub needs_stack_objects: bool,
    /// Opaque build tags, forwarded but never interpreted here — they
    /// parametrise the override table assembled by the (out-of-scope)
    /// toolchain-root driver.
    pub build_tags: Vec<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            func_implementation: FuncImplementation::Doubleword,
            needs_stack_objects: false,
            build_tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_picks_doubleword() {
        let config = CompileConfig::default();
        assert_eq!(config.func_implementation, FuncImplementation::Doubleword);
        assert!(!config.needs_stack_objects);
        assert!(config.build_tags.is_empty());
    }
}
