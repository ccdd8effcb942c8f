//! The compile-time type lattice mirroring the source language's types.
//!
//! A small `Clone + PartialEq + Eq + Hash + Serialize` enum used both as a
//! cache key (`CompileContext` caches the LLVM type for each `SourceType`
//! it has already converted) and as the carrier of facts the codegen core
//! cannot recover from the LLVM type alone — signedness, "is this a
//! raw/untyped pointer", "is this a slice data pointer" — threaded
//! alongside every IR value that needs them.

use std::fmt;

/// Pointer provenance relevant to nil-check elision and to
/// parameter-attribute suppression.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum PointerKind {
    /// An ordinary typed pointer to a single value (e.g. `*Foo`, a channel
    /// handle, a map handle). May receive `dereferenceable_or_null`.
    Typed,
    /// `unsafe.Pointer`-equivalent: an untyped/raw pointer. Conversions
    /// producing one are explicit unsafe casts — never nil-checked, never
    /// annotated `dereferenceable_or_null`.
    Raw,
    /// The data pointer half of a slice value. Bounds-checked on every
    /// access by construction, so never nil-checked; never annotated
    /// `dereferenceable_or_null` (the backing array may be zero-length).
    SliceData,
}

/// Canonical semantic type representation used throughout ABI flattening,
/// safety-check widening, and function-value construction. Variants are
/// intentionally minimal; richer source-language concepts (generics, named
/// type aliases) are resolved to this lattice before reaching the core.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceType {
    /// Fixed-width integer primitive with explicit signedness, needed
    /// because every widening in the safety-assertion layer picks
    /// sign-extend vs. zero-extend from this flag alone, never from the
    /// LLVM integer type.
    Integer { width: u32, signed: bool },
    /// IEEE-754 double.
    FloatingPoint,
    /// Boolean truth value (`i1` at the IR level).
    Boolean,
    /// Unicode scalar value.
    Character,
    /// Immutable UTF-8 string value (represented as a pointer at the IR
    /// boundary; the pointer is a `SliceData`-kind pointer so it is never
    /// nil-checked or `dereferenceable_or_null`-tagged).
    String,
    /// Unit / no-value type.
    Void,
    /// Placeholder for an unresolved type; reaching the codegen core with
    /// this variant is always a compiler bug upstream of this crate.
    Unknown,
    /// A pointer, tagged with the provenance that drives elision/attribute
    /// decisions.
    Pointer { to: Box<SourceType>, kind: PointerKind },
    /// Fixed-length heterogeneous ordered collection.
    Tuple(Vec<SourceType>),
    /// Fixed-length homogeneous collection, flattened as a leaf for ABI
    /// purposes — a known conservative choice preserved for
    /// calling-convention stability.
    Array { element: Box<SourceType>, len: u64 },
    /// Dynamically-sized homogeneous view `{ data: *T, len, cap }`. Its data
    /// pointer is always `PointerKind::SliceData`.
    Slice(Box<SourceType>),
    /// Channel handle of the given element type. Element size drives the
    /// channel-make size check; the handle itself behaves like
    /// `PointerKind::Typed` for nil-checking purposes.
    Chan { element: Box<SourceType>, element_size: u64 },
    /// Map handle; same nil/attribute treatment as a channel handle.
    Map { key: Box<SourceType>, value: Box<SourceType> },
    /// A set of method signatures implemented by some concrete type; carried
    /// opaquely since interface devirtualization is out of this crate's
    /// scope.
    Interface(Vec<String>),
    /// User-defined struct with name and ordered list of
    /// `(field_name, field_type)` pairs. Field order is the ABI-visible
    /// flattening order.
    Struct(String, Vec<(String, SourceType)>),
    /// A first-class function / closure type.
    Function(Signature),
}

/// A callable signature: ordered parameter types plus a return type. Used
/// both to build the raw LLVM function-pointer type and as the key for the
/// type-code cache that the signature-switch function-value variant
/// interns.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Signature {
    pub params: Vec<SourceType>,
    pub return_type: Box<SourceType>,
}

impl Signature {
    pub fn new(params: Vec<SourceType>, return_type: SourceType) -> Self {
        Signature {
            params,
            return_type: Box::new(return_type),
        }
    }

    /// A stable textual rendering used as the hash-codec input for the
    /// signature's type code (see `context::CompileContext::type_code_for`).
    /// Two signatures that are structurally equal under `PartialEq` must
    /// produce the same mangled string, and vice versa.
    pub fn mangled(&self) -> String {
        let mut out = String::from("(");
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&param.mangled());
        }
        out.push_str(")->");
        out.push_str(&self.return_type.mangled());
        out
    }
}

impl SourceType {
    /// True for any leaf that should never carry `dereferenceable_or_null`:
    /// raw pointers and slice data pointers.
    pub fn suppresses_dereferenceable(&self) -> bool {
        matches!(
            self,
            SourceType::Pointer {
                kind: PointerKind::Raw | PointerKind::SliceData,
                ..
            }
        )
    }

    /// True for pointer-shaped leaves that *do* qualify for
    /// `dereferenceable_or_null`: typed pointers, channel handles, map
    /// handles.
    pub fn wants_dereferenceable(&self) -> bool {
        match self {
            SourceType::Pointer {
                kind: PointerKind::Typed,
                ..
            } => true,
            SourceType::Chan { .. } | SourceType::Map { .. } => true,
            _ => false,
        }
    }

    /// Mangled form used inside `Signature::mangled`.
    fn mangled(&self) -> String {
        match self {
            SourceType::Integer { width, signed } => {
                format!("{}{}", if *signed { "i" } else { "u" }, width)
            }
            SourceType::FloatingPoint => "f64".to_string(),
            SourceType::Boolean => "bool".to_string(),
            SourceType::Character => "char".to_string(),
            SourceType::String => "str".to_string(),
            SourceType::Void => "void".to_string(),
            SourceType::Unknown => "?".to_string(),
            SourceType::Pointer { to, kind } => {
                let tag = match kind {
                    PointerKind::Typed => "p",
                    PointerKind::Raw => "rp",
                    PointerKind::SliceData => "sp",
                };
                format!("{tag}<{}>", to.mangled())
            }
            SourceType::Tuple(items) => {
                let inner: Vec<_> = items.iter().map(SourceType::mangled).collect();
                format!("tuple<{}>", inner.join(","))
            }
            SourceType::Array { element, len } => format!("[{len}]{}", element.mangled()),
            SourceType::Slice(element) => format!("slice<{}>", element.mangled()),
            SourceType::Chan { element, .. } => format!("chan<{}>", element.mangled()),
            SourceType::Map { key, value } => format!("map<{},{}>", key.mangled(), value.mangled()),
            SourceType::Interface(methods) => format!("iface<{}>", methods.join(",")),
            SourceType::Struct(name, fields) => {
                let inner: Vec<_> = fields
                    .iter()
                    .map(|(name, ty)| format!("{name}:{}", ty.mangled()))
                    .collect();
                format!("struct {name}{{{}}}", inner.join(","))
            }
            SourceType::Function(sig) => format!("fn{}", sig.mangled()),
        }
    }
}

impl fmt::Debug for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mangled())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mangled())
    }
}
