//! Error taxonomy for the code-generation core.
//!
//! A plain enum implementing `std::error::Error` and `Display` by hand, no
//! `thiserror`. Only one diagnostic in this crate is user-visible;
//! everything else a caller could trigger is an internal invariant
//! violation and panics rather than trying to recover from a malformed SSA
//! producer.

use std::error::Error;
use std::fmt;

/// A source position, narrow enough to print without pulling in the SSA
/// producer's own span type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The one user-visible diagnostic this crate can produce: a
/// `make(chan T, n)` whose element type is large enough that
/// `create_chan_bounds_check`'s `max_buf_size` computation would itself
/// overflow. Reported non-fatally: the caller skips emitting that one
/// `MakeChan` instruction and continues compiling everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanElementTooBig {
    pub pos: SourcePos,
    pub element_size: u64,
}

impl fmt::Display for ChanElementTooBig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: channel element type is too big ({} bytes) to compute a safe channel buffer size limit",
            self.pos, self.element_size
        )
    }
}

impl Error for ChanElementTooBig {}

/// Wraps every recoverable diagnostic this crate can raise. Currently a
/// single variant; kept as an enum (rather than the bare struct) so a
/// future second user-visible diagnostic doesn't change every call site's
/// error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    ChanElementTooBig(ChanElementTooBig),
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::ChanElementTooBig(inner) => write!(f, "{inner}"),
        }
    }
}

impl Error for CodegenError {}
