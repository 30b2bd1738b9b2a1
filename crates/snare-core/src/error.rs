//! # Error Types
//!
//! Error handling for the breakpoint engine.
//!
//! We use `thiserror` to generate the `Error` trait implementations and the
//! messages.

use thiserror::Error;

use crate::breakpoints::BreakpointKind;
use crate::target::Target;

/// Main error type for breakpoint operations
///
/// ## Error Categories
///
/// 1. **Configuration errors**: MissingTarget, PrototypeMismatch, InvalidEvents
/// 2. **Protocol errors**: RetTriggerUnimplemented, NoPrototype
/// 3. **Registration errors**: IncompatibleTarget
/// 4. **Target access errors**: MemoryRead, UnknownField, NotScalar
/// 5. **Output errors**: Template, Io
///
/// Triggers never swallow these; they travel back to whoever dispatched the
/// debug event.
#[derive(Error, Debug)]
pub enum SnareError
{
    /// A breakpoint that needs a function descriptor was built without one
    ///
    /// Raised at construction time, never at trigger time. Either pass a
    /// target explicitly or give the hook a default target.
    #[error("{kind} breakpoint needs a target: none given and the hook has no default target")]
    MissingTarget
    {
        /// Kind of the breakpoint being built
        kind: BreakpointKind,
    },

    /// The call hook never implemented `ret_trigger`
    ///
    /// A return breakpoint fired for a call breakpoint whose hook relies on the
    /// default implementation. This is a bug in the hook, not a runtime
    /// condition.
    #[error("ret_trigger is not implemented for the call breakpoint at {address}")]
    RetTriggerUnimplemented
    {
        /// Location of the return breakpoint that fired
        address: String,
    },

    /// Declared parameter names and declared argument types disagree in length
    #[error("Prototype mismatch for {function}: {names} parameter names but {types} argument types")]
    PrototypeMismatch
    {
        /// `module!function` of the target
        function: String,
        /// Number of declared names
        names: usize,
        /// Number of declared types
        types: usize,
    },

    /// Arguments were requested from a breakpoint that carries no prototype
    #[error("Breakpoint at {0} has no function prototype to extract arguments with")]
    NoPrototype(String),

    /// The session refused to attach a breakpoint to an execution context
    #[error("{kind} breakpoint cannot be attached to {target}")]
    IncompatibleTarget
    {
        /// Kind of the rejected breakpoint
        kind: BreakpointKind,
        /// Context it was offered
        target: Target,
    },

    /// Reading target memory failed
    #[error("Failed to read {size} bytes at 0x{address:x}")]
    MemoryRead
    {
        /// Address of the read
        address: u64,
        /// Width of the read in bytes
        size: usize,
    },

    /// A remote structure view was asked for a field it doesn't have
    #[error("Structure {structure} has no field named {field}")]
    UnknownField
    {
        /// Structure name
        structure: String,
        /// Requested field
        field: String,
    },

    /// A remote view was read as a scalar but points at a structure
    #[error("Cannot read {0} as a scalar value")]
    NotScalar(String),

    /// A memory breakpoint event string contained something other than R/W/X
    #[error("Invalid memory breakpoint events: {0}")]
    InvalidEvents(String),

    /// A print template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid argument passed to an engine function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (writing print breakpoint output, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, SnareError>`
///
/// ```rust
/// use snare_core::error::SnareResult;
/// fn foo() -> SnareResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type SnareResult<T> = std::result::Result<T, SnareError>;
