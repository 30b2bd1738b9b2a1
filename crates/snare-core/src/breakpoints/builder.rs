//! # Function Breakpoint Builder
//!
//! Builder pattern for configuring function breakpoints before registration.
//!
//! A function breakpoint needs a function descriptor ([`FunctionTarget`]) to
//! know its parameters. The descriptor comes from, in order:
//!
//! 1. [`FunctionBreakpointBuilder::target`], if called
//! 2. [`CallHook::default_target`] of the hook
//!
//! If neither provides one, [`FunctionBreakpointBuilder::build`] fails with
//! `MissingTarget`. The address defaults to the descriptor's `module!function`
//! symbol.

use std::fmt;
use std::sync::Arc;

use super::chain::{CallHook, CallTracker};
use super::function::FunctionBreakpoint;
use super::{BreakpointId, BreakpointKind};
use crate::arguments::{ArgumentExtractor, FunctionTarget};
use crate::error::{SnareError, SnareResult};
use crate::remote::{Reinterpret, RemoteTypes};
use crate::session::Session;
use crate::target::Target;
use crate::types::BreakpointAddress;

/// Builder for [`FunctionBreakpoint`]
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use snare_core::arguments::FunctionTarget;
/// use snare_core::breakpoints::{Breakpoint, BreakpointKind, FunctionBreakpoint, UnimplementedHook};
/// use snare_core::remote::NativeType;
///
/// let target = FunctionTarget::new("kernel32", "CloseHandle").param("hObject", NativeType::UPtr);
/// let bp = FunctionBreakpoint::builder(Arc::new(UnimplementedHook)).target(target).build()?;
///
/// assert_eq!(bp.address().to_string(), "kernel32!CloseHandle");
/// assert_eq!(bp.kind(), BreakpointKind::STANDARD);
/// # Ok::<(), snare_core::error::SnareError>(())
/// ```
pub struct FunctionBreakpointBuilder
{
    hook: Arc<dyn CallHook>,
    address: Option<BreakpointAddress>,
    target: Option<FunctionTarget>,
    hardware: bool,
    types: Option<Arc<dyn Reinterpret>>,
}

impl fmt::Debug for FunctionBreakpointBuilder
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("FunctionBreakpointBuilder")
            .field("address", &self.address)
            .field("target", &self.target)
            .field("hardware", &self.hardware)
            .field("types", &self.types.is_some())
            .finish_non_exhaustive()
    }
}

impl FunctionBreakpointBuilder
{
    /// Create a builder driven by `hook`.
    pub fn new(hook: Arc<dyn CallHook>) -> Self
    {
        Self {
            hook,
            address: None,
            target: None,
            hardware: false,
            types: None,
        }
    }

    /// Plant the breakpoint at an explicit location instead of the target's
    /// symbol.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use snare_core::arguments::FunctionTarget;
    /// use snare_core::breakpoints::{Breakpoint, FunctionBreakpoint, UnimplementedHook};
    ///
    /// let bp = FunctionBreakpoint::builder(Arc::new(UnimplementedHook))
    ///     .address(0x7ff6_1000_2000u64)
    ///     .target(FunctionTarget::new("app", "parse"))
    ///     .build()?;
    /// assert_eq!(bp.address().to_string(), "0x7ff610002000");
    /// # Ok::<(), snare_core::error::SnareError>(())
    /// ```
    #[must_use]
    pub fn address(mut self, address: impl Into<BreakpointAddress>) -> Self
    {
        self.address = Some(address.into());
        self
    }

    /// Set the function descriptor, overriding the hook's default.
    #[must_use]
    pub fn target(mut self, target: FunctionTarget) -> Self
    {
        self.target = Some(target);
        self
    }

    /// Realize the trap as a per-thread hardware execution breakpoint.
    ///
    /// Argument extraction and return chaining work the same; only the kind
    /// and the applicable contexts change.
    #[must_use]
    pub fn hardware(mut self) -> Self
    {
        self.hardware = true;
        self
    }

    /// Use a custom reinterpreter instead of [`RemoteTypes`].
    #[must_use]
    pub fn types(mut self, types: Arc<dyn Reinterpret>) -> Self
    {
        self.types = Some(types);
        self
    }

    /// Kind the built breakpoint will report.
    #[must_use]
    pub fn kind(&self) -> BreakpointKind
    {
        if self.hardware {
            BreakpointKind::HARDWARE_EXEC
        } else {
            BreakpointKind::STANDARD
        }
    }

    /// Build the breakpoint.
    ///
    /// ## Errors
    ///
    /// - `MissingTarget`: no target given and the hook has no default target
    /// - `PrototypeMismatch`: the target's names and types differ in length
    pub fn build(self) -> SnareResult<FunctionBreakpoint>
    {
        let kind = self.kind();
        let target = self
            .target
            .or_else(|| self.hook.default_target())
            .ok_or(SnareError::MissingTarget { kind })?;
        let address = self.address.unwrap_or_else(|| target.symbol());
        let types = self.types.unwrap_or_else(|| Arc::new(RemoteTypes));
        let extractor = ArgumentExtractor::with_types(target, types)?;

        Ok(FunctionBreakpoint::from_parts(address, kind, CallTracker::new(self.hook), extractor))
    }

    /// Build the breakpoint and register it with `session` on `target`.
    ///
    /// ## Errors
    ///
    /// Anything [`build`](Self::build) can fail with, plus whatever the session
    /// reports (e.g. `IncompatibleTarget` for a hardware breakpoint offered to
    /// a process).
    pub fn install(self, session: &mut dyn Session, target: Target) -> SnareResult<BreakpointId>
    {
        let breakpoint = self.build()?;
        session.add_breakpoint(Box::new(breakpoint), target)
    }
}
