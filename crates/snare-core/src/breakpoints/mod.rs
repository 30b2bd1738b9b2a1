//! # Breakpoints
//!
//! The breakpoint contract and the simple breakpoint kinds.
//!
//! A breakpoint is a value the session stores in its table and calls back when
//! the trap it describes fires. The engine only models the logical side:
//! *where* (`address`), *what kind* (`kind`), *which contexts it may be
//! attached to* (`applies_to`) and *what happens when it fires* (`trigger`).
//! Patching int3 bytes, programming debug registers or installing guard pages
//! is the session's business.
//!
//! Dispatch goes through `Box<dyn Breakpoint>` so new kinds can be added
//! outside this crate. The composite kinds live in submodules:
//!
//! - [`chain`]: call breakpoints and the transient return breakpoints they plant
//! - [`function`]: function breakpoints that extract arguments
//! - [`builder`]: configuration of function breakpoints
//! - [`print`]: breakpoints that render a template on hit

pub mod builder;
pub mod chain;
pub mod function;
pub mod print;

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use crate::bitness::resolve_bitness;
use crate::error::{SnareError, SnareResult};
use crate::session::Session;
use crate::target::{ExceptionRecord, Target, TargetProcess, TargetThread};
use crate::types::{Address, Bitness, BreakpointAddress};

pub use builder::FunctionBreakpointBuilder;
pub use chain::{CallBreakpoint, CallHook, CallSite, CallTracker, ReturnBreakpoint, UnimplementedHook};
pub use function::FunctionBreakpoint;
pub use print::PrintBreakpoint;

/// Unique identifier for a breakpoint registered with a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for BreakpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Open tag naming a breakpoint kind
///
/// Not a closed enum: composite and third-party kinds define their own tags
/// with [`BreakpointKind::new`].
///
/// ```rust
/// use snare_core::breakpoints::BreakpointKind;
///
/// const TRACE: BreakpointKind = BreakpointKind::new("TRACEBP");
/// assert_ne!(TRACE, BreakpointKind::STANDARD);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointKind(&'static str);

impl BreakpointKind
{
    /// Software (int3) breakpoint.
    pub const STANDARD: Self = Self("BP");
    /// Hardware execution breakpoint (debug registers).
    pub const HARDWARE_EXEC: Self = Self("HXBP");
    /// Memory access breakpoint.
    pub const MEMORY: Self = Self("MEMBP");
    /// Breakpoint forwarding to a user callback.
    pub const PROXY: Self = Self("PROXYBP");
    /// Function entry breakpoint that can chain to the return.
    pub const CALL: Self = Self("CALLBP");
    /// Transient breakpoint planted at a return address.
    pub const RETURN: Self = Self("RETBP");
    /// Breakpoint that renders a template.
    pub const PRINT: Self = Self("PRINTBP");

    /// Define a new kind tag.
    #[must_use]
    pub const fn new(tag: &'static str) -> Self
    {
        Self(tag)
    }

    /// The tag string.
    #[must_use]
    pub const fn tag(self) -> &'static str
    {
        self.0
    }
}

impl fmt::Display for BreakpointKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.0)
    }
}

/// Which execution contexts a breakpoint may be attached to
///
/// Every breakpoint type states one explicitly; there is no permissive
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability
{
    /// Whole-process contexts only (software traps, memory breakpoints).
    ProcessOnly,
    /// Single-thread contexts only (hardware debug registers).
    ThreadOnly,
}

impl Applicability
{
    /// Policy implied by a kind: hardware-exec is per thread, anything else
    /// is per process.
    #[must_use]
    pub fn for_kind(kind: BreakpointKind) -> Self
    {
        if kind == BreakpointKind::HARDWARE_EXEC {
            Applicability::ThreadOnly
        } else {
            Applicability::ProcessOnly
        }
    }

    /// Whether `target` satisfies this policy.
    #[must_use]
    pub const fn permits(self, target: &Target) -> bool
    {
        match self {
            Applicability::ProcessOnly => target.is_process(),
            Applicability::ThreadOnly => target.is_thread(),
        }
    }
}

/// Whatever a trigger hands back to its dispatcher
///
/// Opaque to the dispatcher; return breakpoints pass the result of
/// `ret_trigger` through it.
pub type TriggerOutcome = Option<Box<dyn Any + Send>>;

/// Everything delivered with one breakpoint hit
///
/// The session, the current process and the current thread are passed
/// explicitly rather than looked up, so a trigger can only see the stop it was
/// called for.
pub struct Stop<'a>
{
    /// Session owning the breakpoint table.
    pub session: &'a mut dyn Session,
    /// Exception that reported the hit.
    pub exception: &'a ExceptionRecord,
    /// Process that hit the breakpoint.
    pub process: &'a dyn TargetProcess,
    /// Thread that hit the breakpoint.
    pub thread: &'a dyn TargetThread,
    /// Id of the breakpoint being triggered.
    pub breakpoint: BreakpointId,
}

impl<'a> Stop<'a>
{
    /// Bundle a stop.
    pub fn new(
        session: &'a mut dyn Session,
        exception: &'a ExceptionRecord,
        process: &'a dyn TargetProcess,
        thread: &'a dyn TargetThread,
        breakpoint: BreakpointId,
    ) -> Self
    {
        Self {
            session,
            exception,
            process,
            thread,
            breakpoint,
        }
    }

    /// Bitness of the debugger, as reported by the session.
    #[must_use]
    pub fn debugger_bitness(&self) -> Bitness
    {
        self.session.debugger_bitness()
    }

    /// Bitness of the code the thread is stopped in.
    pub fn resolve_bitness(&self) -> SnareResult<Bitness>
    {
        resolve_bitness(self.debugger_bitness(), self.process, self.thread)
    }
}

impl fmt::Debug for Stop<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Stop")
            .field("exception", self.exception)
            .field("pid", &self.process.pid())
            .field("tid", &self.thread.tid())
            .field("breakpoint", &self.breakpoint)
            .finish_non_exhaustive()
    }
}

/// A planted trap as seen by the dispatcher
pub trait Breakpoint: Send + fmt::Debug
{
    /// Where the trap is planted.
    fn address(&self) -> &BreakpointAddress;

    /// Kind tag.
    fn kind(&self) -> BreakpointKind;

    /// Which contexts this breakpoint may be attached to.
    fn applicability(&self) -> Applicability;

    /// Whether this breakpoint may be attached to `target`. Pure.
    fn applies_to(&self, target: &Target) -> bool
    {
        self.applicability().permits(target)
    }

    /// Called by the dispatcher when the trap fires. Default: nothing.
    fn trigger(&mut self, _stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        Ok(None)
    }
}

/// Standard software (int3) breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareBreakpoint
{
    address: BreakpointAddress,
}

impl SoftwareBreakpoint
{
    /// Breakpoint at `address`.
    pub fn new(address: impl Into<BreakpointAddress>) -> Self
    {
        Self { address: address.into() }
    }
}

impl Breakpoint for SoftwareBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::STANDARD
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ProcessOnly
    }
}

/// Hardware execution breakpoint (debug registers, per thread)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareBreakpoint
{
    address: BreakpointAddress,
}

impl HardwareBreakpoint
{
    /// Breakpoint at `address`.
    pub fn new(address: impl Into<BreakpointAddress>) -> Self
    {
        Self { address: address.into() }
    }
}

impl Breakpoint for HardwareBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::HARDWARE_EXEC
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ThreadOnly
    }
}

/// Kind of memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccess
{
    /// Data read
    Read,
    /// Data write
    Write,
    /// Instruction fetch
    Execute,
}

impl MemoryAccess
{
    const fn bit(self) -> u8
    {
        match self {
            MemoryAccess::Read => 0b001,
            MemoryAccess::Write => 0b010,
            MemoryAccess::Execute => 0b100,
        }
    }
}

/// Set of memory accesses a memory breakpoint watches
///
/// Parses from and displays as a string of `R`, `W`, `X` letters.
///
/// ```rust
/// use snare_core::breakpoints::{MemoryAccess, MemoryEvents};
///
/// let events: MemoryEvents = "rw".parse().unwrap();
/// assert!(events.contains(MemoryAccess::Write));
/// assert!(!events.contains(MemoryAccess::Execute));
/// assert_eq!(events.to_string(), "RW");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryEvents(u8);

impl MemoryEvents
{
    /// No access at all.
    pub const NONE: Self = Self(0);
    /// Read, write and execute.
    pub const ALL: Self = Self(0b111);

    /// Set containing a single access.
    #[must_use]
    pub const fn only(access: MemoryAccess) -> Self
    {
        Self(access.bit())
    }

    /// This set plus `access`.
    #[must_use]
    pub const fn with(self, access: MemoryAccess) -> Self
    {
        Self(self.0 | access.bit())
    }

    /// Whether `access` is in the set.
    #[must_use]
    pub const fn contains(self, access: MemoryAccess) -> bool
    {
        self.0 & access.bit() != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool
    {
        self.0 == 0
    }
}

impl Default for MemoryEvents
{
    fn default() -> Self
    {
        Self::ALL
    }
}

impl FromStr for MemoryEvents
{
    type Err = SnareError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        s.chars().try_fold(Self::NONE, |events, c| match c.to_ascii_uppercase() {
            'R' => Ok(events.with(MemoryAccess::Read)),
            'W' => Ok(events.with(MemoryAccess::Write)),
            'X' => Ok(events.with(MemoryAccess::Execute)),
            _ => Err(SnareError::InvalidEvents(s.to_string())),
        })
    }
}

impl fmt::Display for MemoryEvents
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (access, letter) in [
            (MemoryAccess::Read, 'R'),
            (MemoryAccess::Write, 'W'),
            (MemoryAccess::Execute, 'X'),
        ] {
            if self.contains(access) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// Memory access breakpoint over a region
///
/// Describes what to watch; triggering does nothing by default. Wrap it or
/// implement [`Breakpoint`] on your own type to act on hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBreakpoint
{
    address: BreakpointAddress,
    size: u64,
    events: MemoryEvents,
}

impl MemoryBreakpoint
{
    /// Default watched region size (one page).
    pub const DEFAULT_SIZE: u64 = 0x1000;

    /// Watch one page at `address` for every kind of access.
    pub fn new(address: impl Into<BreakpointAddress>) -> Self
    {
        Self {
            address: address.into(),
            size: Self::DEFAULT_SIZE,
            events: MemoryEvents::ALL,
        }
    }

    /// Override the region size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self
    {
        self.size = size;
        self
    }

    /// Override the watched events.
    #[must_use]
    pub fn with_events(mut self, events: MemoryEvents) -> Self
    {
        self.events = events;
        self
    }

    /// Size of the watched region in bytes.
    #[must_use]
    pub fn size(&self) -> u64
    {
        self.size
    }

    /// Watched events.
    #[must_use]
    pub fn events(&self) -> MemoryEvents
    {
        self.events
    }

    /// Whether `access` is watched.
    #[must_use]
    pub fn watches(&self, access: MemoryAccess) -> bool
    {
        self.events.contains(access)
    }

    /// Whether `address` falls in the watched region (numeric locations only).
    #[must_use]
    pub fn covers(&self, address: Address) -> bool
    {
        self.address
            .as_numeric()
            .is_some_and(|start| address >= start && address.value() - start.value() < self.size)
    }
}

impl Breakpoint for MemoryBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::MEMORY
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ProcessOnly
    }
}

/// Callback type of a [`ProxyBreakpoint`].
pub type ProxyCallback = Box<dyn FnMut(&mut Stop<'_>) -> SnareResult<TriggerOutcome> + Send>;

/// Breakpoint that forwards `trigger` to a closure
///
/// The escape hatch for ad hoc behavior without defining a type.
///
/// ```rust
/// use snare_core::breakpoints::{Breakpoint, BreakpointKind, ProxyBreakpoint};
///
/// let bp = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, |stop| {
///     tracing::info!("hit at {}", stop.exception.address);
///     Ok(None)
/// });
/// assert_eq!(bp.kind(), BreakpointKind::STANDARD);
/// ```
pub struct ProxyBreakpoint
{
    address: BreakpointAddress,
    kind: BreakpointKind,
    callback: ProxyCallback,
}

impl ProxyBreakpoint
{
    /// Forward hits at `address` to `callback`, reporting `kind`.
    pub fn new<F>(address: impl Into<BreakpointAddress>, kind: BreakpointKind, callback: F) -> Self
    where
        F: FnMut(&mut Stop<'_>) -> SnareResult<TriggerOutcome> + Send + 'static,
    {
        Self {
            address: address.into(),
            kind,
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for ProxyBreakpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ProxyBreakpoint")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Breakpoint for ProxyBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        self.kind
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::for_kind(self.kind)
    }

    fn trigger(&mut self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        (self.callback)(stop)
    }
}
