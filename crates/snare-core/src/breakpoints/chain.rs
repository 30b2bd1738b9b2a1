//! Call / return chaining.
//!
//! A call breakpoint fires at a function's entry. From its trigger it may ask
//! for the function's return by calling [`CallSite::break_on_ret`], which reads
//! the return address at the top of the current thread's stack and plants a
//! [`ReturnBreakpoint`] there. When the return breakpoint fires it removes
//! itself from the session and hands the stop to the hook's
//! [`CallHook::ret_trigger`].
//!
//! "The next time this process executes the return address" stands in for
//! "this call returned". That holds for ordinary calls; recursion re-entering
//! before the first return, tail calls and exception unwinds are not tracked.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{Applicability, Breakpoint, BreakpointId, BreakpointKind, Stop, TriggerOutcome};
use crate::arguments::{ArgumentExtractor, ArgumentSnapshot, FunctionTarget};
use crate::error::{SnareError, SnareResult};
use crate::target::Target;
use crate::types::{Address, BreakpointAddress};

/// User logic attached to call and function breakpoints
///
/// All methods take `&self`: the hook is shared between the call breakpoint
/// and every return breakpoint it plants, so per-call state needs interior
/// mutability.
pub trait CallHook: Send + Sync
{
    /// Called at function entry. Default: nothing.
    fn call_trigger(&self, _call: &mut CallSite<'_, '_>) -> SnareResult<TriggerOutcome>
    {
        Ok(None)
    }

    /// Called when a return breakpoint planted by
    /// [`CallSite::break_on_ret`] fires.
    ///
    /// The default fails with `RetTriggerUnimplemented`: a hook that chains
    /// to the return has to implement this.
    fn ret_trigger(&self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        Err(SnareError::RetTriggerUnimplemented {
            address: stop.exception.address.to_string(),
        })
    }

    /// Function descriptor used when a function breakpoint is built without
    /// an explicit target.
    fn default_target(&self) -> Option<FunctionTarget>
    {
        None
    }
}

/// Hook with every default: no-op entry, unimplemented return
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedHook;

impl CallHook for UnimplementedHook {}

/// The "can chain to return" capability
#[derive(Clone)]
pub struct CallTracker
{
    hook: Arc<dyn CallHook>,
}

impl CallTracker
{
    /// Track calls on behalf of `hook`.
    #[must_use]
    pub fn new(hook: Arc<dyn CallHook>) -> Self
    {
        Self { hook }
    }

    /// The hook return breakpoints delegate to.
    #[must_use]
    pub fn hook(&self) -> &Arc<dyn CallHook>
    {
        &self.hook
    }

    /// Plant a return breakpoint at the return address of the current call.
    ///
    /// Must be called while the thread is stopped at the function's first
    /// instruction, where `[sp]` is the return address. The word is read with
    /// the bitness resolved for this stop. The new breakpoint is registered
    /// on the current process.
    pub fn break_on_ret(&self, stop: &mut Stop<'_>) -> SnareResult<BreakpointId>
    {
        let bitness = stop.resolve_bitness()?;
        let sp = stop.thread.stack_pointer()?;
        let return_address = Address::from(stop.process.read_word(sp, bitness)?);
        let target = Target::Process(stop.process.pid());

        let breakpoint = ReturnBreakpoint::new(return_address, Arc::clone(&self.hook));
        let id = stop.session.add_breakpoint(Box::new(breakpoint), target)?;
        debug!(
            id = %id,
            return_address = %return_address,
            tid = %stop.thread.tid(),
            "planted return breakpoint"
        );
        Ok(id)
    }
}

impl fmt::Debug for CallTracker
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("CallTracker").finish_non_exhaustive()
    }
}

/// What a [`CallHook`] sees at function entry
pub struct CallSite<'s, 'a>
{
    stop: &'s mut Stop<'a>,
    tracker: &'s CallTracker,
    extractor: Option<&'s ArgumentExtractor>,
    address: &'s BreakpointAddress,
}

impl<'s, 'a> CallSite<'s, 'a>
{
    pub(crate) fn new(
        stop: &'s mut Stop<'a>,
        tracker: &'s CallTracker,
        extractor: Option<&'s ArgumentExtractor>,
        address: &'s BreakpointAddress,
    ) -> Self
    {
        Self {
            stop,
            tracker,
            extractor,
            address,
        }
    }

    /// The stop being handled.
    pub fn stop(&mut self) -> &mut Stop<'a>
    {
        &mut *self.stop
    }

    /// Location of the breakpoint that fired.
    #[must_use]
    pub fn address(&self) -> &BreakpointAddress
    {
        self.address
    }

    /// The function prototype, when the breakpoint carries one.
    #[must_use]
    pub fn target(&self) -> Option<&FunctionTarget>
    {
        self.extractor.map(ArgumentExtractor::target)
    }

    /// Extract the function's arguments for this stop.
    ///
    /// ## Errors
    ///
    /// `NoPrototype` for plain call breakpoints, plus any read failure.
    pub fn arguments(&self) -> SnareResult<ArgumentSnapshot>
    {
        let extractor = self.extractor.ok_or_else(|| SnareError::NoPrototype(self.address.to_string()))?;
        extractor.extract_arguments(self.stop.debugger_bitness(), self.stop.process, self.stop.thread)
    }

    /// Break when this call returns. See [`CallTracker::break_on_ret`].
    pub fn break_on_ret(&mut self) -> SnareResult<BreakpointId>
    {
        self.tracker.break_on_ret(&mut *self.stop)
    }
}

/// Software breakpoint at a function entry that can chain to its return
#[derive(Debug, Clone)]
pub struct CallBreakpoint
{
    address: BreakpointAddress,
    tracker: CallTracker,
}

impl CallBreakpoint
{
    /// Call breakpoint at `address` driven by `hook`.
    pub fn new(address: impl Into<BreakpointAddress>, hook: Arc<dyn CallHook>) -> Self
    {
        Self {
            address: address.into(),
            tracker: CallTracker::new(hook),
        }
    }

    /// The chaining capability.
    #[must_use]
    pub fn tracker(&self) -> &CallTracker
    {
        &self.tracker
    }
}

impl Breakpoint for CallBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::CALL
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ProcessOnly
    }

    fn trigger(&mut self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        let mut site = CallSite::new(stop, &self.tracker, None, &self.address);
        self.tracker.hook().call_trigger(&mut site)
    }
}

/// Transient one-shot breakpoint at a return address
///
/// Holds a shared handle to the hook of the call breakpoint that planted it
/// (`initial_breakpoint`). The call breakpoint keeps no list of these.
pub struct ReturnBreakpoint
{
    address: BreakpointAddress,
    initial_breakpoint: Arc<dyn CallHook>,
    fired: bool,
}

impl ReturnBreakpoint
{
    /// Return breakpoint at `address` delegating to `initial_breakpoint`.
    pub fn new(address: impl Into<BreakpointAddress>, initial_breakpoint: Arc<dyn CallHook>) -> Self
    {
        Self {
            address: address.into(),
            initial_breakpoint,
            fired: false,
        }
    }

    /// Hook of the originating call breakpoint.
    #[must_use]
    pub fn initial_breakpoint(&self) -> &Arc<dyn CallHook>
    {
        &self.initial_breakpoint
    }

    /// Whether this breakpoint already fired.
    #[must_use]
    pub fn has_fired(&self) -> bool
    {
        self.fired
    }
}

impl fmt::Debug for ReturnBreakpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ReturnBreakpoint")
            .field("address", &self.address)
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl Breakpoint for ReturnBreakpoint
{
    fn address(&self) -> &BreakpointAddress
    {
        &self.address
    }

    fn kind(&self) -> BreakpointKind
    {
        BreakpointKind::RETURN
    }

    fn applicability(&self) -> Applicability
    {
        Applicability::ProcessOnly
    }

    fn trigger(&mut self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        if self.fired {
            trace!(address = %self.address, "return breakpoint already fired");
            return Ok(None);
        }
        self.fired = true;

        let targets = [Target::Process(stop.process.pid())];
        let removed = stop.session.remove_breakpoint(stop.breakpoint, &targets)?;
        debug!(address = %self.address, id = %stop.breakpoint, removed, "return breakpoint hit");

        self.initial_breakpoint.ret_trigger(stop)
    }
}
