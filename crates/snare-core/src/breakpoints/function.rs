//! Function breakpoints: call tracking plus argument extraction.
//!
//! A [`FunctionBreakpoint`] composes three capabilities, each held by value:
//!
//! - an [`Applicability`] picking how the trap is realized (process-level
//!   software trap, or per-thread hardware execution trap),
//! - a [`CallTracker`] so the hook can chain to the function's return,
//! - an [`ArgumentExtractor`] built from the function's prototype.
//!
//! Build one with [`FunctionBreakpoint::builder`].

use std::sync::Arc;

use super::builder::FunctionBreakpointBuilder;
use super::chain::{CallHook, CallSite, CallTracker};
use super::{Applicability, Breakpoint, BreakpointKind, Stop, TriggerOutcome};
use crate::arguments::{ArgumentExtractor, ArgumentSnapshot};
use crate::error::SnareResult;
use crate::types::BreakpointAddress;

/// Breakpoint on a known function that can read its arguments
#[derive(Debug, Clone)]
pub struct FunctionBreakpoint
{
    address: BreakpointAddress,
    kind: BreakpointKind,
    applicability: Applicability,
    tracker: CallTracker,
    extractor: ArgumentExtractor,
}

impl FunctionBreakpoint
{
    /// Start configuring a function breakpoint driven by `hook`.
    pub fn builder(hook: Arc<dyn CallHook>) -> FunctionBreakpointBuilder
    {
        FunctionBreakpointBuilder::new(hook)
    }

    pub(crate) fn from_parts(
        address: BreakpointAddress,
        kind: BreakpointKind,
        tracker: CallTracker,
        extractor: ArgumentExtractor,
    ) -> Self
    {
        Self {
            address,
            kind,
            applicability: Applicability::for_kind(kind),
            tracker,
            extractor,
        }
    }

    /// The argument extraction capability.
    #[must_use]
    pub fn extractor(&self) -> &ArgumentExtractor
    {
        &self.extractor
    }

    /// The chaining capability.
    #[must_use]
    pub fn tracker(&self) -> &CallTracker
    {
        &self.tracker
    }

    /// Extract this function's arguments at `stop`.
    pub fn extract_arguments(&self, stop: &Stop<'_>) -> SnareResult<ArgumentSnapshot>
    {
        self.extractor.extract_arguments(stop.debugger_bitness(), stop.process, stop.thread)
    }
}

impl Breakpoint for FunctionBreakpoint
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
        self.applicability
    }

    fn trigger(&mut self, stop: &mut Stop<'_>) -> SnareResult<TriggerOutcome>
    {
        let mut site = CallSite::new(stop, &self.tracker, Some(&self.extractor), &self.address);
        self.tracker.hook().call_trigger(&mut site)
    }
}
