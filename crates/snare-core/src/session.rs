//! # Debug Session
//!
//! The breakpoint table and the dispatcher that drives triggers.
//!
//! [`Session`] is the seam breakpoints use to register and remove breakpoints
//! from inside a trigger. [`DebugSession`] is the in-memory implementation:
//! it owns every registered breakpoint, resolves symbolic locations against a
//! symbol map, and matches exceptions to breakpoints in [`DebugSession::dispatch`].
//!
//! ## Mutation during dispatch
//!
//! Each table entry keeps its breakpoint in a slot. While a breakpoint's
//! trigger runs, the box is taken out of the slot and the session is handed to
//! the trigger as `&mut dyn Session`. Afterwards the box goes back only if the
//! entry still exists, so a trigger may remove itself (return breakpoints do)
//! or add new breakpoints. Breakpoints added during a dispatch are not
//! triggered by that same dispatch.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::SystemTime;

use tracing::{debug, trace, warn};

use crate::breakpoints::{Breakpoint, BreakpointId, BreakpointKind, Stop, TriggerOutcome};
use crate::error::{SnareError, SnareResult};
use crate::target::{ExceptionRecord, Target, TargetProcess, TargetThread};
use crate::types::{Address, Bitness, BreakpointAddress};

/// What breakpoints can ask of the session that owns them
pub trait Session
{
    /// Bitness of the debugger process itself.
    fn debugger_bitness(&self) -> Bitness
    {
        Bitness::host()
    }

    /// Register `breakpoint` on `target` and return its id.
    ///
    /// ## Errors
    ///
    /// `IncompatibleTarget` when the breakpoint does not apply to `target`.
    fn add_breakpoint(&mut self, breakpoint: Box<dyn Breakpoint>, target: Target) -> SnareResult<BreakpointId>;

    /// Remove breakpoint `id` if it is registered on one of `targets`
    /// (any target when `targets` is empty).
    ///
    /// Returns `Ok(false)` when nothing was removed.
    fn remove_breakpoint(&mut self, id: BreakpointId, targets: &[Target]) -> SnareResult<bool>;

    /// Human readable representation, used by print breakpoints as `{dbg}`.
    fn describe(&self) -> String
    {
        format!("<session debugger={}>", self.debugger_bitness())
    }
}

/// Lifecycle of a registered breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointState
{
    /// Symbolic location not resolved yet; cannot fire.
    Pending,
    /// Location known; fires when the address is hit.
    Resolved,
}

/// Public information about a registered breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointInfo
{
    pub id: BreakpointId,
    pub location: BreakpointAddress,
    pub resolved: Option<Address>,
    pub kind: BreakpointKind,
    pub target: Target,
    pub state: BreakpointState,
    pub hit_count: u64,
    pub requested_at: SystemTime,
}

#[derive(Debug)]
struct BreakpointEntry
{
    info: BreakpointInfo,
    // Empty while the breakpoint's own trigger is running.
    slot: Option<Box<dyn Breakpoint>>,
}

impl BreakpointEntry
{
    fn matches(&self, address: Address, process: &dyn TargetProcess, thread: &dyn TargetThread) -> bool
    {
        if self.info.resolved != Some(address) {
            return false;
        }
        match self.info.target {
            Target::Process(pid) => pid == process.pid(),
            Target::Thread(tid) => tid == thread.tid(),
        }
    }
}

/// In-memory session: breakpoint table, symbol map and dispatcher
#[derive(Debug)]
pub struct DebugSession
{
    debugger: Bitness,
    next_id: u64,
    by_id: BTreeMap<BreakpointId, BreakpointEntry>,
    symbols: HashMap<(String, String), Address>,
}

impl Default for DebugSession
{
    fn default() -> Self
    {
        Self::new(Bitness::host())
    }
}

impl DebugSession
{
    /// Create an empty session for a debugger of the given bitness.
    #[must_use]
    pub fn new(debugger: Bitness) -> Self
    {
        Self {
            debugger,
            next_id: 0,
            by_id: BTreeMap::new(),
            symbols: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> BreakpointId
    {
        self.next_id = self.next_id.wrapping_add(1);
        BreakpointId::from_raw(self.next_id)
    }

    fn symbol_key(module: &str, function: &str) -> (String, String)
    {
        (module.to_ascii_lowercase(), function.to_string())
    }

    /// Make `module!function` resolve to `address`.
    ///
    /// Pending breakpoints on that symbol become resolved.
    pub fn define_symbol(&mut self, module: &str, function: &str, address: Address)
    {
        self.symbols.insert(Self::symbol_key(module, function), address);

        for entry in self.by_id.values_mut() {
            if entry.info.state != BreakpointState::Pending {
                continue;
            }
            if let BreakpointAddress::Symbol { module: m, function: f } = &entry.info.location {
                if m.eq_ignore_ascii_case(module) && f == function {
                    entry.info.resolved = Some(address);
                    entry.info.state = BreakpointState::Resolved;
                    debug!(id = %entry.info.id, %address, "resolved pending breakpoint");
                }
            }
        }
    }

    /// Address a location currently resolves to.
    #[must_use]
    pub fn resolve(&self, location: &BreakpointAddress) -> Option<Address>
    {
        match location {
            BreakpointAddress::Numeric(address) => Some(*address),
            BreakpointAddress::Symbol { module, function } => {
                self.symbols.get(&Self::symbol_key(module, function)).copied()
            }
        }
    }

    /// Information about breakpoint `id`.
    #[must_use]
    pub fn info(&self, id: BreakpointId) -> Option<BreakpointInfo>
    {
        self.by_id.get(&id).map(|entry| entry.info.clone())
    }

    /// All registered breakpoints, by id.
    #[must_use]
    pub fn list(&self) -> Vec<BreakpointInfo>
    {
        self.by_id.values().map(|entry| entry.info.clone()).collect()
    }

    /// Borrow a registered breakpoint.
    ///
    /// `None` for unknown ids and for a breakpoint whose trigger is running.
    #[must_use]
    pub fn breakpoint(&self, id: BreakpointId) -> Option<&dyn Breakpoint>
    {
        self.by_id.get(&id).and_then(|entry| entry.slot.as_deref())
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: BreakpointId) -> bool
    {
        self.by_id.contains_key(&id)
    }

    /// Number of registered breakpoints.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_id.len()
    }

    /// Whether no breakpoint is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_id.is_empty()
    }

    /// Deliver an exception to every breakpoint planted at its address.
    ///
    /// Breakpoints fire in id order. The first trigger error stops the
    /// dispatch and is returned; the failing breakpoint stays registered.
    pub fn dispatch(
        &mut self,
        exception: &ExceptionRecord,
        process: &dyn TargetProcess,
        thread: &dyn TargetThread,
    ) -> SnareResult<Vec<TriggerOutcome>>
    {
        let hits: Vec<BreakpointId> = self
            .by_id
            .iter()
            .filter(|(_, entry)| entry.slot.is_some() && entry.matches(exception.address, process, thread))
            .map(|(id, _)| *id)
            .collect();
        trace!(%exception, hits = hits.len(), "dispatching exception");

        let mut outcomes = Vec::with_capacity(hits.len());
        for id in hits {
            let Some(mut breakpoint) = self.checkout(id) else {
                // Removed by an earlier trigger of this dispatch.
                continue;
            };
            debug!(id = %id, kind = %breakpoint.kind(), address = %exception.address, "breakpoint hit");

            let result = {
                let mut stop = Stop::new(self, exception, process, thread, id);
                breakpoint.trigger(&mut stop)
            };

            if let Some(entry) = self.by_id.get_mut(&id) {
                entry.slot = Some(breakpoint);
            }
            outcomes.push(result?);
        }
        Ok(outcomes)
    }

    fn checkout(&mut self, id: BreakpointId) -> Option<Box<dyn Breakpoint>>
    {
        let entry = self.by_id.get_mut(&id)?;
        let breakpoint = entry.slot.take()?;
        entry.info.hit_count = entry.info.hit_count.saturating_add(1);
        Some(breakpoint)
    }
}

impl Session for DebugSession
{
    fn debugger_bitness(&self) -> Bitness
    {
        self.debugger
    }

    fn add_breakpoint(&mut self, breakpoint: Box<dyn Breakpoint>, target: Target) -> SnareResult<BreakpointId>
    {
        let kind = breakpoint.kind();
        if !breakpoint.applies_to(&target) {
            return Err(SnareError::IncompatibleTarget { kind, target });
        }

        let location = breakpoint.address().clone();
        let resolved = self.resolve(&location);
        let state = if resolved.is_some() {
            BreakpointState::Resolved
        } else {
            warn!(%location, %kind, "symbol not resolved yet; breakpoint pending");
            BreakpointState::Pending
        };

        let id = self.allocate_id();
        let info = BreakpointInfo {
            id,
            location,
            resolved,
            kind,
            target,
            state,
            hit_count: 0,
            requested_at: SystemTime::now(),
        };
        debug!(id = %id, %kind, %target, location = %info.location, "registered breakpoint");
        self.by_id.insert(id, BreakpointEntry {
            info,
            slot: Some(breakpoint),
        });
        Ok(id)
    }

    fn remove_breakpoint(&mut self, id: BreakpointId, targets: &[Target]) -> SnareResult<bool>
    {
        let on_target = self
            .by_id
            .get(&id)
            .is_some_and(|entry| targets.is_empty() || targets.contains(&entry.info.target));
        if !on_target {
            trace!(id = %id, "nothing to remove");
            return Ok(false);
        }

        self.by_id.remove(&id);
        debug!(id = %id, "removed breakpoint");
        Ok(true)
    }

    fn describe(&self) -> String
    {
        format!("<session debugger={} breakpoints={}>", self.debugger, self.by_id.len())
    }
}

impl fmt::Display for DebugSession
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.describe())
    }
}
