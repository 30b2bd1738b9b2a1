//! # Bitness Resolution
//!
//! Decides which calling convention and pointer width apply at a stop.
//!
//! A 64-bit debugger attached to a 32-bit (WOW64) process can find a thread
//! stopped in either half of the process: the 32-bit guest code or the 64-bit
//! thunk layer. The process's nominal bitness can't tell those apart; only the
//! code-segment selector of the stopped thread can.
//!
//! Resolution order:
//!
//! 1. A 32-bit debugger always resolves to 32-bit (it can't run 64-bit code).
//! 2. A 64-bit process always resolves to 64-bit.
//! 3. Otherwise the thread's `cs` decides: [`CS_32BIT`] means 32-bit, anything
//!    else means 64-bit.
//!
//! The context is captured per stop and never cached.

use crate::error::SnareResult;
use crate::target::{TargetProcess, TargetThread};
use crate::types::Bitness;

/// Code-segment selector of 32-bit user code on a 64-bit Windows host.
pub const CS_32BIT: u16 = 0x23;

/// Code-segment selector of 64-bit user code on a 64-bit Windows host.
pub const CS_64BIT: u16 = 0x33;

/// Everything needed to pick a calling convention at one stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitnessContext
{
    /// Bitness of the debugger process itself.
    pub debugger: Bitness,
    /// Nominal bitness of the target process.
    pub process: Bitness,
    /// Code-segment selector of the stopped thread.
    pub code_segment: u16,
}

impl BitnessContext
{
    /// Capture the context for the current stop.
    ///
    /// Reads the thread's registers; the selector is only consulted in the
    /// WOW64 case but is captured unconditionally so the context is complete.
    pub fn capture(debugger: Bitness, process: &dyn TargetProcess, thread: &dyn TargetThread) -> SnareResult<Self>
    {
        let code_segment = thread.registers()?.cs;
        Ok(Self {
            debugger,
            process: process.bitness(),
            code_segment,
        })
    }

    /// Apply the resolution order described in the module docs.
    ///
    /// ```rust
    /// use snare_core::bitness::{BitnessContext, CS_32BIT};
    /// use snare_core::types::Bitness;
    ///
    /// let wow64 = BitnessContext {
    ///     debugger: Bitness::Bits64,
    ///     process: Bitness::Bits32,
    ///     code_segment: CS_32BIT,
    /// };
    /// assert_eq!(wow64.resolve(), Bitness::Bits32);
    /// ```
    #[must_use]
    pub const fn resolve(&self) -> Bitness
    {
        match (self.debugger, self.process) {
            (Bitness::Bits32, _) => Bitness::Bits32,
            (Bitness::Bits64, Bitness::Bits64) => Bitness::Bits64,
            (Bitness::Bits64, Bitness::Bits32) => {
                if self.code_segment == CS_32BIT {
                    Bitness::Bits32
                } else {
                    Bitness::Bits64
                }
            }
        }
    }

    /// Whether this stop is a 64-bit debugger looking at a 32-bit process.
    #[must_use]
    pub const fn is_wow64(&self) -> bool
    {
        matches!((self.debugger, self.process), (Bitness::Bits64, Bitness::Bits32))
    }
}

/// Capture and resolve in one step.
pub fn resolve_bitness(debugger: Bitness, process: &dyn TargetProcess, thread: &dyn TargetThread) -> SnareResult<Bitness>
{
    let context = BitnessContext::capture(debugger, process, thread)?;
    let resolved = context.resolve();
    tracing::trace!(
        debugger = %context.debugger,
        process = %context.process,
        cs = context.code_segment,
        resolved = %resolved,
        "resolved stop bitness"
    );
    Ok(resolved)
}
