//! # Target Handles
//!
//! Interfaces the engine needs from the process and thread being debugged.
//!
//! The engine never talks to the operating system itself. Whatever owns the
//! debug-event loop wraps its process and thread handles in these traits and
//! passes them along with every stop. Only word-sized memory reads and
//! register snapshots are required; byte reads have a word-based default.

pub mod sim;

use std::fmt;

use crate::error::SnareResult;
use crate::types::{Address, Bitness, ProcessId, ThreadContext, ThreadId};

pub use sim::{SimulatedProcess, SimulatedThread};

/// A debugged process
pub trait TargetProcess
{
    /// Process identifier.
    fn pid(&self) -> ProcessId;

    /// Nominal bitness of the process image.
    ///
    /// A 32-bit process on a 64-bit host reports [`Bitness::Bits32`] even when
    /// one of its threads is stopped in the 64-bit half of WOW64.
    fn bitness(&self) -> Bitness;

    /// Read a 32-bit little-endian word.
    fn read_u32(&self, address: Address) -> SnareResult<u32>;

    /// Read a 64-bit little-endian word.
    fn read_u64(&self, address: Address) -> SnareResult<u64>;

    /// Fill `buf` with the bytes starting at `address`.
    ///
    /// The default goes through [`read_u32`](Self::read_u32), so a tail
    /// shorter than four bytes still needs the whole word to be readable.
    /// Backends with byte-level access should override it.
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> SnareResult<()>
    {
        let mut cursor = address;
        for chunk in buf.chunks_mut(4) {
            let word = self.read_u32(cursor)?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
            cursor = cursor + 4;
        }
        Ok(())
    }

    /// Read a machine word of the given width, zero-extended to `u64`.
    fn read_word(&self, address: Address, width: Bitness) -> SnareResult<u64>
    {
        match width {
            Bitness::Bits32 => self.read_u32(address).map(u64::from),
            Bitness::Bits64 => self.read_u64(address),
        }
    }

    /// Read a pointer using the process's nominal bitness.
    fn read_ptr(&self, address: Address) -> SnareResult<u64>
    {
        self.read_word(address, self.bitness())
    }

    /// Human readable representation, used by print breakpoints as `{proc}`.
    fn describe(&self) -> String
    {
        format!("<process pid={} bitness={}>", self.pid(), self.bitness())
    }
}

/// A thread inside a debugged process
pub trait TargetThread
{
    /// Thread identifier.
    fn tid(&self) -> ThreadId;

    /// Take a fresh register snapshot.
    ///
    /// Implementations must not cache: re-entrant calls of the same function
    /// stop with different register values and each stop has to see its own.
    fn registers(&self) -> SnareResult<ThreadContext>;

    /// Current stack pointer.
    fn stack_pointer(&self) -> SnareResult<Address>
    {
        Ok(self.registers()?.sp)
    }

    /// Human readable representation, used by print breakpoints as `{thread}`.
    fn describe(&self) -> String
    {
        format!("<thread tid={}>", self.tid())
    }
}

/// Execution context a breakpoint can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target
{
    /// The whole process (software traps, memory breakpoints).
    Process(ProcessId),
    /// A single thread (hardware debug registers).
    Thread(ThreadId),
}

impl Target
{
    /// Whether this is a whole-process context.
    #[must_use]
    pub const fn is_process(&self) -> bool
    {
        matches!(self, Target::Process(_))
    }

    /// Whether this is a single-thread context.
    #[must_use]
    pub const fn is_thread(&self) -> bool
    {
        matches!(self, Target::Thread(_))
    }
}

impl fmt::Display for Target
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Target::Process(pid) => write!(f, "process {pid}"),
            Target::Thread(tid) => write!(f, "thread {tid}"),
        }
    }
}

/// Kind of debug exception that stopped the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode
{
    /// Software trap (int3).
    Breakpoint,
    /// Single step / hardware debug register hit.
    SingleStep,
    /// Guard page touched (memory breakpoints).
    GuardPage,
    /// Access violation.
    AccessViolation,
    /// Any other platform exception code.
    Other(u32),
}

impl ExceptionCode
{
    /// Windows-style numeric exception code.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        match self {
            ExceptionCode::Breakpoint => 0x8000_0003,
            ExceptionCode::SingleStep => 0x8000_0004,
            ExceptionCode::GuardPage => 0x8000_0001,
            ExceptionCode::AccessViolation => 0xC000_0005,
            ExceptionCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ExceptionCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ExceptionCode::Breakpoint => f.write_str("EXCEPTION_BREAKPOINT"),
            ExceptionCode::SingleStep => f.write_str("EXCEPTION_SINGLE_STEP"),
            ExceptionCode::GuardPage => f.write_str("EXCEPTION_GUARD_PAGE"),
            ExceptionCode::AccessViolation => f.write_str("EXCEPTION_ACCESS_VIOLATION"),
            ExceptionCode::Other(code) => write!(f, "EXCEPTION(0x{code:08x})"),
        }
    }
}

/// The debug exception delivered with a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord
{
    /// What kind of exception fired.
    pub code: ExceptionCode,
    /// Address the exception was raised at.
    pub address: Address,
    /// First-chance (debugger sees it before the target's handlers).
    pub first_chance: bool,
}

impl ExceptionRecord
{
    /// First-chance software breakpoint exception at `address`.
    #[must_use]
    pub fn breakpoint(address: Address) -> Self
    {
        Self {
            code: ExceptionCode::Breakpoint,
            address,
            first_chance: true,
        }
    }

    /// First-chance single-step exception at `address`.
    #[must_use]
    pub fn single_step(address: Address) -> Self
    {
        Self {
            code: ExceptionCode::SingleStep,
            address,
            first_chance: true,
        }
    }
}

impl fmt::Display for ExceptionRecord
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let chance = if self.first_chance { "first" } else { "second" };
        write!(f, "{} at {} ({chance} chance)", self.code, self.address)
    }
}
