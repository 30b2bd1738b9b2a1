//! Process, thread, and bitness types.

use std::fmt;
use std::str::FromStr;

/// Process identifier (PID)
///
/// A newtype rather than a raw `u32` so a PID can't be confused with a thread
/// id or an exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Pointer width / instruction-set mode of a process or execution context
///
/// A 64-bit host can run 32-bit guest code (WOW64), so the bitness of a
/// *process* and the bitness of the code a thread is *currently executing*
/// are not always the same. See [`crate::bitness::BitnessContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bitness
{
    /// 32-bit pointers, stack-only calling convention.
    Bits32,
    /// 64-bit pointers, register-then-stack calling convention.
    Bits64,
}

impl Bitness
{
    /// Bitness of the process running this code (the debugger itself).
    #[must_use]
    pub const fn host() -> Self
    {
        if cfg!(target_pointer_width = "64") {
            Bitness::Bits64
        } else {
            Bitness::Bits32
        }
    }

    /// Size of a pointer in bytes.
    #[must_use]
    pub const fn pointer_size(self) -> u64
    {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }

    /// Number of bits (32 or 64).
    #[must_use]
    pub const fn bits(self) -> u32
    {
        match self {
            Bitness::Bits32 => 32,
            Bitness::Bits64 => 64,
        }
    }
}

impl fmt::Display for Bitness
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-bit", self.bits())
    }
}

impl FromStr for Bitness
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().trim_end_matches("-bit") {
            "32" | "x86" => Ok(Bitness::Bits32),
            "64" | "x64" | "x86_64" => Ok(Bitness::Bits64),
            _ => Err(format!("Unknown bitness: {s}. Use '32' or '64'")),
        }
    }
}
