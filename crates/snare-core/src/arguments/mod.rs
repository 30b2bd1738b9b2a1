//! # Argument Retrieval
//!
//! Locating a stopped function's raw arguments.
//!
//! Two calling conventions are modeled, selected by the bitness resolved for
//! the stop (see [`crate::bitness`]), never by the caller:
//!
//! - **32-bit (stack only)**: `[sp]` holds the return address, argument `i`
//!   is the 32-bit word at `sp + 4 + 4*i`.
//! - **64-bit (registers, then stack)**: arguments 0..=3 are `rcx`, `rdx`,
//!   `r8`, `r9`; argument `i >= 4` is the 64-bit word at `sp + 8 + 8*i`. The
//!   `8*i` term (rather than `8*(i-4)`) steps over the 32-byte home space the
//!   caller reserves for the four register arguments.
//!
//! Retrievers hold no state and re-read the thread on every call.

pub mod extractor;

use crate::error::SnareResult;
use crate::target::{TargetProcess, TargetThread};
use crate::types::{Address, Bitness, GeneralRegister};

pub use extractor::{ArgumentExtractor, ArgumentSnapshot, FunctionTarget};

/// Maps an argument index to its raw value for the current stop
pub trait ArgumentRetriever: Send + Sync
{
    /// Raw machine word of argument `index` (0-based).
    fn get_arg(&self, index: usize, process: &dyn TargetProcess, thread: &dyn TargetThread) -> SnareResult<u64>;
}

/// 32-bit stack-only convention
#[derive(Debug, Clone, Copy, Default)]
pub struct X86ArgumentRetriever;

impl X86ArgumentRetriever
{
    /// Stack slot of argument `index` relative to the stack pointer.
    #[must_use]
    pub fn slot(sp: Address, index: usize) -> Address
    {
        sp + 4 + 4 * index as u64
    }
}

impl ArgumentRetriever for X86ArgumentRetriever
{
    fn get_arg(&self, index: usize, process: &dyn TargetProcess, thread: &dyn TargetThread) -> SnareResult<u64>
    {
        let slot = Self::slot(thread.stack_pointer()?, index);
        let value = process.read_u32(slot)?;
        tracing::trace!(index, slot = %slot, value, "x86 argument");
        Ok(u64::from(value))
    }
}

/// 64-bit register-then-stack convention
#[derive(Debug, Clone, Copy, Default)]
pub struct X64ArgumentRetriever;

impl X64ArgumentRetriever
{
    /// Registers carrying the first four integer arguments, in order.
    pub const REGISTER_ARGS: [GeneralRegister; 4] =
        [GeneralRegister::Rcx, GeneralRegister::Rdx, GeneralRegister::R8, GeneralRegister::R9];

    /// Stack slot of argument `index` (only meaningful for `index >= 4`).
    #[must_use]
    pub fn slot(sp: Address, index: usize) -> Address
    {
        sp + 8 + 8 * index as u64
    }
}

impl ArgumentRetriever for X64ArgumentRetriever
{
    fn get_arg(&self, index: usize, process: &dyn TargetProcess, thread: &dyn TargetThread) -> SnareResult<u64>
    {
        let context = thread.registers()?;
        if let Some(reg) = Self::REGISTER_ARGS.get(index) {
            let value = context.get(*reg);
            tracing::trace!(index, register = %reg, value, "x64 argument");
            return Ok(value);
        }
        let slot = Self::slot(context.sp, index);
        let value = process.read_u64(slot)?;
        tracing::trace!(index, slot = %slot, value, "x64 argument");
        Ok(value)
    }
}

/// The retriever for a resolved bitness.
#[must_use]
pub fn retriever_for(bitness: Bitness) -> &'static dyn ArgumentRetriever
{
    match bitness {
        Bitness::Bits32 => &X86ArgumentRetriever,
        Bitness::Bits64 => &X64ArgumentRetriever,
    }
}
