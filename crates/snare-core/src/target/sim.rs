//! In-memory process and thread used by tests and the `snare` CLI.
//!
//! Memory is sparse: only bytes that were written exist, and reading any
//! unwritten byte fails like an unmapped page would.

use std::collections::BTreeMap;

use super::{TargetProcess, TargetThread};
use crate::error::{SnareError, SnareResult};
use crate::types::{Address, Bitness, ProcessId, ThreadContext, ThreadId};

/// A fake process with sparse byte-addressed memory
#[derive(Debug, Clone)]
pub struct SimulatedProcess
{
    pid: ProcessId,
    bitness: Bitness,
    memory: BTreeMap<u64, u8>,
}

impl SimulatedProcess
{
    /// Create an empty process.
    #[must_use]
    pub fn new(pid: ProcessId, bitness: Bitness) -> Self
    {
        Self {
            pid,
            bitness,
            memory: BTreeMap::new(),
        }
    }

    /// Write raw bytes starting at `address`.
    pub fn write_bytes(&mut self, address: Address, bytes: &[u8])
    {
        for (offset, byte) in (0u64..).zip(bytes) {
            self.memory.insert(address.value().wrapping_add(offset), *byte);
        }
    }

    /// Write a little-endian 32-bit word.
    pub fn write_u32(&mut self, address: Address, value: u32)
    {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Write a little-endian 64-bit word.
    pub fn write_u64(&mut self, address: Address, value: u64)
    {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Write a word of the given width (truncating for 32-bit).
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_word(&mut self, address: Address, value: u64, width: Bitness)
    {
        match width {
            Bitness::Bits32 => self.write_u32(address, value as u32),
            Bitness::Bits64 => self.write_u64(address, value),
        }
    }

    fn read_array<const N: usize>(&self, address: Address) -> SnareResult<[u8; N]>
    {
        let mut out = [0u8; N];
        self.fill(address, &mut out)?;
        Ok(out)
    }

    fn fill(&self, address: Address, buf: &mut [u8]) -> SnareResult<()>
    {
        let size = buf.len();
        for (offset, slot) in (0u64..).zip(buf.iter_mut()) {
            let byte_address = address.value().wrapping_add(offset);
            *slot = *self.memory.get(&byte_address).ok_or(SnareError::MemoryRead {
                address: address.value(),
                size,
            })?;
        }
        Ok(())
    }
}

impl TargetProcess for SimulatedProcess
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn bitness(&self) -> Bitness
    {
        self.bitness
    }

    fn read_u32(&self, address: Address) -> SnareResult<u32>
    {
        self.read_array::<4>(address).map(u32::from_le_bytes)
    }

    fn read_u64(&self, address: Address) -> SnareResult<u64>
    {
        self.read_array::<8>(address).map(u64::from_le_bytes)
    }

    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> SnareResult<()>
    {
        self.fill(address, buf)
    }
}

/// A fake thread whose registers are whatever was last set
#[derive(Debug, Clone)]
pub struct SimulatedThread
{
    tid: ThreadId,
    context: ThreadContext,
}

impl SimulatedThread
{
    /// Create a thread with the given register snapshot.
    #[must_use]
    pub fn new(tid: ThreadId, context: ThreadContext) -> Self
    {
        Self { tid, context }
    }

    /// Replace the register snapshot (simulates the thread running).
    pub fn set_context(&mut self, context: ThreadContext)
    {
        self.context = context;
    }

    /// Mutable access to the register snapshot.
    pub fn context_mut(&mut self) -> &mut ThreadContext
    {
        &mut self.context
    }
}

impl TargetThread for SimulatedThread
{
    fn tid(&self) -> ThreadId
    {
        self.tid
    }

    fn registers(&self) -> SnareResult<ThreadContext>
    {
        Ok(self.context.clone())
    }
}
