//! Thread register snapshot.

use std::fmt;
use std::str::FromStr;

use super::Address;

/// x86 / x86-64 general-purpose register identifier
///
/// The same identifiers are used for 32-bit contexts; a 32-bit register
/// (`eax`, `ecx`, ...) is the low half of its 64-bit counterpart.
///
/// The stack pointer and instruction pointer are not in this list; they are
/// dedicated fields of [`ThreadContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneralRegister
{
    /// RAX - accumulator, return value register
    Rax,
    /// RBX - base register
    Rbx,
    /// RCX - first integer argument (x64 convention)
    Rcx,
    /// RDX - second integer argument (x64 convention)
    Rdx,
    /// RSI - source index
    Rsi,
    /// RDI - destination index
    Rdi,
    /// RBP - frame pointer
    Rbp,
    /// R8 - third integer argument (x64 convention)
    R8,
    /// R9 - fourth integer argument (x64 convention)
    R9,
    /// R10
    R10,
    /// R11
    R11,
    /// R12
    R12,
    /// R13
    R13,
    /// R14
    R14,
    /// R15
    R15,
}

impl GeneralRegister
{
    /// Every register, in storage order.
    pub const ALL: [GeneralRegister; 15] = [
        GeneralRegister::Rax,
        GeneralRegister::Rbx,
        GeneralRegister::Rcx,
        GeneralRegister::Rdx,
        GeneralRegister::Rsi,
        GeneralRegister::Rdi,
        GeneralRegister::Rbp,
        GeneralRegister::R8,
        GeneralRegister::R9,
        GeneralRegister::R10,
        GeneralRegister::R11,
        GeneralRegister::R12,
        GeneralRegister::R13,
        GeneralRegister::R14,
        GeneralRegister::R15,
    ];

    const fn index(self) -> usize
    {
        match self {
            GeneralRegister::Rax => 0,
            GeneralRegister::Rbx => 1,
            GeneralRegister::Rcx => 2,
            GeneralRegister::Rdx => 3,
            GeneralRegister::Rsi => 4,
            GeneralRegister::Rdi => 5,
            GeneralRegister::Rbp => 6,
            GeneralRegister::R8 => 7,
            GeneralRegister::R9 => 8,
            GeneralRegister::R10 => 9,
            GeneralRegister::R11 => 10,
            GeneralRegister::R12 => 11,
            GeneralRegister::R13 => 12,
            GeneralRegister::R14 => 13,
            GeneralRegister::R15 => 14,
        }
    }

    /// Lowercase 64-bit register name (`rax`, `r8`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            GeneralRegister::Rax => "rax",
            GeneralRegister::Rbx => "rbx",
            GeneralRegister::Rcx => "rcx",
            GeneralRegister::Rdx => "rdx",
            GeneralRegister::Rsi => "rsi",
            GeneralRegister::Rdi => "rdi",
            GeneralRegister::Rbp => "rbp",
            GeneralRegister::R8 => "r8",
            GeneralRegister::R9 => "r9",
            GeneralRegister::R10 => "r10",
            GeneralRegister::R11 => "r11",
            GeneralRegister::R12 => "r12",
            GeneralRegister::R13 => "r13",
            GeneralRegister::R14 => "r14",
            GeneralRegister::R15 => "r15",
        }
    }
}

impl FromStr for GeneralRegister
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let lower = s.to_lowercase();
        // 32-bit aliases map onto the same slot
        let canonical = match lower.as_str() {
            "eax" => "rax",
            "ebx" => "rbx",
            "ecx" => "rcx",
            "edx" => "rdx",
            "esi" => "rsi",
            "edi" => "rdi",
            "ebp" => "rbp",
            other => other,
        };
        GeneralRegister::ALL
            .into_iter()
            .find(|reg| reg.name() == canonical)
            .ok_or_else(|| format!("Unknown register: {s}"))
    }
}

impl fmt::Display for GeneralRegister
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Snapshot of a stopped thread's registers
///
/// This is what a thread handle hands back from
/// [`TargetThread::registers`](crate::target::TargetThread::registers). It is a
/// value: reading it again after the thread ran produces a new snapshot.
///
/// ## Example
///
/// ```rust
/// use snare_core::types::{Address, GeneralRegister, ThreadContext};
///
/// let ctx = ThreadContext::new()
///     .with_sp(Address::from(0x7ff0))
///     .with_register(GeneralRegister::Rcx, 42);
/// assert_eq!(ctx.get(GeneralRegister::Rcx), 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadContext
{
    /// Instruction pointer (EIP / RIP)
    pub pc: Address,
    /// Stack pointer (ESP / RSP)
    pub sp: Address,
    /// Code-segment selector; identifies 32- vs 64-bit mode on WOW64
    pub cs: u16,
    /// EFLAGS / RFLAGS
    pub flags: u64,
    general: [u64; 15],
}

impl ThreadContext
{
    /// Create a zeroed register snapshot.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Read a general-purpose register.
    #[must_use]
    pub fn get(&self, reg: GeneralRegister) -> u64
    {
        self.general[reg.index()]
    }

    /// Overwrite a general-purpose register.
    pub fn set(&mut self, reg: GeneralRegister, value: u64)
    {
        self.general[reg.index()] = value;
    }

    /// Builder-style [`ThreadContext::set`].
    #[must_use]
    pub fn with_register(mut self, reg: GeneralRegister, value: u64) -> Self
    {
        self.set(reg, value);
        self
    }

    /// Builder-style stack pointer.
    #[must_use]
    pub fn with_sp(mut self, sp: Address) -> Self
    {
        self.sp = sp;
        self
    }

    /// Builder-style instruction pointer.
    #[must_use]
    pub fn with_pc(mut self, pc: Address) -> Self
    {
        self.pc = pc;
        self
    }

    /// Builder-style code-segment selector.
    #[must_use]
    pub fn with_cs(mut self, cs: u16) -> Self
    {
        self.cs = cs;
        self
    }
}

impl fmt::Display for ThreadContext
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "pc={} sp={} cs=0x{:x} flags=0x{:x}", self.pc, self.sp, self.cs, self.flags)?;
        for reg in GeneralRegister::ALL {
            write!(f, " {}=0x{:x}", reg, self.get(reg))?;
        }
        Ok(())
    }
}
