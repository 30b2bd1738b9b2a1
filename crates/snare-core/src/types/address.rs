//! Memory address and breakpoint location types.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed memory address in the target's address space
///
/// The value is always stored as a `u64`, even for 32-bit targets, so the same
/// type can describe locations in either half of a mixed-bitness process.
///
/// ## Example
///
/// ```rust
/// use snare_core::types::Address;
///
/// let sp = Address::from(0x1000);
/// assert_eq!((sp + 4).value(), 0x1004);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts)
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use snare_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

/// Where a breakpoint is planted
///
/// Breakpoints can be created against a concrete address or against a symbol
/// (`module!function`). Symbolic locations are resolved by the session when
/// the breakpoint is registered; the breakpoint itself never resolves them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointAddress
{
    /// A concrete address in the target.
    Numeric(Address),
    /// A function exported by a module, e.g. `kernel32!CreateFileA`.
    Symbol
    {
        /// Module (image) name.
        module: String,
        /// Function name inside the module.
        function: String,
    },
}

impl BreakpointAddress
{
    /// Build a symbolic location.
    pub fn symbol(module: impl Into<String>, function: impl Into<String>) -> Self
    {
        Self::Symbol {
            module: module.into(),
            function: function.into(),
        }
    }

    /// The concrete address, if this location is numeric.
    #[must_use]
    pub fn as_numeric(&self) -> Option<Address>
    {
        match self {
            Self::Numeric(address) => Some(*address),
            Self::Symbol { .. } => None,
        }
    }
}

impl From<Address> for BreakpointAddress
{
    fn from(address: Address) -> Self
    {
        Self::Numeric(address)
    }
}

impl From<u64> for BreakpointAddress
{
    fn from(value: u64) -> Self
    {
        Self::Numeric(Address::from(value))
    }
}

impl fmt::Display for BreakpointAddress
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Numeric(address) => write!(f, "{address}"),
            Self::Symbol { module, function } => write!(f, "{module}!{function}"),
        }
    }
}
