//! # Types
//!
//! Plain data types shared by every part of the engine: addresses, process
//! and thread identifiers, bitness, and register snapshots.

pub mod address;
pub mod process;
pub mod registers;

pub use address::{Address, BreakpointAddress};
pub use process::{Bitness, ProcessId, ThreadId};
pub use registers::{GeneralRegister, ThreadContext};
