//! # snare-core
//!
//! Breakpoint engine for a programmable Windows-style debugger.
//!
//! This crate models the logical side of breakpoints:
//! - The breakpoint contract (`applies_to` / `trigger`) and its kinds
//! - Function argument retrieval for 32-bit and 64-bit calling conventions
//! - Bitness resolution for WOW64 processes via the thread's code segment
//! - Call / return chaining through transient return breakpoints
//! - An in-memory session that owns breakpoints and dispatches exceptions
//!
//! ## Collaborators
//!
//! Process memory and thread registers are reached through the
//! [`target::TargetProcess`] and [`target::TargetThread`] traits. The crate
//! ships simulated implementations ([`target::SimulatedProcess`],
//! [`target::SimulatedThread`]) so the engine can be driven without a live
//! debuggee.

pub mod arguments;
pub mod bitness;
pub mod breakpoints;
pub mod error;
pub mod prelude;
pub mod remote;
pub mod session;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use breakpoints::{Breakpoint, BreakpointId, BreakpointKind, Stop};
pub use error::{SnareError, SnareResult};
pub use session::{DebugSession, Session};
pub use types::{Address, Bitness, ProcessId, ThreadId};
