//! Common module for library exports

pub use crate::arguments::{ArgumentExtractor, ArgumentRetriever, ArgumentSnapshot, FunctionTarget};
pub use crate::bitness::{resolve_bitness, BitnessContext};
pub use crate::breakpoints::{
    Applicability, Breakpoint, BreakpointId, BreakpointKind, CallBreakpoint, CallHook, CallSite, FunctionBreakpoint,
    HardwareBreakpoint, MemoryBreakpoint, MemoryEvents, PrintBreakpoint, ProxyBreakpoint, ReturnBreakpoint,
    SoftwareBreakpoint, Stop, TriggerOutcome,
};
pub use crate::error::{SnareError, SnareResult};
pub use crate::remote::{NativeType, RemotePointer, StructDef, Value};
pub use crate::session::{DebugSession, Session};
pub use crate::target::{ExceptionRecord, SimulatedProcess, SimulatedThread, Target, TargetProcess, TargetThread};
pub use crate::types::{Address, Bitness, BreakpointAddress, GeneralRegister, ProcessId, ThreadContext, ThreadId};
