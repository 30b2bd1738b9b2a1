//! Tests for breakpoint kinds, applicability and dispatch

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use snare_core::arguments::FunctionTarget;
use snare_core::breakpoints::{
    Applicability, Breakpoint, BreakpointKind, CallBreakpoint, FunctionBreakpoint, HardwareBreakpoint,
    MemoryAccess, MemoryBreakpoint, MemoryEvents, PrintBreakpoint, ProxyBreakpoint, ReturnBreakpoint,
    SoftwareBreakpoint, UnimplementedHook,
};
use snare_core::error::SnareError;
use snare_core::session::{DebugSession, Session};
use snare_core::target::{ExceptionRecord, SimulatedProcess, SimulatedThread, Target};
use snare_core::types::{Address, Bitness, BreakpointAddress, ProcessId, ThreadContext, ThreadId};

const PROCESS: Target = Target::Process(ProcessId(100));
const THREAD: Target = Target::Thread(ThreadId(7));

fn stop_fixture() -> (SimulatedProcess, SimulatedThread)
{
    let process = SimulatedProcess::new(ProcessId(100), Bitness::Bits64);
    let thread = SimulatedThread::new(ThreadId(7), ThreadContext::new().with_sp(Address::new(0x8000)));
    (process, thread)
}

#[test]
fn test_software_breakpoint_is_process_only()
{
    let bp = SoftwareBreakpoint::new(0x401000u64);
    assert_eq!(bp.kind(), BreakpointKind::STANDARD);
    assert!(bp.applies_to(&PROCESS));
    assert!(!bp.applies_to(&THREAD));
}

#[test]
fn test_hardware_breakpoint_is_thread_only()
{
    let bp = HardwareBreakpoint::new(0x401000u64);
    assert_eq!(bp.kind(), BreakpointKind::HARDWARE_EXEC);
    assert!(bp.applies_to(&THREAD));
    assert!(!bp.applies_to(&PROCESS));
}

#[test]
fn test_composite_kinds_apply_to_processes()
{
    let hook = Arc::new(UnimplementedHook);
    let target = FunctionTarget::new("kernel32", "Sleep");
    let breakpoints: Vec<Box<dyn Breakpoint>> = vec![
        Box::new(MemoryBreakpoint::new(0x1000u64)),
        Box::new(CallBreakpoint::new(0x2000u64, hook.clone())),
        Box::new(ReturnBreakpoint::new(0x3000u64, hook.clone())),
        Box::new(PrintBreakpoint::new(0x4000u64, "{proc}")),
        Box::new(FunctionBreakpoint::builder(hook).target(target).build().unwrap()),
    ];

    for bp in &breakpoints {
        assert!(bp.applies_to(&PROCESS), "{} should apply to a process", bp.kind());
        assert!(!bp.applies_to(&THREAD), "{} should not apply to a thread", bp.kind());
    }
}

#[test]
fn test_hardware_function_breakpoint_is_thread_only()
{
    let bp = FunctionBreakpoint::builder(Arc::new(UnimplementedHook))
        .target(FunctionTarget::new("ntdll", "NtClose"))
        .hardware()
        .build()
        .unwrap();

    assert_eq!(bp.kind(), BreakpointKind::HARDWARE_EXEC);
    assert!(bp.applies_to(&THREAD));
    assert!(!bp.applies_to(&PROCESS));
}

#[test]
fn test_kind_tags()
{
    assert_eq!(BreakpointKind::STANDARD.tag(), "BP");
    assert_eq!(BreakpointKind::HARDWARE_EXEC.tag(), "HXBP");
    assert_eq!(BreakpointKind::MEMORY.tag(), "MEMBP");
    assert_eq!(BreakpointKind::PROXY.tag(), "PROXYBP");
    assert_eq!(BreakpointKind::CALL.tag(), "CALLBP");
    assert_eq!(BreakpointKind::RETURN.tag(), "RETBP");
    assert_eq!(BreakpointKind::PRINT.tag(), "PRINTBP");
}

#[test]
fn test_custom_kind_follows_applicability_rule()
{
    const TRACE: BreakpointKind = BreakpointKind::new("TRACEBP");
    assert_eq!(Applicability::for_kind(TRACE), Applicability::ProcessOnly);

    let bp = ProxyBreakpoint::new(0x1000u64, TRACE, |_| Ok(None));
    assert_eq!(bp.kind().to_string(), "TRACEBP");
    assert!(bp.applies_to(&PROCESS));

    let hx = ProxyBreakpoint::new(0x1000u64, BreakpointKind::HARDWARE_EXEC, |_| Ok(None));
    assert!(hx.applies_to(&THREAD));
}

#[test]
fn test_memory_breakpoint_defaults()
{
    let bp = MemoryBreakpoint::new(0x10_0000u64);
    assert_eq!(bp.size(), 4096);
    assert_eq!(bp.events(), MemoryEvents::ALL);
    assert!(bp.watches(MemoryAccess::Read));
    assert!(bp.watches(MemoryAccess::Write));
    assert!(bp.watches(MemoryAccess::Execute));
    assert!(bp.covers(Address::new(0x10_0fff)));
    assert!(!bp.covers(Address::new(0x10_1000)));
    assert!(!bp.covers(Address::new(0x0f_ffff)));
}

#[test]
fn test_memory_breakpoint_custom_events()
{
    let events: MemoryEvents = "w".parse().unwrap();
    let bp = MemoryBreakpoint::new(0x2000u64).with_size(8).with_events(events);

    assert_eq!(bp.size(), 8);
    assert!(bp.watches(MemoryAccess::Write));
    assert!(!bp.watches(MemoryAccess::Read));
    assert_eq!(bp.events().to_string(), "W");
}

#[test]
fn test_memory_events_reject_unknown_letters()
{
    let err = "rwz".parse::<MemoryEvents>().unwrap_err();
    assert!(matches!(err, SnareError::InvalidEvents(ref s) if s == "rwz"));
    assert!("".parse::<MemoryEvents>().unwrap().is_empty());
}

#[test]
fn test_symbolic_memory_breakpoint_covers_nothing()
{
    let bp = MemoryBreakpoint::new(BreakpointAddress::symbol("app", "g_table"));
    assert!(!bp.covers(Address::new(0)));
}

#[test]
fn test_proxy_breakpoint_receives_stop()
{
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let bp = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, move |stop| {
        assert_eq!(stop.exception.address, Address::new(0x401000));
        assert_eq!(stop.process.pid(), ProcessId(100));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(stop.thread.tid()) as Box<dyn Any + Send>))
    });

    let mut session = DebugSession::new(Bitness::Bits64);
    let id = session.add_breakpoint(Box::new(bp), PROCESS).unwrap();
    let (process, thread) = stop_fixture();

    let outcomes = session
        .dispatch(&ExceptionRecord::breakpoint(Address::new(0x401000)), &process, &thread)
        .unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(outcomes.len(), 1);
    let tid = outcomes[0].as_ref().and_then(|o| o.downcast_ref::<ThreadId>()).copied();
    assert_eq!(tid, Some(ThreadId(7)));
    assert_eq!(session.info(id).unwrap().hit_count, 1);
}

#[test]
fn test_dispatch_ignores_other_addresses_and_processes()
{
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let bp = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });

    let mut session = DebugSession::new(Bitness::Bits64);
    session.add_breakpoint(Box::new(bp), Target::Process(ProcessId(5))).unwrap();
    let (process, thread) = stop_fixture();

    // Right address, wrong process
    let outcomes = session
        .dispatch(&ExceptionRecord::breakpoint(Address::new(0x401000)), &process, &thread)
        .unwrap();
    assert!(outcomes.is_empty());

    // Wrong address
    let other = SimulatedProcess::new(ProcessId(5), Bitness::Bits64);
    let outcomes = session
        .dispatch(&ExceptionRecord::breakpoint(Address::new(0x401001)), &other, &thread)
        .unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_thread_breakpoint_dispatches_on_its_thread()
{
    let mut session = DebugSession::new(Bitness::Bits64);
    let id = session.add_breakpoint(Box::new(HardwareBreakpoint::new(0x5000u64)), THREAD).unwrap();
    let (process, thread) = stop_fixture();

    let outcomes = session
        .dispatch(&ExceptionRecord::single_step(Address::new(0x5000)), &process, &thread)
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_none());
    assert_eq!(session.info(id).unwrap().hit_count, 1);
}

#[test]
fn test_trigger_error_propagates_and_keeps_breakpoint()
{
    let bp = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, |_| {
        Err(SnareError::InvalidArgument("boom".to_string()))
    });
    let mut session = DebugSession::new(Bitness::Bits64);
    let id = session.add_breakpoint(Box::new(bp), PROCESS).unwrap();
    let (process, thread) = stop_fixture();

    let err = session
        .dispatch(&ExceptionRecord::breakpoint(Address::new(0x401000)), &process, &thread)
        .unwrap_err();
    assert!(matches!(err, SnareError::InvalidArgument(_)));
    assert!(session.breakpoint(id).is_some());
}

#[test]
fn test_pending_symbol_fires_after_resolution()
{
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let location = BreakpointAddress::symbol("kernel32", "CreateFileW");
    let bp = ProxyBreakpoint::new(location, BreakpointKind::STANDARD, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });

    let mut session = DebugSession::new(Bitness::Bits64);
    session.add_breakpoint(Box::new(bp), PROCESS).unwrap();
    let (process, thread) = stop_fixture();
    let exception = ExceptionRecord::breakpoint(Address::new(0x7ffa_1000));

    session.dispatch(&exception, &process, &thread).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    session.define_symbol("kernel32", "CreateFileW", Address::new(0x7ffa_1000));
    session.dispatch(&exception, &process, &thread).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_breakpoint_added_during_dispatch_waits_for_next_hit()
{
    let first_hits = Arc::new(AtomicUsize::new(0));
    let late_hits = Arc::new(AtomicUsize::new(0));
    let first_seen = Arc::clone(&first_hits);
    let late_seen = Arc::clone(&late_hits);
    let mut planted = false;
    let bp = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, move |stop| {
        first_seen.fetch_add(1, Ordering::SeqCst);
        if !planted {
            planted = true;
            let seen = Arc::clone(&late_seen);
            let late = ProxyBreakpoint::new(0x401000u64, BreakpointKind::STANDARD, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            });
            let pid = stop.process.pid();
            stop.session.add_breakpoint(Box::new(late), Target::Process(pid))?;
        }
        Ok(None)
    });

    let mut session = DebugSession::new(Bitness::Bits64);
    session.add_breakpoint(Box::new(bp), PROCESS).unwrap();
    let (process, thread) = stop_fixture();
    let exception = ExceptionRecord::breakpoint(Address::new(0x401000));

    let outcomes = session.dispatch(&exception, &process, &thread).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    assert_eq!(late_hits.load(Ordering::SeqCst), 0);
    assert_eq!(session.len(), 2);

    let outcomes = session.dispatch(&exception, &process, &thread).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(first_hits.load(Ordering::SeqCst), 2);
    assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    assert_eq!(session.len(), 2);
}
