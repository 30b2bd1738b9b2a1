//! Tests for argument retrieval, bitness resolution and extraction

use snare_core::arguments::{
    retriever_for, ArgumentExtractor, ArgumentRetriever, FunctionTarget, X64ArgumentRetriever, X86ArgumentRetriever,
};
use snare_core::bitness::{resolve_bitness, BitnessContext, CS_32BIT, CS_64BIT};
use snare_core::error::{SnareError, SnareResult};
use snare_core::remote::{NativeType, RemotePointer, StructDef, Value};
use snare_core::target::{SimulatedProcess, SimulatedThread, TargetProcess};
use snare_core::types::{Address, Bitness, GeneralRegister, ProcessId, ThreadContext, ThreadId};

const SP: u64 = 0x0019_f000;

fn thread(context: ThreadContext) -> SimulatedThread
{
    SimulatedThread::new(ThreadId(1), context)
}

fn handle_params() -> StructDef
{
    StructDef::new("OPEN_PARAMS")
        .field("flags", NativeType::U32)
        .field("handle", NativeType::UPtr)
}

#[test]
fn test_x86_arguments_come_from_the_stack()
{
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    process.write_u32(Address::new(SP), 0x0040_1234); // return address
    for i in 0..3u32 {
        process.write_u32(Address::new(SP + 4 + 4 * u64::from(i)), 0x100 + i);
    }
    let thread = thread(ThreadContext::new().with_sp(Address::new(SP)));

    let retriever = X86ArgumentRetriever;
    assert_eq!(retriever.get_arg(0, &process, &thread).unwrap(), 0x100);
    assert_eq!(retriever.get_arg(1, &process, &thread).unwrap(), 0x101);
    assert_eq!(retriever.get_arg(2, &process, &thread).unwrap(), 0x102);
}

#[test]
fn test_x86_registers_are_ignored()
{
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    process.write_u32(Address::new(SP + 4), 7);
    let thread = thread(
        ThreadContext::new()
            .with_sp(Address::new(SP))
            .with_register(GeneralRegister::Rcx, 0xdead),
    );

    assert_eq!(X86ArgumentRetriever.get_arg(0, &process, &thread).unwrap(), 7);
}

#[test]
fn test_x86_unmapped_stack_fails()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    let thread = thread(ThreadContext::new().with_sp(Address::new(SP)));

    let err = X86ArgumentRetriever.get_arg(0, &process, &thread).unwrap_err();
    match err {
        SnareError::MemoryRead { address, size } => {
            assert_eq!(address, SP + 4);
            assert_eq!(size, 4);
        }
        other => panic!("Expected MemoryRead, got {other:?}"),
    }
}

#[test]
fn test_x64_first_four_arguments_are_registers()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    let thread = thread(
        ThreadContext::new()
            .with_sp(Address::new(SP))
            .with_register(GeneralRegister::Rcx, 1)
            .with_register(GeneralRegister::Rdx, 2)
            .with_register(GeneralRegister::R8, 3)
            .with_register(GeneralRegister::R9, 4),
    );

    let retriever = X64ArgumentRetriever;
    for (index, expected) in [1u64, 2, 3, 4].into_iter().enumerate() {
        assert_eq!(retriever.get_arg(index, &process, &thread).unwrap(), expected);
    }
}

#[test]
fn test_x64_later_arguments_skip_home_space()
{
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    process.write_u64(Address::new(SP + 8 + 8 * 4), 0x5555_0000_0000_0005);
    process.write_u64(Address::new(SP + 8 + 8 * 5), 6);
    let thread = thread(ThreadContext::new().with_sp(Address::new(SP)));

    let retriever = X64ArgumentRetriever;
    assert_eq!(retriever.get_arg(4, &process, &thread).unwrap(), 0x5555_0000_0000_0005);
    assert_eq!(retriever.get_arg(5, &process, &thread).unwrap(), 6);
    // Argument 4 sits right after the return address and the 32-byte home space
    assert_eq!(X64ArgumentRetriever::slot(Address::new(SP), 4), Address::new(SP + 0x28));
}

#[test]
fn test_retriever_is_stateless()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    let mut thread = thread(ThreadContext::new().with_register(GeneralRegister::Rcx, 1));
    let retriever = retriever_for(Bitness::Bits64);

    assert_eq!(retriever.get_arg(0, &process, &thread).unwrap(), 1);
    thread.context_mut().set(GeneralRegister::Rcx, 2);
    assert_eq!(retriever.get_arg(0, &process, &thread).unwrap(), 2);
}

#[test]
fn test_bitness_resolution_cases()
{
    let cases = [
        (Bitness::Bits32, Bitness::Bits32, CS_32BIT, Bitness::Bits32),
        (Bitness::Bits64, Bitness::Bits64, CS_64BIT, Bitness::Bits64),
        (Bitness::Bits64, Bitness::Bits32, CS_32BIT, Bitness::Bits32),
        (Bitness::Bits64, Bitness::Bits32, CS_64BIT, Bitness::Bits64),
    ];

    for (debugger, process, code_segment, expected) in cases {
        let context = BitnessContext {
            debugger,
            process,
            code_segment,
        };
        assert_eq!(context.resolve(), expected, "{debugger} debugger, {process} process, cs=0x{code_segment:x}");
    }
}

#[test]
fn test_wow64_selector_read_from_thread()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    let in_wow64_stub = thread(ThreadContext::new().with_cs(CS_64BIT));
    let in_user_code = thread(ThreadContext::new().with_cs(CS_32BIT));

    assert_eq!(resolve_bitness(Bitness::Bits64, &process, &in_wow64_stub).unwrap(), Bitness::Bits64);
    assert_eq!(resolve_bitness(Bitness::Bits64, &process, &in_user_code).unwrap(), Bitness::Bits32);
    // A 32-bit debugger can only see 32-bit code
    assert_eq!(resolve_bitness(Bitness::Bits32, &process, &in_wow64_stub).unwrap(), Bitness::Bits32);

    let context = BitnessContext::capture(Bitness::Bits64, &process, &in_user_code).unwrap();
    assert!(context.is_wow64());
    assert_eq!(context.code_segment, CS_32BIT);
}

#[test]
fn test_extract_scalar_and_struct_pointer_x64()
{
    let params = Address::new(0x0000_0200_0000_1000);
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    process.write_u32(params, 0x80);
    process.write_u64(params + 8, 0x1234);
    let thread = thread(
        ThreadContext::new()
            .with_sp(Address::new(SP))
            .with_cs(CS_64BIT)
            .with_register(GeneralRegister::Rcx, 0xffff_ffff_0000_0003)
            .with_register(GeneralRegister::Rdx, params.value()),
    );

    let target = FunctionTarget::new("app", "open_thing")
        .param("count", NativeType::U32)
        .param("params", NativeType::pointer_to_struct(handle_params()));
    let extractor = ArgumentExtractor::new(target).unwrap();
    let args = extractor.extract_arguments(Bitness::Bits64, &process, &thread).unwrap();

    assert_eq!(args.names().collect::<Vec<_>>(), vec!["count", "params"]);
    assert_eq!(args.get("count"), Some(&Value::Unsigned(3)));

    let view = args.get("params").and_then(Value::as_remote).unwrap();
    assert_eq!(view.address, params);
    assert_eq!(view.field("flags", &process).unwrap(), Value::Unsigned(0x80));
    assert_eq!(view.field("handle", &process).unwrap(), Value::Unsigned(0x1234));
}

#[test]
fn test_extract_wow64_uses_stack_convention()
{
    let params = Address::new(0x0060_0000);
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    process.write_u32(Address::new(SP + 4), 9);
    process.write_u32(Address::new(SP + 8), 0x0060_0000);
    process.write_u32(params, 1);
    process.write_u32(params + 4, 0xbeef);
    let thread = thread(
        ThreadContext::new()
            .with_sp(Address::new(SP))
            .with_cs(CS_32BIT)
            .with_register(GeneralRegister::Rcx, 0x1111),
    );

    let target = FunctionTarget::new("app", "open_thing")
        .param("count", NativeType::I32)
        .param("params", NativeType::pointer_to_struct(handle_params()));
    let extractor = ArgumentExtractor::new(target).unwrap();
    let args = extractor.extract_arguments(Bitness::Bits64, &process, &thread).unwrap();

    assert_eq!(args.get("count"), Some(&Value::Signed(9)));
    let view = args.get("params").and_then(Value::as_remote).unwrap();
    assert_eq!(view.bitness, Bitness::Bits32);
    assert_eq!(view.field("handle", &process).unwrap(), Value::Unsigned(0xbeef));
}

#[test]
fn test_remote_view_rereads_memory()
{
    let buffer = Address::new(0x7000);
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    process.write_u32(buffer, 0);
    let thread = thread(ThreadContext::new().with_register(GeneralRegister::Rcx, buffer.value()));

    let target = FunctionTarget::new("app", "fill").param("out", NativeType::pointer_to(NativeType::U32));
    let args = ArgumentExtractor::new(target)
        .unwrap()
        .extract_with(Bitness::Bits64, &process, &thread)
        .unwrap();
    let out = args.get("out").and_then(Value::as_remote).unwrap().clone();

    assert_eq!(out.read(&process).unwrap(), Value::Unsigned(0));
    // The callee writes through the pointer before returning
    process.write_u32(buffer, 42);
    assert_eq!(out.read(&process).unwrap(), Value::Unsigned(42));
}

#[test]
fn test_unknown_field_error()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    let thread = thread(ThreadContext::new().with_register(GeneralRegister::Rcx, 0x1000));
    let target = FunctionTarget::new("app", "f").param("p", NativeType::pointer_to_struct(handle_params()));
    let args = ArgumentExtractor::new(target)
        .unwrap()
        .extract_with(Bitness::Bits64, &process, &thread)
        .unwrap();

    let err = args.get("p").and_then(Value::as_remote).unwrap().field("nope", &process).unwrap_err();
    assert!(matches!(err, SnareError::UnknownField { ref field, .. } if field == "nope"));
}

#[test]
fn test_duplicate_parameter_names_last_wins()
{
    let process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    let thread = thread(
        ThreadContext::new()
            .with_register(GeneralRegister::Rcx, 1)
            .with_register(GeneralRegister::Rdx, 2),
    );
    let target = FunctionTarget::new("app", "f")
        .param("x", NativeType::U64)
        .param("x", NativeType::U64);

    let args = ArgumentExtractor::new(target)
        .unwrap()
        .extract_with(Bitness::Bits64, &process, &thread)
        .unwrap();
    assert_eq!(args.len(), 1);
    assert_eq!(args.get("x"), Some(&Value::Unsigned(2)));
}

/// Backend that only offers word reads, relying on the default byte read
struct WordOnlyProcess(SimulatedProcess);

impl TargetProcess for WordOnlyProcess
{
    fn pid(&self) -> ProcessId
    {
        self.0.pid()
    }

    fn bitness(&self) -> Bitness
    {
        self.0.bitness()
    }

    fn read_u32(&self, address: Address) -> SnareResult<u32>
    {
        self.0.read_u32(address)
    }

    fn read_u64(&self, address: Address) -> SnareResult<u64>
    {
        self.0.read_u64(address)
    }
}

#[test]
fn test_trailing_narrow_field_reads_exact_bytes()
{
    let record = Address::new(0x0050_0000);
    let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits32);
    process.write_u32(record, 0x0bad_f00d);
    process.write_bytes(record + 4, &[0x34, 0x12, 0x7f]);
    let def = StructDef::new("RECORD")
        .field("id", NativeType::U32)
        .field("port", NativeType::U16)
        .field("flag", NativeType::U8);
    let view = RemotePointer::new(record, NativeType::Struct(std::sync::Arc::new(def)), Bitness::Bits32);

    // The record ends at the end of mapped memory
    assert_eq!(view.field("id", &process).unwrap(), Value::Unsigned(0x0bad_f00d));
    assert_eq!(view.field("port", &process).unwrap(), Value::Unsigned(0x1234));
    assert_eq!(view.field("flag", &process).unwrap(), Value::Unsigned(0x7f));
}

#[test]
fn test_default_byte_read_uses_words()
{
    let mut inner = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
    inner.write_bytes(Address::new(0x4000), &[1, 2, 3, 4, 5, 6, 7, 8]);
    let process = WordOnlyProcess(inner);

    let mut buf = [0u8; 6];
    process.read_bytes(Address::new(0x4000), &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4, 5, 6]);

    let view = RemotePointer::new(Address::new(0x4002), NativeType::U16, Bitness::Bits64);
    assert_eq!(view.read(&process).unwrap(), Value::Unsigned(0x0403));
}
