use std::process;

use clap::{Parser, Subcommand};
use snare_core::arguments::retriever_for;
use snare_core::bitness::{BitnessContext, CS_32BIT, CS_64BIT};
use snare_core::target::{SimulatedProcess, SimulatedThread};
use snare_core::types::{Address, Bitness, GeneralRegister, ProcessId, ThreadContext, ThreadId};
use snare_core::SnareResult;
use snare_utils::{debug, info, init_logging, init_logging_with_level, LogConfig, LogLevel};

/// Breakpoint engine toolbox: bitness resolution and argument retrieval.
#[derive(Parser, Debug)]
#[command(name = "snare")]
#[command(version)]
#[command(about = "Breakpoint engine toolbox: bitness resolution and argument retrieval", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve which calling convention applies at a stop
    Resolve
    {
        /// Bitness of the debugger (32 or 64)
        #[arg(long, default_value = "64")]
        debugger: Bitness,
        /// Nominal bitness of the target process (32 or 64)
        #[arg(long)]
        process: Bitness,
        /// Code-segment selector of the stopped thread (hex or decimal)
        #[arg(long, value_parser = parse_selector, default_value = "0x33")]
        cs: u16,
    },
    /// Read raw function arguments from a simulated stop
    Args
    {
        /// Calling convention to use (32 or 64)
        #[arg(long)]
        bitness: Bitness,
        /// Stack pointer at function entry
        #[arg(long, value_parser = parse_number)]
        sp: u64,
        /// Register value, e.g. `rcx=0x10` (repeatable)
        #[arg(long = "reg", value_parser = parse_register)]
        registers: Vec<(GeneralRegister, u64)>,
        /// Memory word, e.g. `0x7ff0=0x401000` (repeatable, word width follows --bitness)
        #[arg(long = "word", value_parser = parse_word)]
        words: Vec<(u64, u64)>,
        /// Number of arguments to read
        #[arg(long, default_value_t = 4)]
        count: usize,
    },
}

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level {
        Some(level) => LogConfig::from_env().and_then(|config| init_logging_with_level(level, config.format)),
        None => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> SnareResult<()>
{
    match command {
        Commands::Resolve { debugger, process, cs } => {
            let context = BitnessContext {
                debugger,
                process,
                code_segment: cs,
            };
            let resolved = context.resolve();
            info!(%debugger, %process, cs, %resolved, "resolved bitness");

            println!("debugger: {debugger}");
            println!("process:  {process}");
            println!("cs:       0x{cs:x}{}", selector_note(cs));
            println!("wow64:    {}", context.is_wow64());
            println!("resolved: {resolved}");
            Ok(())
        }
        Commands::Args {
            bitness,
            sp,
            registers,
            words,
            count,
        } => {
            let mut process = SimulatedProcess::new(ProcessId(1), bitness);
            for (address, value) in words {
                process.write_word(Address::new(address), value, bitness);
            }

            let context = registers
                .into_iter()
                .fold(ThreadContext::new().with_sp(Address::new(sp)), |ctx, (reg, value)| {
                    ctx.with_register(reg, value)
                });
            debug!(registers = %context, "simulated stop");
            let thread = SimulatedThread::new(ThreadId(1), context);

            let retriever = retriever_for(bitness);
            println!("{bitness} arguments at sp=0x{sp:x}:");
            for index in 0..count {
                let raw = retriever.get_arg(index, &process, &thread)?;
                println!("  arg{index} = 0x{raw:x}");
            }
            Ok(())
        }
    }
}

fn selector_note(cs: u16) -> &'static str
{
    match cs {
        CS_32BIT => " (32-bit code segment)",
        CS_64BIT => " (64-bit code segment)",
        _ => "",
    }
}

fn parse_number(s: &str) -> Result<u64, String>
{
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("Invalid number '{s}': {e}"))
}

fn parse_selector(s: &str) -> Result<u16, String>
{
    let value = parse_number(s)?;
    u16::try_from(value).map_err(|_| format!("Selector out of range: {s}"))
}

fn parse_register(s: &str) -> Result<(GeneralRegister, u64), String>
{
    let (name, value) = s.split_once('=').ok_or_else(|| format!("Expected name=value, got '{s}'"))?;
    Ok((name.trim().parse()?, parse_number(value)?))
}

fn parse_word(s: &str) -> Result<(u64, u64), String>
{
    let (address, value) = s.split_once('=').ok_or_else(|| format!("Expected address=value, got '{s}'"))?;
    Ok((parse_number(address)?, parse_number(value)?))
}
