use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use wasmdbg_core::events::event_channel;
use wasmdbg_core::host::{Frame, StaticHost};
use wasmdbg_core::module::{read_module_file, ModuleHandle, ParseStatus};
use wasmdbg_core::value::LocalValue;
use wasmdbg_core::{CallStack, ModuleId, Session, SessionConfig};
use wasmdbg_utils::{info, init_logging, init_logging_with_level, warn, LogFormat, LogGuard, LogLevel, LoggingError};

/// A source-level inspector for WebAssembly modules carrying DWARF debug info.
#[derive(Parser, Debug)]
#[command(name = "wasmdbg")]
#[command(version)]
#[command(about = "A source-level inspector for WebAssembly modules carrying DWARF debug info", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format (pretty or json); overrides WASMDBG_LOG_FORMAT
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the sections of a module
    Sections
    {
        /// Path to the .wasm file
        module: PathBuf,
    },
    /// Print the line table
    Lines
    {
        /// Path to the .wasm file
        module: PathBuf,
    },
    /// Print the function table
    Functions
    {
        /// Path to the .wasm file
        module: PathBuf,
    },
    /// Disassemble the code section
    Instructions
    {
        /// Path to the .wasm file
        module: PathBuf,
    },
    /// Show where a single step from a module offset stops
    Step
    {
        /// Path to the .wasm file
        module: PathBuf,
        /// Module byte offset of the current instruction (hex: 0x1a or decimal)
        #[arg(long, value_parser = parse_offset)]
        offset: u64,
    },
    /// Format the arguments of the function at a module offset
    Args
    {
        /// Path to the .wasm file
        module: PathBuf,
        /// Module byte offset of the current instruction (hex: 0x1a or decimal)
        #[arg(long, value_parser = parse_offset, required_unless_present = "function")]
        offset: Option<u64>,
        /// Function name, used when no offset is known
        #[arg(long, conflicts_with = "offset")]
        function: Option<String>,
        /// Value of the next local, e.g. i32:5 or f64:1.5 (repeatable)
        #[arg(long = "local", value_parser = parse_local)]
        locals: Vec<LocalValue>,
        /// File holding a linear memory dump
        #[arg(long)]
        memory: Option<PathBuf>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn start_logging(cli: &Cli) -> Result<LogGuard, LoggingError>
{
    match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => init_logging_with_level(level.unwrap_or(LogLevel::Info), format.unwrap_or_default()),
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn Error>>
{
    match cli.command {
        Commands::Sections { module } => {
            let binary = read_module_file(&module)?;
            print_sections(&ModuleHandle::parse(
                ModuleId(0),
                binary,
                BTreeMap::new(),
                SessionConfig::default(),
            ))
        }
        Commands::Lines { module } => {
            let (_, handle) = load(&module)?;
            print_lines(&handle);
            Ok(())
        }
        Commands::Functions { module } => {
            let (_, handle) = load(&module)?;
            print_functions(&handle);
            Ok(())
        }
        Commands::Instructions { module } => {
            let (_, handle) = load(&module)?;
            print_instructions(&handle);
            Ok(())
        }
        Commands::Step { module, offset } => {
            let (_, handle) = load(&module)?;
            match handle.next_step_boundary(offset) {
                Some(stop) => println!("0x{offset:x} -> 0x{stop:x}"),
                None => println!("0x{offset:x}: no instruction with line information starts here"),
            }
            Ok(())
        }
        Commands::Args {
            module,
            offset,
            function,
            locals,
            memory,
        } => {
            let (session, handle) = load(&module)?;
            let memory = match memory {
                Some(path) => fs::read(path)?,
                None => Vec::new(),
            };
            let frame = match (offset, function) {
                (Some(offset), _) => Frame::new(offset, locals, memory),
                (None, Some(function)) => Frame::in_function(function, locals, memory),
                (None, None) => Frame {
                    locals,
                    ..Frame::default()
                },
            };
            let host = StaticHost::new(frame);
            let mut stack = CallStack::new();
            stack.enter(handle.id());

            let resolved = session.resolve_arguments(&stack, &host)?;
            println!("{}", resolved.function);
            for (name, value) in &resolved.values {
                println!("  {name} = {value}");
            }
            println!("{}", resolved.message);
            Ok(())
        }
    }
}

/// Register the module in a fresh session and report how the parse went.
fn load(path: &Path) -> Result<(Session, Arc<ModuleHandle>), Box<dyn Error>>
{
    info!("Loading {}", path.display());
    let binary = read_module_file(path)?;
    let (sender, events) = event_channel();
    let session = Session::with_config(SessionConfig::from_env()).with_events(sender);
    session.on_module_loaded(|module| match module.status() {
        ParseStatus::Ok => info!("{}: {}", module.id(), module.parsed_message()),
        status => warn!("{}: {status}", module.id()),
    });

    let handle = session.module_loaded(binary, BTreeMap::new());
    for event in events.try_iter() {
        info!("{}", event.describe());
    }
    if let ParseStatus::Error { .. } = handle.status() {
        return Err(handle.status().to_string().into());
    }
    Ok((session, handle))
}

fn print_sections(handle: &ModuleHandle) -> Result<(), Box<dyn Error>>
{
    let sections = handle.sections()?;
    for section in sections.sections() {
        let name = section.name.as_deref().unwrap_or("");
        println!(
            "{:<8} id={:<2} offset=0x{:06x} size={:<8} {name}",
            section.kind(),
            section.id,
            section.byte_offset,
            section.bytes.len()
        );
    }
    println!("status: {}", handle.status());
    Ok(())
}

fn print_lines(handle: &ModuleHandle)
{
    if let Some(header) = handle.line_table().header() {
        println!(
            "version {} line_base {} line_range {} opcode_base {} ({} program(s))",
            header.version,
            header.line_base,
            header.line_range,
            header.opcode_base,
            handle.line_table().program_count()
        );
        for (index, path) in header.file_paths().iter().enumerate() {
            println!("  file {}: {path}", index + 1);
        }
    }
    for row in handle.line_rows() {
        let mut flags = String::new();
        if row.is_stmt {
            flags.push_str(" stmt");
        }
        if row.prologue_end {
            flags.push_str(" prologue_end");
        }
        if row.end_sequence {
            flags.push_str(" end_sequence");
        }
        println!("{:#08x} {}:{}:{}{flags}", row.address.value(), row.file, row.line, row.column);
    }
}

fn print_functions(handle: &ModuleHandle)
{
    for function in handle.functions().iter() {
        let range = match (function.low_pc, function.high_pc) {
            (Some(low), Some(high)) => format!("{low}-{high}"),
            (Some(low), None) => format!("{low}"),
            _ => "-".to_string(),
        };
        let declared = match (&function.decl_file, function.decl_line) {
            (Some(file), Some(line)) => format!(" ({file}:{line})"),
            (Some(file), None) => format!(" ({file})"),
            _ => String::new(),
        };
        let params: Vec<_> = function.parameters.iter().map(|parameter| parameter.name.as_str()).collect();
        let language = function.name.language();
        let mangled = if language.is_mangled() { format!(" [{}]", function.name.raw()) } else { String::new() };
        println!(
            "{range:<16} {language:<4} {}({}){declared}{mangled}",
            function.name,
            params.join(", ")
        );
    }
}

fn print_instructions(handle: &ModuleHandle)
{
    let index = handle.instructions();
    let mut current = None;
    for instruction in index.instructions() {
        if current != Some(instruction.function_index) {
            current = Some(instruction.function_index);
            let name = index.function_name(instruction.function_index).unwrap_or("");
            println!("function {} {name}", instruction.function_index);
        }
        let offset = instruction.offset.to_module_offset(handle.code_offset());
        let line = handle
            .line_for_address(instruction.offset)
            .map(|row| format!("  ; {}", row.location().line_key()))
            .unwrap_or_default();
        println!("  {offset:#08x} {}{line}", instruction.text);
    }
    for body in index.bodies().iter().filter(|body| body.truncated) {
        println!(
            "function {} truncated after {} instruction(s)",
            body.index, body.instruction_count
        );
    }
}

fn parse_offset(raw: &str) -> Result<u64, String>
{
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|err| format!("invalid offset {raw:?}: {err}"))
}

fn parse_local(raw: &str) -> Result<LocalValue, String>
{
    let (kind, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <type>:<value>, got {raw:?}"))?;
    let invalid = |err: &dyn std::fmt::Display| format!("invalid {kind} value {value:?}: {err}");
    match kind {
        "i32" => value.parse().map(LocalValue::I32).map_err(|err| invalid(&err)),
        "i64" => value.parse().map(LocalValue::I64).map_err(|err| invalid(&err)),
        "f32" => value.parse().map(LocalValue::F32).map_err(|err| invalid(&err)),
        "f64" => value.parse().map(LocalValue::F64).map_err(|err| invalid(&err)),
        other => Err(format!("unknown local type {other:?} (expected i32, i64, f32 or f64)")),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_offset()
    {
        assert_eq!(parse_offset("0x1a"), Ok(0x1a));
        assert_eq!(parse_offset("26"), Ok(26));
        assert!(parse_offset("0xzz").is_err());
    }

    #[test]
    fn test_parse_local()
    {
        assert_eq!(parse_local("i32:-5"), Ok(LocalValue::I32(-5)));
        assert_eq!(parse_local("i64:7"), Ok(LocalValue::I64(7)));
        assert_eq!(parse_local("f64:1.5"), Ok(LocalValue::F64(1.5)));
        assert!(parse_local("v128:0").is_err());
        assert!(parse_local("i32").is_err());
        assert!(parse_local("i32:x").is_err());
    }

    #[test]
    fn test_cli_parses_args_command()
    {
        let cli = Cli::try_parse_from([
            "wasmdbg",
            "--log-level",
            "debug",
            "args",
            "app.wasm",
            "--offset",
            "0x20",
            "--local",
            "i32:1",
            "--local",
            "f32:2.5",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        let Commands::Args { offset, locals, memory, .. } = cli.command else {
            panic!("expected args command");
        };
        assert_eq!(offset, Some(0x20));
        assert_eq!(locals, [LocalValue::I32(1), LocalValue::F32(2.5)]);
        assert!(memory.is_none());
    }

    #[test]
    fn test_cli_args_by_function_name()
    {
        let cli = Cli::try_parse_from(["wasmdbg", "args", "app.wasm", "--function", "add"]).unwrap();
        let Commands::Args { offset, function, .. } = cli.command else {
            panic!("expected args command");
        };
        assert_eq!(offset, None);
        assert_eq!(function.as_deref(), Some("add"));

        assert!(Cli::try_parse_from(["wasmdbg", "args", "app.wasm"]).is_err());
        assert!(Cli::try_parse_from(["wasmdbg", "args", "app.wasm", "--offset", "1", "--function", "add"]).is_err());
    }
}
