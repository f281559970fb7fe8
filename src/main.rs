// File: src/main.rs
//
// Entry point: dispatches to the REPL or runs a single script file.
// Plain `clap`-derived `Cli` with a single optional positional argument
// and a `--disassemble` flag — no subcommands, benchmarking, or
// profiling surface to speak of.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use colored::Colorize;

use lumen::object::{ObjKind, ObjRef};
use lumen::value::Value;
use lumen::{compiler, debug, errors, gc, repl, vm};

#[derive(ClapParser)]
#[command(
    name = "lumen",
    about = "Lumen: a small class-based scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    /// Path to a .lumen script. Omit to start the REPL.
    file: Option<PathBuf>,

    /// Print the compiled bytecode for the script (and every function it
    /// defines) instead of running it.
    #[arg(long)]
    disassemble: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.file {
        None => run_repl(),
        Some(file) => run_file(&file, cli.disassemble),
    }
}

fn run_repl() -> ExitCode {
    match repl::Repl::new() {
        Ok(mut repl) => match repl.run() {
            Ok(()) => ExitCode::from(0),
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                ExitCode::from(70)
            }
        },
        Err(err) => {
            eprintln!("{} failed to start REPL: {}", "error:".red().bold(), err);
            ExitCode::from(70)
        }
    }
}

fn run_file(path: &PathBuf, disassemble: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{} couldn't read {}: {}", "error:".red().bold(), path.display(), err);
            return ExitCode::from(74);
        }
    };

    if disassemble {
        if let Err(code) = disassemble_script(&source) {
            return code;
        }
    }

    let mut vm = vm::Vm::new();
    match vm.interpret(&source) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Compiles and prints the top-level chunk and every function reachable
/// through its constant pool, depth-first, ahead of the real run below.
/// This compiles the source a second time rather than reusing the
/// `ObjFunction` it builds, so the dump can use a throwaway heap instead
/// of threading one compilation's output into another `Vm`'s.
fn disassemble_script(source: &str) -> Result<(), ExitCode> {
    let heap = gc::Heap::new();
    let function = match compiler::Compiler::compile(source, &heap) {
        Ok(function) => function,
        Err(diagnostics) => {
            eprintln!("{}", errors::LumenError::Compile(diagnostics));
            return Err(ExitCode::from(65));
        }
    };

    let mut seen = Vec::new();
    disassemble_function(function, &mut seen);
    Ok(())
}

fn disassemble_function(function_ref: ObjRef, seen: &mut Vec<ObjRef>) {
    if seen.contains(&function_ref) {
        return;
    }
    seen.push(function_ref);

    let obj = function_ref.get();
    let Some(function) = obj.as_function() else { return };

    let name = match function.name {
        None => "<script>".to_string(),
        Some(name_ref) => name_ref.get().as_string().map(|s| s.bytes.to_string()).unwrap_or_default(),
    };
    debug::disassemble_chunk(&function.chunk, &name);
    println!();

    for constant in &function.chunk.constants {
        if let Value::Obj(inner) = constant {
            if matches!(inner.get().kind, ObjKind::Function(_)) {
                disassemble_function(*inner, seen);
            }
        }
    }
}
