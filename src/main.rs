//! Command-line driver for the simulator.

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use c312sim::cpu::Cpu;
use c312sim::loader;
use c312sim::memory::DEFAULT_MEMORY_SIZE;
use c312sim::report;

const DEFAULT_INSTRUCTION_START: i64 = 200;
const DEFAULT_MAX_CYCLES: u64 = 5000;

/// GTU-C312 CPU simulator.
#[derive(Parser, Debug)]
#[command(name = "c312sim", about = "GTU-C312 CPU simulator")]
struct Cli {
    /// Program file to execute.
    #[arg(default_value = "os_program.txt")]
    program: String,

    /// Debug level (0-3): 1 traces steps, 2 additionally waits for
    /// Enter between steps, 3 additionally dumps the thread table on
    /// every step.
    #[arg(short = 'D', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    debug: u8,

    /// Memory size in words.
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
    memory_size: usize,

    /// Maximum cycles to execute before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
    max_cycles: u64,

    /// Print the resolved instruction map after loading.
    #[arg(long)]
    dump_instruction_map: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    println!("=== GTU-C312 CPU Simulator ===");
    println!("Loading program from: {}", cli.program);
    println!("Debug level: {}", cli.debug);
    println!("=====================================");

    let source = match fs::read_to_string(&cli.program) {
        Ok(s) => s,
        Err(e) => {
            error!(file = %cli.program, error = %e, "failed to read program file");
            return ExitCode::FAILURE;
        }
    };

    println!("Parsing OS with threads...");
    let program = match loader::parse(&source) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to parse program");
            return ExitCode::FAILURE;
        }
    };

    let mut cpu = Cpu::new(cli.memory_size);
    let instruction_map = match loader::load(&mut cpu.memory, &program, DEFAULT_INSTRUCTION_START) {
        Ok(map) => map,
        Err(e) => {
            error!(error = %e, "failed to load program");
            return ExitCode::FAILURE;
        }
    };
    cpu.instruction_map = instruction_map;

    info!(pc = cpu.pc(), instructions = cpu.instruction_map.len(), "program loaded");
    println!("Program loaded. Initial PC = {}", cpu.pc());
    println!("Instructions mapped: {}", cpu.instruction_map.len());

    if cli.dump_instruction_map {
        report::print_instruction_map(&cpu);
    }

    println!("\n--- CPU RUNNING ---");
    let result = run_with_debug(&mut cpu, cli.max_cycles, cli.debug);

    println!("--- CPU HALTED or Max Cycles Reached ---");
    println!("Total cycles executed: {}", cpu.cycle());

    match result {
        Ok(cycles) if cycles >= cli.max_cycles => {
            println!("Warning: Max cycles reached");
        }
        Err(fault) => {
            error!(%fault, "fatal fault");
        }
        _ => {}
    }

    report::print_summary(&cpu);
    ExitCode::SUCCESS
}

/// Thin wrapper over `Cpu::run` that adds the interactive/verbose debug
/// levels the core itself has no business knowing about: level 2 waits
/// for Enter between steps, level 3 additionally prints the thread
/// table after every step.
fn run_with_debug(
    cpu: &mut Cpu,
    max_cycles: u64,
    debug_level: u8,
) -> Result<u64, c312sim::CpuFault> {
    if debug_level < 2 {
        return cpu.run(max_cycles);
    }

    let mut cycles = 0u64;
    while !cpu.halted && cycles < max_cycles {
        match cpu.step() {
            Ok(c312sim::cpu::StepOutcome::Halted) => break,
            Ok(c312sim::cpu::StepOutcome::Continued) => {}
            Err(fault) => return Err(fault),
        }
        cycles += 1;

        if debug_level >= 3 {
            report::print_thread_table(cpu);
        }
        if debug_level == 2 {
            println!("--- Press Enter to continue ---");
            let _ = io::stdout().flush();
            let mut buf = String::new();
            let _ = io::stdin().read_to_string(&mut buf);
        }
    }
    Ok(cycles)
}
