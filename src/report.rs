//! Human-readable dumps: the thread-table debug view, the end-of-run
//! summary, and the instruction map listing. None of this feeds back
//! into the simulation; it exists purely for a human watching
//! `-D`/`--debug` output or the final report.

use crate::cpu::Cpu;
use crate::memory::{Mode, thread_result_addr, thread_table_row};
use crate::thread::MAX_THREADS;

/// `=== THREAD TABLE DEBUG (Mode 3) ===` view: one row per thread slot,
/// independent of whether that slot has ever been scheduled.
pub fn print_thread_table(cpu: &Cpu) {
    println!("\n=== THREAD TABLE DEBUG (Mode 3) ===");
    println!("TID | State | PC   | SP   | StartTime | InstrCount");
    println!("----|-------|------|------|-----------|----------");

    for tid in 1..=MAX_THREADS {
        let base = thread_table_row(tid);
        let (pc_val, sp_val) = if (base + 3) as usize + 1 <= cpu.memory.len() {
            (
                cpu.memory.read_int(Mode::Kernel, base + 2).unwrap_or(0),
                cpu.memory.read_int(Mode::Kernel, base + 3).unwrap_or(0),
            )
        } else {
            (0, 16_000 - tid * 1000)
        };

        let state = cpu
            .threads
            .derive_state(tid, &cpu.memory, cpu.mode, cpu.cycle());
        let start = cpu.threads.start_time(tid);
        let instr_count = cpu.threads.instruction_count(tid);
        let start_str = start.map(|s| s.to_string()).unwrap_or_else(|| "N/A".to_string());

        println!(
            " {tid:2} | {:5} | {pc_val:4} | {sp_val:4} | {start_str:>9} | {instr_count:10}",
            state.to_string()
        );
    }
    println!("{}", "=".repeat(55));
    println!();
}

/// Final "SIMULATION RESULTS" report printed once the run loop stops,
/// regardless of whether it stopped on HLT, a fault, or the cycle
/// budget.
pub fn print_summary(cpu: &Cpu) {
    println!("\n=== SIMULATION RESULTS ===");
    println!("Thread Execution Summary:");
    println!("TID | Status    | Instructions | Start Time | Result Location | Final Value");
    println!("----|-----------|--------------|------------|-----------------|------------");

    for tid in 1..=MAX_THREADS {
        let status = cpu
            .threads
            .derive_state(tid, &cpu.memory, cpu.mode, cpu.cycle());
        let instr_count = cpu.threads.instruction_count(tid);
        let start_time = cpu.threads.start_time(tid);
        let result_addr = thread_result_addr(tid);
        let final_value = if (result_addr as usize) < cpu.memory.len() {
            cpu.memory.read_int(Mode::Kernel, result_addr).unwrap_or(0)
        } else {
            0
        };
        let start_str = start_time
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        println!(
            " {tid:2} | {:9} | {instr_count:12} | {start_str:10} | {result_addr:15} | {final_value:11}"
        , status.to_string());
    }

    println!("\nDetailed Thread Results:");
    for tid in 1..=4 {
        let result_addr = thread_result_addr(tid);
        if (result_addr as usize) < cpu.memory.len() {
            let result = cpu.memory.read_int(Mode::Kernel, result_addr).unwrap_or(0);
            let instr_count = cpu.threads.instruction_count(tid);
            println!("Thread {tid}: Executed {instr_count} instructions, Result = {result}");
        }
    }

    let active = (1..=4)
        .filter(|&tid| cpu.threads.instruction_count(tid) > 0)
        .count();
    println!("\nTotal CPU cycles: {}", cpu.cycle());
    println!("Active threads: {active}");
}

/// `--dump-instruction-map` listing: ordinal → address → opcode cell.
pub fn print_instruction_map(cpu: &Cpu) {
    println!("\n=== INSTRUCTION MAP ===");
    for (ordinal, addr) in cpu.instruction_map.iter_sorted() {
        let opcode = cpu
            .memory
            .read(Mode::Kernel, addr)
            .map(|w| w.to_string())
            .unwrap_or_else(|_| "?".to_string());
        println!("Instruction {ordinal}: mem[{addr}] = {opcode}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;
    use crate::memory::DEFAULT_MEMORY_SIZE;

    #[test]
    fn summary_does_not_panic_on_a_fresh_cpu() {
        let cpu = Cpu::new(DEFAULT_MEMORY_SIZE);
        print_summary(&cpu);
        print_thread_table(&cpu);
        print_instruction_map(&cpu);
    }
}
