//! Fetch/decode/execute core plus the kernel↔user dispatch paths.
//! `Cpu::step` is the single place every opcode's semantics live;
//! `Cpu::run` drives it to completion or a fatal fault.

pub mod opcode;

use tracing::{debug, trace, warn};

use crate::error::CpuFault;
use crate::instr_map::InstructionMap;
use crate::memory::{
    ADDR_INSTR_COUNT, ADDR_PC, ADDR_SAVED_PC_BASE, ADDR_SP, ADDR_SYSCALL_ARG1, ADDR_SYSCALL_ID,
    ADDR_SYSCALL_RESULT, Memory, Mode, thread_table_row,
};
use crate::thread::{ThreadTable, ThreadId};
use crate::word::Word;
pub use opcode::{Opcode, SyscallKind};

/// In-memory thread-table state codes, agreed on by the scheduler and
/// dispatcher living in the loaded OS image.
const TABLE_STATE_TERMINATED: i64 = 0;
const TABLE_STATE_READY: i64 = 1;
const TABLE_STATE_RUNNING: i64 = 2;
const TABLE_STATE_BLOCKED: i64 = 3;

/// Fixed dispatch entry ordinals: every syscall that returns to kernel
/// code lands on one of these two guest entry points.
const ENTRY_OS_HANDLER: i64 = 4;
const ENTRY_SCHEDULER: i64 = 31;

/// Cycles a PRN syscall blocks its thread for.
const PRN_BLOCK_CYCLES: i64 = 100;

/// What a completed step did, distinguishing a clean HLT from an
/// ordinary instruction so `run` knows whether to keep looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continued,
    Halted,
}

pub struct Cpu {
    pub memory: Memory,
    pub instruction_map: InstructionMap,
    pub threads: ThreadTable,
    pub mode: Mode,
    pub halted: bool,
}

impl Cpu {
    pub fn new(memory_size: usize) -> Self {
        let mut memory = Memory::new(memory_size);
        memory.raw_write_int(ADDR_PC, 0);
        memory.raw_write_int(ADDR_SP, memory_size as i64 - 1);
        memory.raw_write_int(ADDR_INSTR_COUNT, 0);
        Cpu {
            memory,
            instruction_map: InstructionMap::new(),
            threads: ThreadTable::new(),
            mode: Mode::Kernel,
            halted: false,
        }
    }

    pub fn pc(&self) -> i64 {
        self.memory.raw_read_int(ADDR_PC)
    }

    fn set_pc(&mut self, value: i64) {
        self.memory.raw_write_int(ADDR_PC, value);
    }

    pub fn sp(&self) -> i64 {
        self.memory.raw_read_int(ADDR_SP)
    }

    fn set_sp(&mut self, value: i64) {
        self.memory.raw_write_int(ADDR_SP, value);
    }

    /// The global cycle counter: every completed step advances this by
    /// one, regardless of which thread or mode it ran in.
    pub fn cycle(&self) -> i64 {
        self.memory.raw_read_int(ADDR_INSTR_COUNT)
    }

    fn advance_cycle(&mut self) {
        let c = self.cycle();
        self.memory.raw_write_int(ADDR_INSTR_COUNT, c + 1);
    }

    fn current_thread(&self) -> ThreadId {
        self.threads.current_thread_id
    }

    /// Best-effort thread-table cell write: only performed once the
    /// table row is in bounds, and silently skipped otherwise rather
    /// than faulting (a tiny `--memory-size` should still run, just
    /// without a visible table).
    fn write_table_cell(&mut self, addr: i64, value: i64) {
        if addr >= 0 && (addr as usize) < self.memory.len() {
            self.memory.raw_write_int(addr, value);
        }
    }

    fn update_table_state(&mut self, tid: ThreadId, state: i64) {
        self.write_table_cell(thread_table_row(tid) + 1, state);
    }

    fn update_table_running(&mut self, tid: ThreadId, pc: i64, sp: i64) {
        self.write_table_cell(thread_table_row(tid) + 1, TABLE_STATE_RUNNING);
        self.write_table_cell(thread_table_row(tid) + 2, pc);
        self.write_table_cell(thread_table_row(tid) + 3, sp);
    }

    /// Advance the simulation by exactly one instruction. Returns
    /// `Ok(StepOutcome::Halted)` on a clean HLT, `Ok(Continued)` on any
    /// other completed instruction, and `Err` on a fatal fault — in
    /// every case the caller owns deciding what happens next.
    pub fn step(&mut self) -> Result<StepOutcome, CpuFault> {
        if self.halted {
            return Ok(StepOutcome::Halted);
        }

        if self.mode == Mode::User {
            let tid = self.current_thread();
            self.threads.record_user_step(tid, self.cycle());
        }

        let current_cycle = self.cycle();
        for tid in self.threads.unblock_sweep(current_cycle) {
            debug!(tid, current_cycle, "thread unblocked");
            self.update_table_state(tid, TABLE_STATE_READY);
        }

        let current_pc = self.pc();
        if current_pc < 0 || current_pc as usize >= self.memory.len() {
            return Err(CpuFault::BadPc {
                pc: current_pc,
                memory_size: self.memory.len(),
            });
        }

        let opcode_word = self.memory.read(self.mode, current_pc)?;
        let opcode_str = opcode_word.to_string();
        let opcode: Opcode = opcode_str.parse().map_err(|_| CpuFault::UnknownOpcode {
            opcode: opcode_str.clone(),
            addr: current_pc,
        })?;

        trace!(cycle = current_cycle, pc = current_pc, %opcode, mode = ?self.mode, "step");

        let mut pc_set_explicitly = false;

        match opcode {
            Opcode::Set => {
                let val_b = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a = self.memory.read_int(self.mode, current_pc + 2)?;
                if addr_a == ADDR_PC {
                    let target = self.instruction_map.resolve(val_b)?;
                    self.set_pc(target);
                    pc_set_explicitly = true;
                } else {
                    self.memory.write_int(self.mode, addr_a, val_b)?;
                }
            }

            Opcode::Cpy => {
                let addr_a1 = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a2 = self.memory.read_int(self.mode, current_pc + 2)?;
                let value = self.memory.read(self.mode, addr_a1)?;
                self.memory.write(self.mode, addr_a2, value)?;
            }

            Opcode::Cpyi => {
                let addr_a1 = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a2 = self.memory.read_int(self.mode, current_pc + 2)?;
                let indirect_addr = self.memory.read_int(self.mode, addr_a1)?;
                let value = self.memory.read(self.mode, indirect_addr)?;
                self.memory.write(self.mode, addr_a2, value)?;
            }

            Opcode::Cpyi2 => {
                let addr_a1 = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a2 = self.memory.read_int(self.mode, current_pc + 2)?;
                let indirect_addr1 = self.memory.read_int(self.mode, addr_a1)?;
                let indirect_addr2 = self.memory.read_int(self.mode, addr_a2)?;
                let value = self.memory.read(self.mode, indirect_addr1)?;
                self.memory.write(self.mode, indirect_addr2, value)?;
            }

            Opcode::Add => {
                let addr_a = self.memory.read_int(self.mode, current_pc + 1)?;
                let val_b = self.memory.read_int(self.mode, current_pc + 2)?;
                let current_val_a = self.memory.read_int(self.mode, addr_a)?;
                self.memory
                    .write_int(self.mode, addr_a, current_val_a + val_b)?;
            }

            Opcode::Addi => {
                let addr_a1 = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a2 = self.memory.read_int(self.mode, current_pc + 2)?;
                let val_a1 = self.memory.read_int(self.mode, addr_a1)?;
                let val_a2 = self.memory.read_int(self.mode, addr_a2)?;
                self.memory.write_int(self.mode, addr_a1, val_a1 + val_a2)?;
            }

            Opcode::Subi => {
                let addr_a1 = self.memory.read_int(self.mode, current_pc + 1)?;
                let addr_a2 = self.memory.read_int(self.mode, current_pc + 2)?;
                let val_a1 = self.memory.read_int(self.mode, addr_a1)?;
                let val_a2 = self.memory.read_int(self.mode, addr_a2)?;
                self.memory.write_int(self.mode, addr_a2, val_a1 - val_a2)?;
            }

            Opcode::Jif => {
                let addr_a = self.memory.read_int(self.mode, current_pc + 1)?;
                let target_instr_num = self.memory.read_int(self.mode, current_pc + 2)?;
                let val_a = self.memory.read_int(self.mode, addr_a)?;
                if val_a <= 0 {
                    let target = self.instruction_map.resolve(target_instr_num)?;
                    self.set_pc(target);
                } else {
                    self.set_pc(current_pc + opcode.width());
                }
                pc_set_explicitly = true;
            }

            Opcode::Push => {
                let addr_a = self.memory.read_int(self.mode, current_pc + 1)?;
                let value = self.memory.read(self.mode, addr_a)?;
                let new_sp = self.sp() - 1;
                self.memory.write(self.mode, new_sp, value)?;
                self.set_sp(new_sp);
            }

            Opcode::Pop => {
                let addr_a = self.memory.read_int(self.mode, current_pc + 1)?;
                let value = self.memory.read(self.mode, self.sp())?;
                self.memory.write(self.mode, addr_a, value)?;
                self.set_sp(self.sp() + 1);
            }

            Opcode::Call => {
                let target_instr_num = self.memory.read_int(self.mode, current_pc + 1)?;
                let return_pc = current_pc + opcode.width();
                let new_sp = self.sp() - 1;
                self.memory.write_int(self.mode, new_sp, return_pc)?;
                self.set_sp(new_sp);
                let target = self.instruction_map.resolve(target_instr_num)?;
                self.set_pc(target);
                pc_set_explicitly = true;
            }

            Opcode::Ret => {
                let return_pc = self.memory.read_int(self.mode, self.sp())?;
                self.set_sp(self.sp() + 1);
                self.set_pc(return_pc);
                pc_set_explicitly = true;
            }

            Opcode::User => {
                if self.mode != Mode::Kernel {
                    return Err(CpuFault::UserFromUser);
                }
                let addr_a = self.memory.read_int(self.mode, current_pc + 1)?;
                let target_pc = self.memory.read_int(self.mode, addr_a)?;

                let tid = self
                    .memory
                    .read_int(Mode::Kernel, crate::memory::ADDR_CURRENT_THREAD_SELECT)?;
                self.threads.current_thread_id = tid;
                self.threads.ensure_start_time(tid, current_cycle);

                let sp = self.sp();
                self.update_table_running(tid, target_pc, sp);

                self.mode = Mode::User;
                self.set_pc(target_pc);
                pc_set_explicitly = true;
            }

            Opcode::Syscall => {
                let kind_word = self.memory.read(self.mode, current_pc + 1)?;
                let arg_addr = self.memory.read_int(self.mode, current_pc + 2)?;

                if self.mode == Mode::User {
                    self.mode = Mode::Kernel;
                }

                let kind = SyscallKind::parse(&kind_word.to_string());

                let syscall_id = kind.as_ref().map(|k| k.id()).unwrap_or(0);
                self.memory
                    .write_int(Mode::Kernel, ADDR_SYSCALL_ID, syscall_id)?;
                self.memory
                    .write_int(Mode::Kernel, ADDR_SYSCALL_ARG1, arg_addr)?;

                let kind = kind?;
                let tid = self.current_thread();

                match kind {
                    SyscallKind::HltThread => {
                        self.update_table_state(tid, TABLE_STATE_TERMINATED);
                        self.write_table_cell(thread_table_row(tid) + 2, 0);
                        self.threads.mark_terminated(tid);
                        let pc_save_addr = ADDR_SAVED_PC_BASE + (tid - 1);
                        self.memory.write_int(Mode::Kernel, pc_save_addr, 0)?;
                        warn!(tid, "thread terminated");

                        if self.threads.at_most_one_active() {
                            debug!("all active threads terminated, halting");
                            self.halted = true;
                        }

                        let target = self.instruction_map.resolve_entry(ENTRY_SCHEDULER)?;
                        self.set_pc(target);
                        pc_set_explicitly = true;
                    }

                    SyscallKind::Prn => {
                        self.update_table_state(tid, TABLE_STATE_BLOCKED);
                        let value = self.memory.read(Mode::Kernel, arg_addr)?;
                        println!("THREAD_{tid}_OUTPUT: {value}");
                        let unblock_cycle = current_cycle + PRN_BLOCK_CYCLES;
                        self.threads.mark_blocked(tid, unblock_cycle);
                        debug!(tid, unblock_cycle, "thread blocked for PRN");

                        let return_pc = current_pc + opcode.width();
                        self.memory
                            .write_int(Mode::Kernel, ADDR_SYSCALL_RESULT, return_pc)?;
                        let target = self.instruction_map.resolve_entry(ENTRY_OS_HANDLER)?;
                        self.set_pc(target);
                        pc_set_explicitly = true;
                    }

                    SyscallKind::Yield => {
                        self.update_table_state(tid, TABLE_STATE_READY);
                        debug!(tid, "thread yielded");

                        let return_pc = current_pc + opcode.width();
                        self.memory
                            .write_int(Mode::Kernel, ADDR_SYSCALL_RESULT, return_pc)?;
                        let target = self.instruction_map.resolve_entry(ENTRY_OS_HANDLER)?;
                        self.set_pc(target);
                        pc_set_explicitly = true;
                    }
                }
            }

            Opcode::Hlt => {
                self.halted = true;
            }
        }

        if !pc_set_explicitly && !self.halted {
            self.set_pc(current_pc + opcode.width());
        }

        self.advance_cycle();

        if self.halted {
            Ok(StepOutcome::Halted)
        } else {
            Ok(StepOutcome::Continued)
        }
    }

    /// Drive the simulation to completion: either a clean HLT, a fatal
    /// fault, or exhausting `max_cycles`.
    pub fn run(&mut self, max_cycles: u64) -> Result<u64, CpuFault> {
        let mut cycles = 0u64;
        while !self.halted && cycles < max_cycles {
            match self.step() {
                Ok(StepOutcome::Halted) => break,
                Ok(StepOutcome::Continued) => {}
                Err(fault) => {
                    self.halted = true;
                    return Err(fault);
                }
            }
            cycles += 1;
        }
        Ok(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_MEMORY_SIZE;

    fn program_with(instrs: &[(i64, Opcode, &[Word])]) -> Cpu {
        let mut cpu = Cpu::new(DEFAULT_MEMORY_SIZE);
        let mut addr = 200;
        for (ordinal, op, args) in instrs {
            cpu.instruction_map.insert(*ordinal, addr);
            cpu.memory
                .write(Mode::Kernel, addr, Word::from(op.to_string().as_str()))
                .unwrap();
            addr += 1;
            for a in args.iter() {
                cpu.memory.write(Mode::Kernel, addr, a.clone()).unwrap();
                addr += 1;
            }
        }
        cpu.set_pc(200);
        cpu
    }

    #[test]
    fn set_writes_literal_into_memory() {
        let mut cpu = program_with(&[(0, Opcode::Set, &[Word::Int(42), Word::Int(1500)])]);
        cpu.step().unwrap();
        assert_eq!(cpu.memory.read_int(Mode::Kernel, 1500).unwrap(), 42);
        assert_eq!(cpu.pc(), 203);
    }

    #[test]
    fn hlt_halts_and_still_advances_cycle() {
        let mut cpu = program_with(&[(0, Opcode::Hlt, &[])]);
        let outcome = cpu.step().unwrap();
        assert_eq!(outcome, StepOutcome::Halted);
        assert!(cpu.halted);
        assert_eq!(cpu.cycle(), 1);
    }

    #[test]
    fn jif_jumps_on_non_positive_value() {
        let mut cpu = program_with(&[
            (0, Opcode::Jif, &[Word::Int(1500), Word::Int(1)]),
            (1, Opcode::Hlt, &[]),
        ]);
        cpu.memory.write_int(Mode::Kernel, 1500, 0).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), cpu.instruction_map.resolve(1).unwrap());
    }

    #[test]
    fn jif_jumps_on_negative_value() {
        let mut cpu = program_with(&[
            (0, Opcode::Jif, &[Word::Int(1500), Word::Int(1)]),
            (1, Opcode::Hlt, &[]),
        ]);
        cpu.memory.write_int(Mode::Kernel, 1500, -1).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), cpu.instruction_map.resolve(1).unwrap());
    }

    #[test]
    fn jif_does_not_jump_on_positive_value() {
        let mut cpu = program_with(&[
            (0, Opcode::Jif, &[Word::Int(1500), Word::Int(1)]),
            (1, Opcode::Hlt, &[]),
        ]);
        let fallthrough_pc = cpu.pc() + Opcode::Jif.width();
        cpu.memory.write_int(Mode::Kernel, 1500, 1).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.pc(), fallthrough_pc);
    }

    #[test]
    fn cpyi_copies_through_a_single_pointer() {
        let mut cpu = program_with(&[(0, Opcode::Cpyi, &[Word::Int(1500), Word::Int(1502)])]);
        cpu.memory.write_int(Mode::Kernel, 1500, 1501).unwrap();
        cpu.memory.write_int(Mode::Kernel, 1501, 99).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.memory.read_int(Mode::Kernel, 1502).unwrap(), 99);
    }

    #[test]
    fn push_then_pop_round_trips() {
        let mut cpu = program_with(&[
            (0, Opcode::Push, &[Word::Int(1500)]),
            (1, Opcode::Pop, &[Word::Int(1501)]),
        ]);
        cpu.memory.write_int(Mode::Kernel, 1500, 77).unwrap();
        let sp_before = cpu.sp();
        cpu.step().unwrap();
        assert_eq!(cpu.sp(), sp_before - 1);
        cpu.step().unwrap();
        assert_eq!(cpu.sp(), sp_before);
        assert_eq!(cpu.memory.read_int(Mode::Kernel, 1501).unwrap(), 77);
    }

    #[test]
    fn call_pushes_pc_plus_two_and_ret_restores_it() {
        let mut cpu = program_with(&[
            (0, Opcode::Call, &[Word::Int(1)]),
            (1, Opcode::Ret, &[]),
        ]);
        let call_pc = cpu.pc();
        cpu.step().unwrap(); // CALL
        let return_addr = cpu.memory.read_int(Mode::Kernel, cpu.sp()).unwrap();
        assert_eq!(return_addr, call_pc + 2);
        cpu.step().unwrap(); // RET
        assert_eq!(cpu.pc(), return_addr);
    }

    #[test]
    fn user_mode_write_to_privileged_address_is_protection_fault() {
        let mut cpu = program_with(&[(0, Opcode::Set, &[Word::Int(1), Word::Int(5)])]);
        cpu.mode = Mode::User;
        let err = cpu.step().unwrap_err();
        assert_eq!(err, CpuFault::ProtectionFault { addr: 5 });
    }

    #[test]
    fn user_instruction_outside_kernel_mode_is_fatal() {
        let mut cpu = program_with(&[(0, Opcode::User, &[Word::Int(180)])]);
        cpu.mode = Mode::User;
        assert_eq!(cpu.step().unwrap_err(), CpuFault::UserFromUser);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut cpu = Cpu::new(DEFAULT_MEMORY_SIZE);
        cpu.memory
            .write(Mode::Kernel, 200, Word::from("NOPE"))
            .unwrap();
        cpu.set_pc(200);
        assert!(matches!(
            cpu.step(),
            Err(CpuFault::UnknownOpcode { .. })
        ));
    }
}
