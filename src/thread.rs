//! Thread bookkeeping: the kernel-side state that runs parallel to the
//! in-memory thread table and decides the five externally visible
//! thread states.

use std::collections::HashMap;

use crate::memory::{ADDR_SAVED_PC_BASE, Memory, Mode};

/// Number of thread-table slots the machine supports. Only 1..=4 are
/// pre-seeded READY at load; 5..=10 stay INACTIVE until first dispatched.
pub const MAX_THREADS: i64 = 10;
pub const SEEDED_THREAD_COUNT: i64 = 4;

pub type ThreadId = i64;

/// Either a wakeup cycle or a permanent-termination marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    BlockedUntil(i64),
    Terminated,
}

/// The five externally visible thread states, derived (never stored
/// as ground truth) in strict priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Term,
    Blck,
    Run,
    Rdy,
    Inact,
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThreadState::Term => "TERM",
            ThreadState::Blck => "BLCK",
            ThreadState::Run => "RUN",
            ThreadState::Rdy => "RDY",
            ThreadState::Inact => "INACT",
        };
        write!(f, "{s}")
    }
}

/// Kernel-side bookkeeping parallel to the in-memory thread table.
#[derive(Debug, Clone)]
pub struct ThreadTable {
    pub current_thread_id: ThreadId,
    blocked_until: HashMap<ThreadId, BlockState>,
    instruction_counts: HashMap<ThreadId, i64>,
    start_times: HashMap<ThreadId, Option<i64>>,
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTable {
    pub fn new() -> Self {
        let mut instruction_counts = HashMap::new();
        let mut start_times = HashMap::new();
        for tid in 1..=MAX_THREADS {
            instruction_counts.insert(tid, 0);
            // Threads 1..4 are seeded READY at cycle 0; 5..10 never ran.
            start_times.insert(tid, if tid <= SEEDED_THREAD_COUNT { Some(0) } else { None });
        }
        ThreadTable {
            current_thread_id: 1,
            blocked_until: HashMap::new(),
            instruction_counts,
            start_times,
        }
    }

    pub fn instruction_count(&self, tid: ThreadId) -> i64 {
        *self.instruction_counts.get(&tid).unwrap_or(&0)
    }

    pub fn start_time(&self, tid: ThreadId) -> Option<i64> {
        self.start_times.get(&tid).copied().flatten()
    }

    /// Record a thread's first-scheduled cycle if it hasn't run yet,
    /// without touching its instruction count. Used by the `USER`
    /// dispatch path; `record_user_step` is the counterpart that also
    /// bumps the count, for the ordinary per-instruction case.
    pub fn ensure_start_time(&mut self, tid: ThreadId, current_cycle: i64) {
        let start = self.start_times.entry(tid).or_insert(None);
        if start.is_none() {
            *start = Some(current_cycle);
        }
    }

    pub fn block_state(&self, tid: ThreadId) -> Option<BlockState> {
        self.blocked_until.get(&tid).copied()
    }

    /// Record one user-mode instruction executed under `tid`, setting its
    /// start time on first execution if it hasn't run yet.
    pub fn record_user_step(&mut self, tid: ThreadId, current_cycle: i64) {
        *self.instruction_counts.entry(tid).or_insert(0) += 1;
        let start = self.start_times.entry(tid).or_insert(None);
        if start.is_none() {
            *start = Some(current_cycle);
        }
    }

    pub fn mark_blocked(&mut self, tid: ThreadId, unblock_cycle: i64) {
        self.blocked_until
            .insert(tid, BlockState::BlockedUntil(unblock_cycle));
    }

    pub fn mark_terminated(&mut self, tid: ThreadId) {
        self.blocked_until.insert(tid, BlockState::Terminated);
    }

    pub fn clear_block(&mut self, tid: ThreadId) {
        self.blocked_until.remove(&tid);
    }

    /// Sweep every blocked thread whose deadline has arrived and clear
    /// its block, returning the ids that were unblocked this step. Must
    /// run before decode every cycle.
    pub fn unblock_sweep(&mut self, current_cycle: i64) -> Vec<ThreadId> {
        let mut unblocked = Vec::new();
        for (&tid, state) in self.blocked_until.clone().iter() {
            if let BlockState::BlockedUntil(deadline) = state {
                if current_cycle >= *deadline {
                    self.blocked_until.remove(&tid);
                    unblocked.push(tid);
                }
            }
        }
        unblocked
    }

    /// True once at most one of threads 1..4 remains non-terminated,
    /// counting the just-terminated thread as still active at the
    /// moment of the check.
    pub fn at_most_one_active(&self) -> bool {
        let active = (1..=SEEDED_THREAD_COUNT)
            .filter(|tid| !matches!(self.blocked_until.get(tid), Some(BlockState::Terminated)))
            .count();
        active <= 1
    }

    /// Derive the externally visible state for `tid` in fixed priority
    /// order. Needs direct memory access (mode, PC, saved-PC cell)
    /// since RDY detection reads memory outside this struct's own
    /// bookkeeping.
    pub fn derive_state(
        &self,
        tid: ThreadId,
        mem: &Memory,
        mode: Mode,
        current_cycle: i64,
    ) -> ThreadState {
        if matches!(self.blocked_until.get(&tid), Some(BlockState::Terminated)) {
            return ThreadState::Term;
        }
        if let Some(BlockState::BlockedUntil(deadline)) = self.blocked_until.get(&tid) {
            if *deadline > current_cycle {
                return ThreadState::Blck;
            }
        }
        if tid == self.current_thread_id && mode == Mode::User {
            return ThreadState::Run;
        }
        if (1..=SEEDED_THREAD_COUNT).contains(&tid) {
            let saved_pc_addr = ADDR_SAVED_PC_BASE + (tid - 1);
            if let Ok(v) = mem.read_int(Mode::Kernel, saved_pc_addr) {
                if v > 0 {
                    return ThreadState::Rdy;
                }
            }
        }
        ThreadState::Inact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_threads_one_to_four_with_start_time_zero() {
        let table = ThreadTable::new();
        assert_eq!(table.start_time(1), Some(0));
        assert_eq!(table.start_time(4), Some(0));
        assert_eq!(table.start_time(5), None);
        assert_eq!(table.start_time(10), None);
    }

    #[test]
    fn record_user_step_sets_start_time_once() {
        let mut table = ThreadTable::new();
        table.start_times.insert(5, None);
        table.record_user_step(5, 42);
        assert_eq!(table.start_time(5), Some(42));
        table.record_user_step(5, 100);
        assert_eq!(table.start_time(5), Some(42));
        assert_eq!(table.instruction_count(5), 2);
    }

    #[test]
    fn unblock_sweep_fires_exactly_at_deadline() {
        let mut table = ThreadTable::new();
        table.mark_blocked(1, 100);
        assert!(table.unblock_sweep(99).is_empty());
        assert_eq!(table.block_state(1), Some(BlockState::BlockedUntil(100)));
        let unblocked = table.unblock_sweep(100);
        assert_eq!(unblocked, vec![1]);
        assert_eq!(table.block_state(1), None);
    }

    #[test]
    fn at_most_one_active_counts_just_terminated_thread() {
        let mut table = ThreadTable::new();
        table.mark_terminated(2);
        table.mark_terminated(3);
        assert!(!table.at_most_one_active()); // 1 and 4 still active
        table.mark_terminated(4);
        assert!(table.at_most_one_active()); // only 1 left
    }

    #[test]
    fn derive_state_priority_term_beats_blocked() {
        let mut table = ThreadTable::new();
        table.mark_blocked(1, 50);
        table.mark_terminated(1);
        let mem = Memory::new(16_384);
        assert_eq!(
            table.derive_state(1, &mem, Mode::Kernel, 10),
            ThreadState::Term
        );
    }
}
