//! The Instruction Map: ordinal (0-based position in the program's
//! instruction section) → absolute memory address of that instruction's
//! opcode cell. Built once by the loader; read by any opcode whose
//! operand denotes an instruction number.

use std::collections::HashMap;

use crate::error::CpuFault;

#[derive(Debug, Clone, Default)]
pub struct InstructionMap {
    ordinal_to_addr: HashMap<i64, i64>,
}

impl InstructionMap {
    pub fn new() -> Self {
        InstructionMap {
            ordinal_to_addr: HashMap::new(),
        }
    }

    pub fn insert(&mut self, ordinal: i64, addr: i64) {
        self.ordinal_to_addr.insert(ordinal, addr);
    }

    pub fn len(&self) -> usize {
        self.ordinal_to_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinal_to_addr.is_empty()
    }

    /// Resolve an instruction ordinal to its memory address, or a
    /// `BadInstrRef` fault if the ordinal was never mapped.
    pub fn resolve(&self, ordinal: i64) -> Result<i64, CpuFault> {
        self.ordinal_to_addr
            .get(&ordinal)
            .copied()
            .ok_or(CpuFault::BadInstrRef { ordinal })
    }

    /// Resolve a dispatch entry (ordinal 4 or 31), surfacing a
    /// `MissingEntry` fault (rather than `BadInstrRef`) since an absent
    /// entry here means the guest OS image is incomplete, not that a
    /// user program made a bad jump.
    pub fn resolve_entry(&self, ordinal: i64) -> Result<i64, CpuFault> {
        self.ordinal_to_addr
            .get(&ordinal)
            .copied()
            .ok_or(CpuFault::MissingEntry { ordinal })
    }

    pub fn iter_sorted(&self) -> Vec<(i64, i64)> {
        let mut entries: Vec<(i64, i64)> = self
            .ordinal_to_addr
            .iter()
            .map(|(&o, &a)| (o, a))
            .collect();
        entries.sort_by_key(|(o, _)| *o);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_ordinal() {
        let mut map = InstructionMap::new();
        map.insert(0, 200);
        map.insert(1, 203);
        assert_eq!(map.resolve(0).unwrap(), 200);
        assert_eq!(map.resolve(1).unwrap(), 203);
    }

    #[test]
    fn unknown_ordinal_is_bad_instr_ref() {
        let map = InstructionMap::new();
        assert_eq!(map.resolve(7).unwrap_err(), CpuFault::BadInstrRef { ordinal: 7 });
    }

    #[test]
    fn missing_dispatch_entry_is_missing_entry_fault() {
        let map = InstructionMap::new();
        assert_eq!(
            map.resolve_entry(4).unwrap_err(),
            CpuFault::MissingEntry { ordinal: 4 }
        );
    }
}
