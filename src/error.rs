//! Fault taxonomy for the GTU-C312 core.
//!
//! Every variant here is fatal to the CPU: surfacing one from `step`
//! always means the caller should halt and (if possible) still print the
//! final report. Parse and file-missing errors live outside this enum
//! because they belong to the loader/CLI boundary, not the execution
//! core, and are handled with a plain `Result<_, String>` instead.

use thiserror::Error;

/// A fatal fault raised by the interpreter or the syscall/dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuFault {
    #[error("protection fault: user-mode access to privileged address {addr}")]
    ProtectionFault { addr: i64 },

    #[error("bounds fault: address {addr} outside memory of size {memory_size}")]
    BoundsFault { addr: i64, memory_size: usize },

    #[error("bad PC: program counter {pc} outside memory of size {memory_size}")]
    BadPc { pc: i64, memory_size: usize },

    #[error("unknown opcode '{opcode}' at address {addr}")]
    UnknownOpcode { opcode: String, addr: i64 },

    #[error("bad instruction reference: instruction number {ordinal} not in instruction map")]
    BadInstrRef { ordinal: i64 },

    #[error("USER executed while already in user mode")]
    UserFromUser,

    #[error("unrecognized syscall subtype '{subtype}'")]
    BadSyscall { subtype: String },

    #[error("missing dispatch entry: instruction ordinal {ordinal} not found")]
    MissingEntry { ordinal: i64 },

    /// A numeric operation found a non-numeric word where it expected
    /// an integer cell.
    #[error("type mismatch: expected an integer word at address {addr}, found '{found}'")]
    TypeMismatch { addr: i64, found: String },
}
