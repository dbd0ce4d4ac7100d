#![doc = r#"
GTU-C312 simulator library crate.

This crate exposes the interpreter core for use by the CLI binary and
integration tests.

Modules:
- error: the typed fault taxonomy (`CpuFault`) the core raises
- word: the heterogeneous memory-cell representation
- memory: bounded word memory and the privileged-region guard
- instr_map: instruction-ordinal -> address resolution
- thread: thread-table bookkeeping and state derivation
- cpu: fetch/decode/execute and kernel/user dispatch
- loader: textual program format parser and loader
- report: human-readable thread-table and summary dumps
"#]

pub mod cpu;
pub mod error;
pub mod instr_map;
pub mod loader;
pub mod memory;
pub mod report;
pub mod thread;
pub mod word;

pub use cpu::Cpu;
pub use error::CpuFault;
pub use memory::Memory;
