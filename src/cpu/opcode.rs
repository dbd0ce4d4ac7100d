//! Opcode and syscall-subtype enums: mnemonics decode once per step
//! into a typed `Opcode`, instead of comparing the raw string against
//! a family of constants at every use site.

use std::fmt;
use std::str::FromStr;

use crate::error::CpuFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Set,
    Cpy,
    Cpyi,
    Cpyi2,
    Add,
    Addi,
    Subi,
    Jif,
    Push,
    Pop,
    Call,
    Ret,
    User,
    Syscall,
    Hlt,
}

impl Opcode {
    /// Number of operand cells following the opcode cell.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Set
            | Opcode::Cpy
            | Opcode::Cpyi
            | Opcode::Cpyi2
            | Opcode::Add
            | Opcode::Addi
            | Opcode::Subi
            | Opcode::Jif
            | Opcode::Syscall => 2,
            Opcode::Push | Opcode::Pop | Opcode::Call | Opcode::User => 1,
            Opcode::Ret | Opcode::Hlt => 0,
        }
    }

    /// Word width of an instruction (opcode cell + operand cells),
    /// i.e. how far PC advances for the opcodes that own no jump.
    pub fn width(self) -> i64 {
        1 + self.operand_count() as i64
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SET" => Opcode::Set,
            "CPY" => Opcode::Cpy,
            "CPYI" => Opcode::Cpyi,
            "CPYI2" => Opcode::Cpyi2,
            "ADD" => Opcode::Add,
            "ADDI" => Opcode::Addi,
            "SUBI" => Opcode::Subi,
            "JIF" => Opcode::Jif,
            "PUSH" => Opcode::Push,
            "POP" => Opcode::Pop,
            "CALL" => Opcode::Call,
            "RET" => Opcode::Ret,
            "USER" => Opcode::User,
            "SYSCALL" => Opcode::Syscall,
            "HLT" => Opcode::Hlt,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Opcode::Set => "SET",
            Opcode::Cpy => "CPY",
            Opcode::Cpyi => "CPYI",
            Opcode::Cpyi2 => "CPYI2",
            Opcode::Add => "ADD",
            Opcode::Addi => "ADDI",
            Opcode::Subi => "SUBI",
            Opcode::Jif => "JIF",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::User => "USER",
            Opcode::Syscall => "SYSCALL",
            Opcode::Hlt => "HLT",
        };
        write!(f, "{s}")
    }
}

/// The SYSCALL instruction's subtype operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallKind {
    Prn,
    HltThread,
    Yield,
}

impl SyscallKind {
    /// The numeric syscall id written into mem[SYSCALL_ID].
    pub fn id(self) -> i64 {
        match self {
            SyscallKind::Prn => 1,
            SyscallKind::HltThread => 2,
            SyscallKind::Yield => 3,
        }
    }

    pub fn parse(token: &str) -> Result<Self, CpuFault> {
        match token.to_ascii_uppercase().as_str() {
            "PRN" => Ok(SyscallKind::Prn),
            "HLT_THREAD" => Ok(SyscallKind::HltThread),
            "YIELD" => Ok(SyscallKind::Yield),
            other => Err(CpuFault::BadSyscall {
                subtype: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_opcode() {
        for (s, op) in [
            ("SET", Opcode::Set),
            ("CPY", Opcode::Cpy),
            ("CPYI", Opcode::Cpyi),
            ("CPYI2", Opcode::Cpyi2),
            ("ADD", Opcode::Add),
            ("ADDI", Opcode::Addi),
            ("SUBI", Opcode::Subi),
            ("JIF", Opcode::Jif),
            ("PUSH", Opcode::Push),
            ("POP", Opcode::Pop),
            ("CALL", Opcode::Call),
            ("RET", Opcode::Ret),
            ("USER", Opcode::User),
            ("SYSCALL", Opcode::Syscall),
            ("HLT", Opcode::Hlt),
        ] {
            assert_eq!(s.parse::<Opcode>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_mnemonic_rejected() {
        assert!("FOO".parse::<Opcode>().is_err());
    }

    #[test]
    fn widths_match_operand_layout() {
        assert_eq!(Opcode::Set.width(), 3);
        assert_eq!(Opcode::Push.width(), 2);
        assert_eq!(Opcode::Hlt.width(), 1);
    }

    #[test]
    fn syscall_kind_case_insensitive() {
        assert_eq!(SyscallKind::parse("prn").unwrap(), SyscallKind::Prn);
        assert_eq!(SyscallKind::parse("Hlt_Thread").unwrap(), SyscallKind::HltThread);
        assert_eq!(SyscallKind::parse("YIELD").unwrap().id(), 3);
    }

    #[test]
    fn syscall_kind_rejects_unknown() {
        assert!(matches!(
            SyscallKind::parse("NOPE"),
            Err(CpuFault::BadSyscall { .. })
        ));
    }
}
