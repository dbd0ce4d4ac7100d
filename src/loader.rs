//! Textual program loader: parses the data/instruction section format
//! and writes it into memory before execution starts. Not part of the
//! simulation core, so a malformed input file surfaces as a plain
//! `Result<_, String>` boundary rather than the typed `CpuFault` the
//! execution core raises.

use std::collections::BTreeMap;

use crate::memory::{ADDR_PC, Memory, Mode};
use crate::word::Word;

/// One parsed instruction: its raw mnemonic plus operand tokens, still
/// in source order (ordinal = position in the instruction section).
/// The mnemonic is stored verbatim and is not validated against the
/// known opcode set here — an unrecognized mnemonic only becomes an
/// error if the CPU ever actually reaches it during execution.
#[derive(Debug, Clone)]
pub struct ParsedInstruction {
    pub mnemonic: String,
    pub args: Vec<Word>,
}

/// The two sections a program-text file is parsed into.
#[derive(Debug, Clone, Default)]
pub struct ParsedProgram {
    pub data: BTreeMap<i64, Word>,
    pub instructions: Vec<ParsedInstruction>,
}

/// Parse program text into data and instruction sections. Lines are
/// `#`-comment-stripped and blank lines skipped; `Begin/End Data
/// Section` and `Begin/End Instruction Section` delimit the two
/// regions the way the source format defines them.
pub fn parse(source: &str) -> Result<ParsedProgram, String> {
    let mut program = ParsedProgram::default();
    let mut in_data = false;
    let mut in_instructions = false;

    for (line_no, raw_line) in source.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "Begin Data Section" => {
                in_data = true;
                continue;
            }
            "End Data Section" => {
                in_data = false;
                continue;
            }
            "Begin Instruction Section" => {
                in_instructions = true;
                continue;
            }
            "End Instruction Section" => {
                in_instructions = false;
                continue;
            }
            _ => {}
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        if in_data {
            if let Err(e) = parse_data_line(&parts, &mut program.data) {
                eprintln!("line {}: {e}, skipping", line_no + 1);
                continue;
            }
        } else if in_instructions {
            match parse_instruction_line(&parts) {
                Ok(Some(instr)) => program.instructions.push(instr),
                Ok(None) => {}
                Err(e) => {
                    eprintln!("line {}: {e}, skipping", line_no + 1);
                    continue;
                }
            }
        }
    }

    Ok(program)
}

fn parse_data_line(parts: &[&str], data: &mut BTreeMap<i64, Word>) -> Result<(), String> {
    let addr: i64 = parts
        .first()
        .ok_or("missing data address")?
        .parse()
        .map_err(|_| "data address is not an integer".to_string())?;
    let value_tok = parts.get(1).ok_or("missing data value")?;
    data.insert(addr, Word::from_token(value_tok));
    Ok(())
}

/// Instruction lines carry a leading ordinal label (`parts[0]`) that is
/// purely documentation — the real ordinal is the line's position
/// within the instruction section, not the label text.
///
/// The mnemonic itself is never checked against the known opcode set
/// here: an unrecognized mnemonic is stored with no operands (mirroring
/// how a line whose opcode matches none of the known operand-arity
/// groups below falls through with an empty argument list) and is only
/// ever rejected later, as an `UnknownOpcode` fault, if the CPU's
/// fetch/decode step actually reaches it.
fn parse_instruction_line(parts: &[&str]) -> Result<Option<ParsedInstruction>, String> {
    if parts.len() < 2 {
        return Ok(None);
    }
    let mnemonic = parts[1].to_ascii_uppercase();
    let operand_tokens = &parts[2..];

    let args = match mnemonic.as_str() {
        "SET" | "CPY" | "CPYI" | "CPYI2" | "ADD" | "ADDI" | "SUBI" | "JIF" => {
            parse_int_args(operand_tokens, 2)?
        }
        "USER" | "PUSH" | "POP" | "CALL" => parse_int_args(operand_tokens, 1)?,
        "SYSCALL" => {
            if operand_tokens.len() < 2 {
                Vec::new()
            } else {
                vec![
                    Word::from(operand_tokens[0].to_ascii_uppercase().as_str()),
                    operand_tokens[1]
                        .parse::<i64>()
                        .map(Word::Int)
                        .map_err(|_| {
                            format!("expected integer operand, found '{}'", operand_tokens[1])
                        })?,
                ]
            }
        }
        "HLT" | "RET" => Vec::new(),
        _ => Vec::new(),
    };

    Ok(Some(ParsedInstruction { mnemonic, args }))
}

fn parse_int_args(tokens: &[&str], needed: usize) -> Result<Vec<Word>, String> {
    if tokens.len() < needed {
        return Ok(Vec::new());
    }
    tokens[..needed]
        .iter()
        .map(|t| {
            t.parse::<i64>()
                .map(Word::Int)
                .map_err(|_| format!("expected integer operand, found '{t}'"))
        })
        .collect()
}

/// Write a parsed program into memory starting instructions at
/// `instruction_start_addr`, returning the instruction-ordinal → address
/// map the `Cpu` needs for `SET`/`JIF`/`CALL` targets and the two fixed
/// dispatch entries.
pub fn load(
    memory: &mut Memory,
    program: &ParsedProgram,
    instruction_start_addr: i64,
) -> Result<crate::instr_map::InstructionMap, String> {
    for (&addr, value) in &program.data {
        memory
            .write(Mode::Kernel, addr, value.clone())
            .map_err(|e| format!("writing data at {addr}: {e}"))?;
    }

    let mut instruction_map = crate::instr_map::InstructionMap::new();
    let mut addr = instruction_start_addr;
    for (ordinal, instr) in program.instructions.iter().enumerate() {
        let ordinal = ordinal as i64;
        instruction_map.insert(ordinal, addr);
        memory
            .write(Mode::Kernel, addr, Word::from(instr.mnemonic.as_str()))
            .map_err(|e| format!("writing instruction {ordinal}: {e}"))?;
        addr += 1;
        for arg in &instr.args {
            memory
                .write(Mode::Kernel, addr, arg.clone())
                .map_err(|e| format!("writing instruction {ordinal} operand: {e}"))?;
            addr += 1;
        }
    }

    if !program.data.contains_key(&ADDR_PC) {
        memory.raw_write_int(ADDR_PC, instruction_start_addr);
    }

    Ok(instruction_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DEFAULT_MEMORY_SIZE;

    const SAMPLE: &str = "\
Begin Data Section
0 200
21 1
# comment line
End Data Section
Begin Instruction Section
0 SET 5 1500
1 HLT
End Instruction Section
";

    #[test]
    fn parses_data_and_instructions() {
        let program = parse(SAMPLE).unwrap();
        assert_eq!(program.data.get(&0), Some(&Word::Int(200)));
        assert_eq!(program.data.get(&21), Some(&Word::Int(1)));
        assert_eq!(program.instructions.len(), 2);
        assert_eq!(program.instructions[0].mnemonic, "SET");
        assert_eq!(program.instructions[1].mnemonic, "HLT");
    }

    #[test]
    fn unknown_mnemonic_is_stored_verbatim_not_rejected_at_parse_time() {
        let source = "Begin Instruction Section\n0 BOGUS\nEnd Instruction Section\n";
        let program = parse(source).unwrap();
        assert_eq!(program.instructions.len(), 1);
        assert_eq!(program.instructions[0].mnemonic, "BOGUS");
        assert!(program.instructions[0].args.is_empty());
    }

    #[test]
    fn malformed_data_line_is_skipped_and_parsing_continues() {
        let source = "\
Begin Data Section
0 200
not_a_number 5
21 1
End Data Section
Begin Instruction Section
0 HLT
End Instruction Section
";
        let program = parse(source).unwrap();
        assert_eq!(program.data.get(&0), Some(&Word::Int(200)));
        assert_eq!(program.data.get(&21), Some(&Word::Int(1)));
        assert_eq!(program.data.len(), 2);
    }

    #[test]
    fn malformed_instruction_operand_is_skipped_and_parsing_continues() {
        let source = "\
Begin Instruction Section
0 SET not_a_number 1500
1 HLT
End Instruction Section
";
        let program = parse(source).unwrap();
        assert_eq!(program.instructions.len(), 1);
        assert_eq!(program.instructions[0].mnemonic, "HLT");
    }

    #[test]
    fn load_builds_instruction_map_and_seeds_pc() {
        let program = parse(SAMPLE).unwrap();
        let mut memory = Memory::new(DEFAULT_MEMORY_SIZE);
        let map = load(&mut memory, &program, 200).unwrap();
        assert_eq!(map.resolve(0).unwrap(), 200);
        assert_eq!(map.resolve(1).unwrap(), 203);
        // data section explicitly set mem[0] = 200, so PC must come from data.
        assert_eq!(memory.raw_read_int(ADDR_PC), 200);
    }

    #[test]
    fn syscall_instruction_keeps_subtype_as_string() {
        let source = "\
Begin Instruction Section
0 SYSCALL PRN 1500
End Instruction Section
";
        let program = parse(source).unwrap();
        assert_eq!(program.instructions[0].args[0], Word::from("PRN"));
        assert_eq!(program.instructions[0].args[1], Word::Int(1500));
    }
}
