//! The compact executable form of a BF program, shared by the
//! interpreter and the C generator.

use itertools::Itertools;
use std::fmt;
use std::ops::Index;

#[cfg(test)]
use self::Instruction::*;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// One bytecode instruction.
///
/// Run-length instructions carry how many source ops they replace.
/// Brackets carry the index of their partner; execution resumes one
/// past that index when the jump is taken.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Instruction {
    Increment(u32),
    Decrement(u32),
    MoveForward(usize),
    MoveBackward(usize),
    LoopStart(usize),
    LoopEnd(usize),
    Read,
    Write,
    /// Marks the end of the stream. Always the last instruction.
    End,
}

impl Instruction {
    /// Cells this instruction occupies in the packed tag/operand layout:
    /// tag plus operand, or a lone tag.
    pub fn encoded_len(self) -> usize {
        match self {
            Instruction::Read | Instruction::Write | Instruction::End => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Increment(n) => write!(f, "inc {}", n),
            Instruction::Decrement(n) => write!(f, "dec {}", n),
            Instruction::MoveForward(n) => write!(f, "next {}", n),
            Instruction::MoveBackward(n) => write!(f, "prev {}", n),
            Instruction::LoopStart(target) => write!(f, "loop -> {}", target),
            Instruction::LoopEnd(target) => write!(f, "end -> {}", target),
            Instruction::Read => write!(f, "get"),
            Instruction::Write => write!(f, "put"),
            Instruction::End => write!(f, "halt"),
        }
    }
}

/// A compressed instruction stream terminated by [`Instruction::End`].
///
/// Only the compressor builds these, so bracket targets are always
/// resolved and mutually consistent.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Bytecode {
    instructions: Vec<Instruction>,
}

impl Bytecode {
    pub(crate) fn from_instructions(instructions: Vec<Instruction>) -> Self {
        debug_assert_eq!(instructions.last(), Some(&Instruction::End));
        Bytecode { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions, including the terminating `End`.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True when the program has no instructions besides `End`.
    pub fn is_empty(&self) -> bool {
        self.instructions.len() == 1
    }

    /// Size of this program in the packed tag/operand cell layout.
    pub fn encoded_len(&self) -> usize {
        self.instructions
            .iter()
            .map(|instr| instr.encoded_len())
            .sum()
    }

    /// Check that every bracket points at its partner, and that starts
    /// point forward and ends point backward.
    pub fn jumps_are_consistent(&self) -> bool {
        self.instructions
            .iter()
            .enumerate()
            .all(|(index, instr)| match *instr {
                Instruction::LoopStart(target) => {
                    target > index
                        && self.instructions.get(target) == Some(&Instruction::LoopEnd(index))
                }
                Instruction::LoopEnd(target) => {
                    target < index
                        && self.instructions.get(target) == Some(&Instruction::LoopStart(index))
                }
                _ => true,
            })
    }
}

impl Index<usize> for Bytecode {
    type Output = Instruction;

    fn index(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }
}

/// One instruction per line, prefixed by its index and indented by
/// loop depth.
impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depth = 0usize;
        let lines = self.instructions.iter().enumerate().map(|(index, instr)| {
            if let Instruction::LoopEnd(_) = instr {
                depth -= 1;
            }
            let line = format!("{:>4}  {}{}", index, "  ".repeat(depth), instr);
            if let Instruction::LoopStart(_) = instr {
                depth += 1;
            }
            line
        });
        write!(f, "{}", lines.format("\n"))
    }
}

#[test]
fn encoded_len_counts_operands() {
    let bytecode = Bytecode::from_instructions(vec![
        Increment(3),
        LoopStart(4),
        Write,
        Read,
        LoopEnd(1),
        End,
    ]);
    assert_eq!(bytecode.encoded_len(), 2 + 2 + 1 + 1 + 2 + 1);
}

#[test]
fn consistent_jumps() {
    let bytecode = Bytecode::from_instructions(vec![LoopStart(1), LoopEnd(0), End]);
    assert!(bytecode.jumps_are_consistent());

    let crossed = Bytecode::from_instructions(vec![
        LoopStart(3),
        LoopStart(2),
        LoopEnd(0),
        LoopEnd(1),
        End,
    ]);
    assert!(!crossed.jumps_are_consistent());
}

#[test]
fn listing_indents_loop_bodies() {
    let bytecode =
        Bytecode::from_instructions(vec![Increment(2), LoopStart(3), Decrement(1), LoopEnd(1), End]);
    assert_eq!(
        bytecode.to_string(),
        "   0  inc 2\n   1  loop -> 3\n   2    dec 1\n   3  end -> 1\n   4  halt"
    );
}
