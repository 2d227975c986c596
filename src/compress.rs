//! Compression from the raw op stream to bytecode: runs of identical
//! increments, decrements and moves are merged, and brackets are
//! resolved into direct jump targets.

use crate::bytecode::{Bytecode, Instruction};
use crate::loader::{Op, RawProgram};
use bitflags::bitflags;
use tracing::debug;

#[cfg(test)]
use crate::loader::load_str;
#[cfg(test)]
use pretty_assertions::assert_eq;

bitflags! {
    pub struct CompressionFlags: u32 {
        /// Merge runs of identical ops into one counted instruction.
        const MERGE_RUNS = 0b0000_0001;
        /// Match brackets with an explicit stack instead of scanning the
        /// output backwards from each `]`.
        const STACK_JUMPS = 0b0000_0010;
    }
}

impl Default for CompressionFlags {
    fn default() -> Self {
        CompressionFlags::MERGE_RUNS
    }
}

/// Placeholder target for a `[` whose `]` hasn't been seen yet.
const UNRESOLVED: usize = usize::MAX;

/// Compress `program` with the default flags.
pub fn compress(program: RawProgram) -> Bytecode {
    compress_with(program, CompressionFlags::default())
}

pub fn compress_with(program: RawProgram, flags: CompressionFlags) -> Bytecode {
    let merge = flags.contains(CompressionFlags::MERGE_RUNS);
    let ops = program.ops();

    let len = compressed_len(ops, merge);
    let mut instructions = Vec::with_capacity(len);

    // The kind of run currently being accumulated, if any.
    let mut merging: Option<Op> = None;
    // Open `[` indices, only used with STACK_JUMPS.
    let mut open_loops = vec![];

    for &op in ops {
        match op {
            Op::Increment | Op::Decrement | Op::MoveForward | Op::MoveBackward => {
                if merge && merging == Some(op) {
                    if let Some(last) = instructions.last_mut() {
                        extend_run(last);
                        continue;
                    }
                }
                instructions.push(start_run(op));
                merging = Some(op);
            }
            Op::Read => {
                merging = None;
                instructions.push(Instruction::Read);
            }
            Op::Write => {
                merging = None;
                instructions.push(Instruction::Write);
            }
            Op::LoopStart => {
                merging = None;
                open_loops.push(instructions.len());
                instructions.push(Instruction::LoopStart(UNRESOLVED));
            }
            Op::LoopEnd => {
                merging = None;
                let end = instructions.len();
                instructions.push(Instruction::LoopEnd(UNRESOLVED));

                let start = if flags.contains(CompressionFlags::STACK_JUMPS) {
                    match open_loops.pop() {
                        Some(start) => start,
                        None => unreachable!("] without [ in a loaded program"),
                    }
                } else {
                    find_loop_start(&instructions, end)
                };

                instructions[start] = Instruction::LoopStart(end);
                instructions[end] = Instruction::LoopEnd(start);
            }
        }
    }
    instructions.push(Instruction::End);

    debug_assert_eq!(instructions.len(), len);
    debug!(
        ops = ops.len(),
        instructions = instructions.len(),
        "compressed program"
    );

    Bytecode::from_instructions(instructions)
}

/// The exact number of instructions `compress_with` will produce,
/// including the final `End`.
fn compressed_len(ops: &[Op], merge: bool) -> usize {
    let mut len = 1;
    let mut previous = None;
    for &op in ops {
        if !(merge && op.is_mergeable() && previous == Some(op)) {
            len += 1;
        }
        previous = Some(op);
    }
    len
}

fn start_run(op: Op) -> Instruction {
    match op {
        Op::Increment => Instruction::Increment(1),
        Op::Decrement => Instruction::Decrement(1),
        Op::MoveForward => Instruction::MoveForward(1),
        Op::MoveBackward => Instruction::MoveBackward(1),
        _ => unreachable!("{:?} does not start a run", op),
    }
}

fn extend_run(instr: &mut Instruction) {
    match instr {
        // Cell arithmetic wraps, so a wrapped count is still exact.
        Instruction::Increment(n) | Instruction::Decrement(n) => *n = n.wrapping_add(1),
        Instruction::MoveForward(n) | Instruction::MoveBackward(n) => *n += 1,
        _ => unreachable!("{:?} is not a run", instr),
    }
}

/// Walk backwards from the `]` at `end` to the `[` that opens it,
/// stepping over any nested loops in between.
fn find_loop_start(instructions: &[Instruction], end: usize) -> usize {
    let mut depth = 0usize;
    for index in (0..end).rev() {
        match instructions[index] {
            Instruction::LoopEnd(_) => depth += 1,
            Instruction::LoopStart(_) if depth == 0 => return index,
            Instruction::LoopStart(_) => depth -= 1,
            _ => (),
        }
    }
    unreachable!("] at {} without [ in a loaded program", end)
}

#[cfg(test)]
fn compress_source(source: &str) -> Vec<Instruction> {
    compress(load_str(source).unwrap()).instructions().to_vec()
}

#[test]
fn merge_increments() {
    assert_eq!(
        compress_source("+++"),
        vec![Instruction::Increment(3), Instruction::End]
    );
}

#[test]
fn merge_each_run_kind() {
    assert_eq!(
        compress_source("++-->>><"),
        vec![
            Instruction::Increment(2),
            Instruction::Decrement(2),
            Instruction::MoveForward(3),
            Instruction::MoveBackward(1),
            Instruction::End
        ]
    );
}

#[test]
fn opposite_ops_are_not_cancelled() {
    assert_eq!(
        compress_source("+-+"),
        vec![
            Instruction::Increment(1),
            Instruction::Decrement(1),
            Instruction::Increment(1),
            Instruction::End
        ]
    );
}

#[test]
fn io_breaks_runs() {
    assert_eq!(
        compress_source("+.+,,"),
        vec![
            Instruction::Increment(1),
            Instruction::Write,
            Instruction::Increment(1),
            Instruction::Read,
            Instruction::Read,
            Instruction::End
        ]
    );
}

#[test]
fn brackets_break_runs() {
    assert_eq!(
        compress_source("+[+]+"),
        vec![
            Instruction::Increment(1),
            Instruction::LoopStart(3),
            Instruction::Increment(1),
            Instruction::LoopEnd(1),
            Instruction::Increment(1),
            Instruction::End
        ]
    );
}

#[test]
fn resolve_simple_loop() {
    assert_eq!(
        compress_source("++++[>++++<-]>."),
        vec![
            Instruction::Increment(4),
            Instruction::LoopStart(6),
            Instruction::MoveForward(1),
            Instruction::Increment(4),
            Instruction::MoveBackward(1),
            Instruction::Decrement(1),
            Instruction::LoopEnd(1),
            Instruction::MoveForward(1),
            Instruction::Write,
            Instruction::End
        ]
    );
}

#[test]
fn resolve_nested_loops() {
    assert_eq!(
        compress_source("[[]]"),
        vec![
            Instruction::LoopStart(3),
            Instruction::LoopStart(2),
            Instruction::LoopEnd(1),
            Instruction::LoopEnd(0),
            Instruction::End
        ]
    );
}

#[test]
fn resolve_sibling_loops() {
    assert_eq!(
        compress_source("[][-]"),
        vec![
            Instruction::LoopStart(1),
            Instruction::LoopEnd(0),
            Instruction::LoopStart(4),
            Instruction::Decrement(1),
            Instruction::LoopEnd(2),
            Instruction::End
        ]
    );
}

#[test]
fn empty_program_is_just_end() {
    assert_eq!(compress_source("no code here"), vec![Instruction::End]);
}

#[test]
fn without_merging_every_op_is_its_own_instruction() {
    let bytecode = compress_with(load_str("++>>").unwrap(), CompressionFlags::empty());
    assert_eq!(
        bytecode.instructions(),
        &[
            Instruction::Increment(1),
            Instruction::Increment(1),
            Instruction::MoveForward(1),
            Instruction::MoveForward(1),
            Instruction::End
        ]
    );
}

#[test]
fn stack_and_scan_resolution_agree() {
    let source = "+[>[-]<[->+<[+]]]>[.]";
    let scanned = compress(load_str(source).unwrap());
    let stacked = compress_with(
        load_str(source).unwrap(),
        CompressionFlags::MERGE_RUNS | CompressionFlags::STACK_JUMPS,
    );
    assert_eq!(scanned, stacked);
    assert!(scanned.jumps_are_consistent());
}

#[test]
fn packed_size_matches_cell_layout() {
    // Eight counted or bracket instructions, one write, one sentinel.
    let bytecode = compress(load_str("++++[>++++<-]>.").unwrap());
    assert_eq!(bytecode.encoded_len(), 8 * 2 + 1 + 1);
}

#[test]
fn presized_length_is_exact() {
    for source in &["", "+", "++[--]..", "[[>]<]", ">>,<<,"] {
        for &merge in &[true, false] {
            let program = load_str(source).unwrap();
            let len = compressed_len(program.ops(), merge);
            let flags = if merge {
                CompressionFlags::MERGE_RUNS
            } else {
                CompressionFlags::empty()
            };
            assert_eq!(compress_with(program, flags).len(), len);
        }
    }
}
