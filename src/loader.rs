//! The loader turns BF source into a flat stream of tagged ops, checking
//! that every `[` has a matching `]` on the way.
//!
//! Only the eight BF symbols are significant. Every other byte is a
//! comment and is dropped without being recorded.

use self::Op::{Decrement, Increment, LoopEnd, LoopStart, MoveBackward, MoveForward};
use crate::diagnostics::{Error, Position};
use std::fmt;
use std::io::{self, BufReader, Read};
use tracing::debug;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A single BF instruction, exactly as written in the source.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Op {
    Increment,
    Decrement,
    Read,
    Write,
    MoveForward,
    MoveBackward,
    LoopStart,
    LoopEnd,
}

impl Op {
    pub fn from_byte(byte: u8) -> Option<Op> {
        match byte {
            b'+' => Some(Increment),
            b'-' => Some(Decrement),
            b',' => Some(Op::Read),
            b'.' => Some(Op::Write),
            b'>' => Some(MoveForward),
            b'<' => Some(MoveBackward),
            b'[' => Some(LoopStart),
            b']' => Some(LoopEnd),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Increment => '+',
            Decrement => '-',
            Op::Read => ',',
            Op::Write => '.',
            MoveForward => '>',
            MoveBackward => '<',
            LoopStart => '[',
            LoopEnd => ']',
        }
    }

    /// Increments, decrements and moves can be merged into runs.
    pub fn is_mergeable(self) -> bool {
        matches!(self, Increment | Decrement | MoveForward | MoveBackward)
    }
}

/// A validated op stream. Brackets are balanced and never close before
/// they open; the end of `ops` terminates the stream.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct RawProgram {
    ops: Vec<Op>,
}

impl RawProgram {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for RawProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for op in &self.ops {
            write!(f, "{}", op.symbol())?;
        }
        Ok(())
    }
}

/// Read BF source from `source` until end of input and return the
/// validated op stream.
///
/// Scanning stops at the first `]` that has no open `[`. A read
/// failure is reported as [`Error::InputUnavailable`].
pub fn load<R: Read>(source: R) -> Result<RawProgram, Error> {
    let mut program = RawProgram::default();
    // Positions of the currently open `[`s, innermost last.
    let mut open_loops = vec![];
    let mut position = Position::start();

    for byte in BufReader::new(source).bytes() {
        let byte = byte.map_err(Error::InputUnavailable)?;

        if let Some(op) = Op::from_byte(byte) {
            match op {
                LoopStart => open_loops.push(position),
                LoopEnd => {
                    if open_loops.pop().is_none() {
                        return Err(Error::LoopCloseBeforeOpen { position });
                    }
                }
                _ => (),
            }
            program.ops.push(op);
        }

        position = position.advance(byte);
    }

    if let Some(&position) = open_loops.last() {
        return Err(Error::UnbalancedLoop { position });
    }

    debug!(
        ops = program.ops.len(),
        bytes = position.offset,
        "loaded program"
    );
    Ok(program)
}

/// Convenience wrapper around [`load`] for in-memory source.
pub fn load_str(source: &str) -> Result<RawProgram, Error> {
    load(io::Cursor::new(source.as_bytes()))
}

#[cfg(test)]
fn ops_of(source: &str) -> Vec<Op> {
    load_str(source).unwrap().ops().to_vec()
}

#[test]
fn load_each_symbol() {
    assert_eq!(
        ops_of("+-,.><[]"),
        vec![
            Increment,
            Decrement,
            Op::Read,
            Op::Write,
            MoveForward,
            MoveBackward,
            LoopStart,
            LoopEnd
        ]
    );
}

#[test]
fn load_ignores_comments() {
    assert_eq!(ops_of("foo! "), Vec::<Op>::new());
    assert_eq!(ops_of("a+b\n+c"), vec![Increment, Increment]);
}

#[test]
fn load_error_positions_count_lines() {
    match load_str("x+\n >]") {
        Err(Error::LoopCloseBeforeOpen { position }) => assert_eq!(
            position,
            Position {
                offset: 5,
                line: 2,
                column: 3
            }
        ),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn load_nested_loops() {
    assert_eq!(
        ops_of("[[]]"),
        vec![LoopStart, LoopStart, LoopEnd, LoopEnd]
    );
}

#[test]
fn load_close_before_open() {
    match load_str("+]") {
        Err(Error::LoopCloseBeforeOpen { position }) => assert_eq!(position.offset, 1),
        other => panic!("unexpected result: {:?}", other),
    }
    // The balance goes negative before the final `[` could rebalance it.
    assert!(matches!(
        load_str("]["),
        Err(Error::LoopCloseBeforeOpen { .. })
    ));
}

#[test]
fn load_unbalanced_loop() {
    match load_str("[[]") {
        Err(Error::UnbalancedLoop { position }) => assert_eq!(position.offset, 0),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(matches!(load_str("[]["), Err(Error::UnbalancedLoop { .. })));
}

#[test]
fn load_reports_innermost_unclosed_loop() {
    match load_str("[ [") {
        Err(Error::UnbalancedLoop { position }) => assert_eq!(position.offset, 2),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn load_read_failure() {
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    assert!(matches!(load(Broken), Err(Error::InputUnavailable(_))));
}

#[test]
fn display_round_trips_significant_symbols() {
    let program = load_str("hello [->+<] world.").unwrap();
    assert_eq!(program.to_string(), "[->+<].");
}

#[test]
fn lone_brackets_are_rejected() {
    assert!(matches!(
        load_str("]"),
        Err(Error::LoopCloseBeforeOpen { .. })
    ));
    assert!(matches!(load_str("["), Err(Error::UnbalancedLoop { .. })));
}

#[test]
fn load_stops_at_first_unmatched_close() {
    // Yields a lone `]`, then fails on any further read.
    struct CloseThenBroken {
        sent: bool,
    }

    impl Read for CloseThenBroken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::Other, "read past the bad ]"));
            }
            self.sent = true;
            buf[0] = b']';
            Ok(1)
        }
    }

    assert!(matches!(
        load(CloseThenBroken { sent: false }),
        Err(Error::LoopCloseBeforeOpen { .. })
    ));
}
