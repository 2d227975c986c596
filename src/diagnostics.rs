//! Human-readable errors for the CLI, and the exit status each one maps to.

use colored::Colorize;
use std::error;
use std::fmt;
use std::io;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// A location in program source. `offset` is the zero-based byte
/// offset, `line` and `column` are one-based.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Position {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// The position of the byte following `byte`, which sits at `self`.
    pub fn advance(self, byte: u8) -> Self {
        if byte == b'\n' {
            Position {
                offset: self.offset + 1,
                line: self.line + 1,
                column: 1,
            }
        } else {
            Position {
                offset: self.offset + 1,
                line: self.line,
                column: self.column + 1,
            }
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} (byte {})", self.line, self.column, self.offset)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Exit status used by the generated C program when its cursor runs
/// below the first cell. Shared with [`Error::TapeUnderflow`].
pub const TAPE_UNDERFLOW_STATUS: i32 = 12;

/// Every way a run can fail. All of them are terminal.
#[derive(Debug)]
pub enum Error {
    /// A `]` was seen while no `[` was open.
    LoopCloseBeforeOpen { position: Position },
    /// The source ended with at least one `[` still open. `position` is
    /// the innermost unclosed `[`.
    UnbalancedLoop { position: Position },
    /// A `<` run would have moved the cursor below cell zero.
    TapeUnderflow { cursor: usize, amount: usize },
    InputUnavailable(io::Error),
    OutputUnavailable(io::Error),
    CompilerUnavailable { compiler: String, reason: String },
}

impl Error {
    /// The process exit status for this error. Stable across releases.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LoopCloseBeforeOpen { .. } => 10,
            Error::UnbalancedLoop { .. } => 11,
            Error::TapeUnderflow { .. } => TAPE_UNDERFLOW_STATUS,
            // sysexits.h
            Error::InputUnavailable(_) => 66,
            Error::CompilerUnavailable { .. } => 69,
            Error::OutputUnavailable(_) => 73,
        }
    }

    /// One line suitable for stderr, with a colored severity prefix.
    pub fn render(&self) -> String {
        format!("{} {}", "error:".red().bold(), self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LoopCloseBeforeOpen { position } => {
                write!(f, "{}: this ] has no matching [", position)
            }
            Error::UnbalancedLoop { position } => {
                write!(f, "{}: this [ has no matching ]", position)
            }
            Error::TapeUnderflow { cursor, amount } => write!(
                f,
                "cannot move {} cells left from cell {}: the tape starts at cell 0",
                amount, cursor
            ),
            Error::InputUnavailable(e) => write!(f, "could not read input: {}", e),
            Error::OutputUnavailable(e) => write!(f, "could not write output: {}", e),
            Error::CompilerUnavailable { compiler, reason } => {
                write!(f, "could not compile with `{}`: {}", compiler, reason)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::InputUnavailable(e) | Error::OutputUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

#[test]
fn advance_tracks_lines() {
    let pos = b"a\nb".iter().fold(Position::start(), |p, &b| p.advance(b));
    assert_eq!(
        pos,
        Position {
            offset: 3,
            line: 2,
            column: 2
        }
    );
}

#[test]
fn exit_codes_are_distinct() {
    let errors = vec![
        Error::LoopCloseBeforeOpen {
            position: Position::start(),
        },
        Error::UnbalancedLoop {
            position: Position::start(),
        },
        Error::TapeUnderflow {
            cursor: 0,
            amount: 1,
        },
        Error::InputUnavailable(io::Error::new(io::ErrorKind::NotFound, "x")),
        Error::OutputUnavailable(io::Error::new(io::ErrorKind::NotFound, "x")),
        Error::CompilerUnavailable {
            compiler: "cc".to_owned(),
            reason: "x".to_owned(),
        },
    ];
    let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}

#[test]
fn message_is_one_line() {
    let err = Error::UnbalancedLoop {
        position: Position {
            offset: 4,
            line: 2,
            column: 3,
        },
    };
    assert_eq!(err.to_string(), "2:3: this [ has no matching ]");
    assert!(!err.render().contains('\n'));
}
