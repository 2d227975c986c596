//! Direct execution of compressed bytecode against a growable tape.

use crate::bytecode::{Bytecode, Instruction};
use crate::diagnostics::Error;
use crate::tape::Tape;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::Wrapping;
use tracing::debug;

#[cfg(test)]
use crate::compress::compress;
#[cfg(test)]
use crate::loader::load_str;
#[cfg(test)]
use pretty_assertions::assert_eq;

/// The value a `,` stores once input is exhausted. This is what C's
/// `getchar` returns at end of file, so generated programs agree.
pub const EOF_VALUE: i32 = -1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// Execution reached the end of the program.
    Halted,
    /// The step budget ran out first.
    OutOfSteps,
}

pub struct Interpreter<'a, R: Read, W: Write> {
    program: &'a Bytecode,
    tape: Tape,
    ip: usize,
    steps: u64,
    input: BufReader<R>,
    output: BufWriter<W>,
}

impl<'a, R: Read, W: Write> Interpreter<'a, R, W> {
    pub fn new(program: &'a Bytecode, input: R, output: W) -> Self {
        Interpreter::with_tape(program, Tape::new(), input, output)
    }

    /// Start execution on an existing tape instead of a fresh one.
    pub fn with_tape(program: &'a Bytecode, tape: Tape, input: R, output: W) -> Self {
        Interpreter {
            program,
            tape,
            ip: 0,
            steps: 0,
            input: BufReader::new(input),
            output: BufWriter::new(output),
        }
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn into_tape(self) -> Tape {
        self.tape
    }

    /// Instructions executed so far, not counting the final `End`.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run until the program ends, fails, or has executed `max_steps`
    /// further instructions. Output is flushed before returning in
    /// every case.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<Status, Error> {
        let budget = max_steps.map(|steps| self.steps.saturating_add(steps));
        let result = self.run_until(budget);
        let flushed = self.output.flush().map_err(Error::OutputUnavailable);

        let status = result?;
        flushed?;
        debug!(
            steps = self.steps,
            cells = self.tape.capacity(),
            status = ?status,
            "execution stopped"
        );
        Ok(status)
    }

    fn run_until(&mut self, budget: Option<u64>) -> Result<Status, Error> {
        loop {
            let instr = self.program[self.ip];
            if instr == Instruction::End {
                return Ok(Status::Halted);
            }
            if let Some(budget) = budget {
                if self.steps >= budget {
                    return Ok(Status::OutOfSteps);
                }
            }
            self.steps += 1;
            self.step(instr)?;
        }
    }

    fn step(&mut self, instr: Instruction) -> Result<(), Error> {
        self.ip += 1;

        match instr {
            Instruction::Increment(amount) => self.tape.add(Wrapping(amount as i32)),
            Instruction::Decrement(amount) => self.tape.sub(Wrapping(amount as i32)),
            Instruction::MoveForward(amount) => self.tape.move_forward(amount),
            Instruction::MoveBackward(amount) => self.tape.move_backward(amount)?,
            Instruction::LoopStart(end) => {
                if self.tape.current().0 == 0 {
                    self.ip = end + 1;
                }
            }
            Instruction::LoopEnd(start) => {
                if self.tape.current().0 != 0 {
                    self.ip = start + 1;
                }
            }
            Instruction::Write => {
                // Only the low byte of the cell is written.
                let byte = self.tape.current().0 as u8;
                self.output
                    .write_all(&[byte])
                    .map_err(Error::OutputUnavailable)?;
            }
            Instruction::Read => {
                // Anything already written may be a prompt for this read.
                self.output.flush().map_err(Error::OutputUnavailable)?;
                let value = match self.read_byte().map_err(Error::InputUnavailable)? {
                    Some(byte) => i32::from(byte),
                    None => EOF_VALUE,
                };
                self.tape.set_current(Wrapping(value));
            }
            Instruction::End => unreachable!("End is handled by the dispatch loop"),
        }

        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run `program` to completion, reading from `input` and writing to
/// `output`. Returns the final tape.
pub fn execute<R: Read, W: Write>(program: &Bytecode, input: R, output: W) -> Result<Tape, Error> {
    let mut interpreter = Interpreter::new(program, input, output);
    interpreter.run(None)?;
    Ok(interpreter.into_tape())
}

#[cfg(test)]
fn run_source(source: &str, input: &[u8]) -> Vec<u8> {
    let program = compress(load_str(source).unwrap());
    let mut output = vec![];
    execute(&program, input, &mut output).unwrap();
    output
}

#[test]
fn multiply_in_a_loop() {
    assert_eq!(run_source("++++[>++++<-]>.", b""), vec![16]);
}

#[test]
fn echo_one_byte() {
    assert_eq!(run_source(",.", &[65]), vec![65]);
}

#[test]
fn loop_on_zero_cell_is_skipped() {
    assert_eq!(run_source("[]", b""), Vec::<u8>::new());
    assert_eq!(run_source("[.+]+.", b""), vec![1]);
}

#[test]
fn hello_world() {
    let source = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
    assert_eq!(run_source(source, b""), b"Hello World!\n".to_vec());
}

#[test]
fn write_truncates_to_low_byte() {
    // 256 + 65 wraps to 'A' in the low byte.
    let source = format!("{}.", "+".repeat(256 + 65));
    assert_eq!(run_source(&source, b""), vec![65]);
    // -1 is written as 0xff.
    assert_eq!(run_source("-.", b""), vec![0xff]);
}

#[test]
fn cells_are_wider_than_a_byte() {
    // 256 is non-zero, so the loop body runs exactly once.
    let source = format!("{}[>+<[-]]>.", "+".repeat(256));
    assert_eq!(run_source(&source, b""), vec![1]);
}

#[test]
fn read_at_end_of_input_stores_minus_one() {
    let program = compress(load_str(",").unwrap());
    let tape = execute(&program, &b""[..], io::sink()).unwrap();
    assert_eq!(tape.get(0), Wrapping(EOF_VALUE));
    // Adding one brings the marker back to zero.
    assert_eq!(run_source(",+[.]>+.", b""), vec![1]);
}

#[test]
fn read_consumes_input_in_order() {
    assert_eq!(run_source(",>,>,<<.>.>.", b"abc"), b"abc".to_vec());
    assert_eq!(run_source(",.,.,.", b"xy"), vec![b'x', b'y', 0xff]);
}

#[test]
fn echo_until_end_of_input_halts() {
    // `,[.,]` never halts here: the -1 stored at end of input is non-zero.
    let program = compress(load_str(",[.,]").unwrap());
    let mut interpreter = Interpreter::new(&program, &b"hi"[..], io::sink());
    assert_eq!(interpreter.run(Some(1000)).unwrap(), Status::OutOfSteps);

    assert_eq!(run_source(",+[-.,+]", b"echo me"), b"echo me".to_vec());
}

#[test]
fn growth_preserves_earlier_cells() {
    let far = ">".repeat(100);
    let back = "<".repeat(100);
    let source = format!("+++++{}+++{}.{}.", far, back, far);
    assert_eq!(run_source(&source, b""), vec![5, 3]);
}

#[test]
fn moving_left_of_cell_zero_fails() {
    let program = compress(load_str("+.<.").unwrap());
    let mut output = vec![];
    let result = execute(&program, &b""[..], &mut output);
    assert!(matches!(
        result,
        Err(Error::TapeUnderflow {
            cursor: 0,
            amount: 1
        })
    ));
    // Output produced before the failure is still delivered.
    assert_eq!(output, vec![1]);
}

#[test]
fn step_budget_stops_infinite_loops() {
    let program = compress(load_str("+[]").unwrap());
    let mut interpreter = Interpreter::new(&program, &b""[..], io::sink());
    assert_eq!(interpreter.run(Some(100)).unwrap(), Status::OutOfSteps);
    assert_eq!(interpreter.steps(), 100);
}

#[test]
fn execution_resumes_after_budget_runs_out() {
    let program = compress(load_str("+>+").unwrap());
    let mut interpreter = Interpreter::new(&program, &b""[..], io::sink());
    assert_eq!(interpreter.run(Some(1)).unwrap(), Status::OutOfSteps);
    assert_eq!(interpreter.tape().cursor(), 0);
    assert_eq!(interpreter.run(Some(5)).unwrap(), Status::Halted);
    assert_eq!(interpreter.tape().current(), Wrapping(1));
    assert_eq!(interpreter.steps(), 3);
}

#[test]
fn write_failure_is_reported() {
    struct Full;

    impl Write for Full {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let program = compress(load_str("+.").unwrap());
    assert!(matches!(
        execute(&program, &b""[..], Full),
        Err(Error::OutputUnavailable(_))
    ));
}
