//! Property tests: compression and tape growth must never change what a
//! program does, and loading must reject exactly the malformed sources.

use crate::bytecode::Bytecode;
use crate::codegen::generate_c;
use crate::compress::{compress, compress_with, CompressionFlags};
use crate::diagnostics::Error;
use crate::execution::{Interpreter, Status};
use crate::loader::load_str;
use crate::tape::Tape;
use crate::toolchain::{CCompiler, Toolchain};
use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

const MAX_STEPS: u64 = 10_000;

/// BF source with balanced brackets.
#[derive(Debug, Clone)]
struct BalancedSource(String);

impl Arbitrary for BalancedSource {
    fn arbitrary<G: Gen>(g: &mut G) -> BalancedSource {
        let mut source = String::new();
        let len = g.size();
        arbitrary_body(g, &mut source, len, 3);
        BalancedSource(source)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = BalancedSource>> {
        // Drop one whole op or loop at a time, keeping brackets balanced.
        let source = self.0.clone();
        let candidates: Vec<BalancedSource> = (0..source.len())
            .filter_map(|start| {
                let end = match source.as_bytes()[start] {
                    b']' => return None,
                    b'[' => matching_close(&source, start)? + 1,
                    _ => start + 1,
                };
                let mut shrunk = source.clone();
                shrunk.replace_range(start..end, "");
                Some(BalancedSource(shrunk))
            })
            .collect();
        Box::new(candidates.into_iter())
    }
}

fn arbitrary_body<G: Gen>(g: &mut G, source: &mut String, len: usize, max_depth: usize) {
    for _ in 0..len {
        let modulus = if max_depth == 0 { 8 } else { 9 };
        match g.next_u32() % modulus {
            // Weight increments and moves so runs actually form.
            0 | 1 => source.push('+'),
            2 => source.push('-'),
            3 | 4 => source.push('>'),
            5 => source.push('<'),
            6 => source.push('.'),
            7 => source.push(','),
            _ => {
                source.push('[');
                let inner = (g.next_u32() % 6) as usize;
                arbitrary_body(g, source, inner, max_depth - 1);
                source.push(']');
            }
        }
    }
}

fn matching_close(source: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (index, byte) in source.bytes().enumerate().skip(open) {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => (),
        }
    }
    None
}

/// What a run was observed to do, comparable across representations.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Halted(Vec<u8>),
    Underflow(Vec<u8>),
    OutOfSteps,
}

fn observe(program: &Bytecode, tape: Tape, input: &[u8]) -> Outcome {
    let mut output = vec![];
    let result = {
        let mut interpreter = Interpreter::with_tape(program, tape, input, &mut output);
        interpreter.run(Some(MAX_STEPS))
    };
    match result {
        Ok(Status::Halted) => Outcome::Halted(output),
        Ok(Status::OutOfSteps) => Outcome::OutOfSteps,
        Err(Error::TapeUnderflow { .. }) => Outcome::Underflow(output),
        Err(e) => panic!("unexpected error: {}", e),
    }
}

#[test]
fn close_before_open_iff_balance_hits_zero() {
    fn check(symbols: Vec<bool>) -> bool {
        let source: String = symbols
            .iter()
            .map(|&open| if open { '[' } else { ']' })
            .collect();

        let mut balance = 0i64;
        let mut early_close = false;
        for &open in &symbols {
            if open {
                balance += 1;
            } else if balance == 0 {
                early_close = true;
                break;
            } else {
                balance -= 1;
            }
        }

        match load_str(&source) {
            Err(Error::LoopCloseBeforeOpen { .. }) => early_close,
            Err(Error::UnbalancedLoop { .. }) => !early_close && balance != 0,
            Ok(_) => !early_close && balance == 0,
            Err(_) => false,
        }
    }
    quickcheck(check as fn(Vec<bool>) -> bool);
}

#[test]
fn balanced_sources_always_load() {
    fn check(source: BalancedSource) -> bool {
        load_str(&source.0).is_ok()
    }
    quickcheck(check as fn(BalancedSource) -> bool);
}

#[test]
fn jumps_are_always_consistent() {
    fn check(source: BalancedSource) -> bool {
        compress(load_str(&source.0).unwrap()).jumps_are_consistent()
    }
    quickcheck(check as fn(BalancedSource) -> bool);
}

#[test]
fn compression_is_deterministic() {
    fn check(source: BalancedSource) -> bool {
        compress(load_str(&source.0).unwrap()) == compress(load_str(&source.0).unwrap())
    }
    quickcheck(check as fn(BalancedSource) -> bool);
}

#[test]
fn scan_and_stack_resolution_agree() {
    fn check(source: BalancedSource) -> bool {
        let raw = load_str(&source.0).unwrap();
        let stacked = compress_with(
            raw.clone(),
            CompressionFlags::MERGE_RUNS | CompressionFlags::STACK_JUMPS,
        );
        compress(raw) == stacked
    }
    quickcheck(check as fn(BalancedSource) -> bool);
}

#[test]
fn merging_never_grows_the_program() {
    fn check(source: BalancedSource) -> bool {
        let raw = load_str(&source.0).unwrap();
        let unmerged = compress_with(raw.clone(), CompressionFlags::empty());
        let merged = compress(raw.clone());
        unmerged.len() == raw.len() + 1 && merged.len() <= unmerged.len()
    }
    quickcheck(check as fn(BalancedSource) -> bool);
}

#[test]
fn compression_is_transparent() {
    fn check(source: BalancedSource, input: Vec<u8>) -> TestResult {
        let raw = load_str(&source.0).unwrap();
        let unmerged = compress_with(raw.clone(), CompressionFlags::empty());
        let merged = compress(raw);

        // The merged program takes at most as many steps as the op-by-op
        // one, so anything that halts unmerged halts merged too.
        let expected = observe(&unmerged, Tape::new(), &input);
        if expected == Outcome::OutOfSteps {
            return TestResult::discard();
        }
        TestResult::from_bool(observe(&merged, Tape::new(), &input) == expected)
    }
    quickcheck(check as fn(BalancedSource, Vec<u8>) -> TestResult);
}

#[test]
fn tape_growth_is_transparent() {
    fn check(source: BalancedSource, input: Vec<u8>, capacity: u8) -> TestResult {
        let program = compress(load_str(&source.0).unwrap());
        let small = observe(&program, Tape::new(), &input);
        if small == Outcome::OutOfSteps {
            return TestResult::discard();
        }
        let large = observe(&program, Tape::with_capacity(usize::from(capacity)), &input);
        TestResult::from_bool(small == large)
    }
    quickcheck(check as fn(BalancedSource, Vec<u8>, u8) -> TestResult);
}

#[test]
fn shrinking_keeps_brackets_balanced() {
    let source = BalancedSource("+[->[.]<]>".to_owned());
    for shrunk in source.shrink() {
        assert!(load_str(&shrunk.0).is_ok(), "{:?}", shrunk);
    }
}

/// The C compiler to test native generation with, if the host has one.
fn host_compiler() -> Option<CCompiler> {
    let program = env::var("CC").unwrap_or_else(|_| "cc".to_owned());
    let available = Command::new(&program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if available {
        Some(CCompiler::new(program))
    } else {
        None
    }
}

#[test]
fn native_programs_match_the_interpreter() {
    let compiler = match host_compiler() {
        Some(compiler) => compiler,
        None => return,
    };

    let cases: &[(&str, &[u8])] = &[
        ("++++[>++++<-]>.", &b""[..]),
        (",.", &b"A"[..]),
        ("[]", &b""[..]),
        (",+[-.,+]", &b"echo me"[..]),
        (",.,.,.", &b"x"[..]),
        ("-.+.", &b""[..]),
        (
            "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.",
            &b""[..],
        ),
        (
            "+++++>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>+++<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<.>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>>.",
            &b""[..],
        ),
    ];

    let dir = env::temp_dir();
    for (index, (source, input)) in cases.iter().enumerate() {
        let program = compress(load_str(source).unwrap());

        let mut expected = vec![];
        let status = Interpreter::new(&program, *input, &mut expected)
            .run(Some(MAX_STEPS))
            .unwrap();
        assert_eq!(status, Status::Halted, "{} must halt", source);

        let artifact = dir.join(format!("bfc-bytecode-test-{}-{}", std::process::id(), index));
        compiler.compile(&generate_c(&program), &artifact).unwrap();

        let mut child = Command::new(&artifact)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child.stdin.take().unwrap().write_all(input).unwrap();
        let output = child.wait_with_output().unwrap();
        let _ = std::fs::remove_file(&artifact);

        assert!(output.status.success(), "{} exited with {}", source, output.status);
        assert_eq!(output.stdout, expected, "output of {}", source);
    }
}

#[test]
fn native_underflow_matches_the_interpreter() {
    let compiler = match host_compiler() {
        Some(compiler) => compiler,
        None => return,
    };

    let program = compress(load_str("+.<.").unwrap());
    let artifact = env::temp_dir().join(format!("bfc-bytecode-underflow-{}", std::process::id()));
    compiler.compile(&generate_c(&program), &artifact).unwrap();

    let output = Command::new(&artifact)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    let _ = std::fs::remove_file(&artifact);

    assert_eq!(output.status.code(), Some(crate::TAPE_UNDERFLOW_STATUS));
    assert_eq!(output.stdout, vec![1]);
}
