//! Handing generated C to an external compiler.

use crate::bytecode::Bytecode;
use crate::codegen::generate_c;
use crate::diagnostics::Error;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[cfg(test)]
use crate::compress::compress;
#[cfg(test)]
use crate::loader::load_str;
#[cfg(test)]
use pretty_assertions::assert_eq;
#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::path::PathBuf;

/// Anything that can turn C source into an executable at `artifact`.
pub trait Toolchain {
    fn compile(&self, source: &str, artifact: &Path) -> Result<(), Error>;
}

/// A gcc-compatible compiler driver, fed the source on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CCompiler {
    program: String,
}

impl CCompiler {
    /// Optimise, read C from stdin. The standard library is linked by
    /// default.
    pub const FLAGS: &'static [&'static str] = &["-O3", "-xc", "-"];

    pub fn new<S: Into<String>>(program: S) -> Self {
        CCompiler {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, artifact: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(Self::FLAGS).arg("-o").arg(artifact);
        command
    }

    fn unavailable<D: ToString>(&self, reason: D) -> Error {
        Error::CompilerUnavailable {
            compiler: self.program.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Toolchain for CCompiler {
    fn compile(&self, source: &str, artifact: &Path) -> Result<(), Error> {
        debug!(compiler = %self.program, artifact = %artifact.display(), "invoking C compiler");

        let mut child = self
            .command(artifact)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        // A compiler that exits early breaks the pipe; its status and
        // stderr say more than the write error does.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(source.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output().map_err(|e| self.unavailable(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().next().unwrap_or("no diagnostics");
            return Err(self.unavailable(format!("{}: {}", output.status, first_line)));
        }
        written.map_err(|e| self.unavailable(e))?;

        info!(artifact = %artifact.display(), "compiled native executable");
        Ok(())
    }
}

/// Generate C for `program` and build it into `artifact` with
/// `toolchain`.
pub fn compile_native(
    program: &Bytecode,
    toolchain: &dyn Toolchain,
    artifact: &Path,
) -> Result<(), Error> {
    let source = generate_c(program);
    toolchain.compile(&source, artifact)
}

#[cfg(test)]
struct Recording {
    calls: RefCell<Vec<(String, PathBuf)>>,
}

#[cfg(test)]
impl Toolchain for Recording {
    fn compile(&self, source: &str, artifact: &Path) -> Result<(), Error> {
        self.calls
            .borrow_mut()
            .push((source.to_owned(), artifact.to_owned()));
        Ok(())
    }
}

#[test]
fn compile_native_hands_generated_source_to_toolchain() {
    let program = compress(load_str("+.").unwrap());
    let toolchain = Recording {
        calls: RefCell::new(vec![]),
    };
    compile_native(&program, &toolchain, Path::new("out/prog")).unwrap();

    let calls = toolchain.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, generate_c(&program));
    assert_eq!(calls[0].1, PathBuf::from("out/prog"));
}

#[test]
fn fixed_flags_and_artifact_path() {
    let command = CCompiler::new("gcc").command(Path::new("a.out"));
    let args: Vec<_> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, vec!["-O3", "-xc", "-", "-o", "a.out"]);
}

#[test]
fn missing_compiler_is_one_error() {
    let compiler = CCompiler::new("bfc-bytecode-no-such-compiler");
    match compiler.compile("int main(void) { return 0; }", Path::new("never")) {
        Err(Error::CompilerUnavailable { compiler, .. }) => {
            assert_eq!(compiler, "bfc-bytecode-no-such-compiler");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn compiler_exiting_early_reports_its_status() {
    // `false` exits without reading stdin. The source is larger than a
    // pipe buffer, so the write fails too.
    let source = "x".repeat(1 << 20);
    match CCompiler::new("false").compile(&source, Path::new("never")) {
        Err(Error::CompilerUnavailable { compiler, reason }) => {
            assert_eq!(compiler, "false");
            assert!(reason.starts_with("exit status"), "reason: {}", reason);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
