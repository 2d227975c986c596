#![warn(trivial_numeric_casts)]

//! bfc-bytecode loads BF programs, compresses them into run-length
//! bytecode with resolved jumps, and either interprets that bytecode or
//! generates an equivalent C program for a native compiler.

pub use bytecode::{Bytecode, Instruction};
pub use codegen::generate_c;
pub use compress::{compress, compress_with, CompressionFlags};
pub use diagnostics::{Error, Position, TAPE_UNDERFLOW_STATUS};
pub use execution::{execute, Interpreter, Status, EOF_VALUE};
pub use loader::{load, load_str, Op, RawProgram};
pub use tape::{Cell, Tape};
pub use toolchain::{compile_native, CCompiler, Toolchain};

mod bytecode;
mod codegen;
mod compress;
mod diagnostics;
mod execution;
mod loader;
mod tape;
mod toolchain;

#[cfg(test)]
mod soundness_tests;
