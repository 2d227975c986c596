//! C code generation from bytecode.
//!
//! The generated program keeps the interpreter's tape semantics: an
//! `int` tape that starts with one cell and doubles on demand, `-1`
//! stored on end of input, the low byte written by `putchar`, and the
//! same exit status when the cursor would leave the tape on the left.

use crate::bytecode::{Bytecode, Instruction};
use crate::diagnostics::TAPE_UNDERFLOW_STATUS;
use std::fmt::Display;
use tracing::debug;

#[cfg(test)]
use crate::compress::compress;
#[cfg(test)]
use crate::loader::load_str;
#[cfg(test)]
use pretty_assertions::assert_eq;

const PRELUDE: &str = "\
#include <stdio.h>
#include <stdlib.h>

static int *memory;
static size_t memsize = 1, memptr = 0;

static int *alloc_cells(size_t count) {
    int *cells = calloc(count, sizeof(int));
    if (cells == NULL) {
        perror(\"calloc\");
        exit(EXIT_FAILURE);
    }
    return cells;
}

static void memfix(void) {
    if (memptr < memsize) return;
    size_t oldsize = memsize;
    while (memptr >= memsize) {
        memsize *= 2;
    }
    int *newmem = alloc_cells(memsize);
    for (size_t i = 0; i < oldsize; i++) {
        newmem[i] = memory[i];
    }
    free(memory);
    memory = newmem;
}
";

struct Emitter {
    out: String,
    depth: usize,
}

impl Emitter {
    fn line<T: Display>(&mut self, text: T) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(&text.to_string());
        self.out.push('\n');
    }
}

/// Translate `program` into a standalone C99 program.
pub fn generate_c(program: &Bytecode) -> String {
    let mut emitter = Emitter {
        out: String::from(PRELUDE),
        depth: 0,
    };

    emitter.line("");
    emitter.line("static void memback(size_t amount) {");
    emitter.line("    if (amount > memptr) {");
    emitter.line("        fflush(stdout);");
    emitter.line(
        "        fprintf(stderr, \"error: cannot move %zu cells left from cell %zu: \
         the tape starts at cell 0\\n\", amount, memptr);",
    );
    emitter.line(format!("        exit({});", TAPE_UNDERFLOW_STATUS));
    emitter.line("    }");
    emitter.line("    memptr -= amount;");
    emitter.line("}");
    emitter.line("");
    emitter.line("int main(void) {");
    emitter.depth += 1;
    emitter.line("memory = alloc_cells(memsize);");

    for instr in program.instructions() {
        // Counts are emitted unsigned so the arithmetic wraps without
        // undefined behaviour.
        match *instr {
            Instruction::Increment(amount) => {
                emitter.line(format!("memory[memptr] += {}u;", amount));
            }
            Instruction::Decrement(amount) => {
                emitter.line(format!("memory[memptr] -= {}u;", amount));
            }
            Instruction::MoveForward(amount) => {
                emitter.line(format!("memptr += {};", amount));
                emitter.line("memfix();");
            }
            Instruction::MoveBackward(amount) => {
                emitter.line(format!("memback({});", amount));
            }
            Instruction::Read => {
                emitter.line("fflush(stdout);");
                emitter.line("memory[memptr] = getchar();");
            }
            Instruction::Write => {
                emitter.line("putchar(memory[memptr]);");
            }
            Instruction::LoopStart(_) => {
                emitter.line("while (memory[memptr] != 0) {");
                emitter.depth += 1;
            }
            Instruction::LoopEnd(_) => {
                emitter.depth -= 1;
                emitter.line("}");
            }
            Instruction::End => break,
        }
    }

    emitter.line("free(memory);");
    emitter.line("return 0;");
    emitter.depth -= 1;
    emitter.line("}");

    debug!(
        instructions = program.len(),
        bytes = emitter.out.len(),
        "generated C source"
    );
    emitter.out
}

#[cfg(test)]
fn main_body(source: &str) -> Vec<String> {
    let c = generate_c(&compress(load_str(source).unwrap()));
    let start = c.find("int main(void) {\n").unwrap() + "int main(void) {\n".len();
    c[start..]
        .lines()
        .map(|line| line.to_owned())
        .collect()
}

#[test]
fn empty_program() {
    assert_eq!(
        main_body(""),
        vec![
            "    memory = alloc_cells(memsize);",
            "    free(memory);",
            "    return 0;",
            "}"
        ]
    );
}

#[test]
fn one_statement_per_instruction() {
    assert_eq!(
        main_body("+++--,.>><"),
        vec![
            "    memory = alloc_cells(memsize);",
            "    memory[memptr] += 3u;",
            "    memory[memptr] -= 2u;",
            "    fflush(stdout);",
            "    memory[memptr] = getchar();",
            "    putchar(memory[memptr]);",
            "    memptr += 2;",
            "    memfix();",
            "    memback(1);",
            "    free(memory);",
            "    return 0;",
            "}"
        ]
    );
}

#[test]
fn loops_become_nested_while_blocks() {
    assert_eq!(
        main_body("[>[-]<]"),
        vec![
            "    memory = alloc_cells(memsize);",
            "    while (memory[memptr] != 0) {",
            "        memptr += 1;",
            "        memfix();",
            "        while (memory[memptr] != 0) {",
            "            memory[memptr] -= 1u;",
            "        }",
            "        memback(1);",
            "    }",
            "    free(memory);",
            "    return 0;",
            "}"
        ]
    );
}

#[test]
fn prelude_allocates_and_grows_the_tape() {
    let c = generate_c(&compress(load_str("").unwrap()));
    assert!(c.starts_with("#include <stdio.h>\n#include <stdlib.h>\n"));
    assert!(c.contains("static size_t memsize = 1, memptr = 0;"));
    assert!(c.contains("memsize *= 2;"));
    assert!(c.contains(&format!("exit({});", TAPE_UNDERFLOW_STATUS)));
}

#[test]
fn generation_is_deterministic() {
    let source = "++[>+<-]>[.,]";
    assert_eq!(
        generate_c(&compress(load_str(source).unwrap())),
        generate_c(&compress(load_str(source).unwrap()))
    );
}
