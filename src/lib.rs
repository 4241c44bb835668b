//! # dbn
//!
//! A compiler and stack-machine virtual machine for DBN (Design By
//! Numbers), the little language whose programs draw on a 101x101
//! grayscale canvas.
//!
//! ## Pipeline
//!
//! Source text becomes a picture in four stages:
//!
//! 1. **Tokenizer** - scans the text into typed tokens with positions
//! 2. **Parser** - recursive descent from tokens to a syntax tree
//! 3. **Compiler** - emits bytecode with symbolic labels, then the
//!    assembler resolves every label to an absolute instruction index
//! 4. **Interpreter** - executes the bytecode on a value stack, drawing
//!    on the canvas through the built-in Line, Paper, and Pen commands
//!
//! ## Example
//!
//! ```
//! use dbn::Interpreter;
//!
//! let code = dbn::compile_source("Paper 0\nPen 100\nLine 0 0 100 100\n").unwrap();
//! let mut vm = Interpreter::new(code);
//! vm.run().unwrap();
//!
//! // blank paper with an ink diagonal; DBN (0,0) is the lower left
//! assert_eq!(vm.canvas().read_dot(50, 50), 100);
//! assert_eq!(vm.canvas().read_dot(50, 40), 0);
//! ```

pub mod compiler;
pub mod errors;
pub mod parser;
pub mod tokenizer;
pub mod vm;

#[cfg(feature = "cli")]
pub mod cli;

pub use errors::Error;
pub use vm::Interpreter;

use std::fs;
use std::path::Path;

use compiler::{assemble, Compiler, Instruction};

/// Compiles DBN source text into executable bytecode
///
/// `Load` paths resolve against the current directory; use
/// [`compile_file`] to resolve them against the program's own location.
pub fn compile_source(source: &str) -> Result<Vec<Instruction>, Error> {
    let tokens = tokenizer::tokenize(source)?;
    let ast = parser::parse(tokens)?;
    let code = Compiler::new().compile(&ast)?;
    Ok(assemble(code)?)
}

/// Compiles a DBN source file, resolving `Load` paths relative to it
pub fn compile_file(path: impl AsRef<Path>) -> Result<Vec<Instruction>, Error> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    let tokens = tokenizer::tokenize(&source)?;
    let ast = parser::parse(tokens)?;

    let mut compiler = Compiler::new();
    if let Some(dir) = path.parent() {
        compiler = compiler.with_base_dir(dir);
    }
    let code = compiler.compile(&ast)?;
    Ok(assemble(code)?)
}

/// Compiles and runs source text, returning the finished machine
pub fn run_source(source: &str) -> Result<Interpreter, Error> {
    let mut vm = Interpreter::new(compile_source(source)?);
    vm.run()?;
    Ok(vm)
}
