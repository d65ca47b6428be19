//! Tamarin: a small dynamically-typed expression language compiled to
//! bytecode and executed on a stack-based virtual machine.
//!
//! Source is lexed and parsed into an AST, lowered by the bytecode
//! compiler into a flat instruction stream plus a constant pool, and
//! executed by the VM. The REPL threads the symbol table, constant pool
//! and globals array across inputs so definitions persist.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;

use bytecode::{Chunk, Compiler, Value, Vm};
use error::TamarinError;

/// Parse source code into an AST without executing it.
pub fn parse(source: &str) -> Result<ast::Program, TamarinError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing it.
pub fn compile(source: &str) -> Result<Chunk, TamarinError> {
    let program = parse(source)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Compile and execute source code, returning the value of the final
/// top-level expression.
pub fn run(source: &str) -> Result<Value, TamarinError> {
    let chunk = compile(source)?;
    let mut vm = Vm::new(chunk);
    vm.run()?;
    Ok(vm.last_popped())
}

/// Disassemble compiled bytecode to a string.
pub fn disassemble(chunk: &Chunk) -> String {
    bytecode::disassemble_chunk(chunk)
}
