//! Bytecode compiler: lowers the AST into a chunk.

use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, Program, Stmt, UnaryOp};
use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::{self, OpCode};
use crate::bytecode::symbols::SymbolTable;
use crate::bytecode::value::Value;
use crate::error::CompileError;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Operand placeholder for forward jumps, patched once the target is
/// known.
const PLACEHOLDER: usize = 0xFFFF;

/// The last instruction written to the chunk: its opcode and the byte
/// offset of its opcode byte.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// The bytecode compiler.
pub struct Compiler {
    chunk: Chunk,
    symbols: SymbolTable,
    /// Last two emitted instructions, for the if-branch Pop peephole.
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table and constant pool.
    pub fn new() -> Self {
        Self::with_state(SymbolTable::new(), Vec::new())
    }

    /// Reuse a symbol table and constant pool from an earlier compile,
    /// so definitions keep their slots across REPL lines.
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            chunk: Chunk {
                code: Vec::new(),
                constants,
            },
            symbols,
            last_instruction: None,
            previous_instruction: None,
        }
    }

    /// Compile a program. On error the emitted prefix stays in place;
    /// callers are expected to discard it.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Snapshot of the emitted instructions and constant pool.
    pub fn bytecode(&self) -> Chunk {
        self.chunk.clone()
    }

    /// Hand back the symbol table and constant pool for the next
    /// compile in a session.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbols, self.chunk.constants)
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbols.define(name);
                self.emit(OpCode::SetGlobal, &[symbol.index as usize]);
            }
            Stmt::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::IntLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value))?;
                self.emit(OpCode::Constant, &[index]);
            }
            Expr::StringLiteral(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())))?;
                self.emit(OpCode::Constant, &[index]);
            }
            Expr::BoolLiteral(true) => {
                self.emit(OpCode::True, &[]);
            }
            Expr::BoolLiteral(false) => {
                self.emit(OpCode::False, &[]);
            }
            Expr::Variable(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedIdentifier(name.clone()))?;
                let index = symbol.index as usize;
                self.emit(OpCode::GetGlobal, &[index]);
            }
            Expr::Unary { operator, operand } => {
                self.compile_expression(operand)?;
                match operator {
                    UnaryOp::Not => self.emit(OpCode::Not, &[]),
                    UnaryOp::Negate => self.emit(OpCode::Negate, &[]),
                };
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                // `<` lowers as the swapped `>` so the VM only needs
                // one operand ordering on the fast path.
                if *operator == BinaryOp::Less {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(OpCode::Greater, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                let op = match operator {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Subtract => OpCode::Subtract,
                    BinaryOp::Multiply => OpCode::Multiply,
                    BinaryOp::Divide => OpCode::Divide,
                    BinaryOp::Equal => OpCode::Equal,
                    BinaryOp::NotEqual => OpCode::NotEqual,
                    BinaryOp::Greater => OpCode::Greater,
                    BinaryOp::Less => unreachable!("lowered by operand swap above"),
                };
                self.emit(op, &[]);
            }
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                let jump_if_false_pos = self.emit(OpCode::JumpIfFalse, &[PLACEHOLDER]);

                self.compile_block(consequence)?;
                if self.last_instruction_is_pop() {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(OpCode::Jump, &[PLACEHOLDER]);

                let after_consequence = self.chunk.current_offset();
                self.change_operand(jump_if_false_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(block) => {
                        self.compile_block(block)?;
                        if self.last_instruction_is_pop() {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.chunk.current_offset();
                self.change_operand(jump_pos, after_alternative);
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::BuildArray, &[elements.len()]);
            }
            Expr::Hash(pairs) => {
                // Pairs compile in source order; on a duplicated key the
                // VM keeps the later pair.
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::BuildHash, &[pairs.len() * 2]);
            }
        }
        Ok(())
    }

    fn add_constant(&mut self, value: Value) -> CompileResult<usize> {
        let index = self.chunk.add_constant(value);
        if index > u16::MAX as usize {
            return Err(CompileError::TooManyConstants);
        }
        Ok(index)
    }

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let ins = instruction::make(op, operands);
        let pos = self.chunk.push_instruction(&ins);
        self.set_last_instruction(op, pos);
        pos
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        self.previous_instruction = self.last_instruction;
        self.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is_pop(&self) -> bool {
        matches!(
            self.last_instruction,
            Some(ins) if ins.opcode == OpCode::Pop
        )
    }

    /// Drop a trailing `Pop` so an if-branch leaves its value on the
    /// stack.
    fn remove_last_pop(&mut self) {
        if let Some(last) = self.last_instruction {
            self.chunk.truncate(last.position);
            self.last_instruction = self.previous_instruction;
        }
    }

    /// Back-patch the operand of the jump emitted at `op_pos`.
    fn change_operand(&mut self, op_pos: usize, operand: usize) {
        self.chunk.patch_u16(op_pos + 1, operand as u16);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
