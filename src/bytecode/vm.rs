//! Stack-based virtual machine executing compiled chunks.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::{self, OpCode};
use crate::bytecode::value::{HashPair, Value};
use crate::error::RuntimeError;

/// Maximum operand stack depth.
pub const STACK_SIZE: usize = 2048;
/// Number of addressable global slots.
pub const GLOBALS_SIZE: usize = 65536;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// The virtual machine. `sp` counts live stack entries; the top of the
/// stack is `stack[sp - 1]`.
pub struct Vm {
    chunk: Chunk,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    ip: usize,
}

impl Vm {
    /// Create a VM with a fresh globals array.
    pub fn new(chunk: Chunk) -> Self {
        Self::with_state(chunk, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Reuse a globals array from an earlier run (REPL persistence).
    /// The array must have been indexed by the same symbol table that
    /// compiled `chunk`.
    pub fn with_state(chunk: Chunk, globals: Vec<Value>) -> Self {
        Self {
            chunk,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            ip: 0,
        }
    }

    /// Hand the globals array back for the next run in a session.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The slot just above the live stack top: the most recently popped
    /// value. Top-level statements pop their result, so after a run
    /// this is the value of the final expression.
    pub fn last_popped(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Execute until the instruction pointer runs off the end of the
    /// chunk.
    pub fn run(&mut self) -> VmResult<()> {
        while self.ip < self.chunk.code.len() {
            let byte = self.chunk.code[self.ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;
            self.ip += 1;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16() as usize;
                    let constant = self.chunk.constants[index].clone();
                    self.push(constant)?;
                }
                OpCode::Null => self.push(Value::Null)?,
                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Add | OpCode::Subtract | OpCode::Multiply | OpCode::Divide => {
                    self.execute_binary_operation(op)?;
                }
                OpCode::Negate => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(value) => self.push(Value::Integer(-value))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()))
                        }
                    }
                }

                OpCode::Equal | OpCode::NotEqual | OpCode::Less | OpCode::Greater => {
                    self.execute_comparison(op)?;
                }
                OpCode::Not => {
                    let operand = self.pop();
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                OpCode::Jump => {
                    let target = self.read_u16() as usize;
                    self.ip = target;
                }
                OpCode::JumpIfFalse => {
                    let target = self.read_u16() as usize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.ip = target;
                    }
                }

                OpCode::GetGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let index = self.read_u16() as usize;
                    self.globals[index] = self.pop();
                }

                OpCode::BuildArray => {
                    let count = self.read_u16() as usize;
                    let array = self.build_array(count);
                    self.push(array)?;
                }
                OpCode::BuildHash => {
                    let slots = self.read_u16() as usize;
                    let hash = self.build_hash(slots)?;
                    self.push(hash)?;
                }
            }
        }
        Ok(())
    }

    /// The element on top of the stack becomes the last array element.
    fn build_array(&mut self, count: usize) -> Value {
        let mut elements = vec![Value::Null; count];
        for slot in (0..count).rev() {
            elements[slot] = self.pop();
        }
        Value::Array(Rc::new(elements))
    }

    /// `slots` counts stack entries, two per pair with each value above
    /// its key. Entries are inserted in source order, so a duplicated
    /// key keeps its last pair.
    fn build_hash(&mut self, slots: usize) -> VmResult<Value> {
        let count = slots / 2;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let value = self.pop();
            let key = self.pop();
            entries.push((key, value));
        }

        let mut pairs = IndexMap::with_capacity(count);
        for (key, value) in entries.into_iter().rev() {
            let Some(hash_key) = key.hash_key() else {
                return Err(RuntimeError::UnusableHashKey(key.type_name()));
            };
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                let result = match op {
                    OpCode::Add => l + r,
                    OpCode::Subtract => l - r,
                    OpCode::Multiply => l * r,
                    OpCode::Divide => {
                        if *r == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        l / r
                    }
                    _ => unreachable!("dispatched as binary operation"),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(l), Value::String(r)) if op == OpCode::Add => {
                let mut result = String::with_capacity(l.len() + r.len());
                result.push_str(l);
                result.push_str(r);
                self.push(Value::String(Rc::new(result)))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                OpCode::Equal => l == r,
                OpCode::NotEqual => l != r,
                OpCode::Less => l < r,
                OpCode::Greater => l > r,
                _ => unreachable!("dispatched as comparison"),
            };
            return self.push(Value::Boolean(result));
        }

        match op {
            OpCode::Equal => {
                let equal = left == right;
                self.push(Value::Boolean(equal))
            }
            OpCode::NotEqual => {
                let equal = left == right;
                self.push(Value::Boolean(!equal))
            }
            _ => Err(RuntimeError::UnsupportedComparisonTypes(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn read_u16(&mut self) -> u16 {
        let value = instruction::read_u16(&self.chunk.code[self.ip..]);
        self.ip += 2;
        value
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Unchecked: the compiler only produces stack-balanced code.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::symbols::SymbolTable;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn parse(source: &str) -> crate::ast::Program {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        Parser::new(tokens).parse().expect("parser error")
    }

    fn compile(source: &str) -> Chunk {
        let mut compiler = Compiler::new();
        compiler.compile(&parse(source)).expect("compile error");
        compiler.bytecode()
    }

    fn try_run(source: &str) -> VmResult<Value> {
        let mut vm = Vm::new(compile(source));
        vm.run()?;
        Ok(vm.last_popped())
    }

    fn run_source(source: &str) -> Value {
        try_run(source).expect("vm error")
    }

    fn assert_integer_results(cases: &[(&str, i64)]) {
        for (source, expected) in cases {
            assert_eq!(
                run_source(source),
                Value::Integer(*expected),
                "source: {}",
                source
            );
        }
    }

    fn assert_boolean_results(cases: &[(&str, bool)]) {
        for (source, expected) in cases {
            assert_eq!(
                run_source(source),
                Value::Boolean(*expected),
                "source: {}",
                source
            );
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_integer_results(&[
            ("1", 1),
            ("2", 2),
            ("1 + 2", 3),
            ("3 - 2", 1),
            ("2 * 2", 4),
            ("10 / 2", 5),
            ("7 / 2", 3),
            ("-7 / 2", -3),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("5 + 2 * 10", 25),
            ("5 * (2 + 10)", 60),
            ("-5", -5),
            ("-50 + 100 + -50", 0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_boolean_results(&[
            ("10 == 10", true),
            ("10 != 10", false),
            ("true == true", true),
            ("true == false", false),
            ("true != false", true),
            ("1 < 2", true),
            ("2 < 1", false),
            ("2 > 1", true),
            ("1 > 2", false),
            ("(1 < 2) == true", true),
            ("(1 < 2) == false", false),
            ("(1 > 2) == true", false),
            ("(1 > 2) == false", true),
        ]);
    }

    #[test]
    fn test_less_opcode_executes_directly() {
        // The compiler lowers `<` by operand swap, so Less only shows
        // up in hand-built chunks.
        let cases = [(1, 2, true), (2, 1, false), (3, 3, false)];
        for (left, right, expected) in cases {
            let code = [
                instruction::make(OpCode::Constant, &[0]),
                instruction::make(OpCode::Constant, &[1]),
                instruction::make(OpCode::Less, &[]),
                instruction::make(OpCode::Pop, &[]),
            ]
            .concat();
            let chunk = Chunk {
                code,
                constants: vec![Value::Integer(left), Value::Integer(right)],
            };
            let mut vm = Vm::new(chunk);
            vm.run().expect("vm error");
            assert_eq!(
                vm.last_popped(),
                Value::Boolean(expected),
                "{} < {}",
                left,
                right
            );
        }
    }

    #[test]
    fn test_less_opcode_requires_integers() {
        let code = [
            instruction::make(OpCode::True, &[]),
            instruction::make(OpCode::False, &[]),
            instruction::make(OpCode::Less, &[]),
        ]
        .concat();
        let chunk = Chunk {
            code,
            constants: Vec::new(),
        };
        let mut vm = Vm::new(chunk);
        assert_eq!(
            vm.run(),
            Err(RuntimeError::UnsupportedComparisonTypes("BOOLEAN", "BOOLEAN"))
        );
    }

    #[test]
    fn test_boolean_expressions() {
        assert_boolean_results(&[
            ("true", true),
            ("false", false),
            ("!true", false),
            ("!false", true),
            ("!!true", true),
            ("!!false", false),
            ("!!5", true),
            ("!0", false),
            ("!(if (false) { 5; })", true),
        ]);
    }

    #[test]
    fn test_mixed_type_equality_is_not_an_error() {
        assert_boolean_results(&[
            ("1 == true", false),
            ("1 != true", true),
            ("\"1\" == 1", false),
        ]);
    }

    #[test]
    fn test_string_equality_compares_text() {
        assert_boolean_results(&[
            ("\"a\" == \"a\"", true),
            ("\"a\" != \"a\"", false),
            ("\"a\" == \"b\"", false),
        ]);
    }

    #[test]
    fn test_aggregates_compare_by_identity() {
        assert_boolean_results(&[
            ("[1] == [1]", false),
            ("let a = [1]; a == a", true),
            ("{1: 2} == {1: 2}", false),
            ("let h = {1: 2}; h == h", true),
        ]);
    }

    #[test]
    fn test_conditionals() {
        assert_integer_results(&[
            ("if (true) { 10 }", 10),
            ("if (true) { 10 } else { 20 }", 10),
            ("if (false) { 10 } else { 20 }", 20),
            ("if (1) { 10 }", 10),
            ("if (1 < 2) { 10 }", 10),
            ("if (1 < 2) { 10 } else { 20 }", 10),
            ("if (1 > 2) { 10 } else { 20 }", 20),
            ("if ((if (false) { 10 })) { 10 } else { 20 }", 20),
        ]);

        assert_eq!(run_source("if (1 > 2) { 10 }"), Value::Null);
        assert_eq!(run_source("if (false) { 10 }"), Value::Null);
    }

    #[test]
    fn test_global_let_statements() {
        assert_integer_results(&[
            ("let one = 1; one", 1),
            ("let one = 1; let two = 2; one + two", 3),
            ("let one = 1; let two = one + one; one + two", 3),
            ("let a = 1; let a = a + 1; a", 2),
        ]);
    }

    #[test]
    fn test_string_expressions() {
        assert_eq!(
            run_source("\"tamarin\""),
            Value::String(Rc::new("tamarin".to_string()))
        );
        assert_eq!(
            run_source("\"tama\" + \"rin\""),
            Value::String(Rc::new("tamarin".to_string()))
        );
        assert_eq!(
            run_source("\"mon\" + \"key\" + \"banana\""),
            Value::String(Rc::new("monkeybanana".to_string()))
        );
    }

    #[test]
    fn test_array_literals() {
        let cases: [(&str, &[i64]); 3] = [
            ("[]", &[]),
            ("[1, 2, 3]", &[1, 2, 3]),
            ("[1 + 2, 3 * 4, 5 + 6]", &[3, 12, 11]),
        ];
        for (source, expected) in cases {
            let Value::Array(elements) = run_source(source) else {
                panic!("expected array for {}", source);
            };
            let expected: Vec<Value> = expected.iter().map(|v| Value::Integer(*v)).collect();
            assert_eq!(*elements, expected, "source: {}", source);
        }
    }

    #[test]
    fn test_hash_literals() {
        let Value::Hash(pairs) = run_source("{1: 2 + 3, \"four\": 5, true: 6}") else {
            panic!("expected hash");
        };
        assert_eq!(pairs.len(), 3);

        let one = Value::Integer(1).hash_key().unwrap();
        assert_eq!(pairs[&one].value, Value::Integer(5));

        let four = Value::String(Rc::new("four".to_string())).hash_key().unwrap();
        assert_eq!(pairs[&four].key, Value::String(Rc::new("four".to_string())));
        assert_eq!(pairs[&four].value, Value::Integer(5));

        let truth = Value::Boolean(true).hash_key().unwrap();
        assert_eq!(pairs[&truth].value, Value::Integer(6));
    }

    #[test]
    fn test_empty_hash() {
        let Value::Hash(pairs) = run_source("{}") else {
            panic!("expected hash");
        };
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_duplicate_hash_key_keeps_last_pair() {
        let Value::Hash(pairs) = run_source("{1: 2 + 3, 0 + 1: 99}") else {
            panic!("expected hash");
        };
        assert_eq!(pairs.len(), 1);
        let key = Value::Integer(1).hash_key().unwrap();
        assert_eq!(pairs[&key].value, Value::Integer(99));
    }

    #[test]
    fn test_unusable_hash_key() {
        assert_eq!(
            try_run("{[1]: 2}"),
            Err(RuntimeError::UnusableHashKey("ARRAY"))
        );
        assert_eq!(
            try_run("{[1]: 2}").unwrap_err().to_string(),
            "unusable as hash key: ARRAY"
        );
    }

    #[test]
    fn test_binary_type_errors() {
        assert_eq!(
            try_run("1 + true"),
            Err(RuntimeError::UnsupportedBinaryTypes("INTEGER", "BOOLEAN"))
        );
        assert_eq!(
            try_run("\"a\" - \"b\""),
            Err(RuntimeError::UnsupportedBinaryTypes("STRING", "STRING"))
        );
        assert_eq!(
            try_run("\"a\" + 1"),
            Err(RuntimeError::UnsupportedBinaryTypes("STRING", "INTEGER"))
        );
    }

    #[test]
    fn test_comparison_type_errors() {
        assert_eq!(
            try_run("true < false"),
            Err(RuntimeError::UnsupportedComparisonTypes("BOOLEAN", "BOOLEAN"))
        );
        assert_eq!(
            try_run("\"a\" > \"b\""),
            Err(RuntimeError::UnsupportedComparisonTypes("STRING", "STRING"))
        );
    }

    #[test]
    fn test_negation_type_error() {
        assert_eq!(
            try_run("-true"),
            Err(RuntimeError::UnsupportedNegation("BOOLEAN"))
        );
        assert_eq!(
            try_run("-\"a\"").unwrap_err().to_string(),
            "unsupported type for negation: STRING"
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(try_run("1 / 0"), Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn test_stack_overflow() {
        // An array literal pushes every element before building.
        let source = format!("[{}]", vec!["1"; STACK_SIZE + 1].join(", "));
        assert_eq!(try_run(&source), Err(RuntimeError::StackOverflow));
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let chunk = Chunk {
            code: vec![255],
            constants: Vec::new(),
        };
        let mut vm = Vm::new(chunk);
        assert_eq!(vm.run(), Err(RuntimeError::UnknownOpcode(255)));
    }

    #[test]
    fn test_stack_is_balanced_after_a_run() {
        let mut vm = Vm::new(compile("1; 2; if (true) { 3 } else { 4 }; [5, 6];"));
        vm.run().expect("vm error");
        assert_eq!(vm.sp, 0);
    }

    #[test]
    fn test_last_popped_is_the_final_expression() {
        assert_eq!(run_source("1; 2; 3"), Value::Integer(3));
        assert_eq!(run_source("let a = 9; a; a * 2"), Value::Integer(18));
    }

    #[test]
    fn test_with_state_shares_globals_across_runs() {
        let symbols = SymbolTable::new();
        let constants = Vec::new();

        let mut compiler = Compiler::with_state(symbols, constants);
        compiler
            .compile(&parse("let count = 40;"))
            .expect("compile error");
        let chunk = compiler.bytecode();
        let (symbols, constants) = compiler.into_state();

        let mut vm = Vm::with_state(chunk, vec![Value::Null; GLOBALS_SIZE]);
        vm.run().expect("vm error");
        let globals = vm.into_globals();

        let mut compiler = Compiler::with_state(symbols, constants);
        compiler
            .compile(&parse("count + 2"))
            .expect("compile error");
        let chunk = compiler.bytecode();

        let mut vm = Vm::with_state(chunk, globals);
        vm.run().expect("vm error");
        assert_eq!(vm.last_popped(), Value::Integer(42));
    }
}
