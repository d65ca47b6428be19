//! Interactive read-eval loop with persistent session state.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::{Compiler, SymbolTable, Value, Vm, GLOBALS_SIZE};
use crate::lexer::Scanner;
use crate::parser::Parser;

const PROMPT: &str = "> ";
const HISTORY_FILE: &str = ".tamarin_history";

/// A REPL session. The symbol table, constant pool and globals array
/// survive across lines so `let` bindings persist; the compiler's slot
/// indices and the globals array always come from the same session.
pub struct Repl {
    symbols: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
}

impl Repl {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            constants: Vec::new(),
            globals: vec![Value::Null; GLOBALS_SIZE],
        }
    }

    fn history_path() -> PathBuf {
        if let Some(home) = dirs::home_dir() {
            home.join(HISTORY_FILE)
        } else {
            PathBuf::from(HISTORY_FILE)
        }
    }

    pub fn run(&mut self) {
        println!("Tamarin {}", env!("CARGO_PKG_VERSION"));
        println!("Press Ctrl+D to exit.\n");

        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(_) => {
                println!("Warning: line editing unavailable, using basic input");
                self.run_basic();
                return;
            }
        };
        let history_path = Self::history_path();
        let _ = editor.load_history(&history_path);

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);
                    self.execute_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("Error: {}", err);
                    break;
                }
            }
        }

        let _ = editor.save_history(&history_path);
        println!("Goodbye!");
    }

    fn run_basic(&mut self) {
        use std::io::{BufRead, Write};

        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("{}", PROMPT);
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        self.execute_line(line);
                    }
                }
            }
        }
        println!("Goodbye!");
    }

    /// One read-eval cycle: lex, parse, compile, run, print the last
    /// popped stack element.
    fn execute_line(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(err) => {
                print_parser_errors(&[err.to_string()]);
                return;
            }
        };
        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(err) => {
                print_parser_errors(&[err.to_string()]);
                return;
            }
        };

        // Definitions made before a failing statement stay in the
        // session, matching the retained symbol table contract.
        let mut compiler =
            Compiler::with_state(self.symbols.clone(), std::mem::take(&mut self.constants));
        let compiled = compiler.compile(&program);
        let chunk = compiler.bytecode();
        let (symbols, constants) = compiler.into_state();
        self.symbols = symbols;
        self.constants = constants;
        if let Err(err) = compiled {
            println!("Woops! Compilation failed:\n {}", err);
            return;
        }

        let mut vm = Vm::with_state(chunk, std::mem::take(&mut self.globals));
        let outcome = vm.run();
        let value = vm.last_popped();
        self.globals = vm.into_globals();
        match outcome {
            Ok(()) => println!("{}", value),
            Err(err) => println!("Woops! Executing bytecode failed:\n {}", err),
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

fn print_parser_errors(errors: &[String]) {
    println!("Woops! Parser errors detected...");
    println!("  Errors:");
    for error in errors {
        println!("\t{}", error);
    }
}
