//! Tamarin CLI: execute files, evaluate snippets, or run the REPL.

use std::env;
use std::fs;
use std::process;

use tamarin::bytecode::Vm;
use tamarin::repl::Repl;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Tamarin {}", VERSION);
    eprintln!();
    eprintln!("Usage: tamarin [options] [script.tam]");
    eprintln!("       tamarin -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>        Evaluate a code snippet and print its value");
    eprintln!("  --disassemble    Print the compiled bytecode before running");
    eprintln!("  --version        Print the version and exit");
    eprintln!("  --help           Show this help");
    eprintln!();
    eprintln!("With no script, an interactive REPL is started.");
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut disassemble = false;
    let mut command = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--version" | "-v" => {
                println!("tamarin {}", VERSION);
                process::exit(0);
            }
            "--disassemble" => disassemble = true,
            "-e" => {
                i += 1;
                let Some(code) = args.get(i) else {
                    eprintln!("error: -e requires a code argument");
                    process::exit(64);
                };
                command = Some(Command::Eval { code: code.clone() });
            }
            arg if arg.starts_with('-') => {
                eprintln!("error: unknown option '{}'", arg);
                print_usage();
                process::exit(64);
            }
            file => {
                command = Some(Command::Run {
                    file: file.to_string(),
                })
            }
        }
        i += 1;
    }

    Options {
        command: command.unwrap_or(Command::Repl),
        disassemble,
    }
}

fn execute(source: &str, disassemble: bool) -> i32 {
    let chunk = match tamarin::compile(source) {
        Ok(chunk) => chunk,
        Err(err) => {
            eprintln!("{}", err);
            return 65;
        }
    };

    if disassemble {
        print!("{}", tamarin::disassemble(&chunk));
        println!("---");
    }

    let mut vm = Vm::new(chunk);
    if let Err(err) = vm.run() {
        eprintln!("Runtime error: {}", err);
        return 70;
    }
    println!("{}", vm.last_popped());
    0
}

fn main() {
    let options = parse_args();
    match options.command {
        Command::Run { file } => {
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: failed to read '{}': {}", file, err);
                    process::exit(66);
                }
            };
            process::exit(execute(&source, options.disassemble));
        }
        Command::Eval { code } => process::exit(execute(&code, options.disassemble)),
        Command::Repl => Repl::new().run(),
    }
}
