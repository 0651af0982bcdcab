//! REPL and script driver. Thin by design: owns argv parsing and the
//! line-editor loop only, delegating every semantic decision to
//! `liblisp::interp::Interpreter`.

use clap::Parser;
use liblisp::config::{CliArgs, WELCOME_FOOTER, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use liblisp::interp::Interpreter;
use rustyline::error::ReadlineError;
use rustyline::{Config as RustylineConfig, DefaultEditor};
use std::path::Path;

const HISTORY_FILE: &str = ".lisp_history";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut interp = Interpreter::new();
    interp.config = args.to_config();
    liblisp::builtins::register_builtins(&mut interp);

    if let Some(script_path) = &args.script {
        run_script(&mut interp, script_path)?;
        return Ok(());
    }

    run_repl(&mut interp, !args.no_color, args.pretty)
}

/// Reads and evaluates every top-level form in a script file, writing
/// an uncaught error's message to stderr before exiting non-zero.
fn run_script(interp: &mut Interpreter, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read script file {}: {}", path.display(), e))?;

    match interp.eval_string(&contents) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("(error \"{}\")", e);
            std::process::exit(1);
        }
    }
}

fn run_repl(interp: &mut Interpreter, color_flag: bool, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let rl_config = RustylineConfig::builder().auto_add_history(true).build();
    let mut rl = DefaultEditor::with_config(rl_config)
        .map_err(|e| format!("failed to initialize REPL: {}", e))?;
    let _ = rl.load_history(HISTORY_FILE);

    println!("{}", WELCOME_MESSAGE);
    println!("{}", WELCOME_SUBTITLE);
    println!("{}", WELCOME_FOOTER);

    loop {
        match rl.readline("lisp> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match line.trim() {
                    "(quit)" | "(exit)" => {
                        println!("Goodbye!");
                        break;
                    }
                    "(clear)" => {
                        print!("\x1B[2J\x1B[H");
                        continue;
                    }
                    _ => {}
                }

                match interp.eval_string(&line) {
                    Ok(result) => {
                        let color = color_flag
                            && !matches!(std::env::var("NO_COLOR"), Ok(v) if !v.is_empty());
                        let text = interp.print_to_string(result, color, pretty);
                        println!("=> {}", text);
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        if e.is_fatal() {
                            eprintln!("Fatal error, halting.");
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(HISTORY_FILE);
    Ok(())
}
