//! Interactive prompt.  Every line is a unit run in the same [`Lox`]
//! session, so globals survive from one line to the next.

use std::io;

use log::{debug, info};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};

use crate::lox::{Lox, Options, Status};

const PROMPT: &str = "> ";

pub struct Repl {
    editor: DefaultEditor,
    session: Lox,
}

impl Repl {
    pub fn new(options: Options) -> RlResult<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
            session: Lox::new(options),
        })
    }

    pub fn run(&mut self) -> RlResult<()> {
        info!("Entering REPL");
        println!("Type :help for help, :quit to exit.");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    self.eval_line(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        info!("Leaving REPL");
        Ok(())
    }

    /// `true` when the REPL should exit.
    fn handle_command(&self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" => true,
            ":help" | ":h" => {
                println!("Commands:");
                println!("  :help, :h   Show this help");
                println!("  :quit, :q   Exit (Ctrl-D works too)");
                println!();
                println!("Anything else runs as Lox; a bare expression is printed.");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                false
            }
        }
    }

    /// Statements run as a program.  A line that is a lone expression
    /// (no trailing `;`) is evaluated and its value printed.
    fn eval_line(&mut self, line: &str) {
        let status = if line.ends_with(';') || line.ends_with('}') {
            self.session.run(line)
        } else {
            match self.session.evaluate(line) {
                Ok(value) => {
                    println!("{}", value);
                    Status::Ok
                }
                Err(status) => status,
            }
        };

        debug!("Line finished with {:?}", status);

        if let Err(e) = self.session.diagnostics().emit(&mut io::stderr()) {
            eprintln!("Error: {e}");
        }
    }
}
