use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::ast_printer::AstPrinter;
use rox::error::LoxError;
use rox::interpreter::DEFAULT_MAX_CALL_DEPTH;
use rox::lox::{Lox, Options, Status};
use rox::repl::Repl;
use rox::scanner::Scanner;

/// sysexits `EX_USAGE`.
const EXIT_USAGE: i32 = 64;

/// sysexits `EX_IOERR`.
const EXIT_IO: i32 = 74;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Report unused local variables as errors instead of warnings
    #[arg(long, global = true)]
    deny_unused: bool,

    /// Nested calls allowed before "Stack overflow." is raised
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize { filename: Option<PathBuf> },

    /// Parses input from a file as a program and prints its AST
    Parse { filename: Option<PathBuf> },

    /// Resolves a program and prints every local binding as JSON
    Resolve { filename: Option<PathBuf> },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Lox program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive prompt
    Repl,
}

/// Maps the file read-only and validates it as UTF-8.
fn read_file(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).with_context(|| format!("Failed to open file {:?}", filename))?;

    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat file {:?}", filename))?
        .len();

    // Zero-length mappings are rejected on some platforms.
    if len == 0 {
        return Ok(String::new());
    }

    // SAFETY: the map is read-only and copied out before returning; a
    // concurrent truncation by another process is outside our control.
    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map file {:?}", filename))?;

    let text = std::str::from_utf8(&map)
        .map_err(LoxError::from)
        .with_context(|| format!("File {:?} is not valid UTF-8", filename))?
        .to_owned();

    info!("Read {} bytes from {:?}", text.len(), filename);

    Ok(text)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Reads the script or exits: 64 without a path, 74 when it can't be read.
fn source_or_exit(filename: Option<PathBuf>) -> String {
    let Some(filename) = filename else {
        eprintln!("Usage: rox <command> <filename>");
        std::process::exit(EXIT_USAGE);
    };

    match read_file(&filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(EXIT_IO);
        }
    }
}

fn finish(session: &Lox, status: Status) -> Result<()> {
    session
        .diagnostics()
        .emit(&mut io::stderr())
        .context("Failed to write diagnostics")?;

    if status != Status::Ok {
        debug!("Exiting with {:?}", status);
        std::process::exit(status.exit_code());
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let options = Options {
        deny_unused: args.deny_unused,
        max_call_depth: args.max_call_depth,
    };

    match args.commands {
        Commands::Tokenize { filename } => {
            info!("Running Tokenize subcommand");
            let source = source_or_exit(filename);
            let mut tokenized = true;

            for token in Scanner::new(&source) {
                match token {
                    Ok(token) => println!("{}", token),
                    Err(e) => {
                        tokenized = false;
                        eprintln!("{}", e);
                    }
                }
            }

            if !tokenized {
                debug!("Tokenization failed, exiting with code 65");
                std::process::exit(Status::StaticError.exit_code());
            }
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let source = source_or_exit(filename);
            let mut session = Lox::new(options);

            match session.parse(&source) {
                Some(statements) => {
                    for stmt in &statements {
                        println!("{}", AstPrinter::print_stmt(stmt));
                    }
                    finish(&session, Status::Ok)?;
                }
                None => finish(&session, Status::StaticError)?,
            }
        }

        Commands::Resolve { filename } => {
            info!("Running Resolve subcommand");
            let source = source_or_exit(filename);
            let mut session = Lox::new(options);

            match session.resolve_source(&source) {
                Some(bindings) => {
                    let json = serde_json::to_string_pretty(&bindings)
                        .context("Failed to serialize bindings")?;
                    println!("{}", json);
                    finish(&session, Status::Ok)?;
                }
                None => finish(&session, Status::StaticError)?,
            }
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");
            let source = source_or_exit(filename);
            let mut session = Lox::new(options);

            match session.evaluate(&source) {
                Ok(value) => {
                    println!("{}", value);
                    finish(&session, Status::Ok)?;
                }
                Err(status) => finish(&session, status)?,
            }
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");
            let source = source_or_exit(filename);
            let mut session = Lox::new(options);

            let status = session.run(&source);
            finish(&session, status)?;
        }

        Commands::Repl => {
            Repl::new(options)
                .context("Failed to start line editor")?
                .run()
                .context("Line editor failed")?;
        }
    }

    Ok(())
}
