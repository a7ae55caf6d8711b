//! A Lox session: one interpreter, one diagnostics sink and the node-id
//! counter that keeps resolutions from successive runs apart.
//!
//! `run` is the pipeline `scan → parse → resolve → interpret`.  Any static
//! error stops the pipeline before execution; a runtime error stops the
//! unit at the failing statement.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Expr, Stmt};
use crate::error::Diagnostics;
use crate::interpreter::{Interpreter, DEFAULT_MAX_CALL_DEPTH};
use crate::parser::Parser;
use crate::resolver::{Binding, Resolver};
use crate::scanner::scan_tokens;
use crate::value::Value;

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Report unused locals as errors instead of warnings.
    pub deny_unused: bool,

    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            deny_unused: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Outcome of one unit of source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    StaticError,
    RuntimeError,
}

impl Status {
    /// Conventional process exit code (sysexits `EX_DATAERR` / `EX_SOFTWARE`).
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::StaticError => 65,
            Status::RuntimeError => 70,
        }
    }
}

/// An in-memory `Write` sink that can be read back after the session that
/// owns a clone of it has written to it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Lox {
    interpreter: Interpreter,
    diagnostics: Diagnostics,
    options: Options,
    next_id: usize,
}

impl Lox {
    pub fn new(options: Options) -> Self {
        Self::with_output(options, Box::new(io::stdout()))
    }

    /// A session whose `print` output goes to `out`.
    pub fn with_output(options: Options, out: Box<dyn Write>) -> Self {
        info!("Starting session with {:?}", options);

        Self {
            interpreter: Interpreter::with_output(out).with_max_call_depth(options.max_call_depth),
            diagnostics: Diagnostics::new(),
            options,
            next_id: 0,
        }
    }

    /// Diagnostics of the most recent unit.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Scan and parse `source` as a program.  `None` if anything was
    /// reported.
    pub fn parse(&mut self, source: &str) -> Option<Vec<Stmt>> {
        self.diagnostics.reset();

        let statements = self.parse_program(source);

        if self.diagnostics.had_error() {
            None
        } else {
            Some(statements)
        }
    }

    /// Run a program.  Globals defined by earlier runs stay visible.
    pub fn run(&mut self, source: &str) -> Status {
        self.diagnostics.reset();

        let statements = self.parse_program(source);
        if self.diagnostics.had_error() {
            debug!("Parse reported errors; not resolving");
            return Status::StaticError;
        }

        let resolutions = Resolver::new(&mut self.diagnostics)
            .deny_unused(self.options.deny_unused)
            .resolve(&statements);
        if self.diagnostics.had_error() {
            debug!("Resolver reported errors; not executing");
            return Status::StaticError;
        }

        self.interpreter.resolve(resolutions);

        match self.interpreter.interpret(&statements) {
            Ok(()) => Status::Ok,
            Err(e) => {
                debug!("Runtime error: {}", e);
                self.diagnostics.runtime_error(e);
                Status::RuntimeError
            }
        }
    }

    /// Evaluate a single expression and return its value.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, Status> {
        self.diagnostics.reset();

        let tokens = scan_tokens(source, &mut self.diagnostics);
        let mut parser = Parser::new(&tokens).starting_at(self.next_id);
        let expr = parser.parse_expression(&mut self.diagnostics);
        self.next_id = parser.next_id();

        let expr: Expr = match expr {
            Some(expr) if !self.diagnostics.had_error() => expr,
            _ => return Err(Status::StaticError),
        };

        // Wrapped as a statement so the resolver sees it like any other code.
        let wrapped = [Stmt::Expression(expr)];
        let resolutions = Resolver::new(&mut self.diagnostics)
            .deny_unused(self.options.deny_unused)
            .resolve(&wrapped);
        if self.diagnostics.had_error() {
            return Err(Status::StaticError);
        }
        self.interpreter.resolve(resolutions);

        let [Stmt::Expression(expr)] = &wrapped else {
            return Err(Status::StaticError);
        };

        self.interpreter.evaluate(expr).map_err(|e| {
            self.diagnostics.runtime_error(e);
            Status::RuntimeError
        })
    }

    /// Resolve `source` without running it.  Bindings come back in source
    /// order.
    pub fn resolve_source(&mut self, source: &str) -> Option<Vec<Binding>> {
        let statements = self.parse(source)?;

        let resolutions = Resolver::new(&mut self.diagnostics)
            .deny_unused(self.options.deny_unused)
            .resolve(&statements);
        if self.diagnostics.had_error() {
            return None;
        }

        let mut bindings: Vec<(usize, Binding)> = resolutions.into_iter().collect();
        bindings.sort_by_key(|(id, _)| *id);

        Some(bindings.into_iter().map(|(_, binding)| binding).collect())
    }

    fn parse_program(&mut self, source: &str) -> Vec<Stmt> {
        let tokens = scan_tokens(source, &mut self.diagnostics);

        let mut parser = Parser::new(&tokens).starting_at(self.next_id);
        let statements = parser.parse(&mut self.diagnostics);
        self.next_id = parser.next_id();

        statements
    }
}
