//! Static resolver pass for the **Lox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String, Local>` tracking
//!    declared / defined / read state and the slot each local occupies).
//! 2. Report static errors (redeclaration, forward‑read in initializer,
//!    misplaced `return` / `break` / `this` / `super`, self‑inheritance) and
//!    unused locals.
//! 3. Tell the interpreter, for *each* local variable occurrence, which frame
//!    (`distance`) and which `slot` holds it.  Anything not recorded is a
//!    global, looked up by name at runtime.
//!
//! Every runtime frame corresponds to exactly one scope pushed here: blocks,
//! function bodies (parameters share the body's frame), the `super` frame a
//! subclass declaration creates, and the `this` frame a bound method gets.
//!
//! Nothing here is fatal.  Diagnostics are pushed into the session's
//! [`Diagnostics`] and the walk continues over the rest of the program.

use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;

use crate::ast::{ClassDecl, Expr, FunctionDecl, NodeId, Stmt};
use crate::error::{Diagnostics, LoxError};
use crate::object::INITIALIZER;
use crate::stack::ensure_sufficient_stack;
use crate::token::Symbol;

/// Where a resolved reference lives at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Identifier as written (`this` / `super` for the synthetic names).
    pub name: String,

    pub line: usize,

    /// Parent links to follow from the current frame.
    pub distance: usize,

    /// Index into that frame's slot vector.
    pub slot: usize,
}

/// Out-of-band resolution table keyed by node identity.
pub type Resolutions = HashMap<NodeId, Binding>;

/// What kind of function body are we in?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
    ClassMethod,
}

/// Are we inside a class body?  Used to validate `this` and `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VarState {
    Declared,
    Defined,
    Read,
}

#[derive(Debug)]
struct Local {
    name: Symbol,
    slot: usize,
    state: VarState,
}

type Scope = HashMap<String, Local>;

/// Resolver: tracks scopes, enforces static rules, and records binding
/// addresses for the interpreter.
pub struct Resolver<'d> {
    scopes: Vec<Scope>,
    resolutions: Resolutions,
    current_function: FunctionKind,
    current_class: ClassKind,
    loop_depth: usize,
    diagnostics: &'d mut Diagnostics,
    deny_unused: bool,
}

impl<'d> Resolver<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        info!("Resolver instantiated");

        Resolver {
            scopes: Vec::new(),
            resolutions: Resolutions::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
            loop_depth: 0,
            diagnostics,
            deny_unused: false,
        }
    }

    /// Report unused locals as errors instead of warnings.
    pub fn deny_unused(mut self, deny: bool) -> Self {
        self.deny_unused = deny;
        self
    }

    /// Walk all top‑level statements and hand back the resolution table.
    pub fn resolve(mut self, statements: &[Stmt]) -> Resolutions {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        self.resolve_stmts(statements);

        info!("Resolved {} local reference(s)", self.resolutions.len());

        self.resolutions
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.resolve_stmt_kind(stmt))
    }

    fn resolve_stmt_kind(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class(class) => self.resolve_class(class),

            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define, so `var a = a;` is caught
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // The name is visible inside its own body, for recursion.
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(decl, FunctionKind::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.loop_depth += 1;
                self.resolve_expr(condition);
                self.resolve_stmt(body);
                self.loop_depth -= 1;
            }

            Stmt::Break { keyword } => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't use 'break' outside of a loop.");
                }
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionKind::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }
        }
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassKind::Class;

        // Declared before the superclass so methods can name their own class.
        self.declare(&class.name);
        self.define(&class.name);

        if let Some(superclass) = &class.superclass {
            if let Expr::Variable { name, .. } = superclass {
                if name.lexeme == class.name.lexeme {
                    self.error(name, "A class can't inherit from itself.");
                }
            }

            self.current_class = ClassKind::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.bind_synthetic("super", &class.name);
        }

        self.begin_scope();
        self.bind_synthetic("this", &class.name);

        for method in &class.methods {
            let kind = match &method.name {
                Some(name) if name.lexeme == INITIALIZER => FunctionKind::Initializer,
                _ => FunctionKind::Method,
            };
            self.resolve_function(method, kind);
        }

        for method in &class.class_methods {
            self.resolve_function(method, FunctionKind::ClassMethod);
        }

        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.resolve_expr_kind(expr))
    }

    fn resolve_expr_kind(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Ternary {
                guard,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(guard);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }

            Expr::Variable { id, name } => {
                let in_own_initializer = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(&name.lexeme))
                    .is_some_and(|local| local.state == VarState::Declared);

                if in_own_initializer {
                    self.error(name, "Can't read local variable in its own initializer.");
                }

                self.resolve_local(*id, name, true);
            }

            Expr::Assign { id, name, value } => {
                // First resolve RHS, then bind LHS; a write is not a use.
                self.resolve_expr(value);
                self.resolve_local(*id, name, false);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassKind::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }

                self.resolve_local(*id, keyword, true);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassKind::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.");
                        return;
                    }
                    ClassKind::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.");
                        return;
                    }
                    ClassKind::Subclass => {}
                }

                self.resolve_local(*id, keyword, true);
            }

            Expr::Function(decl) => self.resolve_function(decl, FunctionKind::Function),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Parameters and body share one scope, mirroring the single frame a
    /// call creates.  Loop depth restarts at zero: a `break` cannot cross a
    /// function boundary.
    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionKind) {
        let enclosing_function = self.current_function;
        let enclosing_loops = self.loop_depth;
        self.current_function = kind;
        self.loop_depth = 0;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.current_function = enclosing_function;
        self.loop_depth = enclosing_loops;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Pop the innermost scope, reporting locals nobody ever read.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        let mut unused: Vec<Local> = scope
            .into_values()
            .filter(|local| local.state != VarState::Read)
            .collect();
        unused.sort_by_key(|local| local.slot);

        for local in unused {
            if self.deny_unused {
                self.error(&local.name, "Local variable is not used.");
            } else {
                self.diagnostics
                    .warning(&local.name, "Local variable is not used.");
            }
        }
    }

    /// Add `name` to the innermost scope at the next free slot.  At global
    /// level this is a no-op: globals are late-bound by name.
    fn declare(&mut self, name: &Symbol) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.contains_key(&name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }

        let slot = scope.len();
        scope.insert(
            name.lexeme.clone(),
            Local {
                name: name.clone(),
                slot,
                state: VarState::Declared,
            },
        );
    }

    fn define(&mut self, name: &Symbol) {
        if let Some(local) = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.get_mut(&name.lexeme))
        {
            if local.state == VarState::Declared {
                local.state = VarState::Defined;
            }
        }
    }

    /// Bind `this` / `super` at slot 0 of a fresh scope.  Pre-marked read so
    /// a method that never uses them is not reported.
    fn bind_synthetic(&mut self, name: &str, class_name: &Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Local {
                    name: Symbol::identifier(name, class_name.line),
                    slot: 0,
                    state: VarState::Read,
                },
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑address helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at `(distance, slot)`, or leave it
    /// unrecorded (global) if no scope declares it.
    fn resolve_local(&mut self, id: NodeId, name: &Symbol, is_read: bool) {
        for (distance, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(local) = scope.get_mut(&name.lexeme) {
                if is_read {
                    local.state = VarState::Read;
                }

                debug!(
                    "Resolved '{}' at distance {} slot {}",
                    name.lexeme, distance, local.slot
                );

                self.resolutions.insert(
                    id,
                    Binding {
                        name: name.lexeme.clone(),
                        line: name.line,
                        distance,
                        slot: local.slot,
                    },
                );
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }

    fn error(&mut self, at: &Symbol, message: &str) {
        self.diagnostics.error(LoxError::resolve(at, message));
    }
}
