//! **Abstract syntax tree** produced by the [`Parser`](crate::parser::Parser)
//! and consumed, read-only, by the resolver, the interpreter and the
//! s-expression printer.
//!
//! Nodes own their data ([`Symbol`] instead of borrowed tokens) so that a
//! function body can outlive the source line it was parsed from; this is what
//! lets a REPL session call a function declared several lines earlier.
//! Function declarations sit behind an `Rc` so runtime function objects share
//! them with the tree instead of copying.

use std::rc::Rc;

use crate::token::Symbol;

/// Identity of a node whose binding the resolver records.  Unique within one
/// session; the resolution table is keyed by it rather than by node address.
pub type NodeId = usize;

/// A **literal constant** that appears directly in the source code.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

/// Parameters and body shared by named functions, methods and `fun` literals.
#[derive(Debug, PartialEq)]
pub struct FunctionDecl {
    /// `None` for anonymous `fun (…) { … }` literals.
    pub name: Option<Symbol>,

    /// Parameter names, in slot order.
    pub params: Vec<Symbol>,

    pub body: Vec<Stmt>,
}

impl FunctionDecl {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Every kind of *expression* in Lox.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralValue),

    /// Prefix `!` / `-`.
    Unary {
        operator: Symbol,
        right: Box<Expr>,
    },

    /// Infix arithmetic, comparison, equality and comma operators.
    Binary {
        left: Box<Expr>,
        operator: Symbol,
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Symbol,
        right: Box<Expr>,
    },

    /// `guard ? then_branch : else_branch`
    Ternary {
        guard: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    Grouping(Box<Expr>),

    Variable {
        id: NodeId,
        name: Symbol,
    },

    Assign {
        id: NodeId,
        name: Symbol,
        value: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        /// The closing `)` token ‑ retained for error reporting.
        paren: Symbol,
        arguments: Vec<Expr>,
    },

    /// object.property
    Get {
        object: Box<Expr>,
        name: Symbol,
    },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Symbol,
        value: Box<Expr>,
    },

    This {
        id: NodeId,
        keyword: Symbol,
    },

    /// `super.method`
    Super {
        id: NodeId,
        keyword: Symbol,
        method: Symbol,
    },

    /// Anonymous `fun (params) { body }`.
    Function(Rc<FunctionDecl>),
}

/// A class declaration: instance methods plus `class`-prefixed static methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Symbol,

    /// Always an [`Expr::Variable`] when present.
    pub superclass: Option<Expr>,

    pub methods: Vec<Rc<FunctionDecl>>,

    pub class_methods: Vec<Rc<FunctionDecl>>,
}

/// **Statements**: complete executable constructs.  A program is a sequence
/// of these returned by [`Parser::parse`](crate::parser::Parser::parse).
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    Var {
        name: Symbol,
        initializer: Option<Expr>,
    },

    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// Also the target `for` loops are desugared into.
    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    Break {
        keyword: Symbol,
    },

    /// Named function declaration; the name is always `Some`.
    Function(Rc<FunctionDecl>),

    Return {
        keyword: Symbol,
        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    Class(ClassDecl),
}
