//! Tree‑walking evaluator.
//!
//! Locals are addressed through the resolver's table: a variable node's id
//! maps to `(distance, slot)` and the read is a walk up `distance` frames
//! plus one index.  Unresolved names go to the global table.
//!
//! `return` and `break` are not errors.  Statement execution yields a
//! [`Flow`] that every statement handler forwards until the one construct
//! allowed to consume it (the nearest call for `Return`, the nearest loop for
//! `Break`).  Runtime errors travel separately as `Err(LoxError::Runtime)`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::{Rc, Weak};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use log::{debug, info};

use crate::ast::{ClassDecl, Expr, FunctionDecl, LiteralValue, NodeId, Stmt};
use crate::environment::{self, Env, Environment, Globals};
use crate::error::{LoxError, Result};
use crate::object::{Class, Function, Instance, INITIALIZER};
use crate::resolver::{Binding, Resolutions};
use crate::stack::ensure_sufficient_stack;
use crate::token::{Symbol, TokenType};
use crate::value::Value;

/// Default limit on nested calls before "Stack overflow." is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 2048;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub struct Interpreter {
    globals: Globals,

    /// Innermost local frame; `None` while executing top-level code.
    environment: Option<Env>,

    locals: Resolutions,
    out: Box<dyn Write>,
    call_depth: usize,
    max_call_depth: usize,

    // Weak handles used to break `Rc` cycles on drop.
    captured_frames: Vec<Weak<RefCell<Environment>>>,
    instances: Vec<Weak<RefCell<Instance>>>,
    classes: Vec<Weak<Class>>,
}

fn clock(_args: &[Value]) -> std::result::Result<Value, String> {
    debug!("Calling native function 'clock'");

    let timestamp: f64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e: SystemTimeError| format!("Clock error: {}", e))?
        .as_secs_f64();

    Ok(Value::Number(timestamp))
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a new Interpreter printing to stdout, with `clock` defined.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Creates a new Interpreter whose `print` statements write to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let mut globals = Globals::new();

        debug!("Defining native function 'clock'");

        globals.define(
            "clock",
            Value::NativeFunction {
                name: "clock",
                arity: 0,
                func: clock,
            },
        );

        Self {
            globals,
            environment: None,
            locals: Resolutions::new(),
            out,
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            captured_frames: Vec::new(),
            instances: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Merge a resolver pass into the table.  Node ids are unique per
    /// session, so entries from earlier REPL lines stay valid.
    pub fn resolve(&mut self, resolutions: Resolutions) {
        debug!("Adding {} resolved reference(s)", resolutions.len());

        self.locals.extend(resolutions);
    }

    /// Interprets a list of statements (a "program").  Stops at the first
    /// runtime error; globals defined before it are kept.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        // A previous unit may have failed mid-call.
        self.environment = None;
        self.call_depth = 0;

        for stmt in statements {
            if let Flow::Break | Flow::Return(_) = self.execute(stmt)? {
                debug!("Control signal escaped to top level; ignoring");
            }
        }

        self.out.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        ensure_sufficient_stack(|| self.execute_stmt(stmt))
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
                debug!("Printed value: {}", value);
                Ok(Flow::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.define(name, value);
                Ok(Flow::Normal)
            }

            Stmt::Block(statements) => {
                let frame = Environment::new(self.environment.clone());
                self.execute_block(statements, frame)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Break { .. } => Ok(Flow::Break),

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                Ok(Flow::Return(value))
            }

            Stmt::Function(decl) => {
                let function = self.make_function(decl, false);
                if let Some(name) = &decl.name {
                    debug!("Defining function '{}'", name.lexeme);
                    self.define(name, Value::Function(Rc::new(function)));
                }
                Ok(Flow::Normal)
            }

            Stmt::Class(class) => {
                self.declare_class(class)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Run `statements` with `frame` as the current environment, restoring
    /// the previous one afterwards on every exit path.
    pub fn execute_block(&mut self, statements: &[Stmt], frame: Env) -> Result<Flow> {
        let previous = self.environment.replace(frame);

        let mut outcome = Ok(Flow::Normal);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    outcome = other;
                    break;
                }
            }
        }

        self.environment = previous;
        outcome
    }

    /// Bind a declaration in the current frame (next slot) or, at top level,
    /// in the global table.
    fn define(&mut self, name: &Symbol, value: Value) {
        match &self.environment {
            Some(env) => {
                env.borrow_mut().define(value);
            }
            None => self.globals.define(&name.lexeme, value),
        }
    }

    fn make_function(&mut self, decl: &Rc<FunctionDecl>, is_initializer: bool) -> Function {
        if let Some(env) = &self.environment {
            let env = Rc::clone(env);
            self.track_frame(&env);
        }

        Function::new(Rc::clone(decl), self.environment.clone(), is_initializer)
    }

    fn declare_class(&mut self, class: &ClassDecl) -> Result<()> {
        debug!("Declaring class '{}'", class.name.lexeme);

        // Reserve the class's own slot before anything else is defined, so
        // it lands where the resolver put it.
        let slot = match &self.environment {
            Some(env) => Some(env.borrow_mut().define(Value::Nil)),
            None => {
                self.globals.define(&class.name.lexeme, Value::Nil);
                None
            }
        };

        let superclass = match &class.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(superclass) => Some(superclass),
                _ => {
                    let line = match expr {
                        Expr::Variable { name, .. } => name.line,
                        _ => class.name.line,
                    };
                    return Err(LoxError::runtime(line, "Superclass must be a class."));
                }
            },
            None => None,
        };

        // Methods close over a frame holding `super` when there is one.
        let enclosing = self.environment.clone();
        if let Some(superclass) = &superclass {
            let frame = Environment::new(self.environment.clone());
            frame
                .borrow_mut()
                .define(Value::Class(Rc::clone(superclass)));
            self.environment = Some(frame);
        }

        let class_methods = self.method_table(&class.class_methods, false);
        let methods = self.method_table(&class.methods, true);

        self.environment = enclosing;

        let metaclass = Class::new(
            format!("{} metaclass", class.name.lexeme),
            superclass.as_ref().and_then(|s| s.metaclass().cloned()),
            class_methods,
            None,
        );

        let runtime_class = Rc::new(Class::new(
            class.name.lexeme.clone(),
            superclass,
            methods,
            Some(Rc::new(metaclass)),
        ));
        prune(&mut self.classes);
        self.classes.push(Rc::downgrade(&runtime_class));
        let value = Value::Class(runtime_class);

        match (slot, &self.environment) {
            (Some(slot), Some(env)) => {
                env.borrow_mut().set(slot, value);
            }
            _ => self.globals.define(&class.name.lexeme, value),
        }

        Ok(())
    }

    fn method_table(
        &mut self,
        decls: &[Rc<FunctionDecl>],
        marks_initializer: bool,
    ) -> HashMap<String, Rc<Function>> {
        decls
            .iter()
            .filter_map(|decl| {
                let name = decl.name.as_ref()?.lexeme.clone();
                let is_initializer = marks_initializer && name == INITIALIZER;
                Some((name, Rc::new(self.make_function(decl, is_initializer))))
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_expr(expr))
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate(left)?;
                let short_circuits = if operator.token_type == TokenType::OR {
                    left_val.is_truthy()
                } else {
                    !left_val.is_truthy()
                };

                if short_circuits {
                    Ok(left_val)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Ternary {
                guard,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(guard)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            Expr::Variable { id, name } => self.look_up(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                self.assign(*id, name, value.clone())?;
                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_val = self.evaluate(callee)?;
                let mut arg_values = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    arg_values.push(self.evaluate(arg)?);
                }
                self.call_value(callee_val, paren, arg_values)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Instance::get(&instance, name),
                Value::Class(class) => Class::get(&class, name),
                _ => Err(LoxError::runtime(
                    name.line,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let target = self.evaluate(object)?;
                if !matches!(target, Value::Instance(_) | Value::Class(_)) {
                    return Err(LoxError::runtime(name.line, "Only instances have fields."));
                }

                let value = self.evaluate(value)?;
                match target {
                    Value::Instance(instance) => instance.borrow_mut().set(name, value.clone()),
                    Value::Class(class) => class.set(name, value.clone()),
                    _ => {}
                }
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),

            Expr::Function(decl) => Ok(Value::Function(Rc::new(self.make_function(decl, false)))),
        }
    }

    fn evaluate_unary(&mut self, op: &Symbol, expr: &Expr) -> Result<Value> {
        let right_val = self.evaluate(expr)?;

        match op.token_type {
            TokenType::MINUS => match right_val {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(op.line, "Operand must be a number.")),
            },
            TokenType::BANG => Ok(Value::Bool(!right_val.is_truthy())),
            _ => Err(LoxError::runtime(op.line, "Invalid unary operator.")),
        }
    }

    /// Both operands are always evaluated, left first, before the operator
    /// is applied.
    fn evaluate_binary(&mut self, left: &Expr, op: &Symbol, right: &Expr) -> Result<Value> {
        let left_val = self.evaluate(left)?;
        let right_val = self.evaluate(right)?;

        debug!(
            "Binary '{}': left={}, right={}",
            op.lexeme, left_val, right_val
        );

        let numbers = || match (&left_val, &right_val) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(LoxError::runtime(op.line, "Operands must be numbers.")),
        };

        match op.token_type {
            TokenType::PLUS => match (&left_val, &right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Ok(Value::String(format!("{}{}", left_val, right_val)))
                }
                _ => Err(LoxError::runtime(op.line, "Operands must be numbers.")),
            },
            TokenType::MINUS => numbers().map(|(a, b)| Value::Number(a - b)),
            TokenType::STAR => numbers().map(|(a, b)| Value::Number(a * b)),
            TokenType::SLASH => {
                let (a, b) = numbers()?;
                if b == 0.0 {
                    return Err(LoxError::runtime(op.line, "Invalid 0 operand."));
                }
                Ok(Value::Number(a / b))
            }
            TokenType::GREATER => numbers().map(|(a, b)| Value::Bool(a > b)),
            TokenType::GREATER_EQUAL => numbers().map(|(a, b)| Value::Bool(a >= b)),
            TokenType::LESS => numbers().map(|(a, b)| Value::Bool(a < b)),
            TokenType::LESS_EQUAL => numbers().map(|(a, b)| Value::Bool(a <= b)),
            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_val == right_val)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left_val != right_val)),
            TokenType::COMMA => Ok(right_val),
            _ => Err(LoxError::runtime(op.line, "Invalid binary operator.")),
        }
    }

    fn evaluate_super(&mut self, id: NodeId, keyword: &Symbol, method: &Symbol) -> Result<Value> {
        let binding = self.binding(id, keyword)?;

        let superclass = self.local_at(binding.distance, binding.slot, keyword)?;
        // `this` lives in the frame just inside the one holding `super`.
        let receiver = self.local_at(binding.distance.saturating_sub(1), 0, keyword)?;

        let Value::Class(superclass) = superclass else {
            return Err(LoxError::runtime(
                keyword.line,
                "Internal error: 'super' is not a class.",
            ));
        };

        let found = match receiver {
            Value::Class(_) => superclass.find_class_method(&method.lexeme),
            _ => superclass.find_method(&method.lexeme),
        };

        match found {
            Some(function) => Ok(Value::Function(Rc::new(function.bind(receiver)))),
            None => Err(LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Variables
    // ─────────────────────────────────────────────────────────────────────────

    fn binding(&self, id: NodeId, name: &Symbol) -> Result<Binding> {
        self.locals.get(&id).cloned().ok_or_else(|| {
            LoxError::runtime(
                name.line,
                format!("Internal error: '{}' was never resolved.", name.lexeme),
            )
        })
    }

    fn local_at(&self, distance: usize, slot: usize, name: &Symbol) -> Result<Value> {
        self.environment
            .as_ref()
            .and_then(|env| environment::get_at(env, distance, slot))
            .ok_or_else(|| LoxError::runtime(name.line, "Internal error: unresolved slot."))
    }

    fn look_up(&self, id: NodeId, name: &Symbol) -> Result<Value> {
        match self.locals.get(&id) {
            Some(binding) => self.local_at(binding.distance, binding.slot, name),
            None => self.globals.get(&name.lexeme).ok_or_else(|| {
                LoxError::runtime(
                    name.line,
                    format!("Undefined variable '{}'.", name.lexeme),
                )
            }),
        }
    }

    fn assign(&mut self, id: NodeId, name: &Symbol, value: Value) -> Result<()> {
        let assigned = match self.locals.get(&id) {
            Some(binding) => self.environment.as_ref().is_some_and(|env| {
                environment::assign_at(env, binding.distance, binding.slot, value)
            }),
            None => {
                if self.globals.assign(&name.lexeme, value) {
                    true
                } else {
                    return Err(LoxError::runtime(
                        name.line,
                        format!("Undefined variable '{}'.", name.lexeme),
                    ));
                }
            }
        };

        if assigned {
            Ok(())
        } else {
            Err(LoxError::runtime(name.line, "Internal error: unresolved slot."))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Invokes a callable (native, user function or class).
    fn call_value(&mut self, callee: Value, paren: &Symbol, args: Vec<Value>) -> Result<Value> {
        let arity = match &callee {
            Value::NativeFunction { arity, .. } => *arity,
            Value::Function(function) => function.arity(),
            Value::Class(class) => class.arity(),
            _ => {
                return Err(LoxError::runtime(
                    paren.line,
                    "Can only call functions and classes.",
                ))
            }
        };

        if args.len() != arity {
            return Err(LoxError::runtime(
                paren.line,
                format!("Expected {} arguments but got {}.", arity, args.len()),
            ));
        }

        if self.call_depth >= self.max_call_depth {
            return Err(LoxError::runtime(paren.line, "Stack overflow."));
        }

        self.call_depth += 1;
        let result = match callee {
            Value::NativeFunction { func, .. } => {
                func(&args).map_err(|msg| LoxError::runtime(paren.line, msg))
            }
            Value::Function(function) => function.call(self, args),
            Value::Class(class) => class.call(self, args),
            _ => unreachable!("arity check rejected non-callables"),
        };
        self.call_depth -= 1;

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cycle teardown bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    fn track_frame(&mut self, frame: &Env) {
        if self
            .captured_frames
            .last()
            .is_some_and(|last| last.as_ptr() == Rc::as_ptr(frame))
        {
            return;
        }

        prune(&mut self.captured_frames);
        self.captured_frames.push(Rc::downgrade(frame));
    }

    pub(crate) fn track_instance(&mut self, instance: &Rc<RefCell<Instance>>) {
        prune(&mut self.instances);
        self.instances.push(Rc::downgrade(instance));
    }
}

/// Drop dead entries once the list reaches a power of two, keeping the
/// amortised cost per push constant.
fn prune<T>(list: &mut Vec<Weak<T>>) {
    if list.len() >= 64 && list.len().is_power_of_two() {
        list.retain(|weak| weak.strong_count() > 0);
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        debug!(
            "Tearing down {} captured frame(s), {} instance(s) and {} class(es)",
            self.captured_frames.len(),
            self.instances.len(),
            self.classes.len()
        );

        for frame in self.captured_frames.drain(..) {
            if let Some(frame) = frame.upgrade() {
                frame.borrow_mut().clear();
            }
        }

        for instance in self.instances.drain(..) {
            if let Some(instance) = instance.upgrade() {
                instance.borrow_mut().clear();
            }
        }

        for class in self.classes.drain(..) {
            if let Some(class) = class.upgrade() {
                class.clear();
            }
        }

        self.globals.clear();
    }
}
