//! Functions, classes and instances: the callable half of the value model.
//!
//! Methods never store `this` as a field.  Binding a method wraps its
//! closure in a one-slot frame holding the receiver, which is exactly the
//! scope the resolver opened for `this` around every method body.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::environment::{self, Env, Environment};
use crate::error::{LoxError, Result};
use crate::interpreter::{Flow, Interpreter};
use crate::token::Symbol;
use crate::value::Value;

/// Name of the method that runs when a class is called.
pub const INITIALIZER: &str = "init";

/// A user-defined function or method together with the frame it closed over.
#[derive(Debug)]
pub struct Function {
    declaration: Rc<FunctionDecl>,

    /// Frame current at definition time; `None` at the global level.
    closure: Option<Env>,

    is_initializer: bool,
}

impl Function {
    pub fn new(declaration: Rc<FunctionDecl>, closure: Option<Env>, is_initializer: bool) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.declaration.name.as_ref().map(|n| n.lexeme.as_str())
    }

    pub fn arity(&self) -> usize {
        self.declaration.arity()
    }

    /// Same declaration, with a fresh frame holding `receiver` at slot 0
    /// between the closure and the body.
    pub fn bind(&self, receiver: Value) -> Function {
        let frame = Environment::new(self.closure.clone());
        frame.borrow_mut().define(receiver);

        Function {
            declaration: Rc::clone(&self.declaration),
            closure: Some(frame),
            is_initializer: self.is_initializer,
        }
    }

    /// Run the body in a new frame whose parent is the closure (not the
    /// caller's frame).  Arity has already been checked by the caller.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!(
            "Calling function '{}' with {} argument(s)",
            self.name().unwrap_or("<anonymous>"),
            arguments.len()
        );

        let frame = Environment::new(self.closure.clone());
        {
            let mut frame = frame.borrow_mut();
            for argument in arguments {
                frame.define(argument);
            }
        }

        let flow = interpreter.execute_block(&self.declaration.body, frame)?;

        if self.is_initializer {
            return self.receiver();
        }

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal | Flow::Break => Value::Nil,
        })
    }

    /// The bound instance of an initializer: slot 0 of its own closure.
    fn receiver(&self) -> Result<Value> {
        self.closure
            .as_ref()
            .and_then(|closure| environment::get_at(closure, 0, 0))
            .ok_or_else(|| LoxError::runtime(0, "Internal error: initializer is not bound."))
    }
}

/// A class: instance methods, an optional superclass and a metaclass whose
/// methods are the class's static (`class`-prefixed) methods.
///
/// A class is itself an instance of its metaclass, so it also carries a
/// field table of its own.
#[derive(Debug)]
pub struct Class {
    name: String,
    superclass: Option<Rc<Class>>,
    methods: HashMap<String, Rc<Function>>,
    metaclass: Option<Rc<Class>>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Class {
    pub fn new(
        name: String,
        superclass: Option<Rc<Class>>,
        methods: HashMap<String, Rc<Function>>,
        metaclass: Option<Rc<Class>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
            metaclass,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metaclass(&self) -> Option<&Rc<Class>> {
        self.metaclass.as_ref()
    }

    /// Own table first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }

        self.superclass.as_ref()?.find_method(name)
    }

    /// Static method lookup; the metaclass chain mirrors the class chain.
    pub fn find_class_method(&self, name: &str) -> Option<Rc<Function>> {
        self.metaclass.as_ref()?.find_method(name)
    }

    /// Property read on the class object: its own fields first, then static
    /// methods bound to the class.
    pub fn get(this: &Rc<Class>, name: &Symbol) -> Result<Value> {
        if let Some(value) = this.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match this.find_class_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(Rc::new(
                method.bind(Value::Class(Rc::clone(this))),
            ))),
            None => Err(LoxError::runtime(
                name.line,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    pub fn set(&self, name: &Symbol, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }

    pub fn clear(&self) {
        self.fields.borrow_mut().clear();
    }

    pub fn arity(&self) -> usize {
        self.find_method(INITIALIZER).map_or(0, |init| init.arity())
    }

    /// Allocate an instance and run `init` on it, if any class in the chain
    /// defines one.  The instance is returned whatever `init` returns.
    pub fn call(self: Rc<Self>, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value> {
        debug!("Instantiating class '{}'", self.name);

        let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(&self))));
        interpreter.track_instance(&instance);

        if let Some(initializer) = self.find_method(INITIALIZER) {
            initializer
                .bind(Value::Instance(Rc::clone(&instance)))
                .call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// An object: its class plus fields created lazily by assignment.
#[derive(Debug)]
pub struct Instance {
    class: Rc<Class>,
    fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    /// Fields shadow methods; a method found on the class is bound to `this`.
    pub fn get(this: &Rc<RefCell<Instance>>, name: &Symbol) -> Result<Value> {
        let instance = this.borrow();

        if let Some(value) = instance.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        match instance.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(Rc::new(
                method.bind(Value::Instance(Rc::clone(this))),
            ))),
            None => Err(LoxError::runtime(
                name.line,
                format!("Undefined property '{}'.", name.lexeme),
            )),
        }
    }

    /// Always writes the instance's own table, even over a method name.
    pub fn set(&mut self, name: &Symbol, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}
