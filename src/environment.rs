//! Activation frames and the global table.
//!
//! Locals live in [`Environment`] frames: a slot vector plus a link to the
//! enclosing frame.  The resolver decides every local's `(distance, slot)`
//! up front, so a read is `distance` pointer hops and one index, with no
//! name hashing.  Globals stay name-keyed in [`Globals`] because the REPL
//! may add new ones after earlier code was already resolved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::value::Value;

/// Shared handle to a frame: closures and active calls hold these.
pub type Env = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: Vec<Value>,
    enclosing: Option<Env>,
}

impl Environment {
    /// A frame whose parent is `enclosing` (`None`: directly below the globals).
    pub fn new(enclosing: Option<Env>) -> Env {
        Rc::new(RefCell::new(Environment {
            values: Vec::new(),
            enclosing,
        }))
    }

    /// Append `value` to this frame; returns the slot it landed in.
    pub fn define(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    pub fn get(&self, slot: usize) -> Option<Value> {
        self.values.get(slot).cloned()
    }

    /// Overwrite an existing slot; `false` if it does not exist.
    pub fn set(&mut self, slot: usize, value: Value) -> bool {
        match self.values.get_mut(slot) {
            Some(existing) => {
                *existing = value;
                true
            }
            None => false,
        }
    }

    pub fn enclosing(&self) -> Option<Env> {
        self.enclosing.clone()
    }

    /// Drop every value and the parent link.  Used to break `Rc` cycles
    /// (frame → closure → frame) when the interpreter is torn down.
    pub fn clear(&mut self) {
        self.values.clear();
        self.enclosing = None;
    }
}

/// Walk exactly `distance` parent links up from `env`.
pub fn ancestor(env: &Env, distance: usize) -> Option<Env> {
    let mut current = Rc::clone(env);

    for _ in 0..distance {
        let parent = current.borrow().enclosing()?;
        current = parent;
    }

    Some(current)
}

/// Read the slot the resolver assigned.  `None` means the resolver and the
/// evaluator disagree about the frame layout.
pub fn get_at(env: &Env, distance: usize, slot: usize) -> Option<Value> {
    let frame = ancestor(env, distance)?;
    let value = frame.borrow().get(slot);
    value
}

pub fn assign_at(env: &Env, distance: usize, slot: usize, value: Value) -> bool {
    match ancestor(env, distance) {
        Some(frame) => frame.borrow_mut().set(slot, value),
        None => false,
    }
}

/// The flat, name-keyed global table.
#[derive(Debug, Default)]
pub struct Globals {
    values: HashMap<String, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a global.
    pub fn define(&mut self, name: &str, value: Value) {
        debug!("Defining global '{}'", name);

        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    /// Update an existing global; `false` if it was never defined.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(existing) => {
                *existing = value;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_definition_order() {
        let env = Environment::new(None);
        assert_eq!(env.borrow_mut().define(Value::Number(1.0)), 0);
        assert_eq!(env.borrow_mut().define(Value::Bool(true)), 1);

        assert_eq!(get_at(&env, 0, 0), Some(Value::Number(1.0)));
        assert_eq!(get_at(&env, 0, 1), Some(Value::Bool(true)));
        assert_eq!(get_at(&env, 0, 2), None);
    }

    #[test]
    fn distance_walks_parent_links() {
        let outer = Environment::new(None);
        outer.borrow_mut().define(Value::String("outer".into()));

        let middle = Environment::new(Some(Rc::clone(&outer)));
        middle.borrow_mut().define(Value::Nil);

        let inner = Environment::new(Some(Rc::clone(&middle)));

        assert_eq!(get_at(&inner, 2, 0), Some(Value::String("outer".into())));
        assert!(assign_at(&inner, 2, 0, Value::Number(7.0)));
        assert_eq!(outer.borrow().get(0), Some(Value::Number(7.0)));

        // Past the outermost frame.
        assert_eq!(get_at(&inner, 3, 0), None);
        assert!(!assign_at(&inner, 0, 0, Value::Nil));
    }

    #[test]
    fn shared_frame_mutation_is_visible_to_all_holders() {
        let frame = Environment::new(None);
        frame.borrow_mut().define(Value::Number(0.0));
        let alias = Rc::clone(&frame);

        assign_at(&alias, 0, 0, Value::Number(2.0));

        assert_eq!(get_at(&frame, 0, 0), Some(Value::Number(2.0)));
    }

    #[test]
    fn globals_assign_requires_definition() {
        let mut globals = Globals::new();
        assert!(!globals.assign("a", Value::Nil));
        assert_eq!(globals.get("a"), None);

        globals.define("a", Value::Number(1.0));
        assert!(globals.assign("a", Value::Number(2.0)));
        assert_eq!(globals.get("a"), Some(Value::Number(2.0)));
    }
}
