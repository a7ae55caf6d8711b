pub mod ast;
pub mod ast_printer;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lox;
pub mod object;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod scanner;
mod stack;
pub mod token;
pub mod value;
