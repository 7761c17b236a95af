pub mod ast;
pub mod config;
pub mod document;
pub mod error;
pub mod loader;
pub mod module;
pub mod parser;
pub mod span;
pub mod stdlib;
pub mod tokenizer;
pub mod tree_walk_interpreter;
