pub mod ast;
pub mod cli;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod utils;
pub mod version;
