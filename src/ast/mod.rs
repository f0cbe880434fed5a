pub mod nodes;

pub use nodes::{ANON_EXPR_NAME, BinaryOp, Expr, FunctionDefinition, Item, Program, Prototype};
