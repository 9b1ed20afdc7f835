//! Front end for analysis programs: tokens, syntax tree and parser.
//!
//! The validator and the sandbox executor share this front end, so a program
//! that passes the syntax check is exactly a program the executor can load.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, Program, Stmt, StmtKind};
pub use error::ParseError;
pub use parser::{parse, parse_expression};
