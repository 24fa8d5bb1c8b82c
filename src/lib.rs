//! yal: a small Lisp interpreter whose every pair, string and closure lives
//! in a fixed-size arena managed by a boundary-tag allocator.

pub mod allocator;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod globals;
pub mod heap;
pub mod lexer;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod symbol;
pub mod value;

pub use config::Config;
pub use error::{YalError, YalResult};
pub use eval::Interpreter;
pub use value::Value;
