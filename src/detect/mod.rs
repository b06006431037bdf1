//! Detection module: lexical context and the built-in PHP checks.

mod arrays;
mod brackets;
pub mod context;
mod functions;
mod quotes;
mod runner;
mod security;
mod tags;
mod terminator;
mod types;
mod variables;

pub use arrays::{check_arrays, find_separator_gap};
pub use brackets::{check_brackets, closer_for, opener_for};
pub use functions::check_functions;
pub use quotes::{check_quotes, looks_like_query};
pub use runner::{CheckRunner, LineCheck, BUILTIN_CATEGORY};
pub use security::{check_security, SecurityRules};
pub use tags::check_tags;
pub use terminator::check_terminators;
pub use types::{Diagnostic, ErrorKind, DEFAULT_CATEGORY};
pub use variables::{bare_assignments, check_variables, is_constant_name};
