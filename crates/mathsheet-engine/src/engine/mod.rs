//! Worksheet engine API.
//!
//! This module provides the computation engine behind a worksheet line:
//!
//! - [`desugar`] - Rewrite worksheet shorthand into plain Rhai expressions
//! - [`parse_declaration`] - Split `name = expr` / `f(x) = expr` lines
//! - [`create_engine`] - Create a restricted Rhai engine with built-ins
//! - [`eval_expression`] - Evaluate against a scope and a function library
//! - [`Value`] - Typed view of an evaluation result
//! - [`render`] / [`apply_format`] - Format values for display

pub mod arith;
pub mod calendar;
mod declaration;
pub mod desugar;
mod eval;
pub mod format;
pub mod fraction;
pub mod value;

pub use declaration::{Binding, Declaration, DeclarationError, parse_declaration};
pub use desugar::{CURRENT_STACK_VAR, DesugarOptions, LAST_ANSWER_VAR, REWRITE_RULES, desugar};
pub use eval::{
    MAX_OPERATIONS, bind_function_calls, closure_params, create_engine, eval_expression,
    extend_library,
};
pub use format::{RenderOptions, apply_format, format_number, render};
pub use fraction::Fraction;
pub use value::{Callable, Value};

pub use crate::builtins::{constants, stack_at};
pub use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, FnPtr, Position, Scope};
