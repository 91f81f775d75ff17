//! Rhai engine creation and expression evaluation.
//!
//! The engine is locked down to single expressions: no loops, no statement
//! blocks, no `let`/`fn`/`import`. Worksheet functions are closures stored
//! in ordinary variables; their compiled bodies travel in a function-only
//! library AST that is merged into each evaluation.

use regex::Regex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Scope, AST};
use std::sync::OnceLock;

use super::desugar::map_outside_strings;

/// Upper bound on Rhai operations per evaluation.
pub const MAX_OPERATIONS: u64 = 5_000_000;

const DISABLED_SYMBOLS: &[&str] = &[
    "let", "const", "fn", "import", "export", "return", "throw", "try", "eval", "while", "loop",
    "for", "do", "switch",
];

/// Create a Rhai engine with built-ins registered and statements disabled.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_fast_operators(false);
    engine.set_allow_looping(false);
    engine.set_allow_statement_expression(false);
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 32);
    for symbol in DISABLED_SYMBOLS {
        engine.disable_symbol(*symbol);
    }
    crate::builtins::register_builtins(&mut engine);
    engine
}

fn call_site_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\.?)\b([A-Za-z_][A-Za-z0-9_]*)(\s*)\(").expect("call site regex must compile")
    })
}

/// Rewrite `name(` into `name.call(` for every name that holds a worksheet
/// function. Method calls (`x.name(`) and string contents are left alone.
pub fn bind_function_calls<F>(expr: &str, is_function: F) -> String
where
    F: Fn(&str) -> bool,
{
    map_outside_strings(expr, |segment| {
        call_site_re()
            .replace_all(segment, |caps: &regex::Captures| {
                let name = &caps[2];
                if caps[1].is_empty() && is_function(name) {
                    format!("{}.call(", name)
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    })
}

/// Compile `expr` against `scope` and evaluate it with `library` in reach.
///
/// Returns the value and the compiled AST, whose function definitions the
/// caller folds into its library when the value is a closure.
pub fn eval_expression(
    engine: &Engine,
    scope: &mut Scope,
    expr: &str,
    library: Option<&AST>,
) -> Result<(Dynamic, AST), Box<EvalAltResult>> {
    let ast = engine
        .compile_with_scope(scope, expr)
        .map_err(|e| Box::new(EvalAltResult::ErrorParsing(*e.0, e.1)))?;
    let runnable = match library {
        Some(lib) => lib.clone().merge(&ast),
        None => ast.clone(),
    };
    let value = engine.eval_ast_with_scope::<Dynamic>(scope, &runnable)?;
    Ok((value, ast))
}

/// Merge the function definitions of `ast` into `library`.
pub fn extend_library(library: &mut Option<AST>, ast: &AST) {
    let functions = ast.clone_functions_only();
    *library = Some(match library.take() {
        Some(lib) => lib.merge(&functions),
        None => functions,
    });
}

/// Declared parameter names of the closure behind `ptr`, without the
/// variables it captured.
pub fn closure_params(library: &AST, ptr: &FnPtr) -> Option<Vec<String>> {
    let captured = ptr.curry().len();
    library
        .iter_functions()
        .find(|f| f.name == ptr.fn_name())
        .map(|f| f.params.iter().skip(captured).map(|p| p.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_function_calls() {
        let is_fn = |name: &str| name == "f" || name == "g";
        assert_eq!(bind_function_calls("f(2) + g (3)", is_fn), "f.call(2) + g.call(3)");
        assert_eq!(bind_function_calls("sqrt(f(1))", is_fn), "sqrt(f.call(1))");
        assert_eq!(bind_function_calls("x.f(1)", is_fn), "x.f(1)");
        assert_eq!(bind_function_calls(r#""f(1)" + f(1)"#, is_fn), r#""f(1)" + f.call(1)"#);
        assert_eq!(bind_function_calls("ff(1)", is_fn), "ff(1)");
    }

    #[test]
    fn test_statements_are_rejected() {
        let engine = create_engine();
        let mut scope = Scope::new();
        for expr in ["let x = 1", "while true { 1 }", "fn f() { 1 }", "loop { }"] {
            assert!(eval_expression(&engine, &mut scope, expr, None).is_err(), "{expr}");
        }
    }

    #[test]
    fn test_closure_through_library() {
        let engine = create_engine();
        let mut scope = Scope::new();
        let mut library = None;

        scope.push("k", 10_i64);
        let (f, ast) = eval_expression(&engine, &mut scope, "|x, y| x * y + k", None).unwrap();
        extend_library(&mut library, &ast);
        let ptr = f.clone().cast::<FnPtr>();
        assert_eq!(
            closure_params(library.as_ref().unwrap(), &ptr),
            Some(vec!["x".to_string(), "y".to_string()])
        );

        let mut scope = Scope::new();
        scope.push("f", f);
        let expr = bind_function_calls("f(2, 3)", |n| n == "f");
        let (value, _) = eval_expression(&engine, &mut scope, &expr, library.as_ref()).unwrap();
        assert_eq!(value.as_int().unwrap(), 16);
    }

    #[test]
    fn test_array_closures_still_work() {
        let engine = create_engine();
        let mut scope = Scope::new();
        let expr = "[1, 2, 3].map(|x| x * 2)";
        let (value, _) = eval_expression(&engine, &mut scope, expr, None).unwrap();
        assert_eq!(value.into_array().unwrap().len(), 3);
    }
}
