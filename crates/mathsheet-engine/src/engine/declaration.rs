//! Splitting a line into a binding target and a right-hand side.
//!
//! - `expr` binds nothing.
//! - `name = expr` / `name := expr` binds a variable.
//! - `name(a, b) = expr` binds a function; the right-hand side becomes the
//!   closure literal `|a, b| expr`.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use super::desugar::LAMBDA_MARKER;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    Anonymous,
    Variable(String),
    Function { name: String, params: Vec<String> },
}

impl Binding {
    pub fn name(&self) -> Option<&str> {
        match self {
            Binding::Anonymous => None,
            Binding::Variable(name) | Binding::Function { name, .. } => Some(name.as_str()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub binding: Binding,
    /// Expression to evaluate, not yet desugared.
    pub rhs: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Invalid function or variable declaration: {0}")]
    Invalid(String),
    #[error("Incomplete declaration: {0}")]
    Empty(String),
}

fn function_lhs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Za-z][A-Za-z0-9_]*)\s*\(\s*([A-Za-z][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z][A-Za-z0-9_]*)*)\s*\)$",
        )
        .expect("function declaration regex must compile")
    })
}

fn variable_lhs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("variable declaration regex must compile")
    })
}

/// Byte offsets of the assignment operator: (start, end).
///
/// `==`, `!=`, `<=` and `>=` are comparisons, not assignments. String
/// literals are skipped.
fn find_assignment(expr: &str) -> Option<(usize, usize)> {
    let bytes = expr.as_bytes();
    let mut in_string = false;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b':' if bytes.get(i + 1) == Some(&b'=') => return Some((i, i + 2)),
            b'=' => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let comparison = matches!(prev, Some(b'=' | b'!' | b'<' | b'>'))
                    || matches!(next, Some(b'='));
                if !comparison {
                    return Some((i, i + 1));
                }
                if next == Some(b'=') {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `expr` into its binding target and right-hand side.
pub fn parse_declaration(expr: &str) -> Result<Declaration, DeclarationError> {
    let expr = expr.trim();
    let Some((start, end)) = find_assignment(expr) else {
        return Ok(Declaration {
            binding: Binding::Anonymous,
            rhs: expr.to_string(),
        });
    };

    let left = expr[..start].trim();
    let right = expr[end..].trim();
    if left.is_empty() || right.is_empty() {
        return Err(DeclarationError::Empty(expr.to_string()));
    }

    if let Some(caps) = function_lhs_re().captures(left) {
        let params: Vec<String> = caps[2].split(',').map(|p| p.trim().to_string()).collect();
        let rhs = format!("{}{}{} {}", LAMBDA_MARKER, params.join(", "), LAMBDA_MARKER, right);
        return Ok(Declaration {
            binding: Binding::Function {
                name: caps[1].to_string(),
                params,
            },
            rhs,
        });
    }

    if variable_lhs_re().is_match(left) {
        return Ok(Declaration {
            binding: Binding::Variable(left.to_string()),
            rhs: right.to_string(),
        });
    }

    Err(DeclarationError::Invalid(expr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_expression() {
        let d = parse_declaration(" 2 + 3 ").unwrap();
        assert_eq!(d.binding, Binding::Anonymous);
        assert_eq!(d.rhs, "2 + 3");
    }

    #[test]
    fn test_variable_declaration() {
        let d = parse_declaration("rate = 0.2").unwrap();
        assert_eq!(d.binding, Binding::Variable("rate".into()));
        assert_eq!(d.rhs, "0.2");

        let d = parse_declaration("total := a + b").unwrap();
        assert_eq!(d.binding, Binding::Variable("total".into()));
        assert_eq!(d.rhs, "a + b");
    }

    #[test]
    fn test_function_declaration() {
        let d = parse_declaration("f(x,y) = x + y").unwrap();
        assert_eq!(
            d.binding,
            Binding::Function {
                name: "f".into(),
                params: vec!["x".into(), "y".into()],
            }
        );
        assert_eq!(d.rhs, "|x, y| x + y");
    }

    #[test]
    fn test_comparisons_are_not_assignments() {
        for expr in ["a == b", "a != b", "a <= b", "a >= b"] {
            let d = parse_declaration(expr).unwrap();
            assert_eq!(d.binding, Binding::Anonymous, "{expr}");
        }
        let d = parse_declaration("flag = a == b").unwrap();
        assert_eq!(d.binding, Binding::Variable("flag".into()));
        assert_eq!(d.rhs, "a == b");
    }

    #[test]
    fn test_equals_inside_string_is_ignored() {
        let d = parse_declaration(r#""a=b""#).unwrap();
        assert_eq!(d.binding, Binding::Anonymous);
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(matches!(parse_declaration("= 5"), Err(DeclarationError::Empty(_))));
        assert!(matches!(parse_declaration("x ="), Err(DeclarationError::Empty(_))));
        assert!(matches!(parse_declaration("f() = 1"), Err(DeclarationError::Invalid(_))));
        assert!(matches!(parse_declaration("2x = 1"), Err(DeclarationError::Invalid(_))));
        assert!(matches!(parse_declaration("f(x, 1) = x"), Err(DeclarationError::Invalid(_))));
    }
}
