//! Worksheet notation to Rhai expression rewriting.
//!
//! Desugaring is an ordered list of independent text rewrites
//! ([`REWRITE_RULES`]). Each rule scans the whole expression once, left to
//! right, and its output is the input of the next rule. Text inside string
//! literals is never touched.
//!
//! | rule         | input             | output                               |
//! |--------------|-------------------|--------------------------------------|
//! | factorial    | `5!`              | `factorial(5)`                       |
//! | symbols      | `2×3²`            | `2*3**2`                             |
//! | roots        | `√(a+b)`          | `(a+b)**(1/2)`                       |
//! | percent-of   | `50 * 10%`        | `50 *(10/100)`                       |
//! | percent-step | `100 + 10%`       | `100 *(1+10/100)`                    |
//! | ratio        | `3:4`             | `Fraction(3, 4)`                     |
//! | decimal      | `::0.6667`        | `approximate(Fraction("0.6667"))`    |
//! | clock        | `today`           | `date(2024, 1, 31)`                  |
//! | durations    | `2 weeks`         | `weeks(2)`                           |
//! | units        | `5 kg`            | `5 * unit("kg")`                     |
//! | stack        | `@2 + @@ + @`     | `stack_at(_stack, 2) + _stack + ans` |

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::trace;

use crate::units;

/// Name the current stack is bound to during evaluation.
pub const CURRENT_STACK_VAR: &str = "_stack";
/// Name of the last-answer pseudo-variable.
pub const LAST_ANSWER_VAR: &str = "ans";
/// First character of an anonymous-function literal.
pub const LAMBDA_MARKER: char = '|';

#[derive(Clone, Copy, Debug)]
pub struct DesugarOptions {
    /// Reference clock for `today` and `now`.
    pub now: NaiveDateTime,
    /// Substitute bare unit symbols with quantities.
    pub natural_units: bool,
}

impl Default for DesugarOptions {
    fn default() -> Self {
        DesugarOptions {
            now: Local::now().naive_local(),
            natural_units: false,
        }
    }
}

impl DesugarOptions {
    pub fn at(now: NaiveDateTime) -> Self {
        DesugarOptions {
            now,
            natural_units: false,
        }
    }
}

pub struct RewriteRule {
    pub name: &'static str,
    /// A sample input and what this rule alone turns it into.
    pub example: (&'static str, &'static str),
    rewrite: fn(&str, &DesugarOptions) -> String,
}

impl RewriteRule {
    pub fn apply(&self, expr: &str, options: &DesugarOptions) -> String {
        (self.rewrite)(expr, options)
    }
}

pub const REWRITE_RULES: &[RewriteRule] = &[
    RewriteRule {
        name: "factorial",
        example: ("n! + 5! - (a != b)", "factorial(n) + factorial(5) - (a != b)"),
        rewrite: rewrite_factorial,
    },
    RewriteRule {
        name: "symbols",
        example: ("6 ÷ 2 × 3⋅x² + 2¹⁰", "6 / 2 * 3*x**2 + 2**10"),
        rewrite: rewrite_symbols,
    },
    RewriteRule {
        name: "roots",
        example: ("√16 + ∛(a + (b)) + ∜x", "(16)**(1/2) + (a + (b))**(1/3) + (x)**(1/4)"),
        rewrite: rewrite_roots,
    },
    RewriteRule {
        name: "percent-of",
        example: ("50 * 10% / 4%", "50 *(10/100) /(4/100)"),
        rewrite: rewrite_percent_of,
    },
    RewriteRule {
        name: "percent-step",
        example: ("100 + 10% - 5%", "100 *(1+10/100) *(1-5/100)"),
        rewrite: rewrite_percent_step,
    },
    RewriteRule {
        name: "ratio",
        example: ("3:4 + x", "Fraction(3, 4) + x"),
        rewrite: rewrite_ratio,
    },
    RewriteRule {
        name: "decimal",
        example: (":::0.5 + ::0.6667", "Fraction(\"0.5\") + approximate(Fraction(\"0.6667\"))"),
        rewrite: rewrite_decimal_fraction,
    },
    RewriteRule {
        name: "clock",
        example: ("today - NOW", "date(2024, 1, 31) - datetime(2024, 1, 31, 9, 30, 0)"),
        rewrite: rewrite_clock,
    },
    RewriteRule {
        name: "durations",
        example: (
            "1 Month + 2 weeks + 1.5 hours + 10 sec",
            "months(1) + weeks(2) + hours(1.5) + seconds(10)",
        ),
        rewrite: rewrite_durations,
    },
    RewriteRule {
        name: "units",
        example: (
            "5 kg + 300 g + mass * m",
            "(5 * unit(\"kg\")) + (300 * unit(\"g\")) + mass * unit(\"m\")",
        ),
        rewrite: rewrite_units,
    },
    RewriteRule {
        name: "stack",
        example: ("@2 + sum(@@) + @", "stack_at(_stack, 2) + sum(_stack) + ans"),
        rewrite: rewrite_stack,
    },
];

/// Rewrite worksheet notation into an expression Rhai can compile.
pub fn desugar(expr: &str, options: &DesugarOptions) -> String {
    let out = REWRITE_RULES
        .iter()
        .fold(expr.trim().to_string(), |acc, rule| rule.apply(&acc, options));
    trace!(input = expr, output = %out, "desugared");
    out
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("desugar regex must compile"))
}

/// Apply `f` to every part of `script` that is not inside a string literal.
pub(crate) fn map_outside_strings(script: &str, mut f: impl FnMut(&str) -> String) -> String {
    let bytes = script.as_bytes();
    let mut out = String::new();
    let mut seg_start = 0;
    let mut in_string = false;
    let mut backslashes = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                backslashes += 1;
                i += 1;
                continue;
            }
            if b == b'"' && backslashes.is_multiple_of(2) {
                out.push_str(&script[seg_start..=i]);
                in_string = false;
                seg_start = i + 1;
            }
            backslashes = 0;
            i += 1;
            continue;
        }

        if b == b'"' {
            out.push_str(&f(&script[seg_start..i]));
            in_string = true;
            seg_start = i;
            backslashes = 0;
        }
        i += 1;
    }

    if seg_start < script.len() {
        if in_string {
            out.push_str(&script[seg_start..]);
        } else {
            out.push_str(&f(&script[seg_start..]));
        }
    }
    out
}

fn rewrite_factorial(expr: &str, _: &DesugarOptions) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"([0-9A-Za-z_]+)!");
    map_outside_strings(expr, |seg| {
        re.replace_all(seg, |caps: &Captures| {
            let end = caps.get(0).map_or(0, |m| m.end());
            // `a!=b` is a comparison.
            if seg[end..].starts_with('=') {
                caps[0].to_string()
            } else {
                format!("factorial({})", &caps[1])
            }
        })
        .to_string()
    })
}

fn superscript_digit(c: char) -> Option<char> {
    let digit = match c {
        '⁰' => '0',
        '¹' => '1',
        '²' => '2',
        '³' => '3',
        '⁴' => '4',
        '⁵' => '5',
        '⁶' => '6',
        '⁷' => '7',
        '⁸' => '8',
        '⁹' => '9',
        _ => return None,
    };
    Some(digit)
}

fn rewrite_symbols(expr: &str, _: &DesugarOptions) -> String {
    map_outside_strings(expr, |seg| {
        let mut out = String::with_capacity(seg.len());
        let mut chars = seg.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '÷' => out.push('/'),
                '×' | '⋅' | '·' => out.push('*'),
                '⁻' if chars.peek().and_then(|&n| superscript_digit(n)).is_some() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().and_then(|&n| superscript_digit(n)) {
                        digits.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("**(-{})", digits));
                }
                c if superscript_digit(c).is_some() => {
                    out.push_str("**");
                    out.push(superscript_digit(c).unwrap_or('0'));
                    while let Some(d) = chars.peek().and_then(|&n| superscript_digit(n)) {
                        out.push(d);
                        chars.next();
                    }
                }
                c => out.push(c),
            }
        }
        out
    })
}

/// Index just past the parenthesis closing the one at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn rewrite_roots(expr: &str, _: &DesugarOptions) -> String {
    map_outside_strings(expr, |seg| {
        let mut out = String::with_capacity(seg.len());
        let mut rest = seg;
        while let Some((pos, symbol)) = rest.char_indices().find(|(_, c)| matches!(c, '√' | '∛' | '∜')) {
            let degree = match symbol {
                '√' => 2,
                '∛' => 3,
                _ => 4,
            };
            out.push_str(&rest[..pos]);
            let after = &rest[pos + symbol.len_utf8()..];

            let operand_len = if after.starts_with('(') {
                matching_paren(after, 0)
            } else {
                let len = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(after.len());
                (len > 0).then_some(len)
            };

            match operand_len {
                Some(len) => {
                    let operand = &after[..len];
                    let inner = if operand.starts_with('(') {
                        &operand[1..operand.len() - 1]
                    } else {
                        operand
                    };
                    out.push_str(&format!("({})**(1/{})", inner, degree));
                    rest = &after[len..];
                }
                None => {
                    out.push(symbol);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    })
}

fn rewrite_percent_of(expr: &str, _: &DesugarOptions) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"([*/])\s*([0-9.A-Za-z_]+)%");
    map_outside_strings(expr, |seg| re.replace_all(seg, "$1($2/100)").to_string())
}

/// `true` when a `+`/`-` at `pos` has no left operand.
fn is_unary_sign(text: &str, pos: usize) -> bool {
    match text[..pos].trim_end().chars().last() {
        None => true,
        Some(c) => matches!(c, '(' | ',' | '[' | '+' | '-' | '*' | '/' | '=' | '<' | '>' | '!' | '&' | '|' | '^'),
    }
}

fn rewrite_percent_step(expr: &str, _: &DesugarOptions) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"([+-])\s*([0-9.A-Za-z_]+)%");
    map_outside_strings(expr, |seg| {
        re.replace_all(seg, |caps: &Captures| {
            let start = caps.get(0).map_or(0, |m| m.start());
            if is_unary_sign(seg, start) {
                format!("({}{}/100)", &caps[1], &caps[2])
            } else {
                format!("*(1{}{}/100)", &caps[1], &caps[2])
            }
        })
        .to_string()
    })
}

fn rewrite_ratio(expr: &str, _: &DesugarOptions) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&RE, r"\b(\d+):(\d+)\b");
    map_outside_strings(expr, |seg| re.replace_all(seg, "Fraction($1, $2)").to_string())
}

fn rewrite_decimal_fraction(expr: &str, _: &DesugarOptions) -> String {
    static EXACT: OnceLock<Regex> = OnceLock::new();
    static APPROX: OnceLock<Regex> = OnceLock::new();
    let exact = regex(&EXACT, r":::([0-9.]+)");
    let approx = regex(&APPROX, r"::([0-9.]+)");
    let exact_done = map_outside_strings(expr, |seg| {
        exact.replace_all(seg, r#"Fraction("$1")"#).to_string()
    });
    map_outside_strings(&exact_done, |seg| {
        approx
            .replace_all(seg, r#"approximate(Fraction("$1"))"#)
            .to_string()
    })
}

fn rewrite_clock(expr: &str, options: &DesugarOptions) -> String {
    static TODAY: OnceLock<Regex> = OnceLock::new();
    static NOW: OnceLock<Regex> = OnceLock::new();
    let today = regex(&TODAY, r"(?i)\btoday\b");
    let now = regex(&NOW, r"(?i)\bnow\b");

    let t = options.now;
    let date = format!("date({}, {}, {})", t.year(), t.month(), t.day());
    let datetime = format!(
        "datetime({}, {}, {}, {}, {}, {})",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    );
    map_outside_strings(expr, |seg| {
        let seg = today.replace_all(seg, date.as_str());
        now.replace_all(&seg, datetime.as_str()).to_string()
    })
}

/// (constructor, pattern) for the duration words, fixed spans first.
const DURATION_WORDS: &[(&str, &str)] = &[
    ("seconds", r"(?i)\b(\d+(?:\.\d+)?)\s*(?:seconds?|secs?)\b"),
    ("minutes", r"(?i)\b(\d+(?:\.\d+)?)\s*(?:minutes?|mins?)\b"),
    ("hours", r"(?i)\b(\d+(?:\.\d+)?)\s*(?:hours?|hrs?)\b"),
    ("days", r"(?i)\b(\d+(?:\.\d+)?)\s*days?\b"),
    ("weeks", r"(?i)\b(\d+(?:\.\d+)?)\s*weeks?\b"),
    ("months", r"(?i)\b(\d+)\s*months?\b"),
    ("years", r"(?i)\b(\d+)\s*(?:years?|yrs?)\b"),
];

fn duration_res() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        DURATION_WORDS
            .iter()
            .map(|(ctor, pattern)| {
                (*ctor, Regex::new(pattern).expect("duration regex must compile"))
            })
            .collect()
    })
}

fn rewrite_durations(expr: &str, _: &DesugarOptions) -> String {
    map_outside_strings(expr, |seg| {
        duration_res().iter().fold(seg.to_string(), |acc, (ctor, re)| {
            re.replace_all(&acc, format!("{}($1)", ctor).as_str()).to_string()
        })
    })
}

fn rewrite_units(expr: &str, options: &DesugarOptions) -> String {
    // Lambda parameters may shadow unit symbols.
    if !options.natural_units || expr.starts_with(LAMBDA_MARKER) {
        return expr.to_string();
    }
    // A number and its unit form one operand: `100 km / 2 h` divides by hours.
    let literal = units::quantity_literal_re();
    let expr = map_outside_strings(expr, |seg| {
        literal
            .replace_all(seg, |caps: &Captures| {
                let end = caps.get(0).map_or(0, |m| m.end());
                if seg[end..].starts_with('(') {
                    return caps[0].to_string();
                }
                format!("({} * unit(\"{}\"))", &caps[1], &caps[2])
            })
            .to_string()
    });

    let re = units::unit_token_re();
    map_outside_strings(&expr, |seg| {
        re.replace_all(seg, |caps: &Captures| {
            let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
            let before = seg[..start].chars().last();
            let after = seg[end..].chars().next();
            // Method calls and function calls keep their names.
            if before == Some('.') || after == Some('(') {
                return caps[0].to_string();
            }
            let quantity = format!("unit(\"{}\")", &caps[1]);
            let prefix = seg[..start].trim_end();
            match prefix.chars().last() {
                Some(c) if c.is_ascii_digit() || c == ')' || c == '.' => {
                    let spacing = &seg[prefix.len()..start];
                    if spacing.is_empty() {
                        format!(" * {}", quantity)
                    } else {
                        format!("* {}", quantity)
                    }
                }
                _ => quantity,
            }
        })
        .to_string()
    })
}

fn rewrite_stack(expr: &str, _: &DesugarOptions) -> String {
    static NTH: OnceLock<Regex> = OnceLock::new();
    let nth = regex(&NTH, r"@(\d+)");
    map_outside_strings(expr, |seg| {
        // Indexes past i64 are out of range anyway; saturate so the call still resolves.
        let seg = nth.replace_all(seg, |caps: &Captures| {
            let n = caps[1].parse::<i64>().unwrap_or(i64::MAX);
            format!("stack_at({}, {})", CURRENT_STACK_VAR, n)
        });
        seg.replace("@@", CURRENT_STACK_VAR)
            .replace('@', LAST_ANSWER_VAR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn options() -> DesugarOptions {
        let now = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        DesugarOptions {
            now,
            natural_units: true,
        }
    }

    fn rule(name: &str) -> &'static RewriteRule {
        REWRITE_RULES.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_every_rule_matches_its_example() {
        for rule in REWRITE_RULES {
            let (input, expected) = rule.example;
            assert_eq!(rule.apply(input, &options()), expected, "rule {}", rule.name);
        }
    }

    #[test]
    fn test_factorial_leaves_comparisons() {
        let r = rule("factorial");
        assert_eq!(r.apply("x!=3", &options()), "x!=3");
        assert_eq!(r.apply("(x)!", &options()), "(x)!");
    }

    #[test]
    fn test_roots_with_nested_parens() {
        let r = rule("roots");
        assert_eq!(r.apply("√((1+2)*3)", &options()), "((1+2)*3)**(1/2)");
        assert_eq!(r.apply("2*√x.y", &options()), "2*(x.y)**(1/2)");
    }

    #[test]
    fn test_percent_step_with_leading_sign() {
        let r = rule("percent-step");
        assert_eq!(r.apply("-10%", &options()), "(-10/100)");
        assert_eq!(r.apply("max(-5%, 1)", &options()), "max((-5/100), 1)");
        assert_eq!(r.apply("x - 10%", &options()), "x *(1-10/100)");
    }

    #[test]
    fn test_clock_words_are_whole_words() {
        let r = rule("clock");
        assert_eq!(r.apply("known + Today", &options()), "known + date(2024, 1, 31)");
    }

    #[test]
    fn test_units_are_off_unless_enabled() {
        let r = rule("units");
        let plain = DesugarOptions::at(options().now);
        assert_eq!(r.apply("5 kg", &plain), "5 kg");
        assert_eq!(r.apply("|m| m * 2", &options()), "|m| m * 2");
        assert_eq!(r.apply("x.m + h(2)", &options()), "x.m + h(2)");
        assert_eq!(r.apply("5kg", &options()), "(5 * unit(\"kg\"))");
    }

    #[test]
    fn test_unit_literals_are_single_operands() {
        let r = rule("units");
        assert_eq!(
            r.apply("100 km / 2 h", &options()),
            "(100 * unit(\"km\")) / (2 * unit(\"h\"))"
        );
        assert_eq!(
            r.apply("3 kg * 2 m / 4 s", &options()),
            "(3 * unit(\"kg\")) * (2 * unit(\"m\")) / (4 * unit(\"s\"))"
        );
        assert_eq!(r.apply("(1 + 2) kg", &options()), "(1 + 2) * unit(\"kg\")");
    }

    #[test]
    fn test_huge_stack_index_saturates() {
        let r = rule("stack");
        assert_eq!(
            r.apply("@99999999999999999999", &options()),
            "stack_at(_stack, 9223372036854775807)"
        );
    }

    #[test]
    fn test_strings_are_not_rewritten() {
        let out = desugar(r#""3:4 @ today" + 3:4"#, &options());
        assert_eq!(out, r#""3:4 @ today" + Fraction(3, 4)"#);
    }

    #[test]
    fn test_full_pipeline() {
        let plain = DesugarOptions::at(options().now);
        assert_eq!(desugar("100 + 10%", &plain), "100 *(1+10/100)");
        assert_eq!(desugar("today + 1 month", &plain), "date(2024, 1, 31) + months(1)");
        assert_eq!(desugar("@5", &plain), "stack_at(_stack, 5)");
        assert_eq!(desugar("::0.6667", &plain), "approximate(Fraction(\"0.6667\"))");
    }
}
