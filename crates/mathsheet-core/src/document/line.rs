//! Line classification and evaluation.
//!
//! A line is classified by its first characters (first match wins):
//! blank, annotation, `;` comment, `#` section, `@name` stack header,
//! `?` silent expression, `|` generated table line, `!SET` setting,
//! `!` table directive, and finally a plain expression.

use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, trace};

use mathsheet_engine::engine::{
    Binding, Declaration, DesugarOptions, Engine, EvalAltResult, Value, bind_function_calls,
    closure_params, create_engine, desugar, eval_expression, parse_declaration,
};

use super::context::{EvaluationContext, format_value};
use super::report;
use crate::error::{Result, WorksheetError};
use crate::settings::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Annotation,
    Comment,
    Section(&'a str),
    Stack { name: &'a str, remark: &'a str },
    Silent(&'a str),
    TableLine,
    Setting(&'a str),
    Table(&'a str),
    Expression(&'a str),
}

/// Text written after an evaluated line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Answer(String),
    Function(String),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Answer(value) => write!(f, "Answer = {}", value),
            Annotation::Function(declaration) => write!(f, "Function: {}", declaration),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Skipped,
    Annotated(Annotation),
    Table(String),
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("identifier regex must compile"))
}

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(Answer\s*=|Function:)").expect("annotation regex must compile")
    })
}

fn format_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("format token regex must compile"))
}

/// True for a generated `Answer = ...` / `Function: ...` line.
pub fn is_annotation(line: &str) -> bool {
    annotation_re().is_match(line)
}

/// Split off the trailing remark: text after the first `;`, `#` or `'`
/// outside a string literal.
pub fn split_remark(line: &str) -> (&str, &str) {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b';' | b'#' | b'\'' if !in_string => {
                return (line[..i].trim(), line[i + 1..].trim());
            }
            _ => {}
        }
        i += 1;
    }
    (line.trim(), "")
}

/// Pull a `{...}` display template out of a remark.
pub fn extract_format(remark: &str) -> (String, String) {
    match format_token_re().find(remark) {
        Some(m) => {
            let rest = format!("{}{}", &remark[..m.start()], &remark[m.end()..]);
            (rest.trim().to_string(), m.as_str().to_string())
        }
        None => (remark.trim().to_string(), String::new()),
    }
}

fn stack_header(text: &str) -> Option<LineKind<'_>> {
    let rest = text.strip_prefix('@')?;
    let (name, remark) = split_remark(rest);
    identifier_re()
        .is_match(name)
        .then_some(LineKind::Stack { name, remark })
}

fn strip_setting_prefix(text: &str) -> Option<&str> {
    let head = text.get(..5)?;
    head.eq_ignore_ascii_case("!SET ").then(|| &text[5..])
}

pub fn classify(line: &str) -> LineKind<'_> {
    let text = line.trim();
    if text.is_empty() {
        LineKind::Blank
    } else if is_annotation(text) {
        LineKind::Annotation
    } else if text.starts_with(';') {
        LineKind::Comment
    } else if let Some(rest) = text.strip_prefix('#') {
        LineKind::Section(rest.trim_start_matches('#').trim())
    } else if let Some(header) = stack_header(text) {
        header
    } else if let Some(rest) = text.strip_prefix('?') {
        LineKind::Silent(rest.trim())
    } else if text.starts_with('|') {
        LineKind::TableLine
    } else if let Some(rest) = strip_setting_prefix(text) {
        LineKind::Setting(rest.trim())
    } else if let Some(rest) = text.strip_prefix('!') {
        LineKind::Table(rest.trim())
    } else {
        LineKind::Expression(text)
    }
}

/// Evaluates one line at a time against an [`EvaluationContext`].
pub struct LineEvaluator {
    engine: Engine,
    settings: Settings,
    now: NaiveDateTime,
}

impl LineEvaluator {
    pub fn new(settings: Settings, now: NaiveDateTime) -> Self {
        LineEvaluator {
            engine: create_engine(),
            settings,
            now,
        }
    }

    /// Start a new pass with fresh settings and reference clock.
    pub fn reset(&mut self, settings: Settings, now: NaiveDateTime) {
        self.settings = settings;
        self.now = now;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn process(&mut self, ctx: &mut EvaluationContext, line: &str) -> Result<LineOutcome> {
        let kind = classify(line);
        debug!(?kind, "classified line");
        match kind {
            LineKind::Blank
            | LineKind::Annotation
            | LineKind::Comment
            | LineKind::TableLine => Ok(LineOutcome::Skipped),
            LineKind::Section(name) => {
                ctx.start_section(name);
                Ok(LineOutcome::Skipped)
            }
            LineKind::Stack { name, remark } => {
                let (remark, format) = extract_format(remark);
                ctx.start_stack(name, &remark, &format);
                Ok(LineOutcome::Skipped)
            }
            LineKind::Setting(directive) => {
                self.settings.apply_directive(directive)?;
                Ok(LineOutcome::Skipped)
            }
            LineKind::Table(spec) => {
                if spec.is_empty() {
                    return Ok(LineOutcome::Skipped);
                }
                report::build_table(spec, ctx, self).map(LineOutcome::Table)
            }
            LineKind::Silent(text) => self.process_expression(ctx, text, false),
            LineKind::Expression(text) => self.process_expression(ctx, text, true),
        }
    }

    fn process_expression(
        &self,
        ctx: &mut EvaluationContext,
        text: &str,
        push_to_history: bool,
    ) -> Result<LineOutcome> {
        let (expr, remark) = split_remark(text);
        if expr.is_empty() {
            return Ok(LineOutcome::Skipped);
        }
        let (remark, format) = extract_format(remark);

        let declaration = parse_declaration(expr)?;
        let value = self.evaluate(ctx, &declaration)?;

        let format = ctx.resolve_format(&format);
        let annotation = if value.is_callable() {
            Annotation::Function(expr.to_string())
        } else {
            Annotation::Answer(format_value(&value, &format, &self.settings.render_options())?)
        };

        ctx.store(
            declaration.binding.name(),
            value,
            &remark,
            &format,
            push_to_history,
        );

        match annotation {
            Annotation::Answer(text) if text.is_empty() => Ok(LineOutcome::Skipped),
            annotation => Ok(LineOutcome::Annotated(annotation)),
        }
    }

    /// Evaluate the right-hand side of a declaration in the current namespace.
    pub fn evaluate(&self, ctx: &mut EvaluationContext, declaration: &Declaration) -> Result<Value> {
        let options = DesugarOptions {
            now: self.now,
            natural_units: self.settings.natural_units,
        };
        let rhs = desugar(&declaration.rhs, &options);
        let rhs = bind_function_calls(&rhs, |name| ctx.is_function(name));
        trace!(expr = %rhs, "evaluating");

        let mut scope = ctx.build_namespace();
        let (result, ast) = eval_expression(&self.engine, &mut scope, &rhs, ctx.library())?;
        let mut value = Value::from_dynamic(result);

        if let Value::Function(callable) = &mut value {
            ctx.extend_library(&ast);
            callable.params = match &declaration.binding {
                Binding::Function { params, .. } => params.clone(),
                _ => ctx
                    .library()
                    .and_then(|lib| closure_params(lib, &callable.ptr))
                    .unwrap_or_default(),
            };
        }
        Ok(value)
    }

    /// Call a table aggregate. Worksheet functions must take exactly
    /// `args.len()` parameters; built-ins fall back to the first argument
    /// alone when no overload takes them all.
    pub fn call_aggregate(
        &self,
        ctx: &EvaluationContext,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        if !identifier_re().is_match(name) {
            return Err(WorksheetError::Evaluation(format!(
                "invalid function name '{}'",
                name
            )));
        }

        let mut scope = ctx.build_namespace();
        let slots: Vec<String> = (0..args.len()).map(|i| format!("__arg{}", i)).collect();
        for (slot, value) in slots.iter().zip(args) {
            scope.push_dynamic(slot.clone(), value.into_dynamic());
        }

        if let Some(function) = ctx.function(name) {
            if function.arity() != slots.len() {
                return Err(WorksheetError::Evaluation(format!(
                    "{}() takes {} argument(s) but is used where {} are passed",
                    name,
                    function.arity(),
                    slots.len()
                )));
            }
            let expr = format!("{}.call({})", name, slots.join(", "));
            let (result, _) = eval_expression(&self.engine, &mut scope, &expr, ctx.library())?;
            return Ok(Value::from_dynamic(result));
        }

        let expr = format!("{}({})", name, slots.join(", "));
        match eval_expression(&self.engine, &mut scope, &expr, ctx.library()) {
            Ok((result, _)) => Ok(Value::from_dynamic(result)),
            Err(err)
                if slots.len() > 1 && matches!(*err, EvalAltResult::ErrorFunctionNotFound(..)) =>
            {
                let expr = format!("{}({})", name, slots[0]);
                let (result, _) = eval_expression(&self.engine, &mut scope, &expr, ctx.library())?;
                Ok(Value::from_dynamic(result))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn evaluator() -> LineEvaluator {
        let now = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        LineEvaluator::new(Settings::default(), now)
    }

    fn answer(outcome: LineOutcome) -> String {
        match outcome {
            LineOutcome::Annotated(Annotation::Answer(text)) => text,
            other => panic!("expected an answer, got {:?}", other),
        }
    }

    #[test]
    fn test_classification_priorities() {
        assert_eq!(classify("   "), LineKind::Blank);
        assert_eq!(classify("\t\t\tAnswer = 5"), LineKind::Annotation);
        assert_eq!(classify("Function: f(x) = x"), LineKind::Annotation);
        assert_eq!(classify("; note"), LineKind::Comment);
        assert_eq!(classify("## Budget"), LineKind::Section("Budget"));
        assert_eq!(
            classify("@costs ; monthly {:.2f}"),
            LineKind::Stack {
                name: "costs",
                remark: "monthly {:.2f}"
            }
        );
        assert_eq!(classify("? x = 2"), LineKind::Silent("x = 2"));
        assert_eq!(classify("| a | 1 |"), LineKind::TableLine);
        assert_eq!(classify("|anything at all = 1/0"), LineKind::TableLine);
        assert_eq!(classify("!SET units=on"), LineKind::Setting("units=on"));
        assert_eq!(classify("!totals, t:sum"), LineKind::Table("totals, t:sum"));
        assert_eq!(classify("2 + 2"), LineKind::Expression("2 + 2"));
    }

    #[test]
    fn test_bad_stack_header_is_an_expression() {
        assert_eq!(classify("@2 + 1"), LineKind::Expression("@2 + 1"));
        assert_eq!(classify("@@"), LineKind::Expression("@@"));
    }

    #[test]
    fn test_split_remark_and_format() {
        assert_eq!(split_remark("x = 2 ; the x"), ("x = 2", "the x"));
        assert_eq!(split_remark("\"a;b\" # text"), ("\"a;b\"", "text"));
        assert_eq!(split_remark("1 + 1"), ("1 + 1", ""));
        assert_eq!(
            extract_format("price {:.2f} per unit"),
            ("price  per unit".to_string(), "{:.2f}".to_string())
        );
        assert_eq!(
            extract_format("due {:%d %b %Y}"),
            ("due".to_string(), "{:%d %b %Y}".to_string())
        );
    }

    #[test]
    fn test_date_template_with_spaces() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        let result = ev.process(&mut ctx, "today + 1 month ; due {:%d %b %Y}").unwrap();
        assert_eq!(answer(result), "29 Feb 2024");
        assert_eq!(ctx.history().last().unwrap().remark, "due");
    }

    #[test]
    fn test_expression_lines() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        assert_eq!(answer(ev.process(&mut ctx, "100 + 10%").unwrap()), "110");
        assert_eq!(answer(ev.process(&mut ctx, "rate = 3:4").unwrap()), "3/4");
        assert_eq!(answer(ev.process(&mut ctx, "today + 1 month").unwrap()), "2024-02-29");
        assert_eq!(answer(ev.process(&mut ctx, "2 + 3 ; five {:.1f}").unwrap()), "5.0");
        assert_eq!(ctx.history().last().unwrap().remark, "five");
    }

    #[test]
    fn test_function_declaration_and_call() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        let outcome = ev.process(&mut ctx, "f(x,y) = x + y").unwrap();
        assert_eq!(
            outcome,
            LineOutcome::Annotated(Annotation::Function("f(x,y) = x + y".into()))
        );
        assert!(ctx.history().is_empty());
        assert_eq!(ctx.function("f").unwrap().arity(), 2);
        assert_eq!(answer(ev.process(&mut ctx, "f(2,3)").unwrap()), "5");
    }

    #[test]
    fn test_silent_lines_do_not_enter_history() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        ev.process(&mut ctx, "? x = 4").unwrap();
        assert!(ctx.history().is_empty());
        assert_eq!(answer(ev.process(&mut ctx, "x * 2").unwrap()), "8");
    }

    #[test]
    fn test_line_errors() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        assert!(matches!(
            ev.process(&mut ctx, "missing + 1"),
            Err(WorksheetError::Name(_))
        ));
        assert!(matches!(
            ev.process(&mut ctx, "2x = 1"),
            Err(WorksheetError::Declaration(_))
        ));
        assert!(matches!(
            ev.process(&mut ctx, "1 / 0"),
            Err(WorksheetError::Evaluation(_))
        ));
        assert!(ctx.history().is_empty());
    }

    #[test]
    fn test_settings_directive_changes_session() {
        let mut ev = evaluator();
        let mut ctx = EvaluationContext::new();
        ev.process(&mut ctx, "!SET pretty_exponents=on").unwrap();
        assert!(ev.settings().pretty_exponents);
        assert_eq!(answer(ev.process(&mut ctx, "1.5 * 10 ** 20").unwrap()), "1.5·10²⁰");
    }

    #[test]
    fn test_aggregate_fallback_to_primary_argument() {
        let ev = evaluator();
        let ctx = EvaluationContext::new();
        let group = Value::Sequence(vec![Value::Int(1), Value::Int(2)]);
        let all = Value::Sequence(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            ev.call_aggregate(&ctx, "sum", vec![group, all]).unwrap(),
            Value::Int(3)
        );
        assert!(ev.call_aggregate(&ctx, "sum(1)", vec![]).is_err());
    }
}
