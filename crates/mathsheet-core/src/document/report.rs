//! Table directives: `!name, stack, kind:function[:"Title"{fmt}]`.
//!
//! Entries are separated by `,` or `;`. Plain names select a variable or a
//! stack; `kind:function` tokens add aggregates:
//!
//! - `c`/`col`/`column`: extra column, `f(this, group, all)`
//! - `s`/`sub`/`subtotal`: row after each group, `f(group, all)`
//! - `t`/`total`: final row, `f(all)`
//!
//! A token `function:name` whose first part is not a kind is shorthand for
//! `name, t:function`.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use mathsheet_engine::engine::{RenderOptions, Value, render};

use super::context::{EvaluationContext, format_value};
use super::line::LineEvaluator;
use super::table::TableFormatter;
use crate::error::{Result, WorksheetError};

pub const HEADERS: [&str; 3] = ["Var", "Value", "Remark"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Column,
    Subtotal,
    Total,
}

impl AggregateKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "c" | "col" | "column" => Some(AggregateKind::Column),
            "s" | "sub" | "subtotal" => Some(AggregateKind::Subtotal),
            "t" | "total" => Some(AggregateKind::Total),
            _ => None,
        }
    }

    /// Number of arguments the aggregate function receives.
    pub fn arity(self) -> usize {
        match self {
            AggregateKind::Column => 3,
            AggregateKind::Subtotal => 2,
            AggregateKind::Total => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub function: String,
    pub title: String,
    pub format: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSpec {
    pub names: Vec<String>,
    pub aggregates: Vec<Aggregate>,
}

fn protected_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*"|\{[^}]*\}"#).expect("protected token regex must compile"))
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@@@(\d+)@@@").expect("placeholder regex must compile"))
}

fn title_format_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("title format regex must compile"))
}

/// Replace quoted titles and `{...}` templates with placeholders so their
/// commas and colons are not taken as separators.
fn mask(spec: &str) -> (String, Vec<String>) {
    let mut saved = Vec::new();
    let masked = protected_re()
        .replace_all(spec, |caps: &regex::Captures| {
            saved.push(caps[0].to_string());
            format!("@@@{}@@@", saved.len() - 1)
        })
        .into_owned();
    (masked, saved)
}

fn unmask(text: &str, saved: &[String]) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| saved.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Split `"Title"{fmt}` into title and template.
fn parse_title(text: &str, function: &str) -> (String, String) {
    let format = title_format_re()
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let title = title_format_re().replace(text, "");
    let title = title.trim().trim_matches('"').trim();
    let title = if title.is_empty() { function } else { title };
    (title.to_string(), format)
}

pub fn parse_table_spec(spec: &str) -> Result<TableSpec> {
    let (masked, saved) = mask(spec);
    let mut out = TableSpec::default();

    for token in masked.split([',', ';']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let parts: Vec<String> = token.splitn(3, ':').map(|p| unmask(p.trim(), &saved)).collect();
        if parts.len() == 1 {
            out.names.push(parts[0].clone());
            continue;
        }
        if parts[1].is_empty() || parts[0].is_empty() {
            return Err(WorksheetError::Evaluation(format!(
                "invalid table entry '{}'",
                unmask(token, &saved)
            )));
        }

        let (kind, function) = match AggregateKind::parse(&parts[0]) {
            Some(kind) => (kind, parts[1].clone()),
            None => {
                out.names.push(parts[1].clone());
                (AggregateKind::Total, parts[0].clone())
            }
        };
        let (title, format) = parse_title(parts.get(2).map(String::as_str).unwrap_or(""), &function);
        out.aggregates.push(Aggregate {
            kind,
            function,
            title,
            format,
        });
    }
    Ok(out)
}

struct DataRow {
    cells: Vec<String>,
    value: Value,
}

struct Group {
    name: String,
    rows: Vec<DataRow>,
}

fn group_mut<'a>(groups: &'a mut Vec<Group>, name: &str) -> &'a mut Group {
    let pos = match groups.iter().position(|g| g.name == name) {
        Some(pos) => pos,
        None => {
            groups.push(Group {
                name: name.to_string(),
                rows: Vec::new(),
            });
            groups.len() - 1
        }
    };
    &mut groups[pos]
}

/// Rows for one sequence element: plain values or `[label, value, remark]`.
fn sequence_row(element: &Value, format: &str, options: &RenderOptions) -> Result<DataRow> {
    if let Value::Sequence(parts) = element {
        if (2..=3).contains(&parts.len()) {
            let remark = parts.get(2).map(|r| render(r, options)).unwrap_or_default();
            return Ok(DataRow {
                cells: vec![
                    render(&parts[0], options),
                    format_value(&parts[1], format, options)?,
                    remark,
                ],
                value: parts[1].clone(),
            });
        }
    }
    Ok(DataRow {
        cells: vec![String::new(), format_value(element, format, options)?, String::new()],
        value: element.clone(),
    })
}

fn collect_rows(
    names: &[String],
    ctx: &EvaluationContext,
    evaluator: &LineEvaluator,
) -> Result<Vec<Group>> {
    let options = evaluator.settings().render_options();
    let show_unassigned = evaluator.settings().show_unassigned;
    let mut groups = vec![Group {
        name: String::new(),
        rows: Vec::new(),
    }];

    for name in names {
        if let Some(item) = ctx.variable(name) {
            if let Value::Sequence(elements) = &item.value {
                let rows = elements
                    .iter()
                    .map(|e| sequence_row(e, &item.format, &options))
                    .collect::<Result<Vec<_>>>()?;
                group_mut(&mut groups, name).rows.extend(rows);
            } else {
                groups[0].rows.push(DataRow {
                    cells: vec![name.clone(), item.formatted_value(&options)?, item.remark.clone()],
                    value: item.value.clone(),
                });
            }
        } else if ctx.has_stack(name) {
            let mut rows = Vec::new();
            for item in ctx.stack_items(name) {
                if item.name.is_some() || show_unassigned {
                    rows.push(DataRow {
                        cells: vec![
                            item.name.clone().unwrap_or_default(),
                            item.formatted_value(&options)?,
                            item.remark.clone(),
                        ],
                        value: item.value.clone(),
                    });
                }
            }
            group_mut(&mut groups, name).rows.extend(rows);
        } else {
            debug!(name = %name, "table entry is neither a variable nor a stack");
        }
    }
    Ok(groups)
}

fn sequence_of<'a>(rows: impl Iterator<Item = &'a DataRow>) -> Value {
    Value::Sequence(rows.map(|r| r.value.clone()).collect())
}

/// Build the text table for a `!` directive.
pub fn build_table(spec: &str, ctx: &EvaluationContext, evaluator: &LineEvaluator) -> Result<String> {
    let spec = parse_table_spec(spec)?;
    let options = evaluator.settings().render_options();
    let mut groups = collect_rows(&spec.names, ctx, evaluator)?;
    let all = sequence_of(groups.iter().flat_map(|g| g.rows.iter()));

    let mut formatter = TableFormatter::new(HEADERS);
    let aggregate_cell = |aggregate: &Aggregate, args: Vec<Value>| -> Result<String> {
        debug_assert_eq!(args.len(), aggregate.kind.arity());
        let value = evaluator.call_aggregate(ctx, &aggregate.function, args)?;
        format_value(&value, &aggregate.format, &options)
    };

    for aggregate in spec.aggregates.iter().filter(|a| a.kind == AggregateKind::Column) {
        formatter.add_header(&aggregate.title);
        for group in groups.iter_mut() {
            let group_values = sequence_of(group.rows.iter());
            for row in group.rows.iter_mut() {
                let cell = aggregate_cell(
                    aggregate,
                    vec![row.value.clone(), group_values.clone(), all.clone()],
                )?;
                row.cells.push(cell);
            }
        }
    }

    for group in &groups {
        formatter.start_row_group(&group.name);
        for row in &group.rows {
            formatter.add_row(row.cells.clone());
        }
    }
    formatter.start_row_group("");

    for aggregate in spec.aggregates.iter().filter(|a| a.kind == AggregateKind::Subtotal) {
        for group in groups.iter().filter(|g| !g.rows.is_empty()) {
            let cell = aggregate_cell(aggregate, vec![sequence_of(group.rows.iter()), all.clone()])?;
            formatter.add_subtotal(&group.name, vec![aggregate.title.clone(), cell]);
        }
    }

    for aggregate in spec.aggregates.iter().filter(|a| a.kind == AggregateKind::Total) {
        let cell = aggregate_cell(aggregate, vec![all.clone()])?;
        formatter.add_total(vec![aggregate.title.clone(), cell]);
    }

    Ok(formatter.format_table())
}
