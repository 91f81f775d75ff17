//! Worksheet driver: recalculates every line of a host surface in order.

use chrono::{Local, NaiveDateTime};
use tracing::{debug, warn};

use mathsheet_engine::engine::render;

use super::context::EvaluationContext;
use super::line::{Annotation, LineEvaluator, LineOutcome};
use crate::error::Result;
use crate::settings::Settings;

/// Lines processed per pass; the rest of a longer document is left alone.
pub const MAX_LINES: usize = 10_000;

/// Host-defined position of a line.
pub type Location = usize;

/// The editing surface a worksheet lives in.
pub trait Surface {
    /// Document lines in order, without their annotations or tables.
    fn lines(&self) -> Vec<(Location, String)>;

    /// Replace or insert the annotation after the line at `location`.
    fn write_annotation(&mut self, location: Location, annotation: &Annotation);

    fn erase_annotation(&mut self, location: Location);

    /// Replace or insert the table block after the line at `location`.
    fn write_table(&mut self, location: Location, table: &str);

    fn erase_table(&mut self, location: Location);

    fn report_error(&mut self, location: Location, message: &str);

    /// Called before a pass so stale error markers can be dropped.
    fn clear_errors(&mut self) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineError {
    pub location: Location,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecalcReport {
    pub errors: Vec<LineError>,
    pub processed: usize,
    /// The pass stopped at [`MAX_LINES`].
    pub truncated: bool,
}

pub struct Worksheet {
    context: EvaluationContext,
    evaluator: LineEvaluator,
    defaults: Settings,
    clock: Option<NaiveDateTime>,
}

impl Worksheet {
    pub fn new(defaults: Settings) -> Self {
        Worksheet {
            context: EvaluationContext::new(),
            evaluator: LineEvaluator::new(defaults, Local::now().naive_local()),
            defaults,
            clock: None,
        }
    }

    /// Pin `today`/`now` to a fixed moment instead of the wall clock.
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self.evaluator.reset(self.defaults, now);
        self
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Local::now().naive_local())
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// Settings as left by the last line processed.
    pub fn settings(&self) -> &Settings {
        self.evaluator.settings()
    }

    /// Evaluate every line from a cleared context and write the results
    /// back to `surface`. Line failures are reported and never stop the pass.
    pub fn recalculate<S: Surface + ?Sized>(&mut self, surface: &mut S) -> RecalcReport {
        self.context.clear();
        self.evaluator.reset(self.defaults, self.now());
        surface.clear_errors();

        let mut report = RecalcReport::default();
        for (index, (location, text)) in surface.lines().into_iter().enumerate() {
            if index >= MAX_LINES {
                warn!(limit = MAX_LINES, "line limit reached, rest of the worksheet skipped");
                report.truncated = true;
                break;
            }
            report.processed += 1;

            match self.evaluator.process(&mut self.context, &text) {
                Ok(LineOutcome::Annotated(annotation)) => {
                    surface.write_annotation(location, &annotation);
                    surface.erase_table(location);
                }
                Ok(LineOutcome::Table(table)) => {
                    surface.erase_annotation(location);
                    surface.write_table(location, &table);
                }
                Ok(LineOutcome::Skipped) => {
                    surface.erase_annotation(location);
                    surface.erase_table(location);
                }
                Err(err) => {
                    let message = err.to_string();
                    debug!(location, error = %message, "line failed");
                    surface.erase_annotation(location);
                    surface.erase_table(location);
                    surface.report_error(location, &message);
                    report.errors.push(LineError { location, message });
                }
            }
        }
        report
    }

    /// Evaluate one line against the state left by earlier calls and return
    /// its display text, if any.
    pub fn run_line(&mut self, text: &str) -> Result<Option<String>> {
        Ok(match self.evaluator.process(&mut self.context, text)? {
            LineOutcome::Annotated(Annotation::Answer(value)) => Some(value),
            LineOutcome::Annotated(annotation) => Some(annotation.to_string()),
            LineOutcome::Table(table) => Some(table),
            LineOutcome::Skipped => None,
        })
    }

    /// `VARIABLES` listing: bindings in last-write order, then stacks, then
    /// the last answer.
    pub fn variables_report(&self) -> String {
        let options = self.evaluator.settings().render_options();
        let mut entries: Vec<(String, String)> = self
            .context
            .variables()
            .filter_map(|item| {
                let name = item.name.clone()?;
                let value = item
                    .formatted_value(&options)
                    .unwrap_or_else(|_| render(&item.value, &options));
                Some((name, value))
            })
            .collect();
        for stack in self.context.stacks() {
            let plural = if stack.len() == 1 { "" } else { "s" };
            entries.push((
                format!("@{}", stack.name),
                format!("<Stack of {} item{}>", stack.len(), plural),
            ));
        }
        entries.push(("ans".to_string(), render(&self.context.last_answer(), &options)));

        let key_width = entries.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
        let value_width = entries.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);
        let mut out = vec!["VARIABLES".to_string(), "-".repeat(key_width + value_width + 3)];
        out.extend(
            entries
                .iter()
                .map(|(k, v)| format!("{:<width$} : {}", k, v, width = key_width)),
        );
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TextDocument;
    use chrono::NaiveDate;

    fn clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn sheet() -> Worksheet {
        Worksheet::new(Settings::default()).with_clock(clock())
    }

    fn recalc(text: &str) -> (TextDocument, RecalcReport) {
        let mut doc = TextDocument::parse(text);
        let report = sheet().recalculate(&mut doc);
        (doc, report)
    }

    #[test]
    fn test_answers_are_annotated() {
        let (doc, report) = recalc("100 + 10%\nrate = 3:4\n");
        assert!(report.errors.is_empty());
        assert_eq!(
            doc.render(),
            "100 + 10%\n\t\t\tAnswer = 110\nrate = 3:4\n\t\t\tAnswer = 3/4\n"
        );
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let text = "@costs\n10\n20\nf(x) = x * 2\nf(@1)\n!costs, t:sum\n";
        let (doc, _) = recalc(text);
        let once = doc.render();
        let mut doc = TextDocument::parse(&once);
        let mut ws = sheet();
        ws.recalculate(&mut doc);
        ws.recalculate(&mut doc);
        assert_eq!(doc.render(), once);
    }

    #[test]
    fn test_out_of_range_stack_index_is_zero() {
        let (doc, _) = recalc("1\n2\n@5\n");
        assert!(doc.render().ends_with("@5\n\t\t\tAnswer = 0\n"));
    }

    #[test]
    fn test_huge_stack_index_is_zero() {
        let mut ws = sheet();
        ws.run_line("1").unwrap();
        assert_eq!(ws.run_line("@99999999999999999999").unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn test_natural_unit_arithmetic() {
        let (doc, report) = recalc(
            "!SET units=on\nspeed = 100 km / 2 h\nforce = 3 kg * 2 m / 4 s\n5 kg + 300 g\n",
        );
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let text = doc.render();
        assert!(
            text.contains("speed = 100 km / 2 h\n\t\t\tAnswer = 13.8888888889 m*s^-1\n"),
            "{text}"
        );
        assert!(
            text.contains("force = 3 kg * 2 m / 4 s\n\t\t\tAnswer = 1.5 m*kg*s^-1\n"),
            "{text}"
        );
        assert!(text.ends_with("5 kg + 300 g\n\t\t\tAnswer = 5.3 kg\n"), "{text}");
    }

    #[test]
    fn test_percent_forms() {
        let mut ws = sheet();
        assert_eq!(ws.run_line("200 - 25%").unwrap().as_deref(), Some("150"));
        assert_eq!(ws.run_line("50 * 10%").unwrap().as_deref(), Some("5"));
        assert_eq!(ws.run_line("-10% * 30").unwrap().as_deref(), Some("-3"));
    }

    #[test]
    fn test_ratio_and_fraction_shorthand() {
        let mut ws = sheet();
        assert_eq!(ws.run_line("3:4 + 1:4").unwrap().as_deref(), Some("1"));
        assert_eq!(ws.run_line("::0.6667").unwrap().as_deref(), Some("2/3"));
        assert_eq!(ws.run_line(":::0.25").unwrap().as_deref(), Some("1/4"));
    }

    #[test]
    fn test_function_annotation() {
        let (doc, _) = recalc("area(w, h) = w * h\narea(3, 4)\n");
        assert_eq!(
            doc.render(),
            "area(w, h) = w * h\n\t\t\tFunction: area(w, h) = w * h\narea(3, 4)\n\t\t\tAnswer = 12\n"
        );
    }

    #[test]
    fn test_stack_total_table() {
        let (doc, report) = recalc("@totals\n10\n20\n30\n!sum:totals\n");
        assert!(report.errors.is_empty());
        let text = doc.render();
        assert!(text.contains("| sum | 60    |        |"), "{text}");
        assert!(text.lines().filter(|l| l.starts_with('|')).count() > 4);
    }

    #[test]
    fn test_errors_are_isolated() {
        let (doc, report) = recalc("x = missing + 1\ny = 2\ny * 3\n");
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location, 0);
        assert_eq!(report.errors[0].message, "Name error: name 'missing' is not defined");
        assert!(doc.render().ends_with("y * 3\n\t\t\tAnswer = 6\n"));
        assert_eq!(doc.errors().len(), 1);
    }

    #[test]
    fn test_failing_line_loses_stale_annotation() {
        let (doc, _) = recalc("1 / 0\n\t\t\tAnswer = 7\n");
        assert_eq!(doc.render(), "1 / 0\n");
    }

    #[test]
    fn test_table_lines_are_never_evaluated() {
        let (doc, report) = recalc("| 1 / 0 |\n|undefined_name|\n");
        assert!(report.errors.is_empty());
        assert_eq!(doc.render(), "| 1 / 0 |\n|undefined_name|\n");
    }

    #[test]
    fn test_settings_reset_between_passes() {
        let mut doc = TextDocument::parse("!SET pretty_exponents=on\n1.5 * 10 ** 20\n");
        let mut ws = sheet();
        ws.recalculate(&mut doc);
        assert!(ws.settings().pretty_exponents);
        assert!(doc.render().contains("Answer = 1.5·10²⁰"));

        let mut plain = TextDocument::parse("1.5 * 10 ** 20\n");
        ws.recalculate(&mut plain);
        assert!(!ws.settings().pretty_exponents);
        assert!(plain.render().contains("Answer = 1.5e20"));
    }

    #[test]
    fn test_line_limit() {
        let text = "\n".repeat(MAX_LINES + 5);
        let (_, report) = recalc(&text);
        assert!(report.truncated);
        assert_eq!(report.processed, MAX_LINES);
    }

    #[test]
    fn test_variables_report() {
        let mut ws = sheet();
        ws.run_line("rent = 900").unwrap();
        ws.run_line("@food").unwrap();
        ws.run_line("12").unwrap();
        let expected = "\
VARIABLES
-------------------------
rent  : 900
@food : <Stack of 1 item>
ans   : 12";
        assert_eq!(ws.variables_report(), expected);
    }
}
