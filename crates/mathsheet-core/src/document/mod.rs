//! Worksheet state and logic (UI-agnostic).

mod context;
mod line;
mod report;
mod table;
mod worksheet;

pub use context::{ANSWER_NAMES, Bucket, EvaluationContext, ResultItem, format_value};
pub use line::{
    Annotation, LineEvaluator, LineKind, LineOutcome, classify, extract_format, is_annotation,
    split_remark,
};
pub use report::{Aggregate, AggregateKind, TableSpec, build_table, parse_table_spec};
pub use table::TableFormatter;
pub use worksheet::{LineError, Location, MAX_LINES, RecalcReport, Surface, Worksheet};
