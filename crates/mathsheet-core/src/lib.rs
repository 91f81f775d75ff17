//! mathsheet-core - line-oriented worksheet evaluation + text storage.

pub mod document;
pub mod error;
pub mod settings;
pub mod storage;

pub use document::{Annotation, RecalcReport, Surface, Worksheet};
pub use error::{Result, WorksheetError};
pub use settings::Settings;
pub use storage::TextDocument;

pub use mathsheet_engine::engine::Value;
