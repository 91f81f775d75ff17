//! Plain-text worksheet files.
//!
//! Each source line may be followed by one generated annotation line
//! (`\t\t\tAnswer = ...`) and, for `!` directives, a block of `|` table
//! lines. Both are recognised on load so a recalculation replaces them
//! instead of stacking new copies.

use std::fs;
use std::path::Path;

use crate::document::{Annotation, Location, Surface, is_annotation};
use crate::error::Result;

const ANNOTATION_INDENT: &str = "\t\t\t";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Entry {
    text: String,
    annotation: Option<String>,
    table: Vec<String>,
}

impl Entry {
    fn new(text: &str) -> Self {
        Entry {
            text: text.to_string(),
            ..Entry::default()
        }
    }

    fn height(&self) -> usize {
        1 + usize::from(self.annotation.is_some()) + self.table.len()
    }

    fn accepts_annotation(&self) -> bool {
        !self.text.trim().is_empty() && self.annotation.is_none() && self.table.is_empty()
    }

    fn accepts_table_line(&self) -> bool {
        self.text.trim_start().starts_with('!') && self.annotation.is_none()
    }
}

/// An in-memory worksheet that implements [`Surface`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDocument {
    entries: Vec<Entry>,
    trailing_newline: bool,
    errors: Vec<(Location, String)>,
}

impl TextDocument {
    pub fn parse(content: &str) -> Self {
        let mut entries: Vec<Entry> = Vec::new();
        for line in content.lines() {
            match entries.last_mut() {
                Some(prev) if is_annotation(line) && prev.accepts_annotation() => {
                    prev.annotation = Some(line.to_string());
                }
                Some(prev) if line.trim_start().starts_with('|') && prev.accepts_table_line() => {
                    prev.table.push(line.to_string());
                }
                _ => entries.push(Entry::new(line)),
            }
        }
        TextDocument {
            entries,
            trailing_newline: content.ends_with('\n'),
            errors: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        for entry in &self.entries {
            lines.push(&entry.text);
            if let Some(annotation) = &entry.annotation {
                lines.push(annotation);
            }
            lines.extend(entry.table.iter().map(String::as_str));
        }
        let mut out = lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    /// Errors reported by the last recalculation.
    pub fn errors(&self) -> &[(Location, String)] {
        &self.errors
    }

    /// 1-based line number of `location` in the rendered text.
    pub fn line_number(&self, location: Location) -> usize {
        self.entries
            .iter()
            .take(location)
            .map(Entry::height)
            .sum::<usize>()
            + 1
    }
}

impl Surface for TextDocument {
    fn lines(&self) -> Vec<(Location, String)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.text.clone()))
            .collect()
    }

    fn write_annotation(&mut self, location: Location, annotation: &Annotation) {
        if let Some(entry) = self.entries.get_mut(location) {
            entry.annotation = Some(format!("{}{}", ANNOTATION_INDENT, annotation));
        }
    }

    fn erase_annotation(&mut self, location: Location) {
        if let Some(entry) = self.entries.get_mut(location) {
            entry.annotation = None;
        }
    }

    fn write_table(&mut self, location: Location, table: &str) {
        if let Some(entry) = self.entries.get_mut(location) {
            entry.table = table.lines().map(str::to_string).collect();
        }
    }

    fn erase_table(&mut self, location: Location) {
        if let Some(entry) = self.entries.get_mut(location) {
            entry.table.clear();
        }
    }

    fn report_error(&mut self, location: Location, message: &str) {
        self.errors.push((location, message.to_string()));
    }

    fn clear_errors(&mut self) {
        self.errors.clear();
    }
}
