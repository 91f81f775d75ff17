//! Per-session display and parsing options.
//!
//! Defaults come from the host (the CLI reads them from `settings.toml`);
//! `!SET key=value` lines change the session copy from that line onward.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorksheetError};
use mathsheet_engine::engine::RenderOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recognise bare unit symbols (`5 kg`) in expressions.
    pub natural_units: bool,
    /// Render `1.5e20` as `1.5·10²⁰`.
    pub pretty_exponents: bool,
    /// Include anonymous stack items in tables.
    pub show_unassigned: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            natural_units: false,
            pretty_exponents: false,
            show_unassigned: true,
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl Settings {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            pretty_exponents: self.pretty_exponents,
        }
    }

    /// Apply a `key=value` or `key:value` directive.
    pub fn apply_directive(&mut self, directive: &str) -> Result<()> {
        let Some((key, value)) = directive.split_once(['=', ':']) else {
            return Err(WorksheetError::Setting(format!(
                "expected key=value, got '{}'",
                directive.trim()
            )));
        };
        let key = key.trim().to_ascii_lowercase();
        let switch = parse_switch(value).ok_or_else(|| {
            WorksheetError::Setting(format!("'{}' is not on/off for {}", value.trim(), key))
        })?;

        let slot = match key.as_str() {
            "natural_units" | "units" => &mut self.natural_units,
            "pretty_exponents" | "pretty_exponent" | "superscripts" => &mut self.pretty_exponents,
            "show_unassigned" | "show_anonymous" => &mut self.show_unassigned,
            _ => return Err(WorksheetError::Setting(format!("unknown key '{}'", key))),
        };
        *slot = switch;
        Ok(())
    }
}
