//! Physical units and dimensioned quantities.
//!
//! A [`Quantity`] stores its magnitude in SI base units together with a
//! dimension vector. The unit it was written in is remembered for display
//! and survives arithmetic with plain numbers and same-dimension quantities.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Exponents of (metre, kilogram, second, ampere, kelvin, mole, candela).
pub type Dimensions = [i8; 7];

pub const DIMENSIONLESS: Dimensions = [0; 7];

pub struct UnitDef {
    pub symbol: &'static str,
    /// Multiplier from this unit to SI.
    pub factor: f64,
    pub dims: Dimensions,
    #[allow(dead_code)]
    pub description: &'static str,
}

const LENGTH: Dimensions = [1, 0, 0, 0, 0, 0, 0];
const MASS: Dimensions = [0, 1, 0, 0, 0, 0, 0];
const TIME: Dimensions = [0, 0, 1, 0, 0, 0, 0];
const FORCE: Dimensions = [1, 1, -2, 0, 0, 0, 0];
const ENERGY: Dimensions = [2, 1, -2, 0, 0, 0, 0];
const POWER: Dimensions = [2, 1, -3, 0, 0, 0, 0];
const PRESSURE: Dimensions = [-1, 1, -2, 0, 0, 0, 0];

pub const UNITS: &[UnitDef] = &[
    UnitDef { symbol: "km", factor: 1000.0, dims: LENGTH, description: "kilometre" },
    UnitDef { symbol: "m", factor: 1.0, dims: LENGTH, description: "metre" },
    UnitDef { symbol: "cm", factor: 0.01, dims: LENGTH, description: "centimetre" },
    UnitDef { symbol: "mm", factor: 0.001, dims: LENGTH, description: "millimetre" },
    UnitDef { symbol: "ft", factor: 0.3048, dims: LENGTH, description: "foot" },
    UnitDef { symbol: "mi", factor: 1609.344, dims: LENGTH, description: "mile" },
    UnitDef { symbol: "t", factor: 1000.0, dims: MASS, description: "tonne" },
    UnitDef { symbol: "kg", factor: 1.0, dims: MASS, description: "kilogram" },
    UnitDef { symbol: "g", factor: 0.001, dims: MASS, description: "gram" },
    UnitDef { symbol: "mg", factor: 1e-6, dims: MASS, description: "milligram" },
    UnitDef { symbol: "lb", factor: 0.453_592_37, dims: MASS, description: "pound" },
    UnitDef { symbol: "h", factor: 3600.0, dims: TIME, description: "hour" },
    UnitDef { symbol: "s", factor: 1.0, dims: TIME, description: "second" },
    UnitDef { symbol: "ms", factor: 0.001, dims: TIME, description: "millisecond" },
    UnitDef { symbol: "Hz", factor: 1.0, dims: [0, 0, -1, 0, 0, 0, 0], description: "hertz" },
    UnitDef { symbol: "N", factor: 1.0, dims: FORCE, description: "newton" },
    UnitDef { symbol: "J", factor: 1.0, dims: ENERGY, description: "joule" },
    UnitDef { symbol: "kJ", factor: 1000.0, dims: ENERGY, description: "kilojoule" },
    UnitDef { symbol: "W", factor: 1.0, dims: POWER, description: "watt" },
    UnitDef { symbol: "kW", factor: 1000.0, dims: POWER, description: "kilowatt" },
    UnitDef { symbol: "Pa", factor: 1.0, dims: PRESSURE, description: "pascal" },
    UnitDef { symbol: "kPa", factor: 1000.0, dims: PRESSURE, description: "kilopascal" },
    UnitDef { symbol: "A", factor: 1.0, dims: [0, 0, 0, 1, 0, 0, 0], description: "ampere" },
    UnitDef { symbol: "V", factor: 1.0, dims: [2, 1, -3, -1, 0, 0, 0], description: "volt" },
    UnitDef { symbol: "K", factor: 1.0, dims: [0, 0, 0, 0, 1, 0, 0], description: "kelvin" },
    UnitDef { symbol: "L", factor: 0.001, dims: [3, 0, 0, 0, 0, 0, 0], description: "litre" },
];

/// SI symbols for a derived dimension with no table entry.
const BASE_SYMBOLS: [&str; 7] = ["m", "kg", "s", "A", "K", "mol", "cd"];

pub fn lookup(symbol: &str) -> Option<&'static UnitDef> {
    UNITS.iter().find(|u| u.symbol == symbol)
}

/// Regex matching a bare unit symbol token.
///
/// Captures:
/// - group 1: the symbol (e.g. `kg`)
pub fn unit_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = UNITS.iter().map(|u| u.symbol).collect::<Vec<_>>().join("|");
        Regex::new(&format!(r"\b({})\b", names)).expect("unit regex must compile")
    })
}

/// Regex matching a number directly followed by a unit symbol (`100 km`, `5kg`).
///
/// Captures:
/// - group 1: the number
/// - group 2: the symbol
pub fn quantity_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = UNITS.iter().map(|u| u.symbol).collect::<Vec<_>>().join("|");
        Regex::new(&format!(r"\b(\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*({})\b", names))
            .expect("quantity literal regex must compile")
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    /// Magnitude in SI base units.
    pub si: f64,
    pub dims: Dimensions,
    /// Display unit, if the dimensions still match one.
    pub unit: Option<&'static str>,
}

impl Quantity {
    pub fn of(symbol: &str) -> Option<Quantity> {
        let def = lookup(symbol)?;
        Some(Quantity {
            si: def.factor,
            dims: def.dims,
            unit: Some(def.symbol),
        })
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims == DIMENSIONLESS
    }

    /// Value expressed in the display unit (SI when none applies).
    pub fn display_value(&self) -> f64 {
        match self.unit.and_then(lookup) {
            Some(def) => self.si / def.factor,
            None => self.si,
        }
    }

    pub fn convert(&self, symbol: &str) -> Result<Quantity, String> {
        let def = lookup(symbol).ok_or_else(|| format!("unknown unit '{}'", symbol))?;
        if def.dims != self.dims {
            return Err(format!(
                "cannot convert {} to {}",
                self.unit_text(),
                def.symbol
            ));
        }
        Ok(Quantity {
            unit: Some(def.symbol),
            ..self.clone()
        })
    }

    pub fn scale(&self, factor: f64) -> Quantity {
        Quantity {
            si: self.si * factor,
            ..self.clone()
        }
    }

    pub fn add(&self, other: &Quantity) -> Result<Quantity, String> {
        if self.dims != other.dims {
            return Err(format!(
                "cannot add {} and {}",
                self.unit_text(),
                other.unit_text()
            ));
        }
        Ok(Quantity {
            si: self.si + other.si,
            dims: self.dims,
            unit: self.unit.or(other.unit),
        })
    }

    pub fn mul(&self, other: &Quantity) -> Quantity {
        Self::derived(self.si * other.si, combine(self.dims, other.dims, 1))
    }

    pub fn div(&self, other: &Quantity) -> Quantity {
        Self::derived(self.si / other.si, combine(self.dims, other.dims, -1))
    }

    pub fn powi(&self, exp: i8) -> Quantity {
        let mut dims = DIMENSIONLESS;
        for (d, s) in dims.iter_mut().zip(self.dims) {
            *d = s.saturating_mul(exp);
        }
        Self::derived(self.si.powi(exp as i32), dims)
    }

    fn derived(si: f64, dims: Dimensions) -> Quantity {
        let unit = UNITS
            .iter()
            .find(|u| u.dims == dims && u.factor == 1.0)
            .map(|u| u.symbol);
        Quantity { si, dims, unit }
    }

    /// Symbol for the display unit, or a product of SI base symbols.
    pub fn unit_text(&self) -> String {
        if let Some(unit) = self.unit {
            return unit.to_string();
        }
        let mut parts = Vec::new();
        for (symbol, exp) in BASE_SYMBOLS.iter().zip(self.dims) {
            match exp {
                0 => {}
                1 => parts.push(symbol.to_string()),
                n => parts.push(format!("{}^{}", symbol, n)),
            }
        }
        parts.join("*")
    }
}

fn combine(a: Dimensions, b: Dimensions, sign: i8) -> Dimensions {
    let mut out = DIMENSIONLESS;
    for i in 0..out.len() {
        out[i] = a[i].saturating_add(b[i].saturating_mul(sign));
    }
    out
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display_value(), self.unit_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_regex_matches_whole_tokens() {
        let re = unit_token_re();
        let found: Vec<_> = re
            .captures_iter("5 kg + 300 g - mass")
            .map(|c| c[1].to_string())
            .collect();
        assert_eq!(found, vec!["kg", "g"]);
    }

    #[test]
    fn test_quantity_literal_regex() {
        let re = quantity_literal_re();
        let found: Vec<_> = re
            .captures_iter("100 km / 2h + x2 kg + 1.5e3 m")
            .map(|c| format!("{}|{}", &c[1], &c[2]))
            .collect();
        assert_eq!(found, vec!["100|km", "2|h", "1.5e3|m"]);
    }

    #[test]
    fn test_add_keeps_left_unit() {
        let kg = Quantity::of("kg").unwrap().scale(5.0);
        let g = Quantity::of("g").unwrap().scale(300.0);
        let total = kg.add(&g).unwrap();
        assert_eq!(total.unit, Some("kg"));
        assert!((total.display_value() - 5.3).abs() < 1e-9);
    }

    #[test]
    fn test_add_rejects_mismatched_dimensions() {
        let m = Quantity::of("m").unwrap();
        let s = Quantity::of("s").unwrap();
        assert!(m.add(&s).is_err());
    }

    #[test]
    fn test_derived_unit_is_found() {
        let force = Quantity::of("kg")
            .unwrap()
            .mul(&Quantity::of("m").unwrap())
            .div(&Quantity::of("s").unwrap().powi(2));
        assert_eq!(force.unit, Some("N"));

        let speed = Quantity::of("m").unwrap().div(&Quantity::of("s").unwrap());
        assert_eq!(speed.unit, None);
        assert_eq!(speed.unit_text(), "m*s^-1");
    }

    #[test]
    fn test_convert() {
        let km = Quantity::of("km").unwrap().scale(2.0);
        let m = km.convert("m").unwrap();
        assert_eq!(m.display_value(), 2000.0);
        assert!(km.convert("kg").is_err());
    }
}
