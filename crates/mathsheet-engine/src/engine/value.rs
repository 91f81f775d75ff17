//! The closed set of values a worksheet line can produce.
//!
//! Rhai works in [`Dynamic`]; everything stored by the worksheet goes through
//! [`Value`] so that rendering and table generation can match exhaustively.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rhai::{Array, Dynamic, FnPtr};

use super::calendar::Period;
use super::fraction::Fraction;
use crate::units::Quantity;

/// A worksheet function value.
#[derive(Clone, Debug)]
pub struct Callable {
    pub ptr: FnPtr,
    /// Declared parameter names, empty when unknown.
    pub params: Vec<String>,
}

impl Callable {
    pub fn name(&self) -> &str {
        self.ptr.fn_name()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nothing,
    Bool(bool),
    Int(i64),
    Real(f64),
    Rational(Fraction),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Period(Period),
    Text(String),
    Sequence(Vec<Value>),
    Function(Callable),
    Quantity(Quantity),
}

impl Value {
    pub fn from_dynamic(value: Dynamic) -> Value {
        let value = value.flatten();
        if value.is_unit() {
            return Value::Nothing;
        }
        if let Ok(b) = value.as_bool() {
            return Value::Bool(b);
        }
        if let Ok(n) = value.as_int() {
            return Value::Int(n);
        }
        if let Ok(x) = value.as_float() {
            return Value::Real(x);
        }
        if let Ok(c) = value.as_char() {
            return Value::Text(c.to_string());
        }
        if value.is_string() {
            return Value::Text(value.into_string().unwrap_or_default());
        }
        if value.is_array() {
            let items = value.into_array().unwrap_or_default();
            return Value::Sequence(items.into_iter().map(Value::from_dynamic).collect());
        }
        if value.is::<FnPtr>() {
            return Value::Function(Callable {
                ptr: value.cast::<FnPtr>(),
                params: Vec::new(),
            });
        }
        if value.is::<Fraction>() {
            return Value::Rational(value.cast::<Fraction>());
        }
        if value.is::<NaiveDate>() {
            return Value::Date(value.cast::<NaiveDate>());
        }
        if value.is::<NaiveDateTime>() {
            return Value::DateTime(value.cast::<NaiveDateTime>());
        }
        if value.is::<TimeDelta>() {
            return Value::Duration(value.cast::<TimeDelta>());
        }
        if value.is::<Period>() {
            return Value::Period(value.cast::<Period>());
        }
        if value.is::<Quantity>() {
            return Value::Quantity(value.cast::<Quantity>());
        }
        Value::Text(value.to_string())
    }

    pub fn into_dynamic(self) -> Dynamic {
        match self {
            Value::Nothing => Dynamic::UNIT,
            Value::Bool(b) => Dynamic::from_bool(b),
            Value::Int(n) => Dynamic::from_int(n),
            Value::Real(x) => Dynamic::from_float(x),
            Value::Rational(f) => Dynamic::from(f),
            Value::Date(d) => Dynamic::from(d),
            Value::DateTime(dt) => Dynamic::from(dt),
            Value::Duration(td) => Dynamic::from(td),
            Value::Period(p) => Dynamic::from(p),
            Value::Text(s) => Dynamic::from(s),
            Value::Sequence(items) => {
                let array: Array = items.into_iter().map(Value::into_dynamic).collect();
                Dynamic::from_array(array)
            }
            Value::Function(callable) => Dynamic::from(callable.ptr),
            Value::Quantity(q) => Dynamic::from(q),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Real(_) => "float",
            Value::Rational(_) => "fraction",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Period(_) => "period",
            Value::Text(_) => "text",
            Value::Sequence(_) => "sequence",
            Value::Function(_) => "function",
            Value::Quantity(_) => "quantity",
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Real(x) => Some(*x),
            Value::Rational(f) => Some(f.to_f64()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Quantity(q) if q.is_dimensionless() => Some(q.si),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Period(a), Value::Period(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.name() == b.name(),
            (Value::Quantity(a), Value::Quantity(b)) => a.dims == b.dims && a.si == b.si,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dynamic_primitives() {
        assert_eq!(Value::from_dynamic(Dynamic::from_int(3)), Value::Int(3));
        assert_eq!(Value::from_dynamic(Dynamic::from_float(0.5)), Value::Real(0.5));
        assert_eq!(Value::from_dynamic(Dynamic::from("hi")), Value::from("hi"));
        assert_eq!(Value::from_dynamic(Dynamic::UNIT), Value::Nothing);
    }

    #[test]
    fn test_from_dynamic_custom_types() {
        let half = Fraction::new(1, 2).unwrap();
        assert_eq!(Value::from_dynamic(Dynamic::from(half)), Value::Rational(half));

        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(Value::from_dynamic(Dynamic::from(day)), Value::Date(day));
    }

    #[test]
    fn test_sequence_round_trips_through_dynamic() {
        let seq = Value::Sequence(vec![Value::Int(1), Value::from("a")]);
        let back = Value::from_dynamic(seq.clone().into_dynamic());
        assert_eq!(back, seq);
    }
}
