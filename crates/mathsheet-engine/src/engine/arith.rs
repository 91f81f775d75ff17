//! Operator semantics over [`Value`]s.
//!
//! Numbers follow a tower: `Int < Rational < Real`. Mixing two kinds promotes
//! to the wider one. Integer division is exact when possible and falls back
//! to a real otherwise. Dates move by durations and calendar periods.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::cmp::Ordering;

use super::calendar;
use super::fraction::Fraction;
use super::value::Value;
use crate::units::Quantity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
        }
    }
}

const DIVISION_BY_ZERO: &str = "division by zero";
const OUT_OF_RANGE: &str = "date value out of range";

#[derive(Clone, Copy, Debug)]
enum Num {
    Int(i64),
    Rat(Fraction),
    Real(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Rational(f) => Some(Num::Rat(*f)),
            Value::Real(x) => Some(Num::Real(*x)),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Rat(f) => f.to_f64(),
            Num::Real(x) => x,
        }
    }

    fn to_fraction(self) -> Option<Fraction> {
        match self {
            Num::Int(n) => Some(Fraction::from_int(n)),
            Num::Rat(f) => Some(f),
            Num::Real(_) => None,
        }
    }
}

fn unsupported(op: BinaryOp, a: &Value, b: &Value) -> String {
    format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op.symbol(),
        a.kind(),
        b.kind()
    )
}

/// Apply a binary operator.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
        return numeric(op, x, y);
    }
    match (a, b) {
        (Value::Quantity(_), _) | (_, Value::Quantity(_)) => quantity(op, a, b),
        (Value::Text(x), Value::Text(y)) if op == BinaryOp::Add => Ok(Value::Text(format!("{x}{y}"))),
        (Value::Sequence(x), Value::Sequence(y)) if op == BinaryOp::Add => {
            Ok(Value::Sequence(x.iter().chain(y).cloned().collect()))
        }
        _ => temporal(op, a, b),
    }
}

fn numeric(op: BinaryOp, a: Num, b: Num) -> Result<Value, String> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => integer(op, x, y),
        (Num::Real(_), _) | (_, Num::Real(_)) => real(op, a.to_f64(), b.to_f64()),
        _ => {
            let (Some(x), Some(y)) = (a.to_fraction(), b.to_fraction()) else {
                return real(op, a.to_f64(), b.to_f64());
            };
            rational(op, x, y, b)
        }
    }
}

fn integer(op: BinaryOp, x: i64, y: i64) -> Result<Value, String> {
    let overflow = || "integer overflow".to_string();
    match op {
        BinaryOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Div => {
            if y == 0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            match x.checked_rem(y) {
                Some(0) => x.checked_div(y).map(Value::Int).ok_or_else(overflow),
                _ => Ok(Value::Real(x as f64 / y as f64)),
            }
        }
        BinaryOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(DIVISION_BY_ZERO.to_string());
                }
                return Ok(Value::Real((x as f64).powf(y as f64)));
            }
            let exact = u32::try_from(y).ok().and_then(|e| x.checked_pow(e));
            Ok(exact
                .map(Value::Int)
                .unwrap_or_else(|| Value::Real((x as f64).powf(y as f64))))
        }
    }
}

fn real(op: BinaryOp, x: f64, y: f64) -> Result<Value, String> {
    let out = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            x / y
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err("negative number cannot be raised to a fractional power".to_string());
            }
            x.powf(y)
        }
    };
    Ok(Value::Real(out))
}

fn rational(op: BinaryOp, x: Fraction, y: Fraction, raw_y: Num) -> Result<Value, String> {
    let exact = match op {
        BinaryOp::Add => x.checked_add(&y),
        BinaryOp::Sub => x.checked_sub(&y),
        BinaryOp::Mul => x.checked_mul(&y),
        BinaryOp::Div => {
            if y.numer() == 0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            x.checked_div(&y)
        }
        BinaryOp::Pow => {
            if !y.is_integer() {
                return real(op, x.to_f64(), raw_y.to_f64());
            }
            if x.numer() == 0 && y.numer() < 0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            x.checked_pow(y.numer())
        }
    };
    match exact {
        Some(f) => Ok(Value::Rational(f)),
        None => real(op, x.to_f64(), y.to_f64()),
    }
}

fn settle(q: Quantity) -> Value {
    if q.is_dimensionless() {
        Value::Real(q.si)
    } else {
        Value::Quantity(q)
    }
}

fn quantity(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    let scalar = |v: &Value| Num::of(v).map(Num::to_f64);
    match (a, b, op) {
        (Value::Quantity(x), Value::Quantity(y), BinaryOp::Add) => x.add(y).map(settle),
        (Value::Quantity(x), Value::Quantity(y), BinaryOp::Sub) => x.add(&y.scale(-1.0)).map(settle),
        (Value::Quantity(x), Value::Quantity(y), BinaryOp::Mul) => Ok(settle(x.mul(y))),
        (Value::Quantity(x), Value::Quantity(y), BinaryOp::Div) => {
            if y.si == 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            Ok(settle(x.div(y)))
        }
        (Value::Quantity(x), other, BinaryOp::Mul) | (other, Value::Quantity(x), BinaryOp::Mul) => {
            let k = scalar(other).ok_or_else(|| unsupported(op, a, b))?;
            Ok(settle(x.scale(k)))
        }
        (Value::Quantity(x), other, BinaryOp::Div) => {
            let k = scalar(other).ok_or_else(|| unsupported(op, a, b))?;
            if k == 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            Ok(settle(x.scale(1.0 / k)))
        }
        (other, Value::Quantity(y), BinaryOp::Div) => {
            let k = scalar(other).ok_or_else(|| unsupported(op, a, b))?;
            if y.si == 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            Ok(settle(y.powi(-1).scale(k)))
        }
        (Value::Quantity(x), Value::Int(n), BinaryOp::Pow) => {
            let exp = i8::try_from(*n).map_err(|_| "exponent too large for a quantity".to_string())?;
            Ok(settle(x.powi(exp)))
        }
        _ => Err(unsupported(op, a, b)),
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn scale_duration(delta: TimeDelta, k: f64) -> Result<Value, String> {
    let millis = delta.num_milliseconds() as f64 * k;
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Err("duration out of range".to_string());
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
        .map(Value::Duration)
        .ok_or_else(|| "duration out of range".to_string())
}

fn temporal(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, String> {
    let out_of_range = || OUT_OF_RANGE.to_string();
    match (op, a, b) {
        // Whole days only, as with a plain calendar date.
        (BinaryOp::Add, Value::Date(d), Value::Duration(t))
        | (BinaryOp::Add, Value::Duration(t), Value::Date(d)) => d
            .checked_add_signed(TimeDelta::days(t.num_days()))
            .map(Value::Date)
            .ok_or_else(out_of_range),
        (BinaryOp::Sub, Value::Date(d), Value::Duration(t)) => d
            .checked_sub_signed(TimeDelta::days(t.num_days()))
            .map(Value::Date)
            .ok_or_else(out_of_range),
        (BinaryOp::Add, Value::Date(d), Value::Period(p))
        | (BinaryOp::Add, Value::Period(p), Value::Date(d)) => {
            calendar::add_period(*d, *p).map(Value::Date).ok_or_else(out_of_range)
        }
        (BinaryOp::Sub, Value::Date(d), Value::Period(p)) => {
            calendar::add_period(*d, -*p).map(Value::Date).ok_or_else(out_of_range)
        }
        (BinaryOp::Add, Value::DateTime(dt), Value::Duration(t))
        | (BinaryOp::Add, Value::Duration(t), Value::DateTime(dt)) => dt
            .checked_add_signed(*t)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        (BinaryOp::Sub, Value::DateTime(dt), Value::Duration(t)) => dt
            .checked_sub_signed(*t)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        (BinaryOp::Add, Value::DateTime(dt), Value::Period(p))
        | (BinaryOp::Add, Value::Period(p), Value::DateTime(dt)) => {
            calendar::add_period_datetime(*dt, *p)
                .map(Value::DateTime)
                .ok_or_else(out_of_range)
        }
        (BinaryOp::Sub, Value::DateTime(dt), Value::Period(p)) => {
            calendar::add_period_datetime(*dt, -*p)
                .map(Value::DateTime)
                .ok_or_else(out_of_range)
        }
        (BinaryOp::Sub, Value::Date(x), Value::Date(y)) => Ok(Value::Duration(x.signed_duration_since(*y))),
        (BinaryOp::Sub, Value::DateTime(x), Value::DateTime(y)) => {
            Ok(Value::Duration(x.signed_duration_since(*y)))
        }
        (BinaryOp::Sub, Value::DateTime(x), Value::Date(y)) => {
            Ok(Value::Duration(x.signed_duration_since(midnight(*y))))
        }
        (BinaryOp::Sub, Value::Date(x), Value::DateTime(y)) => {
            Ok(Value::Duration(midnight(*x).signed_duration_since(*y)))
        }
        (BinaryOp::Add, Value::Duration(x), Value::Duration(y)) => {
            x.checked_add(y).map(Value::Duration).ok_or_else(out_of_range)
        }
        (BinaryOp::Sub, Value::Duration(x), Value::Duration(y)) => {
            x.checked_sub(y).map(Value::Duration).ok_or_else(out_of_range)
        }
        (BinaryOp::Div, Value::Duration(x), Value::Duration(y)) => {
            if y.is_zero() {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            Ok(Value::Real(
                x.num_milliseconds() as f64 / y.num_milliseconds() as f64,
            ))
        }
        (BinaryOp::Mul, Value::Duration(t), k) | (BinaryOp::Mul, k, Value::Duration(t)) => {
            let k = Num::of(k).ok_or_else(|| unsupported(op, a, b))?;
            scale_duration(*t, k.to_f64())
        }
        (BinaryOp::Div, Value::Duration(t), k) => {
            let k = Num::of(k).ok_or_else(|| unsupported(op, a, b))?.to_f64();
            if k == 0.0 {
                return Err(DIVISION_BY_ZERO.to_string());
            }
            scale_duration(*t, 1.0 / k)
        }
        (BinaryOp::Add, Value::Period(x), Value::Period(y)) => {
            x.checked_add(y).map(Value::Period).ok_or_else(out_of_range)
        }
        (BinaryOp::Sub, Value::Period(x), Value::Period(y)) => {
            x.checked_add(&-*y).map(Value::Period).ok_or_else(out_of_range)
        }
        (BinaryOp::Mul, Value::Period(p), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::Period(p)) => {
            p.checked_mul(*n).map(Value::Period).ok_or_else(out_of_range)
        }
        _ => Err(unsupported(op, a, b)),
    }
}

/// Unary minus.
pub fn negate(value: &Value) -> Result<Value, String> {
    match value {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        Value::Real(x) => Ok(Value::Real(-x)),
        Value::Rational(f) => Ok(Value::Rational(-*f)),
        Value::Duration(t) => Ok(Value::Duration(-*t)),
        Value::Period(p) => Ok(Value::Period(-*p)),
        Value::Quantity(q) => Ok(Value::Quantity(q.scale(-1.0))),
        other => Err(format!("bad operand type for unary -: '{}'", other.kind())),
    }
}

/// Ordering between two values, `None` when they are not comparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
        return match (x.to_fraction(), y.to_fraction()) {
            (Some(p), Some(q)) => Some(p.cmp(&q)),
            _ => x.to_f64().partial_cmp(&y.to_f64()),
        };
    }
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::DateTime(y)) => Some(midnight(*x).cmp(y)),
        (Value::DateTime(x), Value::Date(y)) => Some(x.cmp(&midnight(*y))),
        (Value::Duration(x), Value::Duration(y)) => Some(x.cmp(y)),
        (Value::Period(x), Value::Period(y)) => Some(x.months.cmp(&y.months)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Quantity(x), Value::Quantity(y)) if x.dims == y.dims => x.si.partial_cmp(&y.si),
        _ => None,
    }
}

/// Equality across kinds: `1 == 1.0 == Fraction(2, 2)`.
pub fn equals(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calendar::Period;

    fn frac(n: i64, d: i64) -> Value {
        Value::Rational(Fraction::new(n, d).unwrap())
    }

    #[test]
    fn test_integer_division_is_exact_when_possible() {
        assert_eq!(binary(BinaryOp::Div, &Value::Int(6), &Value::Int(3)), Ok(Value::Int(2)));
        assert_eq!(binary(BinaryOp::Div, &Value::Int(1), &Value::Int(4)), Ok(Value::Real(0.25)));
        assert!(binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_power() {
        assert_eq!(binary(BinaryOp::Pow, &Value::Int(2), &Value::Int(10)), Ok(Value::Int(1024)));
        assert_eq!(binary(BinaryOp::Pow, &Value::Int(2), &Value::Int(-1)), Ok(Value::Real(0.5)));
        assert_eq!(binary(BinaryOp::Pow, &Value::Int(9), &Value::Real(0.5)), Ok(Value::Real(3.0)));
        assert!(matches!(
            binary(BinaryOp::Pow, &Value::Int(2), &Value::Int(100)),
            Ok(Value::Real(_))
        ));
    }

    #[test]
    fn test_rational_stays_exact() {
        assert_eq!(binary(BinaryOp::Add, &frac(1, 2), &frac(1, 3)), Ok(frac(5, 6)));
        assert_eq!(binary(BinaryOp::Mul, &frac(3, 4), &Value::Int(2)), Ok(frac(3, 2)));
        assert_eq!(binary(BinaryOp::Pow, &frac(1, 2), &Value::Int(2)), Ok(frac(1, 4)));
        assert_eq!(
            binary(BinaryOp::Add, &frac(1, 2), &Value::Real(0.25)),
            Ok(Value::Real(0.75))
        );
    }

    #[test]
    fn test_date_plus_month_clamps() {
        let jan31 = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        let month = Value::Period(Period::months(1));
        assert_eq!(
            binary(BinaryOp::Add, &jan31, &month),
            Ok(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
    }

    #[test]
    fn test_date_difference_and_duration_scaling() {
        let a = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let b = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(
            binary(BinaryOp::Sub, &a, &b),
            Ok(Value::Duration(TimeDelta::days(29)))
        );

        let hour = Value::Duration(TimeDelta::hours(1));
        assert_eq!(
            binary(BinaryOp::Mul, &hour, &Value::Int(3)),
            Ok(Value::Duration(TimeDelta::hours(3)))
        );
        assert_eq!(
            binary(BinaryOp::Div, &Value::Duration(TimeDelta::hours(3)), &hour),
            Ok(Value::Real(3.0))
        );
    }

    #[test]
    fn test_quantities() {
        let kg = Value::Quantity(Quantity::of("kg").unwrap());
        let five_kg = binary(BinaryOp::Mul, &Value::Int(5), &kg).unwrap();
        let Value::Quantity(q) = &five_kg else {
            panic!("expected a quantity");
        };
        assert_eq!(q.display_value(), 5.0);

        let ratio = binary(BinaryOp::Div, &five_kg, &kg).unwrap();
        assert_eq!(ratio, Value::Real(5.0));

        let metre = Value::Quantity(Quantity::of("m").unwrap());
        assert!(binary(BinaryOp::Add, &five_kg, &metre).is_err());
    }

    #[test]
    fn test_unsupported_operands_are_reported() {
        let err = binary(BinaryOp::Mul, &Value::from("a"), &Value::Int(1)).unwrap_err();
        assert!(err.contains("'text' and 'int'"));
    }

    #[test]
    fn test_compare_across_kinds() {
        assert!(equals(&Value::Int(1), &Value::Real(1.0)));
        assert!(equals(&frac(2, 2), &Value::Int(1)));
        assert_eq!(compare(&frac(1, 3), &Value::Real(0.5)), Some(Ordering::Less));
        assert_eq!(compare(&Value::from("a"), &Value::Int(1)), None);
    }
}
