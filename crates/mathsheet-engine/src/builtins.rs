//! Built-in worksheet functions (Rust) registered on the Rhai engine.
//!
//! Conventions:
//! - Names are lower case, as typed in a worksheet (`sqrt`, `mean`, `date`).
//! - Operators between worksheet value types (fractions, dates, durations,
//!   quantities) are overloads that delegate to [`crate::engine::arith`].
//! - Functions over sequences accept any Rhai array and work on [`Value`]s,
//!   so they handle fractions and durations as well as plain numbers.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use rand::Rng;
use rand::seq::SliceRandom;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::engine::arith::{self, BinaryOp};
use crate::engine::calendar::{self, Period};
use crate::engine::fraction::{DEFAULT_MAX_DENOMINATOR, Fraction};
use crate::engine::format::{RenderOptions, render};
use crate::engine::value::Value;
use crate::units::Quantity;

/// Any type Rhai can pass to a registered function.
trait Operand: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Operand for T {}

/// Named constants visible to every expression.
pub fn constants() -> Vec<(&'static str, Dynamic)> {
    vec![
        ("pi", Dynamic::from_float(std::f64::consts::PI)),
        ("e", Dynamic::from_float(std::f64::consts::E)),
        ("tau", Dynamic::from_float(std::f64::consts::TAU)),
        ("inf", Dynamic::from_float(f64::INFINITY)),
        ("nan", Dynamic::from_float(f64::NAN)),
    ]
}

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

type FnResult<T> = Result<T, Box<EvalAltResult>>;

fn value_result(result: Result<Value, String>) -> FnResult<Dynamic> {
    result.map(Value::into_dynamic).map_err(|e| invalid_arg(&e))
}

fn values_of(arr: Array) -> Vec<Value> {
    arr.into_iter().map(Value::from_dynamic).collect()
}

fn pair<A: Operand, B: Operand>(a: A, b: B) -> (Value, Value) {
    (
        Value::from_dynamic(Dynamic::from(a)),
        Value::from_dynamic(Dynamic::from(b)),
    )
}

pub fn register_builtins(engine: &mut Engine) {
    engine.register_type_with_name::<Fraction>("Fraction");
    engine.register_type_with_name::<NaiveDate>("Date");
    engine.register_type_with_name::<NaiveDateTime>("DateTime");
    engine.register_type_with_name::<TimeDelta>("Duration");
    engine.register_type_with_name::<Period>("Period");
    engine.register_type_with_name::<Quantity>("Quantity");

    register_operators(engine);
    register_math(engine);
    register_sequences(engine);
    register_random(engine);
    register_calendar(engine);
    register_fractions(engine);
    register_units(engine);
    register_display(engine);
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

const ARITHMETIC: [BinaryOp; 5] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::Pow,
];

fn register_binary<A: Operand, B: Operand>(engine: &mut Engine, op: BinaryOp) {
    engine.register_fn(op.symbol(), move |a: A, b: B| -> FnResult<Dynamic> {
        let (a, b) = pair(a, b);
        value_result(arith::binary(op, &a, &b))
    });
}

fn register_comparisons<A: Operand, B: Operand>(engine: &mut Engine) {
    let tests: [(&str, fn(Ordering) -> bool); 4] = [
        ("<", Ordering::is_lt),
        ("<=", Ordering::is_le),
        (">", Ordering::is_gt),
        (">=", Ordering::is_ge),
    ];
    for (op, test) in tests {
        engine.register_fn(op, move |a: A, b: B| -> FnResult<bool> {
            let (a, b) = pair(a, b);
            arith::compare(&a, &b).map(test).ok_or_else(|| {
                invalid_arg(&format!(
                    "cannot compare '{}' and '{}'",
                    a.kind(),
                    b.kind()
                ))
            })
        });
    }
    engine.register_fn("==", |a: A, b: B| -> bool {
        let (a, b) = pair(a, b);
        arith::equals(&a, &b)
    });
    engine.register_fn("!=", |a: A, b: B| -> bool {
        let (a, b) = pair(a, b);
        !arith::equals(&a, &b)
    });
}

fn register_pair<A: Operand, B: Operand>(engine: &mut Engine) {
    for op in ARITHMETIC {
        register_binary::<A, B>(engine, op);
    }
    register_comparisons::<A, B>(engine);
}

/// Every operator between `C` and the other operand types, both ways round.
fn register_custom<C: Operand>(engine: &mut Engine) {
    register_pair::<C, i64>(engine);
    register_pair::<i64, C>(engine);
    register_pair::<C, f64>(engine);
    register_pair::<f64, C>(engine);
    register_pair::<C, Fraction>(engine);
    register_pair::<C, NaiveDate>(engine);
    register_pair::<C, NaiveDateTime>(engine);
    register_pair::<C, TimeDelta>(engine);
    register_pair::<C, Period>(engine);
    register_pair::<C, Quantity>(engine);

    engine.register_fn("-", |a: C| -> FnResult<Dynamic> {
        value_result(arith::negate(&Value::from_dynamic(Dynamic::from(a))))
    });
}

fn register_operators(engine: &mut Engine) {
    // True division and real exponents for plain numbers.
    for op in [BinaryOp::Div, BinaryOp::Pow] {
        register_binary::<i64, i64>(engine, op);
        register_binary::<i64, f64>(engine, op);
        register_binary::<f64, i64>(engine, op);
        register_binary::<f64, f64>(engine, op);
    }

    register_custom::<Fraction>(engine);
    register_custom::<NaiveDate>(engine);
    register_custom::<NaiveDateTime>(engine);
    register_custom::<TimeDelta>(engine);
    register_custom::<Period>(engine);
    register_custom::<Quantity>(engine);
}

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

fn checked_real(input: f64, output: f64) -> FnResult<f64> {
    if output.is_nan() && !input.is_nan() {
        return Err(invalid_arg("math domain error"));
    }
    Ok(output)
}

/// Register a real function for ints, reals and fractions.
fn register_real_fn(engine: &mut Engine, name: &'static str, f: fn(f64) -> f64) {
    engine.register_fn(name, move |x: f64| checked_real(x, f(x)));
    engine.register_fn(name, move |x: i64| checked_real(x as f64, f(x as f64)));
    engine.register_fn(name, move |x: Fraction| checked_real(x.to_f64(), f(x.to_f64())));
}

fn to_integer(x: f64) -> FnResult<i64> {
    if !x.is_finite() || x.abs() >= i64::MAX as f64 {
        return Err(invalid_arg("cannot convert float to integer"));
    }
    Ok(x as i64)
}

/// Register a real-to-integer function (`floor`, `ceil`, ...).
fn register_integral_fn(engine: &mut Engine, name: &'static str, f: fn(f64) -> f64) {
    engine.register_fn(name, move |x: f64| to_integer(f(x)));
    engine.register_fn(name, |x: i64| x);
    engine.register_fn(name, move |x: Fraction| to_integer(f(x.to_f64())));
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

pub(crate) fn factorial(n: i64) -> FnResult<Dynamic> {
    if n < 0 {
        return Err(invalid_arg("factorial() not defined for negative values"));
    }
    let mut exact: Option<i64> = Some(1);
    let mut approx = 1.0f64;
    for k in 2..=n {
        exact = exact.and_then(|acc| acc.checked_mul(k));
        approx *= k as f64;
        if approx.is_infinite() {
            return Err(invalid_arg("factorial() result too large"));
        }
    }
    Ok(match exact {
        Some(v) => Dynamic::from_int(v),
        None => Dynamic::from_float(approx),
    })
}

fn register_math(engine: &mut Engine) {
    register_real_fn(engine, "sqrt", f64::sqrt);
    register_real_fn(engine, "cbrt", f64::cbrt);
    register_real_fn(engine, "exp", f64::exp);
    register_real_fn(engine, "ln", f64::ln);
    register_real_fn(engine, "log", f64::ln);
    register_real_fn(engine, "log10", f64::log10);
    register_real_fn(engine, "log2", f64::log2);
    register_real_fn(engine, "sin", f64::sin);
    register_real_fn(engine, "cos", f64::cos);
    register_real_fn(engine, "tan", f64::tan);
    register_real_fn(engine, "asin", f64::asin);
    register_real_fn(engine, "acos", f64::acos);
    register_real_fn(engine, "atan", f64::atan);
    register_real_fn(engine, "sinh", f64::sinh);
    register_real_fn(engine, "cosh", f64::cosh);
    register_real_fn(engine, "tanh", f64::tanh);
    register_real_fn(engine, "degrees", f64::to_degrees);
    register_real_fn(engine, "radians", f64::to_radians);
    register_real_fn(engine, "float", |x| x);

    register_integral_fn(engine, "floor", f64::floor);
    register_integral_fn(engine, "ceil", f64::ceil);
    register_integral_fn(engine, "round", f64::round);
    register_integral_fn(engine, "trunc", f64::trunc);
    register_integral_fn(engine, "int", f64::trunc);

    engine.register_fn("log", |x: f64, base: f64| checked_real(x, x.ln() / base.ln()));
    engine.register_fn("log", |x: i64, base: i64| {
        checked_real(x as f64, (x as f64).ln() / (base as f64).ln())
    });
    engine.register_fn("atan2", |y: f64, x: f64| y.atan2(x));
    engine.register_fn("atan2", |y: i64, x: i64| (y as f64).atan2(x as f64));
    engine.register_fn("hypot", |a: f64, b: f64| a.hypot(b));
    engine.register_fn("hypot", |a: i64, b: i64| (a as f64).hypot(b as f64));
    engine.register_fn("round", |x: f64, digits: i64| -> FnResult<f64> {
        let digits = i32::try_from(digits).map_err(|_| invalid_arg("digits out of range"))?;
        let scale = 10f64.powi(digits);
        Ok((x * scale).round() / scale)
    });
    engine.register_fn("round", |x: i64, _digits: i64| x);

    engine.register_fn("abs", |x: Fraction| Fraction::new(x.numer().abs(), x.denom()).unwrap_or(x));
    engine.register_fn("abs", |x: TimeDelta| x.abs());
    engine.register_fn("abs", |x: Quantity| Quantity { si: x.si.abs(), ..x });

    engine.register_fn("gcd", gcd);
    engine.register_fn("lcm", |a: i64, b: i64| -> FnResult<i64> {
        if a == 0 || b == 0 {
            return Ok(0);
        }
        (a / gcd(a, b))
            .checked_mul(b)
            .map(i64::abs)
            .ok_or_else(|| invalid_arg("integer overflow"))
    });
    engine.register_fn("factorial", factorial);
    engine.register_fn("factorial", |x: f64| -> FnResult<Dynamic> {
        if x.fract() != 0.0 {
            return Err(invalid_arg("factorial() only accepts integral values"));
        }
        factorial(to_integer(x)?)
    });
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn fold(op: BinaryOp, items: &[Value], empty: Value) -> Result<Value, String> {
    let Some((first, rest)) = items.split_first() else {
        return Ok(empty);
    };
    rest.iter()
        .try_fold(first.clone(), |acc, item| arith::binary(op, &acc, item))
}

pub(crate) fn sum(items: &[Value]) -> Result<Value, String> {
    fold(BinaryOp::Add, items, Value::Int(0))
}

fn mean(items: &[Value]) -> Result<Value, String> {
    let total = sum(items)?;
    let count = Value::Int(items.len().max(1) as i64);
    arith::binary(BinaryOp::Div, &total, &count)
}

fn sorted(items: &[Value]) -> Result<Vec<Value>, String> {
    let mut out = items.to_vec();
    let mut failure = None;
    out.sort_by(|a, b| {
        arith::compare(a, b).unwrap_or_else(|| {
            failure = Some(format!("cannot compare '{}' and '{}'", a.kind(), b.kind()));
            Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn median(items: &[Value]) -> Result<Value, String> {
    let n = items.len();
    if n == 0 {
        return Ok(Value::Nothing);
    }
    let s = sorted(items)?;
    if n % 2 == 1 {
        return Ok(s[n / 2].clone());
    }
    let both = arith::binary(BinaryOp::Add, &s[n / 2 - 1], &s[n / 2])?;
    arith::binary(BinaryOp::Div, &both, &Value::Real(2.0))
}

fn extreme(items: &[Value], wanted: Ordering) -> Result<Value, String> {
    let Some((first, rest)) = items.split_first() else {
        return Err("arg is an empty sequence".to_string());
    };
    rest.iter().try_fold(first.clone(), |best, item| {
        match arith::compare(item, &best) {
            Some(o) if o == wanted => Ok(item.clone()),
            Some(_) => Ok(best),
            None => Err(format!(
                "cannot compare '{}' and '{}'",
                item.kind(),
                best.kind()
            )),
        }
    })
}

/// The `n`-th item from the top of a stack; `0` when there is no such item.
pub fn stack_at(stack: &Array, n: i64) -> Dynamic {
    match usize::try_from(n) {
        Ok(n) if n >= 1 && n <= stack.len() => stack[stack.len() - n].clone(),
        _ => Dynamic::from_int(0),
    }
}

/// Two-argument `min`/`max` for plain numbers.
fn register_pairwise_extreme<A: Operand, B: Operand>(engine: &mut Engine) {
    engine.register_fn("min", |a: A, b: B| {
        let (a, b) = pair(a, b);
        value_result(extreme(&[a, b], Ordering::Less))
    });
    engine.register_fn("max", |a: A, b: B| {
        let (a, b) = pair(a, b);
        value_result(extreme(&[a, b], Ordering::Greater))
    });
}

fn register_sequences(engine: &mut Engine) {
    engine.register_fn("sum", |arr: Array| value_result(sum(&values_of(arr))));
    engine.register_fn("prod", |arr: Array| {
        value_result(fold(BinaryOp::Mul, &values_of(arr), Value::Int(1)))
    });
    engine.register_fn("mean", |arr: Array| value_result(mean(&values_of(arr))));
    engine.register_fn("avg", |arr: Array| value_result(mean(&values_of(arr))));
    engine.register_fn("median", |arr: Array| value_result(median(&values_of(arr))));
    engine.register_fn("count", |arr: Array| arr.len() as i64);
    engine.register_fn("min", |arr: Array| {
        value_result(extreme(&values_of(arr), Ordering::Less))
    });
    engine.register_fn("max", |arr: Array| {
        value_result(extreme(&values_of(arr), Ordering::Greater))
    });
    register_pairwise_extreme::<i64, i64>(engine);
    register_pairwise_extreme::<i64, f64>(engine);
    register_pairwise_extreme::<f64, i64>(engine);
    register_pairwise_extreme::<f64, f64>(engine);
    engine.register_fn("sorted", |arr: Array| -> FnResult<Array> {
        let items = sorted(&values_of(arr)).map_err(|e| invalid_arg(&e))?;
        Ok(items.into_iter().map(Value::into_dynamic).collect())
    });

    // Share of a row in its group, for per-row table columns.
    let share = |this: Dynamic, group: Array| -> FnResult<Dynamic> {
        let total = sum(&values_of(group)).map_err(|e| invalid_arg(&e))?;
        value_result(arith::binary(BinaryOp::Div, &Value::from_dynamic(this), &total))
    };
    engine.register_fn("share", share);
    engine.register_fn("share", move |this: Dynamic, group: Array, _all: Array| share(this, group));

    engine.register_fn("stack_at", |stack: Array, n: i64| stack_at(&stack, n));
}

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

const PASSWORD_CHARS: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Consonant-vowel-consonant syllables, sorted.
fn syllables() -> &'static [String] {
    static SYLLABLES: OnceLock<Vec<String>> = OnceLock::new();
    SYLLABLES.get_or_init(|| {
        let single = |skip: &str| -> Vec<String> {
            ('a'..='z')
                .filter(|c| !"aeiou".contains(*c) && !skip.contains(*c))
                .map(String::from)
                .collect()
        };
        let mut initial = single("qxc");
        initial.extend(
            [
                "bl", "br", "cl", "cr", "dr", "fl", "fr", "gl", "gr", "pl", "pr", "sk", "sl", "sm", "sn",
                "sp", "st", "str", "sw", "tr",
            ]
            .map(String::from),
        );
        let mut last = single("qxcsj");
        last.extend(
            [
                "ct", "ft", "mp", "nd", "ng", "nk", "nt", "pt", "sk", "sp", "ss", "st", "oy", "ji", "ch",
                "ee", "zz", "fj", "tz",
            ]
            .map(String::from),
        );

        let mut out = Vec::new();
        for i in &initial {
            for v in ['a', 'e', 'i', 'o', 'u'] {
                for f in &last {
                    out.push(format!("{i}{v}{f}"));
                }
            }
        }
        out.sort();
        out.dedup();
        out
    })
}

fn register_random(engine: &mut Engine) {
    engine.register_fn("random", || -> f64 { rand::thread_rng().r#gen() });
    engine.register_fn("randint", |min: i64, max: i64| -> FnResult<i64> {
        if min > max {
            return Err(invalid_arg("empty range for randint()"));
        }
        Ok(rand::thread_rng().gen_range(min..=max))
    });
    engine.register_fn("uniform", |a: f64, b: f64| -> f64 {
        a + (b - a) * rand::thread_rng().r#gen::<f64>()
    });
    engine.register_fn("uniform", |a: i64, b: i64| -> f64 {
        a as f64 + (b - a) as f64 * rand::thread_rng().r#gen::<f64>()
    });
    engine.register_fn("choice", |arr: Array| -> FnResult<Dynamic> {
        arr.choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| invalid_arg("cannot choose from an empty sequence"))
    });
    engine.register_fn("password", |n: i64| -> FnResult<String> {
        let n = usize::try_from(n).map_err(|_| invalid_arg("length must be >= 0"))?;
        let mut rng = rand::rngs::OsRng;
        Ok((0..n)
            .filter_map(|_| PASSWORD_CHARS.choose(&mut rng).map(|&b| b as char))
            .collect())
    });
    engine.register_fn("gibberish", |n: i64| -> FnResult<String> {
        let n = usize::try_from(n).map_err(|_| invalid_arg("word count must be >= 0"))?;
        let pool = syllables();
        if n > pool.len() {
            return Err(invalid_arg("sample larger than population"));
        }
        let words: Vec<&str> = pool
            .choose_multiple(&mut rand::thread_rng(), n)
            .map(String::as_str)
            .collect();
        Ok(words.join(" "))
    });
}

// ---------------------------------------------------------------------------
// Dates and durations
// ---------------------------------------------------------------------------

fn to_u32(value: i64, label: &str) -> FnResult<u32> {
    u32::try_from(value).map_err(|_| invalid_arg(&format!("{} out of range", label)))
}

fn make_date(y: i64, m: i64, d: i64) -> FnResult<NaiveDate> {
    let year = i32::try_from(y).map_err(|_| invalid_arg("year out of range"))?;
    NaiveDate::from_ymd_opt(year, to_u32(m, "month")?, to_u32(d, "day")?)
        .ok_or_else(|| invalid_arg(&format!("invalid date {}-{}-{}", y, m, d)))
}

fn make_datetime(date: NaiveDate, h: i64, mi: i64, s: i64) -> FnResult<NaiveDateTime> {
    date.and_hms_opt(to_u32(h, "hour")?, to_u32(mi, "minute")?, to_u32(s, "second")?)
        .ok_or_else(|| invalid_arg(&format!("invalid time {}:{}:{}", h, mi, s)))
}

fn span(seconds: f64) -> FnResult<TimeDelta> {
    calendar::duration_from_seconds(seconds).ok_or_else(|| invalid_arg("duration out of range"))
}

fn register_duration_ctor(engine: &mut Engine, name: &'static str, unit_seconds: f64) {
    engine.register_fn(name, move |n: i64| span(n as f64 * unit_seconds));
    engine.register_fn(name, move |n: f64| span(n * unit_seconds));
}

fn register_calendar(engine: &mut Engine) {
    engine.register_fn("date", make_date);
    engine.register_fn("date", |dt: NaiveDateTime| dt.date());
    engine.register_fn("datetime", |y: i64, m: i64, d: i64| -> FnResult<NaiveDateTime> {
        make_datetime(make_date(y, m, d)?, 0, 0, 0)
    });
    engine.register_fn(
        "datetime",
        |y: i64, m: i64, d: i64, h: i64, mi: i64, s: i64| -> FnResult<NaiveDateTime> {
            make_datetime(make_date(y, m, d)?, h, mi, s)
        },
    );

    register_duration_ctor(engine, "seconds", 1.0);
    register_duration_ctor(engine, "minutes", 60.0);
    register_duration_ctor(engine, "hours", 3600.0);
    register_duration_ctor(engine, "days", 86_400.0);
    register_duration_ctor(engine, "weeks", 604_800.0);
    engine.register_fn("months", Period::months);
    engine.register_fn("years", |n: i64| -> FnResult<Period> {
        Period::years(n).ok_or_else(|| invalid_arg("period out of range"))
    });

    engine.register_get("year", |d: &mut NaiveDate| d.year() as i64);
    engine.register_get("month", |d: &mut NaiveDate| d.month() as i64);
    engine.register_get("day", |d: &mut NaiveDate| d.day() as i64);
    engine.register_get("weekday", |d: &mut NaiveDate| {
        d.weekday().num_days_from_monday() as i64
    });
    engine.register_get("year", |d: &mut NaiveDateTime| d.year() as i64);
    engine.register_get("month", |d: &mut NaiveDateTime| d.month() as i64);
    engine.register_get("day", |d: &mut NaiveDateTime| d.day() as i64);
    engine.register_get("weekday", |d: &mut NaiveDateTime| {
        d.weekday().num_days_from_monday() as i64
    });
    engine.register_get("hour", |d: &mut NaiveDateTime| d.hour() as i64);
    engine.register_get("minute", |d: &mut NaiveDateTime| d.minute() as i64);
    engine.register_get("second", |d: &mut NaiveDateTime| d.second() as i64);

    // Normalised like a Python timedelta: whole days plus 0 <= seconds < 86400.
    engine.register_get("days", |t: &mut TimeDelta| t.num_seconds().div_euclid(86_400));
    engine.register_get("seconds", |t: &mut TimeDelta| t.num_seconds().rem_euclid(86_400));
    engine.register_fn("total_seconds", |t: TimeDelta| t.num_milliseconds() as f64 / 1000.0);
    engine.register_get("months", |p: &mut Period| p.months);
}

// ---------------------------------------------------------------------------
// Fractions
// ---------------------------------------------------------------------------

fn register_fractions(engine: &mut Engine) {
    engine.register_fn("Fraction", |n: i64, d: i64| -> FnResult<Fraction> {
        if d == 0 {
            return Err(invalid_arg(&format!("Fraction({}, 0)", n)));
        }
        Fraction::new(n, d).ok_or_else(|| invalid_arg("fraction out of range"))
    });
    engine.register_fn("Fraction", Fraction::from_int);
    engine.register_fn("Fraction", |x: f64| -> FnResult<Fraction> {
        Fraction::from_f64(x).ok_or_else(|| invalid_arg(&format!("cannot convert {} to a fraction", x)))
    });
    engine.register_fn("Fraction", |text: &str| -> FnResult<Fraction> {
        Fraction::parse(text)
            .ok_or_else(|| invalid_arg(&format!("invalid literal for Fraction: '{}'", text)))
    });
    engine.register_fn("approximate", |f: Fraction| f.approximate());
    engine.register_fn("limit_denominator", |f: Fraction| {
        f.limit_denominator(DEFAULT_MAX_DENOMINATOR)
    });
    engine.register_fn("limit_denominator", |f: Fraction, max: i64| -> FnResult<Fraction> {
        if max < 1 {
            return Err(invalid_arg("max_denominator should be at least 1"));
        }
        Ok(f.limit_denominator(max))
    });
    engine.register_get("numerator", |f: &mut Fraction| f.numer());
    engine.register_get("denominator", |f: &mut Fraction| f.denom());
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

fn register_units(engine: &mut Engine) {
    engine.register_fn("unit", |symbol: &str| -> FnResult<Quantity> {
        Quantity::of(symbol).ok_or_else(|| invalid_arg(&format!("unknown unit '{}'", symbol)))
    });
    engine.register_fn("convert", |q: Quantity, symbol: &str| -> FnResult<Quantity> {
        q.convert(symbol).map_err(|e| invalid_arg(&e))
    });
    engine.register_fn("magnitude", |q: Quantity| q.display_value());
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn register_to_string<T: Operand>(engine: &mut Engine) {
    engine.register_fn("to_string", |x: &mut T| {
        render(&Value::from_dynamic(Dynamic::from(x.clone())), &RenderOptions::default())
    });
    engine.register_fn("to_debug", |x: &mut T| {
        render(&Value::from_dynamic(Dynamic::from(x.clone())), &RenderOptions::default())
    });
}

fn register_display(engine: &mut Engine) {
    register_to_string::<Fraction>(engine);
    register_to_string::<NaiveDate>(engine);
    register_to_string::<NaiveDateTime>(engine);
    register_to_string::<TimeDelta>(engine);
    register_to_string::<Period>(engine);
    register_to_string::<Quantity>(engine);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        engine.set_fast_operators(false);
        register_builtins(&mut engine);
        engine
    }

    fn eval(expr: &str) -> Value {
        Value::from_dynamic(engine().eval::<Dynamic>(expr).unwrap())
    }

    #[test]
    fn test_true_division() {
        assert_eq!(eval("7 / 2"), Value::Real(3.5));
        assert_eq!(eval("8 / 2"), Value::Int(4));
        assert!(engine().eval::<Dynamic>("1 / 0").is_err());
        assert_eq!(eval("2 ** -1"), Value::Real(0.5));
    }

    #[test]
    fn test_fraction_arithmetic() {
        assert_eq!(
            eval("Fraction(1, 2) + Fraction(1, 3)"),
            Value::Rational(Fraction::new(5, 6).unwrap())
        );
        assert_eq!(
            eval("approximate(Fraction(\"0.6667\"))"),
            Value::Rational(Fraction::new(2, 3).unwrap())
        );
        assert_eq!(eval("Fraction(3, 4) == 0.75"), Value::Bool(true));
    }

    #[test]
    fn test_sequence_aggregates() {
        assert_eq!(eval("sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(eval("mean([1, 2])"), Value::Real(1.5));
        assert_eq!(eval("median([3, 1, 2])"), Value::Int(2));
        assert_eq!(eval("median([4, 1, 3, 2])"), Value::Real(2.5));
        assert_eq!(eval("prod([2, 3, 4])"), Value::Int(24));
        assert_eq!(eval("max([2, 9, 4])"), Value::Int(9));
        assert_eq!(eval("sum([])"), Value::Int(0));
    }

    #[test]
    fn test_stack_at() {
        assert_eq!(eval("stack_at([10, 20], 1)"), Value::Int(20));
        assert_eq!(eval("stack_at([10, 20], 2)"), Value::Int(10));
        assert_eq!(eval("stack_at([10, 20], 5)"), Value::Int(0));
        assert_eq!(eval("stack_at([10, 20], 9223372036854775807)"), Value::Int(0));
        assert_eq!(eval("stack_at([10, 20], 0)"), Value::Int(0));
    }

    #[test]
    fn test_calendar() {
        assert_eq!(
            eval("date(2024, 1, 31) + months(1)"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(eval("(date(2024, 3, 1) - date(2024, 2, 1)).days"), Value::Int(29));
        assert_eq!(eval("date(2024, 2, 29).weekday"), Value::Int(3));
        assert!(engine().eval::<Dynamic>("date(2023, 2, 29)").is_err());
    }

    #[test]
    fn test_math_and_factorial() {
        assert_eq!(eval("sqrt(16)"), Value::Real(4.0));
        assert_eq!(eval("floor(2.7)"), Value::Int(2));
        assert_eq!(eval("factorial(5)"), Value::Int(120));
        assert!(matches!(eval("factorial(25)"), Value::Real(_)));
        assert!(engine().eval::<Dynamic>("sqrt(-1)").is_err());
    }

    #[test]
    fn test_random_helpers() {
        let Value::Text(pw) = eval("password(12)") else {
            panic!("expected text");
        };
        assert_eq!(pw.chars().count(), 12);

        let Value::Text(words) = eval("gibberish(3)") else {
            panic!("expected text");
        };
        assert_eq!(words.split(' ').count(), 3);

        let Value::Int(n) = eval("randint(1, 6)") else {
            panic!("expected int");
        };
        assert!((1..=6).contains(&n));
    }

    #[test]
    fn test_units() {
        let Value::Quantity(q) = eval("5 * unit(\"kg\") + 300 * unit(\"g\")") else {
            panic!("expected quantity");
        };
        assert_eq!(q.unit, Some("kg"));
        assert!((q.display_value() - 5.3).abs() < 1e-9);
    }
}
