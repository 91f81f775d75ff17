//! Exact rational numbers.
//!
//! Fractions are always stored reduced with a positive denominator, so two
//! equal values compare equal structurally.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum denominator used when approximating a float (matches the usual
/// `limit_denominator()` default).
pub const DEFAULT_MAX_DENOMINATOR: i64 = 1_000_000;

/// Relative error accepted by [`Fraction::approximate`].
const APPROXIMATION_TOLERANCE: f64 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fraction {
    num: i64,
    den: i64,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Fraction {
    /// Create a reduced fraction. Returns `None` for a zero denominator or
    /// when the reduced value does not fit in 64 bits.
    pub fn new(num: i64, den: i64) -> Option<Fraction> {
        Self::from_wide(num as i128, den as i128)
    }

    pub fn from_int(n: i64) -> Fraction {
        Fraction { num: n, den: 1 }
    }

    fn from_wide(num: i128, den: i128) -> Option<Fraction> {
        if den == 0 {
            return None;
        }
        let g = gcd(num, den).max(1);
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = -num;
            den = -den;
        }
        Some(Fraction {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Parse decimal text exactly: `"0.5"` is 1/2, `"-1.25"` is -5/4.
    /// Also accepts `"3/4"` and plain integers.
    pub fn parse(text: &str) -> Option<Fraction> {
        let text = text.trim();
        if let Some((n, d)) = text.split_once('/') {
            let n: i64 = n.trim().parse().ok()?;
            let d: i64 = d.trim().parse().ok()?;
            return Fraction::new(n, d);
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let mut num: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            num = num.checked_mul(10)?.checked_add(c.to_digit(10)? as i128)?;
        }
        let den = 10i128.checked_pow(frac_part.len() as u32)?;
        Self::from_wide(if negative { -num } else { num }, den)
    }

    /// Closest fraction to `x` whose denominator is at most
    /// [`DEFAULT_MAX_DENOMINATOR`].
    pub fn from_f64(x: f64) -> Option<Fraction> {
        if !x.is_finite() {
            return None;
        }
        // Go through the shortest decimal representation, then bound the denominator.
        let exact = Fraction::parse(&format!("{}", x))?;
        Some(exact.limit_denominator(DEFAULT_MAX_DENOMINATOR))
    }

    /// Closest fraction with a denominator no larger than `max_den`.
    pub fn limit_denominator(&self, max_den: i64) -> Fraction {
        if max_den < 1 || self.den <= max_den {
            return *self;
        }
        let (mut p0, mut q0, mut p1, mut q1): (i128, i128, i128, i128) = (0, 1, 1, 0);
        let (mut n, mut d) = (self.num as i128, self.den as i128);
        let max_den = max_den as i128;
        loop {
            let a = n.div_euclid(d);
            let q2 = q0 + a * q1;
            if q2 > max_den {
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q2);
            (n, d) = (d, n - a * d);
            if d == 0 {
                break;
            }
        }
        let k = (max_den - q0) / q1;
        let lower = Self::from_wide(p0 + k * p1, q0 + k * q1);
        let upper = Self::from_wide(p1, q1);
        match (lower, upper) {
            (Some(lo), Some(hi)) => {
                let target = self.to_f64();
                if (hi.to_f64() - target).abs() <= (lo.to_f64() - target).abs() {
                    hi
                } else {
                    lo
                }
            }
            (None, Some(hi)) => hi,
            (Some(lo), None) => lo,
            (None, None) => *self,
        }
    }

    /// First continued-fraction convergent within a relative error of 1e-4.
    /// `0.6667` becomes 2/3, `3.14159` becomes 333/106.
    pub fn approximate(&self) -> Fraction {
        let target = self.to_f64();
        let (mut p0, mut q0, mut p1, mut q1): (i128, i128, i128, i128) = (0, 1, 1, 0);
        let (mut n, mut d) = (self.num as i128, self.den as i128);
        while d != 0 {
            let a = n.div_euclid(d);
            (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q0 + a * q1);
            (n, d) = (d, n - a * d);
            let Some(candidate) = Self::from_wide(p1, q1) else {
                break;
            };
            let error = (candidate.to_f64() - target).abs();
            if error <= APPROXIMATION_TOLERANCE * target.abs() || error == 0.0 {
                return candidate;
            }
        }
        *self
    }

    pub fn checked_add(&self, other: &Fraction) -> Option<Fraction> {
        let (a, b) = (self.num as i128, self.den as i128);
        let (c, d) = (other.num as i128, other.den as i128);
        Self::from_wide(a * d + c * b, b * d)
    }

    pub fn checked_sub(&self, other: &Fraction) -> Option<Fraction> {
        self.checked_add(&-*other)
    }

    pub fn checked_mul(&self, other: &Fraction) -> Option<Fraction> {
        Self::from_wide(
            self.num as i128 * other.num as i128,
            self.den as i128 * other.den as i128,
        )
    }

    /// `None` on division by zero or overflow.
    pub fn checked_div(&self, other: &Fraction) -> Option<Fraction> {
        if other.num == 0 {
            return None;
        }
        Self::from_wide(
            self.num as i128 * other.den as i128,
            self.den as i128 * other.num as i128,
        )
    }

    pub fn checked_pow(&self, exp: i64) -> Option<Fraction> {
        let base = if exp < 0 {
            Fraction::from_int(1).checked_div(self)?
        } else {
            *self
        };
        let exp = u32::try_from(exp.unsigned_abs()).ok()?;
        let num = (base.num as i128).checked_pow(exp)?;
        let den = (base.den as i128).checked_pow(exp)?;
        Self::from_wide(num, den)
    }
}

impl std::ops::Neg for Fraction {
    type Output = Fraction;

    fn neg(self) -> Fraction {
        Fraction {
            num: -self.num,
            den: self.den,
        }
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}
