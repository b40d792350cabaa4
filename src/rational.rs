//! Exact rational time.
//!
//! Every time value inside a pattern is a [`Rational`]: a cycle count held
//! as a reduced numerator/denominator pair. Nothing is rounded until a value
//! leaves the engine through [`Rational::to_f64`].

use num_integer::Integer;
use num_rational::Rational64;
use num_traits::{Signed, Zero};
use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// A point in time or a duration, measured in cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational(Rational64);

impl Rational {
    pub const ZERO: Rational = Rational(Rational64::new_raw(0, 1));
    pub const ONE: Rational = Rational(Rational64::new_raw(1, 1));
    pub const MINUS_ONE: Rational = Rational(Rational64::new_raw(-1, 1));

    /// Create a rational from numerator and denominator.
    ///
    /// Panics when `denom` is zero; a zero denominator is an engine bug, not
    /// a user error.
    pub fn new(numer: i64, denom: i64) -> Self {
        Rational(Rational64::new(numer, denom))
    }

    pub fn from_integer(n: i64) -> Self {
        Rational(Rational64::from_integer(n))
    }

    /// Parse an exact literal: `"3"`, `"-0.25"`, `".5"` or `"3/4"`.
    ///
    /// Decimals are read digit by digit so `"0.1"` is exactly `1/10`.
    pub fn parse(text: &str) -> Option<Rational> {
        let text = text.trim();
        if let Some((n, d)) = text.split_once('/') {
            let n: i64 = n.trim().parse().ok()?;
            let d: i64 = d.trim().parse().ok()?;
            if d == 0 {
                return None;
            }
            return Some(Rational::new(n, d));
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) || frac_part.len() > 15 {
            return None;
        }

        let denom = 10i64.checked_pow(frac_part.len() as u32)?;
        let int_value: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
        let frac_value: i64 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
        let numer = int_value.checked_mul(denom)?.checked_add(frac_value)?;
        Some(Rational::new(if negative { -numer } else { numer }, denom))
    }

    /// Approximate a float with a bounded denominator (at most 10000).
    ///
    /// Gives `None` for NaN, infinities and magnitudes an `i64` ratio
    /// cannot hold.
    pub fn from_f64(f: f64) -> Option<Self> {
        const MAX_DENOM: i64 = 10000;

        if !f.is_finite() || f.abs() >= i64::MAX as f64 {
            return None;
        }

        let sign = if f < 0.0 { -1 } else { 1 };
        let f_abs = f.abs();
        let int_part = f_abs.floor() as i64;
        let target = f_abs - int_part as f64;
        let compose = |num: i64, den: i64| {
            let numer = int_part.checked_mul(den)?.checked_add(num)?;
            Some(Rational::new(sign * numer, den))
        };

        if target < 1e-10 {
            return Some(Rational::from_integer(sign * int_part));
        }

        // Stern-Brocot descent towards the fractional part.
        let (mut lo_num, mut lo_den) = (0i64, 1i64);
        let (mut hi_num, mut hi_den) = (1i64, 1i64);

        for _ in 0..64 {
            let med_num = lo_num + hi_num;
            let med_den = lo_den + hi_den;
            if med_den > MAX_DENOM {
                break;
            }
            let med_val = med_num as f64 / med_den as f64;
            if (med_val - target).abs() < 1e-10 {
                return compose(med_num, med_den);
            } else if med_val < target {
                lo_num = med_num;
                lo_den = med_den;
            } else {
                hi_num = med_num;
                hi_den = med_den;
            }
        }

        let lo_err = (lo_num as f64 / lo_den as f64 - target).abs();
        let hi_err = (hi_num as f64 / hi_den as f64 - target).abs();
        if lo_err < hi_err {
            compose(lo_num, lo_den)
        } else {
            compose(hi_num, hi_den)
        }
    }

    /// Start of the cycle containing this time ("sam").
    pub fn sam(&self) -> Self {
        self.floor()
    }

    /// Start of the next cycle.
    pub fn next_sam(&self) -> Self {
        self.sam() + Rational::ONE
    }

    /// Position within the current cycle.
    pub fn cycle_pos(&self) -> Self {
        *self - self.sam()
    }

    /// The integer index of the cycle containing this time.
    pub fn cycle(&self) -> i64 {
        self.0.floor().to_integer()
    }

    pub fn floor(&self) -> Self {
        Rational(self.0.floor())
    }

    pub fn ceil(&self) -> Self {
        Rational(self.0.ceil())
    }

    /// Convert to f64. Only the renderer boundary should need this.
    pub fn to_f64(&self) -> f64 {
        *self.0.numer() as f64 / *self.0.denom() as f64
    }

    pub fn numer(&self) -> i64 {
        *self.0.numer()
    }

    pub fn denom(&self) -> i64 {
        *self.0.denom()
    }

    pub fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn abs(&self) -> Self {
        Rational(self.0.abs())
    }

    pub fn recip(&self) -> Self {
        Rational(self.0.recip())
    }

    /// Euclidean remainder: always in `[0, |m|)`.
    pub fn rem_euclid(&self, m: Rational) -> Self {
        let r = *self % m;
        if r.is_negative() {
            r + m.abs()
        } else {
            r
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ZERO
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Rational::from_integer(n)
    }
}

impl From<i32> for Rational {
    fn from(n: i32) -> Self {
        Rational::from_integer(n as i64)
    }
}

impl From<Rational64> for Rational {
    fn from(r: Rational64) -> Self {
        Rational(r)
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Rational(self.0 + other.0)
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Rational(self.0 - other.0)
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Rational(self.0 * other.0)
    }
}

impl Div for Rational {
    type Output = Self;

    /// Panics on division by zero.
    fn div(self, other: Self) -> Self {
        Rational(self.0 / other.0)
    }
}

impl Rem for Rational {
    type Output = Self;

    /// Truncated remainder (sign follows the dividend), like `i64::rem`.
    fn rem(self, other: Self) -> Self {
        Rational(self.0 % other.0)
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self {
        Rational(-self.0)
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom() == 1 {
            write!(f, "{}", self.numer())
        } else {
            write!(f, "{}/{}", self.numer(), self.denom())
        }
    }
}

/// Least common multiple of a set of rationals, used to align step counts.
pub fn lcm(values: &[Rational]) -> Option<Rational> {
    let (first, rest) = values.split_first()?;
    let mut result = first.0;
    for value in rest {
        // lcm(a/b, c/d) = lcm(a, c) / gcd(b, d)
        let numer = result.numer().lcm(value.0.numer());
        let denom = result.denom().gcd(value.0.denom());
        result = Rational64::new(numer, denom);
    }
    Some(Rational(result))
}
