//! Exact rational arithmetic over arbitrary-precision integers.
//!
//! Rationals are always stored in normalized form:
//! - The denominator is always positive
//! - The numerator and denominator have no common factors (GCD = 1)
//! - Zero is represented as 0/1

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{RunError, RunResult};

/// A rational number represented as a fraction of two integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rational {
    numerator: BigInt,
    denominator: BigInt,
}

impl Rational {
    /// Creates a new rational from numerator and denominator, normalizing.
    /// A zero denominator is a `DivisionByZero` error.
    pub fn new(numerator: BigInt, denominator: BigInt) -> RunResult<Self> {
        if denominator.is_zero() {
            return Err(RunError::division_by_zero());
        }
        let (n, d) = Self::normalize(numerator, denominator);
        Ok(Self {
            numerator: n,
            denominator: d,
        })
    }

    pub fn from_int(value: i64) -> Self {
        Self {
            numerator: BigInt::from(value),
            denominator: BigInt::one(),
        }
    }

    pub fn from_bigint(value: BigInt) -> Self {
        Self {
            numerator: value,
            denominator: BigInt::one(),
        }
    }

    fn normalize(numerator: BigInt, denominator: BigInt) -> (BigInt, BigInt) {
        if numerator.is_zero() {
            return (BigInt::zero(), BigInt::one());
        }
        let gcd = numerator.gcd(&denominator);
        let mut n = &numerator / &gcd;
        let mut d = &denominator / &gcd;
        if d.is_negative() {
            n = -n;
            d = -d;
        }
        (n, d)
    }

    pub fn numerator(&self) -> &BigInt {
        &self.numerator
    }

    pub fn denominator(&self) -> &BigInt {
        &self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    /// True when the denominator is one.
    pub fn is_integral(&self) -> bool {
        self.denominator.is_one()
    }

    pub fn add(&self, other: &Self) -> Self {
        let n = &self.numerator * &other.denominator + &other.numerator * &self.denominator;
        let d = &self.denominator * &other.denominator;
        let (n, d) = Self::normalize(n, d);
        Self { numerator: n, denominator: d }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Self) -> Self {
        let n = &self.numerator * &other.numerator;
        let d = &self.denominator * &other.denominator;
        let (n, d) = Self::normalize(n, d);
        Self { numerator: n, denominator: d }
    }

    pub fn div(&self, other: &Self) -> RunResult<Self> {
        if other.numerator.is_zero() {
            return Err(RunError::division_by_zero());
        }
        let n = &self.numerator * &other.denominator;
        let d = &self.denominator * &other.numerator;
        let (n, d) = Self::normalize(n, d);
        Ok(Self { numerator: n, denominator: d })
    }

    pub fn neg(&self) -> Self {
        Self {
            numerator: -&self.numerator,
            denominator: self.denominator.clone(),
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        (&self.numerator * &other.denominator).cmp(&(&other.numerator * &self.denominator))
    }

    pub fn to_f64(&self) -> f64 {
        let n = self.numerator.to_f64().unwrap_or(f64::NAN);
        let d = self.denominator.to_f64().unwrap_or(f64::NAN);
        n / d
    }

    /// Rendering: `n/d`, or just `n` when integral.
    pub fn inspect(&self) -> String {
        if self.is_integral() {
            self.numerator.to_string()
        } else {
            format!("{}/{}", self.numerator, self.denominator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d)).unwrap()
    }

    #[test]
    fn normalizes_sign_and_gcd() {
        let r = rat(4, -6);
        assert_eq!(r.numerator(), &BigInt::from(-2));
        assert_eq!(r.denominator(), &BigInt::from(3));
    }

    #[test]
    fn arithmetic_stays_normalized() {
        let sum = rat(1, 6).add(&rat(1, 3));
        assert_eq!(sum, rat(1, 2));
        let product = rat(2, 3).mul(&rat(3, 4));
        assert_eq!(product, rat(1, 2));
    }

    #[test]
    fn division_by_zero_rational_errors() {
        assert!(rat(1, 2).div(&rat(0, 5)).is_err());
        assert!(Rational::new(BigInt::one(), BigInt::zero()).is_err());
    }

    #[test]
    fn comparison_crosses_denominators() {
        assert_eq!(rat(1, 3).compare(&rat(1, 2)), Ordering::Less);
        assert_eq!(rat(2, 4).compare(&rat(1, 2)), Ordering::Equal);
    }
}
