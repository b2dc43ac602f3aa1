use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money in minor currency units (e.g. cents). All ledger arithmetic happens in integers; fractional
/// currency never exists in this system.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 as f64 / 100.0;
        write!(f, "{units:0.2}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

//--------------------------------------   CommissionRate    ---------------------------------------------------------
/// The platform commission, expressed in basis points (1bp = 0.01%). Fee amounts round down to the nearest minor
/// unit, so the seller share (`subtotal - fee`) never loses a unit to the platform through rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRate(i64);

/// 10% platform commission
pub const DEFAULT_COMMISSION_RATE: CommissionRate = CommissionRate(1000);

impl Default for CommissionRate {
    fn default() -> Self {
        DEFAULT_COMMISSION_RATE
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid commission rate: {0}")]
pub struct InvalidCommissionRate(String);

impl CommissionRate {
    pub fn from_basis_points(bps: i64) -> Result<Self, InvalidCommissionRate> {
        if !(0..=10_000).contains(&bps) {
            return Err(InvalidCommissionRate(format!("{bps} is not in the range 0..=10000")));
        }
        Ok(Self(bps))
    }

    pub fn basis_points(&self) -> i64 {
        self.0
    }

    /// The platform fee on the given amount, rounded down to the nearest minor unit.
    pub fn fee_on(&self, amount: Money) -> Money {
        Money::from(amount.value() * self.0 / 10_000)
    }

    /// The amount remaining after the platform fee has been deducted.
    pub fn remainder_of(&self, amount: Money) -> Money {
        amount - self.fee_on(amount)
    }
}

impl FromStr for CommissionRate {
    type Err = InvalidCommissionRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bps = s.trim().parse::<i64>().map_err(|e| InvalidCommissionRate(format!("{s}: {e}")))?;
        Self::from_basis_points(bps)
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0.2}%", self.0 as f64 / 100.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn money_arithmetic() {
        let a = Money::from(5_000);
        let b = Money::from(1_250);
        assert_eq!(a + b, Money::from(6_250));
        assert_eq!(a - b, Money::from(3_750));
        assert_eq!(-b, Money::from(-1_250));
        assert_eq!(b * 4, Money::from(5_000));
        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total, Money::from(7_500));
    }

    #[test]
    fn default_commission_is_ten_percent() {
        let rate = CommissionRate::default();
        assert_eq!(rate.fee_on(Money::from(5_000)), Money::from(500));
        assert_eq!(rate.remainder_of(Money::from(5_000)), Money::from(4_500));
    }

    #[test]
    fn commission_rounds_down() {
        // 10% of 99 minor units is 9.9; the fee floors to 9 and the seller keeps 90
        let rate = CommissionRate::default();
        assert_eq!(rate.fee_on(Money::from(99)), Money::from(9));
        assert_eq!(rate.remainder_of(Money::from(99)), Money::from(90));
        // fee + remainder always reassembles the original amount
        assert_eq!(rate.fee_on(Money::from(99)) + rate.remainder_of(Money::from(99)), Money::from(99));
    }

    #[test]
    fn commission_rate_bounds() {
        assert!(CommissionRate::from_basis_points(0).is_ok());
        assert!(CommissionRate::from_basis_points(10_000).is_ok());
        assert!(CommissionRate::from_basis_points(-1).is_err());
        assert!(CommissionRate::from_basis_points(10_001).is_err());
        assert_eq!("250".parse::<CommissionRate>().unwrap().basis_points(), 250);
    }
}
