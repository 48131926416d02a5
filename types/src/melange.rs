//! Melange: the transferable spice amount.
//!
//! An amount is kept in two limbs: whole `currency` units and a
//! `supplementary` fraction counted in units of 10^-18. The fraction limb
//! always stays below [`SUPPLEMENTARY_UNIT`]; anything above carries into
//! `currency`.
//!
//! Arithmetic never wraps. A move between two amounts is all-or-nothing:
//! on failure both operands are restored to their exact prior values.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One whole currency unit expressed in supplementary units (10^18).
pub const SUPPLEMENTARY_UNIT: u64 = 1_000_000_000_000_000_000;

const FRACTION_DIGITS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MelangeError {
    #[error("value overflow")]
    Overflow,

    #[error("insufficient funds to process the transfer")]
    InsufficientFunds,
}

/// A two-limb fixed-point spice amount.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawMelange", into = "RawMelange")]
pub struct Melange {
    currency: u64,
    supplementary: u64,
}

/// Wire form; normalised on the way in so a decoded amount upholds the limb invariant.
#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawMelange {
    currency: u64,
    supplementary: u64,
}

impl From<RawMelange> for Melange {
    fn from(raw: RawMelange) -> Self {
        Melange::new(raw.currency, raw.supplementary)
    }
}

impl From<Melange> for RawMelange {
    fn from(m: Melange) -> Self {
        RawMelange {
            currency: m.currency,
            supplementary: m.supplementary,
        }
    }
}

impl Melange {
    pub const ZERO: Self = Self {
        currency: 0,
        supplementary: 0,
    };

    pub const MAX: Self = Self {
        currency: u64::MAX,
        supplementary: SUPPLEMENTARY_UNIT - 1,
    };

    /// Build an amount, carrying whole units out of `supplementary`.
    ///
    /// A carry that would push `currency` past `u64::MAX` saturates at
    /// [`Melange::MAX`]; use [`Melange::try_new`] to have it reported instead.
    pub fn new(currency: u64, supplementary: u64) -> Self {
        Self::try_new(currency, supplementary).unwrap_or(Self::MAX)
    }

    pub fn try_new(currency: u64, supplementary: u64) -> Result<Self, MelangeError> {
        let carry = supplementary / SUPPLEMENTARY_UNIT;
        let currency = currency
            .checked_add(carry)
            .ok_or(MelangeError::Overflow)?;
        Ok(Self {
            currency,
            supplementary: supplementary % SUPPLEMENTARY_UNIT,
        })
    }

    pub fn currency(&self) -> u64 {
        self.currency
    }

    pub fn supplementary(&self) -> u64 {
        self.supplementary
    }

    pub fn is_empty(&self) -> bool {
        self.currency == 0 && self.supplementary == 0
    }

    /// Add `amount` to `self` in place.
    pub fn supply(&mut self, amount: Melange) -> Result<(), MelangeError> {
        let mut source = amount;
        Self::transfer(amount, &mut source, self)
    }

    /// Move `amount` out of `self` into `sink`.
    pub fn drain(&mut self, amount: Melange, sink: &mut Melange) -> Result<(), MelangeError> {
        Self::transfer(amount, self, sink)
    }

    /// Move `amount` from `from` to `to` as one unit.
    ///
    /// The fraction limb borrows a whole unit from `from.currency` when it
    /// runs short, and `to` carries into its currency limb when its fraction
    /// fills up. Any failure leaves both operands untouched.
    pub fn transfer(amount: Melange, from: &mut Melange, to: &mut Melange) -> Result<(), MelangeError> {
        let from_snapshot = *from;
        let to_snapshot = *to;
        let result = Self::move_limbs(amount, from, to);
        if result.is_err() {
            *from = from_snapshot;
            *to = to_snapshot;
        }
        result
    }

    fn move_limbs(amount: Melange, from: &mut Melange, to: &mut Melange) -> Result<(), MelangeError> {
        if amount.currency > from.currency {
            return Err(MelangeError::InsufficientFunds);
        }
        from.currency -= amount.currency;
        to.currency = to
            .currency
            .checked_add(amount.currency)
            .ok_or(MelangeError::Overflow)?;

        if amount.supplementary > from.supplementary {
            if from.currency == 0 {
                return Err(MelangeError::InsufficientFunds);
            }
            from.currency -= 1;
            from.supplementary = from.supplementary + SUPPLEMENTARY_UNIT - amount.supplementary;
        } else {
            from.supplementary -= amount.supplementary;
        }

        // Both fractions are below 10^18, so the sum stays well inside u64.
        to.supplementary += amount.supplementary;
        if to.supplementary >= SUPPLEMENTARY_UNIT {
            to.supplementary -= SUPPLEMENTARY_UNIT;
            to.currency = to.currency.checked_add(1).ok_or(MelangeError::Overflow)?;
        }
        Ok(())
    }

    /// `self - other` without mutating either side.
    pub fn checked_sub(self, other: Melange) -> Result<Melange, MelangeError> {
        let mut remainder = self;
        let mut sink = Melange::ZERO;
        remainder.drain(other, &mut sink)?;
        Ok(remainder)
    }

    /// `self + other` without mutating either side.
    pub fn checked_add(self, other: Melange) -> Result<Melange, MelangeError> {
        let mut total = self;
        total.supply(other)?;
        Ok(total)
    }
}

impl fmt::Display for Melange {
    /// `<currency>.<fraction>` with the 18-digit fraction stripped of trailing
    /// zeros; an empty fraction renders as a single `0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let padded = format!("{:0width$}", self.supplementary, width = FRACTION_DIGITS);
        let fraction = padded.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        write!(f, "{}.{}", self.currency, fraction)
    }
}

impl fmt::Debug for Melange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Melange({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_carries_supplementary_overflow() {
        let m = Melange::new(1, SUPPLEMENTARY_UNIT * 2 + 5);
        assert_eq!(m.currency(), 3);
        assert_eq!(m.supplementary(), 5);
    }

    #[test]
    fn try_new_reports_currency_overflow() {
        assert_eq!(
            Melange::try_new(u64::MAX, SUPPLEMENTARY_UNIT),
            Err(MelangeError::Overflow)
        );
        assert_eq!(Melange::new(u64::MAX, SUPPLEMENTARY_UNIT), Melange::MAX);
    }

    #[test]
    fn transfer_whole_units() {
        let mut from = Melange::new(10, 0);
        let mut to = Melange::ZERO;
        Melange::transfer(Melange::new(4, 0), &mut from, &mut to).unwrap();
        assert_eq!(from, Melange::new(6, 0));
        assert_eq!(to, Melange::new(4, 0));
    }

    #[test]
    fn transfer_borrows_from_currency_limb() {
        let mut from = Melange::new(2, 100);
        let mut to = Melange::ZERO;
        Melange::transfer(Melange::new(0, 200), &mut from, &mut to).unwrap();
        assert_eq!(from, Melange::new(1, SUPPLEMENTARY_UNIT - 100));
        assert_eq!(to, Melange::new(0, 200));
    }

    #[test]
    fn transfer_carries_into_receiver_currency() {
        let mut from = Melange::new(5, SUPPLEMENTARY_UNIT - 1);
        let mut to = Melange::new(0, SUPPLEMENTARY_UNIT - 1);
        Melange::transfer(Melange::new(0, 2), &mut from, &mut to).unwrap();
        assert_eq!(to, Melange::new(1, 1));
        assert_eq!(from, Melange::new(5, SUPPLEMENTARY_UNIT - 3));
    }

    #[test]
    fn insufficient_fraction_without_currency_fails_untouched() {
        let mut from = Melange::new(0, 10);
        let mut to = Melange::new(7, 7);
        let err = Melange::transfer(Melange::new(0, 11), &mut from, &mut to).unwrap_err();
        assert_eq!(err, MelangeError::InsufficientFunds);
        assert_eq!(from, Melange::new(0, 10));
        assert_eq!(to, Melange::new(7, 7));
    }

    #[test]
    fn insufficient_after_currency_spent_restores_both() {
        // Currency limb succeeds, fraction limb then fails: both must roll back.
        let mut from = Melange::new(3, 0);
        let mut to = Melange::new(1, 0);
        let err = Melange::transfer(Melange::new(3, 1), &mut from, &mut to).unwrap_err();
        assert_eq!(err, MelangeError::InsufficientFunds);
        assert_eq!(from, Melange::new(3, 0));
        assert_eq!(to, Melange::new(1, 0));
    }

    #[test]
    fn receiver_overflow_fails_untouched() {
        let mut from = Melange::new(10, 0);
        let mut to = Melange::new(u64::MAX - 1, 0);
        let err = Melange::transfer(Melange::new(2, 0), &mut from, &mut to).unwrap_err();
        assert_eq!(err, MelangeError::Overflow);
        assert_eq!(from, Melange::new(10, 0));
        assert_eq!(to, Melange::new(u64::MAX - 1, 0));
    }

    #[test]
    fn receiver_fraction_carry_overflow_fails_untouched() {
        let mut from = Melange::new(1, SUPPLEMENTARY_UNIT - 1);
        let mut to = Melange::MAX;
        let err = Melange::transfer(Melange::new(0, 1), &mut from, &mut to).unwrap_err();
        assert_eq!(err, MelangeError::Overflow);
        assert_eq!(from, Melange::new(1, SUPPLEMENTARY_UNIT - 1));
        assert_eq!(to, Melange::MAX);
    }

    #[test]
    fn supply_and_drain() {
        let mut m = Melange::ZERO;
        m.supply(Melange::new(1, 500)).unwrap();
        m.supply(Melange::new(0, SUPPLEMENTARY_UNIT - 500)).unwrap();
        assert_eq!(m, Melange::new(2, 0));

        let mut sink = Melange::ZERO;
        m.drain(Melange::new(0, 1), &mut sink).unwrap();
        assert_eq!(m, Melange::new(1, SUPPLEMENTARY_UNIT - 1));
        assert_eq!(sink, Melange::new(0, 1));
        assert!(m.drain(Melange::new(2, 0), &mut sink).is_err());
    }

    #[test]
    fn supply_overflow() {
        let mut m = Melange::new(u64::MAX, 0);
        assert_eq!(m.supply(Melange::new(1, 0)), Err(MelangeError::Overflow));
        assert_eq!(m, Melange::new(u64::MAX, 0));
    }

    #[test]
    fn checked_arithmetic() {
        let a = Melange::new(5, 10);
        let b = Melange::new(2, 20);
        assert_eq!(a.checked_sub(b).unwrap(), Melange::new(2, SUPPLEMENTARY_UNIT - 10));
        assert_eq!(a.checked_add(b).unwrap(), Melange::new(7, 30));
        assert_eq!(b.checked_sub(a), Err(MelangeError::InsufficientFunds));
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Melange::new(10, 0).to_string(), "10.0");
        assert_eq!(Melange::new(1, 500_000_000_000_000_000).to_string(), "1.5");
        assert_eq!(Melange::new(0, 1).to_string(), "0.000000000000000001");
        assert_eq!(Melange::new(3, 120).to_string(), "3.00000000000000012");
    }

    #[test]
    fn empty() {
        assert!(Melange::ZERO.is_empty());
        assert!(Melange::default().is_empty());
        assert!(!Melange::new(0, 1).is_empty());
    }

    #[test]
    fn ordering_follows_value() {
        assert!(Melange::new(1, 0) > Melange::new(0, SUPPLEMENTARY_UNIT - 1));
        assert!(Melange::new(1, 2) < Melange::new(1, 3));
    }
}
