//! A type-safe representation of a quantity of satoshis.
//!
//! Transaction and block-subsidy arithmetic is consensus-critical: an
//! overflow or an out-of-range value must be caught at the type boundary
//! rather than discovered deep inside a validation routine. [`Amount`] is
//! generic over a marker type that controls whether negative values are
//! permitted (`Amount<NonNegative>` for transaction outputs and subsidies,
//! `Amount<NegativeAllowed>` for fee arithmetic that can go either way).

use std::{
    convert::TryFrom,
    fmt,
    marker::PhantomData,
    ops::{Add, Sub},
};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// One whole bitcoin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The maximum number of satoshis that will ever exist.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A marker type allowing [`Amount`] to go negative (e.g. transaction fees,
/// which are a difference of two non-negative amounts).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NegativeAllowed {}

/// A marker type restricting [`Amount`] to `0..=MAX_MONEY`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NonNegative {}

pub trait Constraint {
    /// Returns `Ok(value)` if `value` satisfies this constraint.
    fn validate(value: i64) -> Result<i64, Error>;
}

impl Constraint for NonNegative {
    fn validate(value: i64) -> Result<i64, Error> {
        if (0..=MAX_MONEY).contains(&value) {
            Ok(value)
        } else {
            Err(Error::Range(value))
        }
    }
}

impl Constraint for NegativeAllowed {
    fn validate(value: i64) -> Result<i64, Error> {
        if (-MAX_MONEY..=MAX_MONEY).contains(&value) {
            Ok(value)
        } else {
            Err(Error::Range(value))
        }
    }
}

/// An amount of satoshis, restricted to a valid range by the type parameter `C`.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Amount<C = NonNegative>(i64, #[serde(skip)] PhantomData<C>);

#[derive(thiserror::Error, Copy, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// {0} satoshis is outside the valid monetary range
    #[error("{0} satoshis is outside the valid monetary range")]
    Range(i64),
    /// adding two amounts overflowed
    #[error("adding two amounts overflowed")]
    Addition,
    /// subtracting two amounts overflowed
    #[error("subtracting two amounts overflowed")]
    Subtraction,
}

impl<C: Constraint> Amount<C> {
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }

    pub fn satoshis(&self) -> i64 {
        self.0
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(Amount(C::validate(value)?, PhantomData))
    }
}

impl<C: Constraint> TryFrom<u64> for Amount<C> {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let value = i64::try_from(value).map_err(|_| Error::Range(i64::MAX))?;
        Amount::try_from(value)
    }
}

impl<C> fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl Amount<NonNegative> {
    /// Widen to a representation that allows negative values, e.g. to
    /// compute a fee as the difference of input and output totals.
    pub fn widen(self) -> Amount<NegativeAllowed> {
        Amount(self.0, PhantomData)
    }
}

impl Add for Amount<NegativeAllowed> {
    type Output = Result<Amount<NegativeAllowed>, Error>;

    fn add(self, rhs: Self) -> Self::Output {
        let value = self.0.checked_add(rhs.0).ok_or(Error::Addition)?;
        Amount::try_from(value)
    }
}

impl Sub for Amount<NegativeAllowed> {
    type Output = Result<Amount<NegativeAllowed>, Error>;

    fn sub(self, rhs: Self) -> Self::Output {
        let value = self.0.checked_sub(rhs.0).ok_or(Error::Subtraction)?;
        Amount::try_from(value)
    }
}

impl BitcoinSerialize for Amount<NonNegative> {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Amount<NonNegative> {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let value = i64::bitcoin_deserialize(reader)?;
        Amount::try_from(value)
            .map_err(|_| SerializationError::Parse("transaction output value out of range"))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary {
    use super::*;
    use proptest::prelude::*;

    impl proptest::arbitrary::Arbitrary for Amount<NonNegative> {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(_args: ()) -> Self::Strategy {
            (0..=MAX_MONEY)
                .prop_map(|v| Amount::try_from(v).expect("in range by construction"))
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_for_nonnegative() {
        assert!(Amount::<NonNegative>::try_from(-1).is_err());
    }

    #[test]
    fn rejects_above_max_money() {
        assert!(Amount::<NonNegative>::try_from(MAX_MONEY + 1).is_err());
    }

    #[test]
    fn accepts_zero_and_max() {
        assert!(Amount::<NonNegative>::try_from(0).is_ok());
        assert!(Amount::<NonNegative>::try_from(MAX_MONEY).is_ok());
    }

    #[test]
    fn widened_subtraction_can_go_negative() {
        let a = Amount::<NonNegative>::try_from(5).unwrap().widen();
        let b = Amount::<NonNegative>::try_from(10).unwrap().widen();
        let fee = (a - b).unwrap();
        assert_eq!(fee.satoshis(), -5);
    }
}
