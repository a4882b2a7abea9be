//! Monetary and ticket-count primitives.
//!
//! Every amount is an integer count of the smallest indivisible unit (wei for
//! an 18-decimal currency). Decimal strings are produced for display only and
//! are never parsed back into an [`Amount`].

use crate::errors::ValidationError;
use std::{
    fmt,
    num::ParseIntError,
    str::FromStr,
};

/// Upper bound accepted for a ticket price, in smallest units.
///
/// `MAX_TICKET_PRICE * TicketQuantity::MAX` stays far below `u128::MAX`, so the
/// total cost of any valid purchase is representable.
pub const MAX_TICKET_PRICE: Amount = Amount(1_000_000_000_000_000_000_000_000_000_000);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// `self * quantity`, or `None` when the product does not fit.
    pub fn checked_mul_quantity(self, quantity: TicketQuantity) -> Option<Amount> {
        self.0.checked_mul(u128::from(quantity.get())).map(Amount)
    }

    /// Renders the amount as a decimal string with `decimals` fractional
    /// digits, trailing zeros trimmed.
    pub fn to_decimal_string(self, decimals: u32) -> String {
        let Some(one_unit) = 10u128.checked_pow(decimals) else {
            return self.0.to_string();
        };
        let whole = self.0 / one_unit;
        let fractional = self.0 % one_unit;
        if fractional == 0 {
            format!("{whole}")
        } else {
            let digits = format!("{:0width$}", fractional, width = decimals as usize);
            format!("{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses an integer count of smallest units, e.g. `"10000000000000000"`.
impl FromStr for Amount {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

/// Number of tickets in a single purchase, always within `[MIN, MAX]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TicketQuantity(u32);

impl TicketQuantity {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    pub fn new(quantity: u32) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&quantity) {
            Ok(Self(quantity))
        } else {
            Err(ValidationError::QuantityOutOfRange { quantity })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for TicketQuantity {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for TicketQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Total cost of `quantity` tickets at `unit_price`.
///
/// Rejects prices above [`MAX_TICKET_PRICE`], which keeps the product in range.
pub fn total_cost(
    unit_price: Amount,
    quantity: TicketQuantity,
) -> Result<Amount, ValidationError> {
    if unit_price > MAX_TICKET_PRICE {
        return Err(ValidationError::PriceOutOfBounds { price: unit_price });
    }
    unit_price
        .checked_mul_quantity(quantity)
        .ok_or(ValidationError::PriceOutOfBounds { price: unit_price })
}
