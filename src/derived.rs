//! User-facing aggregates recomputed from a cache snapshot and local inputs.

use crate::{
    amount::{
        Amount,
        TicketQuantity,
        total_cost,
    },
    cache::CacheSnapshot,
    errors::ValidationError,
    remote::{
        Address,
        RemoteKey,
    },
};
use chrono::{
    DateTime,
    Utc,
};

/// A derived value that cannot be computed until its remote inputs load.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Known<T> {
    #[default]
    Unknown,
    Value(T),
}

impl<T> Known<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Known::Value(value),
            None => Known::Unknown,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Known::Value(value) => Some(value),
            Known::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Known::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Known<U> {
        match self {
            Known::Value(value) => Known::Value(f(value)),
            Known::Unknown => Known::Unknown,
        }
    }
}

impl Known<bool> {
    /// `true` only when known to be true.
    pub fn is_true(&self) -> bool {
        matches!(self, Known::Value(true))
    }
}

/// Local inputs of a derivation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DerivedInputs {
    pub selected_quantity: u32,
    pub caller: Option<Address>,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LastWinner {
    pub address: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DerivedState {
    /// Tickets in the current draw owned by the caller; 0 while the owner list
    /// is not loaded or no caller is connected.
    pub user_ticket_count: u32,
    pub total_cost: Known<Amount>,
    /// Commission charged per ticket.
    pub service_fee: Known<Amount>,
    /// Set when the selected quantity cannot be bought at all.
    pub quantity_error: Option<ValidationError>,
    pub winnings: Known<Amount>,
    pub is_eligible_to_withdraw: Known<bool>,
    pub is_draw_open_for_purchase: Known<bool>,
    pub is_operator: Known<bool>,
    pub last_winner: Option<LastWinner>,
}

/// Recomputes every derived field. Pure: equal inputs give equal output.
pub fn derive(snapshot: &CacheSnapshot, inputs: &DerivedInputs) -> DerivedState {
    let amount = |key| snapshot.data(key).and_then(|data| data.as_amount());

    let user_ticket_count = match (
        inputs.caller,
        snapshot
            .data(RemoteKey::TicketOwnerList)
            .and_then(|data| data.as_addresses()),
    ) {
        (Some(caller), Some(owners)) => {
            let owned = owners.iter().filter(|owner| **owner == caller).count();
            u32::try_from(owned).unwrap_or(u32::MAX)
        }
        _ => 0,
    };

    let (total_cost, quantity_error) = match TicketQuantity::new(inputs.selected_quantity) {
        Ok(quantity) => match amount(RemoteKey::TicketUnitPrice) {
            Some(price) => match total_cost(price, quantity) {
                Ok(cost) => (Known::Value(cost), None),
                Err(err) => (Known::Unknown, Some(err)),
            },
            None => (Known::Unknown, None),
        },
        Err(err) => (Known::Unknown, Some(err)),
    };
    // the contract charges its commission per ticket; shown as the unit figure
    let service_fee = Known::from_option(amount(RemoteKey::CommissionUnitAmount));

    let winnings = Known::from_option(amount(RemoteKey::WinningsForCaller));
    let is_eligible_to_withdraw = winnings.map(|winnings| !winnings.is_zero());

    let before_expiration = Known::from_option(
        snapshot
            .data(RemoteKey::DrawExpiration)
            .and_then(|data| data.as_timestamp())
            .map(|expiration| expiration > inputs.now),
    );
    let tickets_left = Known::from_option(
        snapshot
            .data(RemoteKey::RemainingTicketCount)
            .and_then(|data| data.as_count())
            .map(|remaining| remaining > 0),
    );
    let is_draw_open_for_purchase = match (before_expiration, tickets_left) {
        (Known::Value(false), _) | (_, Known::Value(false)) => Known::Value(false),
        (Known::Value(true), Known::Value(true)) => Known::Value(true),
        _ => Known::Unknown,
    };

    let operator = snapshot
        .data(RemoteKey::OperatorAddress)
        .and_then(|data| data.as_address());
    let is_operator = match (inputs.caller, operator) {
        (None, _) => Known::Value(false),
        (Some(caller), Some(operator)) => Known::Value(caller == operator),
        (Some(_), None) => Known::Unknown,
    };

    let last_winner = match (
        amount(RemoteKey::LastWinnerAmount),
        snapshot
            .data(RemoteKey::LastWinnerAddress)
            .and_then(|data| data.as_address()),
    ) {
        (Some(amount), Some(address)) if !amount.is_zero() => {
            Some(LastWinner { address, amount })
        }
        _ => None,
    };

    DerivedState {
        user_ticket_count,
        total_cost,
        service_fee,
        quantity_error,
        winnings,
        is_eligible_to_withdraw,
        is_draw_open_for_purchase,
        is_operator,
        last_winner,
    }
}
