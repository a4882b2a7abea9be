//! The fixed set of write actions, how each one is shaped into a contract
//! call, and which cached keys it can change.

use crate::{
    amount::{
        TicketQuantity,
        total_cost,
    },
    cache::CacheSnapshot,
    errors::{
        AuthorizationError,
        ValidationError,
    },
    remote::{
        Address,
        RemoteKey,
        WriteArgs,
    },
};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ActionName {
    BuyTickets,
    WithdrawWinnings,
    DrawWinner,
    WithdrawCommission,
    RestartDraw,
    RefundAll,
}

impl ActionName {
    pub const ALL: [ActionName; 6] = [
        ActionName::BuyTickets,
        ActionName::WithdrawWinnings,
        ActionName::DrawWinner,
        ActionName::WithdrawCommission,
        ActionName::RestartDraw,
        ActionName::RefundAll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionName::BuyTickets => "buy-tickets",
            ActionName::WithdrawWinnings => "withdraw-winnings",
            ActionName::DrawWinner => "draw-winner",
            ActionName::WithdrawCommission => "withdraw-commission",
            ActionName::RestartDraw => "restart-draw",
            ActionName::RefundAll => "refund-all",
        }
    }

    /// Contract method invoked for this action.
    pub fn method(self) -> &'static str {
        match self {
            ActionName::BuyTickets => "BuyTickets",
            ActionName::WithdrawWinnings => "WithdrawWinnings",
            ActionName::DrawWinner => "DrawWinnerTicket",
            ActionName::WithdrawCommission => "WithdrawCommission",
            ActionName::RestartDraw => "restartDraw",
            ActionName::RefundAll => "RefundAll",
        }
    }

    pub fn is_operator_only(self) -> bool {
        matches!(
            self,
            ActionName::DrawWinner
                | ActionName::WithdrawCommission
                | ActionName::RestartDraw
                | ActionName::RefundAll
        )
    }

    /// Keys whose remote value may change once this action succeeds.
    pub fn affected_keys(self) -> &'static [RemoteKey] {
        use RemoteKey::*;
        match self {
            ActionName::BuyTickets => {
                &[RemainingTicketCount, CurrentPoolAmount, TicketOwnerList]
            }
            ActionName::WithdrawWinnings => &[WinningsForCaller],
            // a draw also clears the ticket list, credits the winner and
            // re-arms the expiration
            ActionName::DrawWinner => &[
                LastWinnerAmount,
                LastWinnerAddress,
                CurrentPoolAmount,
                OperatorTotalCommission,
                RemainingTicketCount,
                TicketOwnerList,
                WinningsForCaller,
                DrawExpiration,
            ],
            ActionName::WithdrawCommission => &[OperatorTotalCommission],
            ActionName::RestartDraw => {
                &[DrawExpiration, RemainingTicketCount, CurrentPoolAmount]
            }
            ActionName::RefundAll => {
                &[RemainingTicketCount, TicketOwnerList, CurrentPoolAmount]
            }
        }
    }

    pub fn pending_message(self) -> &'static str {
        match self {
            ActionName::BuyTickets => "Buying your tickets...",
            ActionName::WithdrawWinnings => "Withdrawing winnings...",
            ActionName::DrawWinner => "Picking a Lucky Winner...",
            ActionName::WithdrawCommission => "Withdrawing commission...",
            ActionName::RestartDraw => "Restarting draw...",
            ActionName::RefundAll => "Refunding all...",
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            ActionName::BuyTickets => "Tickets purchased successfully!",
            ActionName::WithdrawWinnings => "Winnings withdrawn successfully!",
            ActionName::DrawWinner => "A Winner has been selected!",
            ActionName::WithdrawCommission => {
                "Your commission has been withdrawn successfully!"
            }
            ActionName::RestartDraw => "Draw restarted successfully",
            ActionName::RefundAll => "All refunded successfully!",
        }
    }

    pub fn failure_message(self) -> &'static str {
        "Whoops something went wrong!"
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local input attached to an action request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Payload {
    #[default]
    None,
    /// Raw quantity as selected in the UI; validated during shaping.
    Tickets { quantity: u32 },
}

/// A fully shaped contract write, ready for the write capability.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteRequest {
    pub action: ActionName,
    pub method: &'static str,
    pub args: WriteArgs,
    pub affected: &'static [RemoteKey],
}

/// Validates `payload` for `action` and builds the write request.
///
/// Buying tickets attaches `ticket-unit-price * quantity` as payment, so the
/// price must already be cached.
pub fn shape(
    action: ActionName,
    payload: Payload,
    snapshot: &CacheSnapshot,
    caller: Option<Address>,
) -> Result<WriteRequest, ValidationError> {
    let value = match (action, payload) {
        (ActionName::BuyTickets, Payload::Tickets { quantity }) => {
            let quantity = TicketQuantity::new(quantity)?;
            let price = snapshot
                .data(RemoteKey::TicketUnitPrice)
                .and_then(|data| data.as_amount())
                .ok_or(ValidationError::PriceNotLoaded)?;
            Some(total_cost(price, quantity)?)
        }
        (ActionName::BuyTickets, Payload::None) => {
            return Err(ValidationError::MissingQuantity { action });
        }
        (_, Payload::Tickets { .. }) => {
            return Err(ValidationError::UnexpectedQuantity { action });
        }
        (_, Payload::None) => None,
    };

    Ok(WriteRequest {
        action,
        method: action.method(),
        args: WriteArgs {
            value,
            from: caller,
        },
        affected: action.affected_keys(),
    })
}

/// UI-side gate for operator-only actions, checked before an action is
/// handed to the controller. The contract remains the final authority.
pub fn authorize(
    action: ActionName,
    caller: Option<&Address>,
    snapshot: &CacheSnapshot,
) -> Result<(), AuthorizationError> {
    let caller = caller.ok_or(AuthorizationError::CallerUnidentified { action })?;
    if !action.is_operator_only() {
        return Ok(());
    }
    let operator = snapshot
        .data(RemoteKey::OperatorAddress)
        .and_then(|data| data.as_address())
        .ok_or(AuthorizationError::OperatorUnknown { action })?;
    if operator == *caller {
        Ok(())
    } else {
        Err(AuthorizationError::NotOperator { action })
    }
}
