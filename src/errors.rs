use crate::{
    amount::{
        Amount,
        TicketQuantity,
    },
    catalog::ActionName,
    remote::RemoteKey,
};
use thiserror::Error;

/// A request failed local shaping rules and never reached the remote service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "ticket quantity {quantity} is outside [{}, {}]",
        TicketQuantity::MIN,
        TicketQuantity::MAX
    )]
    QuantityOutOfRange { quantity: u32 },
    #[error("{action} does not take a ticket quantity")]
    UnexpectedQuantity { action: ActionName },
    #[error("{action} requires a ticket quantity")]
    MissingQuantity { action: ActionName },
    #[error("ticket price has not been loaded yet")]
    PriceNotLoaded,
    #[error("ticket price {price} exceeds the supported maximum")]
    PriceOutOfBounds { price: Amount },
}

/// An operator-only action was requested by someone other than the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("{action} requires a connected wallet")]
    CallerUnidentified { action: ActionName },
    #[error("{action} is operator-only and the operator address is not loaded")]
    OperatorUnknown { action: ActionName },
    #[error("{action} is operator-only")]
    NotOperator { action: ActionName },
}

/// Local rejection of an action. Neither variant creates a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectedAction {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// The write capability rejected the call, or the contract reverted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote call rejected: {reason}")]
pub struct RemoteWriteError {
    pub reason: String,
}

impl RemoteWriteError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One or more keys of a refresh could not be read. Those keys stay stale.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to read {} remote value(s): {}", .failures.len(), describe(.failures))]
pub struct RemoteReadError {
    pub failures: Vec<(RemoteKey, String)>,
}

impl RemoteReadError {
    pub fn keys(&self) -> impl Iterator<Item = RemoteKey> + '_ {
        self.failures.iter().map(|(key, _)| *key)
    }
}

fn describe(failures: &[(RemoteKey, String)]) -> String {
    failures
        .iter()
        .map(|(key, reason)| format!("{key} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),
    #[error("address must be 20 bytes of hex: {0}")]
    InvalidHex(String),
}

/// Transport-level failure talking to the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("gateway responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid payload for {key}: {reason}")]
    InvalidPayload { key: RemoteKey, reason: String },
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
}
