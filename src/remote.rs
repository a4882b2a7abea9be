//! The remote service seen from the client: the well-known read keys, the
//! typed values they carry, and the read/write capabilities.

use crate::{
    amount::Amount,
    errors::{
        AddressError,
        RemoteWriteError,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use std::{
    fmt,
    future::Future,
    str::FromStr,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RemoteKey {
    RemainingTicketCount,
    CurrentPoolAmount,
    TicketUnitPrice,
    CommissionUnitAmount,
    DrawExpiration,
    TicketOwnerList,
    WinningsForCaller,
    LastWinnerAmount,
    LastWinnerAddress,
    OperatorAddress,
    OperatorTotalCommission,
}

/// Shape of the value stored under a [`RemoteKey`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Amount,
    Count,
    Address,
    Timestamp,
    AddressList,
}

impl RemoteKey {
    pub const ALL: [RemoteKey; 11] = [
        RemoteKey::RemainingTicketCount,
        RemoteKey::CurrentPoolAmount,
        RemoteKey::TicketUnitPrice,
        RemoteKey::CommissionUnitAmount,
        RemoteKey::DrawExpiration,
        RemoteKey::TicketOwnerList,
        RemoteKey::WinningsForCaller,
        RemoteKey::LastWinnerAmount,
        RemoteKey::LastWinnerAddress,
        RemoteKey::OperatorAddress,
        RemoteKey::OperatorTotalCommission,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RemoteKey::RemainingTicketCount => "remaining-ticket-count",
            RemoteKey::CurrentPoolAmount => "current-pool-amount",
            RemoteKey::TicketUnitPrice => "ticket-unit-price",
            RemoteKey::CommissionUnitAmount => "commission-unit-amount",
            RemoteKey::DrawExpiration => "draw-expiration",
            RemoteKey::TicketOwnerList => "ticket-owner-list",
            RemoteKey::WinningsForCaller => "winnings-for-caller",
            RemoteKey::LastWinnerAmount => "last-winner-amount",
            RemoteKey::LastWinnerAddress => "last-winner-address",
            RemoteKey::OperatorAddress => "operator-address",
            RemoteKey::OperatorTotalCommission => "operator-total-commission",
        }
    }

    /// Contract view method backing this key.
    pub fn method(self) -> &'static str {
        match self {
            RemoteKey::RemainingTicketCount => "RemainingTickets",
            RemoteKey::CurrentPoolAmount => "CurrentWinningReward",
            RemoteKey::TicketUnitPrice => "ticketPrice",
            RemoteKey::CommissionUnitAmount => "ticketCommission",
            RemoteKey::DrawExpiration => "expiration",
            RemoteKey::TicketOwnerList => "getTickets",
            RemoteKey::WinningsForCaller => "getWinningsForAddress",
            RemoteKey::LastWinnerAmount => "lastWinnerAmount",
            RemoteKey::LastWinnerAddress => "lastWinner",
            RemoteKey::OperatorAddress => "lotteryOperator",
            RemoteKey::OperatorTotalCommission => "operatorTotalCommission",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            RemoteKey::CurrentPoolAmount
            | RemoteKey::TicketUnitPrice
            | RemoteKey::CommissionUnitAmount
            | RemoteKey::WinningsForCaller
            | RemoteKey::LastWinnerAmount
            | RemoteKey::OperatorTotalCommission => ValueKind::Amount,
            RemoteKey::RemainingTicketCount => ValueKind::Count,
            RemoteKey::DrawExpiration => ValueKind::Timestamp,
            RemoteKey::TicketOwnerList => ValueKind::AddressList,
            RemoteKey::LastWinnerAddress | RemoteKey::OperatorAddress => {
                ValueKind::Address
            }
        }
    }

    /// Whether the read is parameterised by the caller's address.
    pub fn is_caller_scoped(self) -> bool {
        matches!(self, RemoteKey::WinningsForCaller)
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A 20-byte account address. Compared byte-wise, so checksum casing of the
/// textual form never matters.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0x1234...cdef`, for headers and banners.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(trimmed.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Decoded value of a remote read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteData {
    Amount(Amount),
    Count(u64),
    Address(Address),
    Timestamp(DateTime<Utc>),
    Addresses(Vec<Address>),
}

impl RemoteData {
    pub fn kind(&self) -> ValueKind {
        match self {
            RemoteData::Amount(_) => ValueKind::Amount,
            RemoteData::Count(_) => ValueKind::Count,
            RemoteData::Address(_) => ValueKind::Address,
            RemoteData::Timestamp(_) => ValueKind::Timestamp,
            RemoteData::Addresses(_) => ValueKind::AddressList,
        }
    }

    pub fn as_amount(&self) -> Option<Amount> {
        match self {
            RemoteData::Amount(amount) => Some(*amount),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            RemoteData::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            RemoteData::Address(address) => Some(*address),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            RemoteData::Timestamp(at) => Some(*at),
            _ => None,
        }
    }

    pub fn as_addresses(&self) -> Option<&[Address]> {
        match self {
            RemoteData::Addresses(list) => Some(list),
            _ => None,
        }
    }
}

/// Arguments attached to a contract write.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteArgs {
    /// Payment sent along with the call, in smallest units.
    pub value: Option<Amount>,
    pub from: Option<Address>,
}

/// Receipt of an accepted write. Opaque to the controller beyond success.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteReceipt {
    pub tx_hash: Option<String>,
}

/// Read half of the remote service.
pub trait RemoteReader {
    type Error: fmt::Display;

    /// Reads `key`; `Ok(None)` when the service holds no value for it.
    fn read_value(
        &self,
        key: RemoteKey,
        caller: Option<&Address>,
    ) -> impl Future<Output = Result<Option<RemoteData>, Self::Error>>;
}

/// Write half of the remote service. Resolves once the write is confirmed or
/// rejected; there is no cancellation and no timeout at this layer.
pub trait RemoteWriter {
    fn invoke(
        &self,
        method: &'static str,
        args: WriteArgs,
    ) -> impl Future<Output = Result<WriteReceipt, RemoteWriteError>>;
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn address__parses_mixed_case_to_same_value() {
        let lower: Address = "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".parse().unwrap();
        let mixed: Address = "0xAbCdEfABCDEFabcdefABCDEFabcdefABCDEFabcd".parse().unwrap();

        assert_eq!(lower, mixed);
        assert_eq!(
            mixed.to_string(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }

    #[test]
    fn address__rejects_missing_prefix_and_bad_length() {
        assert!(matches!(
            "abcdefabcdefabcdefabcdefabcdefabcdefabcd".parse::<Address>(),
            Err(AddressError::MissingPrefix(_))
        ));
        assert!(matches!(
            "0xabcd".parse::<Address>(),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn address__short_form_keeps_both_ends() {
        let address: Address = "0x1234567890abcdef1234567890abcdef1234cdef".parse().unwrap();
        assert_eq!(address.short(), "0x1234...cdef");
    }

    #[test]
    fn remote_key__names_are_unique() {
        let mut names: Vec<_> = RemoteKey::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RemoteKey::ALL.len());
    }
}
