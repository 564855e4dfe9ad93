use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fulfillment states an order can occupy.
///
/// Orders typically progress left to right but may skip states:
///
/// `pending → confirmed → preparing → ready → out_for_delivery → delivered`
///
/// `cancelled` can be reached from any non-terminal state. `delivered` and
/// `cancelled` are terminal.
///
/// Serialized as its canonical snake_case name. Deserialization goes through
/// [`OrderStatus::from_requested`], so records written with a legacy alias
/// (e.g. `"accepted"`) load as their canonical status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

/// Caller-facing synonyms that map onto a canonical status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAlias {
    Accepted,
    HandedToDelivery,
    Rejected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid status: `{0}`")]
pub struct InvalidStatus(pub String);

impl StatusAlias {
    pub const ALL: [StatusAlias; 3] = [
        StatusAlias::Accepted,
        StatusAlias::HandedToDelivery,
        StatusAlias::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusAlias::Accepted => "accepted",
            StatusAlias::HandedToDelivery => "handed_to_delivery",
            StatusAlias::Rejected => "rejected",
        }
    }

    pub fn canonical(self) -> OrderStatus {
        match self {
            StatusAlias::Accepted => OrderStatus::Confirmed,
            StatusAlias::HandedToDelivery => OrderStatus::OutForDelivery,
            StatusAlias::Rejected => OrderStatus::Cancelled,
        }
    }

    fn lookup(lowered: &str) -> Option<Self> {
        StatusAlias::ALL.into_iter().find(|a| a.as_str() == lowered)
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Normalizes then validates a caller-supplied status.
    ///
    /// The error carries the value exactly as the caller sent it.
    pub fn from_requested(raw: &str) -> Result<Self, InvalidStatus> {
        normalize(raw)
            .parse()
            .map_err(|_| InvalidStatus(raw.to_string()))
    }
}

/// Maps caller vocabulary onto canonical status names.
///
/// Case-insensitive. Unknown values are returned lower-cased and otherwise
/// unchanged; they fail [`is_valid`] afterwards.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match StatusAlias::lookup(&lowered) {
        Some(alias) => alias.canonical().as_str().to_string(),
        None => lowered,
    }
}

/// True iff `raw` names a canonical status, ignoring case. Aliases are not
/// canonical; run [`normalize`] first.
pub fn is_valid(raw: &str) -> bool {
    raw.trim().to_ascii_lowercase().parse::<OrderStatus>().is_ok()
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse of a canonical, lower-case name.
impl FromStr for OrderStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = InvalidStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrderStatus::from_requested(&value)
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}
