//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► AwaitingPickup ──► Received
///    │                              ▲
///    └──────────────────────────────┘
/// ```
///
/// Keeping the current status is always allowed. Moving backwards is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order has been placed.
    #[default]
    Created,

    /// Books are set aside in the store, waiting for the customer.
    AwaitingPickup,

    /// Customer has collected the order (terminal state).
    Received,
}

/// Allowed forward transitions.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Created, OrderStatus::AwaitingPickup),
    (OrderStatus::Created, OrderStatus::Received),
    (OrderStatus::AwaitingPickup, OrderStatus::Received),
];

impl OrderStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Created,
        OrderStatus::AwaitingPickup,
        OrderStatus::Received,
    ];

    /// Returns true if an order in this status may be saved with `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        *self == next || TRANSITIONS.contains(&(*self, next))
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Received)
    }

    /// Returns the storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::AwaitingPickup => "awaiting_pickup",
            OrderStatus::Received => "received",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known order status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown order status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" | "Created" => Ok(OrderStatus::Created),
            "awaiting_pickup" | "AwaitingPickup" => Ok(OrderStatus::AwaitingPickup),
            "received" | "Received" => Ok(OrderStatus::Received),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}
