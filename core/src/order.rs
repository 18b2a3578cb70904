use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::event::EventPosition;
use crate::ids::{ChainId, MessageId};

/// Which leg of the round trip an order services (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Destination-chain execution of the message payload.
    Delivery,
    /// Origin-chain confirmation that delivery completed.
    Ack,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Delivery => "delivery",
            OrderKind::Ack => "ack",
        }
    }
}

/// A candidate unit of work emitted by the Evaluator (spec.md §4.5) and consumed by the
/// Submitter (spec.md §4.6). Not yet gas-priced or signed.
#[derive(Debug, Clone)]
pub struct SubmitOrder {
    pub mid: MessageId,
    pub kind: OrderKind,
    /// Chain this order's transaction must land on: destination for delivery, origin for ack.
    pub target_chain: ChainId,
    /// Position of the event that triggered this order, used for FIFO ordering
    /// (spec.md §4.5 "Ordering").
    pub triggering_position: EventPosition,
    /// Local wall-clock time the order was first observed, used to enforce
    /// `newOrdersDelay` before submission.
    pub first_observed: Instant,
}

impl SubmitOrder {
    pub fn new(mid: MessageId, kind: OrderKind, target_chain: ChainId, triggering_position: EventPosition) -> Self {
        Self {
            mid,
            kind,
            target_chain,
            triggering_position,
            first_observed: Instant::now(),
        }
    }
}

/// An entry on a `pending_orders:<chainId>` queue (spec.md §4.3): the MID that needs
/// evaluating, plus the wall-clock time it was enqueued so the Evaluator can enforce
/// `newOrdersDelay` across ticks without keeping its own in-memory timer per MID
/// (SPEC_FULL.md §4 "Ordering").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCandidate {
    pub mid: MessageId,
    pub enqueued_at_unix_ms: u64,
}

impl QueuedCandidate {
    pub fn new(mid: MessageId, enqueued_at_unix_ms: u64) -> Self {
        Self {
            mid,
            enqueued_at_unix_ms,
        }
    }
}
