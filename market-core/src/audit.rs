//! Append-only audit log
//!
//! Every balance move, lifecycle transition, and lighting reward records an
//! [`AuditEvent`] staged into the same unit of work as the mutation itself,
//! so the log and the state can never disagree. Event IDs are UUIDv7, which
//! makes the per-order trail chronological by key order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::timestamp::context::ContextV7;
use uuid::{Timestamp, Uuid};

use crate::types::{AccountId, OrderId, Province};

/// Monotonic UUIDv7 generator; plain `now_v7` does not order ids created
/// within the same millisecond
fn next_event_id() -> Uuid {
    static CONTEXT: OnceLock<ContextV7> = OnceLock::new();
    let context = CONTEXT.get_or_init(ContextV7::new);
    Uuid::new_v7(Timestamp::now(context))
}

/// What happened, with the data needed to replay or explain it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditKind {
    /// Account registered, possibly with an opening balance
    AccountOpened {
        /// New account
        account: AccountId,
        /// Initial available balance
        opening_balance: Decimal,
    },

    /// Buyer funds moved from available into escrow
    FundsFrozen {
        /// Buyer account
        account: AccountId,
        /// Amount frozen
        amount: Decimal,
    },

    /// Escrow released from buyer to seller
    FundsReleased {
        /// Buyer account (escrow holder)
        from: AccountId,
        /// Seller account
        to: AccountId,
        /// Amount released
        amount: Decimal,
    },

    /// Escrow returned to the buyer's available balance
    FundsRefunded {
        /// Buyer account
        account: AccountId,
        /// Amount refunded
        amount: Decimal,
    },

    /// Order created and paid
    OrderCreated {
        /// Buyer account
        buyer: AccountId,
        /// Seller account
        seller: AccountId,
        /// Escrowed amount
        amount: Decimal,
    },

    /// Seller shipped the goods
    OrderShipped {
        /// Carrier tracking number
        tracking_no: String,
        /// Seller's province, as captured at ship time
        province: Province,
    },

    /// Buyer (or the sweep) confirmed receipt
    OrderCompleted {
        /// True when the auto-confirm sweep acted for the buyer
        auto: bool,
    },

    /// Buyer asked for a refund
    RefundRequested {
        /// Buyer-supplied reason
        reason: String,
    },

    /// Arbitration approved the refund
    RefundApproved,

    /// Arbitration rejected the refund
    RefundRejected,

    /// A qualifying reward was counted for the buyer in a province
    ProvinceLit {
        /// Buyer account
        account: AccountId,
        /// Province the reward applies to
        province: Province,
        /// True when the province lit for the first time
        first_time: bool,
    },

    /// Buyer advanced to a higher title level
    TitlePromoted {
        /// Promoted account
        account: AccountId,
        /// New title level
        level: u8,
    },
}

impl AuditKind {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            AuditKind::AccountOpened { .. } => "account_opened",
            AuditKind::FundsFrozen { .. } => "funds_frozen",
            AuditKind::FundsReleased { .. } => "funds_released",
            AuditKind::FundsRefunded { .. } => "funds_refunded",
            AuditKind::OrderCreated { .. } => "order_created",
            AuditKind::OrderShipped { .. } => "order_shipped",
            AuditKind::OrderCompleted { .. } => "order_completed",
            AuditKind::RefundRequested { .. } => "refund_requested",
            AuditKind::RefundApproved => "refund_approved",
            AuditKind::RefundRejected => "refund_rejected",
            AuditKind::ProvinceLit { .. } => "province_lit",
            AuditKind::TitlePromoted { .. } => "title_promoted",
        }
    }
}

/// One audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Order this event belongs to, if any
    pub order_id: Option<OrderId>,

    /// What happened
    pub kind: AuditKind,

    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Event tied to an order
    pub fn for_order(order_id: OrderId, kind: AuditKind, now: DateTime<Utc>) -> Self {
        Self {
            event_id: next_event_id(),
            order_id: Some(order_id),
            kind,
            recorded_at: now,
        }
    }

    /// Event with no owning order (account registration)
    pub fn standalone(kind: AuditKind, now: DateTime<Utc>) -> Self {
        Self {
            event_id: next_event_id(),
            order_id: None,
            kind,
            recorded_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_constructors_set_ownership() {
        let now = Utc::now();
        let order_id = OrderId::generate();

        let owned = AuditEvent::for_order(order_id, AuditKind::RefundApproved, now);
        assert_eq!(owned.order_id, Some(order_id));

        let standalone = AuditEvent::standalone(
            AuditKind::AccountOpened {
                account: AccountId::generate(),
                opening_balance: dec!(100.00),
            },
            now,
        );
        assert_eq!(standalone.order_id, None);
        assert_ne!(owned.event_id, standalone.event_id);
    }

    #[test]
    fn test_event_ids_are_monotonic() {
        let now = Utc::now();
        let order_id = OrderId::generate();

        let mut previous = AuditEvent::for_order(order_id, AuditKind::RefundApproved, now);
        for _ in 0..64 {
            let next = AuditEvent::for_order(order_id, AuditKind::RefundApproved, now);
            assert!(previous.event_id < next.event_id);
            previous = next;
        }
    }

    #[test]
    fn test_kind_labels() {
        let kind = AuditKind::FundsFrozen {
            account: AccountId::generate(),
            amount: dec!(40.00),
        };
        assert_eq!(kind.label(), "funds_frozen");
        assert_eq!(AuditKind::RefundRejected.label(), "refund_rejected");
    }
}
