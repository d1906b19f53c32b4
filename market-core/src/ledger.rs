//! Escrow ledger primitives
//!
//! Three balance moves cover the whole order lifecycle:
//!
//! - [`freeze`] - available -> frozen, when an order is paid
//! - [`release`] - buyer frozen -> seller available, on confirmed receipt
//! - [`refund`] - frozen -> available, on an approved refund
//!
//! Each operation validates, mutates the passed account structs, and stages
//! the rows plus an audit event into the caller's [`UnitOfWork`]. Nothing
//! moves unless the caller commits the unit, so a failure anywhere in the
//! surrounding operation leaves balances untouched.
//!
//! # Conservation invariant
//!
//! Over any sequence of these operations, the sum of `available + frozen`
//! across the involved accounts changes only through
//! [`open_account_balance`]. [`release`] re-checks the two-account total and
//! fails the unit if it ever drifts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::audit::{AuditEvent, AuditKind};
use crate::error::{Error, Result};
use crate::storage::UnitOfWork;
use crate::types::{Account, OrderId};

fn require_positive(amount: Decimal, operation: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::Validation(format!(
            "{} amount must be positive, got {}",
            operation, amount
        )));
    }
    Ok(())
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::Consistency("balance arithmetic overflow".to_string()))
}

fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| Error::Consistency("balance arithmetic underflow".to_string()))
}

/// Move buyer funds from available into escrow
pub fn freeze(
    unit: &mut UnitOfWork<'_>,
    account: &mut Account,
    amount: Decimal,
    order_id: OrderId,
    now: DateTime<Utc>,
) -> Result<()> {
    require_positive(amount, "freeze")?;

    if account.available < amount {
        return Err(Error::Precondition(format!(
            "insufficient balance: account {} has {} available, needs {}",
            account.account_id, account.available, amount
        )));
    }

    let available = checked_sub(account.available, amount)?;
    let frozen = checked_add(account.frozen, amount)?;
    account.available = available;
    account.frozen = frozen;
    account.updated_at = now;

    unit.stage_account(account)?;
    unit.stage_audit(&AuditEvent::for_order(
        order_id,
        AuditKind::FundsFrozen {
            account: account.account_id,
            amount,
        },
        now,
    ))?;

    tracing::debug!(account = %account.account_id, %amount, "Funds frozen");

    Ok(())
}

/// Release escrow from the buyer to the seller
///
/// Both account mutations land in the same unit, so the transfer nets to
/// zero or does not happen at all.
pub fn release(
    unit: &mut UnitOfWork<'_>,
    from: &mut Account,
    to: &mut Account,
    amount: Decimal,
    order_id: OrderId,
    now: DateTime<Utc>,
) -> Result<()> {
    require_positive(amount, "release")?;

    if from.frozen < amount {
        return Err(Error::Precondition(format!(
            "escrow shortfall: account {} holds {} frozen, release needs {}",
            from.account_id, from.frozen, amount
        )));
    }

    let total_before = checked_add(from.total_balance(), to.total_balance())?;

    from.frozen = checked_sub(from.frozen, amount)?;
    from.updated_at = now;
    to.available = checked_add(to.available, amount)?;
    to.updated_at = now;

    let total_after = checked_add(from.total_balance(), to.total_balance())?;
    if total_before != total_after {
        return Err(Error::Consistency(format!(
            "release broke conservation: {} before, {} after",
            total_before, total_after
        )));
    }

    unit.stage_account(from)?;
    unit.stage_account(to)?;
    unit.stage_audit(&AuditEvent::for_order(
        order_id,
        AuditKind::FundsReleased {
            from: from.account_id,
            to: to.account_id,
            amount,
        },
        now,
    ))?;

    tracing::debug!(
        from = %from.account_id,
        to = %to.account_id,
        %amount,
        "Escrow released"
    );

    Ok(())
}

/// Return escrow to the buyer's available balance
pub fn refund(
    unit: &mut UnitOfWork<'_>,
    account: &mut Account,
    amount: Decimal,
    order_id: OrderId,
    now: DateTime<Utc>,
) -> Result<()> {
    require_positive(amount, "refund")?;

    if account.frozen < amount {
        return Err(Error::Precondition(format!(
            "escrow shortfall: account {} holds {} frozen, refund needs {}",
            account.account_id, account.frozen, amount
        )));
    }

    let frozen = checked_sub(account.frozen, amount)?;
    let available = checked_add(account.available, amount)?;
    account.frozen = frozen;
    account.available = available;
    account.updated_at = now;

    unit.stage_account(account)?;
    unit.stage_audit(&AuditEvent::for_order(
        order_id,
        AuditKind::FundsRefunded {
            account: account.account_id,
            amount,
        },
        now,
    ))?;

    tracing::debug!(account = %account.account_id, %amount, "Escrow refunded");

    Ok(())
}

/// Credit the opening balance of a freshly registered account
///
/// The only balance change that does not net to zero; zero is allowed.
pub fn open_account_balance(
    unit: &mut UnitOfWork<'_>,
    account: &mut Account,
    opening: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    if opening < Decimal::ZERO {
        return Err(Error::Validation(format!(
            "opening balance must not be negative, got {}",
            opening
        )));
    }

    account.available = checked_add(account.available, opening)?;
    account.updated_at = now;

    unit.stage_account(account)?;
    unit.stage_audit(&AuditEvent::standalone(
        AuditKind::AccountOpened {
            account: account.account_id,
            opening_balance: opening,
        },
        now,
    ))?;

    Ok(())
}
