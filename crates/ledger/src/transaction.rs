use chrono::{DateTime, Utc};
use core_types::Pair;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Buy,
    Sell,
}

/// One immutable entry in the append-only transaction log.
///
/// Amounts follow the pair's two legs: `right_amount` is denominated in the
/// quote asset, `left_amount` in the base asset. Signs carry direction, so
/// balances are plain sums over a category. A transaction is never mutated
/// after creation; bookkeeping that needs an adjusted copy (e.g. turning a
/// buy's quote debit into a position credit) creates a *new* transaction
/// linked back to the original for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub pair: Pair,
    /// Signed amount in the quote asset.
    pub right_amount: Decimal,
    /// Signed amount in the base asset.
    pub left_amount: Decimal,
    /// Fee paid for this entry, tracked separately and never folded into
    /// the amounts above.
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Audit link to the transaction this entry was derived from.
    pub link: Option<Uuid>,
}

impl Transaction {
    pub fn new(
        kind: TransactionKind,
        pair: Pair,
        right_amount: Decimal,
        left_amount: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            pair,
            right_amount,
            left_amount,
            fee,
            timestamp: Utc::now(),
            link: None,
        }
    }

    /// Creates a new transaction derived from this one with adjusted amounts,
    /// linked back to the original. The original is left untouched.
    pub fn derived(&self, right_amount: Decimal, left_amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: self.kind,
            pair: self.pair.clone(),
            right_amount,
            left_amount,
            fee: Decimal::ZERO,
            timestamp: self.timestamp,
            link: Some(self.id),
        }
    }
}
