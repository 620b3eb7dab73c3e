//! # Account Book -- Native Currency Accounting
//!
//! The escrow ledger moves real value, so something has to keep the books.
//! An [`AccountBook`] is a flat map from identity to native-currency balance,
//! standing in for the host environment's account storage. Every deposit and
//! withdrawal routes through [`AccountBook::transfer`], which either moves
//! the full amount or moves nothing.
//!
//! Recipients can refuse inbound transfers. A refusal models a recipient
//! whose receive hook rejects payment -- the mechanism a hostile withdrawer
//! uses to try to wedge an escrow into a partial state. The transfer API
//! surfaces the refusal as an error before any balance changes, so callers
//! can roll back cleanly.
//!
//! Identities are hex-encoded public key strings throughout, same as the
//! rest of the crate. The book does not verify signatures or key formats;
//! authorization is the caller's problem.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when moving native currency between accounts.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The sending account does not hold enough to cover the transfer.
    #[error("insufficient funds: {from} has {available}, requested {requested}")]
    InsufficientFunds {
        /// The account being debited.
        from: String,
        /// Its current balance.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// The receiving account refuses inbound transfers.
    #[error("recipient {to} refused the transfer")]
    RecipientRefused {
        /// The account that refused.
        to: String,
    },

    /// Crediting the recipient would overflow `u64::MAX`.
    #[error("balance overflow: {to} holds {current}, credit {credit}")]
    BalanceOverflow {
        /// The account being credited.
        to: String,
        /// Its balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// AccountBook
// ---------------------------------------------------------------------------

/// In-memory native-currency balances keyed by identity.
///
/// In production these balances live in the host environment's persistent
/// account storage; the in-memory representation here carries the same
/// semantics for validation logic and testing. Accounts spring into
/// existence on first credit -- an unknown identity simply has balance 0.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountBook {
    /// Balances in smallest units, keyed by identity.
    balances: HashMap<String, u64>,
    /// Identities currently refusing inbound transfers.
    refusing: HashSet<String>,
}

impl AccountBook {
    /// Creates an empty account book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance of `identity`, or 0 if the account has never
    /// been credited.
    pub fn balance_of(&self, identity: &str) -> u64 {
        self.balances.get(identity).copied().unwrap_or(0)
    }

    /// Credits `amount` to `identity` out of thin air.
    ///
    /// This is the bootstrap path for seeding balances; ordinary value
    /// movement goes through [`transfer`](Self::transfer), which conserves
    /// the total.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::BalanceOverflow`] if the credit would
    /// exceed `u64::MAX`.
    pub fn mint(&mut self, identity: &str, amount: u64) -> Result<u64, TransferError> {
        let current = self.balance_of(identity);
        let updated = current
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow {
                to: identity.to_string(),
                current,
                credit: amount,
            })?;
        self.balances.insert(identity.to_string(), updated);
        Ok(updated)
    }

    /// Moves `amount` from one account to another.
    ///
    /// All checks run before either balance changes, so a failed transfer
    /// never moves value. A zero-amount transfer to a willing recipient
    /// succeeds and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::RecipientRefused`] if `to` refuses inbound
    /// transfers, [`TransferError::InsufficientFunds`] if `from` cannot
    /// cover the amount, or [`TransferError::BalanceOverflow`] if crediting
    /// `to` would overflow.
    pub fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), TransferError> {
        if self.refusing.contains(to) {
            return Err(TransferError::RecipientRefused { to: to.to_string() });
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                from: from.to_string(),
                available,
                requested: amount,
            });
        }

        // A self-transfer is a no-op once the funds check passes.
        if from == to {
            return Ok(());
        }

        let current = self.balance_of(to);
        let credited = current
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow {
                to: to.to_string(),
                current,
                credit: amount,
            })?;

        self.balances.insert(from.to_string(), available - amount);
        self.balances.insert(to.to_string(), credited);
        Ok(())
    }

    /// Marks `identity` as refusing (or accepting) inbound transfers.
    pub fn set_refuses_transfers(&mut self, identity: &str, refuses: bool) {
        if refuses {
            self.refusing.insert(identity.to_string());
        } else {
            self.refusing.remove(identity);
        }
    }

    /// Returns `true` if `identity` currently refuses inbound transfers.
    pub fn refuses_transfers(&self, identity: &str) -> bool {
        self.refusing.contains(identity)
    }

    /// Returns the sum of all balances.
    ///
    /// Widened to `u128` so the total cannot overflow even with many
    /// accounts near `u64::MAX`. [`transfer`](Self::transfer) conserves
    /// this quantity; only [`mint`](Self::mint) increases it.
    pub fn total_value(&self) -> u128 {
        self.balances.values().map(|b| u128::from(*b)).sum()
    }

    /// Returns the number of accounts that have ever been credited.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_has_zero_balance() {
        let book = AccountBook::new();
        assert_eq!(book.balance_of("nobody"), 0);
    }

    #[test]
    fn mint_credits_account() {
        let mut book = AccountBook::new();
        assert_eq!(book.mint("alice", 1000).unwrap(), 1000);
        assert_eq!(book.balance_of("alice"), 1000);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut book = AccountBook::new();
        book.mint("alice", u64::MAX).unwrap();
        let result = book.mint("alice", 1);
        assert!(matches!(
            result.unwrap_err(),
            TransferError::BalanceOverflow { .. }
        ));
        assert_eq!(book.balance_of("alice"), u64::MAX);
    }

    #[test]
    fn transfer_moves_value() {
        let mut book = AccountBook::new();
        book.mint("alice", 1000).unwrap();
        book.transfer("alice", "bob", 400).unwrap();
        assert_eq!(book.balance_of("alice"), 600);
        assert_eq!(book.balance_of("bob"), 400);
    }

    #[test]
    fn transfer_conserves_total_value() {
        let mut book = AccountBook::new();
        book.mint("alice", 1000).unwrap();
        let before = book.total_value();
        book.transfer("alice", "bob", 999).unwrap();
        assert_eq!(book.total_value(), before);
    }

    #[test]
    fn transfer_insufficient_funds_rejected() {
        let mut book = AccountBook::new();
        book.mint("alice", 100).unwrap();
        let result = book.transfer("alice", "bob", 200);
        assert!(matches!(
            result.unwrap_err(),
            TransferError::InsufficientFunds {
                available: 100,
                requested: 200,
                ..
            }
        ));
        // Nothing moved.
        assert_eq!(book.balance_of("alice"), 100);
        assert_eq!(book.balance_of("bob"), 0);
    }

    #[test]
    fn refusing_recipient_rejects_transfer() {
        let mut book = AccountBook::new();
        book.mint("alice", 100).unwrap();
        book.set_refuses_transfers("bob", true);

        let result = book.transfer("alice", "bob", 50);
        assert!(matches!(
            result.unwrap_err(),
            TransferError::RecipientRefused { .. }
        ));
        assert_eq!(book.balance_of("alice"), 100);

        book.set_refuses_transfers("bob", false);
        book.transfer("alice", "bob", 50).unwrap();
        assert_eq!(book.balance_of("bob"), 50);
    }

    #[test]
    fn credit_overflow_rejected_without_debit() {
        let mut book = AccountBook::new();
        book.mint("alice", 100).unwrap();
        book.mint("bob", u64::MAX).unwrap();

        let result = book.transfer("alice", "bob", 1);
        assert!(matches!(
            result.unwrap_err(),
            TransferError::BalanceOverflow { .. }
        ));
        assert_eq!(book.balance_of("alice"), 100);
    }

    #[test]
    fn self_transfer_is_noop() {
        let mut book = AccountBook::new();
        book.mint("alice", 100).unwrap();
        book.transfer("alice", "alice", 40).unwrap();
        assert_eq!(book.balance_of("alice"), 100);
    }

    #[test]
    fn zero_transfer_succeeds() {
        let mut book = AccountBook::new();
        book.transfer("alice", "bob", 0).unwrap();
        assert_eq!(book.balance_of("bob"), 0);
    }

    #[test]
    fn account_book_serialization_roundtrip() {
        let mut book = AccountBook::new();
        book.mint("alice", 42).unwrap();
        book.set_refuses_transfers("bob", true);

        let json = serde_json::to_string(&book).expect("serialize");
        let restored: AccountBook = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.balance_of("alice"), 42);
        assert!(restored.refuses_transfers("bob"));
    }
}
