//! # Escrow Ledger Contract
//!
//! An all-or-nothing escrow: each instance is configured with one exact
//! `required_amount` at creation, and every identity holds at most one
//! position. The per-identity state machine has exactly two states:
//!
//! - **Empty** -- no position; `locked_amount` is 0.
//! - **Locked** -- one open position of exactly `required_amount`.
//!
//! `deposit` moves Empty -> Locked by pulling the attached value into the
//! instance's custody account; `withdraw` moves Locked -> Empty and releases
//! the value back to the caller. No other locked amount is ever observable.
//!
//! ## Security Model
//!
//! - **Exact-amount matching**: a deposit of anything other than
//!   `required_amount` is rejected outright. No partial deposits, no top-ups,
//!   no refund arithmetic.
//! - **State before transfer**: `withdraw` zeroes the position *before*
//!   attempting the outbound transfer. A re-entrant withdrawal attempted
//!   during the release step observes the already-zeroed position and fails
//!   with [`LedgerError::NothingToWithdraw`]. If the transfer is rejected,
//!   the position is restored exactly as it was -- there is no
//!   partial-success state.
//! - **No stray value**: bare value sent outside `deposit` and calls to
//!   undefined entry points are rejected through [`EscrowLedger::call`],
//!   closing the "funds stuck with no accounting" failure mode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::AccountBook;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow ledger operations.
///
/// Every failure aborts the triggering operation with no effect on state;
/// the variants carry the quantities a caller needs to distinguish "wrong
/// amount" from "already holds a position" from "transfer rejected".
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The attached value does not equal the instance's required amount.
    #[error("amount mismatch: instance requires {required}, attached {attached}")]
    AmountMismatch {
        /// The only amount this instance accepts.
        required: u64,
        /// The value the caller attached.
        attached: u64,
    },

    /// The caller already holds an open position on this instance.
    #[error("identity {identity} already holds a locked position")]
    AlreadyLocked {
        /// The depositing identity.
        identity: String,
    },

    /// The caller has no open position to withdraw.
    #[error("identity {identity} has nothing to withdraw")]
    NothingToWithdraw {
        /// The withdrawing identity.
        identity: String,
    },

    /// Moving value between the caller and the custody account was rejected.
    /// The operation rolled back; no state changed.
    #[error("transfer of {amount} for {identity} failed")]
    TransferFailed {
        /// The identity whose transfer was rejected.
        identity: String,
        /// The amount that failed to move.
        amount: u64,
    },

    /// Bare value was sent to the instance outside of `deposit`.
    #[error("direct transfer of {value} rejected: value is only accepted through deposit")]
    DirectTransferRejected {
        /// The value that was attached.
        value: u64,
    },

    /// The named entry point does not exist on this instance.
    #[error("unknown operation: {operation}")]
    UnknownOperation {
        /// The operation name the caller invoked.
        operation: String,
    },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Records emitted by committed ledger operations, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// An identity opened a position of exactly the required amount.
    Deposited {
        /// The depositing identity.
        identity: String,
        /// The locked amount.
        amount: u64,
    },
    /// An identity closed its position and reclaimed the locked amount.
    Withdrawn {
        /// The withdrawing identity.
        identity: String,
        /// The released amount.
        amount: u64,
    },
}

// ---------------------------------------------------------------------------
// EscrowLedger
// ---------------------------------------------------------------------------

/// One escrow ledger instance.
///
/// `required_amount`, `label`, and `owner` are fixed at creation and never
/// change. `owner` is metadata only -- it identifies the creator for
/// introspection and gates nothing. The instance is never destroyed; its
/// mutable state is exactly the position map and its derived counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowLedger {
    /// The only deposit amount this instance will ever accept.
    required_amount: u64,
    /// Human-readable display label.
    label: String,
    /// Hex-encoded public key of the creator. Metadata only.
    owner: String,
    /// The custody account holding all deposited value, in the
    /// [`AccountBook`] the instance operates against.
    address: String,
    /// Open positions: identity -> locked amount. An entry's presence means
    /// Locked; its value is always exactly `required_amount`.
    positions: HashMap<String, u64>,
    /// Number of open positions. Always equals `positions.len()`.
    position_count: u64,
    /// Records emitted by committed operations.
    events: Vec<LedgerEvent>,
    /// Timestamp when the instance was created.
    created_at: DateTime<Utc>,
    /// Timestamp of the most recent committed mutation.
    updated_at: DateTime<Utc>,
}

impl EscrowLedger {
    /// Creates a new instance with immutable parameters and no positions.
    ///
    /// `address` names the custody account this instance owns in the
    /// account book. The registry derives it from the instance reference;
    /// nothing else may transfer out of it.
    pub fn new(required_amount: u64, label: String, owner: String, address: String) -> Self {
        let now = Utc::now();
        Self {
            required_amount,
            label,
            owner,
            address,
            positions: HashMap::new(),
            position_count: 0,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Opens a position for `caller` by locking exactly `value`.
    ///
    /// The attached value is pulled from the caller's account into the
    /// instance's custody account before any position state is written, so
    /// a rejected custody transfer leaves the ledger untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AmountMismatch`] unless `value` equals the
    /// required amount, [`LedgerError::AlreadyLocked`] if the caller already
    /// holds a position, or [`LedgerError::TransferFailed`] if the caller's
    /// account cannot cover the attached value.
    pub fn deposit(
        &mut self,
        book: &mut AccountBook,
        caller: &str,
        value: u64,
    ) -> Result<(), LedgerError> {
        if value != self.required_amount {
            return Err(LedgerError::AmountMismatch {
                required: self.required_amount,
                attached: value,
            });
        }

        if self.positions.contains_key(caller) {
            return Err(LedgerError::AlreadyLocked {
                identity: caller.to_string(),
            });
        }

        book.transfer(caller, &self.address, value)
            .map_err(|_| LedgerError::TransferFailed {
                identity: caller.to_string(),
                amount: value,
            })?;

        self.positions.insert(caller.to_string(), value);
        self.position_count += 1;
        self.updated_at = Utc::now();
        self.events.push(LedgerEvent::Deposited {
            identity: caller.to_string(),
            amount: value,
        });

        info!(
            instance = %self.address,
            identity = caller,
            amount = value,
            "position opened"
        );
        Ok(())
    }

    /// Closes the caller's position and releases the locked amount back to
    /// the caller's account. Returns the released amount.
    ///
    /// The position is removed and the counter decremented *before* the
    /// outbound transfer is attempted. If the recipient rejects the
    /// transfer, both are restored exactly as they were and the operation
    /// fails as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NothingToWithdraw`] if the caller holds no
    /// position, or [`LedgerError::TransferFailed`] if the outbound transfer
    /// was rejected (state rolled back).
    pub fn withdraw(&mut self, book: &mut AccountBook, caller: &str) -> Result<u64, LedgerError> {
        let amount = match self.positions.remove(caller) {
            Some(amount) => amount,
            None => {
                return Err(LedgerError::NothingToWithdraw {
                    identity: caller.to_string(),
                })
            }
        };
        self.position_count -= 1;

        // The position is already zeroed: a re-entrant withdraw issued by
        // the recipient during the release step lands in the match above
        // and fails with NothingToWithdraw.
        if book.transfer(&self.address, caller, amount).is_err() {
            self.positions.insert(caller.to_string(), amount);
            self.position_count += 1;
            debug!(
                instance = %self.address,
                identity = caller,
                amount,
                "outbound transfer rejected, withdrawal rolled back"
            );
            return Err(LedgerError::TransferFailed {
                identity: caller.to_string(),
                amount,
            });
        }

        self.updated_at = Utc::now();
        self.events.push(LedgerEvent::Withdrawn {
            identity: caller.to_string(),
            amount,
        });

        info!(
            instance = %self.address,
            identity = caller,
            amount,
            "position closed"
        );
        Ok(amount)
    }

    /// Entry-point router for raw invocations against the instance.
    ///
    /// `"deposit"` and `"withdraw"` dispatch to the corresponding
    /// operations. Value attached to anything other than `deposit` is
    /// rejected with [`LedgerError::DirectTransferRejected`] -- accepting
    /// it would strand funds with no accounting. A call to any other entry
    /// point fails with [`LedgerError::UnknownOperation`].
    pub fn call(
        &mut self,
        book: &mut AccountBook,
        caller: &str,
        operation: &str,
        value: u64,
    ) -> Result<(), LedgerError> {
        match operation {
            "deposit" => self.deposit(book, caller, value),
            "withdraw" if value == 0 => self.withdraw(book, caller).map(|_| ()),
            _ if value != 0 => Err(LedgerError::DirectTransferRejected { value }),
            other => Err(LedgerError::UnknownOperation {
                operation: other.to_string(),
            }),
        }
    }

    /// Returns `true` if `identity` currently holds an open position.
    pub fn is_locked(&self, identity: &str) -> bool {
        self.positions.contains_key(identity)
    }

    /// Returns the locked amount for `identity`: 0 when Empty, exactly
    /// the required amount when Locked.
    pub fn locked_amount(&self, identity: &str) -> u64 {
        self.positions.get(identity).copied().unwrap_or(0)
    }

    /// Returns the number of identities with an open position.
    pub fn total_locked_positions(&self) -> u64 {
        self.position_count
    }

    /// The only amount this instance accepts.
    pub fn required_amount(&self) -> u64 {
        self.required_amount
    }

    /// The instance's display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The creator's identity. Metadata only; gates nothing.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The instance's custody account in the account book.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Value currently held in custody by this instance.
    pub fn held_balance(&self, book: &AccountBook) -> u64 {
        book.balance_of(&self.address)
    }

    /// Records emitted by committed operations, in commit order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Timestamp when the instance was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the most recent committed mutation.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
