//! # Escrow Registry
//!
//! Exact-amount escrow ledgers and the registry that creates and tracks
//! them. Two components, composed leaf-first:
//!
//! - **Escrow Ledger** — one identity-to-locked-amount mapping per instance,
//!   enforcing the exact-stake and single-position rules and releasing value
//!   state-first on withdrawal.
//! - **Ledger Registry** — the sole construction authority for instances,
//!   with append-only creator and global indexes, pagination, and a
//!   provenance-first `describe` protocol that never trusts a reference it
//!   did not create.
//!
//! Callers create instances through the registry, then invoke the instance
//! directly for deposits and withdrawals against an [`host::AccountBook`];
//! anyone may ask the registry to verify and describe any reference.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — wrapping arithmetic and
//!    money do not mix.
//! 2. Exactly one all-or-nothing position per identity per instance: a
//!    locked amount is always 0 or the instance's required amount, nothing
//!    else is ever observable.
//! 3. State commits strictly before value release. A withdrawal zeroes the
//!    position, then transfers; a rejected transfer rolls the whole
//!    operation back.
//! 4. Every failure carries its specific reason; every public type is
//!    serializable (serde) for wire transport and persistent storage.

pub mod host;
pub mod ledger;
pub mod registry;

pub use host::{AccountBook, TransferError};
pub use ledger::{EscrowLedger, LedgerError, LedgerEvent};
pub use registry::{
    describe_accessors, LedgerAccessors, LedgerDescription, LedgerId, LedgerRegistry,
    RegistryError, RegistryEvent,
};
