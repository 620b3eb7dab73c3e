//! # Ledger Registry
//!
//! The sole construction authority for [`EscrowLedger`] instances. Anyone
//! can create an instance with their own parameters; the registry assigns
//! it a reference, records it in two append-only indexes (per-creator and
//! global), and marks it valid exactly once. Callers then invoke the
//! instance directly for deposits and withdrawals; the registry is only
//! consulted again for introspection.
//!
//! ## Trust Model for `describe`
//!
//! `describe` answers "is this reference one of ours, and what is it?" for
//! an arbitrary reference. Provenance is established *first*, from the
//! registry's own validity set -- never by querying the address, since a
//! foreign address may not implement the expected accessors and could
//! answer with forged data that must never be reported as trustworthy.
//! Only a reference already marked valid is probed, through the fail-soft
//! [`LedgerAccessors`] interface, and if any single probe fails the whole
//! answer degrades to "not recognized": partial trust is treated as no
//! trust.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::EscrowLedger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested page starts at or beyond the end of the instance log.
    #[error("index out of range: start {start_index}, log length {length}")]
    IndexOutOfRange {
        /// The requested start index.
        start_index: usize,
        /// The current length of the instance log.
        length: usize,
    },
}

// ---------------------------------------------------------------------------
// LedgerId
// ---------------------------------------------------------------------------

/// The stable, typed reference by which an instance is located and indexed.
///
/// References are never raw untyped handles: a `LedgerId` the registry has
/// not marked valid describes to nothing, no matter what it points at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerId(Uuid);

impl LedgerId {
    /// Generates a fresh, globally unique reference.
    ///
    /// The registry assigns these at creation; anything else generating one
    /// gets a reference the registry will report as not recognized.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerId({})", self.0)
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Capability queries
// ---------------------------------------------------------------------------

/// The generic capability-query interface consumed by `describe`.
///
/// Each probe is a synchronous, read-only, side-effect-free request:
/// "if you implement accessor X, return its value". A well-formed instance
/// answers every probe with `Some`; a hostile or buggy one may answer
/// `None`, and the caller must tolerate that without corrupting its own
/// state.
pub trait LedgerAccessors {
    /// The instance's required deposit amount, if it exposes one.
    fn probe_required_amount(&self) -> Option<u64>;

    /// The instance's display label, if it exposes one.
    fn probe_label(&self) -> Option<String>;

    /// The instance's owner identity, if it exposes one.
    fn probe_owner(&self) -> Option<String>;
}

impl LedgerAccessors for EscrowLedger {
    fn probe_required_amount(&self) -> Option<u64> {
        Some(self.required_amount())
    }

    fn probe_label(&self) -> Option<String> {
        Some(self.label().to_string())
    }

    fn probe_owner(&self) -> Option<String> {
        Some(self.owner().to_string())
    }
}

/// Runs all three accessor probes against an instance.
///
/// Returns `(required_amount, label, owner)` only if every probe answered;
/// a single failed probe yields `None`. Partially-populated answers are
/// never produced.
pub fn describe_accessors(instance: &dyn LedgerAccessors) -> Option<(u64, String, String)> {
    Some((
        instance.probe_required_amount()?,
        instance.probe_label()?,
        instance.probe_owner()?,
    ))
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The registry's answer to `describe`.
///
/// `valid == false` means the reference is not recognized; every other
/// field is then zero or empty and carries no information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDescription {
    /// Whether the reference names an instance this registry created.
    pub valid: bool,
    /// The instance's required deposit amount.
    pub required_amount: u64,
    /// The instance's display label.
    pub label: String,
    /// The instance creator's identity.
    pub owner: String,
}

impl LedgerDescription {
    /// The explicit "not recognized" answer: invalid, all fields zeroed.
    pub fn not_recognized() -> Self {
        Self {
            valid: false,
            required_amount: 0,
            label: String::new(),
            owner: String::new(),
        }
    }
}

/// Records emitted by committed registry operations, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new instance was constructed and indexed.
    InstanceCreated {
        /// The new instance's reference.
        reference: LedgerId,
        /// The creating identity, recorded as the instance's owner.
        creator: String,
        /// The exact amount the instance accepts.
        required_amount: u64,
        /// The instance's display label.
        label: String,
    },
}

// ---------------------------------------------------------------------------
// LedgerRegistry
// ---------------------------------------------------------------------------

/// Creates, indexes, and introspects [`EscrowLedger`] instances.
///
/// All three indexes are append-only: references are added exactly once at
/// creation and never removed or reordered, so the global log is a stable
/// pagination basis and validity, once granted, is permanent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRegistry {
    /// Instance records keyed by reference.
    ledgers: HashMap<LedgerId, EscrowLedger>,
    /// Per-creator instance references, in creation order. Append-only.
    instances_by_creator: HashMap<String, Vec<LedgerId>>,
    /// Every instance ever created, in creation order. Append-only.
    all_instances: Vec<LedgerId>,
    /// References this registry created. Inserted exactly once, never
    /// removed.
    valid_instance: HashSet<LedgerId>,
    /// Records emitted by committed operations.
    events: Vec<RegistryEvent>,
    /// Timestamp when the registry was created.
    created_at: DateTime<Utc>,
}

impl LedgerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            ledgers: HashMap::new(),
            instances_by_creator: HashMap::new(),
            all_instances: Vec::new(),
            valid_instance: HashSet::new(),
            events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Constructs a new instance with `owner = creator` and returns its
    /// reference.
    ///
    /// The reference is appended to the creator's sequence and the global
    /// log, and marked valid. Creation cannot fail; a zero required amount
    /// is accepted but almost certainly a caller error, so it is logged.
    pub fn create_instance(
        &mut self,
        creator: &str,
        required_amount: u64,
        label: String,
    ) -> LedgerId {
        if required_amount == 0 {
            warn!(creator, label = %label, "creating instance with zero required amount");
        }

        let id = LedgerId::random();
        let ledger = EscrowLedger::new(
            required_amount,
            label.clone(),
            creator.to_string(),
            format!("escrow:{id}"),
        );

        self.ledgers.insert(id, ledger);
        self.instances_by_creator
            .entry(creator.to_string())
            .or_default()
            .push(id);
        self.all_instances.push(id);
        self.valid_instance.insert(id);
        self.events.push(RegistryEvent::InstanceCreated {
            reference: id,
            creator: creator.to_string(),
            required_amount,
            label,
        });

        info!(
            reference = %id,
            creator,
            required_amount,
            "escrow instance created"
        );
        id
    }

    /// Returns the references created by `creator`, in creation order.
    /// Empty if the creator has never created an instance.
    pub fn instances_of(&self, creator: &str) -> &[LedgerId] {
        self.instances_by_creator
            .get(creator)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the number of instances created by `creator`.
    pub fn instance_count_of(&self, creator: &str) -> usize {
        self.instances_of(creator).len()
    }

    /// Returns the total number of instances ever created.
    pub fn total_instances(&self) -> usize {
        self.all_instances.len()
    }

    /// Returns the page of the global instance log starting at
    /// `start_index`, containing at most `page_size` references.
    ///
    /// A `page_size` of 0 yields an empty page. The log never shrinks or
    /// reorders, so concatenating successive pages reproduces it exactly.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::IndexOutOfRange`] if `start_index` is at or
    /// beyond the end of the log.
    pub fn instances_page(
        &self,
        start_index: usize,
        page_size: usize,
    ) -> Result<&[LedgerId], RegistryError> {
        let length = self.all_instances.len();
        if start_index >= length {
            return Err(RegistryError::IndexOutOfRange {
                start_index,
                length,
            });
        }
        let end = start_index.saturating_add(page_size).min(length);
        Ok(&self.all_instances[start_index..end])
    }

    /// Describes an arbitrary reference.
    ///
    /// Validity is checked first, against the registry's own set; an
    /// unrecognized reference is answered without ever probing it. A valid
    /// reference is queried through [`LedgerAccessors`], and if any probe
    /// fails the answer degrades to not-recognized rather than reporting
    /// partially-populated data.
    pub fn describe(&self, reference: &LedgerId) -> LedgerDescription {
        if !self.valid_instance.contains(reference) {
            return LedgerDescription::not_recognized();
        }

        let Some(instance) = self.ledgers.get(reference) else {
            return LedgerDescription::not_recognized();
        };

        match describe_accessors(instance) {
            Some((required_amount, label, owner)) => LedgerDescription {
                valid: true,
                required_amount,
                label,
                owner,
            },
            None => LedgerDescription::not_recognized(),
        }
    }

    /// Returns the instance for a reference, if this registry created it.
    pub fn ledger(&self, reference: &LedgerId) -> Option<&EscrowLedger> {
        self.ledgers.get(reference)
    }

    /// Returns the instance for a reference, mutably, so callers can invoke
    /// its deposit/withdraw operations directly.
    pub fn ledger_mut(&mut self, reference: &LedgerId) -> Option<&mut EscrowLedger> {
        self.ledgers.get_mut(reference)
    }

    /// Records emitted by committed operations, in commit order.
    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    /// Timestamp when the registry was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for LedgerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_instance_assigns_unique_references() {
        let mut registry = LedgerRegistry::new();
        let a = registry.create_instance("alice", 1000, "A".into());
        let b = registry.create_instance("alice", 2000, "B".into());

        assert_ne!(a, b);
        assert_eq!(registry.total_instances(), 2);
        assert_eq!(registry.instances_of("alice"), &[a, b]);
    }

    #[test]
    fn instances_of_unknown_creator_is_empty() {
        let registry = LedgerRegistry::new();
        assert!(registry.instances_of("nobody").is_empty());
        assert_eq!(registry.instance_count_of("nobody"), 0);
    }

    #[test]
    fn creator_sequences_preserve_creation_order() {
        let mut registry = LedgerRegistry::new();
        let a1 = registry.create_instance("alice", 1, "a1".into());
        let b1 = registry.create_instance("bob", 2, "b1".into());
        let a2 = registry.create_instance("alice", 3, "a2".into());

        assert_eq!(registry.instances_of("alice"), &[a1, a2]);
        assert_eq!(registry.instances_of("bob"), &[b1]);
        assert_eq!(registry.instances_page(0, 10).unwrap(), &[a1, b1, a2]);
    }

    #[test]
    fn pagination_clamps_to_log_end() {
        let mut registry = LedgerRegistry::new();
        for i in 0..5 {
            registry.create_instance("alice", 100, format!("L{i}"));
        }

        assert_eq!(registry.instances_page(0, 3).unwrap().len(), 3);
        assert_eq!(registry.instances_page(3, 10).unwrap().len(), 2);
        assert_eq!(registry.instances_page(4, 1).unwrap().len(), 1);
    }

    #[test]
    fn pagination_zero_page_size_is_empty_not_error() {
        let mut registry = LedgerRegistry::new();
        registry.create_instance("alice", 100, "L".into());
        assert!(registry.instances_page(0, 0).unwrap().is_empty());
    }

    #[test]
    fn pagination_start_beyond_end_rejected() {
        let mut registry = LedgerRegistry::new();

        // Empty log: even index 0 is out of range.
        assert!(matches!(
            registry.instances_page(0, 1).unwrap_err(),
            RegistryError::IndexOutOfRange {
                start_index: 0,
                length: 0
            }
        ));

        registry.create_instance("alice", 100, "L".into());
        assert!(matches!(
            registry.instances_page(1, 1).unwrap_err(),
            RegistryError::IndexOutOfRange {
                start_index: 1,
                length: 1
            }
        ));
    }

    #[test]
    fn concatenated_pages_reproduce_the_log() {
        let mut registry = LedgerRegistry::new();
        for i in 0..7 {
            registry.create_instance("alice", 100, format!("L{i}"));
        }

        let mut collected = Vec::new();
        let mut start = 0;
        while start < registry.total_instances() {
            let page = registry.instances_page(start, 3).unwrap();
            collected.extend_from_slice(page);
            start += page.len();
        }

        assert_eq!(collected.as_slice(), registry.instances_page(0, 7).unwrap());
    }

    #[test]
    fn describe_known_instance() {
        let mut registry = LedgerRegistry::new();
        let id = registry.create_instance("alice", 6_900_000_000_000_000, "TestApp".into());

        let description = registry.describe(&id);
        assert_eq!(
            description,
            LedgerDescription {
                valid: true,
                required_amount: 6_900_000_000_000_000,
                label: "TestApp".into(),
                owner: "alice".into(),
            }
        );
    }

    #[test]
    fn describe_foreign_reference_not_recognized() {
        let mut registry = LedgerRegistry::new();
        registry.create_instance("alice", 1000, "L".into());

        let foreign = LedgerId::random();
        assert_eq!(registry.describe(&foreign), LedgerDescription::not_recognized());
    }

    #[test]
    fn describe_degrades_on_any_failed_probe() {
        /// An instance whose label accessor misbehaves.
        struct HostileInstance;

        impl LedgerAccessors for HostileInstance {
            fn probe_required_amount(&self) -> Option<u64> {
                Some(42)
            }
            fn probe_label(&self) -> Option<String> {
                None
            }
            fn probe_owner(&self) -> Option<String> {
                Some("mallory".into())
            }
        }

        // One failed probe means no answer at all, never a partial one.
        assert_eq!(describe_accessors(&HostileInstance), None);
    }

    #[test]
    fn not_recognized_description_is_zeroed() {
        let description = LedgerDescription::not_recognized();
        assert!(!description.valid);
        assert_eq!(description.required_amount, 0);
        assert!(description.label.is_empty());
        assert!(description.owner.is_empty());
    }

    #[test]
    fn creation_emits_instance_created() {
        let mut registry = LedgerRegistry::new();
        let id = registry.create_instance("alice", 1000, "TestApp".into());

        assert_eq!(
            registry.events(),
            &[RegistryEvent::InstanceCreated {
                reference: id,
                creator: "alice".into(),
                required_amount: 1000,
                label: "TestApp".into(),
            }]
        );
    }

    #[test]
    fn zero_required_amount_instance_is_created_and_valid() {
        let mut registry = LedgerRegistry::new();
        let id = registry.create_instance("alice", 0, "Free".into());

        let description = registry.describe(&id);
        assert!(description.valid);
        assert_eq!(description.required_amount, 0);
    }

    #[test]
    fn registry_serialization_roundtrip() {
        let mut registry = LedgerRegistry::new();
        let id = registry.create_instance("alice", 1000, "TestApp".into());

        let json = serde_json::to_string(&registry).expect("serialize");
        let restored: LedgerRegistry = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.total_instances(), 1);
        assert_eq!(restored.instances_of("alice"), &[id]);
        assert!(restored.describe(&id).valid);
    }
}
