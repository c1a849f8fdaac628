//! Persistent storage behind the [`Repository`] trait.
//!
//! Components only ever see the trait; the sled adapter in [`db`] is the
//! embedded default. A relational adapter can implement the same trait
//! without touching any component.

pub mod db;

use irrl_core::{
    Attestation, AuditEvent, ContentId, Domain, EntityId, Evaluation, IrrlError, Realm, RealmId,
    ReputationCache, StoredProof, VerificationRun,
};

pub use db::SledRepository;

/// Abstract persistent storage serving every component. Each operation is
/// atomic; `record_verification` additionally spans two records in one
/// transaction (the Attestation Manager's verify-then-write sequence).
pub trait Repository: Send + Sync {
    // ── Realms ───────────────────────────────────────────────────────────────
    fn put_realm(&self, realm: &Realm) -> Result<(), IrrlError>;
    fn get_realm(&self, id: &str) -> Result<Option<Realm>, IrrlError>;
    fn get_realm_by_path(&self, path: &str) -> Result<Option<Realm>, IrrlError>;
    fn iter_realms(&self) -> Result<Vec<Realm>, IrrlError>;
    /// Removes the realm row only; the caller cascades dependent rows first.
    fn delete_realm(&self, id: &str) -> Result<(), IrrlError>;

    // ── Attestations ─────────────────────────────────────────────────────────
    fn put_attestation(&self, attestation: &Attestation) -> Result<(), IrrlError>;
    fn get_attestation(&self, id: &str) -> Result<Option<Attestation>, IrrlError>;
    fn iter_attestations(&self) -> Result<Vec<Attestation>, IrrlError>;
    fn iter_attestations_for_subject(
        &self,
        realm_id: &str,
        subject: &str,
    ) -> Result<Vec<Attestation>, IrrlError>;
    fn count_attestations_for_realm(&self, realm_id: &str) -> Result<usize, IrrlError>;

    // ── Verification runs ────────────────────────────────────────────────────
    fn iter_runs_for_attestation(
        &self,
        attestation_id: &str,
    ) -> Result<Vec<VerificationRun>, IrrlError>;
    /// Persist a run and its attestation's status update atomically.
    fn record_verification(
        &self,
        run: &VerificationRun,
        attestation: &Attestation,
    ) -> Result<(), IrrlError>;

    // ── Evaluations ──────────────────────────────────────────────────────────
    /// Upsert keyed by `(from, to, realmId, domain)`.
    fn put_evaluation(&self, evaluation: &Evaluation) -> Result<(), IrrlError>;
    fn get_evaluation(
        &self,
        from: &EntityId,
        to: &EntityId,
        realm_id: &RealmId,
        domain: &Domain,
    ) -> Result<Option<Evaluation>, IrrlError>;
    fn iter_evaluations(&self) -> Result<Vec<Evaluation>, IrrlError>;
    fn iter_evaluations_for_subject(
        &self,
        to: &str,
        realm_id: &str,
        domain: &str,
    ) -> Result<Vec<Evaluation>, IrrlError>;
    fn iter_evaluations_in_domain(&self, domain: &str) -> Result<Vec<Evaluation>, IrrlError>;

    // ── Reputation cache ─────────────────────────────────────────────────────
    fn put_reputation(&self, cache: &ReputationCache) -> Result<(), IrrlError>;
    fn get_reputation(
        &self,
        subject: &str,
        realm_id: &str,
        domain: &str,
    ) -> Result<Option<ReputationCache>, IrrlError>;
    /// Drop every cached row for `(subject, realm)` across all domains.
    fn invalidate_reputation(&self, subject: &str, realm_id: &str) -> Result<(), IrrlError>;
    fn delete_reputation_for_realm(&self, realm_id: &str) -> Result<(), IrrlError>;

    // ── Proofs ───────────────────────────────────────────────────────────────
    fn put_proof(&self, proof: &StoredProof) -> Result<(), IrrlError>;
    fn get_proof(&self, id: &ContentId) -> Result<Option<StoredProof>, IrrlError>;
    fn iter_proofs(&self) -> Result<Vec<StoredProof>, IrrlError>;
    fn delete_proofs_for_realm(&self, realm_id: &str) -> Result<(), IrrlError>;

    // ── Audit chain ──────────────────────────────────────────────────────────
    /// Append under a serial ordering guarantee. The audit log holds its own
    /// mutex; this allocates the next sequence number and persists.
    fn append_audit(&self, event: &AuditEvent) -> Result<u64, IrrlError>;
    /// Events in insertion order.
    fn iter_audit(&self) -> Result<Vec<AuditEvent>, IrrlError>;
    fn last_audit_event(&self) -> Result<Option<AuditEvent>, IrrlError>;

    /// Flush pending writes to durable storage.
    fn flush(&self) -> Result<(), IrrlError>;
}
