use std::path::Path;

use sled::Transactional;

use irrl_core::{
    Attestation, AuditEvent, ContentId, Domain, EntityId, Evaluation, IrrlError, Realm, RealmId,
    ReputationCache, StoredProof, VerificationRun,
};

use crate::Repository;

/// Separator for composite keys. Identifiers are opaque strings, so a
/// non-printable byte keeps composite keys collision-free and prefix-scannable.
const SEP: char = '\u{1f}';

/// Persistent repository backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   realms       — realm id bytes           → json(Realm)
///   realm_paths  — path bytes               → realm id bytes
///   attestations — content id bytes         → json(Attestation)
///   runs         — att id ++ SEP ++ run id  → json(VerificationRun)
///   evaluations  — from␟to␟realm␟domain     → json(Evaluation)
///   reputation   — subject␟realm␟domain     → json(ReputationCache)
///   proofs       — content id bytes         → json(StoredProof)
///   audit        — u64 be sequence          → json(AuditEvent)
///   meta         — utf8 key bytes           → raw bytes
///
/// Values are JSON rather than a binary encoding: the records embed
/// free-form JSON documents (evidence, payloads, rule extensions) that only
/// a self-describing format round-trips.
pub struct SledRepository {
    _db: sled::Db,
    realms: sled::Tree,
    realm_paths: sled::Tree,
    attestations: sled::Tree,
    runs: sled::Tree,
    evaluations: sled::Tree,
    reputation: sled::Tree,
    proofs: sled::Tree,
    audit: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> IrrlError {
    IrrlError::Storage(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, IrrlError> {
    serde_json::to_vec(value).map_err(|e| IrrlError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, IrrlError> {
    serde_json::from_slice(bytes).map_err(|e| IrrlError::Serialization(e.to_string()))
}

fn evaluation_key(from: &str, to: &str, realm_id: &str, domain: &str) -> String {
    format!("{from}{SEP}{to}{SEP}{realm_id}{SEP}{domain}")
}

fn reputation_key(subject: &str, realm_id: &str, domain: &str) -> String {
    format!("{subject}{SEP}{realm_id}{SEP}{domain}")
}

impl SledRepository {
    /// Open or create the repository at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IrrlError> {
        let db = sled::open(path).map_err(storage_err)?;
        let realms       = db.open_tree("realms").map_err(storage_err)?;
        let realm_paths  = db.open_tree("realm_paths").map_err(storage_err)?;
        let attestations = db.open_tree("attestations").map_err(storage_err)?;
        let runs         = db.open_tree("runs").map_err(storage_err)?;
        let evaluations  = db.open_tree("evaluations").map_err(storage_err)?;
        let reputation   = db.open_tree("reputation").map_err(storage_err)?;
        let proofs       = db.open_tree("proofs").map_err(storage_err)?;
        let audit        = db.open_tree("audit").map_err(storage_err)?;
        let meta         = db.open_tree("meta").map_err(storage_err)?;
        Ok(Self { _db: db, realms, realm_paths, attestations, runs, evaluations,
                  reputation, proofs, audit, meta })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        tree: &sled::Tree,
        key: &[u8],
    ) -> Result<Option<T>, IrrlError> {
        match tree.get(key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn collect_values<T: serde::de::DeserializeOwned>(
        iter: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    ) -> Result<Vec<T>, IrrlError> {
        let mut out = Vec::new();
        for item in iter {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }
}

impl Repository for SledRepository {
    // ── Realms ───────────────────────────────────────────────────────────────

    fn put_realm(&self, realm: &Realm) -> Result<(), IrrlError> {
        self.realms
            .insert(realm.id.as_bytes(), encode(realm)?)
            .map_err(storage_err)?;
        self.realm_paths
            .insert(realm.path.as_bytes(), realm.id.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_realm(&self, id: &str) -> Result<Option<Realm>, IrrlError> {
        Self::get_json(&self.realms, id.as_bytes())
    }

    fn get_realm_by_path(&self, path: &str) -> Result<Option<Realm>, IrrlError> {
        match self.realm_paths.get(path.as_bytes()).map_err(storage_err)? {
            Some(id) => Self::get_json(&self.realms, &id),
            None => Ok(None),
        }
    }

    fn iter_realms(&self) -> Result<Vec<Realm>, IrrlError> {
        Self::collect_values(self.realms.iter())
    }

    fn delete_realm(&self, id: &str) -> Result<(), IrrlError> {
        if let Some(realm) = self.get_realm(id)? {
            self.realm_paths
                .remove(realm.path.as_bytes())
                .map_err(storage_err)?;
        }
        self.realms.remove(id.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    // ── Attestations ─────────────────────────────────────────────────────────

    fn put_attestation(&self, attestation: &Attestation) -> Result<(), IrrlError> {
        self.attestations
            .insert(attestation.id.as_bytes(), encode(attestation)?)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_attestation(&self, id: &str) -> Result<Option<Attestation>, IrrlError> {
        Self::get_json(&self.attestations, id.as_bytes())
    }

    fn iter_attestations(&self) -> Result<Vec<Attestation>, IrrlError> {
        Self::collect_values(self.attestations.iter())
    }

    fn iter_attestations_for_subject(
        &self,
        realm_id: &str,
        subject: &str,
    ) -> Result<Vec<Attestation>, IrrlError> {
        let all: Vec<Attestation> = Self::collect_values(self.attestations.iter())?;
        Ok(all
            .into_iter()
            .filter(|a| a.realm_id == realm_id && a.subject == subject)
            .collect())
    }

    fn count_attestations_for_realm(&self, realm_id: &str) -> Result<usize, IrrlError> {
        let all: Vec<Attestation> = Self::collect_values(self.attestations.iter())?;
        Ok(all.iter().filter(|a| a.realm_id == realm_id).count())
    }

    // ── Verification runs ────────────────────────────────────────────────────

    fn iter_runs_for_attestation(
        &self,
        attestation_id: &str,
    ) -> Result<Vec<VerificationRun>, IrrlError> {
        let prefix = format!("{attestation_id}{SEP}");
        let mut runs: Vec<VerificationRun> =
            Self::collect_values(self.runs.scan_prefix(prefix.as_bytes()))?;
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    fn record_verification(
        &self,
        run: &VerificationRun,
        attestation: &Attestation,
    ) -> Result<(), IrrlError> {
        let run_key = format!("{}{SEP}{}", run.attestation_id, run.id);
        let run_bytes = encode(run)?;
        let att_bytes = encode(attestation)?;
        (&self.runs, &self.attestations)
            .transaction(
                |(runs, attestations)| -> sled::transaction::ConflictableTransactionResult<(), ()> {
                    runs.insert(run_key.as_bytes(), run_bytes.as_slice())?;
                    attestations.insert(attestation.id.as_bytes(), att_bytes.as_slice())?;
                    Ok(())
                },
            )
            .map_err(|e| IrrlError::Storage(format!("{e:?}")))?;
        Ok(())
    }

    // ── Evaluations ──────────────────────────────────────────────────────────

    fn put_evaluation(&self, evaluation: &Evaluation) -> Result<(), IrrlError> {
        let key = evaluation_key(
            &evaluation.from_entity,
            &evaluation.to_entity,
            &evaluation.realm_id,
            &evaluation.domain,
        );
        self.evaluations
            .insert(key.as_bytes(), encode(evaluation)?)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_evaluation(
        &self,
        from: &EntityId,
        to: &EntityId,
        realm_id: &RealmId,
        domain: &Domain,
    ) -> Result<Option<Evaluation>, IrrlError> {
        let key = evaluation_key(from, to, realm_id, domain);
        Self::get_json(&self.evaluations, key.as_bytes())
    }

    fn iter_evaluations(&self) -> Result<Vec<Evaluation>, IrrlError> {
        Self::collect_values(self.evaluations.iter())
    }

    fn iter_evaluations_for_subject(
        &self,
        to: &str,
        realm_id: &str,
        domain: &str,
    ) -> Result<Vec<Evaluation>, IrrlError> {
        let all: Vec<Evaluation> = Self::collect_values(self.evaluations.iter())?;
        Ok(all
            .into_iter()
            .filter(|e| e.to_entity == to && e.realm_id == realm_id && e.domain == domain)
            .collect())
    }

    fn iter_evaluations_in_domain(&self, domain: &str) -> Result<Vec<Evaluation>, IrrlError> {
        let all: Vec<Evaluation> = Self::collect_values(self.evaluations.iter())?;
        Ok(all.into_iter().filter(|e| e.domain == domain).collect())
    }

    // ── Reputation cache ─────────────────────────────────────────────────────

    fn put_reputation(&self, cache: &ReputationCache) -> Result<(), IrrlError> {
        let key = reputation_key(&cache.subject, &cache.realm_id, &cache.domain);
        self.reputation
            .insert(key.as_bytes(), encode(cache)?)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_reputation(
        &self,
        subject: &str,
        realm_id: &str,
        domain: &str,
    ) -> Result<Option<ReputationCache>, IrrlError> {
        let key = reputation_key(subject, realm_id, domain);
        Self::get_json(&self.reputation, key.as_bytes())
    }

    fn invalidate_reputation(&self, subject: &str, realm_id: &str) -> Result<(), IrrlError> {
        let prefix = format!("{subject}{SEP}{realm_id}{SEP}");
        let keys: Vec<sled::IVec> = self
            .reputation
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()
            .map_err(storage_err)?;
        for key in keys {
            self.reputation.remove(key).map_err(storage_err)?;
        }
        Ok(())
    }

    fn delete_reputation_for_realm(&self, realm_id: &str) -> Result<(), IrrlError> {
        let rows: Vec<ReputationCache> = Self::collect_values(self.reputation.iter())?;
        for row in rows.into_iter().filter(|r| r.realm_id == realm_id) {
            let key = reputation_key(&row.subject, &row.realm_id, &row.domain);
            self.reputation.remove(key.as_bytes()).map_err(storage_err)?;
        }
        Ok(())
    }

    // ── Proofs ───────────────────────────────────────────────────────────────

    fn put_proof(&self, proof: &StoredProof) -> Result<(), IrrlError> {
        self.proofs
            .insert(proof.id.as_bytes(), encode(proof)?)
            .map_err(storage_err)?;
        Ok(())
    }

    fn get_proof(&self, id: &ContentId) -> Result<Option<StoredProof>, IrrlError> {
        Self::get_json(&self.proofs, id.as_bytes())
    }

    fn iter_proofs(&self) -> Result<Vec<StoredProof>, IrrlError> {
        Self::collect_values(self.proofs.iter())
    }

    fn delete_proofs_for_realm(&self, realm_id: &str) -> Result<(), IrrlError> {
        let rows: Vec<StoredProof> = Self::collect_values(self.proofs.iter())?;
        for row in rows {
            if row.envelope.data.realm_id == realm_id {
                self.proofs.remove(row.id.as_bytes()).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    // ── Audit chain ──────────────────────────────────────────────────────────

    fn append_audit(&self, event: &AuditEvent) -> Result<u64, IrrlError> {
        // The audit log serializes appends behind its mutex, so the
        // read-increment-write on the counter is race-free.
        let seq = match self.meta.get(b"audit_seq").map_err(storage_err)? {
            Some(b) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            }
            None => 0,
        };
        self.audit
            .insert(seq.to_be_bytes(), encode(event)?)
            .map_err(storage_err)?;
        self.meta
            .insert(b"audit_seq", &(seq + 1).to_be_bytes())
            .map_err(storage_err)?;
        Ok(seq)
    }

    fn iter_audit(&self) -> Result<Vec<AuditEvent>, IrrlError> {
        Self::collect_values(self.audit.iter())
    }

    fn last_audit_event(&self) -> Result<Option<AuditEvent>, IrrlError> {
        match self.audit.last().map_err(storage_err)? {
            Some((_, bytes)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<(), IrrlError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
