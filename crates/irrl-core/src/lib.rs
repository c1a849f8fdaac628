pub mod attestation;
pub mod audit;
pub mod constants;
pub mod error;
pub mod evaluation;
pub mod proof;
pub mod realm;
pub mod reputation;
pub mod types;

pub use attestation::{Attestation, AttestationFilter, AttestationStatus, RunStatus, VerificationRun};
pub use audit::{AuditEvent, ChainReport};
pub use constants::*;
pub use error::IrrlError;
pub use evaluation::{Evaluation, EvaluationFilter};
pub use proof::{ProofEnvelope, ProofVerification, ReputationProof, StoredProof};
pub use realm::{Realm, RealmRules, RealmRulesInput};
pub use reputation::{ReputationBreakdown, ReputationCache, SybilFactors, SybilResistance};
pub use types::*;
