//! ─── IRRL Protocol Constants ────────────────────────────────────────────────
//!
//! Fixed parameters of the trust graph search, the reputation aggregator,
//! and the default realm rules. Values that a realm may override live in
//! `RealmRules`; everything here is instance-wide.

// ── Trust graph ──────────────────────────────────────────────────────────────

/// Default maximum path length for transitive trust queries.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default per-hop decay factor applied after the first hop.
pub const DEFAULT_DECAY_FACTOR: f64 = 0.8;

/// Default confidence floor below which a partial path is abandoned.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.1;

/// Hard cap on frontier expansions per query. The search stops dead here
/// regardless of how many paths have been completed.
pub const MAX_PATHS_EXPLORED: usize = 5000;

/// Number of secondary paths that contribute to the aggregate score
/// (geometrically dampened by 0.5^i).
pub const SECONDARY_PATH_LIMIT: usize = 4;

/// Maximum number of paths returned to the caller.
pub const RETURNED_PATH_LIMIT: usize = 10;

// ── Reputation ───────────────────────────────────────────────────────────────

/// Reputation cache time-to-live (seconds).
pub const REPUTATION_CACHE_TTL_SECS: i64 = 300;

/// Neutral score used when no evaluation carries any weight.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Evaluation count at which confidence saturates.
pub const CONFIDENCE_SATURATION_COUNT: usize = 10;

// ── Sybil resistance ─────────────────────────────────────────────────────────

/// Unique evaluator count at which the diversity factor saturates.
pub const SYBIL_DIVERSITY_SATURATION: usize = 10;

/// Average verification count at which the depth factor saturates.
pub const SYBIL_DEPTH_SATURATION: f64 = 3.0;

/// Evaluation time span (days) at which the temporal factor saturates.
pub const SYBIL_SPREAD_SATURATION_DAYS: f64 = 90.0;

// ── Resolvers ────────────────────────────────────────────────────────────────

/// Floor for the per-resolver verification timeout (milliseconds).
pub const RESOLVER_TIMEOUT_FLOOR_MS: u64 = 5_000;

/// Timeout multiplier over a resolver's declared average verification time.
pub const RESOLVER_TIMEOUT_FACTOR: u64 = 10;

// ── Default realm rules ──────────────────────────────────────────────────────

/// Verified attestations required before a realm treats a subject as attested.
pub const DEFAULT_MIN_VERIFICATIONS: u32 = 1;

/// Default evaluation half-life, as a duration string.
pub const DEFAULT_DECAY_HALF_LIFE: &str = "180d";

/// Default lower clamp for reputation scores.
pub const DEFAULT_MIN_SCORE: f64 = 0.0;

/// Default upper clamp for reputation scores.
pub const DEFAULT_MAX_SCORE: f64 = 100.0;

// ── Proofs ───────────────────────────────────────────────────────────────────

/// Proof format version. Also the `version` field of the wire envelope.
pub const PROOF_VERSION: &str = "IRRL-Proof-v1";

/// Default proof validity period (days) when the caller does not specify one.
pub const DEFAULT_PROOF_VALIDITY_DAYS: i64 = 7;

// ── Audit log ────────────────────────────────────────────────────────────────

/// `previousHash` of the first event in a chain.
pub const AUDIT_GENESIS_HASH: &str = "genesis";

/// Sentinel used for both hashes when audit persistence is disabled.
pub const AUDIT_DISABLED_HASH: &str = "disabled";
