use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrrlError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown realm: {0}")]
    InvalidRealm(String),

    #[error("invalid resolver: {0}")]
    InvalidResolver(String),

    #[error("evidence rejected by schema for resolver {resolver}")]
    InvalidEvidence {
        resolver: String,
        errors: Vec<String>,
    },

    #[error("invalid parent realm: {0}")]
    InvalidParent(String),

    // ── Lookup / state ───────────────────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("attestation already revoked: {0}")]
    AlreadyRevoked(String),

    #[error("resolver not registered: {0}")]
    ResolverNotFound(String),

    #[error("resolver {resolver} exceeded its {timeout_ms} ms verification budget")]
    ResolverTimeout { resolver: String, timeout_ms: u64 },

    #[error("audit chain integrity violation: {0}")]
    ChainIntegrity(String),

    // ── Crypto ───────────────────────────────────────────────────────────────
    #[error("signing failed: {0}")]
    Signing(String),

    #[error("key decode failed: {0}")]
    KeyDecode(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

impl IrrlError {
    /// Wire error code. Internal conditions collapse to `INTERNAL_ERROR`
    /// so adapter code never leaks storage details.
    pub fn code(&self) -> &'static str {
        match self {
            IrrlError::Validation(_)         => "VALIDATION_ERROR",
            IrrlError::InvalidRealm(_)       => "INVALID_REALM",
            IrrlError::InvalidResolver(_)    => "INVALID_RESOLVER",
            IrrlError::InvalidEvidence { .. } => "INVALID_EVIDENCE",
            IrrlError::InvalidParent(_)      => "INVALID_PARENT",
            IrrlError::NotFound { .. }       => "NOT_FOUND",
            IrrlError::AlreadyExists(_)      => "ALREADY_EXISTS",
            IrrlError::AlreadyRevoked(_)     => "ALREADY_REVOKED",
            IrrlError::ResolverNotFound(_)   => "RESOLVER_NOT_FOUND",
            IrrlError::ResolverTimeout { .. } => "RESOLVER_TIMEOUT",
            IrrlError::ChainIntegrity(_)     => "CHAIN_INTEGRITY",
            IrrlError::Signing(_)
            | IrrlError::KeyDecode(_)
            | IrrlError::Serialization(_)
            | IrrlError::Storage(_)
            | IrrlError::Internal(_)         => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for the pervasive not-found constructor.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        IrrlError::NotFound { kind, id: id.into() }
    }
}
