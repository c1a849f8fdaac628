use chrono::{DateTime, Utc};

/// UTC timestamp. Serialized as RFC 3339 everywhere (wire, canonical form,
/// storage), so hashes computed on two instances agree byte-for-byte.
pub type Timestamp = DateTime<Utc>;

/// Opaque entity identifier (a person, organisation, service, key holder).
pub type EntityId = String;

/// Opaque realm identifier.
pub type RealmId = String;

/// Resolver identifier, optionally versioned as `id@version` at lookup time.
pub type ResolverId = String;

/// Domain of competence an evaluation or reputation is scoped to.
pub type Domain = String;

/// Content-derived identifier: `"cid_" + hex(sha256(canonical_bytes))`.
pub type ContentId = String;

/// Prefix of every [`ContentId`].
pub const CONTENT_ID_PREFIX: &str = "cid_";
