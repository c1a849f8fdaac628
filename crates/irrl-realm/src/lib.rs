//! Realm hierarchy.
//!
//! Realms are trust contexts arranged in a tree. The materialized `path`
//! (ancestor ids joined by `/`) makes subtree queries a prefix match and
//! keeps cycle detection a string scan over the parent's path.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use irrl_core::{Domain, EntityId, IrrlError, Realm, RealmId, RealmRulesInput};
use irrl_crypto::generate_key_pair_pem;
use irrl_audit::AuditLog;
use irrl_store::Repository;

/// Caller input for realm creation. `id` becomes a path segment, so it must
/// be non-empty and free of `/`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRealm {
    pub id: RealmId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent: Option<RealmId>,
    pub domain: Domain,
    #[serde(default)]
    pub rules: RealmRulesInput,
}

/// Mutable realm fields. `id`, `parent`, `path` and `depth` cannot change.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRealm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rules: Option<RealmRulesInput>,
}

/// Filter for realm listings.
#[derive(Clone, Debug, Default)]
pub struct RealmFilter {
    pub domain: Option<Domain>,
    pub parent: Option<RealmId>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub struct RealmStore {
    repo: Arc<dyn Repository>,
    audit: Arc<AuditLog>,
}

impl RealmStore {
    pub fn new(repo: Arc<dyn Repository>, audit: Arc<AuditLog>) -> Self {
        Self { repo, audit }
    }

    /// Create a realm, deriving `path` and `depth` from the parent and
    /// generating the realm's keypair. The secret half is not retained:
    /// record signing uses the instance key.
    pub async fn create(&self, input: CreateRealm, created_by: &EntityId) -> Result<Realm, IrrlError> {
        if input.id.is_empty() {
            return Err(IrrlError::Validation("realm id must not be empty".into()));
        }
        if input.id.contains('/') {
            return Err(IrrlError::Validation("realm id must not contain '/'".into()));
        }
        if input.name.is_empty() {
            return Err(IrrlError::Validation("realm name must not be empty".into()));
        }
        if input.domain.is_empty() {
            return Err(IrrlError::Validation("realm domain must not be empty".into()));
        }
        if self.repo.get_realm(&input.id)?.is_some() {
            return Err(IrrlError::AlreadyExists(input.id));
        }

        let (path, depth) = match &input.parent {
            None => (input.id.clone(), 0),
            Some(parent_id) => {
                let parent = self
                    .repo
                    .get_realm(parent_id)?
                    .ok_or_else(|| IrrlError::InvalidParent(parent_id.clone()))?;
                // The id becoming a path segment of its own ancestry would
                // close a cycle.
                if parent.path.split('/').any(|segment| segment == input.id) {
                    return Err(IrrlError::InvalidParent(format!(
                        "{} is an ancestor of {}",
                        input.id, parent_id
                    )));
                }
                (format!("{}/{}", parent.path, input.id), parent.depth + 1)
            }
        };
        if self.repo.get_realm_by_path(&path)?.is_some() {
            return Err(IrrlError::AlreadyExists(path));
        }

        let (public_key, _secret) = generate_key_pair_pem()?;
        let now = Utc::now();
        let realm = Realm {
            id: input.id,
            name: input.name,
            description: input.description,
            parent: input.parent,
            path,
            depth,
            domain: input.domain,
            rules: input.rules.merged(),
            public_key,
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
        };

        self.repo.put_realm(&realm)?;
        self.audit
            .append(
                "realm.created",
                created_by,
                &[realm.id.clone()],
                json!({"path": &realm.path, "domain": &realm.domain}),
            )
            .await?;
        info!(realm = %realm.id, path = %realm.path, "realm created");
        Ok(realm)
    }

    /// Look up by id first, then by path.
    pub fn get(&self, id_or_path: &str) -> Result<Realm, IrrlError> {
        if let Some(realm) = self.repo.get_realm(id_or_path)? {
            return Ok(realm);
        }
        self.repo
            .get_realm_by_path(id_or_path)?
            .ok_or_else(|| IrrlError::not_found("realm", id_or_path))
    }

    pub fn list(&self, filter: &RealmFilter) -> Result<Vec<Realm>, IrrlError> {
        let mut realms: Vec<Realm> = self
            .repo
            .iter_realms()?
            .into_iter()
            .filter(|r| filter.domain.as_ref().is_none_or(|d| &r.domain == d))
            .filter(|r| filter.parent.as_ref().is_none_or(|p| r.parent.as_ref() == Some(p)))
            .collect();
        realms.sort_by(|a, b| a.path.cmp(&b.path));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(100).min(500);
        Ok(realms.into_iter().skip(offset).take(limit).collect())
    }

    /// Direct children, or the whole subtree when `recursive`.
    pub fn children(&self, id: &str, recursive: bool) -> Result<Vec<Realm>, IrrlError> {
        let realm = self.get(id)?;
        let prefix = format!("{}/", realm.path);
        let mut children: Vec<Realm> = self
            .repo
            .iter_realms()?
            .into_iter()
            .filter(|r| {
                if recursive {
                    r.path.starts_with(&prefix)
                } else {
                    r.parent.as_deref() == Some(realm.id.as_str())
                }
            })
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    /// Update the mutable fields only.
    pub async fn update(&self, id: &str, input: UpdateRealm) -> Result<Realm, IrrlError> {
        let mut realm = self.get(id)?;
        if let Some(name) = input.name {
            if name.is_empty() {
                return Err(IrrlError::Validation("realm name must not be empty".into()));
            }
            realm.name = name;
        }
        if let Some(description) = input.description {
            realm.description = description;
        }
        if let Some(rules) = input.rules {
            realm.rules = rules.merged();
        }
        realm.updated_at = Utc::now();
        self.repo.put_realm(&realm)?;
        self.audit
            .append("realm.updated", &realm.created_by, &[realm.id.clone()], json!({}))
            .await?;
        Ok(realm)
    }

    /// Delete a realm, cascading its reputation-cache and proof rows.
    /// Refused while attestations or child realms still reference it.
    pub async fn delete(&self, id: &str, actor: &EntityId) -> Result<(), IrrlError> {
        let realm = self.get(id)?;
        let attestations = self.repo.count_attestations_for_realm(&realm.id)?;
        if attestations > 0 {
            return Err(IrrlError::Validation(format!(
                "realm {} still has {attestations} attestation(s)",
                realm.id
            )));
        }
        if !self.children(&realm.id, false)?.is_empty() {
            return Err(IrrlError::Validation(format!(
                "realm {} still has child realms",
                realm.id
            )));
        }

        self.repo.delete_reputation_for_realm(&realm.id)?;
        self.repo.delete_proofs_for_realm(&realm.id)?;
        self.repo.delete_realm(&realm.id)?;
        self.audit
            .append("realm.deleted", actor, &[realm.id.clone()], json!({"path": &realm.path}))
            .await?;
        info!(realm = %realm.id, "realm deleted");
        Ok(())
    }
}
