use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use irrl_core::IrrlError;
use irrl_store::Repository;

use crate::builtin::{DocumentHashResolver, GithubRepoResolver, ReferenceResolver};
use crate::{Resolver, ResolverMetadata};

/// A listable registry entry: in-process resolvers are invocable, persisted
/// descriptors are metadata only.
#[derive(Clone)]
pub struct ResolverEntry {
    pub metadata: ResolverMetadata,
    pub invocable: bool,
    pub deprecated: bool,
}

#[derive(Default)]
struct Inner {
    /// Invocable resolvers, keyed by both `id` and `id@version`. The bare
    /// `id` key always points at the most recently registered version.
    resolvers: HashMap<String, Arc<dyn Resolver>>,
    /// Metadata-only descriptors for external resolvers.
    descriptors: HashMap<String, ResolverMetadata>,
    deprecated: std::collections::HashSet<String>,
}

/// Catalog of verification plugins, constructed once at boot and shared.
#[derive(Default)]
pub struct ResolverRegistry {
    inner: RwLock<Inner>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the built-in resolvers. `github_token` scopes the GitHub
    /// resolver; `repo` backs the attestation-reference resolver.
    pub fn register_builtins(&self, repo: Arc<dyn Repository>, github_token: Option<String>) {
        self.register(Arc::new(DocumentHashResolver::new()));
        self.register(Arc::new(ReferenceResolver::new(repo)));
        self.register(Arc::new(GithubRepoResolver::new(github_token)));
    }

    /// Register an invocable resolver under `id` and `id@version`.
    pub fn register(&self, resolver: Arc<dyn Resolver>) {
        let meta = resolver.metadata();
        let versioned = meta.versioned_id();
        let id = meta.id.clone();
        info!(resolver = %versioned, "resolver registered");

        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.resolvers.insert(versioned, Arc::clone(&resolver));
        inner.resolvers.insert(id, resolver);
    }

    /// Register a metadata-only descriptor for an external resolver.
    /// Rejected when the versioned id is already taken.
    pub fn register_descriptor(&self, metadata: ResolverMetadata) -> Result<(), IrrlError> {
        let versioned = metadata.versioned_id();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.resolvers.contains_key(&versioned) || inner.descriptors.contains_key(&versioned) {
            return Err(IrrlError::AlreadyExists(versioned));
        }
        inner.descriptors.insert(versioned, metadata);
        Ok(())
    }

    /// Look up an invocable resolver by `id` or `id@version`.
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Resolver>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .resolvers
            .get(id)
            .cloned()
    }

    /// Look up by id with an optional explicit version.
    pub fn lookup_versioned(&self, id: &str, version: Option<&str>) -> Option<Arc<dyn Resolver>> {
        match version {
            Some(v) => self.lookup(&format!("{id}@{v}")),
            None => self.lookup(id),
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.lookup(id).is_some()
    }

    /// Mark every version of `id` deprecated. Deprecated resolvers stay
    /// invocable for re-verification of old attestations.
    pub fn deprecate(&self, id: &str) -> Result<(), IrrlError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let known = inner.resolvers.contains_key(id)
            || inner.descriptors.keys().any(|k| k.starts_with(&format!("{id}@")));
        if !known {
            return Err(IrrlError::ResolverNotFound(id.to_string()));
        }
        inner.deprecated.insert(id.to_string());
        Ok(())
    }

    /// Every distinct resolver, one entry per `id@version`.
    pub fn list(&self) -> Vec<ResolverEntry> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut entries: Vec<ResolverEntry> = inner
            .resolvers
            .iter()
            .filter(|(key, _)| key.contains('@'))
            .map(|(_, r)| ResolverEntry {
                metadata: r.metadata().clone(),
                invocable: true,
                deprecated: inner.deprecated.contains(&r.metadata().id),
            })
            .chain(inner.descriptors.values().map(|m| ResolverEntry {
                metadata: m.clone(),
                invocable: false,
                deprecated: inner.deprecated.contains(&m.id),
            }))
            .collect();
        entries.sort_by(|a, b| a.metadata.versioned_id().cmp(&b.metadata.versioned_id()));
        entries
    }

    /// Metadata for `id` (bare or versioned), whether invocable or not.
    pub fn get_metadata(&self, id: &str, version: Option<&str>) -> Option<ResolverEntry> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let key = match version {
            Some(v) => format!("{id}@{v}"),
            None => id.to_string(),
        };
        let from_resolvers = inner.resolvers.get(&key).map(|r| r.metadata().clone());
        let meta = from_resolvers
            .or_else(|| inner.descriptors.get(&key).cloned())
            .or_else(|| {
                // Bare-id descriptor lookup: highest version wins.
                inner
                    .descriptors
                    .iter()
                    .filter(|(k, _)| k.starts_with(&format!("{key}@")))
                    .map(|(_, m)| m)
                    .max_by(|a, b| a.version.cmp(&b.version))
                    .cloned()
            })?;
        let invocable = inner.resolvers.contains_key(&meta.versioned_id());
        let deprecated = inner.deprecated.contains(&meta.id);
        Some(ResolverEntry { metadata: meta, invocable, deprecated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResolverOutcome;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeResolver {
        metadata: ResolverMetadata,
    }

    impl FakeResolver {
        fn with_version(version: &str) -> Self {
            Self {
                metadata: ResolverMetadata {
                    id: "fake".into(),
                    version: version.into(),
                    name: "Fake".into(),
                    description: String::new(),
                    author: "tests".into(),
                    evidence_schema: json!({"type": "object"}),
                    output_schema: json!({"type": "object"}),
                    domains: vec!["*".into()],
                    deterministic: true,
                    avg_verification_time_ms: 10,
                },
            }
        }
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        fn validate_evidence(&self, _evidence: &Value) -> crate::EvidenceReport {
            crate::EvidenceReport::ok()
        }

        async fn verify(&self, _evidence: &Value) -> ResolverOutcome {
            ResolverOutcome::verified(json!({"ok": true}))
        }
    }

    #[test]
    fn bare_id_resolves_to_most_recent_version() {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(FakeResolver::with_version("1.0.0")));
        registry.register(Arc::new(FakeResolver::with_version("2.0.0")));

        assert_eq!(registry.lookup("fake").unwrap().metadata().version, "2.0.0");
        assert_eq!(
            registry.lookup("fake@1.0.0").unwrap().metadata().version,
            "1.0.0"
        );
        assert_eq!(
            registry
                .lookup_versioned("fake", Some("2.0.0"))
                .unwrap()
                .metadata()
                .version,
            "2.0.0"
        );
        assert!(registry.lookup("fake@3.0.0").is_none());
    }

    #[test]
    fn descriptors_are_listed_but_not_invocable() {
        let registry = ResolverRegistry::new();
        let meta = FakeResolver::with_version("1.0.0").metadata.clone();
        registry.register_descriptor(meta.clone()).unwrap();

        assert!(registry.lookup("fake").is_none());
        let entry = registry.get_metadata("fake", None).unwrap();
        assert!(!entry.invocable);
        assert!(registry.register_descriptor(meta).is_err());
    }

    #[test]
    fn deprecation_flags_all_versions() {
        let registry = ResolverRegistry::new();
        registry.register(Arc::new(FakeResolver::with_version("1.0.0")));
        registry.deprecate("fake").unwrap();

        let entries = registry.list();
        assert!(entries.iter().all(|e| e.deprecated));
        assert!(registry.deprecate("missing").is_err());
    }
}
