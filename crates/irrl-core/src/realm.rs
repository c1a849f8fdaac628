use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    DEFAULT_DECAY_FACTOR, DEFAULT_DECAY_HALF_LIFE, DEFAULT_MAX_DEPTH, DEFAULT_MIN_SCORE,
    DEFAULT_MIN_VERIFICATIONS,
};
use crate::types::{Domain, EntityId, RealmId, ResolverId, Timestamp};

/// A named trust context. Realms form a tree; `path` is the `/`-joined chain
/// of ancestor ids ending in this realm's own id, and `depth` is the number
/// of `/` characters in `path` (0 for a root).
///
/// `id`, `parent`, `path` and `depth` are immutable after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub id: RealmId,
    pub name: String,
    pub description: String,
    pub parent: Option<RealmId>,
    pub path: String,
    pub depth: u32,
    pub domain: Domain,
    pub rules: RealmRules,
    /// SPKI PEM of the realm's public key, generated at creation.
    pub public_key: String,
    pub created_by: EntityId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Effective rule set of a realm. Every field is concrete; callers submit a
/// [`RealmRulesInput`] and omitted fields take the instance defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RealmRules {
    pub min_verifications: u32,
    pub required_resolvers: Vec<ResolverId>,
    pub optional_resolvers: Vec<ResolverId>,
    /// Evaluation half-life as a duration string, e.g. `"180d"`.
    pub decay_half_life: String,
    pub min_score: f64,
    pub max_transitive_depth: u32,
    pub transitive_decay_factor: f64,
    pub custom_rules: Option<Value>,
}

impl Default for RealmRules {
    fn default() -> Self {
        Self {
            min_verifications: DEFAULT_MIN_VERIFICATIONS,
            required_resolvers: Vec::new(),
            optional_resolvers: Vec::new(),
            decay_half_life: DEFAULT_DECAY_HALF_LIFE.to_string(),
            min_score: DEFAULT_MIN_SCORE,
            max_transitive_depth: DEFAULT_MAX_DEPTH as u32,
            transitive_decay_factor: DEFAULT_DECAY_FACTOR,
            custom_rules: None,
        }
    }
}

impl RealmRules {
    /// Parse `decay_half_life` ("Nd") into days. `None` when malformed.
    pub fn half_life_days(&self) -> Option<f64> {
        parse_duration_days(&self.decay_half_life)
    }
}

/// Caller-supplied partial rules; any omitted field inherits the default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRulesInput {
    pub min_verifications: Option<u32>,
    pub required_resolvers: Option<Vec<ResolverId>>,
    pub optional_resolvers: Option<Vec<ResolverId>>,
    pub decay_half_life: Option<String>,
    pub min_score: Option<f64>,
    pub max_transitive_depth: Option<u32>,
    pub transitive_decay_factor: Option<f64>,
    pub custom_rules: Option<Value>,
}

impl RealmRulesInput {
    /// Merge over the defaults into a concrete rule set.
    pub fn merged(self) -> RealmRules {
        let d = RealmRules::default();
        RealmRules {
            min_verifications: self.min_verifications.unwrap_or(d.min_verifications),
            required_resolvers: self.required_resolvers.unwrap_or(d.required_resolvers),
            optional_resolvers: self.optional_resolvers.unwrap_or(d.optional_resolvers),
            decay_half_life: self.decay_half_life.unwrap_or(d.decay_half_life),
            min_score: self.min_score.unwrap_or(d.min_score),
            max_transitive_depth: self.max_transitive_depth.unwrap_or(d.max_transitive_depth),
            transitive_decay_factor: self
                .transitive_decay_factor
                .unwrap_or(d.transitive_decay_factor),
            custom_rules: self.custom_rules.or(d.custom_rules),
        }
    }
}

/// Parse a `"Nd"` duration string into days.
pub fn parse_duration_days(s: &str) -> Option<f64> {
    let n = s.strip_suffix('d')?;
    let days: f64 = n.parse().ok()?;
    (days.is_finite() && days > 0.0).then_some(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_omitted_fields() {
        let rules = RealmRulesInput {
            min_verifications: Some(3),
            ..Default::default()
        }
        .merged();
        assert_eq!(rules.min_verifications, 3);
        assert_eq!(rules.decay_half_life, "180d");
        assert_eq!(rules.max_transitive_depth, 5);
        assert_eq!(rules.transitive_decay_factor, 0.8);
    }

    #[test]
    fn half_life_parses_day_suffix() {
        assert_eq!(parse_duration_days("180d"), Some(180.0));
        assert_eq!(parse_duration_days("7d"), Some(7.0));
        assert_eq!(parse_duration_days("180"), None);
        assert_eq!(parse_duration_days("-3d"), None);
        assert_eq!(parse_duration_days("xd"), None);
    }
}
