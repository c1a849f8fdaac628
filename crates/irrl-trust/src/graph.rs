//! Trust graph: direct and transitive trust over the evaluation edge set.
//!
//! The graph is an arena of edges with an adjacency index keyed by
//! `(fromEntity, domain)`. Transitive trust runs a bounded breadth-first
//! exploration with per-hop exponential decay; frontier entries own their
//! path vectors, which keeps cycle detection a local scan.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use irrl_core::{
    Domain, EntityId, Evaluation, RealmId, DEFAULT_DECAY_FACTOR, DEFAULT_MAX_DEPTH,
    DEFAULT_MIN_CONFIDENCE, MAX_PATHS_EXPLORED, RETURNED_PATH_LIMIT, SECONDARY_PATH_LIMIT,
};

/// A transitive-trust question: how much should `from` trust `to` in
/// `domain`? Omitted tuning fields fall back to the realm's rules (when
/// `realmId` is given) and then to the instance defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustQuery {
    pub from: EntityId,
    pub to: EntityId,
    pub domain: Domain,
    pub realm_id: Option<RealmId>,
    pub max_depth: Option<usize>,
    pub decay_factor: Option<f64>,
    pub min_confidence: Option<f64>,
}

/// One complete path from source to target.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustPath {
    pub path: Vec<EntityId>,
    /// Raw edge strengths along the path, before decay.
    pub scores: Vec<f64>,
    pub final_trust: f64,
    pub decay_applied: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustMetadata {
    pub paths_explored: usize,
    pub paths_found: usize,
    pub max_depth: usize,
    pub decay_factor: f64,
    /// Whether the hard exploration cap cut the search short.
    pub truncated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustResult {
    /// Aggregate score in `[0, 1]`.
    pub score: f64,
    /// `min(1, pathCount / 3)`; 1 for a direct edge.
    pub confidence: f64,
    pub paths: Vec<TrustPath>,
    pub best_path: Option<TrustPath>,
    pub metadata: TrustMetadata,
}

struct Edge {
    to: EntityId,
    strength: f64,
    weight: f64,
}

/// In-memory edge set for one query, released when the query returns.
pub struct TrustGraph {
    index: HashMap<(EntityId, Domain), Vec<Edge>>,
}

impl TrustGraph {
    /// Build from an evaluation set, dropping expired edges.
    pub fn from_evaluations(evaluations: impl IntoIterator<Item = Evaluation>) -> Self {
        let now = Utc::now();
        let mut index: HashMap<(EntityId, Domain), Vec<Edge>> = HashMap::new();
        for eval in evaluations {
            if eval.expires_at.is_some_and(|exp| exp < now) {
                continue;
            }
            index
                .entry((eval.from_entity.clone(), eval.domain.clone()))
                .or_default()
                .push(Edge {
                    strength: eval.strength(),
                    to: eval.to_entity,
                    weight: eval.weight,
                });
        }
        Self { index }
    }

    fn edges(&self, from: &str, domain: &str) -> &[Edge] {
        self.index
            .get(&(from.to_string(), domain.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Weight-weighted mean strength of the direct edges, `None` when no
    /// edge matches.
    pub fn direct_trust(&self, from: &str, to: &str, domain: &str) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for edge in self.edges(from, domain).iter().filter(|e| e.to == to) {
            weighted += edge.strength * edge.weight;
            total_weight += edge.weight;
        }
        (total_weight > 0.0).then(|| weighted / total_weight)
    }

    /// Multi-path transitive trust with decay.
    pub fn transitive(
        &self,
        from: &str,
        to: &str,
        domain: &str,
        max_depth: usize,
        decay_factor: f64,
        min_confidence: f64,
    ) -> TrustResult {
        // A direct edge answers with full confidence and no decay.
        if let Some(direct) = self.direct_trust(from, to, domain) {
            let path = TrustPath {
                path: vec![from.to_string(), to.to_string()],
                scores: vec![direct],
                final_trust: direct,
                decay_applied: 0.0,
            };
            return TrustResult {
                score: direct,
                confidence: 1.0,
                paths: vec![path.clone()],
                best_path: Some(path),
                metadata: TrustMetadata {
                    paths_explored: 1,
                    paths_found: 1,
                    max_depth,
                    decay_factor,
                    truncated: false,
                },
            };
        }

        struct Frontier {
            node: EntityId,
            path: Vec<EntityId>,
            scores: Vec<f64>,
            trust: f64,
            depth: usize,
        }

        let mut queue: VecDeque<Frontier> = VecDeque::new();
        let mut visited: HashSet<(EntityId, usize)> = HashSet::new();
        let mut completed: Vec<TrustPath> = Vec::new();
        let mut paths_explored = 0usize;
        let mut truncated = false;

        // Seed the frontier with the source's outgoing edges. No direct
        // edge to the target exists at this point, so no seed completes.
        for edge in self.edges(from, domain) {
            if paths_explored >= MAX_PATHS_EXPLORED {
                truncated = true;
                break;
            }
            paths_explored += 1;
            if !visited.insert((edge.to.clone(), 1)) {
                continue;
            }
            queue.push_back(Frontier {
                node: edge.to.clone(),
                path: vec![from.to_string(), edge.to.clone()],
                scores: vec![edge.strength],
                trust: edge.strength,
                depth: 1,
            });
        }

        'search: while let Some(entry) = queue.pop_front() {
            if entry.depth >= max_depth {
                continue;
            }
            for edge in self.edges(&entry.node, domain) {
                if paths_explored >= MAX_PATHS_EXPLORED {
                    truncated = true;
                    break 'search;
                }
                paths_explored += 1;

                // Never re-enter a node already on this path.
                if entry.path.iter().any(|n| n == &edge.to) {
                    continue;
                }

                let trust = entry.trust * edge.strength * decay_factor;
                let depth = entry.depth + 1;
                if trust * decay_factor.powi(depth as i32) < min_confidence {
                    continue;
                }

                let mut path = entry.path.clone();
                path.push(edge.to.clone());
                let mut scores = entry.scores.clone();
                scores.push(edge.strength);

                if edge.to == to {
                    // The decay exponent is depth - 1: the source edge is
                    // undecayed, every hop after it compounds.
                    let residual = decay_factor.powi(depth as i32 - 1);
                    completed.push(TrustPath {
                        path,
                        scores,
                        final_trust: trust * residual,
                        decay_applied: 1.0 - residual,
                    });
                    continue;
                }

                if !visited.insert((edge.to.clone(), depth)) {
                    continue;
                }
                queue.push_back(Frontier { node: edge.to.clone(), path, scores, trust, depth });
            }
        }

        if completed.is_empty() {
            return TrustResult {
                score: 0.0,
                confidence: 0.0,
                paths: Vec::new(),
                best_path: None,
                metadata: TrustMetadata {
                    paths_explored,
                    paths_found: 0,
                    max_depth,
                    decay_factor,
                    truncated,
                },
            };
        }

        completed.sort_by(|a, b| {
            b.final_trust
                .partial_cmp(&a.final_trust)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.path.len().cmp(&b.path.len()))
        });

        // Best path plus geometrically dampened corroboration from the
        // runners-up, so many weak paths cannot outvote one strong one.
        let mut score = completed[0].final_trust;
        for (i, path) in completed.iter().enumerate().skip(1).take(SECONDARY_PATH_LIMIT) {
            score += path.final_trust * 0.5f64.powi(i as i32);
        }
        let score = score.clamp(0.0, 1.0);
        let confidence = (completed.len() as f64 / 3.0).min(1.0);
        let paths_found = completed.len();

        completed.truncate(RETURNED_PATH_LIMIT);
        TrustResult {
            score,
            confidence,
            best_path: Some(completed[0].clone()),
            paths: completed,
            metadata: TrustMetadata {
                paths_explored,
                paths_found,
                max_depth,
                decay_factor,
                truncated,
            },
        }
    }
}

/// Resolve a query's effective tuning: explicit value, else the realm's
/// rules, else the instance defaults.
pub fn effective_params(
    query: &TrustQuery,
    realm_rules: Option<&irrl_core::RealmRules>,
) -> (usize, f64, f64) {
    let max_depth = query
        .max_depth
        .or(realm_rules.map(|r| r.max_transitive_depth as usize))
        .unwrap_or(DEFAULT_MAX_DEPTH);
    let decay_factor = query
        .decay_factor
        .or(realm_rules.map(|r| r.transitive_decay_factor))
        .unwrap_or(DEFAULT_DECAY_FACTOR);
    let min_confidence = query.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    (max_depth, decay_factor, min_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn edge(from: &str, to: &str, score: u8, weight: f64) -> Evaluation {
        Evaluation {
            id: format!("cid_{from}_{to}"),
            from_entity: from.into(),
            to_entity: to.into(),
            realm_id: "realm-1".into(),
            domain: "d".into(),
            score,
            weight,
            rationale: None,
            supporting_attestations: vec![],
            signature: "sig".into(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    fn graph(edges: Vec<Evaluation>) -> TrustGraph {
        TrustGraph::from_evaluations(edges)
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} !~ {b}");
    }

    #[test]
    fn direct_edge_short_circuits_with_full_confidence() {
        let g = graph(vec![edge("A", "B", 80, 1.0)]);
        let result = g.transitive("A", "B", "d", 5, 0.8, 0.1);

        approx(result.score, 0.8);
        approx(result.confidence, 1.0);
        assert_eq!(result.paths.len(), 1);
        let p = &result.paths[0];
        assert_eq!(p.path, vec!["A", "B"]);
        assert_eq!(p.scores, vec![0.8]);
        approx(p.final_trust, 0.8);
        approx(p.decay_applied, 0.0);
        assert_eq!(result.metadata.paths_explored, 1);
    }

    #[test]
    fn direct_trust_takes_the_weight_weighted_mean() {
        // Two edges A→B in different realms, same domain.
        let mut second = edge("A", "B", 40, 3.0);
        second.realm_id = "realm-2".into();
        let g = graph(vec![edge("A", "B", 80, 1.0), second]);
        // (0.8·1 + 0.4·3) / 4 = 0.5
        approx(g.direct_trust("A", "B", "d").unwrap(), 0.5);
        assert!(g.direct_trust("A", "X", "d").is_none());
        assert!(g.direct_trust("A", "B", "other-domain").is_none());
    }

    #[test]
    fn two_hop_path_decays_twice() {
        let g = graph(vec![edge("A", "B", 100, 1.0), edge("B", "C", 100, 1.0)]);
        let result = g.transitive("A", "C", "d", 5, 0.8, 0.1);

        assert_eq!(result.paths.len(), 1);
        let p = &result.paths[0];
        assert_eq!(p.path, vec!["A", "B", "C"]);
        // trust = 1·1·0.8, times the 0.8^(depth-1) residual.
        approx(p.final_trust, 0.64);
        approx(p.decay_applied, 0.2);
        approx(result.score, 0.64);
        approx(result.confidence, 1.0 / 3.0);
    }

    #[test]
    fn cycles_are_never_re_entered() {
        let g = graph(vec![edge("A", "B", 50, 1.0), edge("B", "A", 50, 1.0)]);
        let result = g.transitive("A", "A", "d", 5, 0.8, 0.1);

        approx(result.score, 0.0);
        approx(result.confidence, 0.0);
        assert!(result.paths.is_empty());
        assert!(result.best_path.is_none());
    }

    #[test]
    fn secondary_paths_are_geometrically_dampened() {
        // Two disjoint 2-hop routes A→C: via B (strong) and via D (weaker).
        let g = graph(vec![
            edge("A", "B", 100, 1.0),
            edge("B", "C", 100, 1.0),
            edge("A", "D", 50, 1.0),
            edge("D", "C", 50, 1.0),
        ]);
        let result = g.transitive("A", "C", "d", 5, 0.8, 0.01);

        assert_eq!(result.paths.len(), 2);
        approx(result.paths[0].final_trust, 0.64);
        approx(result.paths[1].final_trust, 0.25 * 0.8 * 0.8);
        approx(result.score, 0.64 + 0.16 * 0.5);
        approx(result.confidence, 2.0 / 3.0);
        assert_eq!(result.best_path.as_ref().unwrap().path, vec!["A", "B", "C"]);
    }

    #[test]
    fn max_depth_bounds_the_search() {
        let g = graph(vec![
            edge("A", "B", 100, 1.0),
            edge("B", "C", 100, 1.0),
            edge("C", "D", 100, 1.0),
        ]);
        let reachable = g.transitive("A", "D", "d", 5, 0.9, 0.01);
        assert_eq!(reachable.paths.len(), 1);

        let bounded = g.transitive("A", "D", "d", 2, 0.9, 0.01);
        assert!(bounded.paths.is_empty());
        approx(bounded.score, 0.0);
    }

    #[test]
    fn low_trust_branches_are_pruned() {
        // 0.1·0.1 path trust decays far below the confidence floor.
        let g = graph(vec![edge("A", "B", 10, 1.0), edge("B", "C", 10, 1.0)]);
        let result = g.transitive("A", "C", "d", 5, 0.8, 0.1);
        assert!(result.paths.is_empty());
    }

    #[test]
    fn exploration_respects_the_hard_cap() {
        // A dense 3-layer lattice: 60·60 + 60 edge traversals per layer pair
        // quickly exceeds nothing — the cap only bites on larger graphs, so
        // assert the invariant rather than truncation.
        let mut edges = Vec::new();
        for i in 0..60 {
            edges.push(edge("A", &format!("m{i}"), 100, 1.0));
            for j in 0..60 {
                edges.push(edge(&format!("m{i}"), &format!("n{j}"), 100, 1.0));
            }
            edges.push(edge(&format!("n{i}"), "Z", 100, 1.0));
        }
        let g = graph(edges);
        let result = g.transitive("A", "Z", "d", 5, 0.8, 0.0);
        assert!(result.metadata.paths_explored <= MAX_PATHS_EXPLORED);
        assert!(result.paths.len() <= RETURNED_PATH_LIMIT);
    }

    #[test]
    fn repeated_queries_are_idempotent() {
        let g = graph(vec![
            edge("A", "B", 90, 1.0),
            edge("B", "C", 70, 0.5),
            edge("A", "D", 60, 1.0),
            edge("D", "C", 80, 1.0),
        ]);
        let first = g.transitive("A", "C", "d", 5, 0.8, 0.01);
        let second = g.transitive("A", "C", "d", 5, 0.8, 0.01);
        approx(first.score, second.score);
        assert_eq!(first.paths.len(), second.paths.len());
    }

    #[test]
    fn expired_evaluations_are_not_loaded() {
        let mut stale = edge("A", "B", 100, 1.0);
        stale.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let g = graph(vec![stale]);
        assert!(g.direct_trust("A", "B", "d").is_none());
    }
}
