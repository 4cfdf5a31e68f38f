use crate::cluster::cluster_count;
use crate::concerns::concern_counts;
use crate::verbs::verb_category_counts;
use advisor_protocol::ScoringWeights;
use serde::Serialize;

/// Cosine-distance threshold for two method signatures to count as the
/// same semantic neighborhood.
const CLUSTER_EPS: f32 = 0.5;
/// Components below this size are noise, not a responsibility.
const MIN_CLUSTER_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Everything the scorer needs about one unit. Embeddings come from the
/// external embedding collaborator, one per method signature.
pub struct ScoreInputs<'a> {
    pub method_names: &'a [String],
    pub method_embeddings: &'a [Vec<f32>],
    pub imports: &'a [String],
    /// Expected method count for this unit's directory convention.
    pub tolerance: u32,
    /// Whether the fact engine flagged this unit for a layer violation.
    pub layer_violation: bool,
}

/// Score with its sub-signal breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub semantic: f64,
    pub dependency: f64,
    pub naming: f64,
    pub method_count: f64,
    pub boost: f64,
    pub clusters: usize,
    pub concerns: usize,
    pub verb_categories: usize,
    pub severity: Severity,
}

impl ScoreBreakdown {
    #[must_use]
    pub fn is_violation(&self, threshold: f64) -> bool {
        self.total >= threshold
    }

    /// One-line explanation naming the signals that contributed.
    #[must_use]
    pub fn explanation(&self) -> String {
        let mut reasons: Vec<String> = Vec::new();
        if self.semantic > 0.5 {
            reasons.push(format!(
                "methods fall into {} distinct semantic clusters",
                self.clusters
            ));
        }
        if self.dependency > 0.5 {
            reasons.push(format!("imports span {} concern domains", self.concerns));
        }
        if self.naming > 0.5 {
            reasons.push(format!(
                "method names use {} different verb categories",
                self.verb_categories
            ));
        }
        if self.boost > 0.0 {
            reasons.push("crosses a forbidden architectural layer".to_string());
        }
        if reasons.is_empty() {
            "unit appears to have a single, cohesive responsibility".to_string()
        } else {
            format!("likely multiple responsibilities: {}", reasons.join("; "))
        }
    }
}

/// Combines the four sub-signals into the configured weighted sum.
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    #[must_use]
    pub const fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn score(&self, inputs: &ScoreInputs<'_>) -> ScoreBreakdown {
        let clusters = cluster_count(inputs.method_embeddings, CLUSTER_EPS, MIN_CLUSTER_SIZE);
        let span = self.weights.semantic_cluster_span.max(2);
        let semantic =
            (clusters.saturating_sub(1) as f64 / (span - 1) as f64).clamp(0.0, 1.0);

        let concern_table = concern_counts(inputs.imports);
        let dependency = normalized_entropy(concern_table.values().copied());

        let verb_table = verb_category_counts(inputs.method_names);
        let naming = normalized_entropy(verb_table.values().copied());

        let method_count = method_count_signal(inputs.method_names.len() as u32, inputs.tolerance);

        let boost = if inputs.layer_violation {
            self.weights.layer_violation_boost
        } else {
            0.0
        };

        let total = (self.weights.semantic * semantic
            + self.weights.dependency * dependency
            + self.weights.naming * naming
            + self.weights.method_count * method_count
            + boost)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            total,
            semantic,
            dependency,
            naming,
            method_count,
            boost,
            clusters,
            concerns: concern_table.len(),
            verb_categories: verb_table.len(),
            severity: severity_of(total),
        }
    }
}

const fn severity_of(total: f64) -> Severity {
    if total >= 0.9 {
        Severity::Critical
    } else if total >= 0.8 {
        Severity::High
    } else if total >= 0.7 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Shannon entropy over a category distribution, normalized by the
/// entropy of a uniform spread over the observed categories. Zero when
/// fewer than two categories are present.
fn normalized_entropy(counts: impl Iterator<Item = usize> + Clone) -> f64 {
    let observed = counts.clone().filter(|&count| count > 0).count();
    if observed < 2 {
        return 0.0;
    }
    let total: usize = counts.clone().sum();
    let mut entropy = 0.0;
    for count in counts {
        if count > 0 {
            let proportion = count as f64 / total as f64;
            entropy -= proportion * proportion.ln();
        }
    }
    (entropy / (observed as f64).ln()).clamp(0.0, 1.0)
}

/// Diminishing-returns method-count signal against the directory
/// tolerance: flat until the ceiling, then stepping up.
fn method_count_signal(method_count: u32, tolerance: u32) -> f64 {
    if tolerance == 0 {
        return 0.0;
    }
    let ratio = f64::from(method_count) / f64::from(tolerance);
    if ratio <= 1.0 {
        0.0
    } else if ratio <= 2.0 {
        0.3
    } else {
        (0.6 + (ratio - 2.0) * 0.1).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paired_embeddings(pairs: usize) -> Vec<Vec<f32>> {
        let mut embeddings = Vec::new();
        for pair in 0..pairs {
            let mut basis = vec![0.0f32; pairs];
            basis[pair] = 1.0;
            embeddings.push(basis.clone());
            embeddings.push(basis);
        }
        embeddings
    }

    #[test]
    fn multi_concern_unit_crosses_the_threshold() {
        // Methods touching persistence, auth, and messaging, with high
        // naming variety, weights (0.4, 0.3, 0.2, 0.1) and no layer
        // boost: the weighted sum alone must clear 0.7.
        let method_names: Vec<String> = [
            "create_record",
            "delete_record",
            "check_token",
            "verify_token",
            "send_alert",
            "publish_alert",
            "compute_digest",
            "run_pipeline",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        let embeddings = paired_embeddings(4);
        let imports = vec![
            "sqlalchemy".to_string(),
            "jwt".to_string(),
            "smtplib".to_string(),
        ];

        let scorer = Scorer::new(ScoringWeights::default());
        let breakdown = scorer.score(&ScoreInputs {
            method_names: &method_names,
            method_embeddings: &embeddings,
            imports: &imports,
            tolerance: 2,
            layer_violation: false,
        });

        assert_eq!(breakdown.boost, 0.0);
        assert_eq!(breakdown.clusters, 4);
        assert_eq!(breakdown.concerns, 3);
        assert!(
            breakdown.total >= 0.7,
            "expected high severity, got {breakdown:?}"
        );
        assert!(breakdown.is_violation(0.7));
        assert!(matches!(
            breakdown.severity,
            Severity::Medium | Severity::High | Severity::Critical
        ));
    }

    #[test]
    fn cohesive_unit_scores_low() {
        let method_names: Vec<String> = ["create_user", "update_user", "delete_user"]
            .iter()
            .map(ToString::to_string)
            .collect();
        // All methods share one semantic neighborhood.
        let embeddings = vec![vec![1.0, 0.0]; 3];
        let imports = vec!["sqlalchemy".to_string()];

        let scorer = Scorer::new(ScoringWeights::default());
        let breakdown = scorer.score(&ScoreInputs {
            method_names: &method_names,
            method_embeddings: &embeddings,
            imports: &imports,
            tolerance: 5,
            layer_violation: false,
        });

        assert!(breakdown.total < 0.3, "got {breakdown:?}");
        assert_eq!(breakdown.severity, Severity::Low);
        assert!(breakdown.explanation().contains("cohesive"));
    }

    #[test]
    fn layer_violation_boost_is_additive() {
        let method_names: Vec<String> = vec!["run_job".to_string()];
        let embeddings = vec![vec![1.0, 0.0]];
        let imports: Vec<String> = Vec::new();

        let scorer = Scorer::new(ScoringWeights::default());
        let clean = scorer.score(&ScoreInputs {
            method_names: &method_names,
            method_embeddings: &embeddings,
            imports: &imports,
            tolerance: 5,
            layer_violation: false,
        });
        let boosted = scorer.score(&ScoreInputs {
            method_names: &method_names,
            method_embeddings: &embeddings,
            imports: &imports,
            tolerance: 5,
            layer_violation: true,
        });

        assert!((boosted.total - clean.total - 0.2).abs() < 1e-9);
    }

    #[test]
    fn entropy_is_even_spread_over_observed_categories() {
        assert!((normalized_entropy([3usize, 3, 3].into_iter()) - 1.0).abs() < 1e-9);
        assert_eq!(normalized_entropy([5usize].into_iter()), 0.0);
        let skewed = normalized_entropy([9usize, 1].into_iter());
        assert!(skewed > 0.0 && skewed < 0.999);
    }

    #[test]
    fn method_count_signal_has_diminishing_returns() {
        assert_eq!(method_count_signal(3, 5), 0.0);
        assert_eq!(method_count_signal(8, 5), 0.3);
        assert!(method_count_signal(20, 5) > method_count_signal(11, 5));
        assert_eq!(method_count_signal(200, 5), 1.0);
    }
}
