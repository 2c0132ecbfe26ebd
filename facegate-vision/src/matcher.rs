use crate::embedding::Embedding;
use crate::error::MatchError;
use crate::similarity::similarity;

/// Policy default for the acceptance threshold. Every operation takes the
/// threshold explicitly; this is only what callers fall back to.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Outcome of a one-to-one comparison against a claimed identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub authenticated: bool,
    pub score: f32,
}

/// Outcome of a one-to-many search.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<I> {
    Authenticated { identity: I, score: f32 },
    /// The best candidate stayed below the threshold.
    Rejected { best_score: f32 },
}

impl<I> Decision<I> {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Decision::Authenticated { .. })
    }

    pub fn score(&self) -> f32 {
        match self {
            Decision::Authenticated { score, .. } => *score,
            Decision::Rejected { best_score } => *best_score,
        }
    }

    pub fn identity(&self) -> Option<&I> {
        match self {
            Decision::Authenticated { identity, .. } => Some(identity),
            Decision::Rejected { .. } => None,
        }
    }
}

/// Score a query against one stored embedding. A score equal to the
/// threshold authenticates.
pub fn authenticate_one(
    query: &Embedding,
    stored: &Embedding,
    threshold: f32,
) -> Result<Verdict, MatchError> {
    let score = similarity(query, stored)?;
    Ok(Verdict {
        authenticated: score >= threshold,
        score,
    })
}

/// Full scan for the best-matching identity.
///
/// The leader only changes on a strictly greater score, so on ties the
/// candidate seen first wins. An empty candidate list is reported as
/// [`MatchError::EmptyEnrollmentSet`] before any scoring happens, and a
/// dimension mismatch anywhere aborts the whole search. Candidates with
/// non-finite embeddings are skipped; if none remain the search fails with
/// [`MatchError::NonFiniteEmbedding`].
pub fn find_best_match<'a, I, C>(
    query: &Embedding,
    candidates: C,
    threshold: f32,
) -> Result<Decision<I>, MatchError>
where
    I: 'a,
    C: IntoIterator<Item = (I, &'a Embedding)>,
{
    let mut candidates = candidates.into_iter().peekable();
    if candidates.peek().is_none() {
        return Err(MatchError::EmptyEnrollmentSet);
    }
    if !query.is_finite() {
        return Err(MatchError::NonFiniteEmbedding);
    }

    let mut best: Option<(I, f32)> = None;
    for (identity, embedding) in candidates {
        let score = match similarity(query, embedding) {
            Ok(score) => score,
            Err(MatchError::NonFiniteEmbedding) => {
                log::warn!("skipping enrollment with non-finite embedding");
                continue;
            }
            Err(e) => return Err(e),
        };
        if best.as_ref().map_or(true, |(_, leader)| score > *leader) {
            best = Some((identity, score));
        }
    }

    let (identity, score) = best.ok_or(MatchError::NonFiniteEmbedding)?;
    if score >= threshold {
        Ok(Decision::Authenticated { identity, score })
    } else {
        Ok(Decision::Rejected { best_score: score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::from(values)
    }

    #[test]
    fn test_authenticate_one_boundary_inclusive() {
        let query = emb(&[1.0, 0.0]);
        let stored = emb(&[3.0, 4.0]);
        let verdict = authenticate_one(&query, &stored, 0.6).unwrap();
        assert_eq!(
            verdict,
            Verdict {
                authenticated: true,
                score: 0.6
            }
        );

        let verdict = authenticate_one(&query, &stored, 0.600_001).unwrap();
        assert!(!verdict.authenticated);
        assert_eq!(verdict.score, 0.6);
    }

    #[test]
    fn test_authenticate_one_threshold_override() {
        // cos = 1 / sqrt(5) ~ 0.447
        let query = emb(&[1.0, 2.0]);
        let stored = emb(&[1.0, 0.0]);
        assert!(!authenticate_one(&query, &stored, DEFAULT_THRESHOLD).unwrap().authenticated);
        assert!(authenticate_one(&query, &stored, 0.4).unwrap().authenticated);
    }

    #[test]
    fn test_best_match_picks_highest() {
        let query = emb(&[1.0, 0.0, 0.0]);
        let a = emb(&[0.8, 0.2, 0.0]);
        let b = emb(&[0.9, 0.1, 0.0]);
        let c = emb(&[0.0, 1.0, 0.0]);
        let set = [("a", &a), ("b", &b), ("c", &c)];

        let decision = find_best_match(&query, set, 0.6).unwrap();
        assert_eq!(decision.identity(), Some(&"b"));
        assert!(decision.score() > 0.99);
    }

    #[test]
    fn test_best_match_first_seen_wins_ties() {
        let query = emb(&[1.0, 0.0]);
        let e1 = emb(&[2.0, 1.0]);
        let e2 = emb(&[4.0, 2.0]);
        let set = [("u1", &e1), ("u2", &e2)];

        let decision = find_best_match(&query, set, 0.6).unwrap();
        assert_eq!(decision.identity(), Some(&"u1"));
    }

    #[test]
    fn test_best_match_below_threshold_is_rejected() {
        let query = emb(&[1.0, 0.0]);
        let e1 = emb(&[0.0, 1.0]);
        let e2 = emb(&[1.0, 1.0]);
        let decision = find_best_match(&query, [("u1", &e1), ("u2", &e2)], 0.9).unwrap();
        assert!(!decision.is_authenticated());
        assert!((decision.score() - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_negative_scores_still_reported() {
        let query = emb(&[1.0, 0.0]);
        let e1 = emb(&[-1.0, 0.0]);
        let decision = find_best_match(&query, [("u1", &e1)], 0.6).unwrap();
        assert_eq!(decision, Decision::Rejected { best_score: -1.0 });
    }

    #[test]
    fn test_best_match_empty() {
        let query = emb(&[1.0, 0.0]);
        let empty: [(&str, &Embedding); 0] = [];
        assert_eq!(
            find_best_match(&query, empty, 0.6),
            Err(MatchError::EmptyEnrollmentSet)
        );
    }

    #[test]
    fn test_best_match_dimension_mismatch_aborts() {
        let query = emb(&[1.0, 0.0]);
        let good = emb(&[1.0, 0.0]);
        let bad = emb(&[1.0, 0.0, 0.0]);
        let result = find_best_match(&query, [("good", &good), ("bad", &bad)], 0.6);
        assert_eq!(
            result,
            Err(MatchError::DimensionMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn test_non_finite_candidate_never_leads() {
        let query = emb(&[1.0, 0.0]);
        let corrupt = emb(&[f32::NAN, 0.0]);
        let alice = emb(&[1.0, 0.0]);
        let decision = find_best_match(&query, [("corrupt", &corrupt), ("alice", &alice)], 0.6);
        assert_eq!(
            decision,
            Ok(Decision::Authenticated {
                identity: "alice",
                score: 1.0
            })
        );
    }

    #[test]
    fn test_non_finite_only_candidates() {
        let query = emb(&[1.0, 0.0]);
        let corrupt = emb(&[f32::INFINITY, 0.0]);
        assert_eq!(
            find_best_match(&query, [("corrupt", &corrupt)], 0.6),
            Err(MatchError::NonFiniteEmbedding)
        );

        let nan_query = emb(&[f32::NAN, 0.0]);
        let alice = emb(&[1.0, 0.0]);
        assert_eq!(
            find_best_match(&nan_query, [("alice", &alice)], 0.6),
            Err(MatchError::NonFiniteEmbedding)
        );
    }
}
