use anyhow::{Context, Result};
use facegate_vision::{
    authenticate_one, Decision, Embedding, EnrollmentSet, MatchError, Verdict,
};
use serde::Serialize;

use crate::storage::Store;

/// Result of an anonymous 1:N attempt, with the empty-store case kept apart
/// from "nobody matched" so the two can be reported differently.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Match { identity: String, score: f32 },
    NoMatch { best_score: f32 },
    NoCandidates,
}

pub fn identify(
    set: &EnrollmentSet,
    probe: &Embedding,
    threshold: f32,
) -> Result<Identification, MatchError> {
    match set.best_match(probe, threshold) {
        Ok(Decision::Authenticated { identity, score }) => Ok(Identification::Match {
            identity: identity.clone(),
            score,
        }),
        Ok(Decision::Rejected { best_score }) => Ok(Identification::NoMatch { best_score }),
        Err(MatchError::EmptyEnrollmentSet) => Ok(Identification::NoCandidates),
        Err(e) => Err(e),
    }
}

/// 1:1 check of a probe against the claimed identity's enrollment.
pub fn verify(store: &Store, identity: &str, probe: &Embedding, threshold: f32) -> Result<Verdict> {
    let record = store
        .get(identity)?
        .with_context(|| format!("user \"{identity}\" is not enrolled"))?;
    let stored = Embedding::new(record.embedding);
    Ok(authenticate_one(probe, &stored, threshold)?)
}

/// What the CLI prints for `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub message: String,
}

impl AuthResponse {
    pub fn from_verdict(identity: &str, verdict: Verdict) -> Self {
        let message = if verdict.authenticated {
            format!("Authentication successful! Welcome {identity}")
        } else {
            "Authentication failed. Face does not match.".to_string()
        };
        Self {
            authenticated: verdict.authenticated,
            identity: Some(identity.to_string()),
            similarity: Some(verdict.score),
            confidence: Some(confidence(verdict.score)),
            message,
        }
    }

    pub fn from_identification(outcome: &Identification) -> Self {
        match outcome {
            Identification::Match { identity, score } => Self {
                authenticated: true,
                identity: Some(identity.clone()),
                similarity: Some(*score),
                confidence: Some(confidence(*score)),
                message: format!("Authentication successful! Welcome {identity}"),
            },
            Identification::NoMatch { best_score } => Self {
                authenticated: false,
                identity: None,
                similarity: Some(*best_score),
                confidence: Some(confidence(*best_score)),
                message: "No matching user found".to_string(),
            },
            Identification::NoCandidates => Self {
                authenticated: false,
                identity: None,
                similarity: None,
                confidence: None,
                message: "No users registered in the system".to_string(),
            },
        }
    }
}

/// Similarity presented as a percentage.
pub fn confidence(score: f32) -> f32 {
    score * 100.0
}
