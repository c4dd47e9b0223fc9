//! Function matching: semantic candidates to a single chosen operation.
//!
//! Candidates come from the [`SemanticIndex`]. The decision is made by an
//! ordered list of [`AssessmentTier`]s: the model assessment first, the
//! similarity threshold last. A tier that cannot decide (model disabled,
//! model call failed) hands over to the next one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::index::SemanticIndex;
use crate::llm::LanguageModel;
use crate::parsing::parse_json_object;
use crate::tier::Tier;
use crate::types::{Assessment, Candidate, Confidence};

/// Minimum similarity for the threshold tier to select the top candidate.
pub const SELECT_THRESHOLD: f64 = 0.40;
pub const MEDIUM_THRESHOLD: f64 = 0.60;
pub const HIGH_THRESHOLD: f64 = 0.80;

/// Tolerance for `1 - distance` representation error at the breakpoints.
const EPSILON: f64 = 1e-9;

/// Candidates plus the decision taken over them.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub assessment: Assessment,
    pub candidates: Vec<Candidate>,
}

impl MatchOutcome {
    pub fn selected(&self) -> Option<&Candidate> {
        self.assessment.selected_candidate(&self.candidates)
    }
}

#[async_trait]
pub trait AssessmentTier: Send + Sync {
    fn name(&self) -> &str;

    /// Assess a non-empty candidate list.
    async fn assess(&self, query: &str, candidates: &[Candidate]) -> Tier<Assessment>;
}

/// Asks the language model whether any candidate genuinely answers the query.
pub struct ModelAssessment {
    model: Arc<LanguageModel>,
}

impl ModelAssessment {
    pub fn new(model: Arc<LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AssessmentTier for ModelAssessment {
    fn name(&self) -> &str {
        "model"
    }

    async fn assess(&self, query: &str, candidates: &[Candidate]) -> Tier<Assessment> {
        if !self.model.is_configured() {
            return Tier::Next("language model not configured".to_string());
        }
        let prompt = build_assessment_prompt(query, candidates);
        match self.model.complete(&prompt).await {
            Ok(reply) => Tier::Decided(parse_assessment(&reply, candidates.len())),
            Err(e) => {
                warn!("{} assessment failed: {}", self.model.name(), e);
                Tier::Next(format!("model call failed: {}", e))
            }
        }
    }
}

/// Selects the top candidate by similarity breakpoints. Always decides.
pub struct SimilarityThreshold;

#[async_trait]
impl AssessmentTier for SimilarityThreshold {
    fn name(&self) -> &str {
        "similarity"
    }

    async fn assess(&self, _query: &str, candidates: &[Candidate]) -> Tier<Assessment> {
        Tier::Decided(assess_by_similarity(candidates))
    }
}

pub struct FunctionMatcher {
    index: Arc<dyn SemanticIndex>,
    tiers: Vec<Box<dyn AssessmentTier>>,
}

impl FunctionMatcher {
    /// Model assessment followed by the similarity threshold.
    pub fn new(index: Arc<dyn SemanticIndex>, model: Arc<LanguageModel>) -> Self {
        Self::with_tiers(
            index,
            vec![
                Box::new(ModelAssessment::new(model)),
                Box::new(SimilarityThreshold),
            ],
        )
    }

    pub fn with_tiers(index: Arc<dyn SemanticIndex>, tiers: Vec<Box<dyn AssessmentTier>>) -> Self {
        Self { index, tiers }
    }

    /// Retrieve up to `top_k` candidates and decide on one of them.
    pub async fn match_query(&self, query: &str, top_k: usize) -> MatchOutcome {
        let candidates = match self.index.search(query, top_k.max(1)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("semantic search failed, treating as no candidates: {}", e);
                Vec::new()
            }
        };
        let assessment = self.assess(query, &candidates).await;
        info!(
            "match assessment: selected={}, index={:?}, confidence={}",
            assessment.selected, assessment.index, assessment.confidence
        );
        MatchOutcome {
            assessment,
            candidates,
        }
    }

    pub async fn assess(&self, query: &str, candidates: &[Candidate]) -> Assessment {
        if candidates.is_empty() {
            return Assessment::reject(Confidence::None, "no candidates");
        }
        for tier in &self.tiers {
            match tier.assess(query, candidates).await {
                Tier::Decided(assessment) => {
                    debug!("assessment decided by '{}' tier", tier.name());
                    return assessment;
                }
                Tier::Next(reason) => {
                    debug!("assessment tier '{}' passed: {}", tier.name(), reason);
                }
            }
        }
        assess_by_similarity(candidates)
    }
}

/// Threshold assessment of the top candidate.
pub fn assess_by_similarity(candidates: &[Candidate]) -> Assessment {
    let Some(top) = candidates.first() else {
        return Assessment::reject(Confidence::None, "no candidates");
    };
    let similarity = top.similarity();
    if similarity + EPSILON < SELECT_THRESHOLD {
        return Assessment::reject(
            Confidence::None,
            format!(
                "Top candidate similarity {:.2} is below the selection threshold {:.2}",
                similarity, SELECT_THRESHOLD
            ),
        );
    }
    let confidence = if similarity + EPSILON >= HIGH_THRESHOLD {
        Confidence::High
    } else if similarity + EPSILON >= MEDIUM_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    };
    Assessment::select(
        0,
        confidence,
        format!(
            "Selected '{}' by similarity {:.2}",
            top.operation.operation_id, similarity
        ),
    )
}

pub fn build_assessment_prompt(query: &str, candidates: &[Candidate]) -> String {
    let listing: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. operation: {} | method: {} | path: {} | similarity: {:.2}\n   {}",
                i,
                c.operation.operation_id,
                c.operation.method.to_uppercase(),
                c.operation.path,
                c.similarity(),
                c.description
            )
        })
        .collect();

    format!(
        r#"You decide whether a user request can be served by one of the API functions below.

User request: "{query}"

Candidate functions (index. details):
{listing}

Rules:
1. Select a function only if the request's domain and intent genuinely match what the function does.
2. Reject greetings, small talk and requests outside the domain of every candidate.
3. Reject when candidates merely share words with the request but do something else.
4. A high similarity score alone is not a match.

Respond with ONLY a JSON object of this exact shape:
{{"selected": true or false, "index": <candidate index or null>, "reasoning": "<one sentence>", "confidence": "none" | "low" | "medium" | "high"}}"#,
        query = query,
        listing = listing.join("\n")
    )
}

/// Parse a model assessment reply.
///
/// A reply that is not a JSON object with a boolean `selected` falls back to
/// selecting the top candidate with low confidence. A selected index outside
/// `0..candidate_count` is clamped to 0.
pub fn parse_assessment(reply: &str, candidate_count: usize) -> Assessment {
    let parsed = parse_json_object(reply);
    let Some((map, selected)) = parsed
        .as_ref()
        .and_then(|m| m.get("selected").and_then(Value::as_bool).map(|s| (m, s)))
    else {
        warn!("unparseable model assessment, selecting top candidate");
        return Assessment::select(
            0,
            Confidence::Low,
            "Model response could not be parsed; defaulting to the top candidate",
        );
    };

    let reasoning = map
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let label = map.get("confidence").and_then(Value::as_str).and_then(Confidence::parse);

    if !selected {
        return Assessment::reject(label.unwrap_or(Confidence::None), reasoning);
    }

    let index = map
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .filter(|i| *i < candidate_count)
        .unwrap_or(0);
    Assessment::select(index, label.unwrap_or(Confidence::Low), reasoning)
}
