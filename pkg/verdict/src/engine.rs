use schema::{EvidenceItem, FactSummary, Verdict};

use crate::facts::{HIGH_CONFIDENCE_THRESHOLD, MEDIUM_CONFIDENCE_THRESHOLD};

/// Confidence reported when retrieval found nothing at all.
pub const NO_EVIDENCE_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub confidence: f64,
}

/// Maps evidence and its fact summary to a verdict.
///
/// Rules are tried in order and the first match wins:
/// 1. no evidence: `RequiresFurtherResearch` at 0.3
/// 2. a contradiction and max similarity above 0.7: `Debunked` at
///    `max(avg, max)`
/// 3. no supporting facts and average similarity above 0.5: `Unsupported` at
///    the average
/// 4. otherwise `RequiresFurtherResearch` at the average
pub fn decide(evidence: &[EvidenceItem], facts: &FactSummary) -> Decision {
    if evidence.is_empty() {
        return Decision {
            verdict: Verdict::RequiresFurtherResearch,
            confidence: NO_EVIDENCE_CONFIDENCE,
        };
    }

    let total: f64 = evidence.iter().map(|item| item.similarity).sum();
    let avg_similarity = total / evidence.len() as f64;
    let max_similarity = evidence
        .iter()
        .map(|item| item.similarity)
        .fold(f64::NEG_INFINITY, f64::max);

    let decision = if !facts.contradictions.is_empty() && max_similarity > HIGH_CONFIDENCE_THRESHOLD
    {
        Decision {
            verdict: Verdict::Debunked,
            confidence: avg_similarity.max(max_similarity),
        }
    } else if facts.supporting_facts.is_empty() && avg_similarity > MEDIUM_CONFIDENCE_THRESHOLD {
        Decision {
            verdict: Verdict::Unsupported,
            confidence: avg_similarity,
        }
    } else {
        Decision {
            verdict: Verdict::RequiresFurtherResearch,
            confidence: avg_similarity,
        }
    };

    log::info!(
        "verdict decided: verdict={}, confidence={:.4}, evidence={}, avg={avg_similarity:.4}, max={max_similarity:.4}",
        decision.verdict,
        decision.confidence,
        evidence.len()
    );
    decision
}
