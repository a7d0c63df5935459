use schema::{EvidenceItem, FactSummary, Verdict, VerdictResult, validate_evidence};
use serde::Serialize;
use store::{LexicalIndex, StoreError};
use text::clean_text;
use verdict::{ExplanationGenerator, GenerationState, decide, extract_facts};

use crate::{DEFAULT_TOP_K, retrieve};

pub const NO_EVIDENCE_EXPLANATION: &str = "No relevant evidence found.";

/// Normalizes raw claim text the same way corpus passages are normalized.
pub fn process_claim_text(claim: &str) -> String {
    clean_text(claim)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimAnalysis {
    pub claim: String,
    pub processed_claim: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub explanation: String,
    pub evidence: Vec<EvidenceItem>,
    pub facts: FactSummary,
}

impl ClaimAnalysis {
    pub fn result(&self) -> VerdictResult {
        VerdictResult {
            verdict: self.verdict,
            explanation: self.explanation.clone(),
            confidence: self.confidence,
        }
    }
}

/// Runs one claim through retrieval, fact extraction, the verdict rules and
/// explanation.
///
/// Holds no per-claim state; the only thing that survives a call is the
/// explainer's generation state, which is atomic. `analyze` takes `&self`, so
/// one analyzer can serve many threads without an outer lock.
#[derive(Debug)]
pub struct ClaimAnalyzer {
    explainer: ExplanationGenerator,
    top_k: usize,
}

impl Default for ClaimAnalyzer {
    fn default() -> Self {
        Self::new(ExplanationGenerator::deterministic())
    }
}

impl ClaimAnalyzer {
    pub fn new(explainer: ExplanationGenerator) -> Self {
        Self {
            explainer,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn generation_state(&self) -> GenerationState {
        self.explainer.state()
    }

    pub fn analyze(
        &self,
        index: &LexicalIndex,
        claim: &str,
        domain_filter: Option<&str>,
    ) -> Result<ClaimAnalysis, StoreError> {
        self.analyze_with_top_k(index, claim, self.top_k, domain_filter)
    }

    pub fn analyze_with_top_k(
        &self,
        index: &LexicalIndex,
        claim: &str,
        top_k: usize,
        domain_filter: Option<&str>,
    ) -> Result<ClaimAnalysis, StoreError> {
        let processed_claim = process_claim_text(claim);
        let evidence = retrieve(index, &processed_claim, top_k, domain_filter)?;
        for item in &evidence {
            if let Err(err) = validate_evidence(item) {
                log::warn!(
                    "evidence item failed validation: passage_id={}, error={err}",
                    item.passage.passage_id
                );
            }
        }
        let facts = extract_facts(&evidence);
        let decision = decide(&evidence, &facts);
        let explanation = if evidence.is_empty() {
            NO_EVIDENCE_EXPLANATION.to_string()
        } else {
            self.explainer
                .explain(&processed_claim, decision.verdict, &facts, &evidence)
        };

        Ok(ClaimAnalysis {
            claim: claim.to_string(),
            processed_claim,
            verdict: decision.verdict,
            confidence: decision.confidence,
            explanation,
            evidence,
            facts,
        })
    }
}
