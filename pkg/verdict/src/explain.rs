use std::{
    fmt::Write as _,
    sync::atomic::{AtomicBool, Ordering},
};

use generation::{ExplanationRequest, GenerationError, TextGenerator, excerpt};
use schema::{EvidenceItem, FactSummary, Verdict};

const CONTRADICTION_LIMIT: usize = 3;
const CONTRADICTION_EXCERPT_CHARS: usize = 100;
const EVIDENCE_EXCERPT_CHARS: usize = 150;
const RELATED_TERM_LIMIT: usize = 5;

/// Whether the remote generator may still be consulted.
///
/// The only transition is `Enabled -> Disabled`, taken on the first failed
/// generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Enabled,
    Disabled,
}

pub struct ExplanationGenerator {
    generator: Option<Box<dyn TextGenerator>>,
    enabled: AtomicBool,
}

impl std::fmt::Debug for ExplanationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplanationGenerator")
            .field("has_generator", &self.generator.is_some())
            .field("state", &self.state())
            .finish()
    }
}

impl Default for ExplanationGenerator {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl ExplanationGenerator {
    /// Rule-based explanations only.
    pub fn deterministic() -> Self {
        Self {
            generator: None,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn with_generator(generator: Box<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
            enabled: AtomicBool::new(true),
        }
    }

    /// Lock-free read; safe to call while another thread is mid-generation.
    pub fn state(&self) -> GenerationState {
        if self.enabled.load(Ordering::Acquire) {
            GenerationState::Enabled
        } else {
            GenerationState::Disabled
        }
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    fn try_generate(&self, request: &ExplanationRequest<'_>) -> Result<String, GenerationError> {
        match &self.generator {
            Some(generator) if self.state() == GenerationState::Enabled => {
                generator.generate_explanation(request)
            }
            _ => Err(GenerationError::Disabled),
        }
    }

    /// Explains `verdict`, preferring the remote generator while it is
    /// enabled. Any generation failure disables it for good and the
    /// rule-based text is returned instead.
    ///
    /// Takes `&self`: concurrent callers may generate in parallel, and the
    /// first failure seen by any of them flips the shared state.
    pub fn explain(
        &self,
        claim: &str,
        verdict: Verdict,
        facts: &FactSummary,
        evidence: &[EvidenceItem],
    ) -> String {
        let request = ExplanationRequest {
            claim,
            verdict,
            facts,
            evidence,
        };
        match self.try_generate(&request) {
            Ok(text) => return text,
            Err(GenerationError::Disabled) => {}
            Err(err) => {
                if self.disable() {
                    log::warn!(
                        "explanation generation failed, switching to rule-based explanations: {err}"
                    );
                }
            }
        }
        fallback_explanation(verdict, facts, evidence)
    }
}

/// First evidence item with the highest similarity.
fn strongest_evidence(evidence: &[EvidenceItem]) -> Option<&EvidenceItem> {
    let mut best: Option<&EvidenceItem> = None;
    for item in evidence {
        if best.is_none_or(|current| item.similarity > current.similarity) {
            best = Some(item);
        }
    }
    best
}

fn cite_evidence(out: &mut String, label: &str, item: &EvidenceItem) {
    let _ = write!(
        out,
        "\n\n{label} (similarity: {:.2}) from {}: '{}...'",
        item.similarity,
        item.passage.source,
        excerpt(&item.passage.text, EVIDENCE_EXCERPT_CHARS)
    );
}

/// Rule-based explanation built only from the verdict, facts and evidence.
pub fn fallback_explanation(
    verdict: Verdict,
    facts: &FactSummary,
    evidence: &[EvidenceItem],
) -> String {
    let mut out = String::new();
    let strongest = strongest_evidence(evidence);
    match verdict {
        Verdict::Debunked => {
            let _ = write!(
                out,
                "The claim has been debunked based on evidence from {} sources. ",
                facts.sources.len()
            );
            if !facts.contradictions.is_empty() {
                out.push_str("Specific contradictions include: ");
                for record in facts.contradictions.iter().take(CONTRADICTION_LIMIT) {
                    let _ = write!(
                        out,
                        "\n- {} states: '{}...'",
                        record.source,
                        excerpt(&record.text, CONTRADICTION_EXCERPT_CHARS)
                    );
                }
            }
            if let Some(item) = strongest {
                cite_evidence(&mut out, "Strongest evidence", item);
            }
        }
        Verdict::Unsupported => {
            let _ = write!(
                out,
                "The claim lacks supporting evidence. We searched across {} domains and {} sources, \
                 but found no direct support for this claim. ",
                facts.domains.len(),
                facts.sources.len()
            );
            if let Some(item) = strongest {
                cite_evidence(&mut out, "Most relevant information", item);
            }
        }
        Verdict::RequiresFurtherResearch => {
            out.push_str("The evidence is inconclusive. ");
            if !facts.relevant_terms.is_empty() {
                let terms: Vec<&str> = facts
                    .relevant_terms
                    .most_common(RELATED_TERM_LIMIT)
                    .into_iter()
                    .map(|entry| entry.term.as_str())
                    .collect();
                let _ = write!(
                    out,
                    "Related concepts found in our knowledge base include: {}. ",
                    terms.join(", ")
                );
            }
            let _ = write!(
                out,
                "\nWhile we found {} potentially relevant passages, none provided definitive \
                 confirmation or refutation of the claim. ",
                evidence.len()
            );
            if let Some(item) = strongest {
                cite_evidence(&mut out, "Most relevant information", item);
            }
            out.push_str("\n\nThis claim would benefit from further investigation by domain experts.");
        }
    }
    out
}
