use schema::{ContradictionRecord, EvidenceItem, FactSummary, SupportingFact};

/// Evidence above this similarity counts as directly supporting the claim.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.5;

pub const DEBUNKING_KEYWORDS: [&str; 15] = [
    "debunked",
    "disproven",
    "false",
    "hoax",
    "myth",
    "scientific explanation",
    "natural phenomenon",
    "optical illusion",
    "misidentification",
    "pareidolia",
    "confirmation bias",
    "hallucination",
    "fabricated",
    "no evidence",
    "anecdotal",
];

pub const PARANORMAL_KEYWORDS: [&str; 25] = [
    "ghost",
    "spirit",
    "haunted",
    "supernatural",
    "apparition",
    "ufo",
    "alien",
    "extraterrestrial",
    "abduction",
    "conspiracy",
    "psychic",
    "telepathy",
    "telekinesis",
    "esp",
    "clairvoyance",
    "astrology",
    "horoscope",
    "zodiac",
    "star sign",
    "alignment",
    "magic",
    "miracle",
    "unexplained",
    "mysterious",
    "paranormal",
];

/// Scans `evidence` for keyword signals.
///
/// Matching is plain substring search on passage text, which is already
/// lowercased, so "myth" also fires inside "mythology".
pub fn extract_facts(evidence: &[EvidenceItem]) -> FactSummary {
    let mut facts = FactSummary::default();
    for item in evidence {
        let passage = &item.passage;
        facts.sources.insert(passage.source.clone());
        facts.domains.insert(passage.domain.clone());

        for keyword in DEBUNKING_KEYWORDS {
            if passage.text.contains(keyword) {
                facts.contradictions.push(ContradictionRecord {
                    text: passage.text.clone(),
                    source: passage.source.clone(),
                    keyword: keyword.to_string(),
                    similarity: item.similarity,
                });
            }
        }

        for keyword in PARANORMAL_KEYWORDS {
            if passage.text.contains(keyword) {
                facts.relevant_terms.increment(keyword);
            }
        }

        if item.similarity > HIGH_CONFIDENCE_THRESHOLD {
            facts.supporting_facts.push(SupportingFact {
                text: passage.text.clone(),
                source: passage.source.clone(),
                similarity: item.similarity,
            });
        }
    }
    log::debug!(
        "facts extracted: evidence={}, contradictions={}, supporting={}, terms={}",
        evidence.len(),
        facts.contradictions.len(),
        facts.supporting_facts.len(),
        facts.relevant_terms.len()
    );
    facts
}
