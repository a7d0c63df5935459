pub mod engine;
pub mod explain;
pub mod facts;

pub use engine::{Decision, NO_EVIDENCE_CONFIDENCE, decide};
pub use explain::{ExplanationGenerator, GenerationState, fallback_explanation};
pub use facts::{
    DEBUNKING_KEYWORDS, HIGH_CONFIDENCE_THRESHOLD, MEDIUM_CONFIDENCE_THRESHOLD,
    PARANORMAL_KEYWORDS, extract_facts,
};
