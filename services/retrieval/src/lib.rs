pub mod api;
#[cfg(feature = "async-transport")]
pub mod transport_axum;

use std::collections::BTreeMap;

use rand::Rng;
use ranking::TermVector;
use schema::EvidenceItem;
use serde::Serialize;
use store::{LexicalIndex, StoreError};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_BOOTSTRAP_RUNS: usize = 3;

/// Chance that a perturbed run also gets synthetic filler terms.
const FILLER_TERM_PROBABILITY: f64 = 0.3;
const MAX_FILLER_TERMS: usize = 3;

/// Top `k` passages for `claim_text`.
pub fn retrieve(
    index: &LexicalIndex,
    claim_text: &str,
    k: usize,
    domain_filter: Option<&str>,
) -> Result<Vec<EvidenceItem>, StoreError> {
    let query = index.vectorize(claim_text);
    index.query(&query, k, domain_filter)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapRun {
    pub run_id: usize,
    pub query: TermVector,
    pub evidence: Vec<EvidenceItem>,
}

/// Randomly nudges every count in `query` by -1, 0 or +1 (never below 1) and
/// sometimes appends 1 to 3 filler terms tagged with `run_id`.
pub fn perturb_term_vector<R: Rng + ?Sized>(
    query: &TermVector,
    run_id: usize,
    rng: &mut R,
) -> TermVector {
    let mut perturbed: TermVector = query
        .iter()
        .map(|(term, count)| {
            let nudged = i64::from(*count) + rng.gen_range(-1..=1);
            (term.clone(), nudged.max(1) as u32)
        })
        .collect();
    if rng.gen_bool(FILLER_TERM_PROBABILITY) {
        let fillers = rng.gen_range(1..=MAX_FILLER_TERMS);
        for j in 0..fillers {
            perturbed.insert(format!("random_term_{j}_{run_id}"), 1);
        }
    }
    perturbed
}

/// Runs the plain retrieval once, then `num_runs - 1` more times against
/// perturbed copies of the claim vector.
///
/// Results depend on `rng`; seed it to make a sample reproducible.
pub fn bootstrap_retrieve<R: Rng + ?Sized>(
    index: &LexicalIndex,
    claim_text: &str,
    k: usize,
    num_runs: usize,
    domain_filter: Option<&str>,
    rng: &mut R,
) -> Result<Vec<BootstrapRun>, StoreError> {
    let base = index.vectorize(claim_text);
    let mut runs = Vec::with_capacity(num_runs);
    for run_id in 0..num_runs {
        let query = if run_id == 0 {
            base.clone()
        } else {
            perturb_term_vector(&base, run_id, rng)
        };
        let evidence = index.query(&query, k, domain_filter)?;
        runs.push(BootstrapRun {
            run_id,
            query,
            evidence,
        });
    }
    log::debug!(
        "bootstrap retrieval: runs={}, k={k}, domain_filter={domain_filter:?}",
        runs.len()
    );
    Ok(runs)
}

/// How many runs each passage appeared in.
pub fn passage_stability(runs: &[BootstrapRun]) -> BTreeMap<String, usize> {
    let mut appearances = BTreeMap::new();
    for run in runs {
        for item in &run.evidence {
            *appearances
                .entry(item.passage.passage_id.clone())
                .or_insert(0) += 1;
        }
    }
    appearances
}
