use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docsearch_core::config::HybridSettings;
use docsearch_core::context::RequestContext;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::IndexHandle;
use docsearch_core::types::{DocType, HitSource, IndexKind, MergedHit, ScoredHit};

use crate::merge::{merge_ranked, single_source, HybridWeights};

#[derive(Debug, Clone, Copy)]
pub struct HybridConfig {
    pub weights: HybridWeights,
    pub overfetch_factor: usize,
    pub leg_timeout: Duration,
}

impl Default for HybridConfig {
    fn default() -> Self { Self::from(&HybridSettings::default()) }
}

impl From<&HybridSettings> for HybridConfig {
    fn from(s: &HybridSettings) -> Self {
        Self {
            weights: HybridWeights { lexical: s.lexical_weight, vector: s.vector_weight },
            overfetch_factor: s.overfetch_factor.max(1),
            leg_timeout: s.leg_timeout(),
        }
    }
}

/// Why a leg contributed nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegError {
    pub kind: IndexKind,
    pub code: String,
    pub message: String,
}

impl LegError {
    fn new(kind: IndexKind, err: &Error) -> Self {
        Self { kind, code: err.code().to_string(), message: err.to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HybridOutcome {
    pub hits: Vec<MergedHit>,
    /// Only one source produced results (the other is missing, failed or timed out).
    pub degraded: bool,
    pub leg_errors: Vec<LegError>,
}

pub struct HybridRetrievalEngine {
    config: HybridConfig,
}

impl HybridRetrievalEngine {
    pub fn new(config: HybridConfig) -> Self { Self { config } }

    pub fn config(&self) -> &HybridConfig { &self.config }

    /// Run the lexical and vector legs concurrently and merge them.
    ///
    /// A leg that is absent, errors, or exceeds its timeout leaves the other
    /// leg's hits as a degraded result. Fails only when neither leg is
    /// present or both legs fail.
    pub async fn search(
        &self,
        lexical: Option<&dyn IndexHandle>,
        vector: Option<&dyn IndexHandle>,
        query: &str,
        k: usize,
        weights: Option<HybridWeights>,
        ctx: &RequestContext,
    ) -> Result<HybridOutcome> {
        let weights = weights.unwrap_or(self.config.weights);
        weights.validate()?;
        if lexical.is_none() && vector.is_none() {
            return Err(Error::IndexUnavailable { doc_id: String::new(), kind: IndexKind::Lexical });
        }
        if k == 0 {
            return Ok(HybridOutcome { degraded: lexical.is_none() || vector.is_none(), ..HybridOutcome::default() });
        }
        let started = Instant::now();
        let top = k.saturating_mul(self.config.overfetch_factor);
        let leg_ctx = ctx.clone().with_timeout(self.config.leg_timeout);

        let lexical_leg = async {
            match lexical {
                Some(h) => Some(leg_ctx.run("lexical leg", h.search_doc_type(query, top, DocType::Chunk)).await),
                None => None,
            }
        };
        let vector_leg = async {
            match vector {
                Some(h) => Some(leg_ctx.run("vector leg", h.search(query, top)).await),
                None => None,
            }
        };
        let (lex, vec) = tokio::join!(lexical_leg, vector_leg);

        let mut failures = Vec::new();
        let lex = settle(lex, IndexKind::Lexical, &mut failures);
        let vec = settle(vec, IndexKind::TextVector, &mut failures);
        let leg_errors: Vec<LegError> = failures.iter().map(|(kind, e)| LegError::new(*kind, e)).collect();

        let outcome = match (lex, vec) {
            (Some(l), Some(v)) => HybridOutcome { hits: merge_ranked(&l, &v, weights, k), degraded: false, leg_errors },
            (Some(l), None) => HybridOutcome { hits: single_source(&l, HitSource::Lexical, k), degraded: true, leg_errors },
            (None, Some(v)) => HybridOutcome { hits: single_source(&v, HitSource::Vector, k), degraded: true, leg_errors },
            (None, None) => {
                // Every present leg failed; surface the first failure.
                return Err(failures
                    .into_iter()
                    .next()
                    .map_or(Error::IndexUnavailable { doc_id: String::new(), kind: IndexKind::Lexical }, |(_, e)| e));
            }
        };
        debug!(hits = outcome.hits.len(), degraded = outcome.degraded, elapsed_ms = started.elapsed().as_millis() as u64, "hybrid search");
        Ok(outcome)
    }
}

fn settle(leg: Option<Result<Vec<ScoredHit>>>, kind: IndexKind, failures: &mut Vec<(IndexKind, Error)>) -> Option<Vec<ScoredHit>> {
    match leg? {
        Ok(hits) => Some(hits),
        Err(e) => {
            warn!(%kind, error = %e, "hybrid leg failed; degrading");
            failures.push((kind, e));
            None
        }
    }
}
