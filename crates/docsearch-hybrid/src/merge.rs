use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use docsearch_core::error::{Error, Result};
use docsearch_core::types::{HitSource, LegScore, MergedHit, ScoredHit};

/// Relative weight of each source in the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for HybridWeights {
    fn default() -> Self { Self { lexical: 0.4, vector: 0.6 } }
}

impl HybridWeights {
    pub fn new(lexical: f32, vector: f32) -> Result<Self> {
        let w = Self { lexical, vector };
        w.validate()?;
        Ok(w)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lexical >= 0.0 && self.vector >= 0.0) || self.lexical + self.vector <= 0.0 {
            return Err(Error::InvalidQuery(format!(
                "hybrid weights must be non-negative and not both zero (lexical={}, vector={})",
                self.lexical, self.vector
            )));
        }
        Ok(())
    }

    fn of(&self, source: HitSource) -> f32 {
        match source {
            HitSource::Lexical => self.lexical,
            HitSource::Vector => self.vector,
        }
    }
}

/// Min-max normalise scores into [0, 1]. A list whose scores are all equal
/// (including a single hit) normalises to 1.0. Non-finite scores normalise
/// to 0.0 and do not widen the range.
pub fn normalize(hits: &[ScoredHit]) -> Vec<f32> {
    let (min, max) = hits
        .iter()
        .map(|h| h.score)
        .filter(|s| s.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
    let span = max - min;
    hits.iter()
        .map(|h| match h.score {
            s if !s.is_finite() => 0.0,
            s if span > f32::EPSILON => (s - min) / span,
            _ => 1.0,
        })
        .collect()
}

struct Candidate {
    merged: MergedHit,
    rank_sum: usize,
}

fn leg_scores(hits: &[ScoredHit]) -> Vec<(usize, &ScoredHit, LegScore)> {
    let normalized = normalize(hits);
    let mut seen = HashSet::with_capacity(hits.len());
    let mut out = Vec::with_capacity(hits.len());
    for (rank, (hit, norm)) in hits.iter().zip(normalized).enumerate() {
        // First occurrence wins; lists arrive best-first.
        if !seen.insert(hit.item_id.as_str()) { continue; }
        out.push((rank, hit, LegScore { raw: hit.score, normalized: norm, rank }));
    }
    out
}

/// Weighted consensus merge of two best-first lists.
///
/// Items found by only one source get `weight * normalized` (the missing
/// source contributes 0). Ordering is fully deterministic: combined score
/// desc, then items present in both lists, then lower rank sum, then item id.
pub fn merge_ranked(lexical: &[ScoredHit], vector: &[ScoredHit], weights: HybridWeights, k: usize) -> Vec<MergedHit> {
    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    for (source, hits) in [(HitSource::Lexical, lexical), (HitSource::Vector, vector)] {
        for (rank, hit, leg) in leg_scores(hits) {
            let contribution = weights.of(source) * leg.normalized;
            let entry = by_id.entry(hit.item_id.clone()).or_insert_with(|| Candidate {
                merged: MergedHit { item_id: hit.item_id.clone(), score: 0.0, lexical: None, vector: None, payload: hit.payload.clone() },
                rank_sum: 0,
            });
            entry.merged.score += contribution;
            entry.rank_sum += rank;
            match source {
                HitSource::Lexical => entry.merged.lexical = Some(leg),
                HitSource::Vector => entry.merged.vector = Some(leg),
            }
        }
    }
    let mut candidates: Vec<Candidate> = by_id.into_values().collect();
    candidates.sort_by(compare);
    candidates.into_iter().take(k).map(|c| c.merged).collect()
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.merged.score
        .total_cmp(&a.merged.score)
        .then_with(|| b.merged.in_both().cmp(&a.merged.in_both()))
        .then_with(|| a.rank_sum.cmp(&b.rank_sum))
        .then_with(|| a.merged.item_id.cmp(&b.merged.item_id))
}

/// Emit one source's hits unmerged, in their original order, annotated with
/// that source. Used when the other leg is missing or failed.
pub fn single_source(hits: &[ScoredHit], source: HitSource, k: usize) -> Vec<MergedHit> {
    leg_scores(hits)
        .into_iter()
        .take(k)
        .map(|(_, hit, leg)| MergedHit {
            item_id: hit.item_id.clone(),
            score: leg.normalized,
            lexical: (source == HitSource::Lexical).then_some(leg),
            vector: (source == HitSource::Vector).then_some(leg),
            payload: hit.payload.clone(),
        })
        .collect()
}
