// src/repository/allocation.rs
//! Category quota allocation for the candidate pool.
//!
//! Each category gets `floor(total * share)` (the last one takes the remainder), capped by
//! what is available. The resulting shortfall is handed to categories with spare rows in
//! proportion to their spare capacity.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::CategoryShare;
use crate::model::CandidateArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryQuota {
    pub category_id: i32,
    pub available: usize,
    pub target: usize,
    pub adjusted: usize,
    pub allocated: usize,
}

pub fn allocate(
    total: usize,
    shares: &[CategoryShare],
    available: &HashMap<i32, usize>,
) -> Vec<CategoryQuota> {
    let mut assigned = 0usize;
    let mut quotas: Vec<CategoryQuota> = shares
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let target = if i + 1 == shares.len() {
                total.saturating_sub(assigned)
            } else {
                (total as f64 * s.share).floor() as usize
            };
            assigned += target;
            let avail = available.get(&s.id).copied().unwrap_or(0);
            let adjusted = avail.min(target);
            CategoryQuota {
                category_id: s.id,
                available: avail,
                target,
                adjusted,
                allocated: adjusted,
            }
        })
        .collect();

    let shortfall: usize = quotas.iter().map(|q| q.target - q.adjusted).sum();
    let total_excess: usize = quotas.iter().map(|q| q.available - q.adjusted).sum();
    if shortfall > 0 && total_excess > 0 {
        for q in &mut quotas {
            let excess = q.available - q.adjusted;
            q.allocated += excess * shortfall / total_excess;
        }
    }
    quotas
}

/// Keep the first `allocated` rows of each category, ranked by source count (desc) with
/// random tie order, then shuffle the combined result.
pub fn apply_quotas<R: Rng + ?Sized>(
    rows: Vec<CandidateArticle>,
    quotas: &[CategoryQuota],
    rng: &mut R,
) -> Vec<CandidateArticle> {
    let mut by_cat: HashMap<i32, Vec<CandidateArticle>> = HashMap::new();
    for row in rows {
        by_cat.entry(row.category.id()).or_default().push(row);
    }

    let mut out = Vec::new();
    for q in quotas {
        let Some(mut rows) = by_cat.remove(&q.category_id) else {
            continue;
        };
        rows.shuffle(rng);
        rows.sort_by(|a, b| b.source_count.cmp(&a.source_count));
        rows.truncate(q.allocated);
        out.extend(rows);
    }
    out.shuffle(rng);
    out
}

pub fn count_by_category(rows: &[CandidateArticle]) -> HashMap<i32, usize> {
    let mut counts = HashMap::new();
    for r in rows {
        *counts.entry(r.category.id()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shares() -> Vec<CategoryShare> {
        vec![
            CategoryShare { id: 1, share: 0.5 },
            CategoryShare { id: 2, share: 0.4 },
            CategoryShare { id: 3, share: 0.1 },
        ]
    }

    #[test]
    fn plenty_available_uses_plain_targets() {
        let avail = HashMap::from([(1, 500), (2, 500), (3, 500)]);
        let q = allocate(120, &shares(), &avail);
        let got: Vec<_> = q.iter().map(|q| q.allocated).collect();
        assert_eq!(got, vec![60, 48, 12]);
    }

    #[test]
    fn shortfall_is_redistributed_by_spare_capacity() {
        // cat 3 has only 2 rows -> shortfall 10, spread over the spare rows of cats 1 and 2
        let avail = HashMap::from([(1, 80), (2, 68), (3, 2)]);
        let q = allocate(120, &shares(), &avail);
        // excess: cat1 20, cat2 20 -> each gets 20 * 10 / 40 = 5
        assert_eq!(q[0].allocated, 65);
        assert_eq!(q[1].allocated, 53);
        assert_eq!(q[2].allocated, 2);
    }

    #[test]
    fn empty_category_counts_toward_shortfall() {
        let avail = HashMap::from([(1, 100), (2, 100)]);
        let q = allocate(120, &shares(), &avail);
        // shortfall 12 over excess 40 + 52, floored per category
        assert_eq!(q[0].allocated, 65);
        assert_eq!(q[1].allocated, 54);
        assert_eq!(q[2].allocated, 0);
    }

    #[test]
    fn quotas_keep_highest_source_counts() {
        let rows: Vec<_> = (1..=6)
            .map(|i| {
                CandidateArticle::new(i, format!("https://a.com/{i}"), "t")
                    .with_source_count(i as u32)
                    .with_category(Category::World)
            })
            .collect();
        let quotas = allocate(3, &[CategoryShare { id: 1, share: 1.0 }], &count_by_category(&rows));
        let mut kept: Vec<_> = apply_quotas(rows, &quotas, &mut StdRng::seed_from_u64(5))
            .into_iter()
            .map(|c| c.feed_id)
            .collect();
        kept.sort();
        assert_eq!(kept, vec![4, 5, 6]);
    }
}
