use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::metadata::{FileRecord, MetaValue, MetadataNormalizer};
use crate::core::weights::{WeightingSystem, Weights};

/// Score of one file pair under one weighting system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// Batch position of the first file, always lower than `second`.
    pub first: usize,
    pub second: usize,
    pub file1: String,
    pub file2: String,
    pub system: WeightingSystem,
    pub score: u64,
    pub matching_keys: BTreeMap<String, MetaValue>,
}

/// Pairwise weighted metadata comparison.
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    normalizer: MetadataNormalizer,
    weights: Weights,
}

impl SimilarityEngine {
    pub fn new(normalizer: MetadataNormalizer, weights: Weights) -> Self {
        Self {
            normalizer,
            weights,
        }
    }

    /// Keys present in both records with equal values, mapped to that value.
    pub fn matching_keys(&self, a: &FileRecord, b: &FileRecord) -> BTreeMap<String, MetaValue> {
        let (small, large) = if a.metadata.len() <= b.metadata.len() {
            (a, b)
        } else {
            (b, a)
        };

        small
            .metadata
            .iter()
            .filter(|(key, value)| self.normalizer.is_present(key, value))
            .filter_map(|(key, value)| {
                let other = large.metadata.get(key)?;
                (self.normalizer.is_present(key, other) && other == value)
                    .then(|| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Score every system for one pair from a single matching-key pass.
    pub fn compare_pair(
        &self,
        a: &FileRecord,
        b: &FileRecord,
        systems: &[WeightingSystem],
    ) -> Vec<(WeightingSystem, u64, BTreeMap<String, MetaValue>)> {
        let matching = self.matching_keys(a, b);
        let mut scores = vec![0u64; systems.len()];
        for key in matching.keys() {
            for (score, system) in scores.iter_mut().zip(systems) {
                *score += u64::from(self.weights.weight(*system, key));
            }
        }

        systems
            .iter()
            .zip(scores)
            .map(|(system, score)| (*system, score, matching.clone()))
            .collect()
    }

    /// Compare every unordered pair `(i, j)`, `i < j`, under every system.
    ///
    /// Produces exactly `C(n, 2) * systems` rows, including pairs without any
    /// shared key (score 0, no matching keys). Rows are ordered by `i`, then
    /// `j`, then the order of `systems` with duplicates removed.
    pub fn compare_all(
        &self,
        records: &[FileRecord],
        systems: &[WeightingSystem],
    ) -> Vec<SimilarityResult> {
        let mut active: Vec<WeightingSystem> = Vec::with_capacity(systems.len());
        for system in systems {
            if !active.contains(system) {
                active.push(*system);
            }
        }

        let n = records.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        log::debug!(
            "Comparing {} pairs under {} weighting systems",
            pairs.len(),
            active.len()
        );

        let mut results: Vec<(usize, SimilarityResult)> = pairs
            .par_iter()
            .flat_map_iter(|&(i, j)| {
                let (a, b) = (&records[i], &records[j]);
                self.compare_pair(a, b, &active)
                    .into_iter()
                    .enumerate()
                    .map(move |(order, (system, score, matching_keys))| {
                        (
                            order,
                            SimilarityResult {
                                first: i,
                                second: j,
                                file1: a.name.clone(),
                                file2: b.name.clone(),
                                system,
                                score,
                                matching_keys,
                            },
                        )
                    })
            })
            .collect();

        results.sort_by_key(|(order, r)| (r.first, r.second, *order));
        results.into_iter().map(|(_, r)| r).collect()
    }
}
