//! Strategies for choosing the initial centroids.

use rand::seq::index::sample;
use rand::Rng;

use crate::{KMeansError, Result};

/// Picks which pixels seed the clusters.
///
/// Implementations return `k` distinct indices into a population of
/// `population` pixels. The engine checks the answer before using it.
pub trait SeedSampler {
    fn sample(&mut self, population: usize, k: usize) -> Vec<usize>;
}

/// Uniform sampling without replacement driven by any [`Rng`].
#[derive(Debug, Clone)]
pub struct RandomSampler<R> {
    rng: R,
}

impl<R: Rng> RandomSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl<R: Rng> SeedSampler for RandomSampler<R> {
    fn sample(&mut self, population: usize, k: usize) -> Vec<usize> {
        sample(&mut self.rng, population, k.min(population)).into_vec()
    }
}

/// Hands back a predetermined list of seed indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSeeds(pub Vec<usize>);

impl SeedSampler for FixedSeeds {
    fn sample(&mut self, _population: usize, _k: usize) -> Vec<usize> {
        self.0.clone()
    }
}

/// Reject seed lists that are the wrong length, out of range or repeat an index.
pub(crate) fn check_seeds(seeds: &[usize], population: usize, k: usize) -> Result<()> {
    if seeds.len() != k {
        return Err(KMeansError::InvalidInput(format!(
            "sampler returned {} seeds but k = {k}",
            seeds.len()
        )));
    }
    let mut sorted = seeds.to_vec();
    sorted.sort_unstable();
    if let Some(&idx) = sorted.last().filter(|&&idx| idx >= population) {
        return Err(KMeansError::InvalidInput(format!(
            "seed index {idx} is outside a population of {population} pixels"
        )));
    }
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(KMeansError::InvalidInput(format!(
            "seed index {} was sampled more than once",
            pair[0]
        )));
    }
    Ok(())
}
