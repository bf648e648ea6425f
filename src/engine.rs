//! The fixed-iteration k-means loop.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, Recompute, Tally};
use crate::sampling::{check_seeds, SeedSampler};
use crate::{Centroid, DominantColour, EmptyCluster, KMeansError, Pixel, Result};

/// Configurable knobs for a clustering run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansConfig {
    /// Number of clusters, and therefore of dominant colours returned.
    pub k: usize,
    /// Exact number of assign/recompute rounds. Zero returns the seeds.
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 5,
            max_iterations: 10,
        }
    }
}

impl KMeansConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(KMeansError::InvalidConfig(
                "k must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Rounded centroids in cluster-index order.
    pub colours: Vec<DominantColour>,
    /// Final centroids before rounding.
    pub centroids: Vec<Centroid>,
    /// Cluster index of every pixel from the last iteration.
    /// Empty when no iteration ran.
    pub assignments: Vec<usize>,
    /// Pixels per cluster from the last iteration.
    pub cluster_sizes: Vec<usize>,
    /// Number of completed iterations.
    pub iterations: usize,
    /// Sum of squared distances from each pixel to its cluster's final centroid.
    pub inertia: f64,
    /// Clusters that received no pixels and kept their previous centroid.
    pub empty_clusters: Vec<EmptyCluster>,
}

/// Clusters pixels into a fixed number of dominant colours.
///
/// The engine only holds its configuration, so one instance can serve any
/// number of concurrent [`run`](Self::run) calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KMeansEngine {
    config: KMeansConfig,
}

impl KMeansEngine {
    pub fn new(k: usize, max_iterations: usize) -> Result<Self> {
        Self::from_config(KMeansConfig { k, max_iterations })
    }

    pub fn from_config(config: KMeansConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Cluster `pixels` and return the dominant colours.
    ///
    /// `sampler` chooses the `k` seed pixels. Each iteration assigns every
    /// pixel to its nearest centroid, then recomputes the centroids in
    /// cluster-index order. A cluster left without pixels keeps its centroid
    /// and is reported in [`RunOutcome::empty_clusters`].
    pub fn run<S: SeedSampler + ?Sized>(
        &self,
        pixels: &[Pixel],
        sampler: &mut S,
    ) -> Result<RunOutcome> {
        let k = self.config.k;
        let n = pixels.len();
        if n == 0 {
            return Err(KMeansError::InvalidInput("pixel population is empty".into()));
        }
        if n < k {
            return Err(KMeansError::InvalidInput(format!(
                "population has {n} pixels but k = {k}; add more data or decrease k"
            )));
        }

        let seeds = sampler.sample(n, k);
        check_seeds(&seeds, n, k)?;
        tracing::debug!(?seeds, "sampled seed pixels");
        let clusters = seeds
            .iter()
            .map(|&idx| Cluster::seeded(&pixels[idx]))
            .collect();
        Ok(self.iterate(pixels, clusters))
    }

    /// Like [`run`](Self::run), but start from explicit centroids instead of
    /// sampled pixels. `seeds` must hold exactly `k` centroids, each channel
    /// finite and within `0.0..=255.0`.
    pub fn run_seeded(&self, pixels: &[Pixel], seeds: &[Centroid]) -> Result<RunOutcome> {
        let k = self.config.k;
        if pixels.is_empty() {
            return Err(KMeansError::InvalidInput("pixel population is empty".into()));
        }
        if seeds.len() != k {
            return Err(KMeansError::InvalidInput(format!(
                "got {} seed centroids but k = {k}",
                seeds.len()
            )));
        }
        if let Some((cid, seed)) = seeds
            .iter()
            .enumerate()
            .find(|(_, seed)| !seed.iter().all(|c| (0.0..=255.0).contains(c)))
        {
            return Err(KMeansError::InvalidInput(format!(
                "seed centroid {cid} {seed:?} is outside the 0..=255 channel range"
            )));
        }
        Ok(self.iterate(pixels, seeds.iter().copied().map(Cluster::new).collect()))
    }

    fn iterate(&self, pixels: &[Pixel], mut clusters: Vec<Cluster>) -> RunOutcome {
        let KMeansConfig { k, max_iterations } = self.config;
        let n = pixels.len();

        let mut assignments = Vec::new();
        let mut cluster_sizes = vec![0usize; k];
        let mut empty_clusters = Vec::new();

        for iteration in 0..max_iterations {
            let previous: Vec<Centroid> = clusters.iter().map(Cluster::centroid).collect();
            assignments = assign_pixels(pixels, &previous);
            let tallies = tally_assignments(pixels, &assignments, k);

            let mut max_shift = 0.0f64;
            for (cid, (cluster, tally)) in clusters.iter_mut().zip(&tallies).enumerate() {
                cluster_sizes[cid] = tally.count;
                cluster.absorb(tally);
                match cluster.recompute_centroid() {
                    Recompute::Updated(centroid) => {
                        max_shift = max_shift.max(distance(&previous[cid], &centroid));
                    }
                    Recompute::Empty(_) => {
                        let event = EmptyCluster {
                            iteration,
                            cluster: cid,
                        };
                        tracing::warn!(iteration, cluster = cid, "{event}");
                        empty_clusters.push(event);
                    }
                }
            }
            tracing::debug!(iteration, max_shift, ?cluster_sizes, "iteration complete");
        }

        let centroids: Vec<Centroid> = clusters.iter().map(Cluster::centroid).collect();
        let inertia = inertia_from_assignments(pixels, &assignments, &centroids);
        let colours = centroids.iter().map(round_centroid).collect();
        tracing::info!(
            k,
            pixels = n,
            iterations = max_iterations,
            inertia,
            empty = empty_clusters.len(),
            "clustering finished"
        );

        RunOutcome {
            colours,
            centroids,
            assignments,
            cluster_sizes,
            iterations: max_iterations,
            inertia,
            empty_clusters,
        }
    }
}

/// Index of the centroid nearest to `pixel`.
///
/// Only a strictly smaller distance replaces the current best, so exact ties
/// go to the lowest index.
pub fn nearest_centroid(pixel: &Pixel, centroids: &[Centroid]) -> usize {
    let point = pixel.map(f64::from);
    let mut best = 0usize;
    let mut best_distance = f64::INFINITY;
    for (cid, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(&point, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = cid;
        }
    }
    best
}

/// Nearest-centroid label for every pixel, computed in parallel.
pub fn assign_pixels(pixels: &[Pixel], centroids: &[Centroid]) -> Vec<usize> {
    pixels
        .par_iter()
        .map(|pixel| nearest_centroid(pixel, centroids))
        .collect()
}

/// Per-thread partial tallies, merged pairwise. Channel sums are integral, so
/// the merge order cannot change the result.
fn tally_assignments(pixels: &[Pixel], assignments: &[usize], k: usize) -> Vec<Tally> {
    let zero = vec![Tally::default(); k];
    pixels
        .par_iter()
        .zip(assignments.par_iter())
        .fold(
            || zero.clone(),
            |mut acc, (pixel, &cid)| {
                acc[cid].add(pixel);
                acc
            },
        )
        .reduce(
            || zero.clone(),
            |mut left, right| {
                for (l, r) in left.iter_mut().zip(&right) {
                    l.merge(r);
                }
                left
            },
        )
}

/// Summed in pixel order so the result does not depend on how rayon splits work.
fn inertia_from_assignments(pixels: &[Pixel], assignments: &[usize], centroids: &[Centroid]) -> f64 {
    let distances: Vec<f64> = pixels
        .par_iter()
        .zip(assignments.par_iter())
        .map(|(pixel, &cid)| squared_distance(&pixel.map(f64::from), &centroids[cid]))
        .collect();
    distances.iter().sum()
}

/// Euclidean distance between two points in channel space.
pub fn distance(a: &Centroid, b: &Centroid) -> f64 {
    squared_distance(a, b).sqrt()
}

fn squared_distance(a: &Centroid, b: &Centroid) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Round to the nearest integer, halves away from zero (2.5 becomes 3).
///
/// Centroids are means of `u8` channels or range-checked seeds, so they stay
/// within `0..=255`.
pub fn round_channel(value: f64) -> u8 {
    value.round() as u8
}

pub fn round_centroid(centroid: &Centroid) -> DominantColour {
    centroid.map(round_channel)
}
