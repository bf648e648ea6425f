//! A single k-means cluster: one centroid plus the pixels assigned to it
//! during the current iteration.

use crate::{Centroid, Pixel, CHANNELS};

/// Running per-channel sum and count of the pixels assigned to a cluster.
///
/// Worker threads fold pixels into their own tallies; the partial tallies
/// are then merged, so the assignment step needs no locking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    /// Per-channel sum over assigned pixels.
    pub sum: [f64; CHANNELS],
    /// Number of assigned pixels.
    pub count: usize,
}

impl Tally {
    /// Add one pixel to the tally.
    pub fn add(&mut self, pixel: &Pixel) {
        for (acc, &value) in self.sum.iter_mut().zip(pixel.iter()) {
            *acc += f64::from(value);
        }
        self.count += 1;
    }

    /// Fold another partial tally into this one.
    pub fn merge(&mut self, other: &Tally) {
        for (acc, value) in self.sum.iter_mut().zip(other.sum.iter()) {
            *acc += value;
        }
        self.count += other.count;
    }

    /// Per-channel mean, or `None` when nothing was tallied.
    pub fn mean(&self) -> Option<Centroid> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(self.sum.map(|s| s / n))
    }
}

/// Result of [`Cluster::recompute_centroid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recompute {
    /// The centroid moved to the mean of the assigned pixels.
    Updated(Centroid),
    /// No pixels were assigned; the previous centroid was kept.
    Empty(Centroid),
}

impl Recompute {
    /// The centroid after recomputation, whichever branch was taken.
    pub fn centroid(&self) -> Centroid {
        match *self {
            Recompute::Updated(c) | Recompute::Empty(c) => c,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Recompute::Empty(_))
    }
}

/// A centroid and its transient assignment for the current iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    centroid: Centroid,
    assigned: Tally,
}

impl Cluster {
    /// Create a cluster seeded at `pixel`.
    pub fn seeded(pixel: &Pixel) -> Self {
        Self::new(pixel.map(f64::from))
    }

    pub fn new(centroid: Centroid) -> Self {
        Self {
            centroid,
            assigned: Tally::default(),
        }
    }

    pub fn centroid(&self) -> Centroid {
        self.centroid
    }

    /// Number of pixels assigned since the last recomputation.
    pub fn len(&self) -> usize {
        self.assigned.count
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.count == 0
    }

    /// Assign one pixel to this cluster. Channel ranges are not checked.
    pub fn add_point(&mut self, pixel: &Pixel) {
        self.assigned.add(pixel);
    }

    /// Merge a partial tally produced by a worker thread.
    pub fn absorb(&mut self, tally: &Tally) {
        self.assigned.merge(tally);
    }

    /// Move the centroid to the mean of the assigned pixels and clear the
    /// assignment. An empty assignment leaves the centroid untouched.
    pub fn recompute_centroid(&mut self) -> Recompute {
        let outcome = match self.assigned.mean() {
            Some(mean) => {
                self.centroid = mean;
                Recompute::Updated(mean)
            }
            None => Recompute::Empty(self.centroid),
        };
        self.assigned = Tally::default();
        outcome
    }
}
