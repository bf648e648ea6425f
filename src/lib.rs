//! Dominant-colour extraction via parallel k-means clustering in RGB space.
//!
//! Pixels are seeded into `k` clusters by an injectable sampler, refined for
//! a fixed number of assign/recompute rounds, and the final centroids are
//! rounded back to 8-bit colours.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

pub mod cluster;
pub mod engine;
pub mod pixels;
pub mod sampling;

pub use cluster::{Cluster, Recompute, Tally};
pub use engine::{
    assign_pixels, distance, nearest_centroid, round_centroid, round_channel, KMeansConfig,
    KMeansEngine, RunOutcome,
};
pub use pixels::{decode_image, format_pixels, load_pixels, RawImage};
pub use sampling::{FixedSeeds, RandomSampler, SeedSampler};

/// Number of colour channels per pixel.
pub const CHANNELS: usize = 3;

/// One RGB pixel.
pub type Pixel = [u8; CHANNELS];

/// A point in continuous RGB space.
pub type Centroid = [f64; CHANNELS];

/// A rounded centroid, reported as one of the dominant colours.
pub type DominantColour = [u8; CHANNELS];

/// Error type used by operations in this crate.
#[derive(Debug, Error)]
pub enum KMeansError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Convenient alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, KMeansError>;

/// A cluster received no pixels, so its centroid was left where it was.
///
/// Recorded in [`RunOutcome::empty_clusters`]; it never aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cluster {cluster} received no pixels in iteration {iteration}; centroid retained")]
pub struct EmptyCluster {
    pub iteration: usize,
    pub cluster: usize,
}

/// Format a colour as `#rrggbb`.
pub fn to_hex(colour: &DominantColour) -> String {
    format!("#{:02x}{:02x}{:02x}", colour[0], colour[1], colour[2])
}

/// Write one CSV row per pixel: its position, RGB value, cluster index and
/// the hex colour of that cluster. Only the header is written when no
/// iteration ran.
pub fn write_assignments<W: std::io::Write>(
    writer: W,
    pixels: &[Pixel],
    outcome: &RunOutcome,
) -> Result<()> {
    if !outcome.assignments.is_empty() && outcome.assignments.len() != pixels.len() {
        return Err(KMeansError::InvalidInput(format!(
            "{} assignments for {} pixels",
            outcome.assignments.len(),
            pixels.len()
        )));
    }
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["index", "r", "g", "b", "cluster", "colour"])?;
    for (idx, (pixel, &cluster)) in pixels.iter().zip(&outcome.assignments).enumerate() {
        let colour = outcome.colours.get(cluster).ok_or_else(|| {
            KMeansError::InvalidInput(format!("pixel {idx} assigned to unknown cluster {cluster}"))
        })?;
        writer.write_record([
            idx.to_string(),
            pixel[0].to_string(),
            pixel[1].to_string(),
            pixel[2].to_string(),
            cluster.to_string(),
            to_hex(colour),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Generate `n` uniformly random pixels.
pub fn generate_pixels<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Pixel> {
    (0..n).map(|_| [rng.gen(), rng.gen(), rng.gen()]).collect()
}

/// Generate Gaussian blobs of `n_per_cluster` pixels around each centre,
/// laid out centre by centre. Channels are clamped to `0..=255`.
pub fn generate_clustered_pixels<R: Rng + ?Sized>(
    n_per_cluster: usize,
    centres: &[Pixel],
    spread: f64,
    rng: &mut R,
) -> Result<Vec<Pixel>> {
    if !(spread >= 0.0 && spread.is_finite()) {
        return Err(KMeansError::InvalidConfig(format!(
            "spread must be finite and non-negative, got {spread}"
        )));
    }
    let normal = Normal::new(0.0, spread)
        .map_err(|err| KMeansError::InvalidConfig(format!("invalid spread {spread}: {err}")))?;
    let mut pixels = Vec::with_capacity(n_per_cluster * centres.len());
    for centre in centres {
        for _ in 0..n_per_cluster {
            pixels.push(centre.map(|c| {
                let value = f64::from(c) + normal.sample(rng);
                value.round().clamp(0.0, 255.0) as u8
            }));
        }
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn hex_formatting() {
        assert_eq!(to_hex(&[255, 0, 16]), "#ff0010");
        assert_eq!(to_hex(&[0, 0, 0]), "#000000");
    }

    #[test]
    fn clustered_pixels_are_grouped_by_centre() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let centres = [[10, 10, 10], [240, 240, 240]];
        let pixels = generate_clustered_pixels(50, &centres, 2.0, &mut rng).expect("pixels");
        assert_eq!(pixels.len(), 100);
        assert!(pixels[..50].iter().all(|p| p.iter().all(|&c| c < 40)));
        assert!(pixels[50..].iter().all(|p| p.iter().all(|&c| c > 210)));
    }

    #[test]
    fn negative_spread_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let err = generate_clustered_pixels(5, &[[0, 0, 0]], -1.0, &mut rng).unwrap_err();
        assert!(matches!(err, KMeansError::InvalidConfig(_)));
    }

    #[test]
    fn non_finite_spread_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for spread in [f64::NAN, f64::INFINITY] {
            let err = generate_clustered_pixels(5, &[[0, 0, 0]], spread, &mut rng).unwrap_err();
            assert!(matches!(err, KMeansError::InvalidConfig(_)));
        }
        assert!(generate_clustered_pixels(5, &[[9, 9, 9]], 0.0, &mut rng)
            .expect("zero spread")
            .iter()
            .all(|p| *p == [9, 9, 9]));
    }

    #[test]
    fn assignments_csv_carries_pixel_colours() {
        let pixels = [[0, 0, 0], [2, 2, 2], [250, 250, 250]];
        let engine = KMeansEngine::new(2, 1).expect("valid config");
        let outcome = engine
            .run(&pixels, &mut FixedSeeds(vec![0, 2]))
            .expect("run succeeds");

        let mut buf = Vec::new();
        write_assignments(&mut buf, &pixels, &outcome).expect("csv written");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "index,r,g,b,cluster,colour\n\
             0,0,0,0,0,#010101\n\
             1,2,2,2,0,#010101\n\
             2,250,250,250,1,#fafafa\n"
        );
    }

    #[test]
    fn assignments_csv_is_header_only_without_iterations() {
        let pixels = [[5, 6, 7]];
        let engine = KMeansEngine::new(1, 0).expect("valid config");
        let outcome = engine
            .run(&pixels, &mut FixedSeeds(vec![0]))
            .expect("run succeeds");
        let mut buf = Vec::new();
        write_assignments(&mut buf, &pixels, &outcome).expect("csv written");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "index,r,g,b,cluster,colour\n");

        let err = write_assignments(Vec::new(), &[], &RunOutcome {
            assignments: vec![0],
            ..outcome
        })
        .unwrap_err();
        assert!(matches!(err, KMeansError::InvalidInput(_)));
    }

    #[test]
    fn empty_cluster_message_names_the_cluster() {
        let event = EmptyCluster {
            iteration: 2,
            cluster: 1,
        };
        assert_eq!(
            event.to_string(),
            "cluster 1 received no pixels in iteration 2; centroid retained"
        );
    }
}
