use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use dominant_colours::{
    load_pixels, to_hex, write_assignments, KMeansConfig, KMeansEngine, KMeansError, Pixel,
    RandomSampler, Result as KMeansResult, RunOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "dominant-colours")]
#[command(about = "Approximate the dominant colours of an image with k-means", long_about = None)]
struct Args {
    /// Image to analyse
    image: PathBuf,

    /// Number of dominant colours
    #[arg(short, long, default_value_t = KMeansConfig::default().k)]
    k: usize,

    /// Number of assign/recompute iterations
    #[arg(short, long, default_value_t = KMeansConfig::default().max_iterations)]
    iterations: usize,

    /// RNG seed used to pick the initial centroids
    #[arg(long, default_value_t = 42u64)]
    seed: u64,

    /// Shrink the image so neither side exceeds this many pixels before clustering
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Optional JSON file receiving the colours and run statistics
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optional CSV file listing every pixel's RGB value and cluster
    #[arg(long)]
    assignments: Option<PathBuf>,

    /// Override Rayon global thread pool size
    #[arg(long)]
    threads: Option<usize>,

    /// Verbosity: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = init_logging(&args.log_level) {
        eprintln!("failed to initialise logging: {err}");
    }

    if let Err(err) = run(args) {
        error!(error = %err, "dominant colour extraction failed");
        process::exit(1);
    }
}

fn init_logging(level: &str) -> Result<(), String> {
    let level: tracing::Level = level
        .parse()
        .map_err(|_| format!("unknown log level '{level}', expected trace/debug/info/warn/error"))?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|err| err.to_string())
}

fn run(args: Args) -> KMeansResult<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|err| {
                KMeansError::InvalidConfig(format!("failed to configure rayon threadpool: {err}"))
            })?;
        info!(threads, "configured rayon global thread pool");
    }

    let config = KMeansConfig {
        k: args.k,
        max_iterations: args.iterations,
    };
    let engine = KMeansEngine::from_config(config)?;

    info!(path = ?args.image, "loading image");
    let pixels = load_pixels(&args.image, args.max_dimension)?;
    info!(
        k = config.k,
        max_iterations = config.max_iterations,
        pixels = pixels.len(),
        seed = args.seed,
        "starting dominant colour extraction"
    );

    let mut sampler = RandomSampler::new(ChaCha8Rng::seed_from_u64(args.seed));
    let start = Instant::now();
    let outcome = engine.run(&pixels, &mut sampler)?;
    let elapsed = start.elapsed();
    info!(
        inertia = outcome.inertia,
        iterations = outcome.iterations,
        empty_clusters = outcome.empty_clusters.len(),
        took_seconds = elapsed.as_secs_f64(),
        "clustering finished"
    );
    info!(?outcome.cluster_sizes, "cluster population counts");

    for colour in &outcome.colours {
        println!("{} {:?}", to_hex(colour), colour);
    }

    if let Some(path) = args.output.as_ref() {
        write_result(path, &args, &config, pixels.len(), &outcome, elapsed.as_secs_f64())?;
    }

    if let Some(path) = args.assignments.as_ref() {
        export_assignments(path, &pixels, &outcome)?;
    }

    Ok(())
}

fn write_result(
    path: &Path,
    args: &Args,
    config: &KMeansConfig,
    population: usize,
    outcome: &RunOutcome,
    elapsed_secs: f64,
) -> KMeansResult<()> {
    let hex: Vec<String> = outcome.colours.iter().map(to_hex).collect();
    let empty_clusters: Vec<_> = outcome
        .empty_clusters
        .iter()
        .map(|event| json!({ "iteration": event.iteration, "cluster": event.cluster }))
        .collect();

    let dump = json!({
        "image": args.image.display().to_string(),
        "pixels": population,
        "config": config,
        "seed": args.seed,
        "max_dimension": args.max_dimension,
        "elapsed_seconds": elapsed_secs,
        "iterations": outcome.iterations,
        "inertia": outcome.inertia,
        "cluster_sizes": outcome.cluster_sizes,
        "colours": outcome.colours,
        "hex": hex,
        "centroids": outcome.centroids,
        "empty_clusters": empty_clusters,
        "assignments_path": args.assignments.as_ref().map(|p| p.display().to_string()),
    });

    std::fs::write(path, serde_json::to_string_pretty(&dump)?)?;
    info!(path = ?path, "wrote colour summary");
    Ok(())
}

fn export_assignments(path: &Path, pixels: &[Pixel], outcome: &RunOutcome) -> KMeansResult<()> {
    let file = std::fs::File::create(path)?;
    write_assignments(file, pixels, outcome)?;
    info!(path = ?path, rows = outcome.assignments.len(), "wrote assignments CSV");
    Ok(())
}
