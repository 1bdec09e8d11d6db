//! trace-downstream - follow D8 flow paths from seed points

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rivulet_algorithms::hydrology::{
    into_collection, trace_all, BuildParams, CyclePolicy, D8Encoding, ElevationNoData, FlowDirectionGrid,
    FlowDirectionLoader, FlowGridParams, Seed, TraceDownstreamParams, TraceParams, TraceRequest,
    TraceState,
};
use rivulet_core::io::{read_geotiff, write_geojson};
use rivulet_core::vector::FeatureCollection;
use rivulet_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

/// Trace the downstream flow path from seed points over a D8 flow direction raster
#[derive(Parser, Debug)]
#[command(name = "trace-downstream")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("seeds").required(true).multiple(true).args(["seed", "seed_cell"])))]
struct Cli {
    /// D8 flow direction raster (single-band GeoTIFF)
    #[arg(long)]
    flowdir: PathBuf,

    /// Seed point "x,y" in the raster's CRS (repeatable)
    #[arg(long, value_name = "X,Y", allow_hyphen_values = true)]
    seed: Vec<String>,

    /// Seed cell "row,col" (repeatable, traced after point seeds)
    #[arg(long, value_name = "ROW,COL")]
    seed_cell: Vec<String>,

    /// Elevation raster to drape the paths onto
    #[arg(long)]
    elevation: Option<PathBuf>,

    /// Output GeoJSON file
    #[arg(short, long)]
    output: PathBuf,

    /// Direction encoding: esri, taudem, whitebox, grass, or 8 codes for E,SE,S,SW,W,NW,N,NE
    #[arg(short, long, default_value = "esri")]
    encoding: String,

    /// Codes marking sinks, comma separated
    #[arg(long, value_name = "CODES", allow_hyphen_values = true)]
    sink_codes: Option<String>,

    /// No-data value overriding the one stored in the flow direction raster
    #[arg(long, allow_hyphen_values = true)]
    nodata: Option<f64>,

    /// What to do when a path loops: flag, error
    #[arg(long, default_value = "flag")]
    on_cycle: String,

    /// What to do when the path crosses elevation no-data: fail, carry
    #[arg(long, default_value = "fail")]
    elevation_nodata: String,

    /// Sample elevation by location when it is not on the flow direction grid
    #[arg(long)]
    resample: bool,

    /// Start point-seeded paths at the seed coordinate instead of its cell center
    #[arg(long)]
    keep_seed_location: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    // Only fails if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_flow_grid(path: &PathBuf, params: FlowGridParams) -> Result<FlowDirectionGrid> {
    let pb = spinner("Reading flow direction raster...");
    let encoding = params.encoding.name().to_string();
    let grid = FlowDirectionLoader::new(params)
        .load(path)
        .with_context(|| format!("Failed to read flow direction raster {}", path.display()))?;
    pb.finish_and_clear();
    info!(
        "Flow direction: {} x {} ({} encoding)",
        grid.cols(),
        grid.rows(),
        encoding
    );
    Ok(grid)
}

fn read_elevation(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading elevation raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read elevation raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Elevation: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(collection: &FeatureCollection, path: &PathBuf) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geojson(collection, path)
        .with_context(|| format!("Failed to write output {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn parse_pair<T: std::str::FromStr>(s: &str, what: &str) -> Result<(T, T)>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        anyhow::bail!("{} must be two comma-separated values, got: {}", what, s);
    }
    let a = parts[0].parse().with_context(|| format!("Invalid {}: {}", what, s))?;
    let b = parts[1].parse().with_context(|| format!("Invalid {}: {}", what, s))?;
    Ok((a, b))
}

fn parse_seeds(points: &[String], cells: &[String]) -> Result<Vec<Seed>> {
    let mut seeds = Vec::with_capacity(points.len() + cells.len());
    for p in points {
        let (x, y) = parse_pair::<f64>(p, "seed point")?;
        seeds.push(Seed::Point { x, y });
    }
    for c in cells {
        let (row, col) = parse_pair::<usize>(c, "seed cell")?;
        seeds.push(Seed::Cell { row, col });
    }
    Ok(seeds)
}

fn parse_sink_codes(s: &str) -> Result<Vec<i64>> {
    s.split(',')
        .map(|code| {
            code.trim()
                .parse()
                .with_context(|| format!("Invalid sink code: {}", code))
        })
        .collect()
}

fn parse_encoding(encoding: &str, sink_codes: Option<&str>) -> Result<D8Encoding> {
    let encoding: D8Encoding = encoding.parse().context("Invalid --encoding")?;
    match sink_codes {
        Some(codes) => Ok(encoding
            .with_sink_codes(parse_sink_codes(codes)?)
            .context("Invalid --sink-codes")?),
        None => Ok(encoding),
    }
}

/// Exit code for a rejected command line: 0 for --help / --version output
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    use rivulet_core::Error;
    match err.chain().find_map(|e| e.downcast_ref::<Error>()) {
        Some(Error::InvalidRaster { .. }) => 2,
        Some(Error::SeedOutOfBounds { .. }) => 3,
        Some(Error::CyclicFlow { .. }) => 4,
        Some(Error::GridMismatch { .. }) => 5,
        Some(Error::ElevationSample { .. }) => 6,
        _ => 1,
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn run(cli: Cli) -> Result<()> {
    let encoding = parse_encoding(&cli.encoding, cli.sink_codes.as_deref())?;
    let cycle_policy: CyclePolicy = cli.on_cycle.parse().context("Invalid --on-cycle")?;
    let elevation_nodata: ElevationNoData = cli
        .elevation_nodata
        .parse()
        .context("Invalid --elevation-nodata")?;
    let seeds = parse_seeds(&cli.seed, &cli.seed_cell)?;
    debug!("Encoding: {}", encoding);

    let grid = Arc::new(read_flow_grid(
        &cli.flowdir,
        FlowGridParams {
            encoding,
            nodata: cli.nodata,
        },
    )?);
    let mut request = TraceRequest::new(grid, seeds);
    if let Some(path) = &cli.elevation {
        request = request.with_elevation(Arc::new(read_elevation(path)?));
    }

    let params = TraceDownstreamParams {
        trace: TraceParams { cycle_policy },
        build: BuildParams {
            resample: cli.resample,
            elevation_nodata,
            seed_location: None,
        },
        keep_seed_location: cli.keep_seed_location,
    };

    let start = Instant::now();
    let outcomes = trace_all(&request, &params).context("Failed to trace flow paths")?;
    let elapsed = start.elapsed();

    for outcome in &outcomes {
        let path = &outcome.path;
        let (seed_row, seed_col) = path.seed();
        let (end_row, end_col) = path.terminal();
        info!(
            "Seed {}: ({}, {}) -> ({}, {}), {} cells, {}",
            outcome.seed_index,
            seed_row,
            seed_col,
            end_row,
            end_col,
            path.len(),
            path.state()
        );
        if path.state() == TraceState::CycleDetected {
            if let Some((row, col)) = path.revisited() {
                warn!(
                    "Seed {}: flow loops back to cell ({}, {})",
                    outcome.seed_index, row, col
                );
            }
        }
    }
    let collection = into_collection(&request, outcomes);

    write_result(&collection, &cli.output)?;
    println!("Flow paths saved to: {}", cli.output.display());
    println!("  Paths: {}", collection.len());
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(usage_exit_code(&err));
        }
    };
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
