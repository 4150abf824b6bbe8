//! Command line front end: database builds and annotation queries.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use landmarks::{build_with_config, AnnotationEngine, Config, LabelHierarchy, PointTable};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "landmarks")]
#[command(about = "Build a hierarchical POI database and annotate coordinates with it")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and consolidate raw partition data into the database
    Build {
        /// Database root containing raw/ and label_hierarchy.csv
        #[arg(short, long)]
        root: PathBuf,

        /// Discard previous extracts and combined datasets first
        #[arg(long)]
        fresh: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Nearest label for a single location
    Point {
        #[arg(short, long)]
        root: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Labels inside or overlapping a polygon
    Shape {
        #[arg(short, long)]
        root: PathBuf,

        /// Comma separated vertex latitudes
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        lats: Vec<f64>,

        /// Comma separated vertex longitudes
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        lons: Vec<f64>,
    },

    /// Nearest label for every row of a CSV file
    Batch {
        #[arg(short, long)]
        root: PathBuf,

        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "lat")]
        lat_col: String,

        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Write the normalized form of a label hierarchy table
    Labels {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("landmarks=info")))
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Build {
            root,
            fresh,
            no_progress,
        } => {
            let mut build_config = config.build;
            build_config.fresh |= fresh;
            build_config.progress &= !no_progress;

            info!("Building database at {}", root.display());
            let report = build_with_config(&root, &build_config)
                .with_context(|| format!("Failed to build database at {}", root.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Point { root, lat, lon } => {
            let engine = AnnotationEngine::with_config(&root, &config.annotate)?;
            let annotation = engine.annotate_single_point(lat, lon)?;
            println!("{}", serde_json::to_string_pretty(&annotation)?);
        }
        Command::Shape { root, lats, lons } => {
            let engine = AnnotationEngine::with_config(&root, &config.annotate)?;
            match engine.annotate_single_shape(&lats, &lons)? {
                Some(annotation) => println!("{}", serde_json::to_string_pretty(&annotation)?),
                None => info!("Empty shape, nothing to annotate"),
            }
        }
        Command::Batch {
            root,
            input,
            output,
            lat_col,
            lon_col,
        } => {
            let engine = AnnotationEngine::with_config(&root, &config.annotate)?;
            let table = PointTable::from_path(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let Some(annotated) = engine.annotate_batch_points(table, &lat_col, &lon_col)? else {
                info!("Empty input table, nothing to annotate");
                return Ok(());
            };
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    annotated.write_csv(file)?;
                    info!("Wrote {} rows to {}", annotated.len(), path.display());
                }
                None => annotated.write_csv(io::stdout().lock())?,
            }
        }
        Command::Labels { input, output } => {
            let hierarchy = LabelHierarchy::from_path(&input)?;
            hierarchy.write_normalized(&output)?;
            info!(
                "Wrote {} leaves ({} labels) to {}",
                hierarchy.leaf_count(),
                hierarchy.labels.len(),
                output.display()
            );
        }
    }

    Ok(())
}
