//! Pointflat - analyze a netCDF point dataset and print its flattened observations.

use anyhow::{Context, Result};
use clap::Parser;
use pointflat::{AnalyzerConfig, ConventionRegistry, FeatureCollection, FeatureType, NetcdfDataset, TableAnalyzer};
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pointflat")]
#[command(about = "Flatten netCDF point, station, profile and trajectory data", long_about = None)]
struct Args {
    /// Path to the NetCDF file
    file: PathBuf,

    /// Feature type wanted (point, station, profile, trajectory, station_profile, section)
    #[arg(long = "feature-type", value_name = "TYPE")]
    feature_type: Option<String>,

    /// Print the table analysis
    #[arg(long)]
    show: bool,

    /// Maximum number of observations printed per nested table
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Write logs to the specified file instead of stderr
    #[arg(long)]
    log: Option<PathBuf>,
}

fn init_logging(log: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        },
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_ref())?;
    tracing::info!("Starting pointflat on {}", args.file.display());

    if !args.file.exists() {
        anyhow::bail!("Path not found: {}", args.file.display());
    }

    let wanted = args
        .feature_type
        .as_deref()
        .map(str::parse::<FeatureType>)
        .transpose()?;

    let ds = NetcdfDataset::open(&args.file).with_context(|| format!("Failed to open {}", args.file.display()))?;
    let config = AnalyzerConfig {
        wanted,
        ..AnalyzerConfig::default()
    };
    let registry = ConventionRegistry::with_builtins();
    let analyzer = TableAnalyzer::factory(Rc::new(ds), &registry, &config)
        .with_context(|| format!("No point features in {}", args.file.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.show {
        write!(out, "{}", analyzer.show())?;
    }

    for nt in analyzer.nested_tables() {
        let collection = FeatureCollection::new(Rc::clone(nt))?;
        writeln!(out, "{} {}", collection.feature_type(), nt.name())?;
        for point in collection.flatten(None)?.take(args.limit) {
            writeln!(out, "  {}", point?)?;
        }
    }

    tracing::info!("pointflat done");
    Ok(())
}
