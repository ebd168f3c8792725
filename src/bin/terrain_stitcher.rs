use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use terrain_stitcher::app::{App, NullSink, ProgressSink, create_bounds};
use terrain_stitcher::area::DEFAULT_SHAPE_FILE;
use terrain_stitcher::catalog::M2mHttpClient;
use terrain_stitcher::config::ConfigLoader;
use terrain_stitcher::dedup::validate_threshold;
use terrain_stitcher::domain::{BoundsType, SelectionPolicy};
use terrain_stitcher::error::StitchError;
use terrain_stitcher::fetch::HttpFetcher;
use terrain_stitcher::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "terrain-stitcher")]
#[command(about = "Gather high-resolution aerial ortho imagery around a point")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a shape file describing the area of interest")]
    CreateBounds(CreateBoundsArgs),
    #[command(about = "Search, reduce overlaps and download ortho imagery for a shape file")]
    GatherOrtho(GatherOrthoArgs),
}

#[derive(Args)]
struct CreateBoundsArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: String,

    #[arg(long, allow_hyphen_values = true)]
    lon: String,

    #[arg(long = "type", value_enum, default_value_t = BoundsType::Point)]
    bounds_type: BoundsType,

    #[arg(long, default_value = DEFAULT_SHAPE_FILE)]
    output: PathBuf,
}

#[derive(Args)]
struct GatherOrthoArgs {
    #[arg(long, default_value = DEFAULT_SHAPE_FILE)]
    shape: PathBuf,

    /// Overlap ratio at or above which two tiles are considered duplicates.
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long, value_enum)]
    selection: Option<SelectionPolicy>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<StitchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &StitchError) -> u8 {
    match error {
        error if error.is_validation() => 2,
        StitchError::ConfigRead(_)
        | StitchError::ConfigParse(_)
        | StitchError::ConfigValue(_)
        | StitchError::MissingCredentials => 2,
        error if error.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::CreateBounds(args) => {
            let result = create_bounds(&args.lat, &args.lon, args.bounds_type, &args.output)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_bounds(&result).into_diagnostic(),
                OutputMode::Interactive => TextOutput::print_bounds(&result).into_diagnostic(),
            }
        }
        Commands::GatherOrtho(args) => run_gather(args, cli.config.as_deref(), output_mode),
    }
}

fn run_gather(
    args: GatherOrthoArgs,
    config_path: Option<&str>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(config_path)?;
    if let Some(threshold) = args.threshold {
        config.overlap_threshold = validate_threshold(threshold)?;
    }
    if let Some(selection) = args.selection {
        config.selection = selection;
    }
    let credentials = config.credentials()?.clone();
    let catalog = M2mHttpClient::new(&config.service_url, config.request_timeout)?;
    let fetcher = HttpFetcher::new(config.request_timeout)?;
    let mut app = App::new(config, catalog, fetcher);

    app.catalog_mut()
        .login(&credentials.username, &credentials.token)?;

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &NullSink,
        OutputMode::Interactive => &TextOutput,
    };
    let gathered = app.gather_ortho(&args.shape, sink);

    if let Err(err) = app.catalog_mut().logout() {
        warn!(%err, "catalog logout failed");
    }

    let result = gathered?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_gather(&result).into_diagnostic(),
        OutputMode::Interactive => TextOutput::print_gather(&result).into_diagnostic(),
    }
}
