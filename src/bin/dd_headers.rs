use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;

use dd_headers::catalog::PgCatalog;
use dd_headers::config::{ConfigLoader, Profile};
use dd_headers::error::HeaderError;
use dd_headers::extractor::CommandDumper;
use dd_headers::logging;
use dd_headers::output::{JsonOutput, LogSink, OutputMode, print_summary};
use dd_headers::pipeline::{PipelineRunner, RunOptions, new_run_id};
use dd_headers::publish::ScpPublisher;
use dd_headers::stager::AdrswsAgent;

/// Exit status when the run completed but recorded per-file, per-bundle or
/// per-phase failures.
const EXIT_PARTIAL: u8 = 4;

#[derive(Parser)]
#[command(name = "dd-headers")]
#[command(
    about = "Dump netCDF headers for the most recent file of every datastream and publish \
             them for Data Discovery"
)]
#[command(
    long_about = "Dump netCDF headers for the most recent file of every datastream and publish \
them for Data Discovery.\n\n\
The list of files comes from a catalog query. Files are read from the local archive when \
available, otherwise queued for retrieval from tiered storage. Retrieved bundles are unpacked, \
their headers dumped, and the bundles deleted."
)]
#[command(version)]
struct Cli {
    /// Use the testing configuration profile.
    #[arg(short = 'T', long)]
    test: bool,

    /// Configuration file, overriding the profile default.
    #[arg(long)]
    config: Option<String>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Classify catalog rows without dumping, queueing or publishing.
    #[arg(long)]
    dry_run: bool,

    /// Run remote retrieval regardless of the configured `stage` flag.
    #[arg(long, overrides_with = "no_stage")]
    stage: bool,

    /// Skip remote retrieval regardless of the configured `stage` flag.
    #[arg(long, overrides_with = "stage")]
    no_stage: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(EXIT_PARTIAL),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<HeaderError>() {
                tracing::error!(error = %error, "run aborted");
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &HeaderError) -> u8 {
    match error {
        err if err.is_configuration() => 2,
        HeaderError::Catalog(_) | HeaderError::MissingTool(_) => 3,
        _ => 1,
    }
}

/// Returns whether the run recorded recoverable failures.
fn run() -> miette::Result<bool> {
    let cli = Cli::parse();
    let profile = if cli.test {
        Profile::Test
    } else {
        Profile::Production
    };
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let config = ConfigLoader::resolve(cli.config.as_deref(), profile)?;
    let run_id = new_run_id();
    let log_file = logging::init(&config.logging, &run_id)?;
    tracing::info!(log_file = %log_file, ?profile, "starting header run {run_id}");

    let catalog = PgCatalog::from_config(&config.database)?;
    let agent = AdrswsAgent::new(
        config.retrieval.adrsws_path.as_std_path(),
        config.retrieval.userid.clone(),
    );
    let dumper = CommandDumper::new(
        config.extraction.dump_tool.clone(),
        config.extraction.dump_args.clone(),
    );
    let publisher = config
        .publish
        .destination
        .as_ref()
        .map(|destination| ScpPublisher::new(config.publish.scp_path.clone(), destination.clone()));

    let options = RunOptions {
        stage: if cli.stage {
            true
        } else if cli.no_stage {
            false
        } else {
            config.retrieval.stage
        },
        dry_run: cli.dry_run,
    };

    let runner = PipelineRunner::new(&config, catalog, agent, dumper, publisher);
    let report = match output_mode {
        OutputMode::Json => runner.run_with_id(run_id, &options, &JsonOutput)?,
        OutputMode::Text => runner.run_with_id(run_id, &options, &LogSink)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => print_summary(&report),
    }
    Ok(report.has_failures())
}
