use std::fs;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tempfile::TempPath;
use tracing_subscriber::EnvFilter;

use readvault::app::{App, NewRun, ProgressSink};
use readvault::config::{ConfigLoader, ResolvedConfig};
use readvault::domain::{LibraryMetadata, SafeName, SampleLocation, UploadField};
use readvault::error::{IngestError, IngestFailure};
use readvault::output::{JsonOutput, LogProgress, OutputMode};
use readvault::qc::{FastqcRunner, QcRunner, QcToolStatus};
use readvault::store::{JsonRecordStore, StorageLayout};
use readvault::upload::UploadRequest;

#[derive(Parser)]
#[command(name = "readvault")]
#[command(about = "Ingest sequencing runs into checksum-verified read storage")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage sequencing runs")]
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[command(subcommand)]
    command: RunCommand,
}

#[derive(Subcommand)]
enum RunCommand {
    #[command(about = "Create a run from raw read files")]
    New(NewArgs),
    #[command(about = "Add processed read files to an existing run")]
    Add(AddArgs),
    #[command(about = "Show a run with its reads grouped by mate")]
    Show(ShowArgs),
}

#[derive(Args, Clone)]
struct SampleArgs {
    #[arg(long)]
    group: String,

    #[arg(long)]
    project: String,

    #[arg(long)]
    sample: String,
}

#[derive(Args, Clone)]
struct NewArgs {
    #[command(flatten)]
    sample: SampleArgs,

    #[arg(long)]
    name: String,

    #[arg(long)]
    sequencing_provider: Option<String>,

    #[arg(long)]
    sequencing_technology: Option<String>,

    #[arg(long)]
    insert_size: Option<String>,

    #[arg(long)]
    library_type: Option<String>,

    #[arg(long)]
    library_source: Option<String>,

    #[arg(long)]
    library_selection: Option<String>,

    #[arg(long)]
    library_strategy: Option<String>,

    #[arg(long)]
    submission_to_galaxy: bool,

    /// Upload part as FIELD=VALUE, e.g. file-1-1=reads_R1.fq or md5-1-1=<digest>
    #[arg(long = "part", required = true)]
    parts: Vec<String>,
}

#[derive(Args, Clone)]
struct AddArgs {
    #[command(flatten)]
    sample: SampleArgs,

    #[arg(long)]
    run: String,

    #[arg(long = "part", required = true)]
    parts: Vec<String>,
}

#[derive(Args, Clone)]
struct ShowArgs {
    #[command(flatten)]
    sample: SampleArgs,

    #[arg(long)]
    run: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(failure) = report.downcast_ref::<IngestFailure>() {
            return ExitCode::from(map_exit_code(failure.error()));
        }
        if let Some(err) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::RunNotFound(_) => 2,
        IngestError::ConfigRead(_) | IngestError::ConfigParse(_) => 2,
        IngestError::Filesystem(_) | IngestError::Persistence(_) => 3,
        IngestError::ChecksumMismatch { .. }
        | IngestError::UnsupportedFormat(_)
        | IngestError::NoFilesProvided => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Verbose
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    ConfigLoader::ensure_base_folders(&config)?;

    let qc = FastqcRunner::new(config.fastqc.as_deref());
    if let QcToolStatus::Missing { message } = qc.tool_status() {
        tracing::warn!("{message}; quality reports will be skipped");
    }
    let app = App::new(
        StorageLayout::new(config.data_dir.clone()),
        JsonRecordStore::new(config.records_dir.clone()),
        qc,
        config.raw_extensions.clone(),
    );

    let Commands::Run(args) = cli.command;
    match args.command {
        RunCommand::New(args) => run_new(args, &app, &config, output_mode),
        RunCommand::Add(args) => run_add(args, &app, &config, output_mode),
        RunCommand::Show(args) => run_show(args, &app),
    }
}

fn run_new<Q: QcRunner>(
    args: NewArgs,
    app: &App<JsonRecordStore, Q>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sample = parse_sample(&args.sample)?;
    let (request, _staged) = build_request(&args.parts, &config.tmp_dir)?;
    let new_run = NewRun {
        name: args.name,
        sample,
        library: LibraryMetadata {
            sequencing_provider: args.sequencing_provider,
            sequencing_technology: args.sequencing_technology,
            insert_size: args.insert_size,
            library_type: args.library_type,
            library_source: args.library_source,
            library_selection: args.library_selection,
            library_strategy: args.library_strategy,
        },
        submission_to_galaxy: args.submission_to_galaxy,
    };

    let result = app.create_run(new_run, &request, sink(output_mode))?;
    JsonOutput::print_ingest(&result).into_diagnostic()?;
    Ok(())
}

fn run_add<Q: QcRunner>(
    args: AddArgs,
    app: &App<JsonRecordStore, Q>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sample = parse_sample(&args.sample)?;
    let run_name = args.run.parse::<SafeName>()?;
    let (request, _staged) = build_request(&args.parts, &config.tmp_dir)?;

    let result = app.add_processed(&sample, &run_name, &request, sink(output_mode))?;
    JsonOutput::print_ingest(&result).into_diagnostic()?;
    Ok(())
}

fn run_show<Q: QcRunner>(args: ShowArgs, app: &App<JsonRecordStore, Q>) -> miette::Result<()> {
    let sample = parse_sample(&args.sample)?;
    let run_name = args.run.parse::<SafeName>()?;
    let view = app.show(&sample, &run_name)?;
    JsonOutput::print_view(&view).into_diagnostic()?;
    Ok(())
}

fn sink(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Verbose => &LogProgress,
        OutputMode::Quiet => &JsonOutput,
    }
}

fn parse_sample(args: &SampleArgs) -> Result<SampleLocation, IngestError> {
    Ok(SampleLocation {
        group: args.group.parse()?,
        project: args.project.parse()?,
        sample: args.sample.parse()?,
    })
}

/// Turns `FIELD=VALUE` arguments into an upload, copying every file part
/// into the staging directory the way a multipart upload would land there.
///
/// The returned guards delete whatever staged copies ingestion did not
/// consume once they are dropped.
fn build_request(
    parts: &[String],
    tmp_dir: &Utf8Path,
) -> Result<(UploadRequest, Vec<TempPath>), IngestError> {
    let mut request = UploadRequest::new();
    let mut staged_parts = Vec::new();
    for part in parts {
        let (field, value) = part
            .split_once('=')
            .ok_or_else(|| IngestError::InvalidField(format!("expected FIELD=VALUE: {part}")))?;
        match UploadField::parse(field)? {
            UploadField::Checksum(_) => request = request.field(field, value),
            _ => {
                let source = Utf8PathBuf::from(value);
                let original_name = source
                    .file_name()
                    .ok_or_else(|| IngestError::InvalidField(format!("not a file: {value}")))?
                    .to_string();
                let staged = stage(&source, tmp_dir)?;
                let staged_path = Utf8PathBuf::from_path_buf(staged.to_path_buf())
                    .map_err(|_| IngestError::Filesystem("invalid staging path".to_string()))?;
                request = request.file(field, original_name, staged_path);
                staged_parts.push(staged);
            }
        }
    }
    Ok((request, staged_parts))
}

fn stage(source: &Utf8Path, tmp_dir: &Utf8Path) -> Result<TempPath, IngestError> {
    let temp = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(tmp_dir.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| IngestError::Filesystem(format!("copy {source}: {err}")))?;
    Ok(temp.into_temp_path())
}
