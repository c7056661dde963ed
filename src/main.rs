use clap::{Args, Parser, Subcommand, ValueEnum};
use photo_tidy::actions::Operation;
use photo_tidy::config::{self, ToolConfig};
use photo_tidy::dedupe::{self, DedupeOptions, Disposal, HashMode};
use photo_tidy::exiftool::ExifTool;
use photo_tidy::imaging::{Quality, RustBackend, Shape};
use photo_tidy::naming::FilenameTemplate;
use photo_tidy::orient::{self, OrientMode, OrientOptions, OutputMode};
use photo_tidy::output::{self, Reporter};
use photo_tidy::rename::{self, RenameOptions};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn version_string() -> &'static str {
    if env!("PHOTO_TIDY_RELEASE") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("PHOTO_TIDY_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "photo-tidy")]
#[command(about = "Rename, re-orient and de-duplicate photo folders")]
#[command(long_about = "\
Rename, re-orient and de-duplicate photo folders

Renamed files follow the capture time recorded by the camera:

  IMG_0001.JPG  →  20240301_100000_120_lat42.3442N_lon71.1443W_IMG_0001.jpg
                   date     time   ms  GPS (when present)     original

Files without EXIF dates fall back to the filesystem creation time.
Every command is a dry run until --no-dry-run is given.

Requires exiftool for `rename` (and for metadata preservation in `orient`):
  macOS:          brew install exiftool
  Debian/Ubuntu:  apt install libimage-exiftool-perl

Run 'photo-tidy gen-config' to generate a documented photo-tidy.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Debug-level diagnostics (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write results and diagnostics to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Config file (default: photo-tidy.toml in the source directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// `-n/--dry-run` (the default) and `--no-dry-run`; the last one given wins.
#[derive(Args, Clone)]
struct DryRunArgs {
    /// Only report what would happen (default)
    #[arg(short = 'n', long, overrides_with = "no_dry_run")]
    dry_run: bool,

    /// Actually change files
    #[arg(long)]
    no_dry_run: bool,
}

impl DryRunArgs {
    fn enabled(&self) -> bool {
        self.dry_run || !self.no_dry_run
    }
}

#[derive(Args)]
struct RenameArgs {
    /// Image file or directory
    source: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    #[command(flatten)]
    dry_run: DryRunArgs,

    /// Copy instead of renaming in place
    #[arg(long)]
    copy: bool,

    /// Destination directory (default: next to each source file)
    #[arg(short, long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Mirror source subdirectories under the destination
    #[arg(long, requires = "destination")]
    preserve_structure: bool,

    /// Leave the original file stem out of the new name
    #[arg(long)]
    no_original: bool,

    /// Custom filename template, e.g. "{year}-{month}-{day}_{time}_{device}"
    #[arg(long)]
    template: Option<String>,

    /// Render {camera} in templates
    #[arg(long)]
    include_camera: bool,

    /// Files per exiftool call
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Path to the exiftool executable
    #[arg(long, value_name = "PATH")]
    exiftool: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Apply the EXIF Orientation tag to the pixels
    Exif,
    /// Force a landscape or portrait shape
    Target,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShapeArg {
    Landscape,
    Portrait,
}

impl From<ShapeArg> for Shape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Landscape => Shape::Landscape,
            ShapeArg::Portrait => Shape::Portrait,
        }
    }
}

#[derive(Args)]
struct OrientArgs {
    /// Image file or directory
    source: PathBuf,

    #[arg(long, value_enum, default_value = "exif")]
    mode: ModeArg,

    /// Shape to force in target mode
    #[arg(long, value_enum, required_if_eq("mode", "target"))]
    target: Option<ShapeArg>,

    /// Overwrite the source files
    #[arg(long, conflicts_with = "out")]
    inplace: bool,

    /// Output directory (default: <source>_oriented next to the source)
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    #[command(flatten)]
    dry_run: DryRunArgs,

    /// Only process the top-level directory
    #[arg(long)]
    no_recursive: bool,

    /// JPEG quality, 1-100
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    quality: Option<u32>,

    /// Process files small enough to be iCloud placeholders
    #[arg(long)]
    include_placeholders: bool,

    /// Path to the exiftool executable
    #[arg(long, value_name = "PATH")]
    exiftool: Option<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    /// Image file or directory (always scanned recursively)
    source: PathBuf,
}

#[derive(Args)]
struct DedupeArgs {
    /// Folder to scan
    folder: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    #[command(flatten)]
    dry_run: DryRunArgs,

    /// Only remove copies whose size and SHA-256 match the original
    #[arg(long)]
    verify_hash: bool,

    /// Hash whole files instead of the first and last 64 KiB
    #[arg(long, requires = "verify_hash")]
    full_hash: bool,

    /// Move copies into a trash folder instead of deleting them
    #[arg(long)]
    trash: bool,

    /// Trash folder (implies --trash; default: <folder>/_duplicates_trash)
    #[arg(long, value_name = "DIR")]
    trash_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Rename images from their capture date, time and GPS position
    Rename(RenameArgs),
    /// Rotate and mirror pixels so images display upright
    Orient(OrientArgs),
    /// Report EXIF orientation tags without changing anything
    Check(CheckArgs),
    /// Remove macOS-style duplicate copies ("IMG_1234 2.JPG")
    Dedupe(DedupeArgs),
    /// Print a stock photo-tidy.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();

    let log = match &cli.log_file {
        Some(path) => Some(Arc::new(File::create(path)?)),
        None => None,
    };
    init_tracing(cli.verbose, log.clone());
    let reporter = Reporter::new(log);

    match cli.command {
        Command::Rename(args) => {
            let config = load_config(cli.config.as_deref(), &args.source)?;
            run_rename(args, &config, reporter)
        }
        Command::Orient(args) => {
            let config = load_config(cli.config.as_deref(), &args.source)?;
            run_orient(args, &config, reporter)
        }
        Command::Check(args) => {
            let report = orient::check_source(&RustBackend::new(), &args.source)?;
            reporter.lines(output::format_check_report(&report));
            Ok(ExitCode::SUCCESS)
        }
        Command::Dedupe(args) => {
            let config = load_config(cli.config.as_deref(), &args.folder)?;
            run_dedupe(args, &config, reporter)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// stderr always; the log file too when one is open (no ANSI colours there).
fn init_tracing(verbose: bool, log: Option<Arc<File>>) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = log.map(|file| fmt::layer().with_writer(file).with_ansi(false));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

/// Config lookup is anchored at the source directory (or a file's parent).
fn load_config(explicit: Option<&Path>, source: &Path) -> Result<ToolConfig, config::ConfigError> {
    let dir = if source.is_dir() {
        source
    } else {
        source.parent().unwrap_or(Path::new("."))
    };
    config::load_config(explicit, dir)
}

/// Drain events on a separate thread so output keeps pace with the work.
fn spawn_printer<E: Send + 'static>(
    reporter: Reporter,
    format: fn(&E) -> Vec<String>,
) -> (Sender<E>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            reporter.lines(format(&event));
        }
    });
    (tx, printer)
}

fn exit_code(errors: usize) -> ExitCode {
    if errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_rename(
    args: RenameArgs,
    config: &ToolConfig,
    reporter: Reporter,
) -> Result<ExitCode, Box<dyn Error>> {
    let template = match &args.template {
        Some(t) => Some(t.parse::<FilenameTemplate>()?),
        None => config.template()?,
    };
    let opts = RenameOptions {
        destination: args.destination,
        operation: if args.copy {
            Operation::Copy
        } else {
            Operation::Rename
        },
        dry_run: args.dry_run.enabled(),
        preserve_structure: args.preserve_structure,
        keep_original: config.rename.keep_original && !args.no_original,
        include_camera: config.rename.include_camera || args.include_camera,
        template,
        batch_size: args.batch_size.unwrap_or(config.rename.batch_size),
    };

    let exiftool_path = args.exiftool.as_deref().or(config.exiftool.path.as_deref());
    let exiftool = ExifTool::discover(exiftool_path)?;

    let (tx, printer) = spawn_printer(reporter, output::format_rename_event);
    let result = rename::rename_source(&exiftool, &args.source, args.recursive, &opts, Some(tx));
    printer.join().map_err(|_| "output thread panicked")?;
    Ok(exit_code(result?.errors))
}

fn run_orient(
    args: OrientArgs,
    config: &ToolConfig,
    reporter: Reporter,
) -> Result<ExitCode, Box<dyn Error>> {
    let mode = match (args.mode, args.target) {
        (ModeArg::Exif, _) => OrientMode::Exif,
        (ModeArg::Target, Some(shape)) => OrientMode::Target(shape.into()),
        (ModeArg::Target, None) => return Err("--target is required with --mode target".into()),
    };
    let output_mode = if args.inplace {
        OutputMode::InPlace
    } else {
        OutputMode::Directory(
            args.out
                .clone()
                .unwrap_or_else(|| orient::default_output_dir(&args.source)),
        )
    };
    let opts = OrientOptions {
        mode,
        output: output_mode,
        dry_run: args.dry_run.enabled(),
        quality: Quality::new(args.quality.unwrap_or(config.orient.jpeg_quality)),
        skip_placeholders: !args.include_placeholders,
    };

    // Metadata preservation is best-effort: without exiftool the pixels are
    // still fixed, only the tags are lost.
    let exiftool = if opts.dry_run {
        None
    } else {
        let path = args.exiftool.as_deref().or(config.exiftool.path.as_deref());
        match ExifTool::discover(path) {
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!(error = %e, "metadata will not be copied to oriented files");
                None
            }
        }
    };

    let backend = RustBackend::new();
    let (tx, printer) = spawn_printer(reporter, output::format_orient_event);
    let result = orient::orient_source(
        &backend,
        exiftool.as_ref(),
        &args.source,
        !args.no_recursive,
        &opts,
        Some(tx),
    );
    printer.join().map_err(|_| "output thread panicked")?;
    Ok(exit_code(result?.errors))
}

fn run_dedupe(
    args: DedupeArgs,
    config: &ToolConfig,
    reporter: Reporter,
) -> Result<ExitCode, Box<dyn Error>> {
    let disposal = match (args.trash_dir, args.trash) {
        (Some(dir), _) => Disposal::Trash(dir),
        (None, true) => Disposal::Trash(args.folder.join(&config.dedupe.trash_dir_name)),
        (None, false) => Disposal::Delete,
    };
    let opts = DedupeOptions {
        recursive: args.recursive,
        dry_run: args.dry_run.enabled(),
        verify: match (args.verify_hash, args.full_hash) {
            (false, _) => None,
            (true, false) => Some(HashMode::Quick),
            (true, true) => Some(HashMode::Full),
        },
        disposal,
    };

    let (tx, printer) = spawn_printer(reporter, output::format_dedupe_event);
    let result = dedupe::dedupe_folder(&args.folder, &opts, Some(tx));
    printer.join().map_err(|_| "output thread panicked")?;
    Ok(exit_code(result?.errors))
}
