use clap::{Parser, Subcommand};
use responsive_derivatives::backfill::{Backfill, BackfillOptions, CancelToken};
use responsive_derivatives::derivatives::DerivativeGenerator;
use responsive_derivatives::imaging::QualityPolicy;
use responsive_derivatives::presets::CATALOG;
use responsive_derivatives::records::JsonRecords;
use responsive_derivatives::{config, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Shared flag for commands that can print machine-readable results.
#[derive(clap::Args, Clone, Copy)]
struct JsonArgs {
    /// Print results as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct BackfillArgs {
    /// JSON export of the property image records
    #[arg(long)]
    records: PathBuf,

    /// Only process images of this property
    #[arg(long)]
    property: Option<String>,

    /// Regenerate derivatives even if they exist
    #[arg(long)]
    force: bool,

    /// Regenerate images whose source content changed since the last run
    #[arg(long)]
    verify_hash: bool,

    #[command(flatten)]
    output: JsonArgs,
}

#[derive(Parser)]
#[command(name = "responsive-derivatives")]
#[command(about = "Generate responsive AVIF/WebP/JPEG derivatives of property photos")]
#[command(long_about = "\
Generate responsive AVIF/WebP/JPEG derivatives of property photos

Every source image gets one file per size preset and format, written next to
the source:

  uploads/properties/12/
  ├── livingroom.jpg                        # source
  ├── livingroom.hero_1920x1080.avif
  ├── livingroom.hero_1920x1080.webp
  ├── livingroom.hero_1920x1080.jpeg
  └── ...                                   # hero_1280x720, card_640x360, thumb_160x128

Presets are center-cropped to their box and never upscaled. EXIF orientation
is applied before cropping.

Run 'responsive-derivatives gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file (optional; defaults apply when it does not exist)
    #[arg(long, default_value = "derivatives.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate derivatives for one source image
    Generate {
        /// Source image
        source: PathBuf,
        /// Directory to write into (defaults to the source's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Filename the derivative names are based on (defaults to the source's)
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        output: JsonArgs,
    },
    /// Generate missing derivatives for every image record
    Backfill(BackfillArgs),
    /// List the derivatives that exist for a source image
    Inspect {
        source: PathBuf,
        #[command(flatten)]
        output: JsonArgs,
    },
    /// Delete every derivative of a source image
    Clean { source: PathBuf },
    /// Print the size preset catalog and quality policy
    Presets,
    /// Print a stock derivatives.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Generate {
            source,
            output_dir,
            name,
            output: out,
        } => {
            let name = name.unwrap_or_else(|| source_name(&source));
            let output_dir = output_dir.unwrap_or_else(|| source_dir(&source));
            let files = DerivativeGenerator::standard().generate(&source, &name, &output_dir)?;
            if out.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                output::print_lines(&output::format_generated(&files));
            }
        }
        Command::Backfill(args) => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);

            let cancel = CancelToken::new();
            {
                let cancel = cancel.clone();
                ctrlc::set_handler(move || {
                    eprintln!("Interrupted, finishing images in progress");
                    cancel.cancel();
                })?;
            }

            let json = args.output.json;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    if !json {
                        output::print_lines(&output::format_backfill_event(&event));
                    }
                }
            });

            let options = BackfillOptions {
                force: args.force,
                verify_source_hash: args.verify_hash || config.backfill.verify_source_hash,
                threads: None,
                cancel,
                progress: Some(tx),
            };
            let generator = DerivativeGenerator::standard();
            let records = JsonRecords::from_path(&args.records);
            let result = Backfill::new(&generator, &config.uploads).run(
                &records,
                args.property.as_deref(),
                &options,
            );
            // Closing the channel ends the printer
            drop(options);
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;

            let stats = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        Command::Inspect {
            source,
            output: out,
        } => {
            let generator = DerivativeGenerator::standard();
            let dims = generator.identify(&source)?;
            let inventory = generator.existing(&source, &source_name(&source));
            if out.json {
                let report = serde_json::json!({
                    "source": source,
                    "dimensions": dims,
                    "derivatives": inventory,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} ({}x{})", source.display(), dims.width, dims.height);
                output::print_lines(&output::format_inventory(&inventory));
            }
        }
        Command::Clean { source } => {
            let report = DerivativeGenerator::standard().remove(&source, &source_name(&source));
            output::print_lines(&output::format_removal(&report));
        }
        Command::Presets => {
            output::print_lines(&output::format_presets(&CATALOG, &QualityPolicy::default()));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the fmt subscriber on stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn source_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn source_dir(source: &Path) -> PathBuf {
    source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
