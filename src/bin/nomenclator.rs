//! nomenclator CLI - ingest OCR'd species catalogues into a name registry
//!
//! The `pages` and `columns` commands inspect a text dump's layout; `ingest`
//! runs the whole pipeline against a registry snapshot and a region tree.

use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use nomenclator::layout::{segment_pages, PageStreamExt, PaginationMode};
use nomenclator::merge::{ConsoleReviewer, DeclineAll, Reviewer};
use nomenclator::{
    ExtractorRegistry, InMemoryRegionTree, InMemoryRegistry, IngestError, NdjsonWriter, Pipeline,
    PipelineConfig, RunReport,
};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "nomenclator")]
#[command(version, about = "Ingest OCR'd taxonomic catalogues into a canonical name registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the pages of a text dump and check their numbering
    Pages {
        /// Text dump with form-feed page markers
        #[arg(short, long)]
        input: PathBuf,

        /// Log page-number gaps instead of stopping at the first one
        #[arg(short, long)]
        permissive: bool,
    },

    /// Show where a page splits into columns
    Columns {
        /// Text dump with form-feed page markers
        #[arg(short, long)]
        input: PathBuf,

        /// Page number to inspect
        #[arg(short = 'n', long)]
        page: u32,

        /// Pipeline configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the full pipeline and merge into a registry
    Ingest {
        /// Text dump with form-feed page markers
        #[arg(short, long)]
        input: PathBuf,

        /// Registry snapshot (JSON)
        #[arg(short, long)]
        registry: PathBuf,

        /// Region tree (YAML)
        #[arg(short = 'g', long)]
        regions: PathBuf,

        /// Pipeline configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Extractor to use
        #[arg(short, long, default_value = "catalogue")]
        extractor: String,

        /// Compare and report without writing to the registry
        #[arg(long)]
        dry_run: bool,

        /// Ask about each conflict at the end of the run
        #[arg(long)]
        interactive: bool,

        /// Write enriched records as NDJSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to save the updated registry (default: overwrite --registry)
        #[arg(long)]
        save_registry: Option<PathBuf>,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pages { input, permissive } => list_pages(input, permissive),
        Commands::Columns { input, page, config } => show_columns(input, page, config),
        Commands::Ingest {
            input,
            registry,
            regions,
            config,
            extractor,
            dry_run,
            interactive,
            output,
            save_registry,
            report,
        } => ingest(IngestArgs {
            input,
            registry,
            regions,
            config,
            extractor,
            dry_run,
            interactive,
            output,
            save_registry,
            report,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::default(),
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_string).collect())
}

fn list_pages(input: PathBuf, permissive: bool) -> CliResult {
    let mode = if permissive {
        PaginationMode::Permissive
    } else {
        PaginationMode::Strict
    };
    let lines = read_lines(&input)?;
    let mut count = 0;
    for page in segment_pages(&lines).validate_pages(mode) {
        let page = page?;
        let non_blank = page.lines.iter().filter(|l| !l.trim().is_empty()).count();
        println!("  page {:>5}: {} lines ({} non-blank)", page.number, page.lines.len(), non_blank);
        count += 1;
    }
    println!("✓ {} pages in {}", count, input.display());
    Ok(())
}

fn show_columns(input: PathBuf, number: u32, config: Option<PathBuf>) -> CliResult {
    let config = load_config(config.as_deref())?;
    let aligner = config.column_aligner();
    let lines = read_lines(&input)?;

    let page = segment_pages(&lines)
        .filter_map(Result::ok)
        .find(|page| page.number == number)
        .ok_or_else(|| format!("page {} not found in {}", number, input.display()))?;

    let non_blank = page.lines.iter().filter(|l| !l.trim().is_empty()).count();
    match aligner.find_split(&page.lines) {
        Some(split) => println!(
            "Page {}: split at column {} (score {}, required {})",
            number,
            split.index,
            split.score,
            aligner.required_score(non_blank)
        ),
        None => println!(
            "Page {}: no column split (required score {})",
            number,
            aligner.required_score(non_blank)
        ),
    }
    for line in aligner.align(page)?.lines {
        println!("{}", line);
    }
    Ok(())
}

struct IngestArgs {
    input: PathBuf,
    registry: PathBuf,
    regions: PathBuf,
    config: Option<PathBuf>,
    extractor: String,
    dry_run: bool,
    interactive: bool,
    output: Option<PathBuf>,
    save_registry: Option<PathBuf>,
    report: Option<PathBuf>,
}

fn ingest(args: IngestArgs) -> CliResult {
    let mut config = load_config(args.config.as_deref())?;
    if args.dry_run {
        config.merge.dry_run = true;
    }
    if config.merge.source == PipelineConfig::default().merge.source {
        if let Some(stem) = args.input.file_stem() {
            config.merge.source = stem.to_string_lossy().into_owned();
        }
    }

    let extractors = ExtractorRegistry::with_builtin();
    let extractor = extractors.get(&args.extractor)?;
    let mut registry = InMemoryRegistry::load_json(&args.registry)?;
    let regions = InMemoryRegionTree::load_from_file(&args.regions)?;
    let lines = read_lines(&args.input)?;

    let mut reviewer: Box<dyn Reviewer> = if args.interactive {
        Box::new(ConsoleReviewer::stdio())
    } else {
        Box::new(DeclineAll)
    };
    let mut sink = match &args.output {
        Some(path) => Some(NdjsonWriter::new(BufWriter::new(File::create(path)?))),
        None => None,
    };

    let pipeline = Pipeline::new(config)?;
    let dry_run = pipeline.config().merge.dry_run;
    let result = pipeline.run(
        &lines,
        extractor,
        &mut registry,
        &regions,
        reviewer.as_mut(),
        |record| match sink.as_mut() {
            Some(writer) => writer.write(record),
            None => Ok(()),
        },
    );
    let target = args.save_registry.as_ref().unwrap_or(&args.registry);
    let report = save_progress(result, &registry, target, dry_run)?;

    if let Some(writer) = sink.as_mut() {
        writer.flush()?;
        println!("  ✓ Wrote {} records", writer.written());
    }
    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("  ✓ Wrote report to {}", path.display());
    }
    println!("{}", report);
    Ok(())
}

/// Save the registry after a run, whether or not the run completed.
///
/// Merges are written record by record, so an aborted run still leaves
/// earlier records merged; those are saved before the error is returned.
/// Dry runs save nothing.
fn save_progress(
    result: Result<RunReport, IngestError>,
    registry: &InMemoryRegistry,
    target: &Path,
    dry_run: bool,
) -> Result<RunReport, IngestError> {
    if !dry_run {
        registry.save_json(target)?;
        match &result {
            Ok(_) => println!("  ✓ Saved registry to {}", target.display()),
            Err(_) => eprintln!("  ⚠ Run aborted; saved partial progress to {}", target.display()),
        }
    }
    result
}
