//! fb2mend - FB2 collection repair tool

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use fb2mend::{
    BatchOptions, BatchProcessor, BatchStats, CaseFolding, GenreTable, NamingOptions,
    WriterOptions,
};

#[derive(Parser)]
#[command(name = "fb2mend")]
#[command(version, about = "Batch repair and re-encoding for FB2 e-book collections", long_about = None)]
#[command(after_help = "EXAMPLES:
    fb2mend library/                  Repair every book under library/
    fb2mend -o fixed books.zip        Repair archive contents into fixed/
    fb2mend --no-compress book.fb2    Keep the output as a bare .fb2 file")]
struct Cli {
    /// Input files or directories to process
    #[arg(value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory for the Good/Bad/NonValid buckets
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Exclude a file or directory from the process
    #[arg(short, long, value_name = "PATH")]
    exclude: Vec<PathBuf>,

    /// Do not search subdirectories for files to process
    #[arg(long)]
    no_recurse: bool,

    /// Store outputs as bare .fb2 files instead of single-entry ZIPs
    #[arg(long)]
    no_compress: bool,

    /// Use this encoding instead of each document's own
    #[arg(long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Do not indent document headers
    #[arg(long)]
    no_indent_header: bool,

    /// Indent document bodies
    #[arg(long)]
    indent_body: bool,

    /// Do not auto-increment the minor version number
    #[arg(long)]
    no_incversion: bool,

    /// Replace the current document id with a new one
    #[arg(long)]
    replace_id: bool,

    /// Genre mapping file
    #[arg(long, value_name = "FILE")]
    genres: Option<PathBuf>,

    /// Do not remap genre codes even when a genre file is given
    #[arg(long)]
    no_map_genres: bool,

    /// Do not transliterate Cyrillic output file names
    #[arg(long)]
    no_translify: bool,

    /// Use strict naming conventions for output files
    #[arg(long)]
    strict: bool,

    /// Character that replaces whitespace in output file names
    #[arg(long, value_name = "CHAR", default_value = "_")]
    replace_char: String,

    /// Convert output file names to upper case
    #[arg(long, conflicts_with = "lower")]
    upper: bool,

    /// Convert output file names to lower case
    #[arg(long)]
    lower: bool,

    /// Maximum output file name length (0 for unlimited)
    #[arg(long, value_name = "N", default_value_t = 0)]
    max_length: usize,

    /// Re-process documents already stamped as processed
    #[arg(long)]
    force: bool,

    /// Suppress informational output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let quiet = cli.quiet;
    match run(cli) {
        Ok(stats) => {
            if !quiet {
                println!(
                    "{} processed, {} repaired, {} failed, {} rejected",
                    stats.documents, stats.saved, stats.failed, stats.invalid
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> fb2mend::Result<BatchStats> {
    let preferred = match &cli.encoding {
        Some(label) => Some(fb2mend::encoding::encoding_for_label(label)?),
        None => None,
    };

    let genres = match (&cli.genres, cli.no_map_genres) {
        (Some(path), false) => Some(GenreTable::load(path)?),
        _ => None,
    };

    let options = BatchOptions {
        output_root: cli.output.clone(),
        excludes: cli.exclude.clone(),
        recurse: !cli.no_recurse,
        compress: !cli.no_compress,
        preferred,
        writer: WriterOptions {
            indent_header: !cli.no_indent_header,
            indent_body: cli.indent_body,
        },
        naming: NamingOptions {
            translify: !cli.no_translify,
            strict: cli.strict,
            replace_char: cli.replace_char.chars().next(),
            case: if cli.upper {
                CaseFolding::Upper
            } else if cli.lower {
                CaseFolding::Lower
            } else {
                CaseFolding::None
            },
            max_length: cli.max_length,
        },
        regenerate_id: cli.replace_id,
        increment_version: !cli.no_incversion,
        force: cli.force,
    };

    let mut processor = BatchProcessor::new(options);
    if let Some(ref table) = genres {
        processor = processor.with_genres(table);
    }
    processor.process(&cli.inputs)
}
