use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::process;

use cellpatch_core::{
    CodecError, CodecOptions, CsvOpts, JsonOpts, LineTerminator, PickleOpts, TabularFile,
    containing_dir, list_entries,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TerminatorArg {
    Crlf,
    Lf,
}

#[derive(Parser, Debug)]
#[command(
    name = "cellpatch",
    about = "Load a CSV, JSON or pickle file, overwrite cells, print and save the result",
    version
)]
struct Cli {
    /// Source file (.csv, .json, .pickle/.pkl); its suffix picks the format
    src: PathBuf,
    /// Destination file, written in the source's format
    dst: PathBuf,
    /// Changes as col,row,value (zero-based)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    changes: Vec<String>,

    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// CSV line terminator
    #[arg(long, value_enum, default_value_t = TerminatorArg::Crlf)]
    line_terminator: TerminatorArg,
    /// JSON indentation width
    #[arg(long, default_value_t = 4)]
    indent: usize,
    /// Pickle protocol to write
    #[arg(long, value_parser = clap::value_parser!(u8).range(2..=5), default_value_t = 4)]
    protocol: u8,
    /// Verbose logging (repeat for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

fn codec_options(cli: &Cli) -> Result<CodecOptions, String> {
    let delimiter = u8::try_from(cli.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| format!("delimiter must be a single ASCII character, got '{}'", cli.delimiter))?;
    Ok(CodecOptions {
        csv: CsvOpts {
            delimiter,
            line_terminator: match cli.line_terminator {
                TerminatorArg::Crlf => LineTerminator::Crlf,
                TerminatorArg::Lf => LineTerminator::Lf,
            },
            ..CsvOpts::default()
        },
        json: JsonOpts { indent: cli.indent },
        pickle: PickleOpts {
            protocol: cli.protocol,
        },
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn report_missing_source(cli: &Cli) {
    println!(
        "Error: Source file '{}' does not exist or is not a file.",
        cli.src.display()
    );
    let dir = containing_dir(&cli.src);
    println!("Files in directory:");
    match list_entries(&dir) {
        Ok(names) => {
            for name in names {
                println!("{}", name);
            }
        }
        Err(e) => println!("Could not list files: {}", e),
    }
}

fn run(cli: &Cli) -> i32 {
    if !cli.src.is_file() {
        report_missing_source(cli);
        return 1;
    }
    let opts = match codec_options(cli) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    let mut file = match TabularFile::open(&cli.src, &cli.dst, &opts) {
        Ok(f) => f,
        Err(e @ CodecError::Unsupported(_)) => {
            println!("{}", e);
            return 1;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    if let Err(e) = file.read() {
        eprintln!("error: {}", e);
        return 1;
    }

    let report = file.apply_changes(&cli.changes);
    for (raw, reason) in report.skipped() {
        println!("Skipping change '{}': {}", raw, reason);
    }
    log::info!(
        "{} of {} changes applied",
        report.outcomes.len() - report.skipped_count(),
        report.outcomes.len()
    );

    println!("\nModified file content:");
    print!("{}", file.display());

    if let Err(e) = file.write() {
        eprintln!("error: {}", e);
        return 1;
    }
    println!("\nModified {} saved to: {}", file.format(), file.dst().display());
    0
}

fn main() {
    // usage errors exit 1; --help and --version exit 0
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let code = if e.use_stderr() { 1 } else { 0 };
        e.print().ok();
        process::exit(code);
    });
    init_logging(cli.verbose);
    process::exit(run(&cli));
}
