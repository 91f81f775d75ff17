//! Mathsheet - recalculate line-oriented calculation worksheets

mod config;

use anyhow::{Context, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mathsheet_core::{Settings, TextDocument, Worksheet};
use std::env;
use std::io::{self, Read};
use std::path::PathBuf;

fn print_usage() {
    eprintln!("Usage: mathsheet [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Worksheet to recalculate (default: stdin, or '-')");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <EXPR>      Evaluate a line and print its result (can be repeated)");
    eprintln!("  -i, --in-place            Rewrite FILE with the recalculated worksheet");
    eprintln!("  -o, --output <FILE>       Write the recalculated worksheet to FILE");
    eprintln!("  --config <path>           Load default settings from TOML file");
    eprintln!("  --no-config               Ignore the user settings file");
    eprintln!("  --today <YYYY-MM-DD>      Fix the date used for 'today' and 'now'");
    eprintln!("  --now <YYYY-MM-DD HH:MM:SS>  Fix the moment used for 'today' and 'now'");
    eprintln!("  --vars                    Print the variables report after recalculating");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Set MATHSHEET_LOG (e.g. MATHSHEET_LOG=debug) for diagnostics on stderr.");
}

#[derive(Debug, Default)]
struct Options {
    file_path: Option<PathBuf>,
    commands: Vec<String>,
    in_place: bool,
    output_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    no_config: bool,
    clock: Option<NaiveDateTime>,
    show_vars: bool,
}

fn parse_clock(value: &str) -> anyhow::Result<NaiveDateTime> {
    if let Ok(moment) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(moment);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}'", value))?;
    Ok(date.and_time(NaiveTime::MIN))
}

fn take_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        eprintln!("Error: {}", what);
        std::process::exit(1);
    }
    &args[*i]
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut options = Options::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-c" | "--command" => {
                let expr = take_value(args, &mut i, "--command requires an expression");
                options.commands.push(expr.to_string());
            }
            "-i" | "--in-place" => options.in_place = true,
            "-o" | "--output" => {
                let path = take_value(args, &mut i, "--output requires a file path");
                options.output_file = Some(PathBuf::from(path));
            }
            "--config" => {
                let path = take_value(args, &mut i, "--config requires a file path");
                options.config_file = Some(PathBuf::from(path));
            }
            "--no-config" => options.no_config = true,
            "--today" | "--now" => {
                let value = take_value(args, &mut i, "--today/--now require a value");
                options.clock = Some(parse_clock(value)?);
            }
            "--vars" => options.show_vars = true,
            "-" if options.file_path.is_none() => {}
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                print_usage();
                std::process::exit(1);
            }
            _ => {
                if options.file_path.is_none() {
                    options.file_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: Unexpected argument: {}", args[i]);
                    print_usage();
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }
    if options.in_place && options.file_path.is_none() {
        bail!("--in-place requires a FILE");
    }
    Ok(Some(options))
}

fn load_defaults(options: &Options) -> Settings {
    if options.no_config {
        return Settings::default();
    }
    let (settings, warnings) = config::load_settings(options.config_file.as_deref());
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
    settings
}

fn new_worksheet(options: &Options) -> Worksheet {
    let worksheet = Worksheet::new(load_defaults(options));
    match options.clock {
        Some(now) => worksheet.with_clock(now),
        None => worksheet,
    }
}

/// `-c` mode: evaluate each command in turn, sharing state between them.
fn run_commands(options: &Options) -> i32 {
    let mut worksheet = new_worksheet(options);
    for command in &options.commands {
        match worksheet.run_line(command) {
            Ok(Some(text)) => println!("{}", text),
            Ok(None) => {}
            Err(err) => {
                println!("#ERR: {}", err);
                return 1;
            }
        }
    }
    if options.show_vars {
        println!("{}", worksheet.variables_report());
    }
    0
}

fn run_document(options: &Options) -> anyhow::Result<i32> {
    let mut document = match &options.file_path {
        Some(path) => TextDocument::load(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("failed to read stdin")?;
            TextDocument::parse(&content)
        }
    };

    let mut worksheet = new_worksheet(options);
    let report = worksheet.recalculate(&mut document);
    for error in &report.errors {
        eprintln!("line {}: {}", document.line_number(error.location), error.message);
    }
    if report.truncated {
        eprintln!("Warning: stopped after {} lines", report.processed);
    }

    let target = if options.in_place {
        options.file_path.as_ref()
    } else {
        options.output_file.as_ref()
    };
    match target {
        Some(path) => document
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", document.render()),
    }
    if options.show_vars {
        println!("{}", worksheet.variables_report());
    }

    Ok(if report.errors.is_empty() { 0 } else { 1 })
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MATHSHEET_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let code = if options.commands.is_empty() {
        match run_document(&options) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        }
    } else {
        run_commands(&options)
    };
    std::process::exit(code);
}
