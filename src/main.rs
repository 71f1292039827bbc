//! wclkit CLI Entry Point
//!
//! Provides a command-line interface for inspecting WCL files.
//!
//! # Usage
//!
//! ```bash
//! # Normalize a file (stdin when no file is given)
//! wclkit wrapper_input.wcl
//!
//! # Sorted output with two-space indentation
//! wclkit wrapper_input.wcl --sorted --indent 2
//!
//! # Export as JSON or YAML
//! wclkit wrapper_input.wcl --format json
//!
//! # Fully resolve values, one line per loop combination
//! wclkit wrapper_input.wcl --search-order module --get filename
//!
//! # Show the command line built from exec_1
//! wclkit wrapper_input.wcl --command 1
//! ```

use std::io::{self, Write};
use std::process::ExitCode;
use std::str::FromStr;
use std::{env, fmt};

use log::{debug, info};

use wclkit::document::{self, write_wcl, Document, Parser, SearchOptions};
use wclkit::execution::build_command_line;
use wclkit::resolve::{replace_vars, ResolveOptions};
use wclkit::{WclError, APP_NAME, VERSION};

/// Default indentation per nesting level.
const DEFAULT_INDENT: usize = 4;

/// Output format for the whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputFormat {
    #[default]
    Wcl,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wcl" => Ok(OutputFormat::Wcl),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("Invalid format: {} (expected wcl, json or yaml)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Wcl => "wcl",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        };
        write!(f, "{}", name)
    }
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    wcl_path: Option<String>,
    sorted: bool,
    indent: usize,
    format: OutputFormat,
    search_order: Vec<String>,
    get_keys: Vec<String>,
    command: Option<String>,
    list_vars: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wcl_path: None,
            sorted: false,
            indent: DEFAULT_INDENT,
            format: OutputFormat::default(),
            search_order: Vec::new(),
            get_keys: Vec::new(),
            command: None,
            list_vars: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: wclkit [OPTIONS] [WCL_FILE]");
    println!();
    println!("Arguments:");
    println!("  [WCL_FILE]          WCL file to read (default: stdin)");
    println!();
    println!("Options:");
    println!("  --sorted            Alphabetize keys (cmdline order is kept)");
    println!("  --indent N          Spaces per nesting level (default: {})", DEFAULT_INDENT);
    println!("  --format FORMAT     Output format: wcl, json or yaml (default: wcl)");
    println!("  --search-order L    Comma-separated sections used for scoped lookup");
    println!("  --get KEY           Print the fully resolved value of KEY (repeatable)");
    println!("  --command N         Print the command line built from exec_N");
    println!("  --vars              List variables referenced by ${{...}} forms");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  wclkit wrapper_input.wcl --sorted");
    println!("  wclkit wrapper_input.wcl --format json");
    println!("  wclkit wrapper_input.wcl --search-order module --get filename");
    println!("  cat config.wcl | wclkit --command 1");
}

/// Returns the value following option `args[*i]`.
fn option_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> Result<&'a str, String> {
    let option = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires {}", option, what))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--sorted" => {
                config.sorted = true;
            }
            "--vars" => {
                config.list_vars = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--indent" => {
                let value = option_value(args, &mut i, "a number argument")?;
                config.indent = value
                    .parse()
                    .map_err(|_| format!("Invalid indent value: {}", value))?;
            }
            "--format" => {
                config.format = option_value(args, &mut i, "a format argument")?.parse()?;
            }
            "--search-order" => {
                config.search_order = option_value(args, &mut i, "a section list")?
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "--get" => {
                let key = option_value(args, &mut i, "a key argument")?;
                config.get_keys.push(key.to_string());
            }
            "--command" => {
                let value = option_value(args, &mut i, "an exec number")?;
                if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("Invalid exec number: {}", value));
                }
                config.command = Some(format!("exec_{}", value));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.wcl_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.wcl_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Reads the input document from the configured file or stdin.
fn load_document(config: &Config) -> Result<Document, WclError> {
    match config.wcl_path {
        Some(ref path) => document::load_wcl(path),
        None => {
            info!("Reading WCL from stdin");
            Parser::new().with_source_name("stdin").parse(io::stdin().lock())
        }
    }
}

/// Prints every resolved combination of `key`.
fn print_resolved(doc: &Document, key: &str, out: &mut impl Write) -> Result<(), Box<dyn std::error::Error>> {
    let raw = doc
        .search(key, &SearchOptions::required())?
        .ok_or_else(|| WclError::MissingKey {
            key: key.to_string(),
        })?
        .as_str()
        .ok_or_else(|| WclError::NotScalar {
            key: key.to_string(),
        })?;

    let opts = ResolveOptions::new().with_expand(true);
    let resolved = replace_vars(raw, doc, &opts)?;
    debug!("{} resolved to {} value(s)", key, resolved.len());

    for item in resolved.into_expansions() {
        writeln!(out, "{}", item.text)?;
    }
    Ok(())
}

/// Writes the whole document in the configured format.
fn print_document(doc: &Document, config: &Config, out: &mut impl Write) -> Result<(), Box<dyn std::error::Error>> {
    debug!("Writing document as {}", config.format);
    match config.format {
        OutputFormat::Wcl => write_wcl(doc, out, config.sorted, config.indent)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(doc)?)?,
        OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(doc)?)?,
    }
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);
    debug!("{} v{}", APP_NAME, VERSION);

    let mut doc = load_document(&config)?;
    info!("Loaded document with {} top-level entries", doc.len());

    if !config.search_order.is_empty() {
        doc.set_search_order(config.search_order.iter().cloned());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if config.list_vars {
        for name in doc.referenced_variables() {
            writeln!(out, "{}", name)?;
        }
        return Ok(());
    }

    if let Some(ref exec_key) = config.command {
        let command = build_command_line(&doc, exec_key, &ResolveOptions::new())?;
        writeln!(out, "{}", command)?;
        return Ok(());
    }

    if !config.get_keys.is_empty() {
        for key in &config.get_keys {
            print_resolved(&doc, key, &mut out)?;
        }
        return Ok(());
    }

    print_document(&doc, &config, &mut out)?;
    out.flush()?;

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
