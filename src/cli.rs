//! Command-line interface for phpsift.

use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Map;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::analyzer::{Analyzer, FileReport};
use crate::config::{self, Settings, SETTINGS_FILE_NAMES};
use crate::plugin::{FilterField, ENABLED_KEY};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Heuristic PHP source checker.
///
/// phpsift tracks strings, comments and template regions line by line and
/// flags missing terminators, unbalanced quotes, tags and brackets, malformed
/// signatures, array separators, bare variables and risky patterns. Many
/// findings can be fixed in place.
#[derive(Parser)]
#[command(name = "phpsift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (default: auto-discover phpsift.yaml)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// More log output (-v info, -vv debug); PHPSIFT_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check PHP files
    #[command(visible_alias = "check")]
    Lint(LintArgs),
    /// Inspect and configure plugins
    Plugins(PluginsArgs),
    /// Create a settings file with defaults
    Init(InitArgs),
}

/// Arguments for the lint command.
#[derive(Args)]
pub struct LintArgs {
    /// Path to check (file or directory)
    pub path: PathBuf,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Analyze every file even if a cached result is valid
    #[arg(long)]
    pub no_cache: bool,

    /// Apply automatic fixes, then report what remains
    #[arg(long)]
    pub fix: bool,

    /// Only report these error types (repeatable)
    #[arg(short, long = "kind", value_name = "ERROR_TYPE")]
    pub kinds: Vec<String>,
}

#[derive(Args)]
pub struct PluginsArgs {
    #[command(subcommand)]
    pub command: PluginCommands,
}

#[derive(Subcommand)]
pub enum PluginCommands {
    /// List loaded plugins and load failures
    List,
    /// Show or change a plugin's options
    Config(PluginConfigArgs),
}

#[derive(Args)]
pub struct PluginConfigArgs {
    /// Plugin id
    pub id: String,

    /// Set an option (repeatable); lists are comma-separated
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Turn the plugin on
    #[arg(long)]
    pub enable: bool,

    /// Turn the plugin off
    #[arg(long, conflicts_with = "enable")]
    pub disable: bool,
}

/// Arguments for the init command.
#[derive(Args)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "phpsift.yaml")]
    pub output: PathBuf,
}

const DEFAULT_SETTINGS: &str = include_str!("templates/default.yaml");

/// Load settings from `explicit`, a discovered file, or defaults.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match explicit {
        Some(path) => Settings::parse_file(path)?,
        None => match Settings::discover(".") {
            Some(path) => Settings::parse_file(path)?,
            None => Settings::default(),
        },
    };
    config::validate(&settings)?;
    Ok(settings)
}

/// Run the lint command.
pub fn run_lint(args: &LintArgs, mut settings: Settings) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    if !args.path.exists() {
        eprintln!("Error: cannot access path {:?}", args.path);
        return Ok(EXIT_ERROR);
    }

    if args.no_cache {
        settings.cache.enabled = false;
    }

    let files = settings.collect_files(&args.path)?;
    if files.is_empty() {
        eprintln!("Warning: no files to scan");
        return Ok(EXIT_SUCCESS);
    }

    let analyzer = Arc::new(Analyzer::with_builtins(settings));
    let pretty = args.format == "pretty";
    let mut reports = collect_reports(&analyzer, files, pretty);

    let mut fixed = 0;
    if args.fix {
        for report in reports.iter_mut() {
            if report.diagnostics.is_empty() || report.error.is_some() {
                continue;
            }
            if analyzer.fix(&report.path, &report.diagnostics) {
                fixed += 1;
                *report = analyzer.analyze_report(&report.path);
            }
        }
    }

    if !args.kinds.is_empty() {
        let surface = analyzer.ui_surface();
        for unknown in surface.unknown_selections(FilterField::ErrorType, &args.kinds) {
            warn!(kind = unknown, "unknown error type in --kind");
        }
        for report in reports.iter_mut() {
            let diagnostics = std::mem::take(&mut report.diagnostics);
            report.diagnostics = surface.apply(FilterField::ErrorType, &args.kinds, diagnostics);
        }
    }

    let path_str = args.path.to_string_lossy().to_string();
    if pretty {
        report::write_pretty(&path_str, &args.path, &reports, fixed);
    } else {
        report::write_json(&path_str, &args.path, &reports)?;
    }

    if reports.iter().any(|r| !r.diagnostics.is_empty()) {
        Ok(EXIT_FAILED)
    } else if reports.iter().any(|r| r.error.is_some()) {
        Ok(EXIT_ERROR)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Drain a batch, with a progress bar in pretty mode. Reports come back
/// sorted by path.
fn collect_reports(analyzer: &Arc<Analyzer>, files: Vec<PathBuf>, progress: bool) -> Vec<FileReport> {
    let total = files.len();
    let bar = if progress && total > 1 {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };

    let mut reports = Vec::with_capacity(total);
    for report in analyzer.analyze_batch(files) {
        if let Some(bar) = &bar {
            bar.set_message(
                report
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            bar.inc(1);
        }
        reports.push(report);
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    reports.sort_by(|a, b| a.path.cmp(&b.path));
    reports
}

/// Run a plugins subcommand.
pub fn run_plugins(args: &PluginsArgs, settings: Settings) -> anyhow::Result<i32> {
    let mut analyzer = Analyzer::with_builtins(settings);

    match &args.command {
        PluginCommands::List => {
            let registry = analyzer.registry();
            report::write_plugin_list(&registry.plugins(), registry.report());
            Ok(EXIT_SUCCESS)
        }
        PluginCommands::Config(config_args) => run_plugin_config(config_args, &mut analyzer),
    }
}

fn run_plugin_config(args: &PluginConfigArgs, analyzer: &mut Analyzer) -> anyhow::Result<i32> {
    let schema = match analyzer.registry().schema(&args.id) {
        Ok(schema) => schema.clone(),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'phpsift plugins list' to see loaded plugins");
            return Ok(EXIT_ERROR);
        }
    };

    let mut updates = Map::new();
    for pair in &args.set {
        let Some((key, raw)) = pair.split_once('=') else {
            eprintln!("Error: expected KEY=VALUE, got {:?}", pair);
            return Ok(EXIT_ERROR);
        };
        let key = key.trim();
        let Some(option) = schema.get(key) else {
            eprintln!("Error: plugin '{}' has no option '{}'", args.id, key);
            return Ok(EXIT_ERROR);
        };
        let Some(value) = option.default.parse_like(raw.trim()) else {
            eprintln!(
                "Error: option '{}' expects a {} value, got {:?}",
                key,
                option.default.type_name(),
                raw
            );
            return Ok(EXIT_ERROR);
        };
        updates.insert(key.to_string(), value.to_json());
    }
    if args.enable || args.disable {
        updates.insert(ENABLED_KEY.to_string(), serde_json::Value::Bool(args.enable));
    }

    if !updates.is_empty() {
        if let Err(e) = analyzer.set_plugin_config(&args.id, &updates) {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    }

    let config = analyzer.get_plugin_config(&args.id)?;
    report::write_plugin_config(&args.id, &schema, config);
    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, DEFAULT_SETTINGS) {
        eprintln!("Error: failed to write settings: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to customize for your project", args.output.display());
    if SETTINGS_FILE_NAMES.iter().any(|n| args.output == Path::new(n)) {
        println!("  2. Run: phpsift lint .");
    } else {
        println!("  2. Run: phpsift lint . --settings {}", args.output.display());
    }

    Ok(EXIT_SUCCESS)
}
