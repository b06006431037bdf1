//! Output formatting for phpsift results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output grouped per file
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analyzer::FileReport;
use crate::detect::{Diagnostic, ErrorKind};
use crate::plugin::{ConfigSchema, LoadReport, PluginConfig, PluginInfo};

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub files_scanned: usize,
    pub files_failed: usize,
    pub diagnostic_count: usize,
    pub files: Vec<JsonFile>,
}

/// Diagnostics of one file.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonFile {
    pub file: String,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the JSON report. Files with neither diagnostics nor errors are
/// left out of `files`.
pub fn build_json(path: &str, base: &Path, reports: &[FileReport]) -> JsonReport {
    let files = reports
        .iter()
        .filter(|r| !r.diagnostics.is_empty() || r.error.is_some())
        .map(|r| JsonFile {
            file: make_relative_path(&r.path, base),
            cached: r.cached,
            error: r.error.clone(),
            diagnostics: r.diagnostics.clone(),
        })
        .collect();

    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        files_scanned: reports.len(),
        files_failed: reports.iter().filter(|r| r.error.is_some()).count(),
        diagnostic_count: reports.iter().map(|r| r.diagnostics.len()).sum(),
        files,
    }
}

/// Write results in JSON format.
pub fn write_json(path: &str, base: &Path, reports: &[FileReport]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&build_json(path, base, reports))?;
    println!("{}", json);
    Ok(())
}

/// Path relative to `base` when possible.
fn make_relative_path(file: &Path, base: &Path) -> String {
    let base_dir = if base.is_file() {
        base.parent().unwrap_or(base)
    } else {
        base
    };
    file.strip_prefix(base_dir)
        .unwrap_or(file)
        .to_string_lossy()
        .into_owned()
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty(path: &str, base: &Path, reports: &[FileReport], fixed: usize) {
    // Header
    println!();
    print!("  ");
    print!("{}", "phpsift".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    println!();

    let total: usize = reports.iter().map(|r| r.diagnostics.len()).sum();
    let with_issues = reports.iter().filter(|r| !r.diagnostics.is_empty()).count();
    let cached = reports.iter().filter(|r| r.cached).count();

    for report in reports {
        if let Some(error) = &report.error {
            print!("  {} ", "SKIP".red());
            print!("{}", make_relative_path(&report.path, base).blue());
            println!("  {}", error.dimmed());
            println!();
            continue;
        }
        if report.diagnostics.is_empty() {
            continue;
        }
        write_file_diagnostics(&make_relative_path(&report.path, base), &report.diagnostics);
        println!();
    }

    // Summary
    if total == 0 {
        print!("  {}", "✓ CLEAN".green());
    } else {
        print!("  {}", "✗ ISSUES".red());
        print!(
            "  {} in {} of {} file{}",
            total.to_string().yellow().bold(),
            with_issues,
            reports.len(),
            plural(reports.len())
        );
    }
    if cached > 0 {
        print!("  {}", format!("({} cached)", cached).dimmed());
    }
    if fixed > 0 {
        print!("  {}", format!("{} fixed", fixed).green());
    }
    println!();
    println!();
}

fn write_file_diagnostics(file: &str, diagnostics: &[Diagnostic]) {
    println!(
        "  {} ({} issue{}):",
        file.bold(),
        diagnostics.len(),
        plural(diagnostics.len())
    );
    println!();

    for d in diagnostics {
        write_kind_tag(&d.kind);
        print!(" {}", format!("{:>4}", d.line_number).dimmed());
        print!("  {:<26}", d.kind.as_str());
        println!("{}", d.category.dimmed());

        println!("            {}", d.description);
        if !d.line_content.is_empty() {
            println!("            {}", d.line_content.dimmed());
        }
        if !d.suggestion.is_empty() {
            println!("            {} {}", "→".cyan(), d.suggestion);
        }
    }
}

fn write_kind_tag(kind: &ErrorKind) {
    match kind {
        ErrorKind::SqlInjectionRisk
        | ErrorKind::XssRisk
        | ErrorKind::FileInclusionRisk
        | ErrorKind::CommandInjectionRisk => print!("    {}", "RISK ".red().bold()),
        ErrorKind::UnclosedBracket
        | ErrorKind::MismatchedBracket
        | ErrorKind::UnopenedBracket
        | ErrorKind::TagAlreadyOpen
        | ErrorKind::TagClosedWithoutOpen => print!("    {}", "ERROR".red()),
        ErrorKind::Custom(_) => print!("    {}", "INFO ".blue()),
        _ => print!("    {}", "WARN ".yellow()),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// List loaded plugins and load problems.
pub fn write_plugin_list(plugins: &[PluginInfo], load: &LoadReport) {
    println!();
    println!("  {} ({}):", "Plugins".bold(), plugins.len());
    println!();

    for p in plugins {
        let state = if p.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "    {:<20} {} {}  {}",
            p.id.cyan(),
            p.name,
            format!("v{}", p.version).dimmed(),
            state
        );
        if !p.description.is_empty() {
            println!("      {}", p.description);
        }
        if !p.author.is_empty() {
            println!("      {} {}", "author:".dimmed(), p.author);
        }
        let hooks: Vec<String> = p
            .hooks
            .iter()
            .map(|(hook, count)| format!("{} ({})", hook, count))
            .collect();
        println!("      {} {}", "hooks:".dimmed(), hooks.join(", "));
        if !p.dependencies.is_empty() {
            println!("      {} {}", "depends on:".dimmed(), p.dependencies.join(", "));
        }
        println!("      {} {}", "load pass:".dimmed(), p.pass);
        println!();
    }

    if !load.skipped.is_empty() {
        println!("  {} {}", "Disabled in settings:".dimmed(), load.skipped.join(", "));
        println!();
    }

    if !load.failures.is_empty() {
        println!("  {} ({}):", "Load failures".red().bold(), load.failures.len());
        for failure in &load.failures {
            println!("    {} {}", "✗".red(), failure);
        }
        println!();
    }

    if !load.rejected_hooks.is_empty() {
        println!("  {} ({}):", "Rejected hooks".yellow(), load.rejected_hooks.len());
        for (plugin, hook) in &load.rejected_hooks {
            println!("    {} {}", plugin, hook.dimmed());
        }
        println!();
    }
}

/// Show one plugin's options with their current values.
pub fn write_plugin_config(id: &str, schema: &ConfigSchema, config: &PluginConfig) {
    println!();
    println!("  {} {}", "Plugin".bold(), id.cyan());
    println!();
    for option in schema.options() {
        let current = config
            .get(&option.key)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let marker = if config.get(&option.key) == Some(&option.default) {
            "".normal()
        } else {
            " (changed)".yellow()
        };
        println!(
            "    {:<26} {:<8} {}{}",
            option.key,
            option.default.type_name().dimmed(),
            current,
            marker
        );
        if !option.description.is_empty() {
            println!("      {}", option.description.dimmed());
        }
    }
    println!();
}
