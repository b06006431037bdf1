//! Project settings for phpsift.
//!
//! Settings come from a YAML file at the project root. Every field has a
//! default, so an empty file (or no file) is a valid configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File names probed, in order, when no settings path is given.
pub const SETTINGS_FILE_NAMES: &[&str] = &["phpsift.yaml", ".phpsift.yaml"];

/// Platform directories for cache and plugin configuration.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "phpsift")
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// File extensions (without the dot) treated as PHP sources.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns for paths to skip when walking a directory.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    /// Whether to descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub checks: CheckToggles,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub plugins: PluginSettings,
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["php".to_string()]
}

fn default_exclude() -> Vec<String> {
    vec!["**/vendor/**".to_string(), "**/node_modules/**".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: default_exclude(),
            recursive: true,
            checks: CheckToggles::default(),
            cache: CacheSettings::default(),
            plugins: PluginSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&content)
    }

    /// Parse settings from YAML text. Empty text yields the defaults.
    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Find a settings file in `dir`.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
        SETTINGS_FILE_NAMES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Check if a path should be excluded based on `exclude` patterns.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        matches_any_glob(&self.exclude, path)
    }

    /// Whether the path has one of the configured extensions.
    pub fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Collect source files under `root` (or `root` itself if it is a file).
    ///
    /// An explicitly named file is always returned, whatever its extension.
    pub fn collect_files<P: AsRef<Path>>(&self, root: P) -> anyhow::Result<Vec<PathBuf>> {
        let root = root.as_ref();
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }
        if !root.is_dir() {
            anyhow::bail!("path does not exist: {}", root.display());
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_path_excluded(e.path()))
        {
            let entry = entry?;
            if entry.file_type().is_file() && self.has_source_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Glob match with `**` support. Invalid patterns never match.
pub fn matches_any_glob(patterns: &[String], path: &Path) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let path_str = path.to_string_lossy();
    patterns.iter().any(|pattern| {
        globset::Glob::new(pattern)
            .map(|glob| glob.compile_matcher().is_match(&*path_str))
            .unwrap_or(false)
    })
}

/// Switches for the built-in checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckToggles {
    #[serde(default = "default_true")]
    pub terminator: bool,
    #[serde(default = "default_true")]
    pub quotes: bool,
    #[serde(default = "default_true")]
    pub tags: bool,
    #[serde(default = "default_true")]
    pub functions: bool,
    #[serde(default = "default_true")]
    pub arrays: bool,
    #[serde(default = "default_true")]
    pub variables: bool,
}

impl Default for CheckToggles {
    fn default() -> Self {
        Self {
            terminator: true,
            quotes: true,
            tags: true,
            functions: true,
            arrays: true,
            variables: true,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory (default: platform cache dir, `results` subdir)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheSettings {
    /// The directory to use, or `None` when caching is off or no
    /// platform directory is available.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.cache_dir().join("results")))
    }
}

/// Plugin loading and configuration storage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginSettings {
    /// Plugin configuration store (default: platform config dir)
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// Plugin ids that are never loaded.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl PluginSettings {
    pub fn resolved_config_file(&self) -> Option<PathBuf> {
        self.config_file
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join("plugin_config.json")))
    }
}

/// Validate settings for correctness.
pub fn validate(settings: &Settings) -> anyhow::Result<()> {
    if settings.extensions.iter().all(|e| e.trim().is_empty()) {
        anyhow::bail!("extensions must name at least one file extension");
    }

    for pattern in &settings.exclude {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid exclude pattern {:?}: {}", pattern, e))?;
    }

    for id in &settings.plugins.disabled {
        if id.trim().is_empty() {
            anyhow::bail!("plugins.disabled contains an empty plugin id");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_settings() {
        let yaml = r#"
extensions: [php, phtml]
exclude:
  - "**/legacy/**"
checks:
  variables: false
cache:
  enabled: false
plugins:
  disabled: [security_checker]
"#;
        let settings = Settings::parse_str(yaml).unwrap();
        assert_eq!(settings.extensions, vec!["php", "phtml"]);
        assert!(settings.checks.terminator);
        assert!(!settings.checks.variables);
        assert!(settings.cache.resolved_dir().is_none());
        assert_eq!(settings.plugins.disabled, vec!["security_checker"]);
        assert!(settings.recursive);
    }

    #[test]
    fn test_empty_settings_are_defaults() {
        let settings = Settings::parse_str("").unwrap();
        assert_eq!(settings.extensions, vec!["php"]);
        assert_eq!(settings.checks, CheckToggles::default());
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.exclude.push("[unclosed".to_string());
        assert!(validate(&settings).is_err());

        let settings = Settings {
            extensions: vec![],
            ..Default::default()
        };
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_collect_files_honors_extensions_and_excludes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::create_dir_all(root.join("vendor/lib")).unwrap();
        fs::write(root.join("index.php"), "<?php").unwrap();
        fs::write(root.join("src/deep/a.PHP"), "<?php").unwrap();
        fs::write(root.join("src/readme.md"), "# x").unwrap();
        fs::write(root.join("vendor/lib/b.php"), "<?php").unwrap();

        let settings = Settings::default();
        let files = settings.collect_files(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["index.php", "a.PHP"]);

        let flat = Settings {
            recursive: false,
            ..Default::default()
        };
        assert_eq!(flat.collect_files(root).unwrap().len(), 1);
    }

    #[test]
    fn test_discover() {
        let temp = TempDir::new().unwrap();
        assert!(Settings::discover(temp.path()).is_none());
        fs::write(temp.path().join(".phpsift.yaml"), "recursive: false\n").unwrap();
        let found = Settings::discover(temp.path()).unwrap();
        assert!(!Settings::parse_file(found).unwrap().recursive);
    }
}
