//! Per-file analysis pipeline and batch driver.

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::ResultCache;
use crate::config::Settings;
use crate::detect::context::split_lines;
use crate::detect::{CheckRunner, Diagnostic};
use crate::fix::FixEngine;
use crate::plugin::{
    builtin::builtin_modules, ConfigError, ConfigStore, HookName, LoadReport, PluginConfig,
    PluginModule, PluginRegistry, UiSurface,
};

/// Outcome of analyzing one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    /// Served from the result cache.
    pub cached: bool,
    /// Why the file could not be analyzed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs checks and plugins over files.
///
/// Analysis borrows the analyzer immutably and may run on many threads.
/// Reloading plugins and changing their configuration need `&mut self`.
#[derive(Debug)]
pub struct Analyzer {
    settings: Settings,
    runner: CheckRunner,
    registry: PluginRegistry,
    cache: ResultCache,
    fixer: FixEngine,
}

impl Analyzer {
    /// Build an analyzer, loading `modules` into a fresh registry.
    pub fn new(settings: Settings, modules: Vec<Box<dyn PluginModule>>) -> Self {
        let store = match settings.plugins.resolved_config_file() {
            Some(path) => ConfigStore::load(path),
            None => ConfigStore::in_memory(),
        };
        let registry = PluginRegistry::new(modules, store, settings.plugins.disabled.clone());
        let cache = ResultCache::new(settings.cache.resolved_dir());

        Self {
            runner: CheckRunner::new(settings.checks),
            settings,
            registry,
            cache,
            fixer: FixEngine::new(),
        }
    }

    /// Analyzer with the built-in plugins.
    pub fn with_builtins(settings: Settings) -> Self {
        Self::new(settings, builtin_modules())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Diagnostics for `path`. Unreadable files give an empty list.
    pub fn analyze(&self, path: &Path) -> Vec<Diagnostic> {
        self.analyze_report(path).diagnostics
    }

    /// Analyze `path`, consulting the cache first.
    pub fn analyze_report(&self, path: &Path) -> FileReport {
        if let Some(diagnostics) = self.cache.get(path, &self.registry) {
            return FileReport {
                path: path.to_path_buf(),
                diagnostics,
                cached: true,
                error: None,
            };
        }

        match self.analyze_uncached(path) {
            Ok(diagnostics) => {
                self.cache.put(path, &diagnostics);
                FileReport {
                    path: path.to_path_buf(),
                    diagnostics,
                    cached: false,
                    error: None,
                }
            }
            Err(e) => {
                error!(path = %path.display(), error = %format!("{:#}", e), "analysis failed");
                FileReport {
                    path: path.to_path_buf(),
                    diagnostics: Vec::new(),
                    cached: false,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    /// Run the full pipeline without touching the cache.
    pub fn analyze_uncached(&self, path: &Path) -> anyhow::Result<Vec<Diagnostic>> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let lines = split_lines(&String::from_utf8_lossy(&bytes));

        let pre = self.registry.run_checks(HookName::PreAnalyze, path, &lines);
        let mut diagnostics = self.runner.run(&lines);
        diagnostics.extend(pre);
        diagnostics.extend(self.registry.run_checks(HookName::SyntaxCheck, path, &lines));
        diagnostics.extend(self.registry.run_checks(HookName::SemanticCheck, path, &lines));
        let post = self.registry.run_post_analyze(path, &lines, &diagnostics);
        diagnostics.extend(post);

        debug!(path = %path.display(), count = diagnostics.len(), "file analyzed");
        Ok(diagnostics)
    }

    /// Analyze files in parallel. Reports arrive on the returned channel
    /// in completion order; it closes after the last file.
    pub fn analyze_batch(self: &Arc<Self>, files: Vec<PathBuf>) -> Receiver<FileReport> {
        let (tx, rx) = unbounded();
        let analyzer = Arc::clone(self);
        std::thread::spawn(move || {
            info!(files = files.len(), "batch started");
            files.par_iter().for_each_with(tx, |tx, path| {
                // The receiver may have been dropped; the rest is wasted work
                // but harmless.
                let _ = tx.send(analyzer.analyze_report(path));
            });
        });
        rx
    }

    /// Apply fixes to `path`. Returns whether the file changed.
    pub fn fix(&self, path: &Path, diagnostics: &[Diagnostic]) -> bool {
        match self.fixer.fix_file(path, diagnostics, &self.registry) {
            Ok(true) => {
                self.cache.invalidate(path);
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(path = %path.display(), error = %format!("{:#}", e), "fix failed");
                false
            }
        }
    }

    /// Re-instantiate plugin modules. Cached results are dropped, since
    /// they may carry diagnostics from the previous plugin set.
    pub fn reload_plugins(&mut self) -> &LoadReport {
        self.drop_cached_results();
        self.registry.reload()
    }

    pub fn get_plugin_config(&self, id: &str) -> Result<&PluginConfig, ConfigError> {
        self.registry.config(id)
    }

    /// Validate and persist new option values for plugin `id`.
    pub fn set_plugin_config(
        &mut self,
        id: &str,
        values: &Map<String, Value>,
    ) -> Result<(), ConfigError> {
        self.registry.set_config(id, values)?;
        self.drop_cached_results();
        Ok(())
    }

    /// Presentation contributions from plugins.
    pub fn ui_surface(&self) -> UiSurface {
        self.registry.run_ui_extension()
    }

    fn drop_cached_results(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(error = %format!("{:#}", e), "cannot clear result cache");
        }
    }
}
