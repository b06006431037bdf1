//! Plugin loading, dependency resolution and hook dispatch.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::CacheEntry;
use crate::detect::Diagnostic;

use super::config::{ConfigError, ConfigSchema, ConfigStore, PluginConfig};
use super::{
    CacheContext, CacheVerdict, FixContext, Handler, HookContext, HookName, Plugin, PluginModule,
    UiSurface,
};

/// Why a plugin (or a whole module) was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("module '{module}' failed to instantiate: {message}")]
    Instantiation { module: String, message: String },
    #[error("duplicate plugin id '{0}'")]
    DuplicateId(String),
    #[error("plugin '{plugin}' depends on '{dependency}', which is not available")]
    MissingDependency { plugin: String, dependency: String },
    #[error("dependency cycle between plugins: {}", members.join(", "))]
    DependencyCycle { members: Vec<String> },
    #[error("plugin '{plugin}' depends on '{dependency}', which failed to load")]
    BlockedByFailedDependency { plugin: String, dependency: String },
}

/// Outcome of the last load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Loaded plugin ids with the pass (starting at 1) that loaded them.
    pub loaded: Vec<(String, usize)>,
    pub failures: Vec<LoadError>,
    /// Plugins excluded by settings.
    pub skipped: Vec<String>,
    /// `(plugin, hook)` bindings that were not registered.
    pub rejected_hooks: Vec<(String, String)>,
}

impl LoadReport {
    pub fn pass_of(&self, id: &str) -> Option<usize> {
        self.loaded.iter().find(|(l, _)| l == id).map(|(_, pass)| *pass)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.rejected_hooks.is_empty()
    }
}

/// Summary of a loaded plugin, for listings.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub dependencies: Vec<String>,
    /// Registered handler count per hook.
    pub hooks: Vec<(HookName, usize)>,
    pub enabled: bool,
    pub pass: usize,
}

struct LoadedPlugin {
    plugin: Box<dyn Plugin>,
    schema: ConfigSchema,
    config: PluginConfig,
    pass: usize,
}

/// Owns loaded plugins, their configuration and the hook table.
///
/// Mutation (reload, configuration updates) needs `&mut self`; dispatch
/// only reads, so one registry can serve many analyses at once.
pub struct PluginRegistry {
    modules: Vec<Box<dyn PluginModule>>,
    disabled: HashSet<String>,
    plugins: Vec<LoadedPlugin>,
    hooks: HashMap<HookName, Vec<(usize, Handler)>>,
    store: ConfigStore,
    report: LoadReport,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("modules", &self.modules.len())
            .field("plugins", &self.plugins.len())
            .field("report", &self.report)
            .finish()
    }
}

impl PluginRegistry {
    /// Load `modules`, skipping plugin ids listed in `disabled`.
    pub fn new(
        modules: Vec<Box<dyn PluginModule>>,
        store: ConfigStore,
        disabled: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut registry = Self {
            modules,
            disabled: disabled.into_iter().collect(),
            plugins: Vec::new(),
            hooks: HashMap::new(),
            store,
            report: LoadReport::default(),
        };
        registry.load();
        registry
    }

    /// A registry with no plugins.
    pub fn empty() -> Self {
        Self::new(Vec::new(), ConfigStore::in_memory(), Vec::new())
    }

    /// Re-instantiate every module and rebuild the hook table.
    pub fn reload(&mut self) -> &LoadReport {
        self.load();
        &self.report
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    fn load(&mut self) {
        self.plugins.clear();
        self.hooks.clear();
        let mut report = LoadReport::default();

        let candidates = self.instantiate_all(&mut report);
        let known: HashSet<String> = candidates.iter().map(|p| p.id().to_string()).collect();

        // Pass k loads what depends only on plugins loaded before pass k.
        let mut loaded_ids: HashSet<String> = HashSet::new();
        let mut remaining = candidates;
        let mut pass = 0;
        loop {
            pass += 1;
            let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|p| {
                p.dependencies()
                    .iter()
                    .all(|dep| loaded_ids.contains(dep))
            });
            remaining = blocked;
            if ready.is_empty() {
                break;
            }
            for plugin in ready {
                let id = plugin.id().to_string();
                let schema = plugin.config_schema();
                let config = schema.merge(&id, self.store.get(&id));
                info!(plugin = %id, pass, "plugin loaded");
                report.loaded.push((id, pass));
                self.plugins.push(LoadedPlugin {
                    plugin,
                    schema,
                    config,
                    pass,
                });
            }
            loaded_ids.extend(report.loaded.iter().map(|(id, _)| id.clone()));
        }

        for failure in classify_failures(&remaining, &known, &loaded_ids) {
            warn!(error = %failure, "plugin not loaded");
            report.failures.push(failure);
        }

        self.register_hooks(&mut report);
        debug!(
            loaded = report.loaded.len(),
            failed = report.failures.len(),
            "plugin load finished"
        );
        self.report = report;
    }

    fn instantiate_all(&self, report: &mut LoadReport) -> Vec<Box<dyn Plugin>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        for module in &self.modules {
            let result = catch_unwind(AssertUnwindSafe(|| module.instantiate()))
                .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(&panic))));
            let plugins = match result {
                Ok(plugins) => plugins,
                Err(e) => {
                    let failure = LoadError::Instantiation {
                        module: module.name().to_string(),
                        message: format!("{:#}", e),
                    };
                    warn!(error = %failure, "plugin module failed");
                    report.failures.push(failure);
                    continue;
                }
            };

            for plugin in plugins {
                let id = plugin.id().to_string();
                if self.disabled.contains(&id) {
                    info!(plugin = %id, "plugin disabled by settings");
                    report.skipped.push(id);
                    continue;
                }
                if !seen.insert(id.clone()) {
                    warn!(plugin = %id, module = module.name(), "duplicate plugin id");
                    report.failures.push(LoadError::DuplicateId(id));
                    continue;
                }
                candidates.push(plugin);
            }
        }

        candidates
    }

    fn register_hooks(&mut self, report: &mut LoadReport) {
        for (idx, loaded) in self.plugins.iter().enumerate() {
            let id = loaded.plugin.id();
            for binding in loaded.plugin.hooks() {
                match HookName::parse(&binding.hook) {
                    Some(hook) if binding.handler.fits(hook) => {
                        self.hooks.entry(hook).or_default().push((idx, binding.handler));
                    }
                    Some(hook) => {
                        warn!(
                            plugin = id,
                            hook = %hook,
                            handler = binding.handler.kind(),
                            "handler does not fit hook"
                        );
                        report.rejected_hooks.push((id.to_string(), binding.hook));
                    }
                    None => {
                        warn!(plugin = id, hook = %binding.hook, "unknown hook name");
                        report.rejected_hooks.push((id.to_string(), binding.hook));
                    }
                }
            }
        }
    }

    /// Loaded plugins in load order.
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(idx, loaded)| {
                let hooks = HookName::all()
                    .iter()
                    .filter_map(|hook| {
                        let count = self
                            .hooks
                            .get(hook)
                            .map(|hs| hs.iter().filter(|(owner, _)| *owner == idx).count())
                            .unwrap_or(0);
                        (count > 0).then_some((*hook, count))
                    })
                    .collect();
                let p = &loaded.plugin;
                PluginInfo {
                    id: p.id().to_string(),
                    name: p.name().to_string(),
                    description: p.description().to_string(),
                    version: p.version().to_string(),
                    author: p.author().to_string(),
                    dependencies: p.dependencies(),
                    hooks,
                    enabled: loaded.config.is_enabled(),
                    pass: loaded.pass,
                }
            })
            .collect()
    }

    /// Number of registered handlers for a hook.
    pub fn handler_count(&self, hook: HookName) -> usize {
        self.hooks.get(&hook).map(Vec::len).unwrap_or(0)
    }

    fn find(&self, id: &str) -> Result<&LoadedPlugin, ConfigError> {
        self.plugins
            .iter()
            .find(|l| l.plugin.id() == id)
            .ok_or_else(|| ConfigError::UnknownPlugin(id.to_string()))
    }

    pub fn config(&self, id: &str) -> Result<&PluginConfig, ConfigError> {
        self.find(id).map(|l| &l.config)
    }

    pub fn schema(&self, id: &str) -> Result<&ConfigSchema, ConfigError> {
        self.find(id).map(|l| &l.schema)
    }

    /// Update options of one plugin and persist the whole store.
    ///
    /// Every key is validated before anything changes.
    pub fn set_config(&mut self, id: &str, values: &Map<String, Value>) -> Result<(), ConfigError> {
        let loaded = self.find(id)?;
        let mut updated = loaded.config.clone();
        for (key, raw) in values {
            let value = loaded.schema.check(id, key, raw)?;
            updated.set(key.clone(), value);
        }

        // Memory and disk change together or not at all.
        let previous = self.store.set(id, updated.to_json());
        if let Err(e) = self.store.save() {
            self.store.restore(id, previous);
            warn!(plugin = id, error = %e, "plugin config not saved");
            return Err(e);
        }
        if let Some(loaded) = self.plugins.iter_mut().find(|l| l.plugin.id() == id) {
            loaded.config = updated;
        }
        info!(plugin = id, "plugin config saved");
        Ok(())
    }

    /// Handlers for `hook` whose plugin is enabled, in registration order.
    fn active(&self, hook: HookName) -> impl Iterator<Item = (&LoadedPlugin, &Handler)> {
        self.hooks
            .get(&hook)
            .into_iter()
            .flatten()
            .map(|(idx, handler)| (&self.plugins[*idx], handler))
            .filter(|(loaded, _)| loaded.config.is_enabled())
    }

    /// Run `pre_analyze`, `syntax_check` or `semantic_check` handlers.
    pub fn run_checks(&self, hook: HookName, path: &Path, lines: &[String]) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (loaded, handler) in self.active(hook) {
            let Handler::Check(f) = handler else {
                continue;
            };
            let ctx = HookContext {
                path,
                lines,
                config: &loaded.config,
            };
            if let Some(found) = guarded(loaded.plugin.id(), hook, || f(&ctx)) {
                out.extend(stamp(found, loaded.plugin.name()));
            }
        }
        out
    }

    /// Run `post_analyze` handlers over the assembled list.
    pub fn run_post_analyze(
        &self,
        path: &Path,
        lines: &[String],
        diagnostics: &[Diagnostic],
    ) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (loaded, handler) in self.active(HookName::PostAnalyze) {
            let Handler::PostAnalyze(f) = handler else {
                continue;
            };
            let ctx = HookContext {
                path,
                lines,
                config: &loaded.config,
            };
            if let Some(found) = guarded(loaded.plugin.id(), HookName::PostAnalyze, || {
                f(&ctx, diagnostics)
            }) {
                out.extend(stamp(found, loaded.plugin.name()));
            }
        }
        out
    }

    /// Offer a diagnostic to `fix_error` handlers until one fixes it.
    ///
    /// A handler that fails leaves `lines` as they were before it ran.
    pub fn run_fix(&self, path: &Path, lines: &mut Vec<String>, diagnostic: &Diagnostic) -> bool {
        for (loaded, handler) in self.active(HookName::FixError) {
            let Handler::Fix(f) = handler else {
                continue;
            };
            let snapshot = lines.clone();
            let mut ctx = FixContext {
                path,
                lines: &mut *lines,
                diagnostic,
                config: &loaded.config,
            };
            match guarded(loaded.plugin.id(), HookName::FixError, || f(&mut ctx)) {
                Some(true) => {
                    debug!(plugin = loaded.plugin.id(), line = diagnostic.line_number, "fixed by plugin");
                    return true;
                }
                Some(false) => {}
                None => *lines = snapshot,
            }
        }
        false
    }

    /// Ask `cache_invalidate` handlers whether a cached entry still holds.
    ///
    /// Any explicit `Invalid` wins; abstaining and failing count as valid.
    pub fn run_cache_invalidate(&self, path: &Path, entry: &CacheEntry) -> bool {
        for (loaded, handler) in self.active(HookName::CacheInvalidate) {
            let Handler::CacheInvalidate(f) = handler else {
                continue;
            };
            let ctx = CacheContext {
                path,
                entry,
                config: &loaded.config,
            };
            if guarded(loaded.plugin.id(), HookName::CacheInvalidate, || f(&ctx))
                == Some(CacheVerdict::Invalid)
            {
                debug!(plugin = loaded.plugin.id(), path = %path.display(), "cache entry invalidated");
                return false;
            }
        }
        true
    }

    /// Collect presentation contributions.
    pub fn run_ui_extension(&self) -> UiSurface {
        let mut surface = UiSurface::default();
        for (loaded, handler) in self.active(HookName::UiExtension) {
            let Handler::UiExtension(f) = handler else {
                continue;
            };
            if let Some(filters) =
                guarded(loaded.plugin.id(), HookName::UiExtension, || f(&loaded.config))
            {
                surface.filters.extend(filters);
            }
        }
        surface
    }
}

/// Give default-category diagnostics the plugin's display name.
fn stamp(diagnostics: Vec<Diagnostic>, name: &str) -> impl Iterator<Item = Diagnostic> + '_ {
    diagnostics.into_iter().map(move |d| {
        if d.has_default_category() {
            d.with_category(name)
        } else {
            d
        }
    })
}

/// Run a handler, turning errors and panics into a logged `None`.
fn guarded<T>(plugin: &str, hook: HookName, f: impl FnOnce() -> anyhow::Result<T>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(plugin, hook = %hook, error = %format!("{:#}", e), "hook handler failed");
            None
        }
        Err(panic) => {
            error!(plugin, hook = %hook, panic = %panic_message(&panic), "hook handler panicked");
            None
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Explain why each remaining plugin could not load.
fn classify_failures(
    remaining: &[Box<dyn Plugin>],
    known: &HashSet<String>,
    loaded: &HashSet<String>,
) -> Vec<LoadError> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let nodes: HashMap<String, NodeIndex> = remaining
        .iter()
        .map(|p| (p.id().to_string(), graph.add_node(p.id().to_string())))
        .collect();
    for plugin in remaining {
        let from = nodes[plugin.id()];
        for dep in plugin.dependencies() {
            if let Some(&to) = nodes.get(&dep) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycle_of: HashMap<NodeIndex, usize> = HashMap::new();
    let sccs: Vec<Vec<NodeIndex>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .collect();
    for (i, scc) in sccs.iter().enumerate() {
        for node in scc {
            cycle_of.insert(*node, i);
        }
    }

    let mut reported_cycles: HashSet<usize> = HashSet::new();
    let mut failures = Vec::new();
    for plugin in remaining {
        let id = plugin.id().to_string();
        let deps = plugin.dependencies();

        if let Some(missing) = deps.iter().find(|d| !known.contains(*d)) {
            failures.push(LoadError::MissingDependency {
                plugin: id,
                dependency: missing.clone(),
            });
            continue;
        }

        if let Some(&cycle) = cycle_of.get(&nodes[&id]) {
            if reported_cycles.insert(cycle) {
                let mut members: Vec<String> =
                    sccs[cycle].iter().map(|n| graph[*n].clone()).collect();
                members.sort();
                failures.push(LoadError::DependencyCycle { members });
            }
            continue;
        }

        let dependency = deps
            .iter()
            .find(|d| !loaded.contains(*d))
            .cloned()
            .unwrap_or_default();
        failures.push(LoadError::BlockedByFailedDependency {
            plugin: id,
            dependency,
        });
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ErrorKind, DEFAULT_CATEGORY};
    use crate::plugin::{ConfigValue, HookBinding};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    type HookFactory = Arc<dyn Fn() -> Vec<HookBinding> + Send + Sync>;

    struct TestPlugin {
        id: String,
        deps: Vec<String>,
        hooks: HookFactory,
    }

    impl Plugin for TestPlugin {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            "Test Plugin"
        }
        fn hooks(&self) -> Vec<HookBinding> {
            (self.hooks)()
        }
        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new().option("level", ConfigValue::Int(1), "Level")
        }
    }

    struct TestModule {
        name: &'static str,
        specs: Vec<(&'static str, Vec<&'static str>, HookFactory)>,
    }

    impl PluginModule for TestModule {
        fn name(&self) -> &str {
            self.name
        }
        fn instantiate(&self) -> anyhow::Result<Vec<Box<dyn Plugin>>> {
            Ok(self
                .specs
                .iter()
                .map(|(id, deps, hooks)| {
                    Box::new(TestPlugin {
                        id: id.to_string(),
                        deps: deps.iter().map(|d| d.to_string()).collect(),
                        hooks: hooks.clone(),
                    }) as Box<dyn Plugin>
                })
                .collect())
        }
    }

    struct BrokenModule;

    impl PluginModule for BrokenModule {
        fn name(&self) -> &str {
            "broken"
        }
        fn instantiate(&self) -> anyhow::Result<Vec<Box<dyn Plugin>>> {
            anyhow::bail!("missing symbol")
        }
    }

    fn no_hooks() -> HookFactory {
        Arc::new(Vec::new)
    }

    fn reporting_hook(line: usize) -> HookFactory {
        Arc::new(move || {
            vec![HookBinding::new(
                HookName::SyntaxCheck,
                Handler::check(move |_| {
                    Ok(vec![Diagnostic::new(
                        line,
                        "x",
                        ErrorKind::Custom("test".to_string()),
                        "d",
                        "s",
                    )])
                }),
            )]
        })
    }

    fn registry(specs: Vec<(&'static str, Vec<&'static str>, HookFactory)>) -> PluginRegistry {
        PluginRegistry::new(
            vec![Box::new(TestModule { name: "test", specs })],
            ConfigStore::in_memory(),
            Vec::new(),
        )
    }

    fn path() -> PathBuf {
        PathBuf::from("index.php")
    }

    #[test]
    fn test_dependency_loads_in_next_pass() {
        // Listing order does not matter; passes do.
        let reg = registry(vec![
            ("c", vec!["b"], no_hooks()),
            ("b", vec!["a"], no_hooks()),
            ("a", vec![], no_hooks()),
        ]);
        let report = reg.report();
        assert_eq!(report.pass_of("a"), Some(1));
        assert_eq!(report.pass_of("b"), Some(2));
        assert_eq!(report.pass_of("c"), Some(3));
        assert!(report.is_clean());
    }

    #[test]
    fn test_failed_dependency_reports_both() {
        let reg = registry(vec![
            ("a", vec!["ghost"], no_hooks()),
            ("b", vec!["a"], no_hooks()),
        ]);
        let report = reg.report();
        assert!(report.loaded.is_empty());
        assert_eq!(
            report.failures,
            vec![
                LoadError::MissingDependency {
                    plugin: "a".to_string(),
                    dependency: "ghost".to_string()
                },
                LoadError::BlockedByFailedDependency {
                    plugin: "b".to_string(),
                    dependency: "a".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_cycle_is_named() {
        let reg = registry(vec![
            ("solo", vec![], no_hooks()),
            ("x", vec!["y"], no_hooks()),
            ("y", vec!["x"], no_hooks()),
            ("z", vec!["x"], no_hooks()),
        ]);
        let report = reg.report();
        assert_eq!(report.pass_of("solo"), Some(1));
        assert_eq!(
            report.failures,
            vec![
                LoadError::DependencyCycle {
                    members: vec!["x".to_string(), "y".to_string()]
                },
                LoadError::BlockedByFailedDependency {
                    plugin: "z".to_string(),
                    dependency: "x".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_duplicates_and_broken_modules() {
        let reg = PluginRegistry::new(
            vec![
                Box::new(TestModule {
                    name: "one",
                    specs: vec![("dup", vec![], no_hooks())],
                }),
                Box::new(BrokenModule),
                Box::new(TestModule {
                    name: "two",
                    specs: vec![("dup", vec![], no_hooks()), ("other", vec![], no_hooks())],
                }),
            ],
            ConfigStore::in_memory(),
            Vec::new(),
        );
        let report = reg.report();
        assert_eq!(report.loaded.len(), 2);
        assert!(report
            .failures
            .contains(&LoadError::DuplicateId("dup".to_string())));
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f, LoadError::Instantiation { module, .. } if module == "broken")));
    }

    #[test]
    fn test_disabled_by_settings() {
        let reg = PluginRegistry::new(
            vec![Box::new(TestModule {
                name: "test",
                specs: vec![("a", vec![], no_hooks()), ("b", vec!["a"], no_hooks())],
            })],
            ConfigStore::in_memory(),
            vec!["a".to_string()],
        );
        assert_eq!(reg.report().skipped, vec!["a".to_string()]);
        assert!(matches!(
            reg.report().failures[0],
            LoadError::MissingDependency { .. }
        ));
    }

    #[test]
    fn test_failing_handlers_do_not_stop_dispatch() {
        let failing: HookFactory = Arc::new(|| {
            vec![
                HookBinding::new(
                    HookName::SyntaxCheck,
                    Handler::check(|_| anyhow::bail!("boom")),
                ),
                HookBinding::new(
                    HookName::SyntaxCheck,
                    Handler::check(|_| panic!("handler bug")),
                ),
            ]
        });
        let reg = registry(vec![("bad", vec![], failing), ("good", vec![], reporting_hook(7))]);
        assert_eq!(reg.handler_count(HookName::SyntaxCheck), 3);

        let diags = reg.run_checks(HookName::SyntaxCheck, &path(), &[]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line_number, 7);
        assert_eq!(diags[0].category, "Test Plugin");
        assert_ne!(diags[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_unknown_hook_and_misfit_handler_rejected() {
        let odd: HookFactory = Arc::new(|| {
            vec![
                HookBinding {
                    hook: "on_save".to_string(),
                    handler: Handler::check(|_| Ok(vec![])),
                },
                HookBinding::new(HookName::FixError, Handler::check(|_| Ok(vec![]))),
            ]
        });
        let reg = registry(vec![("odd", vec![], odd)]);
        assert_eq!(reg.report().pass_of("odd"), Some(1));
        assert_eq!(reg.report().rejected_hooks.len(), 2);
        assert_eq!(reg.handler_count(HookName::FixError), 0);
    }

    #[test]
    fn test_disabled_plugin_is_skipped_and_config_persists() {
        let temp = TempDir::new().unwrap();
        let store_path = temp.path().join("plugin_config.json");
        let modules = || -> Vec<Box<dyn PluginModule>> {
            vec![Box::new(TestModule {
                name: "test",
                specs: vec![("a", vec![], reporting_hook(1))],
            })]
        };

        let mut reg = PluginRegistry::new(modules(), ConfigStore::load(&store_path), Vec::new());
        assert_eq!(reg.run_checks(HookName::SyntaxCheck, &path(), &[]).len(), 1);

        let update = json!({"enabled": false, "level": 3});
        reg.set_config("a", update.as_object().unwrap()).unwrap();
        assert!(reg.run_checks(HookName::SyntaxCheck, &path(), &[]).is_empty());

        let bad = json!({"level": "high"});
        assert!(matches!(
            reg.set_config("a", bad.as_object().unwrap()),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert_eq!(reg.config("a").unwrap().get_int("level"), Some(3));
        assert!(matches!(
            reg.set_config("nope", &Map::new()),
            Err(ConfigError::UnknownPlugin(_))
        ));

        // A fresh registry reads the saved store.
        let reloaded = PluginRegistry::new(modules(), ConfigStore::load(&store_path), Vec::new());
        assert!(!reloaded.config("a").unwrap().is_enabled());
        assert!(!reloaded.plugins()[0].enabled);
    }

    #[test]
    fn test_failed_save_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();
        let store = ConfigStore::load(blocker.join("plugin_config.json"));

        let mut reg = PluginRegistry::new(
            vec![Box::new(TestModule {
                name: "test",
                specs: vec![("a", vec![], no_hooks()), ("b", vec![], no_hooks())],
            })],
            store,
            Vec::new(),
        );

        let update = json!({"level": 3});
        assert!(matches!(
            reg.set_config("a", update.as_object().unwrap()),
            Err(ConfigError::Io(_))
        ));
        assert!(reg.store.get("a").is_none());
        assert_eq!(reg.config("a").unwrap().get_int("level"), Some(1));

        // A second failure does not drag the first update along either.
        assert!(reg.set_config("b", update.as_object().unwrap()).is_err());
        assert!(reg.store.get("a").is_none());
        assert!(reg.store.get("b").is_none());
    }

    #[test]
    fn test_fix_handler_rolls_back_on_failure() {
        let fixers: HookFactory = Arc::new(|| {
            vec![
                HookBinding::new(
                    HookName::FixError,
                    Handler::fix(|ctx| {
                        ctx.lines[0].push_str("garbage");
                        anyhow::bail!("half done")
                    }),
                ),
                HookBinding::new(
                    HookName::FixError,
                    Handler::fix(|ctx| {
                        ctx.lines[0].push(';');
                        Ok(true)
                    }),
                ),
            ]
        });
        let reg = registry(vec![("fixer", vec![], fixers)]);
        let mut lines = vec!["$a = 1".to_string()];
        let diag = Diagnostic::new(1, "$a = 1", ErrorKind::Custom("x".to_string()), "", "");
        assert!(reg.run_fix(&path(), &mut lines, &diag));
        assert_eq!(lines, vec!["$a = 1;".to_string()]);
    }

    #[test]
    fn test_reload_rebuilds_hooks() {
        let mut reg = registry(vec![("a", vec![], reporting_hook(1))]);
        assert_eq!(reg.handler_count(HookName::SyntaxCheck), 1);
        let report = reg.reload();
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(reg.handler_count(HookName::SyntaxCheck), 1);
    }
}
