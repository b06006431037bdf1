//! Plugin contract, hook names and handler shapes.
//!
//! Plugins are compiled Rust values implementing [`Plugin`]. A
//! [`PluginModule`] stands where a plugin file would: it instantiates zero or
//! more plugins, and the [`PluginRegistry`] loads a list of modules,
//! resolving dependencies between the plugins they yield.

pub mod builtin;
pub mod config;
mod registry;

use std::path::Path;
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::detect::Diagnostic;

pub use config::{
    ConfigError, ConfigOption, ConfigSchema, ConfigStore, ConfigValue, PluginConfig, ENABLED_KEY,
};
pub use registry::{LoadError, LoadReport, PluginInfo, PluginRegistry};

/// Named extension points in the analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookName {
    PreAnalyze,
    PostAnalyze,
    SyntaxCheck,
    SemanticCheck,
    FixError,
    UiExtension,
    CacheInvalidate,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::PreAnalyze => "pre_analyze",
            HookName::PostAnalyze => "post_analyze",
            HookName::SyntaxCheck => "syntax_check",
            HookName::SemanticCheck => "semantic_check",
            HookName::FixError => "fix_error",
            HookName::UiExtension => "ui_extension",
            HookName::CacheInvalidate => "cache_invalidate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_analyze" => Some(HookName::PreAnalyze),
            "post_analyze" => Some(HookName::PostAnalyze),
            "syntax_check" => Some(HookName::SyntaxCheck),
            "semantic_check" => Some(HookName::SemanticCheck),
            "fix_error" => Some(HookName::FixError),
            "ui_extension" => Some(HookName::UiExtension),
            "cache_invalidate" => Some(HookName::CacheInvalidate),
            _ => None,
        }
    }

    pub fn all() -> &'static [HookName] {
        &[
            HookName::PreAnalyze,
            HookName::PostAnalyze,
            HookName::SyntaxCheck,
            HookName::SemanticCheck,
            HookName::FixError,
            HookName::UiExtension,
            HookName::CacheInvalidate,
        ]
    }
}

impl std::fmt::Display for HookName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input to check-style handlers.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub path: &'a Path,
    pub lines: &'a [String],
    /// The handling plugin's own effective configuration.
    pub config: &'a PluginConfig,
}

/// Input to `fix_error` handlers. Handlers edit `lines` in place.
#[derive(Debug)]
pub struct FixContext<'a> {
    pub path: &'a Path,
    pub lines: &'a mut Vec<String>,
    pub diagnostic: &'a Diagnostic,
    pub config: &'a PluginConfig,
}

/// Input to `cache_invalidate` handlers.
#[derive(Debug, Clone, Copy)]
pub struct CacheContext<'a> {
    pub path: &'a Path,
    pub entry: &'a CacheEntry,
    pub config: &'a PluginConfig,
}

/// A `cache_invalidate` handler's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Abstain,
    Valid,
    Invalid,
}

pub type CheckFn = dyn Fn(&HookContext<'_>) -> anyhow::Result<Vec<Diagnostic>> + Send + Sync;
pub type PostAnalyzeFn =
    dyn Fn(&HookContext<'_>, &[Diagnostic]) -> anyhow::Result<Vec<Diagnostic>> + Send + Sync;
pub type FixFn = dyn Fn(&mut FixContext<'_>) -> anyhow::Result<bool> + Send + Sync;
pub type CacheInvalidateFn = dyn Fn(&CacheContext<'_>) -> anyhow::Result<CacheVerdict> + Send + Sync;
pub type UiExtensionFn = dyn Fn(&PluginConfig) -> anyhow::Result<Vec<DiagnosticFilter>> + Send + Sync;

/// A hook handler. The variant must fit the hook it is bound to.
#[derive(Clone)]
pub enum Handler {
    /// `pre_analyze`, `syntax_check` and `semantic_check`.
    Check(Arc<CheckFn>),
    PostAnalyze(Arc<PostAnalyzeFn>),
    /// Returns `true` when the diagnostic was fixed.
    Fix(Arc<FixFn>),
    CacheInvalidate(Arc<CacheInvalidateFn>),
    UiExtension(Arc<UiExtensionFn>),
}

impl Handler {
    pub fn check<F>(f: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> anyhow::Result<Vec<Diagnostic>> + Send + Sync + 'static,
    {
        Handler::Check(Arc::new(f))
    }

    pub fn post_analyze<F>(f: F) -> Self
    where
        F: Fn(&HookContext<'_>, &[Diagnostic]) -> anyhow::Result<Vec<Diagnostic>>
            + Send
            + Sync
            + 'static,
    {
        Handler::PostAnalyze(Arc::new(f))
    }

    pub fn fix<F>(f: F) -> Self
    where
        F: Fn(&mut FixContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Handler::Fix(Arc::new(f))
    }

    pub fn cache_invalidate<F>(f: F) -> Self
    where
        F: Fn(&CacheContext<'_>) -> anyhow::Result<CacheVerdict> + Send + Sync + 'static,
    {
        Handler::CacheInvalidate(Arc::new(f))
    }

    pub fn ui_extension<F>(f: F) -> Self
    where
        F: Fn(&PluginConfig) -> anyhow::Result<Vec<DiagnosticFilter>> + Send + Sync + 'static,
    {
        Handler::UiExtension(Arc::new(f))
    }

    /// Whether this handler shape can serve `hook`.
    pub fn fits(&self, hook: HookName) -> bool {
        matches!(
            (self, hook),
            (
                Handler::Check(_),
                HookName::PreAnalyze | HookName::SyntaxCheck | HookName::SemanticCheck
            ) | (Handler::PostAnalyze(_), HookName::PostAnalyze)
                | (Handler::Fix(_), HookName::FixError)
                | (Handler::CacheInvalidate(_), HookName::CacheInvalidate)
                | (Handler::UiExtension(_), HookName::UiExtension)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Check(_) => "check",
            Handler::PostAnalyze(_) => "post_analyze",
            Handler::Fix(_) => "fix",
            Handler::CacheInvalidate(_) => "cache_invalidate",
            Handler::UiExtension(_) => "ui_extension",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}

/// A handler bound to a hook by name.
///
/// The name stays a string so that plugins naming a hook that does not
/// exist can be reported instead of failing to build.
#[derive(Debug, Clone)]
pub struct HookBinding {
    pub hook: String,
    pub handler: Handler,
}

impl HookBinding {
    pub fn new(hook: HookName, handler: Handler) -> Self {
        Self {
            hook: hook.as_str().to_string(),
            handler,
        }
    }
}

/// The capability set every plugin implements.
pub trait Plugin: Send + Sync {
    /// Unique id across the loaded set.
    fn id(&self) -> &str;
    /// Display name; stamped on diagnostics left at the default category.
    fn name(&self) -> &str;
    fn description(&self) -> &str {
        ""
    }
    fn version(&self) -> &str {
        "0.0.0"
    }
    fn author(&self) -> &str {
        ""
    }
    /// Handlers in the order they should run.
    fn hooks(&self) -> Vec<HookBinding>;
    /// Ids of plugins that must load first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }
}

/// A loadable unit yielding plugins.
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;
    fn instantiate(&self) -> anyhow::Result<Vec<Box<dyn Plugin>>>;
}

/// Which diagnostic field a filter selects on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    ErrorType,
    Category,
}

impl FilterField {
    fn value_of<'d>(&self, diagnostic: &'d Diagnostic) -> &'d str {
        match self {
            FilterField::ErrorType => diagnostic.kind.as_str(),
            FilterField::Category => &diagnostic.category,
        }
    }
}

/// A diagnostic filter contributed through `ui_extension`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFilter {
    pub plugin: String,
    pub label: String,
    pub field: FilterField,
    /// Known values, for presentation.
    pub options: Vec<String>,
}

/// Everything plugins contributed to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct UiSurface {
    pub filters: Vec<DiagnosticFilter>,
}

impl UiSurface {
    pub fn filter_for(&self, field: FilterField) -> Option<&DiagnosticFilter> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// Keep diagnostics whose `field` is one of `selected`.
    ///
    /// With nothing selected, or no plugin contributing a filter on
    /// `field`, the list is returned unchanged.
    pub fn apply(
        &self,
        field: FilterField,
        selected: &[String],
        diagnostics: Vec<Diagnostic>,
    ) -> Vec<Diagnostic> {
        if selected.is_empty() || self.filter_for(field).is_none() {
            return diagnostics;
        }
        diagnostics
            .into_iter()
            .filter(|d| selected.iter().any(|s| s == field.value_of(d)))
            .collect()
    }

    /// Selected values the contributing filter does not list.
    pub fn unknown_selections<'s>(&self, field: FilterField, selected: &'s [String]) -> Vec<&'s str> {
        match self.filter_for(field) {
            Some(filter) => selected
                .iter()
                .filter(|s| !filter.options.contains(*s))
                .map(String::as_str)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ErrorKind;

    #[test]
    fn test_hook_name_tags() {
        for hook in HookName::all() {
            assert_eq!(HookName::parse(hook.as_str()), Some(*hook));
        }
        assert_eq!(HookName::parse("on_save"), None);
    }

    #[test]
    fn test_handler_fits() {
        let check = Handler::check(|_| Ok(vec![]));
        assert!(check.fits(HookName::SyntaxCheck));
        assert!(check.fits(HookName::PreAnalyze));
        assert!(!check.fits(HookName::FixError));
        let fix = Handler::fix(|_| Ok(false));
        assert!(fix.fits(HookName::FixError));
        assert!(!fix.fits(HookName::PostAnalyze));
    }

    #[test]
    fn test_ui_surface_apply() {
        let diags = vec![
            Diagnostic::new(1, "a", ErrorKind::MissingTerminator, "", ""),
            Diagnostic::new(2, "b", ErrorKind::BareVariable, "", ""),
        ];
        let empty = UiSurface::default();
        let selected = vec!["bare_variable".to_string()];
        assert_eq!(empty.apply(FilterField::ErrorType, &selected, diags.clone()).len(), 2);

        let surface = UiSurface {
            filters: vec![DiagnosticFilter {
                plugin: "kind_filter".to_string(),
                label: "Error type".to_string(),
                field: FilterField::ErrorType,
                options: vec!["bare_variable".to_string()],
            }],
        };
        let kept = surface.apply(FilterField::ErrorType, &selected, diags);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].line_number, 2);

        let odd = vec!["nope".to_string()];
        assert_eq!(surface.unknown_selections(FilterField::ErrorType, &odd), vec!["nope"]);
    }
}
