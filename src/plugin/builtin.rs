//! Plugins shipped with phpsift.

use crate::config::matches_any_glob;
use crate::detect::{check_brackets, check_security, ErrorKind, SecurityRules};

use super::{
    ConfigSchema, ConfigValue, DiagnosticFilter, FilterField, Handler, HookBinding, HookName,
    Plugin, PluginModule,
};

const AUTHOR: &str = "phpsift";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The module holding every built-in plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinModule;

impl PluginModule for BuiltinModule {
    fn name(&self) -> &str {
        "builtin"
    }

    fn instantiate(&self) -> anyhow::Result<Vec<Box<dyn Plugin>>> {
        Ok(vec![
            Box::new(BracketChecker),
            Box::new(SecurityChecker),
            Box::new(KindFilter),
        ])
    }
}

/// Default module list for an analyzer.
pub fn builtin_modules() -> Vec<Box<dyn PluginModule>> {
    vec![Box::new(BuiltinModule)]
}

fn strings(values: &[&str]) -> ConfigValue {
    ConfigValue::List(values.iter().map(|v| v.to_string()).collect())
}

/// Structural check over the whole file.
pub struct BracketChecker;

impl Plugin for BracketChecker {
    fn id(&self) -> &str {
        "bracket_checker"
    }

    fn name(&self) -> &str {
        "Bracket Checker"
    }

    fn description(&self) -> &str {
        "Finds unbalanced, mismatched and deeply nested brackets"
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn author(&self) -> &str {
        AUTHOR
    }

    fn hooks(&self) -> Vec<HookBinding> {
        vec![HookBinding::new(
            HookName::SyntaxCheck,
            Handler::check(|ctx| {
                if matches_any_glob(ctx.config.get_list("ignore_patterns"), ctx.path) {
                    return Ok(Vec::new());
                }
                let max_depth = match ctx.config.get_int("max_nesting_depth") {
                    Some(depth) if depth > 0 => Some(depth as usize),
                    _ => None,
                };
                Ok(check_brackets(&ctx.lines.join("\n"), max_depth))
            }),
        )]
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .option(
                "max_nesting_depth",
                ConfigValue::Int(5),
                "Deepest allowed nesting; 0 turns the limit off",
            )
            .option(
                "ignore_patterns",
                strings(&["**/vendor/**", "**/node_modules/**"]),
                "Paths this plugin skips",
            )
    }
}

/// Injection and unsanitized-output heuristics.
pub struct SecurityChecker;

impl Plugin for SecurityChecker {
    fn id(&self) -> &str {
        "security_checker"
    }

    fn name(&self) -> &str {
        "Security Checker"
    }

    fn description(&self) -> &str {
        "Flags SQL injection, XSS, file inclusion and command injection patterns"
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn author(&self) -> &str {
        AUTHOR
    }

    fn hooks(&self) -> Vec<HookBinding> {
        vec![HookBinding::new(
            HookName::SemanticCheck,
            Handler::check(|ctx| {
                if matches_any_glob(ctx.config.get_list("exclude_patterns"), ctx.path) {
                    return Ok(Vec::new());
                }
                let on = |key: &str| ctx.config.get_bool(key).unwrap_or(true);
                let rules = SecurityRules {
                    sql_injection: on("check_sql_injection"),
                    xss: on("check_xss"),
                    file_inclusion: on("check_file_inclusion"),
                    command_injection: on("check_command_injection"),
                };
                Ok(check_security(ctx.lines, &rules))
            }),
        )]
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .option("check_sql_injection", ConfigValue::Bool(true), "SQL built from variables")
            .option("check_xss", ConfigValue::Bool(true), "Unsanitized output")
            .option("check_file_inclusion", ConfigValue::Bool(true), "Includes from variable paths")
            .option(
                "check_command_injection",
                ConfigValue::Bool(true),
                "Shell and eval calls on variables",
            )
            .option(
                "exclude_patterns",
                strings(&["**/vendor/**", "**/tests/**"]),
                "Paths this plugin skips",
            )
    }
}

/// Offers a filter on the diagnostic kind.
pub struct KindFilter;

impl Plugin for KindFilter {
    fn id(&self) -> &str {
        "kind_filter"
    }

    fn name(&self) -> &str {
        "Error Type Filter"
    }

    fn description(&self) -> &str {
        "Lets reports be narrowed to selected error types"
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn author(&self) -> &str {
        AUTHOR
    }

    fn hooks(&self) -> Vec<HookBinding> {
        vec![HookBinding::new(
            HookName::UiExtension,
            Handler::ui_extension(|_| {
                Ok(vec![DiagnosticFilter {
                    plugin: "kind_filter".to_string(),
                    label: "Error type".to_string(),
                    field: FilterField::ErrorType,
                    options: ErrorKind::builtin()
                        .iter()
                        .map(|k| k.as_str().to_string())
                        .collect(),
                }])
            }),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;
    use crate::plugin::{ConfigStore, PluginRegistry};
    use serde_json::json;
    use std::path::Path;

    fn registry() -> PluginRegistry {
        PluginRegistry::new(builtin_modules(), ConfigStore::in_memory(), Vec::new())
    }

    #[test]
    fn test_builtins_load_in_first_pass() {
        let reg = registry();
        let report = reg.report();
        assert!(report.is_clean());
        for id in ["bracket_checker", "security_checker", "kind_filter"] {
            assert_eq!(report.pass_of(id), Some(1), "{}", id);
        }
    }

    #[test]
    fn test_bracket_checker_reports_with_plugin_name() {
        let reg = registry();
        let lines = split_lines("<?php\nif ($a) {\n    foo(;\n");
        let diags = reg.run_checks(HookName::SyntaxCheck, Path::new("src/a.php"), &lines);
        assert!(!diags.is_empty());
        assert!(diags.iter().all(|d| d.category == "Bracket Checker"));
        assert!(diags.iter().any(|d| d.kind == ErrorKind::UnclosedBracket));
    }

    #[test]
    fn test_bracket_checker_ignores_vendor() {
        let reg = registry();
        let lines = split_lines("<?php\n{");
        let diags = reg.run_checks(HookName::SyntaxCheck, Path::new("app/vendor/lib/a.php"), &lines);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_nesting_limit_is_configurable() {
        let mut reg = registry();
        let lines = split_lines("<?php\nf(g(h()));");
        let path = Path::new("a.php");
        assert!(reg.run_checks(HookName::SyntaxCheck, path, &lines).is_empty());

        let update = json!({"max_nesting_depth": 2});
        reg.set_config("bracket_checker", update.as_object().unwrap()).unwrap();
        let diags = reg.run_checks(HookName::SyntaxCheck, path, &lines);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::ExcessiveNesting);
    }

    #[test]
    fn test_security_switches() {
        let mut reg = registry();
        let lines = split_lines("<?php\nsystem($cmd);\necho $_GET['q'];");
        let path = Path::new("public/index.php");
        let diags = reg.run_checks(HookName::SemanticCheck, path, &lines);
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.category == "Security Checker"));

        let update = json!({"check_command_injection": false});
        reg.set_config("security_checker", update.as_object().unwrap()).unwrap();
        let diags = reg.run_checks(HookName::SemanticCheck, path, &lines);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::XssRisk);

        assert!(reg
            .run_checks(HookName::SemanticCheck, Path::new("tests/unit/a.php"), &lines)
            .is_empty());
    }

    #[test]
    fn test_kind_filter_lists_builtin_kinds() {
        let surface = registry().run_ui_extension();
        let filter = surface.filter_for(FilterField::ErrorType).unwrap();
        assert_eq!(filter.options.len(), ErrorKind::builtin().len());
        assert!(filter.options.iter().any(|o| o == "missing_terminator"));
    }
}
