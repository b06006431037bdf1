//! Check runner that sequences the built-in line checks.

use crate::config::CheckToggles;

use super::{
    check_arrays, check_functions, check_quotes, check_tags, check_terminators,
    check_variables, Diagnostic,
};

/// A built-in line check.
pub type LineCheck = fn(&[String]) -> Vec<Diagnostic>;

/// Category stamped on built-in diagnostics.
pub const BUILTIN_CATEGORY: &str = "phpsift";

/// Executes the enabled built-in checks against one file's lines.
#[derive(Debug, Clone)]
pub struct CheckRunner {
    toggles: CheckToggles,
}

impl CheckRunner {
    /// Create a runner with the given check switches.
    pub fn new(toggles: CheckToggles) -> Self {
        Self { toggles }
    }

    /// The enabled checks, in their fixed order.
    pub fn checks(&self) -> Vec<(&'static str, LineCheck)> {
        let t = &self.toggles;
        let all: [(bool, &'static str, LineCheck); 6] = [
            (t.terminator, "terminator", check_terminators),
            (t.quotes, "quotes", check_quotes),
            (t.tags, "tags", check_tags),
            (t.functions, "functions", check_functions),
            (t.arrays, "arrays", check_arrays),
            (t.variables, "variables", check_variables),
        ];
        all.into_iter()
            .filter(|(enabled, _, _)| *enabled)
            .map(|(_, name, check)| (name, check))
            .collect()
    }

    /// Run all enabled checks. Results keep check order, then line order
    /// within each check.
    pub fn run(&self, lines: &[String]) -> Vec<Diagnostic> {
        self.checks()
            .into_iter()
            .flat_map(|(name, check)| {
                check(lines).into_iter().map(move |d| {
                    d.with_category(format!("{}:{}", BUILTIN_CATEGORY, name))
                })
            })
            .collect()
    }
}

impl Default for CheckRunner {
    fn default() -> Self {
        Self::new(CheckToggles::default())
    }
}
