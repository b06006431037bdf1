//! Security heuristics: injection and unsanitized output patterns.

use lazy_static::lazy_static;
use regex::Regex;

use super::context::{classify_lines, code_portion};
use super::{Diagnostic, ErrorKind};

type RuleTable = Vec<(Regex, &'static str)>;

lazy_static! {
    static ref SQL_INJECTION: RuleTable = vec![
        (Regex::new(r"\bmysqli_query\s*\(\s*[^,]+\s*,\s*\$[^)]*\)").unwrap(), "variable used directly in SQL query"),
        (Regex::new(r"\bmysql_query\s*\(\s*\$[^)]*\)").unwrap(), "variable used directly in SQL query"),
        (Regex::new(r"->\s*query\s*\(\s*\$[^)]*\)").unwrap(), "variable used directly in PDO query"),
        (Regex::new(r"(?i)\bSELECT\s+.*\s+FROM\s+.*\s+WHERE\s+.*=\s*\$").unwrap(), "SQL query built from a variable"),
        (Regex::new(r"(?i)\bINSERT\s+INTO\s+.*\s+VALUES\s*\(.*\$").unwrap(), "SQL query built from a variable"),
        (Regex::new(r"(?i)\bUPDATE\s+.*\s+SET\s+.*=\s*\$").unwrap(), "SQL query built from a variable"),
    ];

    static ref XSS: RuleTable = vec![
        (Regex::new(r"\b(echo|print)\s+\$_(POST|GET|REQUEST|COOKIE|SERVER)\b").unwrap(), "superglobal written directly to output"),
        (Regex::new(r"<\?=\s*\$_").unwrap(), "superglobal written through a short echo tag"),
        (Regex::new(r"\becho\s+\$\w+\s*\[").unwrap(), "array value written to output without sanitizing"),
    ];

    static ref FILE_INCLUSION: RuleTable = vec![
        (Regex::new(r"\b(include|include_once|require|require_once)\s*\(?\s*\$").unwrap(), "file included from a variable path"),
        (Regex::new(r"\bfile_get_contents\s*\(\s*\$").unwrap(), "file read from a variable path"),
    ];

    static ref COMMAND_INJECTION: RuleTable = vec![
        (Regex::new(r"\b(system|exec|shell_exec|passthru)\s*\(\s*\$").unwrap(), "command executed from a variable"),
        (Regex::new(r"\beval\s*\(\s*\$").unwrap(), "code evaluated from a variable"),
        (Regex::new(r"\b(popen|proc_open)\s*\(\s*\$").unwrap(), "process opened from a variable"),
    ];
}

/// Which rule families to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityRules {
    pub sql_injection: bool,
    pub xss: bool,
    pub file_inclusion: bool,
    pub command_injection: bool,
}

impl Default for SecurityRules {
    fn default() -> Self {
        Self {
            sql_injection: true,
            xss: true,
            file_inclusion: true,
            command_injection: true,
        }
    }
}

/// Report risky patterns, at most one per rule family and line.
pub fn check_security(lines: &[String], rules: &SecurityRules) -> Vec<Diagnostic> {
    let families: [(bool, &RuleTable, ErrorKind, &str); 4] = [
        (
            rules.sql_injection,
            &*SQL_INJECTION,
            ErrorKind::SqlInjectionRisk,
            "use prepared statements with bound parameters",
        ),
        (
            rules.xss,
            &*XSS,
            ErrorKind::XssRisk,
            "escape output with htmlspecialchars() or htmlentities()",
        ),
        (
            rules.file_inclusion,
            &*FILE_INCLUSION,
            ErrorKind::FileInclusionRisk,
            "validate the path against an allow-list before using it",
        ),
        (
            rules.command_injection,
            &*COMMAND_INJECTION,
            ErrorKind::CommandInjectionRisk,
            "avoid running user input; escape with escapeshellarg()",
        ),
    ];

    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.comment.starts_in_block {
            continue;
        }
        let code = code_portion(line);

        for (enabled, table, kind, suggestion) in families.iter() {
            if !enabled {
                continue;
            }
            let hit = table
                .iter()
                .find(|(pattern, _)| pattern.is_match(code))
                .map(|(_, description)| *description);
            let Some(description) = hit else {
                continue;
            };
            // Template regions only get the output checks.
            if ctx.non_code && *kind != ErrorKind::XssRisk {
                continue;
            }
            diagnostics.push(Diagnostic::new(
                idx + 1,
                line.trim(),
                kind.clone(),
                description,
                *suggestion,
            ));
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;

    fn kinds(src: &str, rules: &SecurityRules) -> Vec<(usize, ErrorKind)> {
        check_security(&split_lines(src), rules)
            .into_iter()
            .map(|d| (d.line_number, d.kind))
            .collect()
    }

    #[test]
    fn test_detects_each_family() {
        let src = r#"<?php
$r = mysqli_query($conn, $sql);
echo $_GET['name'];
include($page);
system($cmd);
$safe = htmlspecialchars($name);"#;
        assert_eq!(
            kinds(src, &SecurityRules::default()),
            vec![
                (2, ErrorKind::SqlInjectionRisk),
                (3, ErrorKind::XssRisk),
                (4, ErrorKind::FileInclusionRisk),
                (5, ErrorKind::CommandInjectionRisk),
            ]
        );
    }

    #[test]
    fn test_families_can_be_disabled() {
        let src = "<?php\nsystem($cmd);\necho $_POST['x'];";
        let rules = SecurityRules {
            command_injection: false,
            ..Default::default()
        };
        assert_eq!(kinds(src, &rules), vec![(3, ErrorKind::XssRisk)]);
    }

    #[test]
    fn test_short_echo_tag_in_template() {
        let src = "<?php $x = 1; ?>\n<p><?= $_GET['q'] ?></p>";
        assert_eq!(kinds(src, &SecurityRules::default()), vec![(2, ErrorKind::XssRisk)]);
    }

    #[test]
    fn test_comments_and_word_boundaries() {
        let src = "<?php\n// system($cmd);\n$out = shell_execute_safe($cmd);";
        assert!(kinds(src, &SecurityRules::default()).is_empty());
    }
}
