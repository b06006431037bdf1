//! Line-scoped automatic fixes.
//!
//! Diagnostics are applied bottom-up so an edit never shifts the line of
//! a diagnostic still waiting. Each built-in fix checks that its problem
//! is still present, which makes a second run over the same diagnostics a
//! no-op.

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::detect::context::{code_portion, is_in_string, scrub, split_lines};
use crate::detect::{closer_for, find_separator_gap, is_constant_name, Diagnostic, ErrorKind};
use crate::plugin::PluginRegistry;

lazy_static! {
    static ref QUOTED: Regex = Regex::new(r"'([^']+)'").unwrap();
}

/// Applies built-in fixes and hands the rest to `fix_error` plugins.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixEngine;

impl FixEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fix `path` in place. Returns `true` when the file was rewritten.
    pub fn fix_file(
        &self,
        path: &Path,
        diagnostics: &[Diagnostic],
        registry: &PluginRegistry,
    ) -> anyhow::Result<bool> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let original = split_lines(&content);
        let mut lines = original.clone();

        self.fix_lines(path, &mut lines, diagnostics, registry);
        if lines == original {
            debug!(path = %path.display(), "nothing to fix");
            return Ok(false);
        }

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut out = lines.join(newline);
        if content.ends_with('\n') {
            out.push_str(newline);
        }
        fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "file fixed");
        Ok(true)
    }

    /// Apply fixes to `lines`. Returns how many diagnostics changed something.
    pub fn fix_lines(
        &self,
        path: &Path,
        lines: &mut Vec<String>,
        diagnostics: &[Diagnostic],
        registry: &PluginRegistry,
    ) -> usize {
        let mut ordered: Vec<&Diagnostic> = diagnostics.iter().collect();
        ordered.sort_by(|a, b| b.line_number.cmp(&a.line_number));

        let mut fixed = 0;
        for diagnostic in ordered {
            let idx = diagnostic.line_number.wrapping_sub(1);
            if idx >= lines.len() {
                debug!(line = diagnostic.line_number, "diagnostic outside the file");
                continue;
            }
            let changed = match builtin_fix(&mut lines[idx], diagnostic) {
                Some(changed) => changed,
                None => registry.run_fix(path, lines, diagnostic),
            };
            if changed {
                fixed += 1;
            }
        }
        fixed
    }
}

/// Apply the built-in mapping for the diagnostic's kind, or `None` when
/// the kind has none.
fn builtin_fix(line: &mut String, diagnostic: &Diagnostic) -> Option<bool> {
    let changed = match diagnostic.kind {
        ErrorKind::MissingTerminator => add_terminator(line),
        ErrorKind::BareVariable => match quoted(&diagnostic.description) {
            Some(name) => add_sigil(line, &name),
            None => false,
        },
        ErrorKind::UnclosedSingleQuote => close_quote(line, '\''),
        ErrorKind::UnclosedDoubleQuote => close_quote(line, '"'),
        ErrorKind::MissingArraySeparator => add_separator(line),
        ErrorKind::UnclosedBracket => match quoted(&diagnostic.description)
            .and_then(|s| s.chars().next())
        {
            Some(open) => close_bracket(line, open),
            None => false,
        },
        _ => return None,
    };
    Some(changed)
}

/// First single-quoted fragment of a description.
fn quoted(description: &str) -> Option<String> {
    QUOTED
        .captures(description)
        .map(|caps| caps[1].to_string())
}

fn add_terminator(line: &mut String) -> bool {
    let code = code_portion(line).trim_end();
    if code.trim().is_empty() || code.ends_with(';') {
        return false;
    }
    let at = code.len();
    line.insert(at, ';');
    true
}

fn add_sigil(line: &mut String, name: &str) -> bool {
    let Ok(word) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
        return false;
    };
    let starts: Vec<usize> = word
        .find_iter(line)
        .map(|m| m.start())
        .filter(|&start| {
            let before = &line[..start];
            !(before.ends_with('$')
                || before.ends_with("->")
                || before.ends_with("::")
                || before.ends_with('\\')
                || is_in_string(line, start)
                || is_constant_name(line, start))
        })
        .collect();

    for start in starts.iter().rev() {
        line.insert(*start, '$');
    }
    !starts.is_empty()
}

fn close_quote(line: &mut String, quote: char) -> bool {
    let mut count = 0;
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            count += 1;
        }
    }
    if count % 2 == 0 {
        return false;
    }
    let end = line.trim_end().len();
    line.truncate(end);
    line.push(quote);
    line.push(';');
    true
}

fn add_separator(line: &mut String) -> bool {
    match find_separator_gap(line) {
        Some(at) => {
            line.insert(at, ',');
            true
        }
        None => false,
    }
}

fn close_bracket(line: &mut String, open: char) -> bool {
    let Some(close) = closer_for(open) else {
        return false;
    };
    let code = scrub(line);
    let opened = code.matches(open).count();
    let closed = code.matches(close).count();
    if opened <= closed {
        return false;
    }
    let end = line.trim_end().len();
    line.truncate(end);
    line.push(close);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::CheckRunner;

    fn diag(line: usize, kind: ErrorKind, description: &str) -> Diagnostic {
        Diagnostic::new(line, "", kind, description, "")
    }

    fn fix(src: &[&str], diags: &[Diagnostic]) -> (Vec<String>, usize) {
        let mut lines: Vec<String> = src.iter().map(|s| s.to_string()).collect();
        let n = FixEngine::new().fix_lines(
            Path::new("a.php"),
            &mut lines,
            diags,
            &PluginRegistry::empty(),
        );
        (lines, n)
    }

    #[test]
    fn test_terminator_goes_before_comment() {
        let (lines, n) = fix(
            &["$a = 1 // one", "$b = 2;"],
            &[diag(1, ErrorKind::MissingTerminator, ""), diag(2, ErrorKind::MissingTerminator, "")],
        );
        assert_eq!(lines, vec!["$a = 1; // one", "$b = 2;"]);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_bare_variable() {
        let (lines, _) = fix(
            &["count = count + $other->count . 'count'"],
            &[diag(1, ErrorKind::BareVariable, "variable 'count' is missing the '$' sigil")],
        );
        assert_eq!(lines, vec!["$count = $count + $other->count . 'count'"]);
    }

    #[test]
    fn test_constant_declarations_keep_their_names() {
        let description = "variable 'Open' is missing the '$' sigil";
        let (lines, n) = fix(
            &["    case Open = 'open';", "    const Open = 1;", "Open = 2;"],
            &[
                diag(1, ErrorKind::BareVariable, description),
                diag(2, ErrorKind::BareVariable, description),
                diag(3, ErrorKind::BareVariable, description),
            ],
        );
        assert_eq!(lines, vec!["    case Open = 'open';", "    const Open = 1;", "$Open = 2;"]);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_terminator_goes_before_open_block_comment() {
        let (lines, _) = fix(&["$a = 1 /* note"], &[diag(1, ErrorKind::MissingTerminator, "")]);
        assert_eq!(lines, vec!["$a = 1; /* note"]);
    }

    #[test]
    fn test_quote_and_bracket() {
        let (lines, _) = fix(
            &["$a = 'abc", "if ($x) {"],
            &[
                diag(1, ErrorKind::UnclosedSingleQuote, ""),
                diag(2, ErrorKind::UnclosedBracket, "'{' opened at column 9 but never closed"),
            ],
        );
        assert_eq!(lines, vec!["$a = 'abc';", "if ($x) {}"]);
    }

    #[test]
    fn test_array_separator() {
        let (lines, n) = fix(
            &["$a = ['one' 'two'];"],
            &[diag(1, ErrorKind::MissingArraySeparator, "")],
        );
        assert_eq!(lines, vec!["$a = ['one', 'two'];"]);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let src = "<?php\ncount = 5\n$list = ['a' 'b'];\n$name = 'abc";
        let original = split_lines(src);
        let diags = CheckRunner::default().run(&original);
        assert!(!diags.is_empty());

        let (once, n) = fix(&original.iter().map(String::as_str).collect::<Vec<_>>(), &diags);
        assert!(n > 0);
        let (twice, n) = fix(&once.iter().map(String::as_str).collect::<Vec<_>>(), &diags);
        assert_eq!(n, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_out_of_range_and_unmapped() {
        let (lines, n) = fix(
            &["$a = 1;"],
            &[
                diag(0, ErrorKind::MissingTerminator, ""),
                diag(9, ErrorKind::MissingTerminator, ""),
                diag(1, ErrorKind::XssRisk, ""),
            ],
        );
        assert_eq!(lines, vec!["$a = 1;"]);
        assert_eq!(n, 0);
    }
}
