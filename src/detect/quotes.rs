//! Unbalanced quote detection.

use lazy_static::lazy_static;
use regex::Regex;

use super::context::{classify_lines, code_portion};
use super::{Diagnostic, ErrorKind};

lazy_static! {
    /// Keywords that mark a line as part of a query string.
    static ref QUERY_KEYWORDS: Regex = Regex::new(
        r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|FROM|WHERE|JOIN|ORDER\s+BY|GROUP\s+BY|HAVING|UNION|CREATE|ALTER|DROP|INDEX)\b"
    ).unwrap();

    static ref QUERY_CALL: Regex = Regex::new(r"(?i)\b(prepare|query)\s*\(").unwrap();

    /// `echo`/`print` opening a string, with or without parentheses.
    static ref MULTILINE_ECHO: Regex = Regex::new(r#"^\s*(echo|print)\s*\(?\s*["']"#).unwrap();
}

/// Whether the line looks like the start of a query literal.
pub fn looks_like_query(line: &str) -> bool {
    QUERY_CALL.is_match(line) || QUERY_KEYWORDS.is_match(line)
}

/// Strings left open at the end of the line that opened them are allowed
/// to continue for queries and multi-line echo/print output.
fn is_legitimate_continuation(line: &str) -> bool {
    looks_like_query(line) || MULTILINE_ECHO.is_match(line.trim())
}

/// Report strings that are opened but not closed on the same line.
///
/// Quote state carries across lines, so a legitimate multi-line string is
/// only reported once, on its opening line, and only when none of the
/// continuation heuristics apply.
pub fn check_quotes(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();
    let mut open: Option<(char, usize)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.non_code || (ctx.comment.starts_in_block && open.is_none()) {
            continue;
        }

        // A string carried over from a previous line swallows comment markers.
        let text = if open.is_some() {
            line.as_str()
        } else {
            code_portion(line)
        };

        let mut escaped = false;
        for ch in text.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match open {
                Some(_) if ch == '\\' => escaped = true,
                Some((quote, _)) if ch == quote => open = None,
                Some(_) => {}
                None if ch == '\'' || ch == '"' => open = Some((ch, idx)),
                None => {}
            }
        }

        let Some((quote, start)) = open else {
            continue;
        };
        if start != idx || is_legitimate_continuation(line) {
            continue;
        }

        let (kind, name) = if quote == '\'' {
            (ErrorKind::UnclosedSingleQuote, "single")
        } else {
            (ErrorKind::UnclosedDoubleQuote, "double")
        };
        diagnostics.push(Diagnostic::new(
            idx + 1,
            line.trim(),
            kind,
            format!(
                "{} quoted string opened with {} on line {} is not closed",
                name,
                quote,
                idx + 1
            ),
            format!("check for a missing {} at the end of the string", quote),
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;

    fn check(src: &str) -> Vec<Diagnostic> {
        check_quotes(&split_lines(src))
    }

    #[test]
    fn test_unclosed_single_quote() {
        let diags = check("<?php\n$name = 'John;\n$b = 1;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line_number, 2);
        assert_eq!(diags[0].kind, ErrorKind::UnclosedSingleQuote);
    }

    #[test]
    fn test_unclosed_double_quote() {
        let diags = check("<?php\n$name = \"John;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnclosedDoubleQuote);
    }

    #[test]
    fn test_balanced_and_mixed_quotes() {
        assert!(check("<?php\n$a = \"it's fine\";\n$b = 'say \"hi\"';").is_empty());
        assert!(check("<?php\n$a = 'don\\'t';").is_empty());
    }

    #[test]
    fn test_multiline_query_allowed() {
        let src = "<?php\n$sql = \"SELECT *\n  FROM users\n  WHERE id = 1\";\n$x = 1;";
        assert!(check(src).is_empty());
    }

    #[test]
    fn test_multiline_echo_allowed() {
        let src = "<?php\necho '<div>\n  <p>hi</p>\n</div>';";
        assert!(check(src).is_empty());
        assert!(check("<?php\necho (\"<ul>\n</ul>\");").is_empty());
    }

    #[test]
    fn test_quote_in_comment_ignored() {
        assert!(check("<?php\n// don't panic\n/* it's\n fine */\n$a = 1;").is_empty());
    }

    #[test]
    fn test_query_heuristic() {
        assert!(looks_like_query("$stmt = $pdo->prepare(\""));
        assert!(looks_like_query("  order by name"));
        assert!(!looks_like_query("$created = 'x"));
    }
}
