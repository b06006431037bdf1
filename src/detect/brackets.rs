//! Structural bracket matching over scrubbed source.

use super::context::scrub;
use super::{Diagnostic, ErrorKind};

/// Line content used for the file-wide nesting diagnostic.
pub const WHOLE_FILE: &str = "<whole file>";

/// Closer that matches an opening bracket.
pub fn closer_for(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

/// Opener that matches a closing bracket.
pub fn opener_for(close: char) -> Option<char> {
    match close {
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}

/// An opener waiting for its closer.
#[derive(Debug, Clone, Copy)]
struct OpenBracket {
    ch: char,
    line: usize,
    column: usize,
}

/// Check bracket structure of a whole file.
///
/// Strings and comments are masked before matching. `max_depth` enables the
/// nesting guard; the running depth counts brackets of every kind.
pub fn check_brackets(source: &str, max_depth: Option<usize>) -> Vec<Diagnostic> {
    let lines: Vec<&str> = source.lines().collect();
    let content_of = |line: usize| {
        lines
            .get(line - 1)
            .map(|l| l.trim().to_string())
            .unwrap_or_default()
    };

    let mut diagnostics = Vec::new();
    let mut stack: Vec<OpenBracket> = Vec::new();
    let mut depth = 0usize;
    let mut deepest = 0usize;

    for (idx, line) in scrub(source).lines().enumerate() {
        let line_number = idx + 1;
        for (col, ch) in line.chars().enumerate() {
            let column = col + 1;

            if closer_for(ch).is_some() {
                stack.push(OpenBracket {
                    ch,
                    line: line_number,
                    column,
                });
                depth += 1;
                deepest = deepest.max(depth);
                continue;
            }

            let Some(expected_opener) = opener_for(ch) else {
                continue;
            };

            match stack.pop() {
                None => diagnostics.push(Diagnostic::new(
                    line_number,
                    content_of(line_number),
                    ErrorKind::UnopenedBracket,
                    format!("'{}' at column {} closed without a matching opener", ch, column),
                    format!("check for a missing '{}' before it", expected_opener),
                )),
                Some(open) => {
                    depth -= 1;
                    let expected = closer_for(open.ch).unwrap_or(ch);
                    if expected != ch {
                        diagnostics.push(Diagnostic::new(
                            line_number,
                            content_of(line_number),
                            ErrorKind::MismatchedBracket,
                            format!(
                                "expected '{}' but found '{}' (opened at line {}, column {})",
                                expected, ch, open.line, open.column
                            ),
                            format!("replace '{}' with '{}'", ch, expected),
                        ));
                    }
                }
            }
        }
    }

    // Innermost (most recently opened) first.
    while let Some(open) = stack.pop() {
        let closer = closer_for(open.ch).unwrap_or(open.ch);
        diagnostics.push(Diagnostic::new(
            open.line,
            content_of(open.line),
            ErrorKind::UnclosedBracket,
            format!(
                "'{}' opened at column {} but never closed",
                open.ch, open.column
            ),
            format!("add '{}' at the end of the block", closer),
        ));
    }

    if let Some(limit) = max_depth {
        if deepest > limit {
            diagnostics.push(Diagnostic::new(
                1,
                WHOLE_FILE,
                ErrorKind::ExcessiveNesting,
                format!(
                    "maximum nesting depth ({}) exceeds the allowed limit ({})",
                    deepest, limit
                ),
                "restructure the code to reduce nesting",
            ));
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_is_clean() {
        let src = "<?php\nfunction f($a) {\n    return [$a[0], ($a[1])];\n}\n";
        assert!(check_brackets(src, None).is_empty());
        assert!(check_brackets("", None).is_empty());
    }

    #[test]
    fn test_mismatched_pair() {
        let diags = check_brackets("(]", None);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::MismatchedBracket);
        assert!(diags[0].description.starts_with("expected ')' but found ']'"));
    }

    #[test]
    fn test_lone_opener() {
        let diags = check_brackets("{", None);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnclosedBracket);
        assert_eq!(diags[0].line_number, 1);
        assert!(diags[0].description.starts_with("'{'"));
    }

    #[test]
    fn test_unopened_closer() {
        let diags = check_brackets("$a = 1);", None);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::UnopenedBracket);
        assert!(diags[0].description.contains("')'"));
    }

    #[test]
    fn test_unclosed_reported_innermost_first() {
        let diags = check_brackets("{\n  (\n", None);
        let lines: Vec<usize> = diags.iter().map(|d| d.line_number).collect();
        assert_eq!(lines, vec![2, 1]);
    }

    #[test]
    fn test_brackets_in_strings_and_comments_ignored() {
        let src = "$a = \"(\"; // {\n/* [ */ $b = ')';";
        assert!(check_brackets(src, None).is_empty());
    }

    #[test]
    fn test_nesting_guard() {
        let src = "((((((1))))))";
        let diags = check_brackets(src, Some(5));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::ExcessiveNesting);
        assert_eq!(diags[0].line_number, 1);
        assert!(check_brackets(src, Some(6)).is_empty());
        assert!(check_brackets(src, None).is_empty());
    }
}
