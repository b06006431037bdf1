//! Missing statement terminator detection.
//!
//! A line is only checked when it looks like a complete simple statement.
//! Anything that could legitimately continue on the next line (blocks,
//! calls split across lines, control headers, declarations) is skipped.

use lazy_static::lazy_static;
use regex::Regex;

use super::context::{classify_lines, code_portion, open_quote_at, scrub};
use super::{Diagnostic, ErrorKind};

lazy_static! {
    static ref STRUCTURAL: Regex = Regex::new(
        r"^((abstract|final|readonly)\s+)*(namespace|class|interface|trait|enum)\b|\b(extends|implements)\b"
    ).unwrap();

    static ref CONTROL_HEADER: Regex = Regex::new(
        r"^(if|else|elseif|else\s+if|for|foreach|while|switch|catch|finally)\s*\("
    ).unwrap();

    static ref FUNCTION_SIGNATURE: Regex = Regex::new(
        r"^((public|private|protected|static|abstract|final)\s+)*function\b"
    ).unwrap();

    static ref CASE_LABEL: Regex = Regex::new(r"^(case\s|default\s*:)").unwrap();

    static ref ECHO_OR_PRINT: Regex = Regex::new(r"^(echo|print)\b").unwrap();

    /// Statements that must end with a terminator, in priority order.
    static ref STATEMENTS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"^\$\w+").unwrap(), "assignment"),
        (Regex::new(r"^echo\s+").unwrap(), "echo"),
        (Regex::new(r"^print\s+").unwrap(), "print"),
        (Regex::new(r"^return(\s+|$)").unwrap(), "return"),
        (Regex::new(r"^(include|include_once|require|require_once)\s+").unwrap(), "include"),
        (Regex::new(r"^(die|exit)\s*\(").unwrap(), "exit"),
        (Regex::new(r"^throw\s+").unwrap(), "throw"),
        (Regex::new(r"^(break|continue)$").unwrap(), "loop control"),
        (Regex::new(r"^(unset|isset|empty|list)\s*\(").unwrap(), "builtin call"),
        (Regex::new(r"^\w+\s*\(.*\)$").unwrap(), "function call"),
    ];

    /// Lines that open a string literal continued on following lines.
    static ref MULTILINE_OPENERS: Vec<(Regex, char)> = vec![
        (Regex::new(r#"^\$\w+\s*=\s*\$\w+\s*->\s*\w+\s*\(\s*"\s*$"#).unwrap(), '"'),
        (Regex::new(r#"^\$\w+\s*=\s*\$\w+\s*->\s*\w+\s*\(\s*'\s*$"#).unwrap(), '\''),
        (Regex::new(r#"^\$\w+\s*=\s*\w+\s*\(\s*"\s*$"#).unwrap(), '"'),
        (Regex::new(r#"^\$\w+\s*=\s*\w+\s*\(\s*'\s*$"#).unwrap(), '\''),
    ];
}

/// Whether an `=` on the line is an assignment rather than a comparison.
fn has_assignment(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        if b != b'=' {
            return false;
        }
        let prev = if i > 0 { bytes[i - 1] } else { b' ' };
        let next = bytes.get(i + 1).copied().unwrap_or(b' ');
        next != b'=' && next != b'>' && !matches!(prev, b'=' | b'!' | b'<' | b'>')
    })
}

/// Which statement kind (if any) requires a terminator on this line.
fn statement_kind(stripped: &str) -> Option<&'static str> {
    for (pattern, label) in STATEMENTS.iter() {
        if !pattern.is_match(stripped) {
            continue;
        }
        match *label {
            "assignment" if !has_assignment(stripped) || stripped.ends_with('[') => continue,
            "echo" | "print" if stripped.ends_with('\'') || stripped.ends_with('"') => continue,
            _ => return Some(label),
        }
    }
    None
}

/// The quote character of a multi-line literal opened on this line.
fn multiline_opener(stripped: &str) -> Option<char> {
    MULTILINE_OPENERS
        .iter()
        .find(|(pattern, _)| pattern.is_match(stripped))
        .map(|(_, quote)| *quote)
}

fn closes_multiline(stripped: &str, quote: char) -> bool {
    [
        format!("{});", quote),
        format!("{} );", quote),
        format!("{})", quote),
    ]
    .iter()
    .any(|closer| stripped.ends_with(closer.as_str()))
}

/// Whether the line opens a bracket it does not close.
fn opens_unclosed(stripped: &str) -> bool {
    if stripped.ends_with(['{', ':', '[', '(']) {
        return true;
    }
    let code = scrub(stripped);
    [('(', ')'), ('[', ']'), ('{', '}')]
        .iter()
        .any(|&(open, close)| code.matches(open).count() > code.matches(close).count())
}

fn closes_block(stripped: &str) -> bool {
    stripped.starts_with(['}', ')', ']']) || stripped.ends_with('}')
}

/// Echo/print whose string runs onto the next line.
fn echo_continues(stripped: &str) -> bool {
    ECHO_OR_PRINT.is_match(stripped)
        && (open_quote_at(stripped, stripped.len()).is_some()
            || (stripped.ends_with('\'') && !stripped.ends_with("';")))
}

/// Report statements that do not end with `;`.
pub fn check_terminators(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();
    let mut open_literal: Option<char> = None;
    let mut prev_stripped = String::new();

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.non_code || ctx.comment.starts_in_block {
            continue;
        }

        let stripped = code_portion(line).trim();
        if stripped.is_empty() {
            continue;
        }
        let prev = std::mem::replace(&mut prev_stripped, stripped.to_string());

        match open_literal {
            Some(quote) => {
                if !closes_multiline(stripped, quote) {
                    continue;
                }
                open_literal = None;
                if stripped.ends_with(';') {
                    continue;
                }
            }
            None => {
                if let Some(quote) = multiline_opener(stripped) {
                    open_literal = Some(quote);
                    continue;
                }
            }
        }

        if stripped.ends_with(';') || echo_continues(&prev) {
            continue;
        }
        if stripped.starts_with('<') && !stripped.starts_with("<?") {
            continue;
        }
        if STRUCTURAL.is_match(stripped)
            || opens_unclosed(stripped)
            || closes_block(stripped)
            || CASE_LABEL.is_match(stripped)
            || CONTROL_HEADER.is_match(stripped)
            || FUNCTION_SIGNATURE.is_match(stripped)
            || echo_continues(stripped)
        {
            continue;
        }

        if let Some(kind) = statement_kind(stripped) {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                stripped,
                ErrorKind::MissingTerminator,
                format!("{} statement should end with ';'", kind),
                "add ';' at the end of the line",
            ));
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;

    fn check(src: &str) -> Vec<usize> {
        check_terminators(&split_lines(src))
            .iter()
            .map(|d| d.line_number)
            .collect()
    }

    #[test]
    fn test_flags_simple_statements() {
        let src = "<?php\n$a = 1\necho $a\nreturn\nfoo($a)\nbreak\nrequire 'x.php'";
        assert_eq!(check(src), vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_terminated_lines_are_clean() {
        let src = "<?php\n$a = 1;\necho $a;\nreturn;\nfoo($a); // done";
        assert!(check(src).is_empty());
    }

    #[test]
    fn test_structural_lines_skipped() {
        let src = "<?php\nnamespace App\\Models\nclass User extends Model\n{\n    public function name()\n    {\n        if ($a == 1)\n        foreach ($xs as $x)\n    }\n}";
        assert!(check(src).is_empty());
    }

    #[test]
    fn test_word_boundary_on_declarations() {
        // "classes" is not a class declaration.
        let src = "<?php\n$classes = load()";
        assert_eq!(check(src), vec![2]);
    }

    #[test]
    fn test_comparisons_are_not_assignments() {
        assert!(check("<?php\n$a == $b").is_empty());
        assert!(check("<?php\n$a => $b").is_empty());
    }

    #[test]
    fn test_multiline_call_skipped() {
        let src = "<?php\n$x = foo($a,\n    $b\n);";
        assert!(check(src).is_empty());
    }

    #[test]
    fn test_multiline_literal_suppresses_until_closer() {
        let src = "<?php\n$sql = $db->query(\"\n  SELECT *\n  FROM users\n\");\n$b = 2";
        assert_eq!(check(src), vec![6]);
    }

    #[test]
    fn test_html_and_comments_skipped() {
        let src = "<?php\n/*\n$a = 1\n*/\n// $b = 2\n?>\n<p>hello</p>\n$c = 3";
        assert!(check(src).is_empty());
    }

    #[test]
    fn test_line_opening_a_block_comment_is_checked() {
        let src = "<?php\n$a = 1 /* first\n   second */\n$b = 2; /* fine\n */";
        assert_eq!(check(src), vec![2]);
    }

    #[test]
    fn test_echo_continuation() {
        let src = "<?php\necho '<div>\n  <span>hi</span>\n</div>';";
        assert!(check(src).is_empty());
    }
}
