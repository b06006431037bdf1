//! Function declaration shape check.

use lazy_static::lazy_static;
use regex::Regex;

use super::context::{classify_lines, code_portion, is_in_string, looks_like_embedded_script, scrub};
use super::{Diagnostic, ErrorKind};

/// How many following lines a parameter list may span.
const MAX_SIGNATURE_LINES: usize = 12;

lazy_static! {
    static ref FUNCTION_KEYWORD: Regex = Regex::new(r"\bfunction\b").unwrap();

    static ref ANONYMOUS: Regex = Regex::new(r"\bfunction\s*\(|^\s*use\s+function\b").unwrap();

    static ref SIGNATURE_HEAD: Regex = Regex::new(
        r"^\s*((public|private|protected|static|abstract|final)\s+)*function\s+&?\s*\w+\s*\("
    ).unwrap();

    /// What may follow the parameter list: an optional return type, then
    /// the body or a `;` for abstract and interface methods.
    static ref SIGNATURE_TAIL: Regex = Regex::new(
        r"^\s*(:\s*\??[\w\\]+(\s*\|\s*\??[\w\\]+)*\s*)?(\{|;)"
    ).unwrap();
}

/// Whether a declaration starting at `idx` has a well-formed signature.
fn signature_is_well_formed(lines: &[String], idx: usize) -> bool {
    let end = (idx + MAX_SIGNATURE_LINES).min(lines.len());
    let text = scrub(&lines[idx..end].join("\n"));

    let Some(head) = SIGNATURE_HEAD.find(&text) else {
        return false;
    };

    let mut depth = 1usize;
    let mut close = None;
    for (pos, ch) in text[head.end()..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(head.end() + pos);
                    break;
                }
            }
            _ => {}
        }
    }

    match close {
        Some(pos) => SIGNATURE_TAIL.is_match(&text[pos + 1..]),
        None => false,
    }
}

/// Report function declarations that do not look like
/// `function name(params) {`.
pub fn check_functions(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.non_code || ctx.comment.starts_in_block {
            continue;
        }

        let code = code_portion(line);
        let Some(keyword) = FUNCTION_KEYWORD.find(code) else {
            continue;
        };
        if is_in_string(code, keyword.start())
            || ANONYMOUS.is_match(code)
            || looks_like_embedded_script(code)
        {
            continue;
        }

        if !signature_is_well_formed(lines, idx) {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                line.trim(),
                ErrorKind::MalformedFunction,
                "function declaration does not follow the expected shape",
                "use: function name(parameters) {",
            ));
        }
    }

    diagnostics
}
