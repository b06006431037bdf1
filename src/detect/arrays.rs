//! Missing separators between array elements.

use lazy_static::lazy_static;
use regex::Regex;

use super::context::{classify_lines, code_portion, looks_like_embedded_script, scrub};
use super::{Diagnostic, ErrorKind};

lazy_static! {
    /// `$name . "..."` concatenations read like adjacent tokens.
    static ref CONCATENATION: Regex = Regex::new(r#"\$\w+\s*\.\s*["']"#).unwrap();

    static ref ARRAY_CALL: Regex = Regex::new(r"(?i)\barray\s*\(").unwrap();
}

/// Words that legitimately sit next to another token inside an array.
const JOINING_WORDS: &[&str] = &[
    "new", "as", "instanceof", "and", "or", "xor", "clone", "fn", "function", "use", "static",
    "yield", "from", "print", "insteadof", "match", "throw", "include", "require",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Quoted,
    Word,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

/// Split array content into quoted strings, words and single punctuation.
fn tokenize(chars: &[char]) -> Vec<Token> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$' || c == '\\';
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = if ch == '\'' || ch == '"' {
            i += 1;
            while i < chars.len() && chars[i] != ch {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            TokenKind::Quoted
        } else if is_word(ch) {
            while i < chars.len() && is_word(chars[i]) {
                i += 1;
            }
            TokenKind::Word
        } else {
            i += 1;
            TokenKind::Other
        };

        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }

    tokens
}

/// Char ranges (exclusive of brackets) of the outermost array literals.
///
/// A literal that is not closed on the line runs to the end of the line.
fn array_literals(line: &str) -> Vec<(usize, usize)> {
    let code: Vec<char> = scrub(line).chars().collect();
    let mut openers: Vec<(usize, char)> = code
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == '[')
        .map(|(i, _)| (i + 1, ']'))
        .collect();

    // `array(` is located on the scrubbed text so quoted occurrences are ignored.
    let scrubbed: String = code.iter().collect();
    for m in ARRAY_CALL.find_iter(&scrubbed) {
        let char_end = scrubbed[..m.end()].chars().count();
        openers.push((char_end, ')'));
    }
    openers.sort_unstable();

    let mut ranges = Vec::new();
    let mut covered_until = 0;
    for (start, closer) in openers {
        if start <= covered_until {
            continue;
        }
        let opener = if closer == ']' { '[' } else { '(' };
        let mut depth = 1usize;
        let mut end = code.len();
        for (pos, &c) in code.iter().enumerate().skip(start) {
            if c == opener {
                depth += 1;
            } else if c == closer {
                depth -= 1;
                if depth == 0 {
                    end = pos;
                    break;
                }
            }
        }
        ranges.push((start, end));
        covered_until = end;
    }

    ranges
}

/// Byte offset where a separator is missing in an array literal on `line`.
///
/// The offset is the end of the first of two adjacent element tokens.
pub fn find_separator_gap(line: &str) -> Option<usize> {
    let chars: Vec<char> = line.chars().collect();

    for (start, end) in array_literals(line) {
        let content = &chars[start..end];
        let tokens = tokenize(content);

        for pair in tokens.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.kind == TokenKind::Other || b.kind == TokenKind::Other || a.end == b.start {
                continue;
            }
            let word = |t: Token| content[t.start..t.end].iter().collect::<String>();
            let joins = |t: Token| {
                t.kind == TokenKind::Word
                    && JOINING_WORDS.contains(&word(t).to_ascii_lowercase().as_str())
            };
            if joins(a) || joins(b) {
                continue;
            }

            let char_pos = start + a.end;
            return Some(
                line.char_indices()
                    .nth(char_pos)
                    .map(|(byte, _)| byte)
                    .unwrap_or(line.len()),
            );
        }
    }

    None
}

/// Report array literals with adjacent elements and no separator.
pub fn check_arrays(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.non_code || ctx.comment.starts_in_block {
            continue;
        }

        let code = code_portion(line);
        if CONCATENATION.is_match(code) || looks_like_embedded_script(code) {
            continue;
        }

        if find_separator_gap(code).is_some() {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                line.trim(),
                ErrorKind::MissingArraySeparator,
                "possible missing ',' between array elements",
                "add ',' between the array elements",
            ));
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;

    #[test]
    fn test_gap_position() {
        let line = "$a = ['x' 'y'];";
        assert_eq!(find_separator_gap(line), Some(9));
        assert_eq!(find_separator_gap("$a = array(1 2);"), Some(12));
        assert_eq!(find_separator_gap("$a = [[1, 2], [3 4]];"), Some(16));
    }

    #[test]
    fn test_well_formed_arrays() {
        assert_eq!(find_separator_gap("$a = ['x', 'y' => 'z'];"), None);
        assert_eq!(find_separator_gap("$a = [new Foo(), $b instanceof Bar];"), None);
        assert_eq!(find_separator_gap("$a = ['hello world', \"a b\"];"), None);
        assert_eq!(find_separator_gap("$v = $items[$i];"), None);
        assert_eq!(find_separator_gap("$s = 'not [an array]';"), None);
    }

    #[test]
    fn test_check_arrays_lines() {
        let src = "<?php\n$a = ['x' 'y'];\n// $b = [1 2];\n$c = [1, 2];\n$d = $e . 'x' . ['y' 'z'];";
        let diags = check_arrays(&split_lines(src));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line_number, 2);
        assert_eq!(diags[0].kind, ErrorKind::MissingArraySeparator);
    }

    #[test]
    fn test_unicode_offsets() {
        let line = "$a = ['é' 'b'];";
        let pos = find_separator_gap(line).unwrap();
        assert_eq!(&line[..pos], "$a = ['é'");
    }
}
