//! Lexical context tracking for PHP source lines.
//!
//! Answers "what context is this position in?" without keeping a parser
//! around: every query rescans what it needs from the start of the file or
//! the start of the line. Callers pay O(file size) per query in exchange for
//! checks that stay independent of each other.
//!
//! Known limitations:
//! - block comments do not nest (`/* /* */` closes at the first `*/`)
//! - string interpolation (`"{$a["k"]}"`) is not understood
//! - heredoc/nowdoc bodies are treated as code

use lazy_static::lazy_static;
use regex::Regex;

/// Marker that opens a code region.
pub const OPEN_TAG: &str = "<?";
/// Marker that closes a code region.
pub const CLOSE_TAG: &str = "?>";

lazy_static! {
    /// Lines that look like JavaScript embedded in a PHP template.
    static ref EMBEDDED_SCRIPT: Regex = Regex::new(
        r"<script|\bvar\s+\w+|\blet\s+\w+|\bconst\s+\w+|document\.|\bfunction\s*\("
    ).unwrap();
}

/// Comment classification for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommentState {
    /// Byte offset of a `//` marker that starts a real comment on this line.
    pub line_comment: Option<usize>,
    /// The line is inside (or leaves open) a `/* ... */` block.
    pub in_block: bool,
    /// The line begins inside a block opened on an earlier line.
    pub starts_in_block: bool,
    /// Byte offset of a `/*` on this line that is still open at its end.
    pub block_start: Option<usize>,
}

impl CommentState {
    /// Whether the line should be treated as comment content at all.
    pub fn is_comment(&self) -> bool {
        self.line_comment.is_some() || self.in_block
    }
}

/// Result of scanning one line for comment markers.
#[derive(Debug, Clone, Copy)]
struct LineScan {
    line_comment: Option<usize>,
    block_start: Option<usize>,
    ends_in_block: bool,
}

/// Scan a line, starting in or out of a block comment.
///
/// Quotes are tracked per line only; a quote left open at end of line does
/// not carry over.
fn scan_line(line: &str, starts_in_block: bool) -> LineScan {
    let bytes = line.as_bytes();
    let mut in_block = starts_in_block;
    let mut opened_at: Option<usize> = None;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        let next = bytes.get(i + 1).copied();

        if in_block {
            if ch == b'*' && next == Some(b'/') {
                in_block = false;
                opened_at = None;
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }

        if let Some(q) = quote {
            if ch == b'\\' {
                i += 2;
                continue;
            }
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (ch, next) {
            (b'\'', _) | (b'"', _) => quote = Some(ch),
            (b'/', Some(b'/')) => {
                return LineScan {
                    line_comment: Some(i),
                    block_start: None,
                    ends_in_block: false,
                };
            }
            (b'/', Some(b'*')) => {
                in_block = true;
                opened_at = Some(i);
                i += 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    LineScan {
        line_comment: None,
        block_start: opened_at,
        ends_in_block: in_block,
    }
}

/// Whether code mode is on after `line`, given the mode it starts in.
///
/// Markers are taken in order, so the last one on the line decides. In code
/// mode a `?>` inside a quoted string does not close; in markup mode quotes
/// mean nothing and only `<?` counts.
pub fn code_after_line(line: &str, starts_in_code: bool) -> bool {
    let bytes = line.as_bytes();
    let mut in_code = starts_in_code;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if !in_code {
            if rest.starts_with(OPEN_TAG.as_bytes()) {
                in_code = true;
                i += OPEN_TAG.len();
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(q) = quote {
            if bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i] == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match bytes[i] {
            b'\'' | b'"' => quote = Some(bytes[i]),
            _ if rest.starts_with(CLOSE_TAG.as_bytes()) => {
                in_code = false;
                quote = None;
                i += CLOSE_TAG.len();
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    in_code
}

/// Whether line `idx` (0-based) sits in a non-code (HTML) region.
///
/// Only lines before `idx` are consulted, and on each of them the last tag
/// marker wins (see [`code_after_line`]).
pub fn is_in_non_code_region(lines: &[String], idx: usize) -> bool {
    !lines
        .iter()
        .take(idx)
        .fold(true, |in_code, line| code_after_line(line, in_code))
}

/// Whether byte offset `pos` of `line` falls inside a quoted string.
pub fn is_in_string(line: &str, pos: usize) -> bool {
    open_quote_at(line, pos).is_some()
}

/// The quote character of the string open at `pos`, if any.
///
/// Forward scan from the line start. Backslash escapes only count inside a
/// string, and a quote only closes a string opened by the same character.
pub fn open_quote_at(line: &str, pos: usize) -> Option<char> {
    let bytes = line.as_bytes();
    let end = pos.min(bytes.len());
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for &ch in &bytes[..end] {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(_) if ch == b'\\' => escaped = true,
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == b'\'' || ch == b'"' => quote = Some(ch),
            None => {}
        }
    }

    quote.map(char::from)
}

/// Comment state of line `idx` (0-based).
///
/// The block state is rebuilt by scanning every line up to and including
/// `idx`; a line that opens a block without closing it counts as inside.
pub fn comment_state(lines: &[String], idx: usize) -> CommentState {
    let Some(line) = lines.get(idx) else {
        return CommentState::default();
    };

    let starts_in_block = lines
        .iter()
        .take(idx)
        .fold(false, |in_block, l| scan_line(l, in_block).ends_in_block);

    let scan = scan_line(line, starts_in_block);
    CommentState {
        line_comment: scan.line_comment,
        in_block: scan.ends_in_block,
        starts_in_block,
        block_start: scan.block_start,
    }
}

/// Per-line context computed in one pass over a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineContext {
    pub non_code: bool,
    pub comment: CommentState,
}

/// Classify every line at once.
///
/// Gives the same answers as calling [`is_in_non_code_region`] and
/// [`comment_state`] per line, in linear time.
pub fn classify_lines(lines: &[String]) -> Vec<LineContext> {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_code = true;
    let mut in_block = false;

    for line in lines {
        let scan = scan_line(line, in_block);
        out.push(LineContext {
            non_code: !in_code,
            comment: CommentState {
                line_comment: scan.line_comment,
                in_block: scan.ends_in_block,
                starts_in_block: in_block,
                block_start: scan.block_start,
            },
        });

        in_block = scan.ends_in_block;
        in_code = code_after_line(line, in_code);
    }

    out
}

/// Byte offset of the first `//` on the line that is not inside a string.
pub fn line_comment_start(line: &str) -> Option<usize> {
    scan_line(line, false).line_comment
}

/// The part of `line` before a trailing `//` comment or a `/*` block left
/// open at the end of the line.
pub fn code_portion(line: &str) -> &str {
    let scan = scan_line(line, false);
    match scan.line_comment.or(scan.block_start) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Whether the line looks like client-side script rather than PHP.
pub fn looks_like_embedded_script(line: &str) -> bool {
    EMBEDDED_SCRIPT.is_match(line)
}

/// Mask string and comment content with spaces.
///
/// Line breaks are kept and every masked character becomes exactly one
/// space, so line and column (character) coordinates survive. Unlike the
/// per-line queries, strings here may span lines.
pub fn scrub(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut i = 0;

    let mask = |c: char| if c == '\n' { '\n' } else { ' ' };

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        if in_block_comment {
            if ch == '*' && next == Some('/') {
                in_block_comment = false;
                out.push_str("  ");
                i += 2;
            } else {
                out.push(mask(ch));
                i += 1;
            }
            continue;
        }

        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
            }
            out.push(mask(ch));
            i += 1;
            continue;
        }

        if let Some(q) = quote {
            if ch == '\\' {
                out.push(' ');
                if let Some(n) = next {
                    out.push(mask(n));
                }
                i += 2;
                continue;
            }
            if ch == q {
                quote = None;
            }
            out.push(mask(ch));
            i += 1;
            continue;
        }

        match (ch, next) {
            ('/', Some('*')) => {
                in_block_comment = true;
                out.push_str("  ");
                i += 2;
            }
            ('/', Some('/')) => {
                in_line_comment = true;
                out.push_str("  ");
                i += 2;
            }
            ('\'', _) | ('"', _) => {
                quote = Some(ch);
                out.push(' ');
                i += 1;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

/// Split file content into lines without terminators.
pub fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}
