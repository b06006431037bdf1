//! Open/close tag pairing.

use super::context::{classify_lines, is_in_string, CLOSE_TAG, OPEN_TAG};
use super::{Diagnostic, ErrorKind};

/// Tag markers on a line in order of appearance, skipping quoted ones.
fn markers(line: &str) -> Vec<(usize, bool)> {
    let mut found: Vec<(usize, bool)> = line
        .match_indices(OPEN_TAG)
        .map(|(pos, _)| (pos, true))
        .chain(line.match_indices(CLOSE_TAG).map(|(pos, _)| (pos, false)))
        .filter(|&(pos, _)| !is_in_string(line, pos))
        .collect();
    found.sort_by_key(|&(pos, _)| pos);
    found
}

/// Report re-opened and unopened code tags.
///
/// Non-code regions are not skipped: the marker that ends one is exactly
/// what this check needs to see. Lines that start inside a block comment
/// are skipped.
pub fn check_tags(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();
    let mut open_since: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if contexts[idx].comment.starts_in_block {
            continue;
        }

        for (_, opens) in markers(line) {
            match (opens, open_since) {
                (true, Some(first)) => diagnostics.push(Diagnostic::new(
                    idx + 1,
                    line.trim(),
                    ErrorKind::TagAlreadyOpen,
                    format!(
                        "found '{}' while the tag opened on line {} is still open",
                        OPEN_TAG,
                        first + 1
                    ),
                    format!("add '{}' before this tag or remove this tag", CLOSE_TAG),
                )),
                (false, None) => diagnostics.push(Diagnostic::new(
                    idx + 1,
                    line.trim(),
                    ErrorKind::TagClosedWithoutOpen,
                    format!("found '{}' without a matching opening tag", CLOSE_TAG),
                    format!("remove '{}' or add '<?php' before it", CLOSE_TAG),
                )),
                _ => {}
            }
            open_since = if opens { Some(idx) } else { None };
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::context::split_lines;

    fn check(src: &str) -> Vec<Diagnostic> {
        check_tags(&split_lines(src))
    }

    #[test]
    fn test_balanced_tags() {
        assert!(check("<?php\n$a = 1;\n?>\n<p>x</p>\n<?= $a ?>\n<?php\n$b = 2;").is_empty());
        assert!(check("<?php echo 1; ?> <?php echo 2; ?>").is_empty());
    }

    #[test]
    fn test_reopen_before_close() {
        let diags = check("<?php\n$a = 1;\n<?php\n$b = 2;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::TagAlreadyOpen);
        assert_eq!(diags[0].line_number, 3);
        assert!(diags[0].description.contains("line 1"));
    }

    #[test]
    fn test_close_before_open() {
        let diags = check("<p>x</p>\n?>");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, ErrorKind::TagClosedWithoutOpen);
        assert_eq!(diags[0].line_number, 2);
    }

    #[test]
    fn test_markers_in_strings_and_comments_ignored() {
        assert!(check("<?php\n$x = '<?xml version=\"1.0\"?>';").is_empty());
        assert!(check("<?php\n/*\n <?php\n*/\n$a = 1;").is_empty());
    }
}
