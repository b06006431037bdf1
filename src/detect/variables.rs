//! Assignments to identifiers that are missing the `$` sigil.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

use super::context::{classify_lines, code_portion, is_in_string, looks_like_embedded_script};
use super::{Diagnostic, ErrorKind};

/// Words that may be followed by `=` without being a variable.
static RESERVED: phf::Set<&'static str> = phf_set! {
    "abstract", "and", "array", "as", "break", "case", "catch", "class", "clone", "const",
    "continue", "declare", "default", "do", "echo", "else", "elseif", "empty", "enum",
    "extends", "false", "final", "finally", "fn", "for", "foreach", "function", "global",
    "if", "implements", "include", "include_once", "instanceof", "interface", "isset",
    "list", "match", "namespace", "new", "null", "or", "parent", "print", "private",
    "protected", "public", "readonly", "require", "require_once", "return", "self",
    "static", "switch", "throw", "trait", "true", "try", "unset", "use", "var", "while",
    "xor", "yield",
};

lazy_static! {
    static ref ASSIGNED_IDENTIFIER: Regex = Regex::new(r"\b([A-Za-z_]\w*)\s*=").unwrap();

    static ref DECLARE: Regex = Regex::new(r"^\s*declare\s*\(").unwrap();

    /// Class constant declarations (any modifiers, optional type) and
    /// backed enum cases.
    static ref CONSTANT_LINE: Regex = Regex::new(
        r"^\s*((final|public|protected|private)\s+)*const\b|^\s*case\s+\w+\s*="
    ).unwrap();
}

/// Whether the identifier at `start` is named by a `const` or enum `case`
/// declaration rather than assigned as a variable.
pub fn is_constant_name(code: &str, start: usize) -> bool {
    if CONSTANT_LINE.is_match(code) {
        return true;
    }
    let before = code[..start].trim_end();
    ["const", "case"].iter().any(|keyword| {
        before
            .strip_suffix(*keyword)
            .is_some_and(|rest| !rest.ends_with(|c: char| c.is_alphanumeric() || c == '_'))
    })
}

/// Whether the identifier at `start` is already qualified by a sigil,
/// member access or scope resolution.
fn is_qualified(code: &str, start: usize) -> bool {
    let before = &code[..start];
    before.ends_with('$') || before.ends_with("->") || before.ends_with("::") || before.ends_with('\\')
}

/// Identifiers assigned without a `$` on one line, deduplicated in order.
pub fn bare_assignments(code: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for caps in ASSIGNED_IDENTIFIER.captures_iter(code) {
        let (Some(whole), Some(ident)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // `==`, `===` and `=>` are not assignments.
        let after = code[whole.end()..].chars().next();
        if matches!(after, Some('=') | Some('>')) {
            continue;
        }

        let name = ident.as_str();
        if RESERVED.contains(name.to_ascii_lowercase().as_str())
            || is_qualified(code, ident.start())
            || is_constant_name(code, ident.start())
            || is_in_string(code, ident.start())
            || found.iter().any(|f| f == name)
        {
            continue;
        }
        found.push(name.to_string());
    }

    found
}

/// Report bare identifiers on the left of an assignment.
pub fn check_variables(lines: &[String]) -> Vec<Diagnostic> {
    let contexts = classify_lines(lines);
    let mut diagnostics = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let ctx = contexts[idx];
        if ctx.non_code || ctx.comment.starts_in_block {
            continue;
        }

        let code = code_portion(line);
        if DECLARE.is_match(code) || looks_like_embedded_script(code) {
            continue;
        }

        for name in bare_assignments(code) {
            diagnostics.push(Diagnostic::new(
                idx + 1,
                line.trim(),
                ErrorKind::BareVariable,
                format!("variable '{}' is missing the '$' sigil", name),
                format!("change '{}' to '${}'", name, name),
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
    fn test_bare_assignments() {
        assert_eq!(bare_assignments("count = 5;"), vec!["count"]);
        assert_eq!(bare_assignments("a = b = 1;"), vec!["a", "b"]);
        assert_eq!(bare_assignments("total = total + 1; total = 0;"), vec!["total"]);
    }

    #[test]
    fn test_qualified_and_reserved_skipped() {
        assert!(bare_assignments("$count = 5;").is_empty());
        assert!(bare_assignments("$this->count = 5;").is_empty());
        assert!(bare_assignments("static::$x = 1;").is_empty());
        assert!(bare_assignments("if ($a == b) {").is_empty());
        assert!(bare_assignments("$m = ['k' => 1];").is_empty());
        assert!(bare_assignments("$s = 'name = value';").is_empty());
    }

    #[test]
    fn test_constants_and_enum_cases_skipped() {
        assert!(bare_assignments("const MAX = 10;").is_empty());
        assert!(bare_assignments("    final public const int LIMIT = 5, OTHER = 6;").is_empty());
        assert!(bare_assignments("    case Open = 'open';").is_empty());
        assert!(bare_assignments("class A { const X = 1; }").is_empty());
        // The keyword has to stand alone.
        assert_eq!(bare_assignments("showcase = 1;"), vec!["showcase"]);

        let src = "<?php\nenum Status: string\n{\n    case Open = 'open';\n    case Closed = 'closed';\n}\nclass Limits\n{\n    private const MAX = 10;\n}";
        assert!(check_variables(&split_lines(src)).is_empty());
    }

    #[test]
    fn test_check_variables_lines() {
        let src = "<?php\ncount = 5;\n// x = 1\nvar y = 2;\ndeclare(strict_types=1);\n?>\n<a href=\"x\">";
        let diags = check_variables(&split_lines(src));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line_number, 2);
        assert_eq!(diags[0].kind, ErrorKind::BareVariable);
        assert_eq!(diags[0].description, "variable 'count' is missing the '$' sigil");
    }
}
