//! Core types for check results.

use serde::{Deserialize, Serialize};

/// Category stamped on diagnostics whose producer did not name one.
pub const DEFAULT_CATEGORY: &str = "Generic";

/// Error kinds for the different diagnostics.
///
/// Plugins may report kinds outside the built-in taxonomy; those travel as
/// `Custom` and keep their tag through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    MissingTerminator,
    UnclosedSingleQuote,
    UnclosedDoubleQuote,
    TagAlreadyOpen,
    TagClosedWithoutOpen,
    MalformedFunction,
    MissingArraySeparator,
    BareVariable,
    // Structural rules
    UnclosedBracket,
    MismatchedBracket,
    UnopenedBracket,
    ExcessiveNesting,
    // Security rules
    SqlInjectionRisk,
    XssRisk,
    FileInclusionRisk,
    CommandInjectionRisk,
    Custom(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::MissingTerminator => "missing_terminator",
            ErrorKind::UnclosedSingleQuote => "unclosed_single_quote",
            ErrorKind::UnclosedDoubleQuote => "unclosed_double_quote",
            ErrorKind::TagAlreadyOpen => "tag_already_open",
            ErrorKind::TagClosedWithoutOpen => "tag_closed_without_open",
            ErrorKind::MalformedFunction => "malformed_function",
            ErrorKind::MissingArraySeparator => "missing_array_separator",
            ErrorKind::BareVariable => "bare_variable",
            ErrorKind::UnclosedBracket => "unclosed_bracket",
            ErrorKind::MismatchedBracket => "mismatched_bracket",
            ErrorKind::UnopenedBracket => "unopened_bracket",
            ErrorKind::ExcessiveNesting => "excessive_nesting",
            ErrorKind::SqlInjectionRisk => "sql_injection_risk",
            ErrorKind::XssRisk => "xss_risk",
            ErrorKind::FileInclusionRisk => "file_inclusion_risk",
            ErrorKind::CommandInjectionRisk => "command_injection_risk",
            ErrorKind::Custom(tag) => tag,
        }
    }

    /// Parse a built-in tag. Unknown tags return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing_terminator" => Some(ErrorKind::MissingTerminator),
            "unclosed_single_quote" => Some(ErrorKind::UnclosedSingleQuote),
            "unclosed_double_quote" => Some(ErrorKind::UnclosedDoubleQuote),
            "tag_already_open" => Some(ErrorKind::TagAlreadyOpen),
            "tag_closed_without_open" => Some(ErrorKind::TagClosedWithoutOpen),
            "malformed_function" => Some(ErrorKind::MalformedFunction),
            "missing_array_separator" => Some(ErrorKind::MissingArraySeparator),
            "bare_variable" => Some(ErrorKind::BareVariable),
            "unclosed_bracket" => Some(ErrorKind::UnclosedBracket),
            "mismatched_bracket" => Some(ErrorKind::MismatchedBracket),
            "unopened_bracket" => Some(ErrorKind::UnopenedBracket),
            "excessive_nesting" => Some(ErrorKind::ExcessiveNesting),
            "sql_injection_risk" => Some(ErrorKind::SqlInjectionRisk),
            "xss_risk" => Some(ErrorKind::XssRisk),
            "file_inclusion_risk" => Some(ErrorKind::FileInclusionRisk),
            "command_injection_risk" => Some(ErrorKind::CommandInjectionRisk),
            _ => None,
        }
    }

    /// Every built-in kind, in taxonomy order.
    pub fn builtin() -> &'static [ErrorKind] {
        &[
            ErrorKind::MissingTerminator,
            ErrorKind::UnclosedSingleQuote,
            ErrorKind::UnclosedDoubleQuote,
            ErrorKind::TagAlreadyOpen,
            ErrorKind::TagClosedWithoutOpen,
            ErrorKind::MalformedFunction,
            ErrorKind::MissingArraySeparator,
            ErrorKind::BareVariable,
            ErrorKind::UnclosedBracket,
            ErrorKind::MismatchedBracket,
            ErrorKind::UnopenedBracket,
            ErrorKind::ExcessiveNesting,
            ErrorKind::SqlInjectionRisk,
            ErrorKind::XssRisk,
            ErrorKind::FileInclusionRisk,
            ErrorKind::CommandInjectionRisk,
        ]
    }
}

impl From<String> for ErrorKind {
    fn from(s: String) -> Self {
        ErrorKind::parse(&s).unwrap_or(ErrorKind::Custom(s))
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// A single reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based line number.
    pub line_number: usize,
    /// Trimmed snapshot of the offending line.
    pub line_content: String,
    #[serde(rename = "error_type")]
    pub kind: ErrorKind,
    pub description: String,
    pub suggestion: String,
    /// Originating check or plugin.
    #[serde(default = "default_category")]
    pub category: String,
}

impl Diagnostic {
    pub fn new(
        line_number: usize,
        line_content: impl Into<String>,
        kind: ErrorKind,
        description: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            line_number,
            line_content: line_content.into(),
            kind,
            description: description.into(),
            suggestion: suggestion.into(),
            category: default_category(),
        }
    }

    /// Set the originating category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Whether the category is still the producer default.
    pub fn has_default_category(&self) -> bool {
        self.category.is_empty() || self.category == DEFAULT_CATEGORY
    }
}
