use std::fmt::Write as _;

use crate::{parser::ParseErrors, span::Span, tokenizer::TokenizeError};

/// Opaque remediation keys attached to every error.
pub mod keys {
    pub const RUNTIME_UNDEFINED_VAR: &str = "RUNTIME_UNDEFINED_VAR";
    pub const RUNTIME_INDEX_OUT_OF_BOUNDS: &str = "RUNTIME_INDEX_OUT_OF_BOUNDS";
    pub const RUNTIME_DIVISION_BY_ZERO: &str = "RUNTIME_DIVISION_BY_ZERO";
    pub const RUNTIME_KEY_NOT_FOUND: &str = "RUNTIME_KEY_NOT_FOUND";
    pub const RUNTIME_RECURSION_LIMIT: &str = "RUNTIME_RECURSION_LIMIT";
    pub const RUNTIME_GENERAL: &str = "RUNTIME_GENERAL";
    pub const TYPE_MISSING_PROPERTY: &str = "TYPE_MISSING_PROPERTY";
    pub const TYPE_INVALID_OPERATION: &str = "TYPE_INVALID_OPERATION";
    pub const TYPE_CONVERSION_FAILED: &str = "TYPE_CONVERSION_FAILED";
    pub const IMPORT_MODULE_NOT_FOUND: &str = "IMPORT_MODULE_NOT_FOUND";
    pub const IMPORT_CIRCULAR: &str = "IMPORT_CIRCULAR";
    pub const SYNTAX_INVALID: &str = "SYNTAX_INVALID";
    pub const IO_READ_ERROR: &str = "IO_READ_ERROR";
    pub const VALUE_ARITY_MISMATCH: &str = "VALUE_ARITY_MISMATCH";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Root of the hierarchy.
    Error,
    Syntax,
    Runtime,
    Import,
    Type,
    Name,
    Attribute,
    Index,
    Key,
    Division,
    Value,
    Io,
    Recursion,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::Import => "ImportError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Name => "NameError",
            ErrorKind::Attribute => "AttributeError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Key => "KeyError",
            ErrorKind::Division => "DivisionError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Io => "IOError",
            ErrorKind::Recursion => "RecursionError",
        }
    }

    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Error => None,
            ErrorKind::Syntax | ErrorKind::Runtime | ErrorKind::Import => Some(ErrorKind::Error),
            ErrorKind::Type
            | ErrorKind::Name
            | ErrorKind::Attribute
            | ErrorKind::Index
            | ErrorKind::Key
            | ErrorKind::Division
            | ErrorKind::Value
            | ErrorKind::Io
            | ErrorKind::Recursion => Some(ErrorKind::Runtime),
        }
    }

    /// This kind followed by each of its ancestors up to the root.
    pub fn lineage(self) -> impl Iterator<Item = ErrorKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Whether a catch clause naming `type_name` intercepts errors of this kind.
    ///
    /// Matching is case-insensitive, accepts an optional `HPL` prefix and
    /// includes every ancestor category.
    pub fn is_caught_by(self, type_name: &str) -> bool {
        let lowered = type_name.to_ascii_lowercase();
        let wanted = match lowered.strip_prefix("hpl") {
            Some("") | None => lowered.as_str(),
            Some(rest) => rest,
        };
        self.lineage()
            .any(|kind| kind.name().eq_ignore_ascii_case(wanted))
    }

    fn default_key(self) -> &'static str {
        match self {
            ErrorKind::Syntax => keys::SYNTAX_INVALID,
            ErrorKind::Import => keys::IMPORT_MODULE_NOT_FOUND,
            ErrorKind::Type => keys::TYPE_INVALID_OPERATION,
            ErrorKind::Name => keys::RUNTIME_UNDEFINED_VAR,
            ErrorKind::Attribute => keys::TYPE_MISSING_PROPERTY,
            ErrorKind::Index => keys::RUNTIME_INDEX_OUT_OF_BOUNDS,
            ErrorKind::Key => keys::RUNTIME_KEY_NOT_FOUND,
            ErrorKind::Division => keys::RUNTIME_DIVISION_BY_ZERO,
            ErrorKind::Io => keys::IO_READ_ERROR,
            ErrorKind::Recursion => keys::RUNTIME_RECURSION_LIMIT,
            ErrorKind::Error | ErrorKind::Runtime | ErrorKind::Value => keys::RUNTIME_GENERAL,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every failure surfaced by the language: a kind, a message, an optional
/// location, the call stack at the raise site and enrichment hints.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}: {}", .kind.name(), .message)]
pub struct HplError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub file: Option<String>,
    pub call_stack: Vec<String>,
    pub error_key: &'static str,
    pub hints: Vec<String>,
}

impl HplError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
            file: None,
            call_stack: Vec::new(),
            error_key: kind.default_key(),
            hints: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Import, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Attribute, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Key, message)
    }

    pub fn division(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Division, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn recursion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Recursion, message)
    }

    /// Sets the location unless one is already recorded.
    pub fn at(mut self, span: Span) -> Self {
        if self.line.is_none() {
            self.line = Some(span.line);
            self.column = Some(span.column);
        }
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        if self.file.is_none() {
            self.file = Some(file.into());
        }
        self
    }

    pub fn with_key(mut self, key: &'static str) -> Self {
        self.error_key = key;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn with_hints(mut self, hints: impl IntoIterator<Item = String>) -> Self {
        self.hints.extend(hints);
        self
    }

    /// Records the call stack unless one was captured closer to the raise site.
    pub fn with_call_stack(mut self, call_stack: &[String]) -> Self {
        if self.call_stack.is_empty() {
            self.call_stack = call_stack.to_vec();
        }
        self
    }

    /// The human readable diagnostic printed by the driver.
    pub fn report(&self) -> String {
        let mut out = format!("{}: {}\n", self.kind.name(), self.message);

        let location = match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => Some(format!("{file}:{line}:{column}")),
            (Some(file), Some(line), None) => Some(format!("{file}:{line}")),
            (Some(file), None, _) => Some(file.clone()),
            (None, Some(line), Some(column)) => Some(format!("line {line}, column {column}")),
            (None, Some(line), None) => Some(format!("line {line}")),
            (None, None, _) => None,
        };
        if let Some(location) = location {
            let _ = writeln!(out, "  --> {location}");
        }

        if !self.call_stack.is_empty() {
            let _ = writeln!(out, "  call stack:");
            for frame in &self.call_stack {
                let _ = writeln!(out, "    {frame}");
            }
        }

        for hint in &self.hints {
            let _ = writeln!(out, "  hint: {hint}");
        }

        let _ = writeln!(out, "  [{}]", self.error_key);
        out
    }
}

impl From<TokenizeError> for HplError {
    fn from(error: TokenizeError) -> Self {
        let span = error.span();
        HplError::syntax(error.to_string()).at(span)
    }
}

impl From<ParseErrors> for HplError {
    fn from(errors: ParseErrors) -> Self {
        let mut messages = errors.0.iter().map(ToString::to_string);
        let message = messages.next().unwrap_or_else(|| "Invalid syntax".to_string());
        let mut error = HplError::syntax(message).with_hints(messages);
        if let Some(span) = errors.span() {
            error = error.at(span);
        }
        error
    }
}

/// Levenshtein distance between two strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a.chars().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b.chars().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

fn threshold(len: usize) -> usize {
    match len {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        n => (n / 2).min(5),
    }
}

/// Up to `limit` candidates close to `name`, nearest first.
pub fn suggestions<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    limit: usize,
) -> Vec<String> {
    let max = threshold(name.chars().count());
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter(|candidate| *candidate != name)
        .map(|candidate| {
            (
                edit_distance(&name.to_lowercase(), &candidate.to_lowercase()),
                candidate,
            )
        })
        .filter(|(distance, _)| *distance <= max)
        .collect();
    scored.sort();
    scored.dedup();
    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_category_matching() {
        assert!(ErrorKind::Division.is_caught_by("DivisionError"));
        assert!(ErrorKind::Division.is_caught_by("HPLDivisionError"));
        assert!(ErrorKind::Division.is_caught_by("runtimeerror"));
        assert!(ErrorKind::Division.is_caught_by("HPLError"));
        assert!(ErrorKind::Division.is_caught_by("Error"));
        assert!(!ErrorKind::Division.is_caught_by("TypeError"));
        assert!(!ErrorKind::Syntax.is_caught_by("RuntimeError"));
        assert!(ErrorKind::Import.is_caught_by("HPLImportError"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("hello", "hello"), 0);
    }

    #[test]
    fn test_suggestions_nearest_first() {
        let found = suggestions("conut", ["count", "amount", "zebra", "coun"], 3);
        assert_eq!(found, vec!["coun".to_string(), "count".to_string()]);
        assert!(suggestions("x", ["totally_different"], 3).is_empty());
    }

    #[test]
    fn test_report_format() {
        let error = HplError::division("Division by zero")
            .at(Span::new(3, 9))
            .in_file("game.hpl")
            .with_call_stack(&["main()".to_string()])
            .with_hint("check the divisor before dividing");
        let report = error.report();
        assert!(report.starts_with("DivisionError: Division by zero\n"));
        assert!(report.contains("--> game.hpl:3:9"));
        assert!(report.contains("    main()"));
        assert!(report.contains("hint: check the divisor before dividing"));
        assert!(report.contains("[RUNTIME_DIVISION_BY_ZERO]"));
    }

    #[test]
    fn test_location_is_not_overwritten() {
        let error = HplError::name("x").at(Span::new(1, 2)).at(Span::new(7, 7));
        assert_eq!((error.line, error.column), (Some(1), Some(2)));
    }

    #[test]
    fn test_tokenize_errors_become_syntax() {
        let error: HplError = crate::tokenizer::tokens("x = \"open").unwrap_err().into();
        assert_eq!(error.kind, ErrorKind::Syntax);
        assert_eq!(error.line, Some(1));
    }
}
