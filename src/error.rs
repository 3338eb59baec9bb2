//! Error types for dynsql

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for dynsql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dynsql
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("{message}")]
    #[diagnostic(code(dynsql::parse_syntax))]
    ParseSyntax {
        message: String,
        #[label("here")]
        span: Option<(usize, usize)>,
    },

    #[error("Parameter error: {message}")]
    #[diagnostic(code(dynsql::param_resolution))]
    ParamResolution { message: String },

    #[error("Parameter '{name}' is not a positional index")]
    #[diagnostic(
        code(dynsql::param_addressing),
        help("positional addressing only accepts references like #{{0}}")
    )]
    ParamAddressing { name: String },

    #[error("Statement id '{id}' is already registered")]
    #[diagnostic(code(dynsql::duplicate_statement_id))]
    DuplicateStatementId { id: String },

    #[error("Template error: {message}")]
    #[diagnostic(code(dynsql::template_execution))]
    TemplateExecution { message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(dynsql::io_error))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::ParseSyntax { .. } => "parse_syntax",
            Error::ParamResolution { .. } => "param_resolution",
            Error::ParamAddressing { .. } => "param_addressing",
            Error::DuplicateStatementId { .. } => "duplicate_statement_id",
            Error::TemplateExecution { .. } => "template_execution",
            Error::Io(_) => "io_error",
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Error::ParseSyntax {
            message: message.into(),
            span: None,
        }
    }

    pub(crate) fn syntax_at(message: impl Into<String>, start: usize, end: usize) -> Self {
        Error::ParseSyntax {
            message: message.into(),
            span: Some((start, end.saturating_sub(start))),
        }
    }

    pub(crate) fn resolution(message: impl Into<String>) -> Self {
        Error::ParamResolution {
            message: message.into(),
        }
    }

    pub(crate) fn template(message: impl std::fmt::Display) -> Self {
        Error::TemplateExecution {
            message: message.to_string(),
        }
    }
}

/// Calculate line and column number from byte offset
pub fn offset_to_line_col(input: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in input.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Format a syntax error with the offending line and a pointer to the column
pub fn format_syntax_error(input: &str, offset: usize, message: &str) -> String {
    let (line, col) = offset_to_line_col(input, offset);
    let line_content = input.lines().nth(line.saturating_sub(1)).unwrap_or("");
    let pointer = " ".repeat(col.saturating_sub(1)) + "^";

    format!(
        "Syntax error at line {}, column {}:\n  |\n{:>3} | {}\n  | {}\n  = {}",
        line, col, line, line_content, pointer, message
    )
}
