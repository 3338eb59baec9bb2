//! Placeholder scanning
//!
//! Breaks raw SQL into text runs and the two placeholder families:
//! - `#{name}` bind parameter, replaced by a driver bind marker
//! - `${name}` literal substitution, spliced in as text

use crate::dialect::Holder;
use crate::error::{Error, Result};
use crate::metadata::{Action, Metadata};
use crate::params::ParamTable;
use std::iter::Peekable;
use std::str::CharIndices;
use tracing::trace;

/// Scanner token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Plain SQL text
    Text(&'a str),
    /// `#{name}`
    Bind(&'a str),
    /// `${name}`
    Literal(&'a str),
}

/// Tokenize raw SQL into text runs and placeholders
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut text_start = 0;

    while let Some((pos, c)) = chars.next() {
        if c != '#' && c != '$' {
            continue;
        }
        if !matches!(chars.peek(), Some((_, '{'))) {
            continue;
        }
        chars.next(); // consume {

        if pos > text_start {
            tokens.push(Token::Text(&sql[text_start..pos]));
        }

        let (name, end) = read_name(sql, pos, &mut chars)?;
        tokens.push(if c == '#' {
            Token::Bind(name)
        } else {
            Token::Literal(name)
        });
        text_start = end;
    }

    if text_start < sql.len() {
        tokens.push(Token::Text(&sql[text_start..]));
    }

    Ok(tokens)
}

/// Read a placeholder name up to its closing brace.
///
/// Returns the name and the byte offset just past the `}`.
fn read_name<'a>(
    sql: &'a str,
    start: usize,
    chars: &mut Peekable<CharIndices<'a>>,
) -> Result<(&'a str, usize)> {
    let name_start = start + 2;

    for (pos, c) in chars.by_ref() {
        if c == '}' {
            let name = &sql[name_start..pos];
            if name.is_empty() {
                return Err(Error::syntax_at("empty placeholder name", start, pos + 1));
            }
            return Ok((name, pos + 1));
        }
        if c.is_whitespace() || c == ',' {
            return Err(Error::syntax_at(
                format!(
                    "malformed placeholder '{}': unexpected {:?} before closing brace",
                    &sql[start..pos],
                    c
                ),
                start,
                pos,
            ));
        }
    }

    Err(Error::syntax_at(
        format!("unterminated placeholder '{}'", &sql[start..]),
        start,
        sql.len(),
    ))
}

/// Check placeholder syntax without resolving anything
pub fn validate(sql: &str) -> Result<()> {
    tokenize(sql).map(|_| ())
}

/// Compile SQL containing placeholders into [`Metadata`]
pub fn compile(action: Action, sql: &str, table: &ParamTable, holder: Holder) -> Result<Metadata> {
    let tokens = tokenize(sql)?;
    let mut prepare_sql = String::with_capacity(sql.len());
    let mut vars = Vec::new();
    let mut params = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => prepare_sql.push_str(text),
            Token::Bind(name) => {
                vars.push(name.to_string());
                let value = table.lookup(name)?;
                prepare_sql.push_str(&holder(params.len()));
                params.push(value.clone());
            }
            Token::Literal(name) => {
                vars.push(name.to_string());
                let value = table.lookup(name)?;
                prepare_sql.push_str(&value.to_string());
            }
        }
    }

    trace!(sql = %prepare_sql, binds = params.len(), "compiled placeholders");

    Ok(Metadata {
        action,
        prepare_sql,
        vars,
        params,
    })
}
