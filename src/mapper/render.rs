//! Rendering of mapper ASTs into SQL text

use super::Node;
use crate::error::{Error, Result};
use crate::params::ParamTable;
use std::iter::Peekable;
use std::str::Chars;

/// Boolean connectors stripped from the start of a `<where>` body
const CONNECTORS: &[&str] = &["AND", "OR"];

/// Render nodes into whitespace-normalized SQL
pub fn render(nodes: &[Node], table: &ParamTable) -> Result<String> {
    let mut out = String::new();
    render_into(nodes, table, &mut out)?;
    Ok(normalize_whitespace(&out))
}

fn render_into(nodes: &[Node], table: &ParamTable, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Include { refid, text } => {
                let text = text.as_deref().ok_or_else(|| {
                    Error::template(format!("include '{}' was never resolved", refid))
                })?;
                out.push_str(text);
            }
            Node::If { test, body } => {
                if table.test(test)? {
                    render_into(body, table, out)?;
                }
            }
            Node::Where(body) => {
                let clause = render(body, table)?;
                out.push(' ');
                out.push_str(&where_clause(&clause));
                out.push('\n');
            }
            Node::Set(body) => {
                let clause = render(body, table)?;
                out.push(' ');
                out.push_str(&set_clause(&clause));
                out.push('\n');
            }
        }
    }
    Ok(())
}

/// `WHERE` + body without its leading connector; empty body renders nothing
pub fn where_clause(body: &str) -> String {
    let body = strip_connector(body.trim());
    if body.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", body)
    }
}

/// `SET` + body without its trailing comma; empty body renders nothing
pub fn set_clause(body: &str) -> String {
    let body = body.trim();
    let body = body.strip_suffix(',').unwrap_or(body).trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("SET {}", body)
    }
}

fn strip_connector(body: &str) -> &str {
    for connector in CONNECTORS {
        let Some(head) = body.get(..connector.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(connector) {
            continue;
        }
        let rest = &body[connector.len()..];
        if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            return rest.trim_start();
        }
    }
    body
}

/// Collapse whitespace runs to one space and trim.
///
/// Quoted text (`'…'`, `"…"`, `` `…` ``) and comments are copied verbatim.
/// A `--` comment is always followed by a newline so it cannot swallow the
/// SQL after it.
pub fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut pending: Option<char> = None;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if pending.is_none() && !out.is_empty() {
                pending = Some(' ');
            }
            continue;
        }
        if let Some(separator) = pending.take() {
            out.push(separator);
        }
        out.push(c);

        match c {
            '\'' | '"' | '`' => copy_quoted(c, &mut chars, &mut out),
            '-' if chars.peek() == Some(&'-') => {
                let comment: String = chars.by_ref().take_while(|&c| c != '\n').collect();
                out.push_str(comment.trim_end());
                pending = Some('\n');
            }
            '/' if chars.peek() == Some(&'*') => copy_block_comment(&mut chars, &mut out),
            _ => {}
        }
    }

    out
}

/// Copy up to and including the closing `quote`; a backslash escapes the
/// next character inside `'…'`
fn copy_quoted(quote: char, chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' && quote == '\'' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            return;
        }
    }
}

fn copy_block_comment(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    let mut prev = None;
    if let Some(star) = chars.next() {
        out.push(star);
    }
    for c in chars.by_ref() {
        out.push(c);
        if prev == Some('*') && c == '/' {
            return;
        }
        prev = Some(c);
    }
}
