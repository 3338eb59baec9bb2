//! Handlebars statement templates
//!
//! A template document declares one named template per statement using
//! inline-partial blocks:
//!
//! ```handlebars
//! {{#*inline "findUser"}}
//!   SELECT * FROM users
//!   {{#where}}
//!     {{#if id}}AND id = {{arg id}}{{/if}}
//!     {{#if name}}AND name = {{arg name}}{{/if}}
//!   {{/where}}
//! {{/inline}}
//! ```
//!
//! Rendering is a two-pass process:
//! 1. Render: `arg` replaces each captured value with a bind token
//! 2. Bind: tokens are swapped for driver markers and collected as params

pub mod helpers;

use crate::dialect::{Dialect, Holder};
use crate::error::{Error, Result};
use crate::mapper::render::normalize_whitespace;
use crate::metadata::{Action, Metadata};
use crate::params::Param;
use crate::value::Value;
use handlebars::Handlebars;
use std::sync::Arc;
use tracing::trace;

/// Opens a bind token written by `arg`
pub const ARG_OPEN: char = '\u{1}';
/// Separates the referenced name from the JSON value inside a token
pub const ARG_SEP: char = '\u{1f}';
/// Closes a bind token
pub const ARG_CLOSE: char = '\u{2}';

const INLINE_OPEN: &str = "{{#*inline";
const INLINE_CLOSE: &str = "{{/inline}}";

/// A named template block extracted from a document
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSource {
    pub id: String,
    pub body: String,
}

/// Split a document into its `{{#*inline "id"}}` blocks
pub fn parse(doc: &str) -> Result<Vec<TemplateSource>> {
    let mut sources = Vec::new();
    let mut pos = 0;

    while let Some(found) = doc[pos..].find(INLINE_OPEN) {
        let start = pos + found;
        check_outside(&doc[pos..start], pos)?;

        let header_start = start + INLINE_OPEN.len();
        let header_end = doc[header_start..]
            .find("}}")
            .map(|i| header_start + i)
            .ok_or_else(|| Error::syntax_at("unterminated inline header", start, doc.len()))?;
        let id = doc[header_start..header_end]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        if id.is_empty() {
            return Err(Error::syntax_at("inline template without a name", start, header_end));
        }

        let body_start = header_end + 2;
        let body_end = find_block_end(doc, body_start).ok_or_else(|| {
            Error::syntax_at(
                format!("unclosed template '{}', expected {}", id, INLINE_CLOSE),
                start,
                doc.len(),
            )
        })?;

        sources.push(TemplateSource {
            id,
            body: doc[body_start..body_end].to_string(),
        });
        pos = body_end + INLINE_CLOSE.len();
    }

    check_outside(&doc[pos..], pos)?;
    Ok(sources)
}

/// Find the `{{/inline}}` matching an already-open block, skipping nested ones
fn find_block_end(doc: &str, from: usize) -> Option<usize> {
    let mut depth = 1;
    let mut pos = from;

    loop {
        let next_open = doc[pos..].find(INLINE_OPEN).map(|i| pos + i);
        let next_close = doc[pos..].find(INLINE_CLOSE).map(|i| pos + i)?;

        match next_open {
            Some(open) if open < next_close => {
                depth += 1;
                pos = open + INLINE_OPEN.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(next_close);
                }
                pos = next_close + INLINE_CLOSE.len();
            }
        }
    }
}

/// Only whitespace and Handlebars comments may appear between templates
fn check_outside(text: &str, offset: usize) -> Result<()> {
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let end = if rest.starts_with("{{!--") {
            rest.find("--}}").map(|i| i + 4)
        } else if rest.starts_with("{{!") {
            rest.find("}}").map(|i| i + 2)
        } else {
            None
        };
        match end {
            Some(end) => rest = rest[end..].trim_start(),
            None => {
                let at = offset + (text.len() - rest.len());
                return Err(Error::syntax_at(
                    "text outside of an inline template block",
                    at,
                    at + 1,
                ));
            }
        }
    }
    Ok(())
}

/// Templates from one or more documents sharing one Handlebars registry
pub struct TemplateSet {
    registry: Handlebars<'static>,
    dialect: Dialect,
}

impl TemplateSet {
    pub fn new(dialect: Dialect) -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        helpers::register(&mut registry, dialect);
        Self { registry, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parse and register one template
    pub fn add(&mut self, source: &TemplateSource) -> Result<()> {
        self.registry
            .register_template_string(&source.id, &source.body)
            .map_err(|e| Error::ParseSyntax {
                message: format!("template '{}': {}", source.id, e),
                span: None,
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.has_template(id)
    }

    /// Render a template with a single parameter as its context.
    ///
    /// Context strings may not contain the bind token delimiters.
    pub fn render(&self, id: &str, param: Option<&Param>) -> Result<String> {
        let context = param.map(Param::to_json).unwrap_or(serde_json::Value::Null);
        if let Some(text) = reserved_text(&context) {
            return Err(Error::resolution(format!(
                "parameter text {:?} contains a reserved control character",
                text
            )));
        }
        self.registry.render(id, &context).map_err(Error::template)
    }

    /// Render, then replace bind tokens with `holder` markers
    pub fn compile(&self, id: &str, param: Option<&Param>, holder: Holder) -> Result<Metadata> {
        let rendered = self.render(id, param)?;
        let (sql, vars, params) = bind_args(&rendered, holder)?;
        let prepare_sql = normalize_whitespace(&sql);
        trace!(template = id, sql = %prepare_sql, "rendered template");

        Ok(Metadata {
            action: Action::detect(&prepare_sql)?,
            prepare_sql,
            vars,
            params,
        })
    }
}

/// A registered template statement
#[derive(Clone)]
pub struct TemplateStatement {
    pub id: String,
    set: Arc<TemplateSet>,
}

impl TemplateStatement {
    pub fn new(id: impl Into<String>, set: Arc<TemplateSet>) -> Self {
        Self { id: id.into(), set }
    }

    /// Templates bind exactly one parameter value (or none)
    pub fn compile(&self, params: &[Param], holder: Holder) -> Result<Metadata> {
        if params.len() > 1 {
            return Err(Error::resolution(format!(
                "template '{}' takes one parameter, {} supplied",
                self.id,
                params.len()
            )));
        }
        self.set.compile(&self.id, params.first(), holder)
    }
}

impl std::fmt::Debug for TemplateStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStatement")
            .field("id", &self.id)
            .field("dialect", &self.set.dialect)
            .finish()
    }
}

/// First string or object key that holds a bind token delimiter
fn reserved_text(value: &serde_json::Value) -> Option<&str> {
    let reserved = |s: &str| s.contains([ARG_OPEN, ARG_SEP, ARG_CLOSE]);
    match value {
        serde_json::Value::String(s) if reserved(s) => Some(s),
        serde_json::Value::Array(items) => items.iter().find_map(reserved_text),
        serde_json::Value::Object(obj) => obj.iter().find_map(|(k, v)| {
            if reserved(k) {
                Some(k.as_str())
            } else {
                reserved_text(v)
            }
        }),
        _ => None,
    }
}

/// Encode a captured value as a bind token
pub fn encode_arg(name: Option<&str>, value: &serde_json::Value) -> String {
    format!(
        "{}{}{}{}{}",
        ARG_OPEN,
        name.unwrap_or_default(),
        ARG_SEP,
        value,
        ARG_CLOSE
    )
}

/// Decode a complete bind token into its name and value
pub fn decode_arg(token: &str) -> Option<(&str, serde_json::Value)> {
    let inner = token.strip_prefix(ARG_OPEN)?.strip_suffix(ARG_CLOSE)?;
    let (name, json) = inner.split_once(ARG_SEP)?;
    serde_json::from_str(json).ok().map(|v| (name, v))
}

pub fn is_arg_token(s: &str) -> bool {
    s.starts_with(ARG_OPEN) && s.ends_with(ARG_CLOSE)
}

/// Second pass: swap bind tokens for markers, collecting names and values
fn bind_args(rendered: &str, holder: Holder) -> Result<(String, Vec<String>, Vec<Value>)> {
    let mut sql = String::with_capacity(rendered.len());
    let mut vars = Vec::new();
    let mut params = Vec::new();
    let mut rest = rendered;

    while let Some(open) = rest.find(ARG_OPEN) {
        sql.push_str(&rest[..open]);
        let close = rest[open..]
            .find(ARG_CLOSE)
            .map(|i| open + i)
            .ok_or_else(|| Error::template("truncated bind token in rendered template"))?;
        let token = &rest[open..close + ARG_CLOSE.len_utf8()];
        let (name, json) =
            decode_arg(token).ok_or_else(|| Error::template("corrupt bind token in rendered template"))?;

        vars.push(if name.is_empty() {
            format!("arg{}", params.len())
        } else {
            name.to_string()
        });
        sql.push_str(&holder(params.len()));
        params.push(Value::from(json));
        rest = &rest[close + ARG_CLOSE.len_utf8()..];
    }
    sql.push_str(rest);

    Ok((sql, vars, params))
}
