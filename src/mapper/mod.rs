//! Tag-based mapper documents
//!
//! A mapper is an XML document of named statements:
//!
//! ```xml
//! <mapper namespace="user">
//!   <sql id="columns">id, name, email</sql>
//!   <select id="findUsers">
//!     SELECT <include refid="columns"/> FROM users
//!     <where>
//!       <if test="id">AND id = #{id}</if>
//!       <if test="name">AND name = #{name}</if>
//!     </where>
//!   </select>
//! </mapper>
//! ```
//!
//! Documents are parsed once into a small AST of [`Node`]s. Rendering walks
//! the AST against a [`ParamTable`] and hands the resulting SQL to the
//! placeholder scanner.

pub mod parse;
pub mod render;

use crate::dialect::Holder;
use crate::error::{Error, Result};
use crate::metadata::{Action, Metadata};
use crate::params::ParamTable;
use crate::scanner;

pub use parse::{parse, parse_with_rejections};

/// A parsed mapper document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapper {
    pub namespace: String,
    pub fragments: Vec<Fragment>,
    pub statements: Vec<Statement>,
}

impl Mapper {
    pub fn selects(&self) -> impl Iterator<Item = &Statement> {
        self.by_action(Action::Select)
    }

    pub fn inserts(&self) -> impl Iterator<Item = &Statement> {
        self.by_action(Action::Insert)
    }

    pub fn updates(&self) -> impl Iterator<Item = &Statement> {
        self.by_action(Action::Update)
    }

    pub fn deletes(&self) -> impl Iterator<Item = &Statement> {
        self.by_action(Action::Delete)
    }

    fn by_action(&self, action: Action) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(move |s| s.action == action)
    }

    pub fn fragment(&self, id: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.id == id)
    }
}

/// A reusable `<sql>` fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: String,
    pub text: String,
}

/// Dynamic element of a statement body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `<include refid>`; `text` is filled in when includes are resolved
    Include { refid: String, text: Option<String> },
    If { test: String, body: Vec<Node> },
    Where(Vec<Node>),
    Set(Vec<Node>),
}

/// One `<select|insert|update|delete>` statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: String,
    pub action: Action,
    pub nodes: Vec<Node>,
}

impl Statement {
    /// A statement made of a single SQL text
    pub fn from_sql(id: impl Into<String>, sql: &str) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            action: Action::detect(sql)?,
            nodes: vec![Node::Text(sql.to_string())],
        })
    }

    /// Fill in every include from `lookup`
    pub fn resolve_includes<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_nodes(&mut self.nodes, lookup)
    }

    /// Check placeholder syntax in every text node
    pub fn validate(&self) -> Result<()> {
        validate_nodes(&self.nodes)
    }

    /// Render the dynamic elements against `table`
    pub fn render(&self, table: &ParamTable) -> Result<String> {
        render::render(&self.nodes, table)
    }

    /// Render, then compile placeholders into bind markers
    pub fn compile(&self, table: &ParamTable, holder: Holder) -> Result<Metadata> {
        let sql = self.render(table)?;
        scanner::compile(self.action, &sql, table, holder)
    }
}

fn resolve_nodes<F>(nodes: &mut [Node], lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Include { refid, text } => {
                if text.is_none() {
                    let fragment = lookup(refid).ok_or_else(|| {
                        Error::syntax(format!("include refers to unknown fragment '{}'", refid))
                    })?;
                    *text = Some(fragment);
                }
            }
            Node::If { body, .. } | Node::Where(body) | Node::Set(body) => {
                resolve_nodes(body, lookup)?
            }
        }
    }
    Ok(())
}

fn validate_nodes(nodes: &[Node]) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => scanner::validate(text)?,
            Node::Include { text, .. } => {
                if let Some(text) = text {
                    scanner::validate(text)?;
                }
            }
            Node::If { body, .. } | Node::Where(body) | Node::Set(body) => validate_nodes(body)?,
        }
    }
    Ok(())
}
