//! Compiled statement output

use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;

/// Kind of statement being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Select,
    Insert,
    Update,
    Delete,
}

impl Action {
    /// Parse a mapper element name (`select`, `insert`, ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "select" => Some(Action::Select),
            "insert" => Some(Action::Insert),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    /// Detect the action from the leading keyword of a SQL string
    pub fn detect(sql: &str) -> Result<Self> {
        let keyword: String = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "SHOW" | "EXPLAIN" => Ok(Action::Select),
            "INSERT" | "REPLACE" => Ok(Action::Insert),
            "UPDATE" => Ok(Action::Update),
            "DELETE" => Ok(Action::Delete),
            "" => Err(Error::syntax("empty statement")),
            other => Err(Error::syntax(format!(
                "cannot determine statement action from '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Select => "SELECT",
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Driver-ready SQL plus its ordered bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub action: Action,
    /// SQL with driver-native bind markers
    pub prepare_sql: String,
    /// Every referenced placeholder name, in source order
    pub vars: Vec<String>,
    /// One value per bind marker, in marker order
    pub params: Vec<Value>,
}
