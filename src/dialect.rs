//! Driver dialects: bind-marker holders and literal quoting

use crate::value::Value;

/// Produces the textual bind marker for a zero-based position
pub type Holder = fn(usize) -> String;

/// `?` markers (MySQL, SQLite, most ODBC drivers)
pub fn question_holder(_position: usize) -> String {
    "?".to_string()
}

/// `$1`, `$2`, ... markers (PostgreSQL)
pub fn dollar_holder(position: usize) -> String {
    format!("${}", position + 1)
}

/// SQL dialect selected by driver name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
    /// Unknown drivers: no quoting rules, clauses rendered unconditionally
    #[default]
    Generic,
}

impl Dialect {
    /// Look up a dialect by driver name; unknown names map to `Generic`
    pub fn from_driver(driver: &str) -> Self {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Dialect::MySql,
            "postgres" | "postgresql" | "pg" | "pgx" => Dialect::Postgres,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            _ => Dialect::Generic,
        }
    }

    pub fn holder(&self) -> Holder {
        match self {
            Dialect::Postgres => dollar_holder,
            _ => question_holder,
        }
    }

    /// Whether this dialect has quoting rules for inline clause values
    pub fn is_generic(&self) -> bool {
        matches!(self, Dialect::Generic)
    }

    /// Render a value as a SQL literal
    pub fn quote(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(_) | Value::Float(_) => value.to_string(),
            Value::Text(s) => self.quote_str(s),
            Value::Time(_) => self.quote_str(&value.to_string()),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| self.quote(v)).collect();
                format!("({})", inner.join(", "))
            }
        }
    }

    fn quote_str(&self, s: &str) -> String {
        match self {
            Dialect::MySql => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('\'');
                for c in s.chars() {
                    match c {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(c),
                    }
                }
                out.push('\'');
                out
            }
            Dialect::Postgres | Dialect::Sqlite => format!("'{}'", s.replace('\'', "''")),
            Dialect::Generic => s.to_string(),
        }
    }
}
