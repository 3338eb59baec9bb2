//! dynsql - dynamic SQL compilation for XML mappers and Handlebars templates
//!
//! Statements are registered once into a [`Registry`] and compiled per call
//! into [`Metadata`]: driver-ready SQL plus its ordered bind values.
//!
//! ```
//! use dynsql::{params, Param, Registry};
//!
//! let registry = Registry::default();
//! let meta = registry
//!     .compile(
//!         "SELECT * FROM t WHERE id=#{id} AND name=${name}",
//!         &[Param::map([("id", dynsql::Value::from(7)), ("name", "bob".into())])],
//!     )
//!     .unwrap();
//! assert_eq!(meta.prepare_sql, "SELECT * FROM t WHERE id=? AND name=bob");
//! assert_eq!(meta.params, vec![dynsql::Value::Int(7)]);
//!
//! let positional = registry.compile("SELECT * FROM t WHERE a = #{0} OR b = #{1}", &params![1, "x"]).unwrap();
//! assert_eq!(positional.params.len(), 2);
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod dialect;
pub mod error;
pub mod mapper;
pub mod metadata;
pub mod params;
pub mod registry;
pub mod scanner;
pub mod template;
pub mod value;

pub use config::Config;
pub use dialect::{Dialect, Holder};
pub use error::{Error, Result};
pub use metadata::{Action, Metadata};
pub use params::{Addressing, Binding, Entity, Param, ParamTable, StructParam};
pub use registry::{Registration, Registry, StatementSource};
pub use value::{ParamValue, Value};

/// Compile raw SQL with default settings
pub fn compile(sql: &str, params: &[Param]) -> Result<Metadata> {
    let config = Config::default();
    StatementSource::Raw(sql.to_string()).compile(params, &config)
}
