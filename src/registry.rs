//! Statement registry
//!
//! A [`Registry`] owns every registered statement (mapper and template
//! based), the reusable `<sql>` fragments, and the compiled metadata cache.
//! Lookups try mapper statements first, then templates, and finally treat
//! the id itself as raw SQL.

use crate::cache::{CacheKey, MetadataCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mapper::{self, Statement};
use crate::metadata::{Action, Metadata};
use crate::params::{Param, ParamTable};
use crate::scanner;
use crate::template::{self, TemplateSet, TemplateStatement};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A statement resolved from the registry
#[derive(Debug, Clone)]
pub enum StatementSource {
    Mapper(Arc<Statement>),
    Template(TemplateStatement),
    /// Unregistered id used verbatim as SQL
    Raw(String),
}

impl StatementSource {
    /// Compile against `params` with the registry's settings
    pub fn compile(&self, params: &[Param], config: &Config) -> Result<Metadata> {
        match self {
            StatementSource::Mapper(statement) => {
                let table = ParamTable::resolve(params, config.addressing);
                statement.compile(&table, config.holder())
            }
            StatementSource::Template(statement) => statement.compile(params, config.holder()),
            StatementSource::Raw(sql) => {
                let table = ParamTable::resolve(params, config.addressing);
                scanner::compile(Action::detect(sql)?, sql, &table, config.holder())
            }
        }
    }

    fn cache_source(&self) -> String {
        match self {
            StatementSource::Mapper(statement) => statement.id.clone(),
            StatementSource::Template(statement) => statement.id.clone(),
            StatementSource::Raw(sql) => sql.clone(),
        }
    }
}

/// Outcome of registering a document
#[derive(Debug, Default)]
pub struct Registration {
    pub registered: Vec<String>,
    /// Statements skipped because they were malformed or duplicated
    pub rejected: Vec<(String, Error)>,
}

impl Registration {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    fn reject(&mut self, id: &str, error: Error) {
        warn!(id, error = %error, "skipping statement");
        self.rejected.push((id.to_string(), error));
    }
}

#[derive(Default)]
struct Statements {
    fragments: HashMap<String, String>,
    mappers: HashMap<String, Arc<Statement>>,
    templates: HashMap<String, TemplateStatement>,
}

impl Statements {
    fn ensure_free(&self, id: &str) -> Result<()> {
        if self.mappers.contains_key(id) || self.templates.contains_key(id) {
            return Err(Error::DuplicateStatementId { id: id.to_string() });
        }
        Ok(())
    }
}

/// Registered statements plus the metadata cache
#[derive(Default)]
pub struct Registry {
    config: Config,
    statements: Mutex<Statements>,
    cache: MetadataCache,
}

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            statements: Mutex::new(Statements::default()),
            cache: MetadataCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Look up a registered statement
    pub fn find(&self, id: &str) -> Option<StatementSource> {
        let statements = self.lock();
        if let Some(statement) = statements.mappers.get(id) {
            return Some(StatementSource::Mapper(Arc::clone(statement)));
        }
        statements
            .templates
            .get(id)
            .map(|statement| StatementSource::Template(statement.clone()))
    }

    /// Look up a statement, falling back to treating `id` as raw SQL
    pub fn source(&self, id: &str) -> StatementSource {
        self.find(id)
            .unwrap_or_else(|| StatementSource::Raw(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        let statements = self.lock();
        statements.mappers.contains_key(id) || statements.templates.contains_key(id)
    }

    /// Registered statement ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let statements = self.lock();
        let mut ids: Vec<String> = statements
            .mappers
            .keys()
            .chain(statements.templates.keys())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Text of a registered `<sql>` fragment
    pub fn fragment(&self, id: &str) -> Option<String> {
        self.lock().fragments.get(id).cloned()
    }

    /// Register raw SQL (with `#{}` / `${}` placeholders) under `id`
    pub fn register_sql(&self, id: &str, sql: &str) -> Result<()> {
        let statement = Statement::from_sql(id, sql)?;
        statement.validate()?;

        let mut statements = self.lock();
        statements.ensure_free(id)?;
        statements
            .mappers
            .insert(id.to_string(), Arc::new(statement));
        self.cache.invalidate(id);
        info!(id, "registered statement");
        Ok(())
    }

    /// Register every fragment and statement of a mapper document
    pub fn register_mapper(&self, xml: &str) -> Result<Registration> {
        let (document, rejected) = mapper::parse_with_rejections(xml)?;
        let mut report = Registration::default();
        for (id, error) in rejected {
            report.reject(&id, error);
        }
        let mut statements = self.lock();

        for fragment in &document.fragments {
            if statements.fragments.contains_key(&fragment.id) {
                report.reject(
                    &fragment.id,
                    Error::DuplicateStatementId {
                        id: fragment.id.clone(),
                    },
                );
                continue;
            }
            statements
                .fragments
                .insert(fragment.id.clone(), fragment.text.clone());
        }

        for mut statement in document.statements.iter().cloned() {
            let prepared = {
                let known = &statements.fragments;
                let lookup = |refid: &str| {
                    document
                        .fragment(refid)
                        .map(|f| f.text.clone())
                        .or_else(|| known.get(refid).cloned())
                };
                statement
                    .resolve_includes(&lookup)
                    .and_then(|_| statement.validate())
                    .and_then(|_| statements.ensure_free(&statement.id))
            };

            match prepared {
                Ok(()) => {
                    let id = statement.id.clone();
                    statements.mappers.insert(id.clone(), Arc::new(statement));
                    self.cache.invalidate(&id);
                    report.registered.push(id);
                }
                Err(error) => report.reject(&statement.id, error),
            }
        }

        info!(
            namespace = %document.namespace,
            registered = report.registered.len(),
            rejected = report.rejected.len(),
            "registered mapper"
        );
        Ok(report)
    }

    /// Register every template of a Handlebars template document
    pub fn register_templates(&self, doc: &str) -> Result<Registration> {
        let sources = template::parse(doc)?;
        let mut report = Registration::default();
        let mut set = TemplateSet::new(self.config.dialect());
        let mut statements = self.lock();

        for source in &sources {
            let added = if set.contains(&source.id) {
                Err(Error::DuplicateStatementId {
                    id: source.id.clone(),
                })
            } else {
                statements
                    .ensure_free(&source.id)
                    .and_then(|_| set.add(source))
            };
            match added {
                Ok(()) => report.registered.push(source.id.clone()),
                Err(error) => report.reject(&source.id, error),
            }
        }

        let set = Arc::new(set);
        for id in &report.registered {
            statements
                .templates
                .insert(id.clone(), TemplateStatement::new(id.clone(), Arc::clone(&set)));
            self.cache.invalidate(id);
        }

        info!(
            registered = report.registered.len(),
            rejected = report.rejected.len(),
            "registered templates"
        );
        Ok(report)
    }

    /// Register a document, picking the engine from `name`'s extension
    pub fn register_bytes(&self, name: &str, bytes: &[u8]) -> Result<Registration> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::syntax(format!("{}: not valid UTF-8: {}", name, e)))?;

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("xml") => self.register_mapper(text),
            Some("hbs") | Some("handlebars") | Some("tpl") => self.register_templates(text),
            _ if text.trim_start().starts_with('<') => self.register_mapper(text),
            _ => self.register_templates(text),
        }
    }

    /// Read and register a mapper or template file
    pub fn register_file(&self, path: impl AsRef<Path>) -> Result<Registration> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), "loading statements");
        self.register_bytes(&path.to_string_lossy(), &bytes)
    }

    /// Remove a statement; returns whether it existed
    pub fn unregister(&self, id: &str) -> bool {
        let mut statements = self.lock();
        let removed =
            statements.mappers.remove(id).is_some() || statements.templates.remove(id).is_some();
        if removed {
            self.cache.invalidate(id);
            info!(id, "unregistered statement");
        }
        removed
    }

    /// Compile a statement id (or raw SQL) against `params`
    pub fn compile(&self, id: &str, params: &[Param]) -> Result<Metadata> {
        let source = self.source(id);
        let key = if self.config.cache {
            CacheKey::new(&source.cache_source(), params)
        } else {
            None
        };

        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            debug!(id, "metadata cache hit");
            return Ok(hit);
        }

        let metadata = source.compile(params, &self.config)?;
        debug!(id, action = %metadata.action, binds = metadata.params.len(), "compiled statement");

        if let Some(key) = key {
            self.cache.insert(key, metadata.clone());
        }
        Ok(metadata)
    }

    fn lock(&self) -> MutexGuard<'_, Statements> {
        self.statements.lock().unwrap_or_else(|e| e.into_inner())
    }
}
