//! CLI argument parsing and file discovery

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// File extensions loaded as mapper or template documents
pub const STATEMENT_EXTENSIONS: &[&str] = &["xml", "hbs", "handlebars", "tpl"];

/// dynsql - compile dynamic SQL statements from mapper and template files
#[derive(Parser, Debug)]
#[command(name = "dynsql")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load statement files and report malformed statements (exit code 1 if any)
    Check {
        /// Driver name used for template quoting rules
        #[arg(short, long, default_value = crate::config::DEFAULT_DRIVER)]
        driver: String,

        /// Files, directories or glob patterns to load
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Compile one statement and print its SQL and bind values
    Compile {
        /// Statement id (or raw SQL when not registered)
        #[arg(short, long)]
        id: String,

        /// Driver name; selects bind markers and quoting rules
        #[arg(short, long, default_value = crate::config::DEFAULT_DRIVER)]
        driver: String,

        /// Only accept positional references like #{0}
        #[arg(long)]
        positional: bool,

        /// Parameter as JSON; objects are maps, anything else is positional
        #[arg(short, long = "param", value_name = "JSON")]
        params: Vec<String>,

        /// Files, directories or glob patterns to load
        files: Vec<PathBuf>,
    },
}

fn is_statement_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| STATEMENT_EXTENSIONS.contains(&ext))
}

/// Discover statement files in the given paths
pub fn discover_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path.is_file() && is_statement_file(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else if let Ok(matches) = glob::glob(&path.to_string_lossy()) {
            files.extend(
                matches
                    .filter_map(|p| p.ok())
                    .filter(|p| p.is_file() && is_statement_file(p)),
            );
        }
    }

    files
}
