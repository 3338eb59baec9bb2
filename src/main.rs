//! dynsql CLI - compile dynamic SQL statements from mapper and template files

use clap::Parser;
use dynsql::cli::{discover_files, Cli, Commands};
use dynsql::error::format_syntax_error;
use dynsql::{Addressing, Config, Error, Param, Registry};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { driver, files } => run_check(&files, driver),
        Commands::Compile {
            id,
            driver,
            positional,
            params,
            files,
        } => {
            let addressing = if positional {
                Addressing::Positional
            } else {
                Addressing::Named
            };
            let config = Config::new().driver(driver).addressing(addressing);
            run_compile(&files, config, &id, &params)
        }
    }
}

/// Load every file, printing rejected statements.
///
/// Returns `(had_rejections, had_errors)`.
fn load_files(registry: &Registry, files: &[PathBuf]) -> (bool, bool) {
    let mut had_rejections = false;
    let mut had_errors = false;

    for path in discover_files(files) {
        match registry.register_file(&path) {
            Ok(report) => {
                for (id, error) in &report.rejected {
                    eprintln!("{}: {}: {}", path.display(), id, error);
                    had_rejections = true;
                }
            }
            Err(e) => {
                let text = fs::read_to_string(&path).ok();
                eprintln!("{}: {}", path.display(), describe(&e, text.as_deref()));
                had_errors = true;
            }
        }
    }

    (had_rejections, had_errors)
}

/// Run the check command
fn run_check(files: &[PathBuf], driver: String) -> ExitCode {
    let registry = Registry::new(Config::new().driver(driver));
    let (had_rejections, had_errors) = load_files(&registry, files);

    if had_errors {
        ExitCode::from(2)
    } else if had_rejections {
        ExitCode::from(1)
    } else {
        println!("{} statement(s) ok", registry.ids().len());
        ExitCode::SUCCESS
    }
}

/// Run the compile command
fn run_compile(files: &[PathBuf], config: Config, id: &str, raw_params: &[String]) -> ExitCode {
    let registry = Registry::new(config.cache(false));
    let (_, had_errors) = load_files(&registry, files);
    if had_errors {
        return ExitCode::from(2);
    }

    let mut params = Vec::with_capacity(raw_params.len());
    for raw in raw_params {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => params.push(Param::json(json)),
            Err(e) => {
                eprintln!("Error: invalid JSON parameter '{}': {}", raw, e);
                return ExitCode::from(2);
            }
        }
    }

    match registry.compile(id, &params) {
        Ok(metadata) => {
            let values: Vec<serde_json::Value> =
                metadata.params.iter().map(|v| v.to_json()).collect();
            println!("{}", metadata.prepare_sql);
            println!("{}", serde_json::Value::Array(values));
            ExitCode::SUCCESS
        }
        Err(e) => {
            let sql = (!registry.contains(id)).then_some(id);
            eprintln!("Error [{}]: {}", e.code(), describe(&e, sql));
            ExitCode::from(1)
        }
    }
}

/// Render an error, pointing into `source` when it carries a syntax span
fn describe(error: &Error, source: Option<&str>) -> String {
    match (error, source) {
        (
            Error::ParseSyntax {
                message,
                span: Some((offset, _)),
            },
            Some(source),
        ) => format_syntax_error(source, *offset, message),
        _ => error.to_string(),
    }
}
