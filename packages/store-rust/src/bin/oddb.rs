//! `oddb` command-line client.
//!
//! Opens one namespace with the selected driver, runs a single command
//! against its public database (or a user's private database with `--user`),
//! and prints results as JSON lines on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! oddb --root ./data save --type note --key r1 title=hello score=3
//! oddb --root ./data query note --sort score:desc
//! oddb --root ./data subscribe inbox note
//! oddb --root ./data matches r1
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use oddb_core::{CompareMode, Query, Record, Sort, SortOrder, Subscription, Value};
use oddb_store::{
    driver_by_name, Database, HookDispatcher, HookEvent, RecordHook, StoreConfig,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oddb", version, about = "Inspect and edit oddb record databases")]
struct Cli {
    /// Root directory holding namespaces
    #[arg(long, value_name = "DIR", default_value = "./data", env = "ODDB_ROOT")]
    root: PathBuf,

    /// Namespace (application) to open
    #[arg(short, long, default_value = "default", env = "ODDB_NAMESPACE")]
    namespace: String,

    /// Storage backend: fs or memory
    #[arg(long, default_value = "fs", env = "ODDB_DRIVER")]
    driver: String,

    /// Use the private database of this user instead of the public one
    #[arg(short, long, value_name = "USER_KEY")]
    user: Option<String>,

    /// Sort with the legacy comparator instead of the strict total order
    #[arg(long, env = "ODDB_LEGACY_SORT")]
    legacy_sort: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the record stored under KEY
    Get { key: String },

    /// Insert or replace a record
    Save {
        /// Record type
        #[arg(long = "type", value_name = "TYPE")]
        record_type: String,

        /// Record key
        #[arg(long)]
        key: String,

        /// Fields as FIELD=VALUE; values parse as null, bool, number, or string
        fields: Vec<String>,
    },

    /// Delete the record stored under KEY
    Delete { key: String },

    /// List records of TYPE
    Query {
        #[arg(value_name = "TYPE")]
        record_type: String,

        /// Sort as FIELD[:asc|:desc]; only one sort is supported
        #[arg(long = "sort", value_name = "FIELD[:DIR]")]
        sorts: Vec<String>,
    },

    /// Store a subscription to records of TYPE
    Subscribe {
        key: String,
        #[arg(value_name = "TYPE")]
        record_type: String,
    },

    /// Print the subscriptions the record stored under KEY matches
    Matches { key: String },
}

/// Logs every mutation at `info` level.
struct LogHook;

#[async_trait]
impl RecordHook for LogHook {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_event(&self, event: &HookEvent) -> anyhow::Result<()> {
        info!(
            db = %event.database.id(),
            key = %event.record.key,
            record_type = %event.record.record_type,
            event = %event.kind,
            "record changed"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = StoreConfig {
        compare_mode: if cli.legacy_sort {
            CompareMode::Legacy
        } else {
            CompareMode::Strict
        },
        ..StoreConfig::default()
    };

    let driver = driver_by_name(&cli.driver, config.clone())?;
    let dispatcher = HookDispatcher::with_defaults(Handle::current(), &config.hooks);
    let conn = driver
        .open(&cli.namespace, &cli.root, dispatcher.clone())
        .with_context(|| format!("failed to open namespace {:?}", cli.namespace))?;
    conn.add_record_hook(Arc::new(LogHook));

    let db = match &cli.user {
        Some(user) => conn.private_db(user)?,
        None => conn.public_db(),
    };
    let result = run(cli.command, db.as_ref());

    dispatcher.drain().await;
    conn.close()?;
    result
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(command: Command, db: &dyn Database) -> Result<()> {
    match command {
        Command::Get { key } => print_json(&db.get(&key)?),
        Command::Save {
            record_type,
            key,
            fields,
        } => {
            let mut record = Record::new(key, record_type);
            for field in &fields {
                let (name, value) = parse_field(field)?;
                record.set(name, value);
            }
            db.save(&record)?;
            print_json(&record)
        }
        Command::Delete { key } => {
            db.delete(&key)?;
            Ok(())
        }
        Command::Query { record_type, sorts } => {
            let mut query = Query::new(record_type);
            for sort in &sorts {
                query = query.sort_by(parse_sort(sort)?);
            }
            for row in db.query(&query)? {
                print_json(&row?)?;
            }
            Ok(())
        }
        Command::Subscribe { key, record_type } => {
            let subscription = Subscription::new(key, Query::new(record_type));
            db.subscription_store().save_subscription(&subscription)?;
            print_json(&subscription)
        }
        Command::Matches { key } => {
            let record = db.get(&key)?;
            for subscription in db.subscription_store().matching_subscriptions(&record)? {
                print_json(&subscription)?;
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Parses `FIELD=VALUE`.
fn parse_field(input: &str) -> Result<(&str, Value)> {
    let (name, raw) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=VALUE, got {input:?}"))?;
    if name.is_empty() {
        bail!("empty field name in {input:?}");
    }
    Ok((name, Value::parse_literal(raw)))
}

/// Parses `FIELD[:asc|:desc]`.
///
/// A suffix after the last `:` that is not a direction belongs to the field,
/// so `a:b` sorts ascending by the field `a:b`.
fn parse_sort(input: &str) -> Result<Sort> {
    let (field, order) = input
        .rsplit_once(':')
        .and_then(|(field, dir)| {
            let order = match dir.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => SortOrder::Ascending,
                "desc" | "descending" => SortOrder::Descending,
                _ => return None,
            };
            Some((field, order))
        })
        .unwrap_or((input, SortOrder::Ascending));
    if field.is_empty() {
        bail!("empty sort field in {input:?}");
    }
    Ok(Sort {
        key_path: field.to_string(),
        order,
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_save_with_fields() {
        let cli = Cli::try_parse_from([
            "oddb", "save", "--type", "note", "--key", "r1", "title=a", "score=3",
        ])
        .unwrap();
        match cli.command {
            Command::Save {
                record_type,
                key,
                fields,
            } => {
                assert_eq!(record_type, "note");
                assert_eq!(key, "r1");
                assert_eq!(fields, vec!["title=a", "score=3"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn field_values_parse_as_literals() {
        assert_eq!(parse_field("score=3").unwrap(), ("score", Value::Int(3)));
        assert_eq!(parse_field("done=true").unwrap(), ("done", Value::Bool(true)));
        assert_eq!(parse_field("note=a=b").unwrap(), ("note", Value::from("a=b")));
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=1").is_err());
    }

    #[test]
    fn sort_directions() {
        assert_eq!(parse_sort("score").unwrap(), Sort::asc("score"));
        assert_eq!(parse_sort("score:desc").unwrap(), Sort::desc("score"));
        assert_eq!(parse_sort("score:ASC").unwrap(), Sort::asc("score"));
        assert!(parse_sort(":desc").is_err());
        assert!(parse_sort("").is_err());
    }

    #[test]
    fn sort_fields_may_contain_colons() {
        assert_eq!(parse_sort("a:b").unwrap(), Sort::asc("a:b"));
        assert_eq!(parse_sort("score:sideways").unwrap(), Sort::asc("score:sideways"));
        assert_eq!(parse_sort("a:b:desc").unwrap(), Sort::desc("a:b"));
        assert_eq!(parse_sort("a:b:").unwrap(), Sort::asc("a:b:"));
    }
}
