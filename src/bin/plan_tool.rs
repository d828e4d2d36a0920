use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use relquery::transport::http::query_pairs;
use relquery::transport::{Action, TransportRequest};
use relquery::{AdapterConfig, MemoryTransport, NamingConverter, Operation, QueryOptions, Registry};
use serde_json::{Value, json};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relquery-plan")]
#[command(about = "Developer tooling for relquery adapters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the request an operation would send, without sending it
    Plan {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        entity: String,
        /// findUnique, findFirst, findMany, create, update or delete
        #[arg(long)]
        op: String,
        /// Call argument as JSON, bare or options form
        #[arg(long, default_value = "null")]
        args: String,
    },
    /// Re-case the keys of a JSON document (file, or stdin when omitted)
    Convert {
        #[arg(long, value_enum)]
        to: Case,
        input: Option<PathBuf>,
    },
    /// List the entities of a configuration file
    Entities {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Case {
    Storage,
    Application,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Plan {
            config,
            entity,
            op,
            args,
        } => plan(&config, &entity, &op, &args),
        Command::Convert { to, input } => convert(to, input.as_deref()),
        Command::Entities { config } => {
            let registry = load_registry(&config)?;
            for name in registry.names() {
                let Some(adapter) = registry.get(name) else {
                    continue;
                };
                let schema = adapter.schema();
                println!(
                    "{} -> {} ({} columns, {} relations)",
                    schema.name,
                    schema.table,
                    schema.columns.len(),
                    schema.relations.len()
                );
            }
            Ok(())
        }
    }
}

fn load_registry(path: &Path) -> Result<Registry> {
    let config = AdapterConfig::from_path(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))?;
    // Planning never reaches the transport.
    Registry::from_config(&config, Arc::new(MemoryTransport::new())).context("Invalid configuration")
}

fn plan(config: &Path, entity: &str, op: &str, args: &str) -> Result<()> {
    let registry = load_registry(config)?;
    let op: Operation = op.parse()?;
    let argument: Value = serde_json::from_str(args).context("--args is not valid JSON")?;

    let adapter = registry.entity(entity)?;
    let options = QueryOptions::parse(op, &argument)?;
    let request = adapter
        .plan(op, &options)
        .map_err(|err| anyhow!("{op} on '{entity}' rejected: {err}"))?;

    println!("{}", serde_json::to_string_pretty(&describe(&request))?);
    Ok(())
}

fn describe(request: &TransportRequest) -> Value {
    let method = match request.action {
        Action::Select => "GET",
        Action::Insert(_) => "POST",
        Action::Update(_) => "PATCH",
        Action::Delete => "DELETE",
    };
    let body = match &request.action {
        Action::Insert(rows) => rows.clone(),
        Action::Update(row) => Value::Object(row.clone()),
        Action::Select | Action::Delete => Value::Null,
    };
    let query: Vec<Value> = query_pairs(request)
        .into_iter()
        .map(|(key, value)| json!([key, value]))
        .collect();

    json!({
        "method": method,
        "table": request.table,
        "query": query,
        "single": request.single,
        "body": body,
    })
}

fn convert(to: Case, input: Option<&Path>) -> Result<()> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let document: Value = serde_json::from_str(&text).context("Input is not valid JSON")?;

    let naming = NamingConverter::new();
    let converted = match to {
        Case::Storage => naming.to_storage_case(document),
        Case::Application => naming.to_application_case(document),
    };
    println!("{}", serde_json::to_string_pretty(&converted)?);
    Ok(())
}
