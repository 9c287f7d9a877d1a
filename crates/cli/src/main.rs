mod config;
mod serve;
mod store;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use provost_core::{builtin_registry, GRADE_SUBMISSION};
use provost_engine::{summarize, GradePublicationObserver, LifecycleEngine, TransitionReceipt};
use provost_storage::{MemoryStorage, Record, RecordFilter, RecordStorage};

use crate::config::CliConfig;
use crate::store::FileStorage;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Provost record lifecycle toolchain.
#[derive(Parser)]
#[command(name = "provost", version, about = "Provost record lifecycle toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Record store file (default: provost-store.json, or `store` from config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file (default: provost.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a record at its workflow's start status
    Submit {
        /// Record type (e.g. payment, grade_submission)
        record_type: String,
        /// Payload as inline JSON or @file.json
        #[arg(long)]
        payload: String,
        /// Initial status literal; defaults to the type's start status
        #[arg(long)]
        status: Option<String>,
    },

    /// Move a record to a new status
    Transition {
        /// Record id
        id: String,
        /// Target status
        to: String,
        /// Acting identity, recorded in the history
        #[arg(long)]
        actor: String,
        /// Free-text note attached to the history entry
        #[arg(long)]
        note: Option<String>,
    },

    /// Print one record with its transition history
    Show {
        /// Record id
        id: String,
    },

    /// List records of a type
    List {
        /// Record type
        record_type: String,
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by an actor appearing in the history
        #[arg(long)]
        actor: Option<String>,
    },

    /// Merge fields into a record's payload
    Update {
        /// Record id
        id: String,
        /// JSON object merged into the payload (top-level keys)
        #[arg(long)]
        payload: String,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
    },

    /// Status counts and amount sums for a record type
    Summary {
        /// Record type
        record_type: String,
        /// Payload field to group amount sums by (e.g. department)
        #[arg(long)]
        group_by: Option<String>,
    },

    /// Print the registered workflow definitions
    Workflows,

    /// Run the HTTP JSON API
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 7478)]
        port: u16,
        /// Use an in-memory store instead of the store file
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(cli).await {
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = config::load(cli.config.as_deref())?;
    let store_path = cli
        .store
        .clone()
        .or_else(|| config.store.clone())
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_STORE_FILE));

    match cli.command {
        Commands::Submit {
            record_type,
            payload,
            status,
        } => {
            let engine = file_engine(store_path).await?;
            cmd_submit(&engine, &config, &record_type, &payload, status, cli.output).await
        }
        Commands::Transition {
            id,
            to,
            actor,
            note,
        } => {
            let engine = file_engine(store_path).await?;
            let receipt = engine
                .transition(&id, &to, &actor, note)
                .await
                .map_err(|e| e.to_string())?;
            report_receipt(&receipt, cli.output)
        }
        Commands::Show { id } => {
            let engine = file_engine(store_path).await?;
            let record = engine.get(&id).await.map_err(|e| e.to_string())?;
            print_record(&record, cli.output)
        }
        Commands::List {
            record_type,
            status,
            actor,
        } => {
            let engine = file_engine(store_path).await?;
            let filter = RecordFilter {
                status,
                actor,
                ..Default::default()
            };
            let records = engine
                .list(&record_type, &filter)
                .await
                .map_err(|e| e.to_string())?;
            print_listing(&records, cli.output)
        }
        Commands::Update { id, payload } => {
            let engine = file_engine(store_path).await?;
            cmd_update(&engine, &id, &payload, cli.output).await
        }
        Commands::Delete { id } => {
            let engine = file_engine(store_path).await?;
            engine.delete(&id).await.map_err(|e| e.to_string())?;
            if cli.output == OutputFormat::Json {
                println!("{}", serde_json::json!({"deleted": id}));
            } else {
                println!("Deleted {}", id);
            }
            Ok(())
        }
        Commands::Summary {
            record_type,
            group_by,
        } => {
            let engine = file_engine(store_path).await?;
            let records = engine
                .list(&record_type, &RecordFilter::default())
                .await
                .map_err(|e| e.to_string())?;
            let aggregate = summarize(&records, group_by.as_deref());
            print_summary(&record_type, group_by.as_deref(), &aggregate, cli.output)
        }
        Commands::Workflows => {
            let registry = builtin_registry();
            if cli.output == OutputFormat::Json {
                let rendered = serde_json::to_string_pretty(registry.defs())
                    .map_err(|e| e.to_string())?;
                println!("{}", rendered);
            } else {
                for def in registry.defs() {
                    println!("{} (start: {})", def.record_type, def.initial);
                    for t in &def.transitions {
                        println!("  {} -> {}", t.from, t.to);
                    }
                    let terminal: Vec<&str> = def
                        .states
                        .iter()
                        .filter(|s| def.is_terminal(s))
                        .map(|s| s.as_str())
                        .collect();
                    println!("  terminal: {}", terminal.join(", "));
                    if def.unrestricted_delete {
                        println!("  deletable at any status");
                    }
                    println!();
                }
            }
            Ok(())
        }
        Commands::Serve { port, ephemeral } => {
            if ephemeral {
                let storage = Arc::new(MemoryStorage::new());
                let engine = engine_over(storage).await;
                serve::start_server(port, engine).await
            } else {
                let engine = file_engine(store_path).await?;
                serve::start_server(port, engine).await
            }
        }
    }
}

/// Build an engine over the store file, with the built-in workflow set
/// and the grade-publication fan-out registered.
async fn file_engine(store_path: PathBuf) -> Result<LifecycleEngine<FileStorage>, String> {
    let storage = Arc::new(FileStorage::open(store_path).map_err(|e| e.to_string())?);
    Ok(engine_over(storage).await)
}

async fn engine_over<S: RecordStorage>(storage: Arc<S>) -> LifecycleEngine<S> {
    let engine = LifecycleEngine::new(Arc::clone(&storage), builtin_registry());
    engine
        .observers()
        .register(
            GRADE_SUBMISSION,
            "published",
            Arc::new(GradePublicationObserver::new(storage)),
        )
        .await;
    engine
}

async fn cmd_submit<S: RecordStorage>(
    engine: &LifecycleEngine<S>,
    config: &CliConfig,
    record_type: &str,
    raw_payload: &str,
    status: Option<String>,
    output: OutputFormat,
) -> Result<(), String> {
    let mut payload = parse_payload(raw_payload)?;

    // Stamp the configured academic term unless the payload carries one.
    if let Some(term) = &config.term {
        if let Some(obj) = payload.as_object_mut() {
            if !obj.contains_key("term") {
                let value = serde_json::to_value(term).map_err(|e| e.to_string())?;
                obj.insert("term".to_string(), value);
            }
        }
    }

    let initial_status = match status {
        Some(s) => s,
        None => {
            let def = engine
                .registry()
                .get(record_type)
                .map_err(|e| e.to_string())?;
            def.initial.clone()
        }
    };

    let record = engine
        .create(record_type, &initial_status, payload)
        .await
        .map_err(|e| e.to_string())?;
    print_record(&record, output)
}

async fn cmd_update<S: RecordStorage>(
    engine: &LifecycleEngine<S>,
    id: &str,
    raw_payload: &str,
    output: OutputFormat,
) -> Result<(), String> {
    let patch = parse_payload(raw_payload)?;
    let patch = match patch {
        serde_json::Value::Object(map) => map,
        _ => return Err("update payload must be a JSON object".to_string()),
    };

    let record = engine
        .update(id, move |payload| match payload.as_object_mut() {
            Some(target) => {
                for (key, value) in patch {
                    target.insert(key, value);
                }
            }
            None => *payload = serde_json::Value::Object(patch),
        })
        .await
        .map_err(|e| e.to_string())?;
    print_record(&record, output)
}

/// Parse a payload argument: inline JSON, or `@path` to read a file.
fn parse_payload(raw: &str) -> Result<serde_json::Value, String> {
    let text = match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).map_err(|e| format!("error reading '{}': {}", path, e))?
        }
        None => raw.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid payload JSON: {}", e))
}

fn print_record(record: &Record, output: OutputFormat) -> Result<(), String> {
    match output {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(record).map_err(|e| e.to_string())?;
            println!("{}", rendered);
        }
        OutputFormat::Text => {
            println!("id:      {}", record.id);
            println!("type:    {}", record.record_type);
            println!("status:  {}", record.status);
            println!("version: {}", record.version);
            println!("created: {}", record.created_at);
            println!("updated: {}", record.updated_at);
            println!("payload: {}", record.payload);
            if !record.history.is_empty() {
                println!("history:");
                for entry in &record.history {
                    let note = entry
                        .note
                        .as_deref()
                        .map(|n| format!(" ({})", n))
                        .unwrap_or_default();
                    println!(
                        "  {} -> {} by {} at {}{}",
                        entry.from_status, entry.to_status, entry.actor, entry.at, note
                    );
                }
            }
        }
    }
    Ok(())
}

fn report_receipt(receipt: &TransitionReceipt, output: OutputFormat) -> Result<(), String> {
    for failure in &receipt.observer_failures {
        eprintln!(
            "Warning: observer '{}' failed after commit: {}",
            failure.observer, failure.error
        );
    }
    match output {
        OutputFormat::Json => {
            let failures: Vec<serde_json::Value> = receipt
                .observer_failures
                .iter()
                .map(|f| serde_json::json!({"observer": f.observer, "error": f.error.message}))
                .collect();
            let body = serde_json::json!({
                "record": receipt.record,
                "observer_failures": failures,
            });
            let rendered = serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?;
            println!("{}", rendered);
            Ok(())
        }
        OutputFormat::Text => {
            println!(
                "{} is now '{}' (version {})",
                receipt.record.id, receipt.record.status, receipt.record.version
            );
            Ok(())
        }
    }
}

fn print_listing(records: &[Record], output: OutputFormat) -> Result<(), String> {
    match output {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(records).map_err(|e| e.to_string())?;
            println!("{}", rendered);
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records.");
            }
            for record in records {
                println!(
                    "{}  {:<18} created {}  updated {}",
                    record.id, record.status, record.created_at, record.updated_at
                );
            }
        }
    }
    Ok(())
}

fn print_summary(
    record_type: &str,
    group_by: Option<&str>,
    aggregate: &provost_engine::Aggregate,
    output: OutputFormat,
) -> Result<(), String> {
    match output {
        OutputFormat::Json => {
            let sums: serde_json::Map<String, serde_json::Value> = aggregate
                .sums_by_group
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.to_string())))
                .collect();
            let body = serde_json::json!({
                "record_type": record_type,
                "total": aggregate.total,
                "counts_by_status": aggregate.counts_by_status,
                "sums_by_group": sums,
            });
            let rendered = serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?;
            println!("{}", rendered);
        }
        OutputFormat::Text => {
            println!("{}: {} records", record_type, aggregate.total);
            for (status, count) in &aggregate.counts_by_status {
                println!("  {:<18} {}", status, count);
            }
            if let Some(key) = group_by {
                println!("amount by {}:", key);
                for (group, sum) in &aggregate.sums_by_group {
                    println!("  {:<18} {}", group, sum);
                }
            }
        }
    }
    Ok(())
}
