//! huginn: cache and token usage inspection CLI

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use huginn::validate::is_safe_name;
use huginn::{CacheManager, Config, Huginn, LogOutcome};

/// Huginn cache and token usage CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Inspect huginn caches and token usage")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Durable cache operations
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Token usage ledger operations
    #[command(subcommand)]
    Usage(UsageCommand),

    /// Estimate tokens in text
    Tokens {
        /// Text to estimate (or omit to read from stdin)
        text: Option<String>,
        /// Model whose tokenizer to use (default: tokenizer.default_model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show build version and git metadata
    Version,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Entry counts per store
    Stats,

    /// Clear one store, or every known store
    Clear {
        /// Store alias (omit to clear all)
        alias: Option<String>,
    },

    /// Look up a cached value
    Get {
        namespace: String,
        content: String,
        /// Store alias
        #[arg(short, long, default_value = huginn::cache::DEFAULT_ALIAS)]
        alias: String,
    },
}

#[derive(Subcommand)]
enum UsageCommand {
    /// Show usage for one identity, or all of them
    Show {
        identity: Option<String>,
    },

    /// Record token usage
    Log {
        identity: String,
        #[arg(allow_negative_numbers = true)]
        input: i64,
        #[arg(allow_negative_numbers = true)]
        output: i64,
    },

    /// Delete all usage records
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // Commands that don't need the runtime
    if let Command::Version = args.command {
        println!("huginn {}", huginn::version_string());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let huginn = Huginn::from_config(&config)?;

    match args.command {
        Command::Cache(command) => {
            let caches = huginn.caches();
            register_on_disk_stores(caches)?;
            match command {
                CacheCommand::Stats => {
                    for (alias, entries) in caches.stats() {
                        println!("{alias:<24} {entries}");
                    }
                }
                CacheCommand::Clear { alias: Some(alias) } => {
                    let store = caches.register(&alias, None)?;
                    let removed = store.len();
                    store.clear()?;
                    println!("cleared {removed} entries from {alias}");
                }
                CacheCommand::Clear { alias: None } => {
                    caches.clear_all()?;
                    println!("cleared {} stores", caches.list_aliases().len());
                }
                CacheCommand::Get {
                    namespace,
                    content,
                    alias,
                } => {
                    let store = caches
                        .get(&alias)
                        .ok_or_else(|| format!("unknown cache alias: {alias}"))?;
                    match store.get(&content, &namespace) {
                        Some(value) => println!("{value}"),
                        None => {
                            eprintln!("not cached");
                            std::process::exit(1);
                        }
                    }
                }
            }
        }

        Command::Usage(UsageCommand::Show { identity }) => {
            let usage = huginn.usage();
            match identity {
                Some(identity) => {
                    let record = usage.get_usage(&identity);
                    println!(
                        "{identity}: {}/{} tokens (input {}, output {}, updated {})",
                        record.total,
                        usage.limit_for(&identity),
                        record.input,
                        record.output,
                        record.last_updated.to_rfc3339()
                    );
                }
                None => {
                    for (identity, record) in usage.all_usage() {
                        println!(
                            "{identity:<24} {:>10}/{:<10} updated {}",
                            record.total,
                            usage.limit_for(&identity),
                            record.last_updated.to_rfc3339()
                        );
                    }
                    let total = usage.get_total_usage();
                    println!("{:<24} {:>10}/{:<10}", "(system)", total.total, usage.limits().system);
                }
            }
        }

        Command::Usage(UsageCommand::Log {
            identity,
            input,
            output,
        }) => match huginn.usage().log(&identity, input, output)? {
            LogOutcome::Recorded(receipt) => {
                println!("{identity}: {} tokens recorded", receipt.usage.total);
                if receipt.identity_near_limit || receipt.system_near_limit {
                    eprintln!("warning: approaching token limit");
                }
            }
            rejected => {
                rejected.into_result()?;
            }
        },

        Command::Usage(UsageCommand::Reset) => {
            huginn.usage().reset()?;
            println!("token usage reset");
        }

        Command::Tokens { text, model } => {
            let text = resolve_text(text, "tokens")?;
            let model = model.unwrap_or_else(|| config.tokenizer.default_model.clone());
            let count = huginn.estimator().estimate(&text, &model);
            println!("{count} tokens");
        }

        // printed above
        Command::Version => {}
    }

    Ok(())
}

/// Register every `{alias}_cache.json` found in the cache directory.
///
/// The default store's own file is skipped.
fn register_on_disk_stores(caches: &CacheManager) -> Result<(), Box<dyn std::error::Error>> {
    let default_path = caches.default_store().path().to_path_buf();
    let entries = match fs::read_dir(caches.cache_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.path() == default_path {
            continue;
        }
        let name = entry.file_name();
        let Some(alias) = name
            .to_str()
            .and_then(|name| name.strip_suffix("_cache.json"))
        else {
            continue;
        };
        if is_safe_name(alias) {
            caches.register(alias, None)?;
        }
    }
    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
