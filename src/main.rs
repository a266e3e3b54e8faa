use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use neoquent::config::Neo4jConfig;
use neoquent::query::{QueryBuilder, ReturnMode};

/// Neoquent - Eloquent-style queries compiled to Cypher
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON query description and print the Cypher and its parameters
    Compile {
        /// Query description (QueryBuilder JSON)
        file: PathBuf,

        /// YAML configuration; NEOQUENT_* environment variables are used otherwise
        #[arg(long)]
        config: Option<PathBuf>,

        /// Compile as if APOC procedures were unavailable
        #[arg(long)]
        no_apoc: bool,

        /// Compile the count query instead of the row query
        #[arg(long)]
        count: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Neo4jConfig {
    let loaded = match path {
        Some(path) => Neo4jConfig::from_yaml_file(path),
        None => Neo4jConfig::from_env(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

fn compile(file: PathBuf, config: Neo4jConfig, count: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let builder: QueryBuilder = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid query description", file.display()))?;

    let mode = if count {
        ReturnMode::Count
    } else {
        ReturnMode::Rows
    };
    let query = builder.compile_with(&mode, config.capabilities())?;

    println!("{}", query.cypher);
    println!("{}", serde_json::to_string_pretty(&query.parameters)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Defaults to WARN level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile {
            file,
            config,
            no_apoc,
            count,
        } => {
            let mut config = load_config(config.as_ref());
            if no_apoc {
                config.apoc_available = false;
            }
            log::info!("Compiling {} (apoc: {})", file.display(), config.apoc_available);
            compile(file, config, count)
        }
    }
}
