use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use protosniff::config::AppConfig;
use protosniff::mapping::{Direction, Mapping, MappingTable};
use protosniff::matcher::{AutoMatcher, Resolution};
use protosniff::registry::SchemaRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "protosniff")]
#[command(about = "Decode Protocol Buffers payloads with runtime supplied schemas")]
struct Cli
{
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands
{
    /// List the message types defined by a set of .proto files
    Types
    {
        /// Schema files, compiled together
        #[arg(required = true)]
        proto: Vec<PathBuf>,
    },

    /// Decode a binary payload
    Decode
    {
        /// Schema files, compiled together
        #[arg(short, long, required = true)]
        proto: Vec<PathBuf>,

        /// File containing the raw payload
        #[arg(long)]
        payload: PathBuf,

        /// URL the payload was sent to or received from
        #[arg(short, long)]
        url: Option<String>,

        /// Traffic direction: request or response
        #[arg(short, long, default_value = "response")]
        direction: String,

        /// Decode as this message type instead of resolving one
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// JSON file with a list of URL mappings
        #[arg(short, long)]
        mappings: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()>
{
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    match cli.command {
        Commands::Types { proto } => {
            let registry = load_registry(&proto)?;
            for name in registry.message_types() {
                println!("{}", name);
            }
        }
        Commands::Decode {
            proto,
            payload,
            url,
            direction,
            type_name,
            mappings,
        } => {
            let registry = Arc::new(load_registry(&proto)?);
            let table = Arc::new(MappingTable::new());
            if let Some(path) = mappings {
                load_mappings(&table, &path)?;
            }

            let raw = std::fs::read(&payload)
                .with_context(|| format!("Failed to read payload {}", payload.display()))?;
            let direction: Direction = direction.parse()?;
            let matcher = AutoMatcher::new(registry, table, config.matcher);

            let decoded = match (type_name, url) {
                (Some(type_name), _) => Some(matcher.decode_as(&raw, &type_name)?),
                (None, Some(url)) => matcher.decode(&raw, &url, direction)?,
                (None, None) => matcher.auto_match_decode(&raw),
            };

            match decoded {
                Some(decoded) => {
                    match decoded.resolution {
                        Resolution::AutoMatch(score) => info!(
                            "Matched {} with weight {:.2} ({} of {} fields)",
                            decoded.type_name,
                            score.weight(),
                            score.matched_fields,
                            score.declared_fields
                        ),
                        other => info!("Decoded as {} ({:?})", decoded.type_name, other),
                    }
                    println!("{}", decoded.text);
                }
                None => bail!("No schema matched the payload"),
            }
        }
    }

    Ok(())
}

fn load_registry(paths: &[PathBuf]) -> anyhow::Result<SchemaRegistry>
{
    let files = paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok((display_name(path), content))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let registry = SchemaRegistry::new();
    registry.add_files(files)?;
    Ok(registry)
}

fn load_mappings(table: &MappingTable, path: &Path) -> anyhow::Result<()>
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mappings {}", path.display()))?;
    let mappings: Vec<Mapping> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid mappings in {}", path.display()))?;

    for m in mappings {
        table.add(&m.url_pattern, &m.message_type, m.direction, &m.description);
    }
    Ok(())
}

fn display_name(path: &Path) -> String
{
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
