use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use omnidetect_lib::init_logging;
use omnidetect_lib::models::DetectionOutcome;
use omnidetect_lib::services::{
    AppConfig, ConfigStore, DetectionError, DetectionService, HistoryStore, JsonlHistory,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Callers must bound image uploads; this is the limit the CLI enforces
const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "omnidetect", version, about = "Detect AI-generated images and text")]
struct Cli {
    /// Alternate config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "OMNIDETECT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an image file
    Image { path: PathBuf },
    /// Classify text given inline or read from a file
    Text {
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// List recent detections, newest first, or delete one
    History {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Summary counts over the whole history
    Stats,
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Delete one record by id
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective config with secrets masked
    Show,
    /// Write a default config file if none exists
    Init,
}

fn open_store(path: Option<&Path>) -> Result<ConfigStore> {
    match path {
        Some(p) => Ok(ConfigStore::with_file(p.to_path_buf())),
        None => ConfigStore::open_default().context("locating config directory"),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Process exit status for a failed detection
fn failure_code(error: &DetectionError) -> u8 {
    match error {
        DetectionError::InvalidInput(_) => 2,
        DetectionError::ChainExhausted { .. } => 3,
    }
}

fn print_outcome(
    result: Result<DetectionOutcome, DetectionError>,
    filename: Option<&str>,
) -> Result<ExitCode> {
    match result {
        Ok(outcome) => {
            print_json(&json!({
                "success": true,
                "data": outcome.report(filename),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&json!({
                "success": false,
                "error": { "category": e.category(), "message": e.to_string() },
            }))?;
            Ok(ExitCode::from(failure_code(&e)))
        }
    }
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    if meta.len() > MAX_IMAGE_BYTES {
        bail!(
            "{} is {} bytes, larger than the {} byte limit",
            path.display(),
            meta.len(),
            MAX_IMAGE_BYTES
        );
    }
    Ok(tokio::fs::read(path).await?)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging();

    let store = open_store(cli.config.as_deref())?;
    let config = store.load_effective()?;
    let history: Arc<dyn HistoryStore> =
        Arc::new(JsonlHistory::new(config.history.resolved_path()));

    match cli.command {
        Command::Image { path } => {
            let bytes = read_image(&path).await?;
            let filename = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "upload".to_string());
            let service = DetectionService::from_config(&config, history)?;
            let result = service.detect_image(&bytes, &filename).await;
            print_outcome(result, Some(&filename))
        }
        Command::Text { text, file } => {
            let text = match (text, file) {
                (Some(t), _) => t,
                (None, Some(f)) => tokio::fs::read_to_string(&f)
                    .await
                    .with_context(|| format!("reading {}", f.display()))?,
                (None, None) => bail!("provide TEXT or --file"),
            };
            let service = DetectionService::from_config(&config, history)?;
            let result = service.detect_text(&text).await;
            print_outcome(result, None)
        }
        Command::History { limit, action: None } => {
            let records = history.recent(limit).await?;
            print_json(&json!({ "success": true, "history": records }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::History {
            action: Some(HistoryAction::Delete { id }),
            ..
        } => {
            if history.delete(id).await? {
                print_json(&json!({ "success": true, "message": "Record deleted" }))?;
                Ok(ExitCode::SUCCESS)
            } else {
                print_json(&json!({
                    "success": false,
                    "error": { "category": "not_found", "message": format!("no record {}", id) },
                }))?;
                Ok(ExitCode::from(4))
            }
        }
        Command::Stats => {
            let stats = history.stats().await?;
            print_json(&json!({ "success": true, "stats": stats }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                print_json(&serde_json::to_value(config.masked())?)?;
                Ok(ExitCode::SUCCESS)
            }
            ConfigAction::Init => {
                if store.config_file().exists() {
                    bail!("{} already exists", store.config_file().display());
                }
                store.save(&AppConfig::default())?;
                info!("wrote {}", store.config_file().display());
                println!("{}", store.config_file().display());
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        let invalid = DetectionError::InvalidInput("missing image".to_string());
        assert_eq!(failure_code(&invalid), 2);
        let exhausted = DetectionError::ChainExhausted {
            kind: "image",
            attempts: 2,
            reason: "HuggingFace: HTTP 503: down".to_string(),
        };
        assert_eq!(failure_code(&exhausted), 3);
    }

    #[test]
    fn test_history_delete_parses_id() {
        let id = Uuid::new_v4();
        let id_text = id.to_string();
        let cli = Cli::try_parse_from(["omnidetect", "history", "delete", id_text.as_str()]).unwrap();
        match cli.command {
            Command::History {
                action: Some(HistoryAction::Delete { id: parsed }),
                ..
            } => assert_eq!(parsed, id),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["omnidetect", "history", "delete", "42"]).is_err());

        let cli = Cli::try_parse_from(["omnidetect", "history", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 5, action: None }));
    }
}
