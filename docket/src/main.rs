mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docket_core::{Cipher, Document, Encrypted, IdStrategy, Json, ScanEvent, Store, StoreOptions};
use futures::StreamExt;
use output::{
    ClearOutput, DocumentsOutput, GetOutput, InitOutput, ListOutput, OutputWriter, RemoveOutput,
    SaveOutput, document_lines,
};
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Docket - A minimal per-document file store
#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "One file per document, keyed by identifier", long_about = None)]
#[command(version)]
struct Cli {
    /// Document directory (defaults to DOCKET_DIR env var or ./docket-store)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Encrypt documents with this passphrase (defaults to DOCKET_PASSPHRASE env var)
    #[arg(long, global = true)]
    passphrase: Option<String>,

    /// Cipher for encrypted documents
    #[arg(long, global = true, default_value = "chacha20poly1305")]
    cipher: String,

    /// Identifier strategy for new documents: random, datetime, utc-datetime
    #[arg(long, global = true, default_value = "random")]
    id_strategy: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the document directory if needed
    Init,

    /// Save a JSON object read from a file or stdin
    Save {
        /// Input file ("-" or omitted for stdin)
        file: Option<PathBuf>,

        /// Identifier to save under (overrides any _id in the input)
        #[arg(long)]
        id: Option<String>,
    },

    /// Print a document
    Get {
        /// Document identifier
        id: String,
    },

    /// Remove a document
    Rm {
        /// Document identifier
        id: String,
    },

    /// Remove every document
    Clear,

    /// List document identifiers
    Ls,

    /// Print every document
    All,

    /// Print documents matching all KEY=VALUE conditions
    Scan {
        /// Condition; VALUE is parsed as JSON, falling back to a string
        #[arg(long = "where", value_name = "KEY=VALUE", required = true)]
        conditions: Vec<String>,
    },
}

/// Resolved store configuration.
struct Config {
    dir: PathBuf,
    options: StoreOptions,
}

impl Config {
    /// Resolve flags, then environment, then defaults.
    fn from_cli(cli: &Cli) -> Result<Self> {
        let dir = cli
            .dir
            .clone()
            .or_else(|| std::env::var("DOCKET_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("./docket-store"));

        let passphrase = cli
            .passphrase
            .clone()
            .or_else(|| std::env::var("DOCKET_PASSPHRASE").ok())
            .filter(|p| !p.is_empty());

        let strategy: IdStrategy = cli
            .id_strategy
            .parse()
            .with_context(|| format!("Invalid id strategy: {}", cli.id_strategy))?;
        let mut options = StoreOptions::new().shared_id_generator(strategy.generator());

        if let Some(passphrase) = passphrase {
            let cipher: Cipher = cli
                .cipher
                .parse()
                .with_context(|| format!("Invalid cipher: {}", cli.cipher))?;
            options = options.format(Encrypted::new(cipher, passphrase, Json));
        }

        tracing::debug!(dir = %dir.display(), id_strategy = %strategy, ?options, "resolved configuration");
        Ok(Self { dir, options })
    }

    async fn open(&self) -> Result<Store> {
        Store::open_with(&self.dir, self.options.clone())
            .await
            .with_context(|| format!("Failed to open store at {}", self.dir.display()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    match run(cli, &output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = result_code(&err);
            output.write_error(&err, code);
            ExitCode::from(code)
        }
    }
}

/// Exit status: 2 for a missing document, 1 for everything else.
fn result_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<docket_core::Error>() {
        Some(e) if e.is_not_found() => 2,
        _ => 1,
    }
}

async fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    let config = Config::from_cli(&cli)?;

    match cli.command {
        Commands::Init => cmd_init(&config, output).await,
        Commands::Save { file, id } => cmd_save(&config, output, file.as_deref(), id).await,
        Commands::Get { id } => cmd_get(&config, output, &id).await,
        Commands::Rm { id } => cmd_rm(&config, output, &id).await,
        Commands::Clear => cmd_clear(&config, output).await,
        Commands::Ls => cmd_ls(&config, output).await,
        Commands::All => cmd_all(&config, output).await,
        Commands::Scan { conditions } => cmd_scan(&config, output, &conditions).await,
    }
}

async fn cmd_init(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = config.open().await?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        dir: store.dir().display().to_string(),
        extension: store.extension().to_string(),
    };
    output.write(&data, || {
        format!(
            "Initialized docket store at {}\nExtension: {}\n",
            data.dir, data.extension
        )
    })
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

async fn cmd_save(
    config: &Config,
    output: &OutputWriter,
    file: Option<&Path>,
    id: Option<String>,
) -> Result<()> {
    let store = config.open().await?;

    let input = read_input(file)?;
    let value: Value = serde_json::from_str(&input).context("Input is not valid JSON")?;
    let mut document = Document::from_value(value)?;
    if let Some(id) = id {
        document.set_id(id);
    }

    let saved = store.save(&document).await.context("Failed to save document")?;
    let id = saved.id().unwrap_or_default().to_string();
    let path = store.document_path(&id)?;

    let data = SaveOutput {
        success: true,
        result_code: 0,
        id,
        path: path.display().to_string(),
    };
    output.write(&data, || format!("{}\n", data.id))
}

async fn cmd_get(config: &Config, output: &OutputWriter, id: &str) -> Result<()> {
    let store = config.open().await?;

    let document = store
        .get(id)
        .await
        .with_context(|| format!("Failed to read document {}", id))?;

    let data = GetOutput {
        success: true,
        result_code: 0,
        document,
    };
    output.write(&data, || {
        serde_json::to_string_pretty(&data.document).unwrap_or_default() + "\n"
    })
}

async fn cmd_rm(config: &Config, output: &OutputWriter, id: &str) -> Result<()> {
    let store = config.open().await?;

    store
        .remove(id)
        .await
        .with_context(|| format!("Failed to remove document {}", id))?;

    let data = RemoveOutput {
        success: true,
        result_code: 0,
        id: id.to_string(),
    };
    output.write(&data, || format!("Removed {}\n", data.id))
}

async fn cmd_clear(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = config.open().await?;

    store.clear().await.context("Failed to clear store")?;

    let data = ClearOutput {
        success: true,
        result_code: 0,
    };
    output.write(&data, || String::from("Cleared\n"))
}

async fn cmd_ls(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = config.open().await?;

    let ids = store.ids().await.context("Failed to list documents")?;

    let data = ListOutput {
        success: true,
        result_code: 0,
        ids,
    };
    output.write(&data, || {
        data.ids.iter().map(|id| format!("{}\n", id)).collect()
    })
}

async fn cmd_all(config: &Config, output: &OutputWriter) -> Result<()> {
    let store = config.open().await?;

    if output.is_json() {
        let documents = store.all().await.context("Failed to read documents")?;
        return write_documents(output, documents);
    }

    // Text mode prints documents as they are read.
    let mut stream = store.all_stream();
    while let Some(event) = stream.next().await {
        match event {
            ScanEvent::Document(document) => output.write_line(&document)?,
            ScanEvent::End => break,
            ScanEvent::Error(err) => {
                return Err(anyhow::Error::new(err).context("Failed to read documents"));
            }
        }
    }
    Ok(())
}

async fn cmd_scan(config: &Config, output: &OutputWriter, conditions: &[String]) -> Result<()> {
    let store = config.open().await?;

    let conditions = conditions
        .iter()
        .map(|c| parse_condition(c.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let documents = store
        .scan(|document| matches_all(document, &conditions))
        .await
        .context("Failed to scan documents")?;

    write_documents(output, documents)
}

fn write_documents(output: &OutputWriter, documents: Vec<Document>) -> Result<()> {
    let data = DocumentsOutput {
        success: true,
        result_code: 0,
        count: documents.len(),
        documents,
    };
    output.write(&data, || document_lines(&data.documents))
}

/// Parse `KEY=VALUE`. VALUE is JSON if it parses, otherwise a string.
fn parse_condition(condition: &str) -> Result<(String, Value)> {
    let (key, raw) = condition
        .split_once('=')
        .with_context(|| format!("Condition must be KEY=VALUE: {}", condition))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Condition has an empty key: {}", condition);
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn matches_all(document: &Document, conditions: &[(String, Value)]) -> bool {
    conditions
        .iter()
        .all(|(key, value)| document.get(key) == Some(value))
}
