// src/main.rs
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use textminer::fetch::{self, FetchOptions, DEFAULT_TIMEOUT_SECS};
use textminer::storage;
use textminer::utils::{self, AppError};
use textminer::{compact_html, compile_str, RuleFormat};

const TIMEOUT_ENV: &str = "TEXTMINER_TIMEOUT";

/// Extract structured data from text or HTML with prefix/suffix rules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rule file
    #[arg(short, long)]
    rule: PathBuf,

    /// Rule format: yaml or json
    #[arg(short, long, default_value = "yaml")]
    format: RuleFormat,

    /// Page to download and extract from
    #[arg(short, long)]
    url: Option<String>,

    /// Local document to extract from (stdin when neither this nor --url is given)
    #[arg(short, long, conflicts_with = "url")]
    input: Option<PathBuf>,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Collapse whitespace around tags before extracting (always on for --url)
    #[arg(short, long)]
    compact: bool,

    /// Request timeout in seconds [env: TEXTMINER_TIMEOUT] [default: 30]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Wrap the result with its source and a timestamp
    #[arg(short, long)]
    metadata: bool,
}

fn resolve_timeout(flag: Option<u64>) -> Duration {
    let secs = flag
        .or_else(|| {
            let raw = std::env::var(TIMEOUT_ENV).ok()?;
            match raw.trim().parse() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    tracing::warn!("Ignoring {}={:?}, not a number of seconds", TIMEOUT_ENV, raw);
                    None
                }
            }
        })
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::debug!("Starting with args: {:?}", args);

    // 3. Compile the rule before touching any document
    let rule_text = std::fs::read_to_string(&args.rule)?;
    let extractor = compile_str(&rule_text, args.format)?;
    tracing::info!("Compiled {} rule from {}", extractor.kind(), args.rule.display());

    // 4. Load the document
    let (source, document) = if let Some(url) = &args.url {
        let options = FetchOptions {
            timeout: resolve_timeout(args.timeout),
            ..FetchOptions::default()
        };
        let html = fetch::fetch_document(url, &options).await?;
        (url.clone(), compact_html(&html))
    } else {
        let (source, text) = match &args.input {
            Some(path) => (path.display().to_string(), std::fs::read_to_string(path)?),
            None => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                ("<stdin>".to_string(), text)
            }
        };
        let text = if args.compact { compact_html(&text) } else { text };
        (source, text)
    };
    tracing::info!("Extracting from {} ({} bytes)", source, document.len());

    // 5. Extract and emit
    let result = extractor.extract(&document)?;
    let rendered = if args.metadata {
        storage::render_json_with_metadata(&source, &result)?
    } else {
        storage::render_json(&result)?
    };

    match &args.output {
        Some(path) => {
            storage::save_result(path, &rendered)?;
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
