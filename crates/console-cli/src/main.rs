//! Exam console command-line client
//!
//! Issues authenticated requests against the exam console backend using the
//! persisted session, refreshing the access token when it has expired.

mod navigator;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use common::Config;
use session::{ApiClient, ApiRequest, CredentialStore, FileCredentialStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

use navigator::TerminalNavigator;

/// Exam console client
#[derive(Parser, Debug)]
#[command(name = "exam-console")]
#[command(about = "Authenticated client for the exam console API", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "EXAM_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the config file
    #[arg(long, env = "EXAM_CONSOLE_BASE_URL")]
    base_url: Option<String>,

    /// Credentials file, overrides the config file
    #[arg(long, env = "EXAM_CONSOLE_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one authenticated request and print the JSON response
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path below the base URL, e.g. /api/v1/exams
        path: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Store a token pair obtained from the web console
    ImportTokens {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: Option<String>,
    },
    /// Exchange the refresh token for a new token pair now
    Refresh,
    /// Show what the credential store holds
    Status,
    /// Forget the stored tokens
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        config.api.base_url = base_url;
    }
    if let Some(credentials) = args.credentials {
        config.storage.credentials_file = Some(credentials);
    }

    let credentials_path = config
        .credentials_path()
        .ok_or_else(|| anyhow!("Could not determine where to keep credentials; pass --credentials"))?;
    tracing::debug!("Using credentials at {:?}", credentials_path);
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(credentials_path));
    let navigator = Arc::new(TerminalNavigator::new("/"));
    let client = ApiClient::from_config(&config, store.clone(), navigator)?;

    match args.command {
        Command::Request { method, path, body } => {
            let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method {method}"))?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                let body = serde_json::from_str(&body).context("Request body is not valid JSON")?;
                request = request.with_body(body);
            }

            let response = client.execute(&request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::ImportTokens { access, refresh } => {
            store.set_tokens(&access, refresh.as_deref());
            println!("Tokens stored.");
        }
        Command::Refresh => match client.refresher().refresh().await {
            Some(_) => println!("Access token refreshed."),
            None => {
                store.clear();
                client.guard().enforce_authenticated();
                return Err(anyhow!("Could not refresh the access token"));
            }
        },
        Command::Status => {
            let credentials = store.snapshot();
            println!("Base URL:      {}", client.base_url());
            println!("Access token:  {}", presence(credentials.access_token.as_deref()));
            println!("Refresh token: {}", presence(credentials.refresh_token.as_deref()));
            println!(
                "Device id:     {}",
                credentials.device_id.as_deref().unwrap_or("(not generated yet)")
            );
        }
        Command::Logout => {
            store.clear();
            println!("Signed out.");
        }
    }

    Ok(())
}

fn presence(token: Option<&str>) -> &'static str {
    match token {
        Some(_) => "present",
        None => "missing",
    }
}
