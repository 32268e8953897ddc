// ABOUTME: CLI for fetching and decoding Torznab indexer feeds with trawler.
// ABOUTME: Prints normalized items or discovered indexers as JSON for verification.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trawler_feed::{indexer_error, parse_document, TorznabDecoder};
use trawler_fetch::{decode_body, AuthMode, ClientBuilder, Credentials, RetryPolicy};

#[derive(Parser, Debug)]
#[command(name = "trawler", version)]
#[command(about = "Fetch Torznab indexer feeds and print normalized items as JSON", long_about = None)]
struct Cli {
    /// Output compact JSON instead of pretty.
    #[arg(long, global = true, default_value_t = false)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed URL through the hardened transport and decode its items.
    Fetch {
        feed_url: String,

        /// Indexer API key.
        #[arg(long, env = "TRAWLER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Send the key as the apikey query parameter or the X-Api-Key header.
        #[arg(long, default_value_t = AuthMode::Query)]
        auth_mode: AuthMode,

        #[command(flatten)]
        net: NetArgs,
    },

    /// Decode a Torznab document from a file, or "-" for stdin. No network access.
    Decode { target: String },

    /// List the indexers configured on a Jackett-compatible proxy.
    Indexers {
        proxy_url: String,

        /// Proxy API key.
        #[arg(long, env = "TRAWLER_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(flatten)]
        net: NetArgs,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Fetch { .. } => "fetch",
            Command::Decode { .. } => "decode",
            Command::Indexers { .. } => "indexers",
        }
    }
}

#[derive(Args, Debug)]
struct NetArgs {
    /// Allow requests to private, loopback and link-local addresses.
    #[arg(long)]
    allow_private_networks: bool,

    /// Per-attempt timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Retries for idempotent requests after transient failures.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Override the User-Agent header.
    #[arg(long)]
    user_agent: Option<String>,
}

impl NetArgs {
    fn builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(self.timeout))
            .allow_private_networks(self.allow_private_networks)
            .retry_policy(RetryPolicy {
                max_retries: self.retries,
                ..RetryPolicy::default()
            });
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    debug!(command = cli.command.name(), compact = cli.compact, "CLI arguments parsed");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match run(cli.command, &cancel).await {
        Ok(output) => match render(&output, cli.compact) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {}", err);
                ExitCode::from(1)
            }
        },
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(1)
        }
    }
}

async fn run(command: Command, cancel: &CancellationToken) -> Result<Value> {
    match command {
        Command::Fetch {
            feed_url,
            api_key,
            auth_mode,
            net,
        } => {
            let client = net.builder().build_feed_client()?;
            let credentials = Credentials { api_key, auth_mode };
            let items = client
                .fetch_and_decode(&feed_url, &credentials, cancel)
                .await?;
            Ok(serde_json::to_value(items)?)
        }
        Command::Decode { target } => {
            let bytes = load_bytes(&target)?;
            let text = decode_body(&bytes, None);
            let doc = parse_document(&text)?;
            if let Some(err) = indexer_error(&doc) {
                return Err(err.into());
            }
            let items = TorznabDecoder::default().decode(&doc);
            Ok(serde_json::to_value(items)?)
        }
        Command::Indexers {
            proxy_url,
            api_key,
            net,
        } => {
            let client = net.builder().build_discovery_client()?;
            let indexers = client.list_indexers(&proxy_url, &api_key, cancel).await?;
            Ok(serde_json::to_value(indexers)?)
        }
    }
}

fn render(output: &Value, compact: bool) -> Result<String> {
    let text = if compact {
        serde_json::to_string(output)?
    } else {
        serde_json::to_string_pretty(output)?
    };
    Ok(text)
}

fn load_bytes(target: &str) -> Result<Vec<u8>> {
    if target == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }

    let path = Path::new(target);
    if !path.exists() {
        return Err(anyhow!("file not found: {}", target));
    }
    fs::read(path).with_context(|| format!("reading {}", target))
}
