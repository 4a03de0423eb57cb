//! Example: request an airdrop and wait until it reaches the requested commitment.
//!
//! Usage:
//!
//!   cargo run -p airdrop --example request_airdrop -- --http-url <HTTP_URL> --recipient <ADDRESS>
//!
//! Options:
//!   --ws-url <WS_URL>        WebSocket endpoint. Default: derived from --http-url.
//!   --lamports <N>           Amount to request. Default: 1000000000 (1 SOL).
//!   --commitment <LEVEL>     processed | confirmed | finalized. Default: confirmed.
//!   --poll-interval-ms <MS>  Status poll cadence. Default: 1000.
//!
//! Ctrl-C cancels the request or the pending confirmation.

use airdrop::{Address, AirdropRequester, CommitmentLevel, ConfirmerConfig};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: request_airdrop --http-url <HTTP_URL> --recipient <ADDRESS> [--ws-url <WS_URL>] [--lamports N] [--commitment LEVEL] [--poll-interval-ms MS]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("airdrop=info")))
        .init();
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = std::env::args().collect();
    let mut http_url = String::new();
    let mut ws_url = String::new();
    let mut recipient = String::new();
    let mut lamports: u64 = 1_000_000_000;
    let mut commitment = CommitmentLevel::Confirmed;
    let mut poll_interval_ms: u64 = 1000;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--http-url" => {
                i += 1;
                http_url = args.get(i).cloned().unwrap_or_default();
            }
            "--ws-url" => {
                i += 1;
                ws_url = args.get(i).cloned().unwrap_or_default();
            }
            "--recipient" => {
                i += 1;
                recipient = args.get(i).cloned().unwrap_or_default();
            }
            "--lamports" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    lamports = s.parse().context("--lamports")?;
                }
            }
            "--commitment" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    commitment = s.parse()?;
                }
            }
            "--poll-interval-ms" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    poll_interval_ms = s.parse().context("--poll-interval-ms")?;
                }
            }
            "--help" | "-h" => {
                eprintln!("{USAGE}");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }
    if http_url.is_empty() || recipient.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let recipient: Address = recipient.parse().context("--recipient")?;

    let mut config = ConfirmerConfig::new(http_url);
    if !ws_url.is_empty() {
        config.ws_url = ws_url;
    }
    config.poll_interval = Duration::from_millis(poll_interval_ms);
    let requester = AirdropRequester::from_config(config)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let signature = requester
        .request_airdrop(&recipient, lamports, commitment, Some(&cancel))
        .await?;
    println!("{signature}");
    Ok(())
}
