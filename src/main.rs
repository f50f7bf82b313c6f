mod config;
mod dashboard;
mod directory;
mod error;
mod ipc;
mod model;
mod notifications;
mod portal;
mod registry;
mod report_card;
mod resolver;
mod seed;
mod store;

use anyhow::Context;
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(io::stderr)
        .init();

    let seed = match &config.seed_path {
        Some(p) => seed::Seed::from_path(p)?,
        None => seed::Seed::demo()?,
    };
    let data = seed::Dataset::build(seed).context("failed to build dataset from seed")?;
    let portal = portal::Portal::new(data, &config);
    let mut state = ipc::AppState { config, portal };
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "classbridged ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                // No id to echo back.
                json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
