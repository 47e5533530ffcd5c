mod catalog;
mod config;
mod dashboard;
mod dismissal;
mod ipc;
mod logs;
mod remote;
mod telemetry;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::resolve(config::Cli::parse())?;
    telemetry::init_tracing(&config.log_level, config.log_format);

    let api = remote::HttpDashboardApi::new(&config.remote).context("building http client")?;
    let state = Arc::new(ipc::AppState::new(
        config.remote.backend_url.to_string(),
        Arc::new(api),
    ));
    info!(backend = %config.remote.backend_url, "qoyodd ready");

    // Requests run concurrently, so responses may complete out of order; a
    // single writer keeps each one on its own line.
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(resp) = rx.recv().await {
            let mut line =
                serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!(error = %e, "stdout closed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = tx.send(json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                }));
                continue;
            }
        };

        let state = Arc::clone(&state);
        let tx = tx.clone();
        tokio::spawn(async move {
            let resp = ipc::handle_request(&state, req).await;
            let _ = tx.send(resp);
        });
    }

    // Stdin closed: let in-flight requests answer before exiting.
    drop(tx);
    let _ = writer.await;
    Ok(())
}
