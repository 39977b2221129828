//! Line-delimited JSON bridge.
//!
//! Each stdin line is one `{"action": ..., "payload": ...}` message; each
//! outbound message is written to stdout as one line in the same shape.
//! Completions of network effects are interleaved with stdin as they
//! finish. `SettingsChanged` messages are also persisted to the settings
//! store.

use cutcut_io::SettingsStore;
use cutcut_pipeline::{ErrorKind, Inbound, Outbound, Settings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, info, warn};

use crate::PipelineArgs;

/// Arguments of `cutcut bridge`.
#[derive(clap::Args)]
pub struct BridgeArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,
}

async fn emit(stdout: &mut Stdout, outbound: Vec<Outbound>) -> Result<(), String> {
    for message in outbound {
        let mut line =
            serde_json::to_string(&message).map_err(|e| format!("Error encoding output: {e}"))?;
        line.push('\n');
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Error writing to stdout: {e}"))?;
    }
    stdout
        .flush()
        .await
        .map_err(|e| format!("Error writing to stdout: {e}"))
}

fn persist(store: &SettingsStore, settings: Option<&Settings>) {
    let result = match settings {
        Some(settings) if !settings.is_empty() => store.save(settings),
        _ => store.clear(),
    };
    if let Err(e) = result {
        warn!(error = %e, "could not persist settings");
    }
}

/// Parse one input line into a message, or the error to report for it.
fn parse_line(line: &str) -> Result<Inbound, Outbound> {
    serde_json::from_str(line).map_err(|e| Outbound::ErrorReported {
        kind: ErrorKind::StageContractViolation,
        message: format!("unreadable message: {e}"),
    })
}

pub async fn run(
    args: &BridgeArgs,
    store: &SettingsStore,
    settings: Option<Settings>,
) -> Result<(), String> {
    let mut driver = args.pipeline.driver()?;
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    driver.handle(Inbound::SettingsChanged { settings }).await;
    info!(settings = %store.path().display(), "bridge ready");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| format!("Error reading stdin: {e}"))? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let outbound = match parse_line(&line) {
                    Ok(message) => {
                        if let Inbound::SettingsChanged { ref settings } = message {
                            persist(store, settings.as_ref());
                        }
                        driver.handle(message).await
                    }
                    Err(report) => {
                        debug!(line = %line, "rejected input line");
                        vec![report]
                    }
                };
                emit(&mut stdout, outbound).await?;
            }
            Some(outbound) = driver.next_completion(), if driver.in_flight() > 0 => {
                emit(&mut stdout, outbound).await?;
            }
        }
    }

    let remaining = driver.settle().await;
    emit(&mut stdout, remaining).await?;
    info!("bridge closed");
    Ok(())
}
