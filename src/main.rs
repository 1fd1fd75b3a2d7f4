/*!
 * Kiosk Orchestrator - Main Entry Point
 *
 * Reads decoded UI intents from stdin, one per line:
 * - `launch <command line>`
 * - `web <url>`
 * - `terminate`
 * - `quit`
 *
 * UI events are printed to stdout as JSON lines.
 */

use anyhow::{Context, Result};
use kiosk_orchestrator::{
    init_tracing, LaunchTarget, OrchestratorBuilder, OrchestratorConfig, OrchestratorHandle,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq)]
enum Intent {
    Launch(LaunchTarget),
    Terminate,
    Quit,
}

fn parse_intent(line: &str) -> Option<Intent> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match (verb, rest) {
        ("launch", cmd) if !cmd.is_empty() => Some(Intent::Launch(LaunchTarget::native(cmd))),
        ("web", url) if !url.is_empty() => Some(Intent::Launch(LaunchTarget::web(url))),
        ("terminate", "") => Some(Intent::Terminate),
        ("quit", "") | ("exit", "") => Some(Intent::Quit),
        _ => None,
    }
}

fn print_events(handle: &OrchestratorHandle) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Could not encode UI event"),
                },
                Err(RecvError::Lagged(missed)) => warn!(missed, "UI event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Kiosk orchestrator starting...");
    let config = OrchestratorConfig::load().context("failed to load configuration")?;
    info!(
        poll_ms = config.poll_interval.as_millis() as u64,
        web_hide_ms = config.web_hide_delay.as_millis() as u64,
        native_hide_ms = config.native_hide_delay.as_millis() as u64,
        "Configuration loaded"
    );

    let handle = OrchestratorBuilder::new(config).spawn();
    print_events(&handle);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_intent(&line) {
            Some(Intent::Launch(target)) => handle.launch(target)?,
            Some(Intent::Terminate) => handle.terminate()?,
            Some(Intent::Quit) => break,
            None => warn!(input = %line.trim(), "Unrecognized intent"),
        }
    }

    handle.shutdown().await?;
    info!("Kiosk orchestrator stopped");
    Ok(())
}
