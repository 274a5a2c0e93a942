//! JSONL activity log - a bus subscriber that persists events to disk
//!
//! One forwarder task per topic funnels events into a single writer task so
//! lines never interleave mid-record.

use std::path::PathBuf;

use eyre::Result;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, Topic};

/// Spawn the activity logger. Returns the writer task handle; forwarder
/// tasks exit when the bus closes or shutdown flips.
pub fn spawn_event_logger(
    bus: &EventBus,
    path: PathBuf,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    debug!(?path, "spawn_event_logger: called");
    let (tx, mut rx) = mpsc::channel::<EventLogEntry>(256);

    for topic in Topic::ALL {
        let mut sub = bus.subscribe(topic);
        let tx = tx.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = sub.recv() => match event {
                        Some(event) => {
                            // Writer overload sheds log lines, never publishers
                            let _ = tx.try_send(EventLogEntry::new(event));
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
    drop(tx);

    tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, ?path, "event logger: could not open activity log");
                return;
            }
        };
        loop {
            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => {
                        let Ok(mut line) = serde_json::to_string(&entry) else {
                            continue;
                        };
                        line.push('\n');
                        if let Err(e) = file.write_all(line.as_bytes()).await {
                            warn!(error = %e, "event logger: write failed");
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let _ = file.flush().await;
        debug!("event logger: stopped");
    })
}

/// Read back all entries from an activity log (skipping torn lines)
pub async fn read_event_log(path: &PathBuf) -> Result<Vec<EventLogEntry>> {
    debug!(?path, "read_event_log: called");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
