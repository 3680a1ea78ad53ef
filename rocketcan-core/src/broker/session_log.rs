//! The per-session log file (`ipc_<port>.log`), grounded on
//! `ipc_server.c`'s `log_info`/`log_data`: a timestamped line per event,
//! with a final summary written on shutdown.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::broker::counters::CounterSnapshot;
use crate::error::Result;

/// How much detail the session log records, ordered least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    #[default]
    None,
    Info,
    Data,
    All,
}

pub struct SessionLog {
    file: Mutex<tokio::fs::File>,
    level: LogLevel,
}

fn timestamp() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    format!("{}.{:06}", since_epoch.as_secs(), since_epoch.subsec_micros())
}

impl SessionLog {
    /// Opens (creating if necessary) `ipc_<port>.log` in `dir`.
    pub async fn open(dir: &std::path::Path, port: u16, level: LogLevel) -> Result<Self> {
        let path = dir.join(format!("ipc_{port}.log"));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(SessionLog {
            file: Mutex::new(file),
            level,
        })
    }

    async fn write_line(&self, line: &str) {
        let mut file = self.file.lock().await;
        let _ = file.write_all(format!("[{}] {line}\n", timestamp()).as_bytes()).await;
    }

    /// Lifecycle and connection events: start, stop, accept, disconnect.
    pub async fn info(&self, line: &str) {
        if self.level >= LogLevel::Info {
            self.write_line(line).await;
        }
    }

    /// Per-record traffic: one line per send/receive. At `Data` this is a
    /// byte-count summary; at `All` it additionally carries a full hex dump
    /// of every byte.
    pub async fn data(&self, line: &str, bytes: &[u8]) {
        if self.level >= LogLevel::All {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ");
            self.write_line(&format!("{line}: {} bytes: {hex}", bytes.len())).await;
        } else if self.level >= LogLevel::Data {
            self.write_line(&format!("{line}: {} bytes", bytes.len())).await;
        }
    }

    /// Writes the end-of-session summary: counters and elapsed wall time.
    pub async fn summary(&self, counters: CounterSnapshot, elapsed: Duration) {
        self.info(&format!(
            "session summary: sent={} received={} lost={} elapsed={:.3}s",
            counters.sent,
            counters.received,
            counters.lost,
            elapsed.as_secs_f64()
        ))
        .await;
    }
}
