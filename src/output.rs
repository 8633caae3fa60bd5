use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{IngestResult, ProgressEvent, ProgressSink, RunView};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Verbose,
    Quiet,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(result: &IngestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_view(view: &RunView) -> io::Result<()> {
        Self::print_json(view)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
