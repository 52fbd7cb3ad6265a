use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FetchResult, ProgressEvent, ProgressSink};
use crate::domain::GenomeSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_summary(summary: &Option<GenomeSummary>) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_links(links: &[String]) -> io::Result<()> {
        Self::print_json(&links)
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

/// Progress lines on stderr for interactive runs.
pub struct TextProgress;

impl ProgressSink for TextProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>7.1}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("           {}", event.message),
        }
    }
}

pub fn print_fetch_summary(result: &FetchResult) {
    println!("refgen summary");
    println!("  registered: {}", result.registered);
    if !result.skipped.is_empty() {
        println!("  already in ledger: {}", result.skipped.len());
    }
    if let Some(flush) = &result.flush {
        println!("  confirmed: {} in {} batch(es)", flush.confirmed, flush.batches);
        println!("  ledger: {}", flush.ledger);
        for accession in &flush.missing {
            println!("  missing from response: {accession}");
        }
    }
    if let Some(log) = &result.log {
        println!("  log: {log}");
    }
}
