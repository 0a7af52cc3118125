use std::borrow::Cow;
use std::io::Write;
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use melanite::db::ExecEntry;
use melanite::engine::Summary;
use melanite::sink::Report;
use melanite::sink::ResultSink;
use melanite::util::id::JobId;
use serde::Serialize;

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable blocks, one per target
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Writes [`ExecEntry`] records and run summaries.
///
/// Live runs and replays share this so both look the same.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: Format,
}

impl Printer {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn entry(&self, entry: &ExecEntry) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        self.write_entry(&mut stdout, entry)?;
        stdout.flush()?;
        Ok(())
    }

    pub fn summary(&self, job_id: &str, summary: &Summary) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        self.write_summary(&mut stdout, job_id, summary)?;
        stdout.flush()?;
        Ok(())
    }

    fn write_entry(&self, w: &mut impl Write, entry: &ExecEntry) -> Result<()> {
        match self.format {
            Format::Text => write_text(w, entry),
            Format::Json => {
                serde_json::to_writer(&mut *w, &JsonEntry::from(entry))?;
                writeln!(w)?;
                Ok(())
            }
        }
    }

    fn write_summary(&self, w: &mut impl Write, job_id: &str, summary: &Summary) -> Result<()> {
        match self.format {
            Format::Text => {
                writeln!(
                    w,
                    "job {job_id}: {} total, {} succeeded, {} failed",
                    summary.total,
                    summary.succeeded,
                    summary.unsuccessful()
                )?;
            }
            Format::Json => {
                let line = JsonSummary {
                    job_id,
                    total: summary.total,
                    succeeded: summary.succeeded,
                    nonzero: summary.nonzero,
                    failed: summary.failed,
                };
                serde_json::to_writer(&mut *w, &line)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

fn write_text(w: &mut impl Write, entry: &ExecEntry) -> Result<()> {
    let group = if entry.group_name.is_empty() {
        "-"
    } else {
        entry.group_name.as_str()
    };
    writeln!(w, "exec {} on {group} -> {}", entry.command, entry.node)?;

    if let Some(error) = &entry.error {
        let kind = entry.error_kind.as_deref().unwrap_or("error");
        writeln!(w, "failed ({kind}): {error}")?;
        writeln!(w)?;
        return Ok(());
    }

    writeln!(w, "start time:  {}", timestamp(entry.start_time()))?;
    writeln!(w, "end time:    {}", timestamp(entry.end_time()))?;
    match entry.exit_status {
        Some(status) => writeln!(w, "exit status: {status}")?,
        None => writeln!(w, "exit status: none")?,
    }
    write_stream(w, "stdout", entry.stdout.as_deref())?;
    write_stream(w, "stderr", entry.stderr.as_deref())?;
    writeln!(w)?;
    Ok(())
}

fn write_stream(w: &mut impl Write, label: &str, bytes: Option<&[u8]>) -> Result<()> {
    let bytes = bytes.unwrap_or_default();
    if bytes.is_empty() {
        writeln!(w, "{label}: (empty)")?;
        return Ok(());
    }
    writeln!(w, "{label}:")?;
    w.write_all(bytes)?;
    if !bytes.ends_with(b"\n") {
        writeln!(w)?;
    }
    Ok(())
}

fn timestamp(time: Option<SystemTime>) -> String {
    time.map_or_else(
        || "-".to_owned(),
        |x| humantime::format_rfc3339_millis(x).to_string(),
    )
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    job_id: &'a str,
    command: &'a str,
    group: &'a str,
    node: &'a str,
    host: &'a str,
    start_time: Option<String>,
    end_time: Option<String>,
    exit_status: Option<u32>,
    stdout: Option<Cow<'a, str>>,
    stderr: Option<Cow<'a, str>>,
    error_kind: Option<&'a str>,
    error: Option<&'a str>,
}

impl<'a> From<&'a ExecEntry> for JsonEntry<'a> {
    fn from(entry: &'a ExecEntry) -> Self {
        Self {
            job_id: &entry.job_id,
            command: &entry.command,
            group: &entry.group_name,
            node: &entry.node,
            host: &entry.host,
            start_time: entry.start_time().map(|x| humantime::format_rfc3339_millis(x).to_string()),
            end_time: entry.end_time().map(|x| humantime::format_rfc3339_millis(x).to_string()),
            exit_status: entry.exit_status,
            stdout: entry.stdout.as_deref().map(String::from_utf8_lossy),
            stderr: entry.stderr.as_deref().map(String::from_utf8_lossy),
            error_kind: entry.error_kind.as_deref(),
            error: entry.error.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    job_id: &'a str,
    total: usize,
    succeeded: usize,
    nonzero: usize,
    failed: usize,
}

/// Prints each report as it arrives.
#[derive(Debug)]
pub struct PrintSink {
    printer: Printer,
    job_id: JobId,
    command: String,
}

impl PrintSink {
    pub fn new(printer: Printer, job_id: JobId, command: impl Into<String>) -> Self {
        Self {
            printer,
            job_id,
            command: command.into(),
        }
    }
}

#[async_trait]
impl ResultSink for PrintSink {
    async fn accept(&mut self, report: &Report) -> Result<()> {
        let entry = ExecEntry::from_report(&self.job_id, &self.command, report);
        self.printer.entry(&entry)
    }
}
