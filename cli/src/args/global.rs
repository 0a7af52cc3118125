use std::fs::File;
use std::fs::OpenOptions;
use std::io::IsTerminal;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Args;
use melanite::db::DbImpl;
use melanite::util::dirs;
use tracing::debug;
use tracing::Subscriber;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_glog::Glog;
use tracing_glog::GlogFields;
use tracing_glog::LocalTime;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

const HEADING: Option<&str> = Some("Global Options");

/// Log of the most recent invocation, truncated on every run.
const LOG_FILE: &str = "last.log";

/// Recorded jobs, replayed by `melanite output`.
const DB_FILE: &str = "melanite.db";

/// Global arguments that apply to every subcommand.
#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
    /// Filter directive for stderr logs
    #[clap(long, env = "RUST_LOG", default_value = "error", help_heading = HEADING, global = true)]
    pub log_level: String,

    /// Filter directive for the log file in the data directory
    #[clap(
        long,
        default_value = "melanite=debug,melanite_cli=debug",
        help_heading = HEADING,
        global = true
    )]
    pub file_level: String,

    /// Data directory, holding recorded jobs and the last log file
    #[clap(
        long,
        default_value_t = dirs::data_dir("melanite"),
        help_heading = HEADING,
        global = true
    )]
    pub data_dir: Utf8PathBuf,
}

/// Keeps the log file writer flushing until the end of the program.
#[derive(Debug)]
pub struct TracingGuard {
    _file_writer: WorkerGuard,
}

impl GlobalArgs {
    /// Installs glog-formatted logging to stderr and to the data directory.
    pub fn init_tracing(&self) -> Result<TracingGuard> {
        let log_file = self.open_log_file()?;
        let (file_writer, file_writer_guard) = non_blocking(log_file);

        let indicatif_layer = IndicatifLayer::new();
        let stderr_writer = indicatif_layer.get_stderr_writer();
        let ansi = std::io::stderr().is_terminal();

        let subscriber = Registry::default()
            .with(glog_layer(stderr_writer, ansi, &self.log_level))
            .with(glog_layer(file_writer, false, &self.file_level))
            .with(indicatif_layer);
        tracing::subscriber::set_global_default(subscriber)?;

        debug!(data_dir = %self.data_dir, "Initialized tracing");

        Ok(TracingGuard {
            _file_writer: file_writer_guard,
        })
    }

    /// Opens the job database in the data directory, creating both if needed.
    pub async fn get_db(&self) -> Result<DbImpl> {
        let db_file = self.ensure_data_dir()?.join(DB_FILE);
        DbImpl::try_new(db_file.as_str())
            .await
            .with_context(|| format!("unable to open job database: {db_file}"))
    }

    fn open_log_file(&self) -> Result<File> {
        let path = self.ensure_data_dir()?.join(LOG_FILE);
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("unable to create log file: {path}"))
    }

    /// The default comes from [`dirs::data_dir`], which creates it, but an
    /// explicit `--data-dir` may not exist yet.
    fn ensure_data_dir(&self) -> Result<&Utf8Path> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("unable to create data dir: {}", self.data_dir))?;
        Ok(&self.data_dir)
    }
}

/// Glog formatted layer writing to `writer`, filtered by `directive`.
fn glog_layer<S, W>(writer: W, ansi: bool, directive: &str) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(Glog::default().with_timer(LocalTime::default()))
        .fmt_fields(GlogFields::default())
        .with_ansi(ansi)
        .with_writer(writer)
        .with_filter(EnvFilter::builder().parse_lossy(directive))
}
