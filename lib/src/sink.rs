//! Consumers of per-target results.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::action::ExecOutput;
use crate::db::Db;
use crate::db::DbImpl;
use crate::db::ExecEntry;
use crate::error::Error;
use crate::inventory::Node;
use crate::util::id::JobId;

/// Outcome of dispatching to one target.
#[derive(Debug, Clone)]
pub struct Report {
    /// Position of the target in resolution order.
    pub index: usize,
    pub group: String,
    pub node: Arc<Node>,
    pub outcome: Result<ExecOutput, Error>,
}

impl Report {
    /// The command ran and exited zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, Ok(output) if output.is_success())
    }
}

/// Receives exactly one [`Report`] per resolved target, in resolution order.
#[async_trait]
pub trait ResultSink {
    /// Accepts a report. Errors are logged by the caller and never stop
    /// dispatch.
    async fn accept(&mut self, report: &Report) -> Result<()>;
}

#[async_trait]
impl<A, B> ResultSink for (A, B)
where
    A: ResultSink + Send,
    B: ResultSink + Send,
{
    async fn accept(&mut self, report: &Report) -> Result<()> {
        let first = self.0.accept(report).await;
        let second = self.1.accept(report).await;
        first.and(second)
    }
}

#[async_trait]
impl<S> ResultSink for Option<S>
where
    S: ResultSink + Send,
{
    async fn accept(&mut self, report: &Report) -> Result<()> {
        match self {
            Some(sink) => sink.accept(report).await,
            None => Ok(()),
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub reports: Vec<Report>,
}

#[async_trait]
impl ResultSink for CollectSink {
    async fn accept(&mut self, report: &Report) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// Persists reports under a job ID.
#[derive(Clone)]
pub struct DbSink {
    db: DbImpl,
    job_id: JobId,
    command: String,
}

impl DbSink {
    #[must_use]
    pub fn new(db: DbImpl, job_id: JobId, command: impl Into<String>) -> Self {
        Self {
            db,
            job_id,
            command: command.into(),
        }
    }
}

#[async_trait]
impl ResultSink for DbSink {
    async fn accept(&mut self, report: &Report) -> Result<()> {
        let entry = ExecEntry::from_report(&self.job_id, &self.command, report);
        self.db.save_exec(&entry).await
    }
}
