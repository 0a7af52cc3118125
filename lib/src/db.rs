mod sqlite;

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use enum_dispatch::enum_dispatch;

pub use self::sqlite::SqliteDb;
use crate::sink::Report;
use crate::util::id::JobId;

#[async_trait]
#[enum_dispatch]
pub trait Db {
    // Required

    /// Saves an [`ExecEntry`] to the database.
    async fn save_exec(&self, entry: &ExecEntry) -> Result<()>;

    /// Loads every [`ExecEntry`] for `job_id`, in target order.
    async fn load_exec(&self, job_id: &str) -> Result<Vec<ExecEntry>>;

    /// ID of the most recently saved job, if any.
    async fn latest_job_id(&self) -> Result<Option<String>>;

    // Defaults

    /// Migrates the database to the newest schema.
    ///
    /// By default this does nothing. Override this if needed.
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }
}

#[enum_dispatch(Db)]
#[derive(Clone)]
pub enum DbImpl {
    Sqlite(SqliteDb),
}

impl DbImpl {
    /// # Errors
    ///
    /// If any db connection fails.
    pub async fn try_new(connection_string: &str) -> Result<Self> {
        if connection_string.contains("sqlite") || connection_string.contains(".db") {
            let db = SqliteDb::try_new(connection_string).await?;
            return Ok(db.into());
        }

        bail!("unable to build a db impl");
    }
}

/// Recorded outcome of one target in an `exec` run.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExecEntry {
    pub job_id: String,
    pub command: String,
    pub position: i64,
    pub group_name: String,
    pub node: String,
    pub host: String,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub exit_status: Option<u32>,
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
    /// Milliseconds since the Unix epoch.
    pub start_ms: Option<i64>,
    /// Milliseconds since the Unix epoch.
    pub end_ms: Option<i64>,
}

impl ExecEntry {
    #[must_use]
    pub fn from_report(job_id: &JobId, command: &str, report: &Report) -> Self {
        let mut entry = Self {
            job_id: job_id.to_string(),
            command: command.to_owned(),
            position: i64::try_from(report.index).unwrap_or(i64::MAX),
            group_name: report.group.clone(),
            node: report.node.name.clone(),
            host: report.node.address(),
            error_kind: None,
            error: None,
            exit_status: None,
            stdout: None,
            stderr: None,
            start_ms: None,
            end_ms: None,
        };
        match &report.outcome {
            Ok(output) => {
                entry.exit_status = output.exit_status;
                entry.stdout = Some(output.stdout.clone());
                entry.stderr = Some(output.stderr.clone());
                entry.start_ms = Some(to_millis(output.start_time));
                entry.end_ms = Some(to_millis(output.end_time));
            }
            Err(error) => {
                entry.error_kind = Some(error.kind().to_string());
                entry.error = Some(error.to_string());
            }
        }
        entry
    }

    /// Ran and exited zero.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_status == Some(0)
    }

    #[must_use]
    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_ms.map(from_millis)
    }

    #[must_use]
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_ms.map(from_millis)
    }
}

fn to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|x| i64::try_from(x.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

fn from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::ExecOutput;
    use crate::error::Error;
    use crate::inventory::Node;

    #[test]
    fn from_report_with_output() {
        let start = UNIX_EPOCH + Duration::from_millis(1_000);
        let end = UNIX_EPOCH + Duration::from_millis(2_500);
        let report = Report {
            index: 4,
            group: "web".into(),
            node: Arc::new(Node::new("web1", "10.0.0.1")),
            outcome: Ok(ExecOutput {
                start_time: start,
                end_time: end,
                exit_status: Some(0),
                stdout: b"ok".to_vec(),
                stderr: Vec::new(),
            }),
        };

        let entry = ExecEntry::from_report(&JobId::Sonyflake(1), "uptime", &report);
        assert_eq!(entry.position, 4);
        assert_eq!(entry.host, "10.0.0.1:22");
        assert_eq!(entry.start_ms, Some(1_000));
        assert_eq!(entry.end_time(), Some(end));
        assert_eq!(entry.command, "uptime");
        assert_eq!(entry.error, None);
        assert!(entry.is_success());
    }

    #[test]
    fn from_report_with_error() {
        let report = Report {
            index: 0,
            group: String::new(),
            node: Arc::new(Node::new("db1", "10.0.0.9")),
            outcome: Err(Error::AuthUnavailable {
                host: "10.0.0.9:22".into(),
                user: "ops".into(),
            }),
        };

        let entry = ExecEntry::from_report(&JobId::Sonyflake(1), "uptime", &report);
        assert_eq!(entry.error_kind.as_deref(), Some("auth_unavailable"));
        assert!(entry.error.as_ref().unwrap().contains("ops@10.0.0.9:22"));
        assert_eq!(entry.stdout, None);
        assert_eq!(entry.start_time(), None);
        assert!(!entry.is_success());
    }
}
