use anyhow::bail;
use anyhow::Result;
use clap::Args;
use melanite::db::Db;
use melanite::db::DbImpl;
use melanite::engine::Summary;
use melanite::util::id::JobId;

use crate::cmd::Run;
use crate::output::Format;
use crate::output::Printer;

/// Replay outputs from a prior run
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Job to replay. Defaults to the most recent one
    job_id: Option<JobId>,

    /// Output format
    #[clap(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

impl Run for OutputArgs {
    async fn run(&self, db: DbImpl) -> Result<()> {
        let job_id = match self.job_id {
            Some(job_id) => job_id.to_string(),
            None => match db.latest_job_id().await? {
                Some(job_id) => job_id,
                None => bail!("no jobs have been recorded yet"),
            },
        };

        let entries = db.load_exec(&job_id).await?;
        if entries.is_empty() {
            bail!("no results recorded for job {job_id}");
        }

        let printer = Printer::new(self.format);
        for entry in &entries {
            printer.entry(entry)?;
        }
        let summary: Summary = entries.iter().collect();
        printer.summary(&job_id, &summary)
    }
}
