use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;
use sqlx::migrate;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::Db;
use super::ExecEntry;

/// `SQLite` persistence layer.
#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Returns a connection to the database with migrations having been run.
    ///
    /// # Errors
    ///
    /// - If connect fails
    /// - If schema migration fails
    pub async fn try_new(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let mut pool_opts = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            // every in-memory connection is a separate database
            pool_opts = pool_opts.max_connections(1);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }
}

#[async_trait::async_trait]
impl Db for SqliteDb {
    async fn migrate(&self) -> Result<()> {
        migrate!("migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(anyhow::Error::from)
    }

    async fn save_exec(&self, entry: &ExecEntry) -> Result<()> {
        sqlx::query(
            r"INSERT INTO exec_results (job_id, command, position, group_name, node, host, error_kind, error, exit_status, stdout, stderr, start_ms, end_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.job_id)
        .bind(&entry.command)
        .bind(entry.position)
        .bind(&entry.group_name)
        .bind(&entry.node)
        .bind(&entry.host)
        .bind(&entry.error_kind)
        .bind(&entry.error)
        .bind(entry.exit_status)
        .bind(&entry.stdout)
        .bind(&entry.stderr)
        .bind(entry.start_ms)
        .bind(entry.end_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_exec(&self, job_id: &str) -> Result<Vec<ExecEntry>> {
        let entries = sqlx::query_as::<_, ExecEntry>(
            r"SELECT job_id, command, position, group_name, node, host, error_kind, error, exit_status, stdout, stderr, start_ms, end_ms FROM exec_results WHERE job_id = ? ORDER BY position",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("unable to load results for job {job_id}"))?;

        Ok(entries)
    }

    async fn latest_job_id(&self) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as(r"SELECT job_id FROM exec_results ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(job_id,)| job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(job_id: &str, position: i64, node: &str) -> ExecEntry {
        ExecEntry {
            job_id: job_id.into(),
            command: "uptime".into(),
            position,
            group_name: "g".into(),
            node: node.into(),
            host: format!("{node}:22"),
            error_kind: None,
            error: None,
            exit_status: Some(0),
            stdout: Some(format!("{node}_stdout").into_bytes()),
            stderr: Some(format!("{node}_stderr").into_bytes()),
            start_ms: Some(1),
            end_ms: Some(2),
        }
    }

    #[tokio::test]
    async fn save_load_works() {
        let db = SqliteDb::try_new("sqlite::memory:").await.unwrap();

        let entry_bar = entry("0", 1, "bar");
        let entry_foo = entry("0", 0, "foo");
        let entry_quux = entry("1", 0, "quux");

        db.save_exec(&entry_bar).await.unwrap();
        db.save_exec(&entry_foo).await.unwrap();
        db.save_exec(&entry_quux).await.unwrap();

        let entries = db.load_exec("0").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], entry_foo);
        assert_eq!(entries[1], entry_bar);
    }

    #[tokio::test]
    async fn undecodable_row_fails_load() {
        let db = SqliteDb::try_new("sqlite::memory:").await.unwrap();
        db.save_exec(&entry("0", 0, "foo")).await.unwrap();
        db.save_exec(&entry("0", 1, "bar")).await.unwrap();
        sqlx::query(r"UPDATE exec_results SET exit_status = -1 WHERE node = 'bar'")
            .execute(&db.pool)
            .await
            .unwrap();

        let error = db.load_exec("0").await.unwrap_err();
        assert!(error.to_string().contains("job 0"), "{error:?}");
    }

    #[tokio::test]
    async fn latest_job_id_works() {
        let db = SqliteDb::try_new("sqlite::memory:").await.unwrap();
        assert_eq!(db.latest_job_id().await.unwrap(), None);

        db.save_exec(&entry("A", 0, "foo")).await.unwrap();
        db.save_exec(&entry("B", 0, "bar")).await.unwrap();

        assert_eq!(db.latest_job_id().await.unwrap().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn file_db_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melanite.db");
        let url = format!("sqlite://{}", path.display());

        let db = SqliteDb::try_new(&url).await.unwrap();
        db.save_exec(&entry("A", 0, "foo")).await.unwrap();
        drop(db);

        let db = SqliteDb::try_new(&url).await.unwrap();
        assert_eq!(db.load_exec("A").await.unwrap().len(), 1);
    }
}
