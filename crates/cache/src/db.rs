//! The SQLite file behind the snapshot store.
//!
//! The workload is tiny: one row per player, rewritten every time the
//! backend hands out a new playlist, read back once at startup when the
//! backend is out of reach. What matters is that the file survives the
//! screen being switched off at the wall. Throughput does not.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// The reconciler is the only writer; the CLI may read alongside it.
const POOL_SIZE: u32 = 2;
/// Primary result codes (the low byte of an extended code) meaning the file
/// is not a usable database.
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_NOTADB: i32 = 26;

/// Connection pool for the snapshot database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the snapshot database at `path`, creating it if needed.
    ///
    /// The parent directory must already exist. A file SQLite cannot read is
    /// moved aside to `<path>.corrupt` and replaced with an empty database:
    /// a player without a snapshot waits for the backend, a player that
    /// refuses to start shows nothing at all.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::options().filename(path).create_if_missing(true);
        let pool = match Self::open_pool(options.clone(), POOL_SIZE).await {
            Err(e) if is_unreadable(&e) && path.exists() => {
                let aside = quarantine(path).or_raise(|| ErrorKind::Database)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Snapshot database unreadable, starting with an empty one"
                );
                Self::open_pool(options, POOL_SIZE).await.or_raise(|| ErrorKind::Database)?
            },
            opened => opened.or_raise(|| ErrorKind::Database)?,
        };
        Self::ready(pool).await
    }

    /// In-memory database for tests, here and in dependent crates.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" gets its own database.
        let pool = Self::open_pool(Self::options().filename(":memory:"), 1).await.or_raise(|| ErrorKind::Database)?;
        Self::ready(pool).await
    }

    async fn ready(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn open_pool(options: SqliteConnectOptions, size: u32) -> sqlx::Result<SqlitePool> {
        SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(async move { Self::per_connection(conn, meta).await }))
            .max_connections(size)
            .connect_with(options)
            .await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Power loss with NORMAL in WAL mode can drop the last commit but
            // never the file. The last commit is at worst one playlist
            // revision, and the previous snapshot is still there.
            .synchronous(SqliteSynchronous::Normal)
            // The CLI reading while the reconciler writes is the only contention.
            .busy_timeout(Duration::from_millis(1500))
    }

    /// Settings SQLite only takes as queries, run on every pooled connection.
    async fn per_connection(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        // Snapshot rows are a few kilobytes, so checkpoint after 200 pages
        // to keep what a power cut leaves in the WAL small.
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 200;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument("migrating snapshot database", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fold the WAL back into the database file and close the pool.
    ///
    /// After a clean shutdown the database is a single self-contained file.
    /// Don't use the instance afterwards.
    pub async fn close(&self) {
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.pool).await {
            tracing::debug!(error = %e, "Could not checkpoint snapshot database");
        }
        self.pool.close().await;
    }
}

fn is_unreadable(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_CORRUPT | SQLITE_NOTADB))
}

/// Move an unreadable database out of the way, along with its WAL and
/// shared-memory files so they can't be replayed onto the new one.
fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let aside = with_suffix(path, ".corrupt");
    std::fs::rename(path, &aside)?;
    for suffix in ["-wal", "-shm"] {
        match std::fs::remove_file(with_suffix(path, suffix)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            _ => {},
        }
    }
    Ok(aside)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_checkpoint_interval_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 200);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_close_leaves_no_wal_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        let db = Database::connect(&path).await.unwrap();
        sqlx::query("PRAGMA user_version = 7").execute(db.pool()).await.unwrap();
        db.close().await;
        let wal = with_suffix(&path, "-wal");
        assert!(!wal.exists() || std::fs::metadata(&wal).unwrap().len() == 0);
        let reopened = Database::connect(&path).await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA user_version").fetch_one(reopened.pool()).await.unwrap();
        assert_eq!(row.0, 7);
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_unreadable_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();
        let db = Database::connect(&path).await.unwrap();
        let aside = dir.path().join("snapshots.db.corrupt");
        assert_eq!(std::fs::read(&aside).unwrap(), vec![b'x'; 4096]);
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[test]
    fn test_with_suffix() {
        let path = Path::new("/var/lib/marquee/snapshots.db");
        assert_eq!(with_suffix(path, "-wal"), Path::new("/var/lib/marquee/snapshots.db-wal"));
    }
}
