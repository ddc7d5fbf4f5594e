//! Versioned SQL migrations applied from a directory at runtime.
//!
//! Scripts live in a flat directory and are named `{version}_{name}.up.sql`
//! (or `{version}_{name}.sql`). Progress is tracked in a single-row table
//! holding the last attempted version and a `dirty` flag. A script is marked
//! dirty before it runs and clean after it succeeds, so an interrupted or
//! failed run leaves the schema flagged at the version that broke. Nothing is
//! applied over a dirty schema until an operator calls [`Migrator::force`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgPool, Postgres};

/// Default name of the tracking table.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Migration errors.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("failed to read migrations directory {}: {source}", path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    #[error("invalid migration version in {file}: {version} does not fit in a 64-bit integer")]
    InvalidVersion { file: String, version: String },

    #[error("failed to initialize migration driver: {0}")]
    DriverInit(#[source] sqlx::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    Apply {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to access migration state: {0}")]
    State(#[source] sqlx::Error),
}

/// Tracked schema state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No migration has ever been recorded.
    Unversioned,
    /// The last recorded migration completed.
    Clean(i64),
    /// The migration at this version started but never completed.
    Dirty(i64),
}

impl SchemaState {
    fn from_row(row: Option<(i64, bool)>) -> Self {
        match row {
            None => Self::Unversioned,
            Some((version, true)) => Self::Dirty(version),
            Some((version, false)) => Self::Clean(version),
        }
    }

    /// Recorded version, if any.
    pub fn version(&self) -> Option<i64> {
        match self {
            Self::Unversioned => None,
            Self::Clean(v) | Self::Dirty(v) => Some(*v),
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Dirty(_))
    }
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unversioned => write!(f, "no version"),
            Self::Clean(v) => write!(f, "version {}", v),
            Self::Dirty(v) => write!(f, "version {} (dirty)", v),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The directory held no `*.sql` files; the database was not touched.
    Skipped,
    /// The run finished (possibly with nothing to do).
    Completed {
        /// Versions applied during this run, ascending.
        applied: Vec<i64>,
        /// State read back after the run.
        state: SchemaState,
    },
}

/// A single up-migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub path: PathBuf,
}

impl Migration {
    /// Parses `{version}_{name}.up.sql` or `{version}_{name}.sql`.
    ///
    /// Returns `Ok(None)` for down scripts and for names without a numeric
    /// version prefix, and an error when the prefix is numeric but too large.
    pub fn parse(path: &Path) -> Result<Option<Self>, MigrateError> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(stem) = file_name.strip_suffix(".sql") else {
            return Ok(None);
        };
        if stem.ends_with(".down") {
            return Ok(None);
        }
        let stem = stem.strip_suffix(".up").unwrap_or(stem);

        let (version, name) = match stem.split_once('_') {
            Some((version, name)) => (version, name),
            None => (stem, ""),
        };
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        let version = version.parse().map_err(|_| MigrateError::InvalidVersion {
            file: file_name.to_string(),
            version: version.to_string(),
        })?;

        Ok(Some(Self {
            version,
            name: name.to_string(),
            path: path.to_path_buf(),
        }))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Lists the `*.sql` files directly inside `dir`.
pub async fn sql_files(dir: &Path) -> Result<Vec<PathBuf>, MigrateError> {
    let read_err = |source| MigrateError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "sql") {
            continue;
        }
        let metadata = tokio::fs::metadata(&path).await.map_err(read_err)?;
        if metadata.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses the up-scripts in `files`, ordered by version.
pub fn collect_migrations(files: &[PathBuf]) -> Result<Vec<Migration>, MigrateError> {
    let mut by_version: BTreeMap<i64, Migration> = BTreeMap::new();

    for path in files {
        let Some(migration) = Migration::parse(path)? else {
            if !is_down_script(path) {
                tracing::warn!(
                    "Ignoring migration file without a version prefix: {}",
                    path.display()
                );
            }
            continue;
        };

        if let Some(existing) = by_version.get(&migration.version) {
            return Err(MigrateError::DuplicateVersion {
                version: migration.version,
                first: existing.file_name(),
                second: migration.file_name(),
            });
        }
        by_version.insert(migration.version, migration);
    }

    Ok(by_version.into_values().collect())
}

fn is_down_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".down.sql"))
}

/// Applies migrations from a directory and manages the tracking table.
#[derive(Debug, Clone)]
pub struct Migrator {
    dir: PathBuf,
    table: String,
}

impl Migrator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }

    /// Use a different tracking table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Applies every pending migration in ascending version order.
    ///
    /// An empty directory is reported as [`MigrationOutcome::Skipped`]. A
    /// failing script leaves the schema dirty at its version and returns
    /// [`MigrateError::Apply`]. A schema that is already dirty is reported
    /// as-is without applying anything.
    pub async fn apply_all(&self, pool: &PgPool) -> Result<MigrationOutcome, MigrateError> {
        let files = sql_files(&self.dir).await?;
        if files.is_empty() {
            return Ok(MigrationOutcome::Skipped);
        }
        let migrations = collect_migrations(&files)?;

        let mut conn = self.attach(pool).await?;
        let result = self.apply_locked(&mut conn, &migrations).await;
        self.unlock(conn).await;

        result
    }

    /// Reads the tracked schema state.
    pub async fn version(&self, pool: &PgPool) -> Result<SchemaState, MigrateError> {
        let mut conn = self.attach(pool).await?;
        let result = self.read_state(&mut conn).await;
        self.unlock(conn).await;

        result
    }

    /// Overwrites the tracked state with a clean version, or clears it.
    ///
    /// No scripts are executed. This is the manual way out of a dirty state.
    pub async fn force(&self, pool: &PgPool, version: Option<i64>) -> Result<(), MigrateError> {
        let mut conn = self.attach(pool).await?;
        let result = match version {
            Some(v) => self.write_state(&mut conn, Some((v, false))).await,
            None => self.write_state(&mut conn, None).await,
        };
        self.unlock(conn).await;

        if result.is_ok() {
            tracing::info!(version = ?version, "Migration state forced");
        }
        result
    }

    async fn apply_locked(
        &self,
        conn: &mut PoolConnection<Postgres>,
        migrations: &[Migration],
    ) -> Result<MigrationOutcome, MigrateError> {
        let current = self.read_state(conn).await?;
        if let SchemaState::Dirty(version) = current {
            tracing::warn!(
                version,
                "Schema is dirty; skipping migrations until the state is forced"
            );
            return Ok(MigrationOutcome::Completed {
                applied: Vec::new(),
                state: current,
            });
        }

        let floor = current.version();
        let mut applied = Vec::new();

        for migration in migrations
            .iter()
            .filter(|m| floor.map_or(true, |v| m.version > v))
        {
            self.apply_one(conn, migration).await?;
            applied.push(migration.version);
        }

        if applied.is_empty() {
            tracing::debug!("No pending migrations");
        }

        let state = self.read_state(conn).await?;
        Ok(MigrationOutcome::Completed { applied, state })
    }

    async fn apply_one(
        &self,
        conn: &mut PoolConnection<Postgres>,
        migration: &Migration,
    ) -> Result<(), MigrateError> {
        let apply_err = |source| MigrateError::Apply {
            version: migration.version,
            name: migration.name.clone(),
            source,
        };

        let script = tokio::fs::read_to_string(&migration.path)
            .await
            .map_err(|e| apply_err(sqlx::Error::Io(e)))?;

        self.write_state(conn, Some((migration.version, true))).await?;

        tracing::info!(
            version = migration.version,
            name = %migration.name,
            "Applying migration"
        );
        sqlx::raw_sql(&script)
            .execute(&mut **conn)
            .await
            .map_err(apply_err)?;

        self.write_state(conn, Some((migration.version, false))).await
    }

    /// Acquires a connection holding the migration lock, with the tracking
    /// table in place. Callers must hand the connection back to [`Self::unlock`].
    async fn attach(&self, pool: &PgPool) -> Result<PoolConnection<Postgres>, MigrateError> {
        let mut conn = pool.acquire().await.map_err(MigrateError::DriverInit)?;

        // CREATE TABLE IF NOT EXISTS races on the catalog index; lock first.
        self.lock(&mut conn).await?;
        if let Err(e) = self.ensure_table(&mut conn).await {
            self.unlock(conn).await;
            return Err(e);
        }

        Ok(conn)
    }

    async fn ensure_table(&self, conn: &mut PoolConnection<Postgres>) -> Result<(), MigrateError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
            self.quoted_table()
        );
        sqlx::query(&sql)
            .execute(&mut **conn)
            .await
            .map_err(MigrateError::DriverInit)?;
        Ok(())
    }

    async fn lock(&self, conn: &mut PoolConnection<Postgres>) -> Result<(), MigrateError> {
        sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
            .bind(&self.table)
            .execute(&mut **conn)
            .await
            .map_err(MigrateError::DriverInit)?;
        Ok(())
    }

    async fn unlock(&self, mut conn: PoolConnection<Postgres>) {
        let result = sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.table)
            .execute(&mut *conn)
            .await;

        if let Err(e) = result {
            // Session locks die with the session, so drop it rather than
            // returning a locked connection to the pool.
            tracing::warn!("Failed to release migration lock: {}", e);
            drop(conn.detach());
        }
    }

    async fn read_state(
        &self,
        conn: &mut PoolConnection<Postgres>,
    ) -> Result<SchemaState, MigrateError> {
        let sql = format!("SELECT version, dirty FROM {} LIMIT 1", self.quoted_table());
        let row: Option<(i64, bool)> = sqlx::query_as(&sql)
            .fetch_optional(&mut **conn)
            .await
            .map_err(MigrateError::State)?;
        Ok(SchemaState::from_row(row))
    }

    async fn write_state(
        &self,
        conn: &mut PoolConnection<Postgres>,
        row: Option<(i64, bool)>,
    ) -> Result<(), MigrateError> {
        let table = self.quoted_table();
        let mut tx = conn.begin().await.map_err(MigrateError::State)?;

        sqlx::query(&format!("TRUNCATE {}", table))
            .execute(&mut *tx)
            .await
            .map_err(MigrateError::State)?;

        if let Some((version, dirty)) = row {
            sqlx::query(&format!(
                "INSERT INTO {} (version, dirty) VALUES ($1, $2)",
                table
            ))
            .bind(version)
            .bind(dirty)
            .execute(&mut *tx)
            .await
            .map_err(MigrateError::State)?;
        }

        tx.commit().await.map_err(MigrateError::State)
    }

    fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table.replace('"', "\"\""))
    }
}
