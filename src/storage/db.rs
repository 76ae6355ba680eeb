use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::Duration;

const MAX_FILE_CONNECTIONS: u32 = 5;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "m20240601_000001_create_compression_cache",
        include_str!("../../migrations/001_create_compression_cache.sql"),
    ),
    (
        "m20240601_000002_create_compression_performance_metrics",
        include_str!("../../migrations/002_create_compression_performance_metrics.sql"),
    ),
    (
        "m20240601_000003_create_conversation_compression_stats",
        include_str!("../../migrations/003_create_conversation_compression_stats.sql"),
    ),
];

const MEMORY_URL: &str = "sqlite::memory:";

/// What a `sqlite:` URL refers to.
#[derive(Debug, PartialEq, Eq)]
enum SqliteTarget<'a> {
    Memory,
    File(&'a Path),
}

fn sqlite_target(database_url: &str) -> Result<SqliteTarget<'_>, DbErr> {
    let unsupported = || {
        DbErr::Custom(format!(
            "Unsupported database URL {:?}: expected sqlite://<path> or {}",
            database_url, MEMORY_URL
        ))
    };

    if database_url.starts_with(MEMORY_URL) {
        return Ok(SqliteTarget::Memory);
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .ok_or_else(unsupported)?;
    let path = rest.split_once('?').map_or(rest, |(path, _)| path);

    match path {
        "" => Err(unsupported()),
        ":memory:" => Ok(SqliteTarget::Memory),
        path => Ok(SqliteTarget::File(Path::new(path))),
    }
}

/// Creates the database file and its directory so a plain `sqlite://` URL
/// works without `?mode=rwc`.
fn ensure_db_file(path: &Path) -> Result<(), DbErr> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                DbErr::Custom(format!("Cannot create database directory {}: {}", dir.display(), e))
            })?;
            tracing::info!("Created database directory {}", dir.display());
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DbErr::Custom(format!("Cannot open database file {}: {}", path.display(), e)))?;
    Ok(())
}

/// Opens the store at `database_url` and brings its schema up to date.
pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    match sqlite_target(database_url)? {
        // every pooled connection would otherwise open its own empty database
        SqliteTarget::Memory => {
            options.max_connections(1).min_connections(1);
            tracing::info!("Opening in-memory compression store");
        }
        SqliteTarget::File(path) => {
            ensure_db_file(path)?;
            options.max_connections(MAX_FILE_CONNECTIONS);
            tracing::info!("Opening compression store at {}", path.display());
        }
    }

    let db = Database::connect(options).await?;
    apply_migrations(&db).await?;
    Ok(db)
}

/// Applies each embedded migration once, tracked in `seaql_migrations`.
async fn apply_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute_unprepared(
        r#"
        CREATE TABLE IF NOT EXISTS seaql_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    for (version, sql) in MIGRATIONS {
        let applied = db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "SELECT version FROM seaql_migrations WHERE version = ?",
                [(*version).into()],
            ))
            .await?
            .is_some();

        if applied {
            continue;
        }

        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            db.execute_unprepared(statement).await?;
        }

        db.execute(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "INSERT INTO seaql_migrations (version) VALUES (?)",
            [(*version).into()],
        ))
        .await?;
        tracing::info!("Applied migration {}", version);
    }

    Ok(())
}
