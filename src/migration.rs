//! Migration status introspection for a single database.
//!
//! [`resolve`] is an isolation boundary: whatever goes wrong while reading
//! a database's migration table comes back as
//! [`MigrationStatus::Unavailable`], never as an error.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{RosterError, RosterResult};

/// Latest applied migration of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Why a database's migration status could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The migrations schema or table does not exist
    NoMigrationsTable,
    /// The migrations table is empty
    NoRecords,
    /// Could not connect (or the connection dropped)
    Connection(String),
    /// The query itself failed (permissions, column types, ...)
    Query(String),
    /// The resolver failed outside of its own error handling
    Internal(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NoMigrationsTable => write!(f, "no migrations table"),
            UnavailableReason::NoRecords => write!(f, "no migrations applied"),
            UnavailableReason::Connection(e) => write!(f, "connection error: {}", e),
            UnavailableReason::Query(e) => write!(f, "query error: {}", e),
            UnavailableReason::Internal(e) => write!(f, "internal error: {}", e),
        }
    }
}

/// SQLSTATE undefined_table / invalid_schema_name.
const MISSING_RELATION_CODES: [&str; 2] = ["42P01", "3F000"];

impl From<&RosterError> for UnavailableReason {
    fn from(err: &RosterError) -> Self {
        match err {
            RosterError::Database(sqlx::Error::Database(db_err)) => {
                let missing = db_err
                    .code()
                    .is_some_and(|code| MISSING_RELATION_CODES.iter().any(|c| *c == code));
                if missing {
                    UnavailableReason::NoMigrationsTable
                } else {
                    UnavailableReason::Query(db_err.message().to_string())
                }
            }
            RosterError::Database(
                e @ (sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Configuration(_)),
            ) => UnavailableReason::Connection(e.to_string()),
            RosterError::Database(e) => UnavailableReason::Query(e.to_string()),
            RosterError::InvalidUrl(e) => UnavailableReason::Connection(e.clone()),
            other => UnavailableReason::Internal(other.to_string()),
        }
    }
}

/// Outcome of introspecting one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// A migration record was found; `file_exists` tells whether the
    /// local migrations directory still has the file.
    Present {
        record: MigrationRecord,
        file_exists: bool,
    },
    Unavailable(UnavailableReason),
}

impl MigrationStatus {
    pub fn record(&self) -> Option<&MigrationRecord> {
        match self {
            MigrationStatus::Present { record, .. } => Some(record),
            MigrationStatus::Unavailable(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, MigrationStatus::Present { .. })
    }
}

/// A connection that can report its most recent migration record.
pub trait MigrationQuery {
    /// The row with the highest id in `schema.table`, if any.
    fn latest_migration(
        &mut self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = RosterResult<Option<MigrationRecord>>> + Send;

    /// Shut the connection down cleanly once the status has been read.
    fn close(self) -> impl Future<Output = RosterResult<()>> + Send
    where
        Self: Sized;
}

/// Opens privileged connections for status introspection.
///
/// Every call must hand out a fresh connection; connections are never
/// shared between concurrent resolver calls.
pub trait ElevatedConnector {
    type Connection: MigrationQuery + Send;

    fn connect_elevated(
        &self,
        database: &str,
    ) -> impl Future<Output = RosterResult<Self::Connection>> + Send;
}

/// Local directory holding migration files.
///
/// There is one of these per run, tied to the inventory database; every
/// inspected database is compared against the same file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDir {
    root: PathBuf,
}

impl MigrationDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` exists under the directory.
    pub fn contains(&self, name: &str) -> bool {
        !name.is_empty() && self.root.join(name).exists()
    }
}

/// Fetch the latest migration of one database and cross-check it against
/// the local file set.
pub async fn resolve<Q, F>(
    conn: &mut Q,
    schema: &str,
    table: &str,
    file_exists: F,
) -> MigrationStatus
where
    Q: MigrationQuery,
    F: Fn(&str) -> bool,
{
    match conn.latest_migration(schema, table).await {
        Ok(Some(record)) => {
            let file_exists = file_exists(&record.name);
            MigrationStatus::Present {
                record,
                file_exists,
            }
        }
        Ok(None) => MigrationStatus::Unavailable(UnavailableReason::NoRecords),
        Err(e) => MigrationStatus::Unavailable(UnavailableReason::from(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    enum Canned {
        Record(MigrationRecord),
        Empty,
        Fail(fn() -> RosterError),
    }

    struct CannedQuery {
        answer: Canned,
        seen: Vec<(String, String)>,
    }

    impl MigrationQuery for CannedQuery {
        async fn latest_migration(
            &mut self,
            schema: &str,
            table: &str,
        ) -> RosterResult<Option<MigrationRecord>> {
            self.seen.push((schema.to_string(), table.to_string()));
            match &self.answer {
                Canned::Record(r) => Ok(Some(r.clone())),
                Canned::Empty => Ok(None),
                Canned::Fail(make) => Err(make()),
            }
        }

        async fn close(self) -> RosterResult<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct PgServerError {
        code: &'static str,
        message: &'static str,
    }

    impl fmt::Display for PgServerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for PgServerError {}

    impl sqlx::error::DatabaseError for PgServerError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn server_error(code: &'static str, message: &'static str) -> RosterError {
        sqlx::Error::Database(Box::new(PgServerError { code, message })).into()
    }

    fn canned(answer: Canned) -> CannedQuery {
        CannedQuery {
            answer,
            seen: Vec::new(),
        }
    }

    fn init_record() -> MigrationRecord {
        MigrationRecord {
            name: "20230101_init.js".to_string(),
            applied_at: Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_present_with_file() {
        let mut conn = canned(Canned::Record(init_record()));
        let status = resolve(&mut conn, "public", "knex_migrations", |name| {
            name == "20230101_init.js"
        })
        .await;

        assert_eq!(
            status,
            MigrationStatus::Present {
                record: init_record(),
                file_exists: true,
            }
        );
        assert_eq!(
            conn.seen,
            vec![("public".to_string(), "knex_migrations".to_string())]
        );
    }

    #[tokio::test]
    async fn test_present_with_deleted_file() {
        let mut conn = canned(Canned::Record(init_record()));
        let status = resolve(&mut conn, "public", "knex_migrations", |_| false).await;
        assert!(matches!(
            status,
            MigrationStatus::Present {
                file_exists: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_table_is_unavailable() {
        let mut conn = canned(Canned::Empty);
        let status = resolve(&mut conn, "public", "knex_migrations", |_| true).await;
        assert_eq!(
            status,
            MigrationStatus::Unavailable(UnavailableReason::NoRecords)
        );
    }

    #[tokio::test]
    async fn test_connection_failure_is_unavailable() {
        let mut conn = canned(Canned::Fail(|| sqlx::Error::PoolTimedOut.into()));
        let status = resolve(&mut conn, "public", "knex_migrations", |_| true).await;
        assert!(matches!(
            status,
            MigrationStatus::Unavailable(UnavailableReason::Connection(_))
        ));
        assert!(status.record().is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_is_query_error() {
        let mut conn = canned(Canned::Fail(|| sqlx::Error::RowNotFound.into()));
        let status = resolve(&mut conn, "public", "knex_migrations", |_| true).await;
        assert!(matches!(
            status,
            MigrationStatus::Unavailable(UnavailableReason::Query(_))
        ));
    }

    #[test]
    fn test_reason_classification() {
        let io = RosterError::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(matches!(
            UnavailableReason::from(&io),
            UnavailableReason::Connection(_)
        ));

        let resolver = RosterError::Resolver("boom".to_string());
        assert_eq!(
            UnavailableReason::from(&resolver),
            UnavailableReason::Internal("resolver failed: boom".to_string())
        );
    }

    #[test]
    fn test_missing_table_and_schema_codes() {
        let table = server_error("42P01", "relation \"knex_migrations\" does not exist");
        let schema = server_error("3F000", "schema \"audit\" does not exist");

        assert_eq!(
            UnavailableReason::from(&table),
            UnavailableReason::NoMigrationsTable
        );
        assert_eq!(
            UnavailableReason::from(&schema),
            UnavailableReason::NoMigrationsTable
        );
    }

    #[test]
    fn test_other_server_codes_are_query_errors() {
        let denied = server_error("42501", "permission denied for table knex_migrations");
        assert_eq!(
            UnavailableReason::from(&denied),
            UnavailableReason::Query("permission denied for table knex_migrations".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_table_resolves_unavailable() {
        let mut conn = canned(Canned::Fail(|| {
            server_error("42P01", "relation \"knex_migrations\" does not exist")
        }));
        let status = resolve(&mut conn, "public", "knex_migrations", |_| true).await;
        assert_eq!(
            status,
            MigrationStatus::Unavailable(UnavailableReason::NoMigrationsTable)
        );
    }

    #[test]
    fn test_migration_dir_contains() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("20230101_init.js"), "").unwrap();

        let migrations = MigrationDir::new(dir.path());
        assert!(migrations.contains("20230101_init.js"));
        assert!(!migrations.contains("20230202_gone.js"));
        assert!(!migrations.contains(""));
    }
}
