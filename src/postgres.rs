//! sqlx-backed collaborators: inventory listing, elevated connections and
//! the knex-style migration table query.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Connection, PgConnection};

use crate::config::SuperuserConfig;
use crate::error::{RosterError, RosterResult};
use crate::inventory::InventorySource;
use crate::migration::{ElevatedConnector, MigrationQuery, MigrationRecord};

/// Parse a `postgres://` URL into connect options.
pub fn connect_options(url: &str) -> RosterResult<PgConnectOptions> {
    PgConnectOptions::from_str(url).map_err(|e| RosterError::InvalidUrl(e.to_string()))
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn database_names_sql(include_templates: bool, sort_by_creation: bool) -> String {
    let mut sql = String::from("SELECT datname::text FROM pg_database");
    if !include_templates {
        sql.push_str(" WHERE NOT datistemplate");
    }
    if sort_by_creation {
        // PG_VERSION is written once when the database directory is created.
        sql.push_str(
            " ORDER BY (pg_stat_file('base/' || oid || '/PG_VERSION')).modification DESC, datname",
        );
    } else {
        sql.push_str(" ORDER BY datname");
    }
    sql
}

fn latest_migration_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT name, migration_time::timestamptz FROM {}.{} ORDER BY id DESC LIMIT 1",
        quote_ident(schema),
        quote_ident(table)
    )
}

/// Inventory source backed by a small pool on the configured database.
pub struct PgInventory {
    pool: PgPool,
}

impl PgInventory {
    pub async fn connect(options: PgConnectOptions) -> RosterResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl InventorySource for PgInventory {
    async fn database_names(
        &self,
        include_templates: bool,
        sort_by_creation: bool,
    ) -> RosterResult<Vec<String>> {
        let sql = database_names_sql(include_templates, sort_by_creation);
        let names: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(names)
    }

    async fn current_database(&self) -> RosterResult<String> {
        let name: String = sqlx::query_scalar("SELECT current_database()::text")
            .fetch_one(&self.pool)
            .await?;
        Ok(name)
    }
}

/// Opens one dedicated connection per inspected database, using the
/// superuser credentials when configured.
#[derive(Debug, Clone)]
pub struct PgElevatedConnector {
    options: PgConnectOptions,
}

impl PgElevatedConnector {
    /// A `[superuser]` with a different user than the URL must bring its own
    /// password; the URL password is only reused for the same user.
    pub fn new(
        base: PgConnectOptions,
        superuser: Option<&SuperuserConfig>,
    ) -> RosterResult<Self> {
        let options = match superuser {
            Some(su) => match su.password.as_deref() {
                Some(password) => base.username(&su.user).password(password),
                None if su.user == base.get_username() => base,
                None => {
                    return Err(RosterError::Credentials(format!(
                        "superuser `{}` has no password; set [superuser] password",
                        su.user
                    )));
                }
            },
            None => base,
        };
        Ok(Self { options })
    }

    /// Connect options for `database` on the same server.
    pub fn options_for(&self, database: &str) -> PgConnectOptions {
        self.options.clone().database(database)
    }
}

impl ElevatedConnector for PgElevatedConnector {
    type Connection = PgConnection;

    async fn connect_elevated(&self, database: &str) -> RosterResult<PgConnection> {
        let conn = PgConnection::connect_with(&self.options_for(database)).await?;
        Ok(conn)
    }
}

impl MigrationQuery for PgConnection {
    async fn latest_migration(
        &mut self,
        schema: &str,
        table: &str,
    ) -> RosterResult<Option<MigrationRecord>> {
        let sql = latest_migration_sql(schema, table);
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as(&sql).fetch_optional(&mut *self).await?;
        Ok(row.map(|(name, applied_at)| MigrationRecord { name, applied_at }))
    }

    async fn close(self) -> RosterResult<()> {
        Connection::close(self).await?;
        Ok(())
    }
}
